//! Request handlers and the warp route table

pub mod auth;
pub mod websocket;

use std::convert::Infallible;

use warp::http::{HeaderMap, StatusCode};
use warp::{Filter, Rejection, Reply};

use crate::constants::HEALTH_PATH;
use crate::core::server::SharedRelayServer;
use crate::error::RelayError;

// Re-export the websocket handler
pub use websocket::handle_ws_client;

/// All routes served by the relay: the WebSocket endpoint and a health check.
/// Every request is logged under the `chat_relay` target and gets CORS headers.
pub fn routes(
    server: SharedRelayServer,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let max_frame_size = server.config().max_frame_size;
    let ws_route = warp::path(server.config().ws_path.clone())
        .and(warp::path::end())
        .and(warp::ws())
        .and(with_identity(server.clone()))
        .and(with_server(server.clone()))
        .map(
            move |ws: warp::ws::Ws, user_id: Option<String>, server: SharedRelayServer| {
                // Oversized frames are refused by the transport before they are buffered
                ws.max_message_size(max_frame_size)
                    .max_frame_size(max_frame_size)
                    .on_upgrade(move |socket| handle_ws_client(socket, server, user_id))
            },
        );

    let health_route = warp::path(HEALTH_PATH)
        .and(warp::path::end())
        .and(warp::get())
        .and(with_server(server))
        .and_then(health);

    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST"]);

    ws_route
        .or(health_route)
        .recover(handle_rejection)
        .with(cors)
        .with(warp::log("chat_relay"))
}

// Helper function to include the relay state in a request
fn with_server(
    server: SharedRelayServer,
) -> impl Filter<Extract = (SharedRelayServer,), Error = Infallible> + Clone {
    warp::any().map(move || server.clone())
}

// Verifies credentials before the upgrade is accepted
fn with_identity(
    server: SharedRelayServer,
) -> impl Filter<Extract = (Option<String>,), Error = Rejection> + Clone {
    warp::header::headers_cloned()
        .and(with_server(server))
        .and_then(|headers: HeaderMap, server: SharedRelayServer| async move {
            auth::authenticate(&headers, &server).map_err(warp::reject::custom)
        })
}

async fn health(server: SharedRelayServer) -> Result<impl Reply, Rejection> {
    Ok(warp::reply::json(&server.stats().await))
}

async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_string())
    } else if let Some(e) = err.find::<RelayError>() {
        log::warn!("Refused upgrade: {}", e);
        (StatusCode::UNAUTHORIZED, e.to_string())
    } else {
        log::debug!("Unhandled rejection: {:?}", err);
        (StatusCode::BAD_REQUEST, "Bad request".to_string())
    };

    let body = warp::reply::json(&serde_json::json!({ "error": message }));
    Ok(warp::reply::with_status(body, status))
}
