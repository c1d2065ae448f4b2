use std::net::SocketAddr;
use std::sync::Arc;

use chat_relay::auth::{Claims, TokenManager};
use chat_relay::config::RelayConfig;
use chat_relay::core::server::{RelayServer, SharedRelayServer};
use chat_relay::handlers::routes;
use futures_util::StreamExt;
use serde_json::Value;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;

const SECRET: &str = "integration-signing-key-0123456789abcdef";

fn start_authenticated_relay() -> (SharedRelayServer, SocketAddr) {
    let mut config = RelayConfig::for_testing();
    config.require_auth = true;
    config.jwt_secret = Some(SECRET.to_string());
    config.validate().unwrap();

    let server = Arc::new(RelayServer::new(config));
    let (addr, serve) = warp::serve(routes(server.clone())).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(serve);
    (server, addr)
}

#[tokio::test]
async fn test_missing_token_is_refused() {
    let (server, addr) = start_authenticated_relay();

    let result = connect_async(format!("ws://{}/ws", addr)).await;
    assert!(result.is_err(), "Upgrade without token should fail");
    assert_eq!(server.connection_count().await, 0);
}

#[tokio::test]
async fn test_invalid_token_is_refused() {
    let (_server, addr) = start_authenticated_relay();

    let mut request = format!("ws://{}/ws", addr).into_client_request().unwrap();
    request
        .headers_mut()
        .insert("authorization", HeaderValue::from_static("Bearer not-a-jwt"));
    assert!(connect_async(request).await.is_err());
}

#[tokio::test]
async fn test_valid_token_attaches_identity() {
    let (server, addr) = start_authenticated_relay();
    let token = TokenManager::new(SECRET)
        .generate_token(&Claims::new("user-42".to_string()))
        .unwrap();

    let mut request = format!("ws://{}/ws", addr).into_client_request().unwrap();
    request.headers_mut().insert(
        "authorization",
        HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
    );
    let (mut ws, _) = connect_async(request).await.expect("Failed to connect");

    let client_id = match ws.next().await {
        Some(Ok(Message::Text(text))) => {
            let event: Value = serde_json::from_str(&text).unwrap();
            assert_eq!(event["event"], "connected");
            event["data"]["clientId"].as_str().unwrap().to_string()
        }
        other => panic!("Expected welcome message, got {:?}", other),
    };

    let connection = server.registry().get(&client_id).await.unwrap();
    assert_eq!(connection.user_id.as_deref(), Some("user-42"));
}
