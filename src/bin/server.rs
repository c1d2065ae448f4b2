use log::{error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;

use chat_relay::config::RelayConfig;
use chat_relay::core::server::RelayServer;
use chat_relay::handlers::routes;

#[tokio::main]
async fn main() {
    // Initialize env
    let dotenv_result = dotenvy::dotenv();

    // Initialize logging
    env_logger::init();

    match dotenv_result {
        Ok(path) => info!("Environment variables loaded from {}", path.display()),
        Err(e) => warn!("No .env file loaded: {}", e),
    }

    let config = match RelayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Configuration: host={}, port={}, path=/{}, auth={}, policy={:?}",
        config.host, config.port, config.ws_path, config.require_auth, config.empty_room_policy
    );
    if !config.require_auth {
        warn!("Real-time channel accepts unauthenticated connections");
    }

    // Build the server address
    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Failed to parse server address: {}", e);
            std::process::exit(1);
        }
    };

    let tls_paths = match (&config.tls_cert_path, &config.tls_key_path) {
        (Some(cert), Some(key)) if config.enable_tls => Some((cert.clone(), key.clone())),
        _ => None,
    };

    let server = Arc::new(RelayServer::new(config));
    let routes = routes(server);

    match tls_paths {
        Some((cert_path, key_path)) => {
            info!("Starting relay on wss://{}", addr);
            warp::serve(routes)
                .tls()
                .cert_path(cert_path)
                .key_path(key_path)
                .run(addr)
                .await;
        }
        None => {
            info!("Starting relay on ws://{}", addr);
            warp::serve(routes).run(addr).await;
        }
    }
}
