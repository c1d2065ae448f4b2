//! Shared relay state handed to every connection task

use std::sync::Arc;

use serde::Serialize;

use crate::auth::TokenManager;
use crate::config::RelayConfig;
use crate::core::broadcast::MessageBroadcaster;
use crate::core::registry::ConnectionRegistry;
use crate::core::room::RoomManager;

/// Owns one registry, one room manager and one broadcaster
pub struct RelayServer {
    config: RelayConfig,
    registry: Arc<ConnectionRegistry>,
    rooms: Arc<RoomManager>,
    broadcaster: MessageBroadcaster,
    token_manager: Option<TokenManager>,
}

/// Snapshot served by the health endpoint
#[derive(Debug, Clone, Serialize)]
pub struct RelayStats {
    pub status: &'static str,
    pub connections: usize,
    pub rooms: usize,
}

impl RelayServer {
    pub fn new(config: RelayConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let rooms = Arc::new(RoomManager::with_policy(config.empty_room_policy));
        let broadcaster = MessageBroadcaster::new(
            registry.clone(),
            rooms.clone(),
            config.delivery_timeout,
            config.max_delivery_timeouts,
        );
        let token_manager = config.jwt_secret.as_deref().map(TokenManager::new);

        Self {
            config,
            registry,
            rooms,
            broadcaster,
            token_manager,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn rooms(&self) -> &RoomManager {
        &self.rooms
    }

    pub fn broadcaster(&self) -> &MessageBroadcaster {
        &self.broadcaster
    }

    /// Present whenever a JWT secret is configured
    pub fn token_manager(&self) -> Option<&TokenManager> {
        self.token_manager.as_ref()
    }

    pub async fn connection_count(&self) -> usize {
        self.registry.len().await
    }

    pub async fn stats(&self) -> RelayStats {
        RelayStats {
            status: "ok",
            connections: self.registry.len().await,
            rooms: self.rooms.room_count().await,
        }
    }
}

// Shared reference to the relay
pub type SharedRelayServer = Arc<RelayServer>;
