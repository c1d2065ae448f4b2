//! Per-connection state machine
//!
//! A `ConnectionLifecycle` is owned by exactly one task, so all transitions
//! for one connection id run in order while distinct connections proceed in
//! parallel.

use std::sync::Arc;

use crate::core::broadcast::DeliveryReport;
use crate::core::connection::{Connection, OutboundSender};
use crate::core::message::{ClientEvent, OutgoingMessage};
use crate::core::server::SharedRelayServer;
use crate::error::{RelayError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Accepted by the transport, not yet registered
    Connecting,
    /// Registered; zero or more rooms joined
    Active,
    /// Terminal
    Disconnected,
}

/// Result of a successfully handled inbound event
#[derive(Debug)]
pub enum EventOutcome {
    Joined { room_id: String, newly_joined: bool },
    Left { room_id: String, was_member: bool },
    Broadcast(DeliveryReport),
}

pub struct ConnectionLifecycle {
    id: String,
    state: ConnectionState,
    server: SharedRelayServer,
    // Registry entry, held while Active
    connection: Option<Arc<Connection>>,
}

impl ConnectionLifecycle {
    pub fn new(server: SharedRelayServer, id: String) -> Self {
        Self {
            id,
            state: ConnectionState::Connecting,
            server,
            connection: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == ConnectionState::Active
    }

    /// The registered connection, once accepted
    pub fn connection(&self) -> Option<Arc<Connection>> {
        self.connection.clone()
    }

    /// Register the connection and move to `Active`.
    /// A duplicate id ends the lifecycle immediately.
    pub async fn accept(&mut self, sender: OutboundSender, user_id: Option<String>) -> Result<()> {
        self.require(ConnectionState::Connecting, "connect")?;

        let connection = Connection::new(self.id.clone(), sender).with_user(user_id);
        match self.server.registry().register(connection).await {
            Ok(connection) => self.connection = Some(connection),
            Err(e) => {
                log::error!("Failed to register connection {}: {}", self.id, e);
                self.state = ConnectionState::Disconnected;
                return Err(e);
            }
        }

        self.state = ConnectionState::Active;
        log::info!("User connected: {}", self.id);
        Ok(())
    }

    /// Dispatch one inbound event
    pub async fn handle(&mut self, event: ClientEvent) -> Result<EventOutcome> {
        match event {
            ClientEvent::JoinRoom(room_id) => self.join_room(room_id).await,
            ClientEvent::LeaveRoom(room_id) => self.leave_room(room_id).await,
            ClientEvent::SendMessage(message) => self.send_message(message).await,
        }
    }

    pub async fn join_room(&mut self, room_id: String) -> Result<EventOutcome> {
        self.require(ConnectionState::Active, "join-room")?;

        let newly_joined = self.server.rooms().join(&room_id, &self.id).await;
        if newly_joined {
            log::info!("User {} joined room: {}", self.id, room_id);
        } else {
            log::debug!("User {} already in room: {}", self.id, room_id);
        }
        Ok(EventOutcome::Joined {
            room_id,
            newly_joined,
        })
    }

    pub async fn leave_room(&mut self, room_id: String) -> Result<EventOutcome> {
        self.require(ConnectionState::Active, "leave-room")?;

        let was_member = self.server.rooms().leave(&room_id, &self.id).await;
        if was_member {
            log::info!("User {} left room: {}", self.id, room_id);
        }
        Ok(EventOutcome::Left {
            room_id,
            was_member,
        })
    }

    /// Relay a message to its room. The sender is a recipient too unless
    /// the relay is configured to exclude it.
    pub async fn send_message(&mut self, message: OutgoingMessage) -> Result<EventOutcome> {
        self.require(ConnectionState::Active, "send-message")?;

        let OutgoingMessage { room_id, message } = message;
        log::debug!("Message in room {} from {}", room_id, self.id);

        let exclude = if self.server.config().exclude_sender {
            Some(self.id.as_str())
        } else {
            None
        };
        let report = self
            .server
            .broadcaster()
            .broadcast(&room_id, message, exclude)
            .await?;

        if !report.is_complete() {
            log::warn!(
                "Message from {} reached {}/{} members of room {} in {:?}",
                self.id,
                report.delivered.len(),
                report.total_recipients(),
                room_id,
                report.duration
            );
        }
        Ok(EventOutcome::Broadcast(report))
    }

    /// Tear the connection down. Membership is cleared before the registry
    /// entry goes away. Safe to call more than once.
    pub async fn disconnect(&mut self) {
        let previous = std::mem::replace(&mut self.state, ConnectionState::Disconnected);
        match previous {
            ConnectionState::Active => {
                let rooms = self.server.rooms().leave_all(&self.id).await;
                self.connection = None;
                match self.server.registry().unregister(&self.id).await {
                    Some(connection) => log::info!(
                        "User disconnected: {} after {}s (left {} rooms)",
                        self.id,
                        connection.connection_duration().as_secs(),
                        rooms.len()
                    ),
                    None => log::warn!(
                        "User disconnected: {} was no longer registered (left {} rooms)",
                        self.id,
                        rooms.len()
                    ),
                }
            }
            ConnectionState::Connecting => {
                log::debug!("Connection {} closed before registration", self.id);
            }
            ConnectionState::Disconnected => {
                log::debug!("Connection {} already disconnected", self.id);
            }
        }
    }

    fn require(&self, expected: ConnectionState, event: &'static str) -> Result<()> {
        if self.state == expected {
            return Ok(());
        }
        log::warn!(
            "Dropping '{}' for connection {} in state {:?}",
            event,
            self.id,
            self.state
        );
        Err(RelayError::InvalidTransition {
            connection_id: self.id.clone(),
            state: self.state,
            event,
        })
    }
}
