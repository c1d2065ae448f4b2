//! Wire events exchanged over the real-time channel
//!
//! Every text frame is a JSON envelope `{"event": "...", "data": ...}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Client-to-server events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Join a room; payload is the bare room id
    JoinRoom(String),

    /// Leave a room; payload is the bare room id
    LeaveRoom(String),

    /// Send an opaque message to every member of a room
    SendMessage(OutgoingMessage),
}

impl ClientEvent {
    /// Event name as it appears on the wire
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::JoinRoom(_) => "join-room",
            ClientEvent::LeaveRoom(_) => "leave-room",
            ClientEvent::SendMessage(_) => "send-message",
        }
    }

    pub fn parse(text: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Payload of a `send-message` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub room_id: String,
    pub message: Value,
}

/// Server-to-client events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Sent once after the connection is registered
    #[serde(rename_all = "camelCase")]
    Connected { client_id: String },

    /// A message relayed from a room; payload is the original message
    ReceiveMessage(Value),

    /// A frame could not be processed
    Error { code: String, message: String },
}

impl ServerEvent {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        ServerEvent::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
