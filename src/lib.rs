//! chat-relay - a room-based real-time message relay over WebSocket
//!
//! Connections join named rooms and every message sent to a room is
//! relayed to all of its current members.

pub mod auth;
pub mod config;
pub mod constants;
pub mod core;
pub mod error;
pub mod handlers;

// Re-export main components
pub use config::RelayConfig;
pub use constants::*;
pub use error::{RelayError, Result};
