use std::error::Error;
use std::fmt;

use crate::core::broadcast::DeliveryFailure;
use crate::core::lifecycle::ConnectionState;

#[derive(Debug)]
pub enum RelayError {
    // Registry errors
    DuplicateConnection(String),
    NotFound(String),

    // Delivery errors
    DeliveryFailure {
        connection_id: String,
        reason: DeliveryFailure,
    },

    // Lifecycle errors
    InvalidTransition {
        connection_id: String,
        state: ConnectionState,
        event: &'static str,
    },

    // Messages errors
    MessageParseError(String),

    // Auth errors
    AuthError(String),
    Unauthorized,

    // Configuration errors
    ConfigError(String),
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateConnection(id) => write!(f, "Connection already registered: {}", id),
            Self::NotFound(id) => write!(f, "Connection not found: {}", id),
            Self::DeliveryFailure {
                connection_id,
                reason,
            } => write!(f, "Delivery to {} failed: {}", connection_id, reason),
            Self::InvalidTransition {
                connection_id,
                state,
                event,
            } => write!(
                f,
                "Event '{}' not valid for connection {} in state {:?}",
                event, connection_id, state
            ),
            Self::MessageParseError(msg) => write!(f, "Message parse error: {}", msg),
            Self::AuthError(msg) => write!(f, "Authentication error: {}", msg),
            Self::Unauthorized => write!(f, "Unauthorized access"),
            Self::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl Error for RelayError {}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::MessageParseError(err.to_string())
    }
}

// Lets the error travel through warp rejections
impl warp::reject::Reject for RelayError {}

// Generic result type for the relay
pub type Result<T> = std::result::Result<T, RelayError>;
