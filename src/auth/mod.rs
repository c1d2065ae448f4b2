//! Token verification for the real-time channel

pub mod token;

// Re-export main components
pub use token::{extract_bearer_token, Claims, TokenManager};
