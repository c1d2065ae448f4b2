//! Authentication of WebSocket upgrade requests
//!
//! Tokens are read from headers only, never from the URL.

use warp::http::HeaderMap;

use crate::auth::token::extract_bearer_token;
use crate::core::server::RelayServer;
use crate::error::{RelayError, Result};

// Longer values are rejected before any signature work
const MAX_TOKEN_LEN: usize = 1000;

/// Extract JWT token from WebSocket subprotocol header.
/// Format: "bearer.{jwt_token}" or "token.{jwt_token}"
pub fn extract_token_from_subprotocol(headers: &HeaderMap) -> Option<String> {
    let protocols = headers.get("sec-websocket-protocol")?.to_str().ok()?;
    protocols.split(',').map(str::trim).find_map(|protocol| {
        protocol
            .strip_prefix("bearer.")
            .or_else(|| protocol.strip_prefix("token."))
            .map(str::to_string)
    })
}

/// Token lookup in priority order: Authorization, subprotocol, X-Auth-Token
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(extract_bearer_token)
    {
        log::debug!("Token extracted from Authorization header");
        return Some(token);
    }

    if let Some(token) = extract_token_from_subprotocol(headers) {
        log::debug!("Token extracted from WebSocket subprotocol");
        return Some(token);
    }

    if let Some(token) = headers.get("x-auth-token").and_then(|v| v.to_str().ok()) {
        log::debug!("Token extracted from X-Auth-Token header");
        return Some(token.to_string());
    }

    None
}

/// Resolve the identity of an upgrade request.
///
/// Returns `Ok(None)` for anonymous connections when the channel is open,
/// the token subject when a valid token is presented, and an error when a
/// token is invalid or missing while auth is required.
pub fn authenticate(headers: &HeaderMap, server: &RelayServer) -> Result<Option<String>> {
    let required = server.config().require_auth;

    let token = match extract_token(headers) {
        Some(token) => token,
        None if required => {
            log::warn!("Rejected upgrade without credentials");
            return Err(RelayError::Unauthorized);
        }
        None => return Ok(None),
    };

    let Some(manager) = server.token_manager() else {
        // No secret configured: tokens cannot be checked, so they carry no identity
        log::debug!("Ignoring token on unauthenticated relay");
        return Ok(None);
    };

    if token.len() > MAX_TOKEN_LEN || token.chars().any(|c| c.is_control()) {
        return Err(RelayError::AuthError("Malformed token".to_string()));
    }

    match manager.validate_and_get_user_id(&token) {
        Ok(user_id) => Ok(Some(user_id)),
        Err(e) => {
            log::warn!("Rejected upgrade: {}", e);
            Err(e)
        }
    }
}
