use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{RelayError, Result};

/// JWT Claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Expiration time (as UTC timestamp)
    pub exp: usize,
    /// Issued at (as UTC timestamp)
    pub iat: usize,
    /// Not before (as UTC timestamp)
    pub nbf: usize,
}

fn now_secs() -> usize {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as usize)
        .unwrap_or_default()
}

impl Claims {
    /// Creates claims valid for 24 hours
    pub fn new(user_id: String) -> Self {
        Self::with_expiration(user_id, 24)
    }

    /// Creates claims with custom expiration
    pub fn with_expiration(user_id: String, hours: usize) -> Self {
        let now = now_secs();
        Self {
            sub: user_id,
            exp: now + hours * 3600,
            iat: now,
            nbf: now,
        }
    }

    /// Check if the token is expired
    pub fn is_expired(&self) -> bool {
        now_secs() > self.exp
    }
}

/// Manages JWT token operations
pub struct TokenManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenManager {
    /// Creates a new token manager with a secret
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
        }
    }

    /// Generates a JWT token for the given claims
    pub fn generate_token(&self, claims: &Claims) -> Result<String> {
        encode(&Header::default(), claims, &self.encoding_key)
            .map_err(|e| RelayError::AuthError(format!("Failed to generate token: {}", e)))
    }

    /// Validates and decodes a JWT token
    pub fn validate_token(&self, token: &str) -> Result<TokenData<Claims>> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| RelayError::AuthError(format!("Invalid token: {}", e)))
    }

    /// Validates a token and returns the user ID if valid
    pub fn validate_and_get_user_id(&self, token: &str) -> Result<String> {
        let claims = self.validate_token(token)?.claims;

        if claims.is_expired() {
            return Err(RelayError::AuthError("Token expired".to_string()));
        }
        if claims.sub.is_empty() {
            return Err(RelayError::AuthError("Token has no subject".to_string()));
        }

        Ok(claims.sub)
    }
}

/// Extracts bearer token from Authorization header
pub fn extract_bearer_token(auth_header: &str) -> Option<String> {
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "unit-test-signing-key-0123456789abcdef";

    #[test]
    fn test_roundtrip_user_id() {
        let manager = TokenManager::new(SECRET);
        let token = manager.generate_token(&Claims::new("user123".to_string())).unwrap();
        assert_eq!(manager.validate_and_get_user_id(&token).unwrap(), "user123");
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = TokenManager::new(SECRET)
            .generate_token(&Claims::new("user123".to_string()))
            .unwrap();
        let other = TokenManager::new("another-signing-key-0123456789abcdef");
        assert!(other.validate_and_get_user_id(&token).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let manager = TokenManager::new(SECRET);
        let mut claims = Claims::new("user123".to_string());
        claims.exp = claims.iat.saturating_sub(3600);
        let token = manager.generate_token(&claims).unwrap();
        assert!(manager.validate_and_get_user_id(&token).is_err());
    }

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(extract_bearer_token("Bearer abc"), Some("abc".to_string()));
        assert_eq!(extract_bearer_token("Basic abc"), None);
        assert_eq!(extract_bearer_token("Bearer "), None);
    }
}
