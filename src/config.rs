//! Relay configuration module
//! Loads runtime parameters for the relay from `RELAY_*` environment variables

use crate::constants::{
    DEFAULT_DELIVERY_TIMEOUT_MS, DEFAULT_HOST, DEFAULT_IDLE_TIMEOUT_SECS,
    DEFAULT_MAX_DELIVERY_TIMEOUTS, DEFAULT_MAX_FRAME_SIZE, DEFAULT_MAX_MESSAGE_SIZE,
    DEFAULT_OUTBOUND_BUFFER, DEFAULT_PING_INTERVAL_SECS, DEFAULT_PORT, MIN_JWT_SECRET_LEN, WS_PATH,
};
use crate::core::room::EmptyRoomPolicy;
use crate::error::{RelayError, Result};
use std::env;
use std::time::Duration;

/// Relay configuration parameters
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    /// Path segment the WebSocket endpoint is mounted on
    pub ws_path: String,
    /// Capacity of each connection's outbound queue
    pub outbound_buffer: usize,
    /// Upper bound on a single per-member delivery attempt
    pub delivery_timeout: Duration,
    /// Consecutive timed-out deliveries before a member is evicted
    pub max_delivery_timeouts: u32,
    /// Connections with no inbound frame (pongs included) for this long are dropped
    pub idle_timeout: Duration,
    /// How often the relay pings each client
    pub ping_interval: Duration,
    /// Frames above this size get an `error` event
    pub max_message_size: usize,
    /// Frames above this size are refused by the transport and end the connection
    pub max_frame_size: usize,
    /// Leave the sender out of its own broadcasts
    pub exclude_sender: bool,
    pub empty_room_policy: EmptyRoomPolicy,
    /// Require a valid JWT before upgrading to WebSocket
    pub require_auth: bool,
    pub jwt_secret: Option<String>,
    pub enable_tls: bool,
    pub tls_cert_path: Option<String>,
    pub tls_key_path: Option<String>,
}

impl RelayConfig {
    /// Configuration with defaults and no auth, for tests and local tooling
    pub fn for_testing() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            ws_path: WS_PATH.to_string(),
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
            delivery_timeout: Duration::from_millis(DEFAULT_DELIVERY_TIMEOUT_MS),
            max_delivery_timeouts: DEFAULT_MAX_DELIVERY_TIMEOUTS,
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            ping_interval: Duration::from_secs(DEFAULT_PING_INTERVAL_SECS),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            exclude_sender: false,
            empty_room_policy: EmptyRoomPolicy::Reclaim,
            require_auth: false,
            jwt_secret: None,
            enable_tls: false,
            tls_cert_path: None,
            tls_key_path: None,
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let host = env::var("RELAY_HOST").unwrap_or(DEFAULT_HOST.to_string());
        let port = parse_var("RELAY_PORT").unwrap_or(DEFAULT_PORT);
        let ws_path = env::var("RELAY_WS_PATH").unwrap_or(WS_PATH.to_string());

        let outbound_buffer = parse_var("RELAY_OUTBOUND_BUFFER").unwrap_or(DEFAULT_OUTBOUND_BUFFER);
        let delivery_timeout_ms =
            parse_var("RELAY_DELIVERY_TIMEOUT_MS").unwrap_or(DEFAULT_DELIVERY_TIMEOUT_MS);
        let idle_timeout_secs =
            parse_var("RELAY_IDLE_TIMEOUT_SECS").unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS);
        let ping_interval_secs =
            parse_var("RELAY_PING_INTERVAL_SECS").unwrap_or(DEFAULT_PING_INTERVAL_SECS);
        let max_delivery_timeouts =
            parse_var("RELAY_MAX_DELIVERY_TIMEOUTS").unwrap_or(DEFAULT_MAX_DELIVERY_TIMEOUTS);
        let max_message_size =
            parse_var("RELAY_MAX_MESSAGE_SIZE").unwrap_or(DEFAULT_MAX_MESSAGE_SIZE);
        let max_frame_size = parse_var("RELAY_MAX_FRAME_SIZE").unwrap_or(DEFAULT_MAX_FRAME_SIZE);

        let exclude_sender = flag_var("RELAY_EXCLUDE_SENDER");
        let empty_room_policy = if flag_var("RELAY_RETAIN_EMPTY_ROOMS") {
            EmptyRoomPolicy::Retain
        } else {
            EmptyRoomPolicy::Reclaim
        };

        let require_auth = flag_var("RELAY_REQUIRE_AUTH");
        let jwt_secret = env::var("RELAY_JWT_SECRET").ok();

        let enable_tls = flag_var("RELAY_ENABLE_TLS");
        let tls_cert_path = env::var("RELAY_TLS_CERT_PATH").ok();
        let tls_key_path = env::var("RELAY_TLS_KEY_PATH").ok();

        let config = Self {
            host,
            port,
            ws_path,
            outbound_buffer,
            delivery_timeout: Duration::from_millis(delivery_timeout_ms),
            max_delivery_timeouts,
            idle_timeout: Duration::from_secs(idle_timeout_secs),
            ping_interval: Duration::from_secs(ping_interval_secs),
            max_message_size,
            max_frame_size,
            exclude_sender,
            empty_room_policy,
            require_auth,
            jwt_secret,
            enable_tls,
            tls_cert_path,
            tls_key_path,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.outbound_buffer == 0 {
            return Err(RelayError::ConfigError(
                "RELAY_OUTBOUND_BUFFER must be greater than zero".to_string(),
            ));
        }
        if self.delivery_timeout.is_zero() {
            return Err(RelayError::ConfigError(
                "RELAY_DELIVERY_TIMEOUT_MS must be greater than zero".to_string(),
            ));
        }
        if self.idle_timeout.is_zero() {
            return Err(RelayError::ConfigError(
                "RELAY_IDLE_TIMEOUT_SECS must be greater than zero".to_string(),
            ));
        }
        if self.ping_interval.is_zero() || self.ping_interval >= self.idle_timeout {
            return Err(RelayError::ConfigError(
                "RELAY_PING_INTERVAL_SECS must be non-zero and shorter than RELAY_IDLE_TIMEOUT_SECS"
                    .to_string(),
            ));
        }
        if self.max_delivery_timeouts == 0 {
            return Err(RelayError::ConfigError(
                "RELAY_MAX_DELIVERY_TIMEOUTS must be greater than zero".to_string(),
            ));
        }
        if self.max_frame_size < self.max_message_size {
            return Err(RelayError::ConfigError(format!(
                "RELAY_MAX_FRAME_SIZE ({}) must not be below RELAY_MAX_MESSAGE_SIZE ({})",
                self.max_frame_size, self.max_message_size
            )));
        }
        if self.ws_path.is_empty() || self.ws_path.contains('/') {
            return Err(RelayError::ConfigError(format!(
                "RELAY_WS_PATH must be a single path segment, got '{}'",
                self.ws_path
            )));
        }

        if self.require_auth {
            match &self.jwt_secret {
                None => {
                    return Err(RelayError::ConfigError(
                        "RELAY_REQUIRE_AUTH is set but RELAY_JWT_SECRET is missing. \
                         Generate one with: openssl rand -base64 32"
                            .to_string(),
                    ))
                }
                Some(secret) if secret.len() < MIN_JWT_SECRET_LEN => {
                    return Err(RelayError::ConfigError(format!(
                        "JWT secret must be at least {} characters long",
                        MIN_JWT_SECRET_LEN
                    )))
                }
                Some(_) => {}
            }
        }

        if self.enable_tls {
            let (cert_path, key_path) = match (&self.tls_cert_path, &self.tls_key_path) {
                (Some(cert), Some(key)) => (cert, key),
                _ => {
                    return Err(RelayError::ConfigError(
                        "TLS is enabled but RELAY_TLS_CERT_PATH or RELAY_TLS_KEY_PATH is not set"
                            .to_string(),
                    ))
                }
            };
            if !std::path::Path::new(cert_path).exists() {
                return Err(RelayError::ConfigError(format!(
                    "TLS certificate file does not exist: {}",
                    cert_path
                )));
            }
            if !std::path::Path::new(key_path).exists() {
                return Err(RelayError::ConfigError(format!(
                    "TLS private key file does not exist: {}",
                    key_path
                )));
            }
        }

        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

fn flag_var(name: &str) -> bool {
    env::var(name)
        .map(|v| v.to_lowercase() == "true" || v == "1")
        .unwrap_or(false)
}
