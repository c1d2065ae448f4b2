// Fundamental configuration constants
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3030;
pub const WS_PATH: &str = "ws";
pub const HEALTH_PATH: &str = "health";

// Delivery and connection housekeeping
pub const DEFAULT_OUTBOUND_BUFFER: usize = 256;
pub const DEFAULT_DELIVERY_TIMEOUT_MS: u64 = 500;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 90;
pub const DEFAULT_PING_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;
// Hard cap enforced by the WebSocket transport; frames above it end the connection
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;
// Members whose queue stays full this many broadcasts in a row are evicted
pub const DEFAULT_MAX_DELIVERY_TIMEOUTS: u32 = 3;

// JWT secrets shorter than this are rejected
pub const MIN_JWT_SECRET_LEN: usize = 32;
