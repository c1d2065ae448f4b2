//! Core functionality of the relay

pub mod broadcast;
pub mod connection;
pub mod lifecycle;
pub mod message;
pub mod registry;
pub mod room;
pub mod server;

// Re-export main components for convenience
pub use broadcast::{DeliveryFailure, DeliveryReport, MessageBroadcaster};
pub use connection::{Connection, OutboundSender};
pub use lifecycle::{ConnectionLifecycle, ConnectionState, EventOutcome};
pub use message::{ClientEvent, OutgoingMessage, ServerEvent};
pub use registry::ConnectionRegistry;
pub use room::{EmptyRoomPolicy, Room, RoomManager};
pub use server::{RelayServer, RelayStats, SharedRelayServer};
