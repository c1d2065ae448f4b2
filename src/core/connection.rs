//! Live connection state
//! Identity and outbound handle of one WebSocket client

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;
use warp::ws::Message;

/// Write half of a connection as seen by the rest of the relay.
/// Bounded so a stalled client applies backpressure instead of growing memory.
pub type OutboundSender = mpsc::Sender<Message>;
pub type OutboundReceiver = mpsc::Receiver<Message>;

/// Create the outbound queue for a new connection
pub fn outbound_channel(capacity: usize) -> (OutboundSender, OutboundReceiver) {
    mpsc::channel(capacity)
}

/// Generate a fresh connection identifier
pub fn new_connection_id() -> String {
    Uuid::new_v4().to_string()
}

/// Represents the state of a single WebSocket connection
#[derive(Debug)]
pub struct Connection {
    pub id: String,
    pub sender: OutboundSender,
    /// Subject of the verified token, if the channel is authenticated
    pub user_id: Option<String>,
    pub connected_at: DateTime<Utc>,
    // Broadcasts in a row that timed out against this connection's queue
    consecutive_timeouts: AtomicU32,
    evicted: AtomicBool,
    evict_signal: Notify,
}

impl Connection {
    pub fn new(id: String, sender: OutboundSender) -> Self {
        Self {
            id,
            sender,
            user_id: None,
            connected_at: Utc::now(),
            consecutive_timeouts: AtomicU32::new(0),
            evicted: AtomicBool::new(false),
            evict_signal: Notify::new(),
        }
    }

    pub fn with_user(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }

    /// True once the receiving side of the outbound queue is gone
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Calculate the connection duration
    pub fn connection_duration(&self) -> Duration {
        (Utc::now() - self.connected_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Count one more timed-out delivery; returns the running streak
    pub fn record_timeout(&self) -> u32 {
        self.consecutive_timeouts.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn reset_timeouts(&self) {
        self.consecutive_timeouts.store(0, Ordering::SeqCst);
    }

    pub fn consecutive_timeouts(&self) -> u32 {
        self.consecutive_timeouts.load(Ordering::SeqCst)
    }

    /// Flag the connection for removal and wake its owning task.
    /// Returns false if it was already flagged.
    pub fn mark_evicted(&self) -> bool {
        let first = !self.evicted.swap(true, Ordering::SeqCst);
        if first {
            // notify_one stores a permit, so a task that is not waiting yet still sees it
            self.evict_signal.notify_one();
        }
        first
    }

    pub fn is_evicted(&self) -> bool {
        self.evicted.load(Ordering::SeqCst)
    }

    /// Resolves once the connection has been evicted
    pub async fn evicted(&self) {
        if self.is_evicted() {
            return;
        }
        self.evict_signal.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_ids_are_unique() {
        assert_ne!(new_connection_id(), new_connection_id());
    }

    #[test]
    fn test_closed_when_receiver_dropped() {
        let (tx, rx) = outbound_channel(4);
        let conn = Connection::new("c1".to_string(), tx).with_user(Some("42".to_string()));
        assert!(!conn.is_closed());
        assert_eq!(conn.user_id.as_deref(), Some("42"));

        drop(rx);
        assert!(conn.is_closed());
    }

    #[test]
    fn test_timeout_streak_resets() {
        let (tx, _rx) = outbound_channel(4);
        let conn = Connection::new("c1".to_string(), tx);
        assert_eq!(conn.record_timeout(), 1);
        assert_eq!(conn.record_timeout(), 2);
        conn.reset_timeouts();
        assert_eq!(conn.consecutive_timeouts(), 0);
        assert_eq!(conn.record_timeout(), 1);
    }

    #[tokio::test]
    async fn test_eviction_wakes_owner() {
        let (tx, _rx) = outbound_channel(4);
        let conn = std::sync::Arc::new(Connection::new("c1".to_string(), tx));

        let waiter = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.evicted().await })
        };
        assert!(conn.mark_evicted());
        assert!(!conn.mark_evicted());
        assert!(conn.is_evicted());

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("owner was not woken")
            .unwrap();
        // Already evicted: resolves immediately
        tokio::time::timeout(Duration::from_millis(100), conn.evicted())
            .await
            .unwrap();
    }

    #[test]
    fn test_connection_duration_is_measured_from_connect() {
        let (tx, _rx) = outbound_channel(4);
        let mut conn = Connection::new("c1".to_string(), tx);
        conn.connected_at = Utc::now() - chrono::Duration::seconds(5);
        assert!(conn.connection_duration() >= Duration::from_secs(5));
    }
}
