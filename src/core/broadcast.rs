//! Room fan-out
//!
//! Resolves the members of a room, then pushes one serialized payload into
//! each member's outbound queue. Every push is bounded by a timeout so a
//! stalled receiver costs the sender at most `delivery_timeout`. A member
//! that times out `max_consecutive_timeouts` broadcasts in a row is evicted
//! and skipped from then on.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use tokio::sync::mpsc::error::SendTimeoutError;
use warp::ws::Message as WsMessage;

use crate::core::message::ServerEvent;
use crate::core::registry::ConnectionRegistry;
use crate::core::room::RoomManager;
use crate::error::{RelayError, Result};

/// Why a single member did not receive a broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryFailure {
    /// Member was listed in the room but is no longer registered
    HandleGone,
    /// The connection's outbound queue is closed
    ChannelClosed,
    /// The outbound queue stayed full for the whole delivery timeout
    TimedOut,
    /// The member was evicted for timing out repeatedly and is being torn down
    Evicted,
}

impl fmt::Display for DeliveryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HandleGone => write!(f, "connection no longer registered"),
            Self::ChannelClosed => write!(f, "outbound channel closed"),
            Self::TimedOut => write!(f, "delivery timed out"),
            Self::Evicted => write!(f, "connection evicted"),
        }
    }
}

/// Outcome of one broadcast
#[derive(Debug, Default, Clone)]
pub struct DeliveryReport {
    pub room_id: String,
    pub delivered: Vec<String>,
    pub failed: Vec<(String, DeliveryFailure)>,
    pub duration: Duration,
}

impl DeliveryReport {
    fn for_room(room_id: &str) -> Self {
        Self {
            room_id: room_id.to_string(),
            ..Self::default()
        }
    }

    pub fn total_recipients(&self) -> usize {
        self.delivered.len() + self.failed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total_recipients() == 0
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn success_rate(&self) -> f64 {
        if self.is_empty() {
            1.0
        } else {
            self.delivered.len() as f64 / self.total_recipients() as f64
        }
    }

    /// Turn the first recorded failure into an error, for callers that
    /// treat partial delivery as fatal
    pub fn ensure_complete(&self) -> Result<()> {
        match self.failed.first() {
            Some((connection_id, reason)) => Err(RelayError::DeliveryFailure {
                connection_id: connection_id.clone(),
                reason: *reason,
            }),
            None => Ok(()),
        }
    }

    pub fn failure_for(&self, connection_id: &str) -> Option<DeliveryFailure> {
        self.failed
            .iter()
            .find(|(id, _)| id == connection_id)
            .map(|(_, reason)| *reason)
    }
}

/// Delivers room messages to every resolvable member
pub struct MessageBroadcaster {
    registry: Arc<ConnectionRegistry>,
    rooms: Arc<RoomManager>,
    delivery_timeout: Duration,
    max_consecutive_timeouts: u32,
}

impl MessageBroadcaster {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        rooms: Arc<RoomManager>,
        delivery_timeout: Duration,
        max_consecutive_timeouts: u32,
    ) -> Self {
        Self {
            registry,
            rooms,
            delivery_timeout,
            max_consecutive_timeouts: max_consecutive_timeouts.max(1),
        }
    }

    pub fn delivery_timeout(&self) -> Duration {
        self.delivery_timeout
    }

    /// Relay an opaque payload to a room as a `receive-message` event
    pub async fn broadcast(
        &self,
        room_id: &str,
        message: serde_json::Value,
        exclude: Option<&str>,
    ) -> Result<DeliveryReport> {
        let payload = ServerEvent::ReceiveMessage(message).to_json()?;
        Ok(self.broadcast_text(room_id, &payload, exclude).await)
    }

    /// Fan a pre-serialized frame out to the members of a room.
    /// Per-member failures are recorded in the report, never returned.
    pub async fn broadcast_text(
        &self,
        room_id: &str,
        payload: &str,
        exclude: Option<&str>,
    ) -> DeliveryReport {
        let start = Instant::now();
        let mut report = DeliveryReport::for_room(room_id);

        let members = self.rooms.members_of(room_id).await;
        if members.is_empty() {
            return report;
        }

        let frame = WsMessage::text(payload);
        let mut attempts = Vec::with_capacity(members.len());

        for member_id in members {
            if exclude == Some(member_id.as_str()) {
                continue;
            }
            let Some(connection) = self.registry.get(&member_id).await else {
                report.failed.push((member_id, DeliveryFailure::HandleGone));
                continue;
            };
            if connection.is_evicted() {
                report.failed.push((member_id, DeliveryFailure::Evicted));
                continue;
            }

            let frame = frame.clone();
            let timeout = self.delivery_timeout;
            attempts.push(async move {
                let outcome = match connection.sender.send_timeout(frame, timeout).await {
                    Ok(()) => Ok(()),
                    Err(SendTimeoutError::Timeout(_)) => Err(DeliveryFailure::TimedOut),
                    Err(SendTimeoutError::Closed(_)) => Err(DeliveryFailure::ChannelClosed),
                };
                (connection, outcome)
            });
        }

        for (connection, outcome) in join_all(attempts).await {
            let member_id = connection.id.clone();
            match outcome {
                Ok(()) => {
                    connection.reset_timeouts();
                    log::trace!("Delivered to {} in room {}", member_id, room_id);
                    report.delivered.push(member_id);
                }
                Err(DeliveryFailure::TimedOut) => {
                    let streak = connection.record_timeout();
                    if streak >= self.max_consecutive_timeouts && connection.mark_evicted() {
                        log::warn!(
                            "Evicting {} after {} timed-out deliveries in a row",
                            member_id,
                            streak
                        );
                    } else {
                        log::warn!(
                            "Failed to deliver to {} in room {}: {} ({} in a row)",
                            member_id,
                            room_id,
                            DeliveryFailure::TimedOut,
                            streak
                        );
                    }
                    report.failed.push((member_id, DeliveryFailure::TimedOut));
                }
                Err(reason) => {
                    log::warn!(
                        "Failed to deliver to {} in room {}: {}",
                        member_id,
                        room_id,
                        reason
                    );
                    report.failed.push((member_id, reason));
                }
            }
        }

        report.duration = start.elapsed();
        log::debug!(
            "Broadcast to room {}: {}/{} delivered in {:?}",
            room_id,
            report.delivered.len(),
            report.total_recipients(),
            report.duration
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::connection::{outbound_channel, Connection};
    use serde_json::json;

    fn setup(timeout: Duration) -> (Arc<ConnectionRegistry>, Arc<RoomManager>, MessageBroadcaster) {
        setup_with_limit(timeout, 3)
    }

    fn setup_with_limit(
        timeout: Duration,
        max_timeouts: u32,
    ) -> (Arc<ConnectionRegistry>, Arc<RoomManager>, MessageBroadcaster) {
        let registry = Arc::new(ConnectionRegistry::new());
        let rooms = Arc::new(RoomManager::new());
        let broadcaster =
            MessageBroadcaster::new(registry.clone(), rooms.clone(), timeout, max_timeouts);
        (registry, rooms, broadcaster)
    }

    #[tokio::test]
    async fn test_empty_room_yields_empty_report() {
        let (_, _, broadcaster) = setup(Duration::from_millis(50));
        let report = broadcaster.broadcast("nobody", json!("hi"), None).await.unwrap();
        assert!(report.is_empty());
        assert!(report.ensure_complete().is_ok());
        assert_eq!(report.room_id, "nobody");
    }

    #[tokio::test]
    async fn test_stale_member_is_reported_as_gone() {
        let (registry, rooms, broadcaster) = setup(Duration::from_millis(50));
        let (tx, mut rx) = outbound_channel(4);
        registry
            .register(Connection::new("a".to_string(), tx))
            .await
            .unwrap();
        rooms.join("r1", "a").await;
        // Membership without a registry entry
        rooms.join("r1", "ghost").await;

        let report = broadcaster.broadcast("r1", json!("hi"), None).await.unwrap();
        assert_eq!(report.delivered, vec!["a".to_string()]);
        assert_eq!(report.failure_for("ghost"), Some(DeliveryFailure::HandleGone));
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_closed_channel_does_not_abort_fanout() {
        let (registry, rooms, broadcaster) = setup(Duration::from_millis(50));
        let (tx_a, rx_a) = outbound_channel(4);
        let (tx_b, mut rx_b) = outbound_channel(4);
        registry.register(Connection::new("a".to_string(), tx_a)).await.unwrap();
        registry.register(Connection::new("b".to_string(), tx_b)).await.unwrap();
        rooms.join("r1", "a").await;
        rooms.join("r1", "b").await;
        drop(rx_a);

        let report = broadcaster.broadcast("r1", json!("hi"), None).await.unwrap();
        assert_eq!(report.failure_for("a"), Some(DeliveryFailure::ChannelClosed));
        assert_eq!(report.delivered, vec!["b".to_string()]);
        assert!((report.success_rate() - 0.5).abs() < f64::EPSILON);
        assert!(matches!(
            report.ensure_complete(),
            Err(RelayError::DeliveryFailure { reason: DeliveryFailure::ChannelClosed, .. })
        ));
        assert!(rx_b.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_exclude_skips_member() {
        let (registry, rooms, broadcaster) = setup(Duration::from_millis(50));
        let (tx_a, _rx_a) = outbound_channel(4);
        let (tx_b, _rx_b) = outbound_channel(4);
        registry.register(Connection::new("a".to_string(), tx_a)).await.unwrap();
        registry.register(Connection::new("b".to_string(), tx_b)).await.unwrap();
        rooms.join("r1", "a").await;
        rooms.join("r1", "b").await;

        let report = broadcaster.broadcast("r1", json!("hi"), Some("a")).await.unwrap();
        assert_eq!(report.delivered, vec!["b".to_string()]);
        assert_eq!(report.total_recipients(), 1);
    }

    #[tokio::test]
    async fn test_persistently_slow_member_is_evicted() {
        let (registry, rooms, broadcaster) = setup_with_limit(Duration::from_millis(20), 2);
        // Capacity 1 and never drained: the first frame fills the queue
        let (tx_slow, _rx_slow) = outbound_channel(1);
        let (tx_fast, mut rx_fast) = outbound_channel(16);
        let slow = registry
            .register(Connection::new("slow".to_string(), tx_slow))
            .await
            .unwrap();
        registry.register(Connection::new("fast".to_string(), tx_fast)).await.unwrap();
        rooms.join("r1", "slow").await;
        rooms.join("r1", "fast").await;

        let first = broadcaster.broadcast("r1", json!(1), None).await.unwrap();
        assert!(first.is_complete());

        let second = broadcaster.broadcast("r1", json!(2), None).await.unwrap();
        assert_eq!(second.failure_for("slow"), Some(DeliveryFailure::TimedOut));
        assert!(!slow.is_evicted());

        let third = broadcaster.broadcast("r1", json!(3), None).await.unwrap();
        assert_eq!(third.failure_for("slow"), Some(DeliveryFailure::TimedOut));
        assert!(slow.is_evicted());
        tokio::time::timeout(Duration::from_secs(1), slow.evicted())
            .await
            .unwrap();

        // Evicted members are skipped without waiting on their queue
        let fourth = broadcaster.broadcast("r1", json!(4), None).await.unwrap();
        assert_eq!(fourth.failure_for("slow"), Some(DeliveryFailure::Evicted));
        assert!(fourth.duration < Duration::from_millis(20));
        assert_eq!(fourth.delivered, vec!["fast".to_string()]);

        for _ in 0..4 {
            assert!(rx_fast.recv().await.is_some());
        }
    }

    #[tokio::test]
    async fn test_successful_delivery_resets_timeout_streak() {
        let (registry, rooms, broadcaster) = setup_with_limit(Duration::from_millis(20), 2);
        let (tx, mut rx) = outbound_channel(1);
        let conn = registry
            .register(Connection::new("a".to_string(), tx))
            .await
            .unwrap();
        rooms.join("r1", "a").await;

        broadcaster.broadcast("r1", json!(1), None).await.unwrap();
        let report = broadcaster.broadcast("r1", json!(2), None).await.unwrap();
        assert_eq!(report.failure_for("a"), Some(DeliveryFailure::TimedOut));
        assert_eq!(conn.consecutive_timeouts(), 1);

        // Drain, then deliver successfully
        assert!(rx.recv().await.is_some());
        let report = broadcaster.broadcast("r1", json!(3), None).await.unwrap();
        assert!(report.is_complete());
        assert_eq!(conn.consecutive_timeouts(), 0);

        let report = broadcaster.broadcast("r1", json!(4), None).await.unwrap();
        assert_eq!(report.failure_for("a"), Some(DeliveryFailure::TimedOut));
        assert!(!conn.is_evicted());
    }
}
