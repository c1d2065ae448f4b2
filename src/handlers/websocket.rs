use futures_util::sink::SinkExt;
use futures_util::stream::StreamExt;
use log::{debug, error, info, warn};
use tokio::time::{interval, Instant, MissedTickBehavior};
use warp::ws::{Message, WebSocket};

use crate::core::connection::{new_connection_id, outbound_channel, OutboundSender};
use crate::core::lifecycle::ConnectionLifecycle;
use crate::core::message::{ClientEvent, ServerEvent};
use crate::core::server::SharedRelayServer;

// Handle a WebSocket connection for its whole lifetime
pub async fn handle_ws_client(ws: WebSocket, server: SharedRelayServer, user_id: Option<String>) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (tx, mut rx) = outbound_channel(server.config().outbound_buffer);

    // Forward messages from our channel to the WebSocket
    tokio::task::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Err(e) = ws_tx.send(message).await {
                debug!("Failed to send WebSocket message: {}", e);
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    let client_id = new_connection_id();
    let mut lifecycle = ConnectionLifecycle::new(server.clone(), client_id.clone());

    if lifecycle.accept(tx.clone(), user_id).await.is_err() {
        // Dropping the only sender closes the socket
        return;
    }

    send_event(&tx, &ServerEvent::Connected { client_id }, &server).await;
    debug!("Current connections: {}", server.connection_count().await);

    let Some(connection) = lifecycle.connection() else {
        lifecycle.disconnect().await;
        return;
    };

    let idle_timeout = server.config().idle_timeout;
    let mut heartbeat = interval(server.config().ping_interval);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    heartbeat.tick().await;
    // Any inbound frame counts, including pongs to our pings
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            next = ws_rx.next() => match next {
                Some(Ok(msg)) => {
                    last_seen = Instant::now();
                    if msg.is_close() {
                        break;
                    }
                    // Pings are answered by the transport, binary frames carry no events
                    if msg.is_text() {
                        process_message(msg, &mut lifecycle, &tx, &server).await;
                    }
                }
                Some(Err(e)) => {
                    warn!("WebSocket error on {}: {}", lifecycle.id(), e);
                    break;
                }
                None => break,
            },
            _ = heartbeat.tick() => {
                if last_seen.elapsed() >= idle_timeout {
                    info!(
                        "Closing {}: no frames or pongs for {:?}",
                        lifecycle.id(),
                        idle_timeout
                    );
                    break;
                }
                // A full queue already means the client is behind; skip this ping
                if let Err(e) = tx.try_send(Message::ping(Vec::new())) {
                    debug!("Ping to {} not queued: {}", lifecycle.id(), e);
                }
            }
            _ = connection.evicted() => {
                info!("Closing {}: evicted for repeated delivery timeouts", lifecycle.id());
                break;
            }
        }
    }
    drop(connection);

    lifecycle.disconnect().await;
    debug!("Current connections: {}", server.connection_count().await);
}

// Decode one text frame and hand it to the lifecycle
async fn process_message(
    msg: Message,
    lifecycle: &mut ConnectionLifecycle,
    tx: &OutboundSender,
    server: &SharedRelayServer,
) {
    let Ok(text) = msg.to_str() else {
        warn!("Failed to extract text from message");
        return;
    };

    let max_size = server.config().max_message_size;
    if text.len() > max_size {
        warn!(
            "Dropping {} byte frame from {} (limit {})",
            text.len(),
            lifecycle.id(),
            max_size
        );
        let reply = ServerEvent::error(
            "message_too_large",
            format!("Frames are limited to {} bytes", max_size),
        );
        send_event(tx, &reply, server).await;
        return;
    }

    let event = match ClientEvent::parse(text) {
        Ok(event) => event,
        Err(e) => {
            warn!("Failed to parse event from {}: {}", lifecycle.id(), e);
            send_event(tx, &ServerEvent::error("invalid_event", e.to_string()), server).await;
            return;
        }
    };

    // Failures stay inside the relay; the lifecycle has already logged them
    if let Err(e) = lifecycle.handle(event).await {
        debug!("Event from {} not applied: {}", lifecycle.id(), e);
    }
}

// Push a control event to this connection only
async fn send_event(tx: &OutboundSender, event: &ServerEvent, server: &SharedRelayServer) {
    let text = match event.to_json() {
        Ok(text) => text,
        Err(e) => {
            error!("Failed to serialize server event: {}", e);
            return;
        }
    };
    let timeout = server.broadcaster().delivery_timeout();
    if let Err(e) = tx.send_timeout(Message::text(text), timeout).await {
        warn!("Failed to send control event: {}", e);
    }
}
