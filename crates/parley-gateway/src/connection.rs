use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade, close_code};
use axum::response::Response;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite;
use tracing::{debug, info, warn};

use parley_types::events::ClientEvent;
use parley_types::models::ConnectionId;

use crate::hub::Hub;

/// Longest slice of a malformed frame echoed into the log.
const LOGGED_FRAME_CHARS: usize = 200;

/// How long the send side gets to flush a Close frame once reading stops.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Accept a WebSocket upgrade with read limits taken from the hub's config.
pub fn upgrade(ws: WebSocketUpgrade, hub: Hub) -> Response {
    let limit = hub.config().socket_limit_bytes();
    ws.max_message_size(limit)
        .max_frame_size(limit)
        .on_upgrade(move |socket| handle_connection(socket, hub))
}

/// Drive one WebSocket for its whole life: register with the hub, pump
/// client events in and hub frames out, then report the disconnect.
///
/// A Ping goes out every heartbeat interval. If 2 consecutive Pongs are
/// missed the connection is dropped. A read error is answered with a Close
/// frame before the socket is torn down.
pub async fn handle_connection(socket: WebSocket, hub: Hub) {
    let connection_id = ConnectionId::new();
    let heartbeat_interval = hub.config().heartbeat_interval;
    let (mut sender, mut receiver) = socket.split();

    let mut outbound_rx = match hub.connect(connection_id).await {
        Ok(rx) => rx,
        Err(e) => {
            warn!("refusing connection {}: {}", connection_id, e);
            return;
        }
    };

    info!("{} connected", connection_id);

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();
    let (close_tx, mut close_rx) = oneshot::channel::<CloseFrame>();

    // Hub frames -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(heartbeat_interval);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                close = &mut close_rx => {
                    // Err means the reader ended cleanly and wants nothing sent.
                    if let Ok(frame) = close {
                        let _ = sender.send(Message::Close(Some(frame))).await;
                    }
                    break;
                }
                frame = outbound_rx.recv() => {
                    let Some(frame) = frame else {
                        // The hub dropped us; say goodbye properly.
                        let _ = sender.send(Message::Close(None)).await;
                        break;
                    };
                    if sender.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("{} missed {} pongs, dropping connection", connection_id, missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Client -> hub
    let hub_recv = hub.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    let frame = close_frame_for(e);
                    warn!("{} read failed, closing with {}: {}", connection_id, frame.code, frame.reason);
                    let _ = close_tx.send(frame);
                    return;
                }
            };
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientEvent>(text.as_str()) {
                    Ok(event) => {
                        if hub_recv.dispatch(connection_id, event).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let raw: String = text.as_str().chars().take(LOGGED_FRAME_CHARS).collect();
                        warn!("{} bad event: {} -- raw: {}", connection_id, e, raw);
                    }
                },
                Message::Binary(data) => {
                    debug!("{} sent a {} byte binary frame, ignoring", connection_id, data.len());
                }
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => {
            // Give a pending Close frame a moment to go out.
            if tokio::time::timeout(CLOSE_GRACE, &mut send_task).await.is_err() {
                send_task.abort();
            }
        }
    }

    hub.disconnect(connection_id).await;
    info!("{} disconnected", connection_id);
}

/// Pick the close code for a failed read. Oversize messages get 1009, any
/// other transport failure 1002.
fn close_frame_for(err: axum::Error) -> CloseFrame {
    let inner = err.into_inner();
    match inner.downcast_ref::<tungstenite::Error>() {
        Some(tungstenite::Error::Capacity(_)) => CloseFrame {
            code: close_code::SIZE,
            reason: Utf8Bytes::from("message too big"),
        },
        _ => CloseFrame {
            code: close_code::PROTOCOL,
            reason: Utf8Bytes::from("protocol error"),
        },
    }
}

#[cfg(test)]
mod tests {
    use tungstenite::error::{CapacityError, ProtocolError};

    use super::*;

    #[test]
    fn oversize_read_closes_with_size_code() {
        let err = axum::Error::new(tungstenite::Error::Capacity(CapacityError::MessageTooLong {
            size: 200_000,
            max_size: 100_000,
        }));
        let frame = close_frame_for(err);
        assert_eq!(frame.code, close_code::SIZE);
        assert_eq!(frame.reason.as_str(), "message too big");
    }

    #[test]
    fn other_read_errors_close_with_protocol_code() {
        let err = axum::Error::new(tungstenite::Error::Protocol(ProtocolError::NonZeroReservedBits));
        assert_eq!(close_frame_for(err).code, close_code::PROTOCOL);
    }
}
