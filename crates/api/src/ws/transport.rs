//! [`Transport`] over a WebSocket connection.
//!
//! Outbound stream messages are written as JSON text frames. While the
//! session waits for events the transport reads inbound frames to notice the
//! peer leaving, and sends a Ping every [`HEARTBEAT_INTERVAL`] so half-open
//! connections are detected by a failed write.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use bujo_events::{StreamMessage, Transport, TransportError};
use futures::stream::{SplitSink, SplitStream};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::time::{Interval, MissedTickBehavior};

/// Interval between heartbeat pings.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

pub struct WsTransport<Tx, Rx> {
    tx: Tx,
    rx: Rx,
    heartbeat: Interval,
}

impl WsTransport<SplitSink<WebSocket, Message>, SplitStream<WebSocket>> {
    pub fn from_socket(socket: WebSocket) -> Self {
        let (tx, rx) = socket.split();
        Self::new(tx, rx, HEARTBEAT_INTERVAL)
    }
}

impl<Tx, Rx> WsTransport<Tx, Rx> {
    pub fn new(tx: Tx, rx: Rx, heartbeat: Duration) -> Self {
        let mut heartbeat =
            tokio::time::interval_at(tokio::time::Instant::now() + heartbeat, heartbeat);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { tx, rx, heartbeat }
    }
}

impl<Tx, Rx> WsTransport<Tx, Rx>
where
    Tx: Sink<Message> + Unpin,
    Tx::Error: fmt::Display,
{
    /// Send a Close frame with `code` and flush. Errors are logged; the peer
    /// may already be gone.
    pub async fn close(mut self, code: u16, reason: &'static str) {
        let frame = axum::extract::ws::CloseFrame {
            code,
            reason: reason.into(),
        };
        if let Err(e) = self.tx.send(Message::Close(Some(frame))).await {
            tracing::debug!(error = %e, "WebSocket close frame not sent");
        }
        if let Err(e) = self.tx.close().await {
            tracing::debug!(error = %e, "WebSocket sink close failed");
        }
    }
}

#[async_trait]
impl<Tx, Rx, E> Transport for WsTransport<Tx, Rx>
where
    Tx: Sink<Message> + Unpin + Send,
    Tx::Error: fmt::Display + Send,
    Rx: Stream<Item = Result<Message, E>> + Unpin + Send,
    E: fmt::Display + Send,
{
    async fn send(&mut self, message: StreamMessage) -> Result<(), TransportError> {
        let text = serde_json::to_string(&message)?;
        self.tx
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn closed(&mut self) {
        loop {
            tokio::select! {
                frame = self.rx.next() => match frame {
                    None | Some(Ok(Message::Close(_))) => return,
                    Some(Ok(Message::Pong(_))) => {
                        tracing::trace!("Pong received");
                    }
                    Some(Ok(_)) => {
                        tracing::trace!("Ignoring inbound frame on a streaming connection");
                    }
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "WebSocket receive error");
                        return;
                    }
                },
                _ = self.heartbeat.tick() => {
                    if let Err(e) = self.tx.send(Message::Ping(Default::default())).await {
                        tracing::debug!(error = %e, "WebSocket heartbeat ping failed");
                        return;
                    }
                }
            }
        }
    }
}
