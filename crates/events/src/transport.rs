//! Outbound transport abstraction for stream sessions.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::message::StreamMessage;

/// Error type for transport write failures.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The peer went away.
    #[error("peer closed the connection")]
    PeerClosed,

    /// The underlying connection failed.
    #[error("transport I/O failed: {0}")]
    Io(String),

    /// The message could not be serialised.
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A connection a [`StreamSession`](crate::session::StreamSession) writes to.
#[async_trait]
pub trait Transport: Send {
    /// Write one message to the peer. An error ends the session and returns
    /// the subscription to Idle.
    async fn send(&mut self, message: StreamMessage) -> Result<(), TransportError>;

    /// Resolve when the peer hangs up.
    ///
    /// The default never resolves, for transports that only learn about a
    /// dead peer when a write fails.
    async fn closed(&mut self) {
        std::future::pending::<()>().await
    }
}

/// In-process transport backed by a bounded mpsc channel.
///
/// The receiving half is exposed as a [`ReceiverStream`]; dropping it counts
/// as the peer hanging up.
pub struct ChannelTransport {
    tx: mpsc::Sender<StreamMessage>,
}

impl ChannelTransport {
    pub fn new(capacity: usize) -> (Self, ReceiverStream<StreamMessage>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, ReceiverStream::new(rx))
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&mut self, message: StreamMessage) -> Result<(), TransportError> {
        self.tx
            .send(message)
            .await
            .map_err(|_| TransportError::PeerClosed)
    }

    async fn closed(&mut self) {
        self.tx.closed().await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use futures::StreamExt;

    use super::*;

    #[tokio::test]
    async fn channel_transport_delivers_to_stream() {
        let (mut transport, mut stream) = ChannelTransport::new(4);
        transport
            .send(StreamMessage::new("cleaner", "42"))
            .await
            .unwrap();

        assert_eq!(
            stream.next().await,
            Some(StreamMessage::new("cleaner", "42"))
        );
    }

    #[tokio::test]
    async fn dropped_stream_fails_writes_and_resolves_closed() {
        let (mut transport, stream) = ChannelTransport::new(4);
        drop(stream);

        assert_matches!(
            transport.send(StreamMessage::new("cleaner", "1")).await,
            Err(TransportError::PeerClosed)
        );
        tokio::time::timeout(Duration::from_secs(1), transport.closed())
            .await
            .expect("closed() should resolve once the stream is dropped");
    }
}
