//! Bounded event channel with an explicit closed signal.
//!
//! [`EventChannel`] wraps a `tokio::sync::mpsc` channel. Closing is driven
//! by a [`CancellationToken`] owned by the channel rather than by dropping
//! senders, so the shutdown path can close a channel while forwarding tasks
//! and producer handles still hold writers. Receivers observe the close as
//! [`Received::Closed`] once every message buffered before it has been
//! yielded.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::message::EventMessage;

/// Default number of buffered events per channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 100;

// ---------------------------------------------------------------------------
// ChannelKind
// ---------------------------------------------------------------------------

/// What a channel is used for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// The fan-in target a stream session drains.
    Sink,
    /// A producer's own channel.
    Producer(String),
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKind::Sink => f.write_str("sink"),
            ChannelKind::Producer(name) => write!(f, "producer:{name}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors and results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("channel is closed")]
    Closed,

    #[error("channel is full")]
    Full,
}

/// A message that [`EventSender::try_send`] could not enqueue, handed back
/// to the caller together with the reason.
#[derive(Debug)]
pub struct Rejected {
    pub reason: ChannelError,
    pub message: EventMessage,
}

/// Outcome of [`EventChannel::receive`].
#[derive(Debug)]
pub enum Received {
    Message(EventMessage),
    Closed,
}

/// Outcome of a non-blocking attempt to drop the oldest buffered message.
#[derive(Debug)]
pub(crate) enum Eviction {
    Evicted(EventMessage),
    /// A reader currently holds the receiver.
    Busy,
    Empty,
}

// ---------------------------------------------------------------------------
// EventChannel
// ---------------------------------------------------------------------------

/// Bounded FIFO of [`EventMessage`]s.
///
/// Cloning is cheap and yields another handle to the same channel.
#[derive(Clone)]
pub struct EventChannel {
    kind: ChannelKind,
    tx: mpsc::Sender<EventMessage>,
    rx: Arc<Mutex<mpsc::Receiver<EventMessage>>>,
    closed: CancellationToken,
}

impl EventChannel {
    /// Create an open channel holding at most `capacity` messages.
    ///
    /// A zero capacity is bumped to one; tokio rejects empty channels.
    pub fn new(kind: ChannelKind, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            kind,
            tx,
            rx: Arc::new(Mutex::new(rx)),
            closed: CancellationToken::new(),
        }
    }

    pub fn kind(&self) -> &ChannelKind {
        &self.kind
    }

    /// A write handle for this channel.
    pub fn sender(&self) -> EventSender {
        EventSender {
            tx: self.tx.clone(),
            closed: self.closed.clone(),
        }
    }

    /// Wait for the next message.
    ///
    /// Only one reader makes progress at a time; concurrent callers queue on
    /// the receiver lock. Returns [`Received::Closed`] once the channel is
    /// closed and its buffer is drained.
    pub async fn receive(&self) -> Received {
        let mut rx = self.rx.lock().await;
        tokio::select! {
            biased;
            message = rx.recv() => match message {
                Some(message) => Received::Message(message),
                None => Received::Closed,
            },
            _ = self.closed.cancelled() => match rx.try_recv() {
                Ok(message) => Received::Message(message),
                Err(_) => Received::Closed,
            },
        }
    }

    /// Drop the oldest buffered message if no reader is active.
    pub(crate) fn try_evict_oldest(&self) -> Eviction {
        match self.rx.try_lock() {
            Ok(mut rx) => match rx.try_recv() {
                Ok(message) => Eviction::Evicted(message),
                Err(_) => Eviction::Empty,
            },
            Err(_) => Eviction::Busy,
        }
    }

    /// Close the channel. Pending and future sends fail with
    /// [`ChannelError::Closed`]; buffered messages remain readable.
    pub fn close(&self) {
        if self.closed.is_cancelled() {
            tracing::debug!(channel = %self.kind, "Channel already closed");
            return;
        }
        self.closed.cancel();
        tracing::debug!(channel = %self.kind, buffered = self.len(), "Channel closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Number of messages currently buffered.
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

impl fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventChannel")
            .field("kind", &self.kind)
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// EventSender
// ---------------------------------------------------------------------------

/// Write half of an [`EventChannel`].
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::Sender<EventMessage>,
    closed: CancellationToken,
}

impl EventSender {
    /// Enqueue `message`, waiting for capacity while the channel is full.
    pub async fn send(&self, message: EventMessage) -> Result<(), ChannelError> {
        if self.closed.is_cancelled() {
            return Err(ChannelError::Closed);
        }
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(ChannelError::Closed),
            sent = self.tx.send(message) => sent.map_err(|_| ChannelError::Closed),
        }
    }

    /// Enqueue `message` without waiting.
    pub fn try_send(&self, message: EventMessage) -> Result<(), Rejected> {
        if self.closed.is_cancelled() {
            return Err(Rejected {
                reason: ChannelError::Closed,
                message,
            });
        }
        self.tx.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(message) => Rejected {
                reason: ChannelError::Full,
                message,
            },
            mpsc::error::TrySendError::Closed(message) => Rejected {
                reason: ChannelError::Closed,
                message,
            },
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
