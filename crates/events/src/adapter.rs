//! Producer adapters and the handles producer jobs publish through.
//!
//! A [`ProducerAdapter`] pairs a producer name with its own
//! [`EventChannel`]. Jobs never see subscribers; they receive a
//! [`ProducerHandle`] and call [`ProducerHandle::publish`]. What happens
//! when the channel is full, typically because nobody is streaming, is
//! decided by the adapter's [`OverflowPolicy`].

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::channel::{ChannelError, ChannelKind, EventChannel, Eviction, Rejected};
use crate::message::EventMessage;

// ---------------------------------------------------------------------------
// OverflowPolicy
// ---------------------------------------------------------------------------

/// Behaviour of [`ProducerHandle::publish`] when the adapter channel is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Wait until the channel has room.
    Block,
    /// Discard the event being published.
    DropNewest,
    /// Discard the oldest buffered event while no session is draining the
    /// adapter; wait for room while one is.
    #[default]
    DropOldest,
}

impl OverflowPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverflowPolicy::Block => "block",
            OverflowPolicy::DropNewest => "drop_newest",
            OverflowPolicy::DropOldest => "drop_oldest",
        }
    }
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "block" => Ok(OverflowPolicy::Block),
            "drop_newest" => Ok(OverflowPolicy::DropNewest),
            "drop_oldest" => Ok(OverflowPolicy::DropOldest),
            other => Err(format!(
                "unknown overflow policy '{other}' (expected block, drop_newest or drop_oldest)"
            )),
        }
    }
}

/// What [`ProducerHandle::publish`] did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The event was enqueued.
    Queued,
    /// The channel was full and the new event was discarded.
    DroppedNewest,
    /// The channel was full; the oldest buffered event was discarded to make
    /// room for the new one.
    EvictedOldest,
}

// ---------------------------------------------------------------------------
// ProducerAdapter
// ---------------------------------------------------------------------------

/// A named producer and its channel.
///
/// Besides the channel, an adapter tracks how many forwarding tasks are
/// draining it and holds at most one parked event: an event a forwarding
/// task had already taken when its session ended. The next forwarding task
/// sends the parked event before reading the channel again.
#[derive(Debug, Clone)]
pub struct ProducerAdapter {
    name: String,
    channel: EventChannel,
    policy: OverflowPolicy,
    draining: Arc<AtomicUsize>,
    parked: Arc<Mutex<Option<EventMessage>>>,
}

impl ProducerAdapter {
    pub fn new(name: impl Into<String>, capacity: usize, policy: OverflowPolicy) -> Self {
        let name = name.into();
        let channel = EventChannel::new(ChannelKind::Producer(name.clone()), capacity);
        Self {
            name,
            channel,
            policy,
            draining: Arc::new(AtomicUsize::new(0)),
            parked: Arc::new(Mutex::new(None)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn channel(&self) -> &EventChannel {
        &self.channel
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// The write handle handed to the producer job.
    pub fn handle(&self) -> ProducerHandle {
        ProducerHandle {
            name: self.name.clone(),
            channel: self.channel.clone(),
            policy: self.policy,
            draining: Arc::clone(&self.draining),
        }
    }

    /// Whether a forwarding task is currently attached to this adapter.
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire) > 0
    }

    /// Mark the adapter as drained until the returned guard is dropped.
    pub(crate) fn start_draining(&self) -> DrainGuard {
        self.draining.fetch_add(1, Ordering::AcqRel);
        DrainGuard {
            draining: Arc::clone(&self.draining),
        }
    }

    /// Keep an event that was taken from the channel but never reached a sink.
    pub(crate) fn park(&self, message: EventMessage) {
        let mut parked = self.parked.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = parked.replace(message) {
            tracing::warn!(
                producer = %self.name,
                created_at = %previous.created_at,
                "Parked event replaced, older event dropped"
            );
        }
    }

    pub(crate) fn take_parked(&self) -> Option<EventMessage> {
        self.parked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn has_parked(&self) -> bool {
        self.parked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

/// Keeps a [`ProducerAdapter`] marked as drained while alive.
#[derive(Debug)]
pub(crate) struct DrainGuard {
    draining: Arc<AtomicUsize>,
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        self.draining.fetch_sub(1, Ordering::AcqRel);
    }
}

// ---------------------------------------------------------------------------
// ProducerHandle
// ---------------------------------------------------------------------------

/// Publishing side of a [`ProducerAdapter`].
#[derive(Debug, Clone)]
pub struct ProducerHandle {
    name: String,
    channel: EventChannel,
    policy: OverflowPolicy,
    draining: Arc<AtomicUsize>,
}

impl ProducerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Publish `payload` tagged with this producer's name.
    pub async fn publish(
        &self,
        payload: serde_json::Value,
    ) -> Result<PublishOutcome, ChannelError> {
        let message = EventMessage::new(payload).with_producer(self.name.clone());
        self.publish_message(message).await
    }

    /// Publish a pre-built event. Its producer tag is left as is; the fan-in
    /// restamps it on the way to the sink.
    pub async fn publish_message(
        &self,
        message: EventMessage,
    ) -> Result<PublishOutcome, ChannelError> {
        let sender = self.channel.sender();

        if self.policy == OverflowPolicy::Block {
            sender.send(message).await?;
            return Ok(PublishOutcome::Queued);
        }

        let message = match sender.try_send(message) {
            Ok(()) => return Ok(PublishOutcome::Queued),
            Err(Rejected {
                reason: ChannelError::Closed,
                ..
            }) => return Err(ChannelError::Closed),
            Err(Rejected { message, .. }) => message,
        };

        match self.policy {
            OverflowPolicy::DropNewest => {
                tracing::warn!(
                    producer = %self.name,
                    capacity = self.channel.capacity(),
                    "Producer channel full, dropping newest event"
                );
                Ok(PublishOutcome::DroppedNewest)
            }
            // A forwarding task blocked on a full sink still drains; wait for it.
            _ if self.draining.load(Ordering::Acquire) > 0 => {
                sender.send(message).await?;
                Ok(PublishOutcome::Queued)
            }
            _ => match self.channel.try_evict_oldest() {
                Eviction::Evicted(oldest) => {
                    tracing::warn!(
                        producer = %self.name,
                        evicted_created_at = %oldest.created_at,
                        "Producer channel full with no active stream, evicting oldest event"
                    );
                    sender.send(message).await?;
                    Ok(PublishOutcome::EvictedOldest)
                }
                Eviction::Busy | Eviction::Empty => {
                    sender.send(message).await?;
                    Ok(PublishOutcome::Queued)
                }
            },
        }
    }

    pub fn is_closed(&self) -> bool {
        self.channel.is_closed()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
