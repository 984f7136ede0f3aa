//! Process-wide wiring of subscriptions, producers and shutdown.
//!
//! [`NotificationHub`] is created once at startup, populated with
//! [`register`](NotificationHub::register), and shared via `Arc` between
//! the transport layer (which calls [`subscribe`](NotificationHub::subscribe))
//! and the producer jobs (which obtain [`ProducerHandle`]s through
//! [`producer`](NotificationHub::producer)).

use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures::Stream;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

use crate::adapter::{OverflowPolicy, ProducerAdapter, ProducerHandle};
use crate::channel::{ChannelKind, EventChannel, DEFAULT_CHANNEL_CAPACITY};
use crate::message::StreamMessage;
use crate::registry::{
    EntryView, RegistryError, SubscriptionEntry, SubscriptionRegistry, SubscriptionState,
};
use crate::session::{SessionReport, StreamSession};
use crate::transport::ChannelTransport;

/// Channel sizing and overflow behaviour applied to every registered entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubConfig {
    pub channel_capacity: usize,
    pub overflow_policy: OverflowPolicy,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            overflow_policy: OverflowPolicy::default(),
        }
    }
}

/// Channel handles kept for producer lookup and shutdown, independent of
/// whether the entry is currently claimed.
struct EntryChannels {
    identity: String,
    sink: EventChannel,
    adapters: Vec<ProducerAdapter>,
}

pub struct NotificationHub {
    config: HubConfig,
    registry: Arc<SubscriptionRegistry>,
    channels: Mutex<Vec<EntryChannels>>,
}

impl NotificationHub {
    pub fn new(config: HubConfig) -> Self {
        Self {
            config,
            registry: Arc::new(SubscriptionRegistry::new()),
            channels: Mutex::new(Vec::new()),
        }
    }

    fn channels(&self) -> MutexGuard<'_, Vec<EntryChannels>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Create an Idle subscription for `identity` with one adapter per
    /// producer name, in the given order.
    pub fn register(&self, identity: &str, producers: &[&str]) -> Result<(), RegistryError> {
        let capacity = self.config.channel_capacity;
        let sink = EventChannel::new(ChannelKind::Sink, capacity);
        let adapters: Vec<ProducerAdapter> = producers
            .iter()
            .map(|name| ProducerAdapter::new(*name, capacity, self.config.overflow_policy))
            .collect();

        self.registry.register(SubscriptionEntry::new(
            identity,
            sink.clone(),
            adapters.clone(),
        ))?;
        self.channels().push(EntryChannels {
            identity: identity.to_string(),
            sink,
            adapters,
        });

        tracing::info!(
            identity,
            producers = ?producers,
            capacity,
            overflow_policy = %self.config.overflow_policy,
            "Subscription entry created"
        );
        Ok(())
    }

    /// Publishing handle for `producer` under `identity`.
    pub fn producer(&self, identity: &str, producer: &str) -> Option<ProducerHandle> {
        self.channels()
            .iter()
            .find(|entry| entry.identity == identity)?
            .adapters
            .iter()
            .find(|adapter| adapter.name() == producer)
            .map(ProducerAdapter::handle)
    }

    /// Claim `identity` for a new stream session.
    pub fn subscribe(&self, identity: &str) -> Result<StreamSession, RegistryError> {
        let entry = self.registry.claim(identity)?;
        Ok(StreamSession::new(entry, Arc::clone(&self.registry)))
    }

    /// Claim `identity` and run its session on a background task, returning
    /// the delivered messages as a stream.
    ///
    /// Dropping the stream hangs up the session, which releases the
    /// subscription.
    pub fn subscribe_stream(
        &self,
        identity: &str,
        capacity: usize,
    ) -> Result<SubscriptionStream, RegistryError> {
        let session = self.subscribe(identity)?;
        let (mut transport, stream) = ChannelTransport::new(capacity);
        let task = tokio::spawn(async move { session.run(&mut transport).await });
        Ok(SubscriptionStream { stream, task })
    }

    pub fn state(&self, identity: &str) -> Option<SubscriptionState> {
        self.registry.state(identity)
    }

    pub fn describe(&self, identity: &str) -> Option<EntryView> {
        self.registry.describe(identity)
    }

    /// Close every subscription and channel.
    ///
    /// Producer channels are closed before sinks so forwarding tasks see
    /// their inputs end first. Sessions drain what is already in their sink
    /// and then end with [`SessionEnd::ChannelClosed`](crate::session::SessionEnd::ChannelClosed).
    pub fn shutdown(&self) {
        let idle = self.registry.close_all();
        let channels = self.channels();

        for entry in channels.iter() {
            for adapter in &entry.adapters {
                adapter.channel().close();
            }
        }
        for entry in channels.iter() {
            entry.sink.close();
        }

        tracing::info!(
            subscriptions = channels.len(),
            idle = idle.len(),
            "Notification hub shut down"
        );
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

// ---------------------------------------------------------------------------
// SubscriptionStream
// ---------------------------------------------------------------------------

/// Messages delivered to one subscriber, backed by a running session.
pub struct SubscriptionStream {
    stream: ReceiverStream<StreamMessage>,
    task: JoinHandle<SessionReport>,
}

impl SubscriptionStream {
    /// Hang up and wait for the session to finish.
    ///
    /// Returns `None` if the session task panicked or was aborted.
    pub async fn finish(self) -> Option<SessionReport> {
        drop(self.stream);
        self.task.await.ok()
    }
}

impl Stream for SubscriptionStream {
    type Item = StreamMessage;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().stream).poll_next(cx)
    }
}
