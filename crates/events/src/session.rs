//! Per-connection stream session.
//!
//! A [`StreamSession`] owns a claimed [`SubscriptionEntry`]. Running it
//! starts the fan-in, drains the sink, and writes every deliverable event to
//! the [`Transport`]:
//!
//! ```text
//! Starting ──► Draining ──┬─ sink closed ────────────► Ended (retired)
//!                         ├─ write failed / hang-up ──► Ended (released)
//!                         └─ unmapped event ──► log, keep draining
//! ```
//!
//! A released subscription can be claimed again by a reconnecting client;
//! a retired one cannot. The event whose write failed is not replayed.

use std::sync::Arc;

use crate::adapter::ProducerAdapter;
use crate::channel::{EventChannel, Received};
use crate::delivery::{self, Undeliverable};
use crate::fanin::FanIn;
use crate::registry::{SubscriptionEntry, SubscriptionRegistry};
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionPhase {
    Starting,
    Draining,
    Ended,
}

/// Why a session stopped draining.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The sink was closed by shutdown. The subscription is retired.
    ChannelClosed,
    /// A transport write failed. The subscription is released.
    TransportFailed,
    /// The peer hung up. The subscription is released.
    PeerClosed,
}

impl SessionEnd {
    /// Whether the subscription went back to Idle.
    pub fn is_resumable(&self) -> bool {
        !matches!(self, SessionEnd::ChannelClosed)
    }
}

/// Summary returned by [`StreamSession::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub identity: String,
    pub end: SessionEnd,
    /// Events written to the transport.
    pub delivered: u64,
    /// Events dropped because their producer has no usable wire mapping.
    pub discarded: u64,
}

/// Holds the claimed entry and hands it back to the registry exactly once.
struct ClaimGuard {
    registry: Arc<SubscriptionRegistry>,
    entry: Option<SubscriptionEntry>,
}

impl ClaimGuard {
    fn release(&mut self) {
        if let Some(entry) = self.entry.take() {
            self.registry.release(entry);
        }
    }

    fn retire(&mut self) {
        if let Some(entry) = self.entry.take() {
            self.registry.retire(entry.identity());
        }
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        if let Some(entry) = self.entry.take() {
            tracing::warn!(identity = %entry.identity(), "Stream session abandoned, releasing subscription");
            self.registry.release(entry);
        }
    }
}

/// A claimed subscription ready to stream.
pub struct StreamSession {
    identity: String,
    sink: EventChannel,
    adapters: Vec<ProducerAdapter>,
    phase: SessionPhase,
    claim: ClaimGuard,
}

impl std::fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession")
            .field("identity", &self.identity)
            .field("sink", &self.sink)
            .field("adapters", &self.adapters)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

impl StreamSession {
    /// Wrap an entry obtained from [`SubscriptionRegistry::claim`].
    ///
    /// Dropping the session without running it releases the entry.
    pub fn new(entry: SubscriptionEntry, registry: Arc<SubscriptionRegistry>) -> Self {
        Self {
            identity: entry.identity().to_string(),
            sink: entry.sink().clone(),
            adapters: entry.adapters().to_vec(),
            phase: SessionPhase::Starting,
            claim: ClaimGuard {
                registry,
                entry: Some(entry),
            },
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    fn enter(&mut self, phase: SessionPhase) {
        tracing::debug!(identity = %self.identity, from = ?self.phase, to = ?phase, "Stream session phase change");
        self.phase = phase;
    }

    /// Drain the sink into `transport` until the sink closes, a write fails,
    /// or the peer hangs up.
    pub async fn run<T>(mut self, transport: &mut T) -> SessionReport
    where
        T: Transport + ?Sized,
    {
        let fanin = FanIn::spawn(&self.identity, &self.adapters, self.sink.sender());
        self.enter(SessionPhase::Draining);
        tracing::info!(
            identity = %self.identity,
            producers = fanin.len(),
            backlog = self.sink.len(),
            "Streaming started"
        );

        let mut delivered = 0u64;
        let mut discarded = 0u64;

        let end = loop {
            let received = tokio::select! {
                biased;
                received = self.sink.receive() => received,
                () = transport.closed() => {
                    tracing::info!(identity = %self.identity, "Subscriber hung up");
                    break SessionEnd::PeerClosed;
                }
            };

            let event = match received {
                Received::Message(event) => event,
                Received::Closed => {
                    tracing::info!(identity = %self.identity, "Sink channel closed, closing stream");
                    break SessionEnd::ChannelClosed;
                }
            };

            match delivery::encode(&event) {
                Ok(wire) => {
                    let body = wire.message.clone();
                    if let Err(e) = transport.send(wire).await {
                        tracing::warn!(
                            identity = %self.identity,
                            producer = %event.producer,
                            message = %body,
                            error = %e,
                            "Transport write failed, event dropped"
                        );
                        break SessionEnd::TransportFailed;
                    }
                    delivered += 1;
                    tracing::debug!(
                        identity = %self.identity,
                        producer = %event.producer,
                        message = %body,
                        "Streamed event to subscriber"
                    );
                }
                Err(Undeliverable::Unmapped(producer)) => {
                    discarded += 1;
                    tracing::info!(
                        identity = %self.identity,
                        producer = %producer,
                        "Producer has no delivery mapping yet, event discarded"
                    );
                }
                Err(e) => {
                    discarded += 1;
                    tracing::warn!(identity = %self.identity, error = %e, "Event discarded");
                }
            }
        };

        let forwarded = fanin.stop().await;
        self.enter(SessionPhase::Ended);

        if end.is_resumable() {
            self.claim.release();
        } else {
            self.claim.retire();
        }

        tracing::info!(
            identity = %self.identity,
            end = ?end,
            delivered,
            discarded,
            forwarded,
            "Stream session ended"
        );

        SessionReport {
            identity: self.identity.clone(),
            end,
            delivered,
            discarded,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use futures::StreamExt;

    use super::*;
    use crate::adapter::OverflowPolicy;
    use crate::channel::ChannelKind;
    use crate::message::StreamMessage;
    use crate::registry::SubscriptionState;
    use crate::transport::{ChannelTransport, TransportError};

    /// Transport whose writes always fail, recording what was attempted.
    #[derive(Default)]
    struct BrokenTransport {
        attempted: Vec<StreamMessage>,
    }

    #[async_trait]
    impl Transport for BrokenTransport {
        async fn send(&mut self, message: StreamMessage) -> Result<(), TransportError> {
            self.attempted.push(message);
            Err(TransportError::Io("connection reset".into()))
        }
    }

    fn setup() -> (Arc<SubscriptionRegistry>, ProducerAdapter, ProducerAdapter, EventChannel) {
        let registry = Arc::new(SubscriptionRegistry::new());
        let cleaner = ProducerAdapter::new("cleaner", 8, OverflowPolicy::Block);
        let reminder = ProducerAdapter::new("reminder", 8, OverflowPolicy::Block);
        let sink = EventChannel::new(ChannelKind::Sink, 8);
        registry
            .register(SubscriptionEntry::new(
                "bulletJournal",
                sink.clone(),
                vec![cleaner.clone(), reminder.clone()],
            ))
            .unwrap();
        (registry, cleaner, reminder, sink)
    }

    fn session(registry: &Arc<SubscriptionRegistry>) -> StreamSession {
        let entry = registry.claim("bulletJournal").unwrap();
        StreamSession::new(entry, Arc::clone(registry))
    }

    #[tokio::test]
    async fn write_failure_releases_subscription() {
        let (registry, cleaner, _reminder, _sink) = setup();
        cleaner.handle().publish(7.into()).await.unwrap();

        let mut transport = BrokenTransport::default();
        let report = session(&registry).run(&mut transport).await;

        assert_eq!(report.end, SessionEnd::TransportFailed);
        assert_eq!(report.delivered, 0);
        assert_eq!(transport.attempted, vec![StreamMessage::new("cleaner", "7")]);
        assert_eq!(registry.state("bulletJournal"), Some(SubscriptionState::Idle));
    }

    #[tokio::test]
    async fn sink_close_retires_subscription() {
        let (registry, _cleaner, _reminder, sink) = setup();
        let (mut transport, _stream) = ChannelTransport::new(8);
        let running = tokio::spawn({
            let session = session(&registry);
            async move { session.run(&mut transport).await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        sink.close();

        let report = tokio::time::timeout(Duration::from_secs(1), running)
            .await
            .expect("session should end on sink close")
            .unwrap();
        assert_eq!(report.end, SessionEnd::ChannelClosed);
        assert_eq!(registry.state("bulletJournal"), Some(SubscriptionState::Closed));
    }

    #[tokio::test]
    async fn unmapped_events_are_discarded_and_draining_continues() {
        let (registry, cleaner, reminder, _sink) = setup();
        let (mut transport, mut stream) = ChannelTransport::new(8);
        let running = tokio::spawn({
            let session = session(&registry);
            async move { session.run(&mut transport).await }
        });

        reminder.handle().publish(serde_json::json!({"task": 3})).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        cleaner.handle().publish(9.into()).await.unwrap();

        let delivered = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .unwrap();
        assert_eq!(delivered, Some(StreamMessage::new("cleaner", "9")));

        drop(stream);
        let report = running.await.unwrap();
        assert_eq!(report.end, SessionEnd::PeerClosed);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.discarded, 1);
        assert_eq!(registry.state("bulletJournal"), Some(SubscriptionState::Idle));
    }

    #[tokio::test]
    async fn dropping_unrun_session_releases_claim() {
        let (registry, ..) = setup();
        let session = session(&registry);
        assert_eq!(registry.state("bulletJournal"), Some(SubscriptionState::Streaming));

        drop(session);
        assert_eq!(registry.state("bulletJournal"), Some(SubscriptionState::Idle));
    }
}
