//! End-to-end behaviour of the notification hub: publish, stream, reconnect
//! and shutdown.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use bujo_core::producers::{
    DEFAULT_PRODUCERS, PRODUCER_CLEANER, PRODUCER_REMINDER, SUBSCRIBER_BULLET_JOURNAL,
};
use bujo_events::{
    HubConfig, NotificationHub, OverflowPolicy, RegistryError, SessionEnd, StreamMessage,
    SubscriptionState, Transport, TransportError,
};
use futures::StreamExt;

const TIMEOUT: Duration = Duration::from_secs(2);

fn hub(policy: OverflowPolicy) -> Arc<NotificationHub> {
    let hub = NotificationHub::new(HubConfig {
        channel_capacity: 8,
        overflow_policy: policy,
    });
    hub.register(SUBSCRIBER_BULLET_JOURNAL, &DEFAULT_PRODUCERS)
        .unwrap();
    Arc::new(hub)
}

/// Fails every write after recording the attempt.
#[derive(Default)]
struct FailingTransport {
    attempted: Vec<StreamMessage>,
}

#[async_trait]
impl Transport for FailingTransport {
    async fn send(&mut self, message: StreamMessage) -> Result<(), TransportError> {
        self.attempted.push(message);
        Err(TransportError::Io("broken pipe".into()))
    }
}

#[tokio::test]
async fn published_cleanup_event_reaches_subscriber() {
    let hub = hub(OverflowPolicy::DropOldest);
    let cleaner = hub
        .producer(SUBSCRIBER_BULLET_JOURNAL, PRODUCER_CLEANER)
        .unwrap();

    let mut stream = hub.subscribe_stream(SUBSCRIBER_BULLET_JOURNAL, 8).unwrap();
    assert_eq!(
        hub.describe(SUBSCRIBER_BULLET_JOURNAL).unwrap().state,
        SubscriptionState::Streaming
    );

    cleaner.publish(42.into()).await.unwrap();
    let first = tokio::time::timeout(TIMEOUT, stream.next()).await.unwrap();
    assert_eq!(first, Some(StreamMessage::new("cleaner", "42")));

    // Only one stream per identity.
    assert_matches!(
        hub.subscribe(SUBSCRIBER_BULLET_JOURNAL),
        Err(RegistryError::AlreadyStreaming(_))
    );

    hub.shutdown();

    let rest = tokio::time::timeout(TIMEOUT, stream.next()).await.unwrap();
    assert_eq!(rest, None);

    let report = stream.finish().await.unwrap();
    assert_eq!(report.end, SessionEnd::ChannelClosed);
    assert_eq!(report.delivered, 1);
    assert_matches!(
        hub.subscribe(SUBSCRIBER_BULLET_JOURNAL),
        Err(RegistryError::Closed(_))
    );
}

#[tokio::test]
async fn events_published_before_connect_are_delivered_in_order() {
    let hub = hub(OverflowPolicy::DropOldest);
    let cleaner = hub
        .producer(SUBSCRIBER_BULLET_JOURNAL, PRODUCER_CLEANER)
        .unwrap();

    for id in [3, 1, 2] {
        cleaner.publish(id.into()).await.unwrap();
    }

    let mut stream = hub.subscribe_stream(SUBSCRIBER_BULLET_JOURNAL, 8).unwrap();
    let mut received = Vec::new();
    for _ in 0..3 {
        let message = tokio::time::timeout(TIMEOUT, stream.next())
            .await
            .unwrap()
            .unwrap();
        received.push(message.message);
    }
    assert_eq!(received, vec!["3", "1", "2"]);

    stream.finish().await.unwrap();
}

#[tokio::test]
async fn failed_write_releases_and_reconnect_resumes_with_new_events() {
    let hub = hub(OverflowPolicy::DropOldest);
    let cleaner = hub
        .producer(SUBSCRIBER_BULLET_JOURNAL, PRODUCER_CLEANER)
        .unwrap();

    cleaner.publish(7.into()).await.unwrap();
    let session = hub.subscribe(SUBSCRIBER_BULLET_JOURNAL).unwrap();
    let mut broken = FailingTransport::default();
    let report = tokio::time::timeout(TIMEOUT, session.run(&mut broken))
        .await
        .unwrap();

    assert_eq!(report.end, SessionEnd::TransportFailed);
    assert_eq!(broken.attempted, vec![StreamMessage::new("cleaner", "7")]);
    assert_eq!(
        hub.describe(SUBSCRIBER_BULLET_JOURNAL).unwrap().state,
        SubscriptionState::Idle
    );

    let mut stream = hub.subscribe_stream(SUBSCRIBER_BULLET_JOURNAL, 8).unwrap();
    cleaner.publish(8.into()).await.unwrap();

    // The failed event is not replayed.
    let next = tokio::time::timeout(TIMEOUT, stream.next()).await.unwrap();
    assert_eq!(next, Some(StreamMessage::new("cleaner", "8")));

    let report = stream.finish().await.unwrap();
    assert_eq!(report.end, SessionEnd::PeerClosed);
    assert_eq!(
        hub.describe(SUBSCRIBER_BULLET_JOURNAL).unwrap().state,
        SubscriptionState::Idle
    );
}

/// Holds each write for a while, then fails it.
struct SlowFailingTransport;

#[async_trait]
impl Transport for SlowFailingTransport {
    async fn send(&mut self, _message: StreamMessage) -> Result<(), TransportError> {
        tokio::time::sleep(Duration::from_millis(100)).await;
        Err(TransportError::Io("connection reset".into()))
    }
}

#[tokio::test]
async fn failed_write_with_full_sink_loses_only_the_failed_event() {
    let hub = NotificationHub::new(HubConfig {
        channel_capacity: 1,
        overflow_policy: OverflowPolicy::Block,
    });
    hub.register(SUBSCRIBER_BULLET_JOURNAL, &DEFAULT_PRODUCERS)
        .unwrap();
    let cleaner = hub
        .producer(SUBSCRIBER_BULLET_JOURNAL, PRODUCER_CLEANER)
        .unwrap();

    let session = hub.subscribe(SUBSCRIBER_BULLET_JOURNAL).unwrap();
    let first = tokio::spawn(async move { session.run(&mut SlowFailingTransport).await });

    for id in 1..=3 {
        tokio::time::timeout(TIMEOUT, cleaner.publish(id.into()))
            .await
            .unwrap()
            .unwrap();
    }

    let report = tokio::time::timeout(TIMEOUT, first).await.unwrap().unwrap();
    assert_eq!(report.end, SessionEnd::TransportFailed);

    let mut stream = hub.subscribe_stream(SUBSCRIBER_BULLET_JOURNAL, 8).unwrap();
    let mut received = Vec::new();
    for _ in 0..2 {
        let message = tokio::time::timeout(TIMEOUT, stream.next())
            .await
            .unwrap()
            .unwrap();
        received.push(message.message);
    }
    assert_eq!(received, vec!["2", "3"]);

    stream.finish().await.unwrap();
}

#[tokio::test]
async fn unmapped_producers_do_not_interrupt_the_stream() {
    let hub = hub(OverflowPolicy::DropOldest);
    let cleaner = hub
        .producer(SUBSCRIBER_BULLET_JOURNAL, PRODUCER_CLEANER)
        .unwrap();
    let reminder = hub
        .producer(SUBSCRIBER_BULLET_JOURNAL, PRODUCER_REMINDER)
        .unwrap();

    let mut stream = hub.subscribe_stream(SUBSCRIBER_BULLET_JOURNAL, 8).unwrap();
    reminder
        .publish(serde_json::json!({"taskId": 11}))
        .await
        .unwrap();
    cleaner.publish(5.into()).await.unwrap();

    let next = tokio::time::timeout(TIMEOUT, stream.next()).await.unwrap();
    assert_eq!(next, Some(StreamMessage::new("cleaner", "5")));

    let report = stream.finish().await.unwrap();
    assert_eq!(report.delivered, 1);
}

#[tokio::test]
async fn concurrent_subscribers_get_exactly_one_stream() {
    let hub = hub(OverflowPolicy::DropOldest);

    let attempts: Vec<_> = (0..16)
        .map(|_| {
            let hub = Arc::clone(&hub);
            tokio::spawn(async move { hub.subscribe_stream(SUBSCRIBER_BULLET_JOURNAL, 4) })
        })
        .collect();

    let mut streams = Vec::new();
    let mut rejected = 0;
    for attempt in attempts {
        match attempt.await.unwrap() {
            Ok(stream) => streams.push(stream),
            Err(RegistryError::AlreadyStreaming(_)) => rejected += 1,
            Err(other) => panic!("unexpected error {other}"),
        }
    }

    assert_eq!(streams.len(), 1);
    assert_eq!(rejected, 15);

    for stream in streams {
        stream.finish().await.unwrap();
    }
}

#[tokio::test]
async fn shutdown_closes_idle_and_streaming_entries() {
    let hub = NotificationHub::default();
    hub.register(SUBSCRIBER_BULLET_JOURNAL, &DEFAULT_PRODUCERS)
        .unwrap();
    hub.register("ledger", &[PRODUCER_CLEANER]).unwrap();
    let hub = Arc::new(hub);

    let stream = hub.subscribe_stream(SUBSCRIBER_BULLET_JOURNAL, 4).unwrap();
    hub.shutdown();

    let report = tokio::time::timeout(TIMEOUT, stream.finish())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.end, SessionEnd::ChannelClosed);

    for view in hub.registry().list() {
        assert_eq!(view.state, SubscriptionState::Closed, "{}", view.identity);
    }
    let cleaner = hub.producer("ledger", PRODUCER_CLEANER).unwrap();
    assert!(cleaner.publish(1.into()).await.is_err());
}
