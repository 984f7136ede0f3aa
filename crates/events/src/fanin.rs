//! Fan-in of producer channels into a session's sink.
//!
//! [`FanIn::spawn`] starts one forwarding task per [`ProducerAdapter`]. Each
//! task moves events from its adapter channel into the sink, stamping them
//! with the adapter's name. The tasks live only as long as the stream
//! session that spawned them: [`FanIn::stop`] (or dropping the [`FanIn`])
//! cancels them, so the next session starts with a fresh set and two tasks
//! never compete for the same adapter.
//!
//! An event a task has taken from its adapter but not yet handed to the sink
//! is parked on the adapter when the task is cancelled. The next task for
//! that adapter sends it before anything else, so per-producer order holds
//! and a session change loses nothing.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::adapter::{DrainGuard, ProducerAdapter};
use crate::channel::{EventSender, Received};

/// Running forwarding tasks for one stream session.
pub struct FanIn {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<u64>>,
}

impl FanIn {
    /// Spawn a forwarding task for every adapter, all writing into `sink`.
    pub fn spawn(identity: &str, adapters: &[ProducerAdapter], sink: EventSender) -> Self {
        let cancel = CancellationToken::new();
        let tasks = adapters
            .iter()
            .map(|adapter| {
                tokio::spawn(forward(
                    identity.to_string(),
                    adapter.clone(),
                    adapter.start_draining(),
                    sink.clone(),
                    cancel.clone(),
                ))
            })
            .collect();

        Self { cancel, tasks }
    }

    /// Number of forwarding tasks spawned.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Cancel every forwarding task and wait for them to exit.
    ///
    /// Returns the total number of events forwarded to the sink.
    pub async fn stop(mut self) -> u64 {
        self.cancel.cancel();
        let mut forwarded = 0;
        for task in std::mem::take(&mut self.tasks) {
            match task.await {
                Ok(count) => forwarded += count,
                Err(e) if e.is_panic() => {
                    tracing::error!(error = %e, "Forwarding task panicked");
                }
                Err(_) => {}
            }
        }
        forwarded
    }
}

impl Drop for FanIn {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Forwarding loop for a single adapter.
async fn forward(
    identity: String,
    adapter: ProducerAdapter,
    guard: DrainGuard,
    sink: EventSender,
    cancel: CancellationToken,
) -> u64 {
    let producer = adapter.name();
    let mut forwarded = 0u64;
    tracing::debug!(identity = %identity, producer, "Forwarding task started");

    loop {
        let message = match adapter.take_parked() {
            Some(message) => {
                tracing::debug!(identity = %identity, producer, "Resending parked event");
                message
            }
            None => {
                let received = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    received = adapter.channel().receive() => received,
                };
                match received {
                    Received::Message(message) => message,
                    Received::Closed => {
                        tracing::info!(identity = %identity, producer, "Producer channel closed, forwarding stopped");
                        break;
                    }
                }
            }
        };
        let message = message.with_producer(producer);

        tracing::debug!(identity = %identity, producer, payload = %message.payload, "Forwarding event to sink");

        tokio::select! {
            biased;
            sent = sink.send(message.clone()) => {
                if sent.is_err() {
                    tracing::debug!(identity = %identity, producer, "Sink closed, forwarding stopped");
                    adapter.park(message);
                    break;
                }
                forwarded += 1;
            }
            _ = cancel.cancelled() => {
                match sink.try_send(message) {
                    Ok(()) => forwarded += 1,
                    Err(rejected) => {
                        tracing::debug!(identity = %identity, producer, "Sink full at session end, parking event");
                        adapter.park(rejected.message);
                    }
                }
                break;
            }
        }
    }

    drop(guard);
    tracing::debug!(identity = %identity, producer, forwarded, "Forwarding task exited");
    forwarded
}
