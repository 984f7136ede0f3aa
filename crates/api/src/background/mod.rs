//! Background tasks and scheduled jobs.
//!
//! [`scheduler::run_recurring`] drives a [`scheduler::ProducerJob`] on a
//! fixed cadence and is intended to be spawned via `tokio::spawn`. It
//! accepts a [`CancellationToken`](tokio_util::sync::CancellationToken) for
//! graceful shutdown.

pub mod cleanup;
pub mod scheduler;
