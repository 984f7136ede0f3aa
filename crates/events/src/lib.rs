//! Notification fan-in and streaming for the bujo daemon.
//!
//! Background producers (cleanup, reminder, investment) push events into
//! their own bounded channels. When a subscriber connects, its entry is
//! claimed from the registry and a stream session merges every producer
//! channel into one sink and writes each event to the subscriber's
//! transport.
//!
//! - [`EventChannel`]: bounded FIFO with an explicit closed result.
//! - [`ProducerAdapter`] / [`ProducerHandle`]: a named producer channel and
//!   the write handle handed to jobs, with an [`OverflowPolicy`].
//! - [`FanIn`]: per-session forwarding tasks feeding the sink.
//! - [`SubscriptionRegistry`]: Idle / Streaming / Closed bookkeeping with
//!   atomic claim and release.
//! - [`StreamSession`]: the per-connection drain loop.
//! - [`NotificationHub`]: wiring facade used by the daemon.

pub mod adapter;
pub mod channel;
pub mod delivery;
pub mod fanin;
pub mod hub;
pub mod message;
pub mod registry;
pub mod session;
pub mod transport;

pub use adapter::{OverflowPolicy, ProducerAdapter, ProducerHandle, PublishOutcome};
pub use channel::{ChannelError, ChannelKind, EventChannel, EventSender, Received};
pub use fanin::FanIn;
pub use hub::{HubConfig, NotificationHub, SubscriptionStream};
pub use message::{EventMessage, StreamMessage};
pub use registry::{
    EntryView, RegistryError, SubscriptionEntry, SubscriptionRegistry, SubscriptionState,
};
pub use session::{SessionEnd, SessionReport, StreamSession};
pub use transport::{ChannelTransport, Transport, TransportError};
