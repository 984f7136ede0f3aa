//! Well-known producer and subscriber name constants.
//!
//! Producer names double as the `id` field of delivered stream messages, so
//! they must stay stable across releases.

/// Cleanup job: emits the id of every project it hard-deletes.
pub const PRODUCER_CLEANER: &str = "cleaner";

/// Reminder job. No wire mapping yet.
pub const PRODUCER_REMINDER: &str = "reminder";

/// Investment job. No wire mapping yet.
pub const PRODUCER_INVESTMENT: &str = "investment";

/// Producers registered for every subscriber, in registration order.
pub const DEFAULT_PRODUCERS: [&str; 3] = [PRODUCER_CLEANER, PRODUCER_REMINDER, PRODUCER_INVESTMENT];

/// The journal controller instance that consumes daemon notifications.
pub const SUBSCRIBER_BULLET_JOURNAL: &str = "bulletJournal";
