//! Subscription registry: which identities may start streaming.
//!
//! Every identity maps to a slot in one of three states:
//!
//! ```text
//!            claim                 release
//!   Idle ───────────► Streaming ───────────► Idle
//!     │                   │
//!     │ close_all         │ retire / close_all
//!     ▼                   ▼
//!   Closed ◄──────────────┘
//! ```
//!
//! While Idle the slot owns the [`SubscriptionEntry`]. A successful
//! [`claim`](SubscriptionRegistry::claim) moves the entry out to the caller,
//! so at most one stream session can hold it; [`release`](SubscriptionRegistry::release)
//! moves it back. Both run under a single lock.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::adapter::ProducerAdapter;
use crate::channel::EventChannel;

// ---------------------------------------------------------------------------
// SubscriptionEntry
// ---------------------------------------------------------------------------

/// A subscriber identity together with its sink and producer adapters.
#[derive(Debug)]
pub struct SubscriptionEntry {
    identity: String,
    sink: EventChannel,
    adapters: Vec<ProducerAdapter>,
}

impl SubscriptionEntry {
    pub fn new(
        identity: impl Into<String>,
        sink: EventChannel,
        adapters: Vec<ProducerAdapter>,
    ) -> Self {
        Self {
            identity: identity.into(),
            sink,
            adapters,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn sink(&self) -> &EventChannel {
        &self.sink
    }

    pub fn adapters(&self) -> &[ProducerAdapter] {
        &self.adapters
    }

    pub fn producer_names(&self) -> Vec<String> {
        self.adapters.iter().map(|a| a.name().to_string()).collect()
    }
}

// ---------------------------------------------------------------------------
// State, views, errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    /// Waiting for a subscriber to connect.
    Idle,
    /// Claimed by a live stream session.
    Streaming,
    /// Torn down by shutdown; never claimable again.
    Closed,
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SubscriptionState::Idle => "idle",
            SubscriptionState::Streaming => "streaming",
            SubscriptionState::Closed => "closed",
        })
    }
}

/// Read-only snapshot of one registry slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryView {
    pub identity: String,
    pub state: SubscriptionState,
    pub producers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("subscription {0} does not exist")]
    NotFound(String),

    #[error("subscription {0} is already streaming")]
    AlreadyStreaming(String),

    #[error("subscription {0} is closed")]
    Closed(String),

    #[error("subscription {0} is already registered")]
    AlreadyRegistered(String),
}

// ---------------------------------------------------------------------------
// SubscriptionRegistry
// ---------------------------------------------------------------------------

enum SlotState {
    Idle(SubscriptionEntry),
    Streaming,
    Closed,
}

impl SlotState {
    fn state(&self) -> SubscriptionState {
        match self {
            SlotState::Idle(_) => SubscriptionState::Idle,
            SlotState::Streaming => SubscriptionState::Streaming,
            SlotState::Closed => SubscriptionState::Closed,
        }
    }
}

struct Slot {
    producers: Vec<String>,
    state: SlotState,
}

/// Thread-safe map from subscriber identity to subscription slot.
///
/// The lock is never held across an `.await`, so a plain mutex is used and
/// claim/release stay callable from synchronous code such as `Drop`.
pub struct SubscriptionRegistry {
    slots: Mutex<HashMap<String, Slot>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        // Slot updates are single assignments; a poisoned map is still consistent.
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an Idle entry. Fails if the identity is already known.
    pub fn register(&self, entry: SubscriptionEntry) -> Result<(), RegistryError> {
        let mut slots = self.slots();
        if slots.contains_key(entry.identity()) {
            return Err(RegistryError::AlreadyRegistered(entry.identity.clone()));
        }
        tracing::debug!(identity = %entry.identity, producers = ?entry.producer_names(), "Subscription registered");
        slots.insert(
            entry.identity.clone(),
            Slot {
                producers: entry.producer_names(),
                state: SlotState::Idle(entry),
            },
        );
        Ok(())
    }

    /// Describe an identity that is available for subscription.
    ///
    /// Only Idle entries are visible; Streaming, Closed and unknown
    /// identities all report [`RegistryError::NotFound`].
    pub fn lookup(&self, identity: &str) -> Result<EntryView, RegistryError> {
        match self.describe(identity) {
            Some(view) if view.state == SubscriptionState::Idle => Ok(view),
            _ => Err(RegistryError::NotFound(identity.to_string())),
        }
    }

    /// Describe any known identity regardless of state.
    pub fn describe(&self, identity: &str) -> Option<EntryView> {
        self.slots().get(identity).map(|slot| EntryView {
            identity: identity.to_string(),
            state: slot.state.state(),
            producers: slot.producers.clone(),
        })
    }

    pub fn state(&self, identity: &str) -> Option<SubscriptionState> {
        self.slots().get(identity).map(|slot| slot.state.state())
    }

    /// Snapshot of every slot, sorted by identity.
    pub fn list(&self) -> Vec<EntryView> {
        let mut views: Vec<EntryView> = self
            .slots()
            .iter()
            .map(|(identity, slot)| EntryView {
                identity: identity.clone(),
                state: slot.state.state(),
                producers: slot.producers.clone(),
            })
            .collect();
        views.sort_by(|a, b| a.identity.cmp(&b.identity));
        views
    }

    /// Atomically move an Idle entry to Streaming and hand it to the caller.
    pub fn claim(&self, identity: &str) -> Result<SubscriptionEntry, RegistryError> {
        let mut slots = self.slots();
        let slot = slots
            .get_mut(identity)
            .ok_or_else(|| RegistryError::NotFound(identity.to_string()))?;

        match std::mem::replace(&mut slot.state, SlotState::Streaming) {
            SlotState::Idle(entry) => {
                tracing::info!(identity, "Subscription idle, streaming claimed");
                Ok(entry)
            }
            SlotState::Streaming => {
                tracing::info!(identity, "Subscription is already streaming");
                Err(RegistryError::AlreadyStreaming(identity.to_string()))
            }
            SlotState::Closed => {
                slot.state = SlotState::Closed;
                Err(RegistryError::Closed(identity.to_string()))
            }
        }
    }

    /// Return a claimed entry, moving its identity back to Idle.
    ///
    /// Returns `false` and drops the entry if the identity was closed while
    /// it was streaming.
    pub fn release(&self, entry: SubscriptionEntry) -> bool {
        let mut slots = self.slots();
        let Some(slot) = slots.get_mut(entry.identity()) else {
            tracing::warn!(identity = %entry.identity, "Release for unregistered subscription ignored");
            return false;
        };

        match slot.state {
            SlotState::Streaming => {
                tracing::info!(identity = %entry.identity, "Subscription transitioned to idle");
                slot.state = SlotState::Idle(entry);
                true
            }
            SlotState::Closed => {
                tracing::info!(identity = %entry.identity, "Subscription closed while streaming, not released");
                false
            }
            SlotState::Idle(_) => {
                tracing::warn!(identity = %entry.identity, "Release for idle subscription ignored");
                false
            }
        }
    }

    /// Permanently close a Streaming identity whose session hit a closed
    /// channel.
    pub fn retire(&self, identity: &str) {
        if let Some(slot) = self.slots().get_mut(identity) {
            if matches!(slot.state, SlotState::Streaming) {
                slot.state = SlotState::Closed;
                tracing::info!(identity, "Subscription retired");
            }
        }
    }

    /// Close every slot. Returns the entries that were Idle so the caller
    /// can tear down their channels.
    pub fn close_all(&self) -> Vec<SubscriptionEntry> {
        let mut slots = self.slots();
        let mut idle = Vec::new();
        for slot in slots.values_mut() {
            if let SlotState::Idle(entry) = std::mem::replace(&mut slot.state, SlotState::Closed) {
                idle.push(entry);
            }
        }
        tracing::info!(subscriptions = slots.len(), idle = idle.len(), "All subscriptions closed");
        idle
    }

    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of identities currently streaming.
    pub fn streaming_count(&self) -> usize {
        self.slots()
            .values()
            .filter(|slot| matches!(slot.state, SlotState::Streaming))
            .count()
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
