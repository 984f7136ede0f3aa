//! In-memory ledger of soft-deleted projects.
//!
//! Projects are put in the trash through the HTTP API and stay there until
//! restored or until the cleanup job sweeps them once they are older than
//! the retention period.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use bujo_core::types::{DbId, Timestamp};
use serde::Serialize;

/// A project currently in the trash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrashedProject {
    pub id: DbId,
    pub trashed_at: Timestamp,
}

#[derive(Debug, Default)]
pub struct TrashLedger {
    entries: RwLock<HashMap<DbId, Timestamp>>,
}

impl TrashLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `id` as trashed at `at`.
    ///
    /// Returns `false` if it was already in the trash; the first
    /// timestamp is kept.
    pub fn trash(&self, id: DbId, at: Timestamp) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.contains_key(&id) {
            return false;
        }
        entries.insert(id, at);
        true
    }

    /// Take `id` back out of the trash. Returns `false` if it was not there.
    pub fn restore(&self, id: DbId) -> bool {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }

    /// Every trashed project, oldest first.
    pub fn list(&self) -> Vec<TrashedProject> {
        let mut items: Vec<TrashedProject> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(&id, &trashed_at)| TrashedProject { id, trashed_at })
            .collect();
        items.sort_by_key(|item| (item.trashed_at, item.id));
        items
    }

    /// Remove and return every project trashed at or before `cutoff`,
    /// oldest first.
    pub fn sweep_older_than(&self, cutoff: Timestamp) -> Vec<DbId> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let mut expired: Vec<(Timestamp, DbId)> = entries
            .iter()
            .filter(|&(_, &at)| at <= cutoff)
            .map(|(&id, &at)| (at, id))
            .collect();
        expired.sort();
        for (_, id) in &expired {
            entries.remove(id);
        }
        expired.into_iter().map(|(_, id)| id).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
