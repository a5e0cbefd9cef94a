//! At-most-once bookkeeping for notifiable instants.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::expand::{instants_for_event, ReminderPolicy};
use crate::instant::{DedupKey, NotifiableInstant};
use crate::store::Snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstantState {
    Pending,
    Fired,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    state: InstantState,
    fire_at: DateTime<Utc>,
}

/// Counts from one reconciliation, for logging.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    pub inserted: usize,
    pub removed: usize,
    pub rescheduled: usize,
}

#[derive(Debug, Default)]
pub struct DedupLedger {
    entries: HashMap<DedupKey, Entry>,
}

impl DedupLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Align the ledger with a new snapshot.
    ///
    /// Entries whose event or instant no longer exists are removed, and so
    /// are entries whose fire time moved, which makes a rescheduled instant
    /// pending again. Every instant in `upcoming` without an entry is added
    /// as pending; existing entries keep their state.
    pub fn reconcile(
        &mut self,
        snapshot: &Snapshot,
        policy: &ReminderPolicy,
        upcoming: &[NotifiableInstant],
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        let current: HashMap<DedupKey, DateTime<Utc>> = snapshot
            .events()
            .iter()
            .flat_map(|event| instants_for_event(event, policy))
            .map(|instant| (instant.key, instant.fire_at))
            .collect();

        self.entries.retain(|key, entry| match current.get(key) {
            None => {
                report.removed += 1;
                false
            }
            Some(fire_at) if *fire_at != entry.fire_at => {
                tracing::debug!("Instant {} moved to {}", key, fire_at);
                report.rescheduled += 1;
                false
            }
            Some(_) => true,
        });

        for instant in upcoming {
            self.entries.entry(instant.key.clone()).or_insert_with(|| {
                report.inserted += 1;
                Entry {
                    state: InstantState::Pending,
                    fire_at: instant.fire_at,
                }
            });
        }

        report
    }

    /// Record that `instant` is being shown. Returns false if it already was.
    pub fn mark_fired(&mut self, instant: &NotifiableInstant) -> bool {
        let entry = self.entries.entry(instant.key.clone()).or_insert(Entry {
            state: InstantState::Pending,
            fire_at: instant.fire_at,
        });
        if entry.state == InstantState::Fired {
            return false;
        }
        entry.state = InstantState::Fired;
        true
    }

    pub fn state(&self, key: &DedupKey) -> Option<InstantState> {
        self.entries.get(key).map(|e| e.state)
    }

    pub fn is_fired(&self, key: &DedupKey) -> bool {
        self.state(key) == Some(InstantState::Fired)
    }

    pub fn is_pending(&self, key: &DedupKey) -> bool {
        self.state(key) == Some(InstantState::Pending)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn fired_count(&self) -> usize {
        self.entries
            .values()
            .filter(|e| e.state == InstantState::Fired)
            .count()
    }
}
