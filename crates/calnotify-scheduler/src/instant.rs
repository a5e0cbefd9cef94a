//! Notifiable instants and their dedup keys.

use std::cmp::Ordering;
use std::fmt;

use calnotify_calendar::EventKey;
use chrono::{DateTime, Duration, Utc};

/// What an instant announces. `Start` sorts before any `Reminder`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InstantKind {
    Start,
    /// Offset before the event start.
    Reminder(Duration),
}

impl InstantKind {
    /// How long before the event start this instant fires.
    pub fn lead_time(&self) -> Duration {
        match self {
            InstantKind::Start => Duration::zero(),
            InstantKind::Reminder(offset) => *offset,
        }
    }
}

impl fmt::Display for InstantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstantKind::Start => write!(f, "start"),
            InstantKind::Reminder(offset) => write!(f, "reminder-{}m", offset.num_minutes()),
        }
    }
}

/// Identity of one instant; at most one notification is shown per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DedupKey {
    pub event: EventKey,
    pub kind: InstantKind,
}

impl DedupKey {
    pub fn new(event: EventKey, kind: InstantKind) -> Self {
        Self { event, kind }
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.event, self.kind)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifiableInstant {
    pub key: DedupKey,
    pub fire_at: DateTime<Utc>,
}

impl NotifiableInstant {
    pub fn kind(&self) -> InstantKind {
        self.key.kind
    }

    pub fn event_key(&self) -> &EventKey {
        &self.key.event
    }
}

// Fire time first, then starts before reminders, then by event.
impl Ord for NotifiableInstant {
    fn cmp(&self, other: &Self) -> Ordering {
        self.fire_at
            .cmp(&other.fire_at)
            .then_with(|| is_reminder(self.key.kind).cmp(&is_reminder(other.key.kind)))
            .then_with(|| self.key.event.cmp(&other.key.event))
            .then_with(|| self.key.kind.cmp(&other.key.kind))
    }
}

impl PartialOrd for NotifiableInstant {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn is_reminder(kind: InstantKind) -> bool {
    matches!(kind, InstantKind::Reminder(_))
}
