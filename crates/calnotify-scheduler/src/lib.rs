//! Event-driven notification scheduling for calnotify.
//!
//! The [`Scheduler`] pulls snapshots through an [`EventStore`], expands them
//! into notifiable instants, and fires each instant at most once through a
//! [`Notifier`].

pub mod clock;
pub mod expand;
pub mod instant;
pub mod ledger;
pub mod notifier;
pub mod scheduler;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use expand::{expand, instants_for_event, ReminderPolicy};
pub use instant::{DedupKey, InstantKind, NotifiableInstant};
pub use ledger::{DedupLedger, InstantState, ReconcileReport};
pub use notifier::{
    lead_time_text, ClickAction, Notification, NotificationFormat, NotificationId, Notifier,
    NotifierError, Urgency,
};
pub use scheduler::{
    CalendarIds, CalendarIdsFile, RefreshHandle, Scheduler, SchedulerError, SchedulerOptions,
    SchedulerState,
};
pub use store::{CalendarStatus, EventStore, RefreshMode, RefreshOutcome, Snapshot, StoreError};
