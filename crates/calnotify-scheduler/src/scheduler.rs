//! The notification timeline: refresh, evaluate, sleep.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use calnotify_calendar::{CalendarSource, TimeWindow};
use calnotify_core::{read_calendar_ids, Config, ConfigError};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::expand::{expand, saturating_add, saturating_sub, to_chrono, ReminderPolicy};
use crate::instant::NotifiableInstant;
use crate::ledger::DedupLedger;
use crate::notifier::{NotificationFormat, Notifier};
use crate::store::{EventStore, RefreshMode, Snapshot};

/// Source of the calendar ids to watch, consulted on every refresh.
pub trait CalendarIds: Send + Sync {
    fn calendar_ids(&self) -> Result<Vec<String>, ConfigError>;
}

impl CalendarIds for Vec<String> {
    fn calendar_ids(&self) -> Result<Vec<String>, ConfigError> {
        Ok(self.clone())
    }
}

/// Ids read from a text file, one per line.
#[derive(Debug, Clone)]
pub struct CalendarIdsFile {
    path: PathBuf,
}

impl CalendarIdsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CalendarIds for CalendarIdsFile {
    fn calendar_ids(&self) -> Result<Vec<String>, ConfigError> {
        read_calendar_ids(&self.path)
    }
}

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Cannot read calendar ids: {0}")]
    CalendarIds(#[from] ConfigError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Sleeping until the next deadline or a wake signal.
    Idle,
    /// Firing due instants.
    Evaluating,
    /// Pulling a new snapshot.
    Refreshing,
}

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub refresh_interval: Duration,
    pub min_sleep: Duration,
    /// Longest single sleep. The monotonic timer stops while the machine is
    /// suspended, so deadlines are re-checked against the wall clock at least
    /// this often.
    pub max_sleep: Duration,
    pub fetch_timeout: Duration,
    pub policy: ReminderPolicy,
    pub format: NotificationFormat,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl SchedulerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            refresh_interval: config.scheduler.refresh_interval(),
            min_sleep: config.scheduler.min_sleep(),
            max_sleep: (config.scheduler.grace() / 2).max(config.scheduler.min_sleep()),
            fetch_timeout: config.scheduler.fetch_timeout(),
            policy: ReminderPolicy::from_config(&config.reminders, &config.scheduler),
            format: NotificationFormat::from_config(&config.notifications),
        }
    }
}

/// Handle that asks a running scheduler to refresh immediately.
///
/// The request also clears auth-failed marks, so every configured calendar
/// is queried again.
#[derive(Debug, Clone)]
pub struct RefreshHandle {
    notify: Arc<Notify>,
}

impl RefreshHandle {
    pub fn request_refresh(&self) {
        self.notify.notify_one();
    }
}

enum Wake {
    Deadline,
    Manual,
    Shutdown,
}

/// Owns the ledger and the pending instants of one notification timeline.
pub struct Scheduler<S, N, C> {
    source: S,
    notifier: N,
    clock: C,
    ids: Box<dyn CalendarIds>,
    options: SchedulerOptions,
    store: EventStore,
    snapshot: Arc<Snapshot>,
    ledger: DedupLedger,
    pending: BinaryHeap<Reverse<NotifiableInstant>>,
    state: SchedulerState,
    next_mode: RefreshMode,
    calendar_ids: Option<Vec<String>>,
    next_refresh: DateTime<Utc>,
    fired_since_refresh: bool,
    wake: Arc<Notify>,
}

impl<S, N, C> Scheduler<S, N, C>
where
    S: CalendarSource,
    N: Notifier,
    C: Clock,
{
    pub fn new(
        source: S,
        notifier: N,
        clock: C,
        ids: impl CalendarIds + 'static,
        options: SchedulerOptions,
    ) -> Self {
        let next_refresh = clock.now();
        Self {
            source,
            notifier,
            clock,
            ids: Box::new(ids),
            store: EventStore::new(options.fetch_timeout),
            options,
            snapshot: Arc::new(Snapshot::empty()),
            ledger: DedupLedger::new(),
            pending: BinaryHeap::new(),
            state: SchedulerState::Refreshing,
            next_mode: RefreshMode::Scheduled,
            calendar_ids: None,
            next_refresh,
            fired_since_refresh: false,
            wake: Arc::new(Notify::new()),
        }
    }

    pub fn refresh_handle(&self) -> RefreshHandle {
        RefreshHandle {
            notify: Arc::clone(&self.wake),
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn ledger(&self) -> &DedupLedger {
        &self.ledger
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot)
    }

    pub fn next_refresh(&self) -> DateTime<Utc> {
        self.next_refresh
    }

    /// Pending instants in firing order.
    pub fn pending(&self) -> Vec<NotifiableInstant> {
        let mut instants: Vec<NotifiableInstant> =
            self.pending.iter().map(|Reverse(i)| i.clone()).collect();
        instants.sort();
        instants
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// # Errors
    ///
    /// Fails only when the calendar ids cannot be read on the first refresh.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<(), SchedulerError> {
        tracing::info!("Scheduler started");
        loop {
            match self.state {
                SchedulerState::Refreshing => {
                    let mode = std::mem::replace(&mut self.next_mode, RefreshMode::Scheduled);
                    self.refresh(mode).await?;
                }
                SchedulerState::Evaluating => {
                    self.evaluate().await;
                }
                SchedulerState::Idle => {
                    let sleep = self.next_sleep();
                    tracing::debug!("Sleeping for {:?}", sleep);

                    let wake = Arc::clone(&self.wake);
                    let woke = tokio::select! {
                        _ = shutdown.cancelled() => Wake::Shutdown,
                        _ = wake.notified() => Wake::Manual,
                        _ = tokio::time::sleep(sleep) => Wake::Deadline,
                    };

                    match woke {
                        Wake::Shutdown => {
                            tracing::info!("Scheduler stopped");
                            return Ok(());
                        }
                        Wake::Manual => {
                            tracing::info!("Manual refresh requested");
                            self.next_mode = RefreshMode::Manual;
                            self.state = SchedulerState::Refreshing;
                        }
                        Wake::Deadline => self.state = SchedulerState::Evaluating,
                    }
                }
            }
        }
    }

    /// Pull a new snapshot and rebuild the pending instants from it.
    ///
    /// Leaves the scheduler in `Evaluating`.
    ///
    /// # Errors
    ///
    /// Fails only when the calendar ids were never readable.
    pub async fn refresh(&mut self, mode: RefreshMode) -> Result<(), SchedulerError> {
        let now = self.clock.now();

        let ids = match self.ids.calendar_ids() {
            Ok(ids) => {
                self.calendar_ids = Some(ids.clone());
                ids
            }
            Err(e) => match &self.calendar_ids {
                Some(previous) => {
                    tracing::warn!("Failed to re-read calendar ids, using previous list: {}", e);
                    previous.clone()
                }
                None => return Err(SchedulerError::CalendarIds(e)),
            },
        };
        if ids.is_empty() {
            tracing::warn!("No calendars configured");
        }

        let window = TimeWindow::starting_at(now, self.options.policy.lookahead);
        match self.store.refresh(&self.source, &ids, window, mode).await {
            Ok(outcome) => tracing::info!(
                "Refreshed {} calendars ({} failed, {} skipped), {} events",
                outcome.refreshed.len(),
                outcome.failures.len(),
                outcome.skipped.len(),
                outcome.snapshot.len()
            ),
            Err(e) => tracing::error!("Refresh failed: {}", e),
        }

        self.next_refresh = saturating_add(now, to_chrono(self.options.refresh_interval));
        self.fired_since_refresh = false;
        let snapshot = self.store.snapshot();
        self.apply_snapshot(snapshot);
        Ok(())
    }

    /// Install `snapshot`, reconcile the ledger and rebuild the pending heap.
    pub fn apply_snapshot(&mut self, snapshot: Arc<Snapshot>) {
        let now = self.clock.now();
        let upcoming = expand(&snapshot, now, &self.options.policy);
        let report = self.ledger.reconcile(&snapshot, &self.options.policy, &upcoming);
        tracing::debug!(
            "Ledger reconciled: {} inserted, {} removed, {} rescheduled",
            report.inserted,
            report.removed,
            report.rescheduled
        );

        self.pending = upcoming
            .into_iter()
            .filter(|i| self.ledger.is_pending(&i.key))
            .map(Reverse)
            .collect();
        self.snapshot = snapshot;
        self.state = SchedulerState::Evaluating;
    }

    /// Fire every due instant and pick the next state. Returns the number fired.
    pub async fn evaluate(&mut self) -> usize {
        let now = self.clock.now();
        let earliest = saturating_sub(now, self.options.policy.grace);
        let mut fired = 0;

        while self.pending.peek().is_some_and(|Reverse(top)| top.fire_at <= now) {
            let Some(Reverse(instant)) = self.pending.pop() else {
                break;
            };
            if instant.fire_at < earliest {
                tracing::debug!("Missed {} (due {})", instant.key, instant.fire_at);
                continue;
            }
            if !self.ledger.mark_fired(&instant) {
                continue;
            }
            let Some(event) = self.snapshot.get(instant.event_key()) else {
                continue;
            };

            let notification = self.options.format.render(event, instant.kind());
            tracing::info!("Notification shown: {} ({})", notification.title, instant.key);
            if let Err(e) = self.notifier.show(&notification).await {
                tracing::warn!("Failed to show notification for {}: {}", instant.key, e);
            }
            fired += 1;
        }

        if fired > 0 {
            self.fired_since_refresh = true;
        }

        self.state = if now >= self.next_refresh {
            SchedulerState::Refreshing
        } else if self.pending.is_empty() && self.fired_since_refresh {
            tracing::debug!("Pending instants exhausted, pulling early");
            SchedulerState::Refreshing
        } else {
            SchedulerState::Idle
        };
        fired
    }

    /// Time until the next pending instant or refresh deadline, whichever is
    /// first, bounded by `min_sleep` and `max_sleep`.
    pub fn next_sleep(&self) -> Duration {
        let now = self.clock.now();
        let deadline = match self.pending.peek() {
            Some(Reverse(next)) => next.fire_at.min(self.next_refresh),
            None => self.next_refresh,
        };
        (deadline - now)
            .to_std()
            .unwrap_or(Duration::ZERO)
            .min(self.options.max_sleep)
            .max(self.options.min_sleep)
    }
}
