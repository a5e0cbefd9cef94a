//! In-memory event store with per-calendar merge on refresh.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use calnotify_calendar::{CalendarSource, Event, EventKey, EventStatus, FetchError, TimeWindow};
use futures::future::join_all;
use thiserror::Error;

/// How a calendar fared in the refresh that produced a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalendarStatus {
    /// Events were fetched in this refresh.
    Fresh,
    /// The fetch failed transiently; events are from an earlier refresh.
    Stale(FetchError),
    /// Credentials were rejected; the calendar contributes no events.
    AuthFailed(String),
}

/// Immutable set of events produced by one refresh.
#[derive(Debug, Default)]
pub struct Snapshot {
    events: Vec<Event>,
    index: HashMap<EventKey, usize>,
    calendars: BTreeMap<String, CalendarStatus>,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Snapshot where every calendar seen in `events` is fresh.
    pub fn from_events(events: Vec<Event>) -> Self {
        let mut calendars: BTreeMap<String, (CalendarStatus, Vec<Event>)> = BTreeMap::new();
        for event in events {
            calendars
                .entry(event.calendar_id.clone())
                .or_insert_with(|| (CalendarStatus::Fresh, Vec::new()))
                .1
                .push(event);
        }
        Self::build(calendars)
    }

    fn build(calendars: BTreeMap<String, (CalendarStatus, Vec<Event>)>) -> Self {
        let mut statuses = BTreeMap::new();
        let mut events = Vec::new();
        let mut seen = HashSet::new();

        for (calendar_id, (status, calendar_events)) in calendars {
            for event in calendar_events {
                if event.status == EventStatus::Cancelled {
                    continue;
                }
                if !seen.insert(event.key()) {
                    tracing::debug!("Duplicate event {} ignored", event.key());
                    continue;
                }
                events.push(event);
            }
            statuses.insert(calendar_id, status);
        }

        events.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.key().cmp(&b.key())));
        let index = events
            .iter()
            .enumerate()
            .map(|(i, e)| (e.key(), i))
            .collect();

        Self {
            events,
            index,
            calendars: statuses,
        }
    }

    /// All events, ordered by start time then key.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn get(&self, key: &EventKey) -> Option<&Event> {
        self.index.get(key).map(|i| &self.events[*i])
    }

    pub fn contains(&self, key: &EventKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn calendar_status(&self, calendar_id: &str) -> Option<&CalendarStatus> {
        self.calendars.get(calendar_id)
    }

    pub fn calendar_events<'a>(&'a self, calendar_id: &'a str) -> impl Iterator<Item = &'a Event> + 'a {
        self.events.iter().filter(move |e| e.calendar_id == calendar_id)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Whether calendars with rejected credentials are queried again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    /// Periodic refresh; calendars marked auth-failed are skipped.
    Scheduled,
    /// Operator-requested refresh; every configured calendar is queried.
    Manual,
}

#[derive(Debug)]
pub struct RefreshOutcome {
    pub snapshot: Arc<Snapshot>,
    /// Calendars fetched successfully.
    pub refreshed: Vec<String>,
    pub failures: Vec<(String, FetchError)>,
    /// Calendars not queried because their credentials were rejected earlier.
    pub skipped: Vec<String>,
}

impl RefreshOutcome {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    /// Every queried calendar failed. The merged snapshot is still installed.
    #[error("All {} calendar fetches failed", .failures.len())]
    AllFailed { failures: Vec<(String, FetchError)> },
}

impl StoreError {
    pub fn failures(&self) -> &[(String, FetchError)] {
        match self {
            StoreError::AllFailed { failures } => failures,
        }
    }

    /// True when nothing but credential errors occurred.
    pub fn is_auth_only(&self) -> bool {
        self.failures()
            .iter()
            .all(|(_, e)| matches!(e, FetchError::Auth(_)))
    }
}

/// Holds the current snapshot and replaces it wholesale on refresh.
pub struct EventStore {
    current: Arc<Snapshot>,
    fetch_timeout: Duration,
}

impl EventStore {
    pub fn new(fetch_timeout: Duration) -> Self {
        Self {
            current: Arc::new(Snapshot::empty()),
            fetch_timeout,
        }
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current)
    }

    /// Query every calendar concurrently and merge the results per calendar.
    ///
    /// A calendar that fails with a rate limit or network error keeps the
    /// events of the previous snapshot. A calendar whose credentials are
    /// rejected loses its events and is skipped by later scheduled refreshes.
    /// Calendars missing from `calendar_ids` are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AllFailed`] when every queried calendar failed.
    #[tracing::instrument(skip(self, source, calendar_ids), fields(calendars = calendar_ids.len()))]
    pub async fn refresh<S>(
        &mut self,
        source: &S,
        calendar_ids: &[String],
        window: TimeWindow,
        mode: RefreshMode,
    ) -> Result<RefreshOutcome, StoreError>
    where
        S: CalendarSource + ?Sized,
    {
        let previous = Arc::clone(&self.current);
        let mut unique = HashSet::new();
        let mut queried = Vec::new();
        let mut skipped = Vec::new();

        for id in calendar_ids {
            if !unique.insert(id.as_str()) {
                continue;
            }
            let auth_failed = matches!(
                previous.calendar_status(id),
                Some(CalendarStatus::AuthFailed(_))
            );
            if auth_failed && mode == RefreshMode::Scheduled {
                skipped.push(id.clone());
            } else {
                queried.push(id.clone());
            }
        }

        let timeout = self.fetch_timeout;
        let results = join_all(queried.iter().map(|id| async move {
            let result = match tokio::time::timeout(timeout, source.fetch(id, window)).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::timeout(timeout)),
            };
            (id.clone(), result)
        }))
        .await;

        let mut calendars: BTreeMap<String, (CalendarStatus, Vec<Event>)> = BTreeMap::new();
        for id in &skipped {
            let status = previous
                .calendar_status(id)
                .cloned()
                .unwrap_or(CalendarStatus::AuthFailed(String::new()));
            calendars.insert(id.clone(), (status, Vec::new()));
        }

        let mut refreshed = Vec::new();
        let mut failures = Vec::new();
        for (id, result) in results {
            match result {
                Ok(events) => {
                    tracing::debug!("Calendar {} returned {} events", id, events.len());
                    refreshed.push(id.clone());
                    calendars.insert(id, (CalendarStatus::Fresh, events));
                }
                Err(FetchError::Auth(reason)) => {
                    tracing::error!("Calendar {} rejected credentials: {}", id, reason);
                    failures.push((id.clone(), FetchError::Auth(reason.clone())));
                    calendars.insert(id, (CalendarStatus::AuthFailed(reason), Vec::new()));
                }
                Err(err) => {
                    let kept: Vec<Event> = previous.calendar_events(&id).cloned().collect();
                    tracing::warn!(
                        "Calendar {} fetch failed ({}), keeping {} previous events",
                        id,
                        err,
                        kept.len()
                    );
                    failures.push((id.clone(), err.clone()));
                    calendars.insert(id, (CalendarStatus::Stale(err), kept));
                }
            }
        }

        let snapshot = Arc::new(Snapshot::build(calendars));
        self.current = Arc::clone(&snapshot);

        if !queried.is_empty() && refreshed.is_empty() {
            return Err(StoreError::AllFailed { failures });
        }

        Ok(RefreshOutcome {
            snapshot,
            refreshed,
            failures,
            skipped,
        })
    }
}
