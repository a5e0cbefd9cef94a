//! Derivation of notifiable instants from a snapshot.

use calnotify_calendar::{Event, EventStatus};
use calnotify_core::{ReminderPrecedence, RemindersConfig, SchedulerConfig};
use chrono::{DateTime, Duration, Utc};

use crate::instant::{DedupKey, InstantKind, NotifiableInstant};
use crate::store::Snapshot;

/// Which reminders an event gets and which instants are still worth showing.
#[derive(Debug, Clone, PartialEq)]
pub struct ReminderPolicy {
    pub precedence: ReminderPrecedence,
    /// Locally configured offsets, ascending and without duplicates.
    pub local_offsets: Vec<Duration>,
    pub include_all_day: bool,
    /// How late an instant may still be shown.
    pub grace: Duration,
    pub lookahead: Duration,
}

impl Default for ReminderPolicy {
    fn default() -> Self {
        Self::from_config(&RemindersConfig::default(), &SchedulerConfig::default())
    }
}

impl ReminderPolicy {
    pub fn from_config(reminders: &RemindersConfig, scheduler: &SchedulerConfig) -> Self {
        let mut local_offsets: Vec<Duration> = reminders
            .default_minutes
            .iter()
            .map(|m| Duration::minutes(i64::from(*m)))
            .collect();
        local_offsets.sort();
        local_offsets.dedup();

        Self {
            precedence: reminders.precedence,
            local_offsets,
            include_all_day: reminders.include_all_day,
            grace: to_chrono(scheduler.grace()),
            lookahead: to_chrono(scheduler.lookahead()),
        }
    }

    /// Reminder offsets that apply to `event`.
    pub fn offsets_for(&self, event: &Event) -> Vec<Duration> {
        let mut offsets = match self.precedence {
            ReminderPrecedence::Remote if !event.reminder_offsets.is_empty() => {
                event.reminder_offsets.clone()
            }
            ReminderPrecedence::Remote | ReminderPrecedence::Local => self.local_offsets.clone(),
            ReminderPrecedence::Merge => event
                .reminder_offsets
                .iter()
                .chain(self.local_offsets.iter())
                .copied()
                .collect(),
        };
        offsets.retain(|o| *o >= Duration::zero());
        offsets.sort();
        offsets.dedup();
        offsets
    }
}

pub(crate) fn to_chrono(d: std::time::Duration) -> Duration {
    Duration::from_std(d).unwrap_or(Duration::MAX)
}

pub(crate) fn saturating_add(t: DateTime<Utc>, d: Duration) -> DateTime<Utc> {
    t.checked_add_signed(d).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

pub(crate) fn saturating_sub(t: DateTime<Utc>, d: Duration) -> DateTime<Utc> {
    t.checked_sub_signed(d).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Every instant of one event, regardless of the current time.
pub fn instants_for_event(event: &Event, policy: &ReminderPolicy) -> Vec<NotifiableInstant> {
    if event.status == EventStatus::Cancelled || (event.all_day && !policy.include_all_day) {
        return Vec::new();
    }

    let key = event.key();
    let mut instants = vec![NotifiableInstant {
        key: DedupKey::new(key.clone(), InstantKind::Start),
        fire_at: event.start,
    }];
    for offset in policy.offsets_for(event) {
        let Some(fire_at) = event.start.checked_sub_signed(offset) else {
            tracing::debug!("Skipping out of range reminder for {}", key);
            continue;
        };
        instants.push(NotifiableInstant {
            key: DedupKey::new(key.clone(), InstantKind::Reminder(offset)),
            fire_at,
        });
    }
    instants
}

/// Instants of `snapshot` that can still fire as seen from `now`.
///
/// Fire times older than the grace window count as missed and are dropped,
/// so waking after a long suspend does not produce a burst of stale
/// notifications. The result is sorted in firing order.
pub fn expand(snapshot: &Snapshot, now: DateTime<Utc>, policy: &ReminderPolicy) -> Vec<NotifiableInstant> {
    let earliest = saturating_sub(now, policy.grace);
    let latest = saturating_add(now, policy.lookahead);

    let mut instants: Vec<NotifiableInstant> = snapshot
        .events()
        .iter()
        .filter(|event| !event.has_ended(now))
        .flat_map(|event| instants_for_event(event, policy))
        .filter(|instant| instant.fire_at >= earliest && instant.fire_at <= latest)
        .collect();
    instants.sort();
    instants
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + Duration::hours(i64::from(h)) + Duration::minutes(i64::from(m))
    }

    fn event(id: &str, start: DateTime<Utc>, offsets: &[i64]) -> Event {
        Event {
            id: id.to_string(),
            calendar_id: "work".to_string(),
            summary: id.to_string(),
            start,
            end: start + Duration::minutes(30),
            all_day: false,
            status: EventStatus::Confirmed,
            meeting_link: None,
            reminder_offsets: offsets.iter().map(|m| Duration::minutes(*m)).collect(),
        }
    }

    fn policy() -> ReminderPolicy {
        ReminderPolicy {
            precedence: ReminderPrecedence::Remote,
            local_offsets: vec![],
            include_all_day: true,
            grace: Duration::seconds(60),
            lookahead: Duration::hours(24),
        }
    }

    #[test]
    fn test_event_without_reminders_has_single_start() {
        let instants = instants_for_event(&event("a", at(9, 0), &[]), &policy());
        assert_eq!(instants.len(), 1);
        assert_eq!(instants[0].kind(), InstantKind::Start);
        assert_eq!(instants[0].fire_at, at(9, 0));
    }

    #[test]
    fn test_n_offsets_give_n_plus_one_distinct_keys() {
        let instants = instants_for_event(&event("a", at(9, 0), &[5, 10, 30]), &policy());
        assert_eq!(instants.len(), 4);
        let keys: HashSet<_> = instants.iter().map(|i| i.key.clone()).collect();
        assert_eq!(keys.len(), 4);
    }

    #[test]
    fn test_standup_at_0850() {
        let snapshot = Snapshot::from_events(vec![event("standup", at(9, 0), &[10])]);
        let instants = expand(&snapshot, at(8, 50), &policy());

        assert_eq!(instants.len(), 2);
        assert_eq!(instants[0].kind(), InstantKind::Reminder(Duration::minutes(10)));
        assert_eq!(instants[0].fire_at, at(8, 50));
        assert_eq!(instants[1].kind(), InstantKind::Start);
        assert_eq!(instants[1].fire_at, at(9, 0));
    }

    #[test]
    fn test_expand_is_idempotent() {
        let snapshot = Snapshot::from_events(vec![
            event("a", at(9, 0), &[10]),
            event("b", at(9, 0), &[]),
            event("c", at(11, 0), &[60, 15]),
        ]);
        let first = expand(&snapshot, at(8, 0), &policy());
        let second = expand(&snapshot, at(8, 0), &policy());
        assert_eq!(first, second);
    }

    #[test]
    fn test_grace_window() {
        let snapshot = Snapshot::from_events(vec![event("a", at(9, 0), &[])]);

        let late = at(9, 0) + Duration::seconds(59);
        assert_eq!(expand(&snapshot, late, &policy()).len(), 1);

        let stale = at(9, 0) + Duration::seconds(61);
        assert!(expand(&snapshot, stale, &policy()).is_empty());
    }

    #[test]
    fn test_unbounded_windows_do_not_overflow() {
        let snapshot = Snapshot::from_events(vec![event("a", at(9, 0), &[10])]);
        let wide = ReminderPolicy {
            grace: to_chrono(std::time::Duration::from_secs(u64::MAX / 2)),
            lookahead: to_chrono(std::time::Duration::from_secs(u64::from(u32::MAX) * 3600)),
            ..policy()
        };
        assert_eq!(expand(&snapshot, at(8, 0), &wide).len(), 2);
    }

    #[test]
    fn test_offset_before_representable_time_is_skipped() {
        let mut e = event("a", at(9, 0), &[]);
        e.reminder_offsets = vec![Duration::MAX];
        let instants = instants_for_event(&e, &policy());
        assert_eq!(instants.len(), 1);
        assert_eq!(instants[0].kind(), InstantKind::Start);
    }

    #[test]
    fn test_ended_events_produce_nothing() {
        let snapshot = Snapshot::from_events(vec![event("a", at(9, 0), &[])]);
        assert!(expand(&snapshot, at(10, 0), &policy()).is_empty());
    }

    #[test]
    fn test_beyond_lookahead_is_excluded() {
        let mut policy = policy();
        policy.lookahead = Duration::hours(1);
        let snapshot = Snapshot::from_events(vec![event("a", at(12, 0), &[120])]);

        let instants = expand(&snapshot, at(9, 30), &policy);
        assert_eq!(instants.len(), 1);
        assert_eq!(instants[0].kind(), InstantKind::Reminder(Duration::minutes(120)));
    }

    #[test]
    fn test_order_start_before_reminder_then_key() {
        let snapshot = Snapshot::from_events(vec![
            event("b", at(9, 10), &[10]),
            event("a", at(9, 0), &[]),
            event("c", at(9, 0), &[]),
        ]);
        let order: Vec<_> = expand(&snapshot, at(8, 0), &policy())
            .into_iter()
            .map(|i| (i.key.event.event_id, i.key.kind))
            .collect();

        assert_eq!(
            order,
            vec![
                ("a".to_string(), InstantKind::Start),
                ("c".to_string(), InstantKind::Start),
                ("b".to_string(), InstantKind::Reminder(Duration::minutes(10))),
                ("b".to_string(), InstantKind::Start),
            ]
        );
    }

    #[test]
    fn test_precedence() {
        let remote = event("a", at(9, 0), &[10]);
        let bare = event("b", at(9, 0), &[]);
        let mut policy = policy();
        policy.local_offsets = vec![Duration::minutes(5)];

        policy.precedence = ReminderPrecedence::Remote;
        assert_eq!(policy.offsets_for(&remote), vec![Duration::minutes(10)]);
        assert_eq!(policy.offsets_for(&bare), vec![Duration::minutes(5)]);

        policy.precedence = ReminderPrecedence::Local;
        assert_eq!(policy.offsets_for(&remote), vec![Duration::minutes(5)]);

        policy.precedence = ReminderPrecedence::Merge;
        assert_eq!(
            policy.offsets_for(&remote),
            vec![Duration::minutes(5), Duration::minutes(10)]
        );
    }

    #[test]
    fn test_all_day_toggle() {
        let mut all_day = event("holiday", at(0, 0), &[]);
        all_day.all_day = true;
        all_day.end = at(24, 0);
        let snapshot = Snapshot::from_events(vec![all_day]);

        assert_eq!(expand(&snapshot, at(0, 0), &policy()).len(), 1);

        let mut policy = policy();
        policy.include_all_day = false;
        assert!(expand(&snapshot, at(0, 0), &policy).is_empty());
    }

    #[test]
    fn test_policy_from_config() {
        let reminders = RemindersConfig {
            default_minutes: vec![10, 5, 10],
            ..Default::default()
        };
        let policy = ReminderPolicy::from_config(&reminders, &SchedulerConfig::default());
        assert_eq!(policy.local_offsets, vec![Duration::minutes(5), Duration::minutes(10)]);
        assert_eq!(policy.grace, Duration::seconds(60));
        assert_eq!(policy.lookahead, Duration::hours(24));
    }
}
