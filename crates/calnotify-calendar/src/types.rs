//! Calendar API types and data structures.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Longest reminder Google Calendar accepts (four weeks).
pub const MAX_REMINDER_MINUTES: i64 = 4 * 7 * 24 * 60;

/// Identity of an event across all watched calendars.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventKey {
    pub calendar_id: String,
    pub event_id: String,
}

impl EventKey {
    pub fn new(calendar_id: impl Into<String>, event_id: impl Into<String>) -> Self {
        Self {
            calendar_id: calendar_id.into(),
            event_id: event_id.into(),
        }
    }
}

impl std::fmt::Display for EventKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.calendar_id, self.event_id)
    }
}

/// Calendar event as seen by the notifier for one poll cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub id: String,
    pub calendar_id: String,
    pub summary: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub all_day: bool,
    pub status: EventStatus,
    /// Video call link (Google Meet or another conference entry point)
    pub meeting_link: Option<String>,
    /// Popup reminder offsets before start, ascending and without duplicates
    pub reminder_offsets: Vec<Duration>,
}

impl Event {
    pub fn key(&self) -> EventKey {
        EventKey::new(&self.calendar_id, &self.id)
    }

    /// Title shown in notifications.
    pub fn title(&self) -> &str {
        if self.summary.trim().is_empty() {
            "No Title"
        } else {
            &self.summary
        }
    }

    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        self.end < now
    }
}

/// Event time - can be a specific datetime or an all-day date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EventTime {
    DateTime(DateTime<Utc>),
    Date(NaiveDate),
}

impl EventTime {
    /// All-day dates are treated as UTC midnight.
    pub fn as_datetime(&self) -> DateTime<Utc> {
        match self {
            EventTime::DateTime(dt) => *dt,
            EventTime::Date(d) => d.and_time(chrono::NaiveTime::MIN).and_utc(),
        }
    }

    pub fn is_all_day(&self) -> bool {
        matches!(self, EventTime::Date(_))
    }
}

/// Event status.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum EventStatus {
    #[default]
    Confirmed,
    Tentative,
    Cancelled,
}

/// Calendar metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Calendar {
    pub id: String,
    pub summary: String,
    pub time_zone: Option<String>,
    pub is_primary: bool,
    pub access_role: AccessRole,
}

/// Calendar access role.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub enum AccessRole {
    Owner,
    Writer,
    #[default]
    Reader,
    FreeBusyReader,
}

// API Response Types

/// Google Calendar API event response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEvent {
    pub id: String,
    pub summary: Option<String>,
    pub start: Option<ApiEventTime>,
    pub end: Option<ApiEventTime>,
    pub status: Option<String>,
    pub hangout_link: Option<String>,
    pub conference_data: Option<ApiConferenceData>,
    pub reminders: Option<ApiReminders>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEventTime {
    pub date_time: Option<String>,
    pub date: Option<String>,
    pub time_zone: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiReminders {
    #[serde(default = "default_use_default")]
    pub use_default: bool,
    #[serde(default)]
    pub overrides: Vec<ApiReminder>,
}

fn default_use_default() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiReminder {
    pub method: String,
    pub minutes: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiConferenceData {
    #[serde(default)]
    pub entry_points: Vec<ApiEntryPoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEntryPoint {
    pub entry_point_type: String,
    pub uri: Option<String>,
}

/// API response for event list.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventListResponse {
    #[serde(default)]
    pub items: Vec<ApiEvent>,
    /// Reminders applied to events with `reminders.useDefault == true`
    #[serde(default)]
    pub default_reminders: Vec<ApiReminder>,
    pub next_page_token: Option<String>,
}

/// API response for calendar list.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarListResponse {
    #[serde(default)]
    pub items: Vec<ApiCalendar>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCalendar {
    pub id: String,
    pub summary: Option<String>,
    pub time_zone: Option<String>,
    #[serde(default)]
    pub primary: bool,
    pub access_role: Option<String>,
}

impl Event {
    /// Convert an API event to a local Event.
    ///
    /// `default_reminders` is the list-level `defaultReminders` of the calendar.
    /// Returns `None` when the event has no usable start time.
    pub fn from_api(api: ApiEvent, calendar_id: &str, default_reminders: &[ApiReminder]) -> Option<Self> {
        let start = match api.start.as_ref().and_then(parse_event_time) {
            Some(start) => start,
            None => {
                tracing::debug!("Skipping event {} without a start time", api.id);
                return None;
            }
        };

        let end = api
            .end
            .as_ref()
            .and_then(parse_event_time)
            .map(|t| t.as_datetime())
            .unwrap_or_else(|| start.as_datetime());

        let status = match api.status.as_deref() {
            Some("tentative") => EventStatus::Tentative,
            Some("cancelled") => EventStatus::Cancelled,
            _ => EventStatus::Confirmed,
        };

        let popup_reminders: Vec<&ApiReminder> = match &api.reminders {
            Some(r) if !r.use_default => r.overrides.iter().collect(),
            _ => default_reminders.iter().collect(),
        };
        let mut reminder_offsets: Vec<Duration> = popup_reminders
            .into_iter()
            .filter(|r| r.method == "popup")
            .filter_map(|r| {
                if !(0..=MAX_REMINDER_MINUTES).contains(&r.minutes) {
                    tracing::debug!("Ignoring reminder {} minutes before {}", r.minutes, api.id);
                    return None;
                }
                Duration::try_minutes(r.minutes)
            })
            .collect();
        reminder_offsets.sort();
        reminder_offsets.dedup();

        let meeting_link = api.hangout_link.clone().or_else(|| {
            api.conference_data.as_ref().and_then(|c| {
                c.entry_points
                    .iter()
                    .find(|e| e.entry_point_type == "video")
                    .and_then(|e| e.uri.clone())
            })
        });

        Some(Self {
            id: api.id,
            calendar_id: calendar_id.to_string(),
            summary: api.summary.unwrap_or_default(),
            start: start.as_datetime(),
            end,
            all_day: start.is_all_day(),
            status,
            meeting_link,
            reminder_offsets,
        })
    }
}

impl From<ApiCalendar> for Calendar {
    fn from(api: ApiCalendar) -> Self {
        let access_role = match api.access_role.as_deref() {
            Some("owner") => AccessRole::Owner,
            Some("writer") => AccessRole::Writer,
            Some("freeBusyReader") => AccessRole::FreeBusyReader,
            _ => AccessRole::Reader,
        };

        Self {
            id: api.id,
            summary: api.summary.unwrap_or_default(),
            time_zone: api.time_zone,
            is_primary: api.primary,
            access_role,
        }
    }
}

fn parse_event_time(api: &ApiEventTime) -> Option<EventTime> {
    if let Some(dt_str) = &api.date_time {
        if let Ok(dt) = DateTime::parse_from_rfc3339(dt_str) {
            return Some(EventTime::DateTime(dt.with_timezone(&Utc)));
        }
    }
    if let Some(date_str) = &api.date {
        if let Ok(date) = NaiveDate::parse_from_str(date_str, "%Y-%m-%d") {
            return Some(EventTime::Date(date));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn popup(minutes: i64) -> ApiReminder {
        ApiReminder {
            method: "popup".to_string(),
            minutes,
        }
    }

    #[test]
    fn test_event_from_api() {
        let json = r#"{
            "id": "event123",
            "summary": "Team Meeting",
            "start": {"dateTime": "2024-02-01T10:00:00+01:00"},
            "end": {"dateTime": "2024-02-01T11:00:00+01:00"},
            "status": "confirmed",
            "htmlLink": "https://calendar.google.com/event?id=123",
            "hangoutLink": "https://meet.google.com/abc-defg-hij"
        }"#;

        let api_event: ApiEvent = serde_json::from_str(json).unwrap();
        let event = Event::from_api(api_event, "primary", &[]).unwrap();

        assert_eq!(event.id, "event123");
        assert_eq!(event.title(), "Team Meeting");
        assert_eq!(event.start.to_rfc3339(), "2024-02-01T09:00:00+00:00");
        assert_eq!(event.status, EventStatus::Confirmed);
        assert_eq!(
            event.meeting_link.as_deref(),
            Some("https://meet.google.com/abc-defg-hij")
        );
        assert!(!event.all_day);
        assert_eq!(event.key(), EventKey::new("primary", "event123"));
    }

    #[test]
    fn test_all_day_event() {
        let json = r#"{
            "id": "event456",
            "summary": "Holiday",
            "start": {"date": "2024-02-01"},
            "end": {"date": "2024-02-02"}
        }"#;

        let api_event: ApiEvent = serde_json::from_str(json).unwrap();
        let event = Event::from_api(api_event, "primary", &[]).unwrap();

        assert!(event.all_day);
        assert_eq!(event.start.to_rfc3339(), "2024-02-01T00:00:00+00:00");
    }

    #[test]
    fn test_event_without_start_is_skipped() {
        let api_event: ApiEvent = serde_json::from_str(r#"{"id": "x"}"#).unwrap();
        assert!(Event::from_api(api_event, "primary", &[]).is_none());
    }

    #[test]
    fn test_override_reminders_popup_only() {
        let json = r#"{
            "id": "e1",
            "start": {"dateTime": "2024-02-01T10:00:00Z"},
            "end": {"dateTime": "2024-02-01T10:30:00Z"},
            "reminders": {
                "useDefault": false,
                "overrides": [
                    {"method": "email", "minutes": 60},
                    {"method": "popup", "minutes": 10},
                    {"method": "popup", "minutes": 1},
                    {"method": "popup", "minutes": 10}
                ]
            }
        }"#;
        let api_event: ApiEvent = serde_json::from_str(json).unwrap();
        let event = Event::from_api(api_event, "primary", &[popup(30)]).unwrap();

        assert_eq!(
            event.reminder_offsets,
            vec![Duration::minutes(1), Duration::minutes(10)]
        );
        assert_eq!(event.title(), "No Title");
    }

    #[test]
    fn test_out_of_range_reminders_are_ignored() {
        let json = r#"{
            "id": "e3",
            "start": {"dateTime": "2024-02-01T10:00:00Z"},
            "end": {"dateTime": "2024-02-01T10:30:00Z"},
            "reminders": {
                "useDefault": false,
                "overrides": [
                    {"method": "popup", "minutes": 1000000000000000},
                    {"method": "popup", "minutes": -5},
                    {"method": "popup", "minutes": 40320},
                    {"method": "popup", "minutes": 15}
                ]
            }
        }"#;
        let api_event: ApiEvent = serde_json::from_str(json).unwrap();
        let event = Event::from_api(api_event, "primary", &[]).unwrap();

        assert_eq!(
            event.reminder_offsets,
            vec![Duration::minutes(15), Duration::minutes(MAX_REMINDER_MINUTES)]
        );
    }

    #[test]
    fn test_use_default_takes_calendar_defaults() {
        let json = r#"{
            "id": "e2",
            "summary": "Sync",
            "start": {"dateTime": "2024-02-01T10:00:00Z"},
            "end": {"dateTime": "2024-02-01T10:30:00Z"},
            "reminders": {"useDefault": true}
        }"#;
        let api_event: ApiEvent = serde_json::from_str(json).unwrap();
        let event = Event::from_api(api_event, "primary", &[popup(30)]).unwrap();
        assert_eq!(event.reminder_offsets, vec![Duration::minutes(30)]);
    }

    #[test]
    fn test_conference_entry_point_link() {
        let json = r#"{
            "id": "e3",
            "start": {"dateTime": "2024-02-01T10:00:00Z"},
            "end": {"dateTime": "2024-02-01T10:30:00Z"},
            "conferenceData": {
                "entryPoints": [
                    {"entryPointType": "phone", "uri": "tel:+1-555-0100"},
                    {"entryPointType": "video", "uri": "https://zoom.us/j/123"}
                ]
            }
        }"#;
        let api_event: ApiEvent = serde_json::from_str(json).unwrap();
        let event = Event::from_api(api_event, "primary", &[]).unwrap();
        assert_eq!(event.meeting_link.as_deref(), Some("https://zoom.us/j/123"));
    }

    #[test]
    fn test_calendar_from_api() {
        let json = r#"{
            "id": "primary",
            "summary": "My Calendar",
            "timeZone": "America/New_York",
            "primary": true,
            "accessRole": "owner"
        }"#;

        let api_calendar: ApiCalendar = serde_json::from_str(json).unwrap();
        let calendar = Calendar::from(api_calendar);

        assert_eq!(calendar.id, "primary");
        assert!(calendar.is_primary);
        assert_eq!(calendar.access_role, AccessRole::Owner);
    }
}
