//! Notification rendering and the notifier boundary.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use calnotify_calendar::Event;
use calnotify_core::NotificationsConfig;
use thiserror::Error;

use crate::instant::InstantKind;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Urgency {
    #[default]
    Normal,
    Critical,
}

/// What happens when the user clicks the notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickAction {
    /// Open a link in the browser.
    Open(String),
    /// Stop calnotify.
    Quit,
}

impl ClickAction {
    /// Button label for notification services that show one.
    pub fn label(&self) -> &'static str {
        match self {
            ClickAction::Open(_) => "Join",
            ClickAction::Quit => "Click here to quit calnotify",
        }
    }
}

/// Identifier the notification service assigned to a shown notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NotificationId(pub u32);

impl std::fmt::Display for NotificationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub action: Option<ClickAction>,
    pub timeout: Duration,
    pub urgency: Urgency,
    /// A still visible notification this one takes the place of.
    pub replaces: Option<NotificationId>,
}

impl Notification {
    /// A critical notification without a click action, used for process errors.
    pub fn critical(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            action: None,
            timeout: Duration::ZERO,
            urgency: Urgency::Critical,
            replaces: None,
        }
    }

    pub fn replacing(self, id: Option<NotificationId>) -> Self {
        Self {
            replaces: id,
            ..self
        }
    }
}

#[derive(Error, Debug)]
pub enum NotifierError {
    #[error("Notification service unavailable: {0}")]
    Unavailable(String),

    #[error("Notification rejected: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn show(&self, notification: &Notification) -> Result<NotificationId, NotifierError>;

    /// Remove a shown notification. Services that cannot do this ignore it.
    async fn close(&self, _id: NotificationId) -> Result<(), NotifierError> {
        Ok(())
    }
}

#[async_trait]
impl<T: Notifier + ?Sized> Notifier for Arc<T> {
    async fn show(&self, notification: &Notification) -> Result<NotificationId, NotifierError> {
        (**self).show(notification).await
    }

    async fn close(&self, id: NotificationId) -> Result<(), NotifierError> {
        (**self).close(id).await
    }
}

/// Renders event instants into notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationFormat {
    pub timeout: Duration,
    /// Account index appended to Google Meet links.
    pub meeting_authuser: Option<u32>,
}

impl Default for NotificationFormat {
    fn default() -> Self {
        Self::from_config(&NotificationsConfig::default())
    }
}

impl NotificationFormat {
    pub fn from_config(config: &NotificationsConfig) -> Self {
        Self {
            timeout: config.timeout(),
            meeting_authuser: config.meeting_authuser,
        }
    }

    pub fn render(&self, event: &Event, kind: InstantKind) -> Notification {
        let mut body = lead_time_text(kind.lead_time());
        let action = event
            .meeting_link
            .as_deref()
            .map(|link| ClickAction::Open(self.meeting_url(link)));
        if action.is_some() {
            body.push_str("\nClick to join the meeting...");
        }

        Notification {
            title: event.title().to_string(),
            body,
            action,
            timeout: self.timeout,
            urgency: Urgency::Normal,
            replaces: None,
        }
    }

    /// Meet links get the account selector so the browser opens the right profile.
    pub fn meeting_url(&self, link: &str) -> String {
        match self.meeting_authuser {
            Some(index) if link.contains("meet.google.com") && !link.contains('?') => {
                format!("{}?pli=1&authuser={}", link, index)
            }
            _ => link.to_string(),
        }
    }
}

/// "Starting now", "Starting in 10 minutes", "Starting in 2 hours".
pub fn lead_time_text(lead: chrono::Duration) -> String {
    let minutes = lead.num_minutes();
    if minutes <= 0 {
        return "Starting now".to_string();
    }
    if minutes % 60 == 0 {
        let hours = minutes / 60;
        return format!("Starting in {} {}", hours, plural(hours, "hour"));
    }
    format!("Starting in {} {}", minutes, plural(minutes, "minute"))
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        unit.to_string()
    } else {
        format!("{}s", unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calnotify_calendar::EventStatus;
    use chrono::{DateTime, Utc};

    fn event(summary: &str, link: Option<&str>) -> Event {
        let start = DateTime::<Utc>::UNIX_EPOCH;
        Event {
            id: "e1".to_string(),
            calendar_id: "work".to_string(),
            summary: summary.to_string(),
            start,
            end: start + chrono::Duration::minutes(30),
            all_day: false,
            status: EventStatus::Confirmed,
            meeting_link: link.map(str::to_string),
            reminder_offsets: vec![],
        }
    }

    #[test]
    fn test_lead_time_text() {
        assert_eq!(lead_time_text(chrono::Duration::zero()), "Starting now");
        assert_eq!(lead_time_text(chrono::Duration::minutes(1)), "Starting in 1 minute");
        assert_eq!(lead_time_text(chrono::Duration::minutes(10)), "Starting in 10 minutes");
        assert_eq!(lead_time_text(chrono::Duration::minutes(60)), "Starting in 1 hour");
        assert_eq!(lead_time_text(chrono::Duration::minutes(90)), "Starting in 90 minutes");
        assert_eq!(lead_time_text(chrono::Duration::hours(24)), "Starting in 24 hours");
    }

    #[test]
    fn test_render_with_meet_link() {
        let format = NotificationFormat::default();
        let n = format.render(
            &event("Standup", Some("https://meet.google.com/abc-defg-hij")),
            InstantKind::Reminder(chrono::Duration::minutes(10)),
        );

        assert_eq!(n.title, "Standup");
        assert_eq!(n.body, "Starting in 10 minutes\nClick to join the meeting...");
        assert_eq!(
            n.action,
            Some(ClickAction::Open(
                "https://meet.google.com/abc-defg-hij?pli=1&authuser=1".to_string()
            ))
        );
        assert_eq!(n.timeout, Duration::from_millis(1000));
    }

    #[test]
    fn test_render_without_link_or_title() {
        let n = NotificationFormat::default().render(&event("  ", None), InstantKind::Start);
        assert_eq!(n.title, "No Title");
        assert_eq!(n.body, "Starting now");
        assert!(n.action.is_none());
    }

    #[test]
    fn test_replacing_keeps_content() {
        let first = Notification::critical("calnotify error!", "Not signed in");
        let second = first.clone().replacing(Some(NotificationId(7)));
        assert_eq!(second.replaces, Some(NotificationId(7)));
        assert_eq!(second.body, first.body);
        assert_eq!(second.urgency, Urgency::Critical);
    }

    #[test]
    fn test_meeting_url_leaves_other_links_alone() {
        let format = NotificationFormat {
            timeout: Duration::from_secs(1),
            meeting_authuser: Some(2),
        };
        assert_eq!(
            format.meeting_url("https://zoom.us/j/123"),
            "https://zoom.us/j/123"
        );

        let no_index = NotificationFormat {
            meeting_authuser: None,
            ..format
        };
        assert_eq!(
            no_index.meeting_url("https://meet.google.com/x"),
            "https://meet.google.com/x"
        );
    }
}
