//! Desktop notification delivery for calnotify.

#[cfg(target_os = "linux")]
pub mod dbus;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use calnotify_core::NotificationsConfig;
use calnotify_scheduler::{
    ClickAction, Notification, NotificationId, Notifier, NotifierError, Urgency,
};
use tokio_util::sync::CancellationToken;

#[cfg(target_os = "linux")]
pub use dbus::DesktopNotifier;

/// Action key the notification daemon reports for a click on the body.
pub const DEFAULT_ACTION: &str = "default";

/// Click actions remembered for notifications still on screen.
const MAX_TRACKED_ACTIONS: usize = 64;

/// Click actions of shown notifications, by notification id.
///
/// Daemons do not always report closed notifications, so only the newest
/// `MAX_TRACKED_ACTIONS` are kept. Ids grow over time, so the smallest
/// id is the oldest entry.
#[derive(Debug, Default)]
pub struct ClickActions {
    by_id: BTreeMap<NotificationId, ClickAction>,
}

impl ClickActions {
    pub fn insert(&mut self, id: NotificationId, action: ClickAction) {
        self.by_id.insert(id, action);
        while self.by_id.len() > MAX_TRACKED_ACTIONS {
            self.by_id.pop_first();
        }
    }

    pub fn take(&mut self, id: NotificationId) -> Option<ClickAction> {
        self.by_id.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// Carry out a clicked action.
pub fn run_action(action: &ClickAction, quit: &CancellationToken) {
    match action {
        ClickAction::Open(url) => open_link(url),
        ClickAction::Quit => {
            tracing::info!("Quit requested from a notification");
            quit.cancel();
        }
    }
}

/// Writes notifications to the log instead of the desktop.
#[derive(Debug, Default)]
pub struct LogNotifier {
    next_id: AtomicU32,
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn show(&self, notification: &Notification) -> Result<NotificationId, NotifierError> {
        let id = NotificationId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let body = notification.body.replace('\n', " ");
        match &notification.action {
            Some(ClickAction::Open(url)) => {
                tracing::info!("[notification] {}: {} ({})", notification.title, body, url)
            }
            _ => tracing::info!("[notification] {}: {}", notification.title, body),
        }
        Ok(id)
    }
}

/// The best notifier available on this machine.
///
/// Falls back to [`LogNotifier`] when no notification service can be reached.
/// Clicking a quit action cancels `quit`.
pub async fn connect(config: &NotificationsConfig, quit: CancellationToken) -> Arc<dyn Notifier> {
    #[cfg(target_os = "linux")]
    {
        match DesktopNotifier::connect(config, quit).await {
            Ok(notifier) => return Arc::new(notifier),
            Err(e) => tracing::warn!("Desktop notifications unavailable, logging instead: {}", e),
        }
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = (config, quit);
        tracing::warn!("Desktop notifications are not supported on this platform, logging instead");
    }
    Arc::new(LogNotifier::default())
}

/// Open a meeting link in the default browser.
pub fn open_link(url: &str) {
    tracing::info!("Opening {}", url);
    if let Err(e) = webbrowser::open(url) {
        tracing::warn!("Failed to open browser: {}", e);
    }
}

/// Display timeout in milliseconds as the notification daemon expects it.
/// Zero means the notification stays until dismissed.
pub fn expire_timeout(notification: &Notification) -> i32 {
    i32::try_from(notification.timeout.as_millis()).unwrap_or(i32::MAX)
}

/// freedesktop urgency byte.
pub fn urgency_level(urgency: Urgency) -> u8 {
    match urgency {
        Urgency::Normal => 1,
        Urgency::Critical => 2,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use std::time::Duration;

    fn notification(timeout: Duration) -> Notification {
        Notification {
            title: "Standup".to_string(),
            body: "Starting now\nClick to join the meeting...".to_string(),
            action: Some(ClickAction::Open(
                "https://meet.google.com/abc?pli=1&authuser=1".to_string(),
            )),
            timeout,
            urgency: Urgency::Normal,
            replaces: None,
        }
    }

    #[test]
    fn test_expire_timeout() {
        assert_eq!(expire_timeout(&notification(Duration::from_millis(1000))), 1000);
        assert_eq!(
            expire_timeout(&Notification::critical("calnotify error!", "restarting")),
            0
        );
        assert_eq!(
            expire_timeout(&notification(Duration::from_secs(u64::MAX / 1000))),
            i32::MAX
        );
    }

    #[test]
    fn test_urgency_level() {
        assert_eq!(urgency_level(Urgency::Normal), 1);
        assert_eq!(urgency_level(Urgency::Critical), 2);
    }

    #[test]
    fn test_click_actions_drop_oldest() {
        let mut actions = ClickActions::default();
        for id in 1..=(MAX_TRACKED_ACTIONS as u32 + 10) {
            actions.insert(NotificationId(id), ClickAction::Open(format!("https://x/{}", id)));
        }

        assert_eq!(actions.len(), MAX_TRACKED_ACTIONS);
        assert!(actions.take(NotificationId(1)).is_none());
        assert_eq!(
            actions.take(NotificationId(MAX_TRACKED_ACTIONS as u32 + 10)),
            Some(ClickAction::Open(format!("https://x/{}", MAX_TRACKED_ACTIONS + 10)))
        );
        // Taken once
        assert!(actions.take(NotificationId(MAX_TRACKED_ACTIONS as u32 + 10)).is_none());
    }

    #[test]
    fn test_quit_action_cancels() {
        let quit = CancellationToken::new();
        run_action(&ClickAction::Quit, &quit);
        assert!(quit.is_cancelled());
    }

    #[tokio::test]
    async fn test_log_notifier_hands_out_ids() {
        let notifier = LogNotifier::default();
        let first = notifier
            .show(&notification(Duration::from_secs(1)))
            .await
            .unwrap();
        let alert = Notification::critical("calnotify error!", "Will restart in 5 seconds...")
            .replacing(Some(first));
        let second = notifier.show(&alert).await.unwrap();
        assert_ne!(first, second);
        notifier.close(second).await.unwrap();
    }
}
