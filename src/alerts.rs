//! Notifications about the notifier itself failing and restarting.

use std::sync::Arc;
use std::time::Duration;

use calnotify_scheduler::{ClickAction, Notification, NotificationId, Notifier, Urgency};

/// Keeps at most one error or restart notification on screen.
pub struct RestartAlerts {
    notifier: Arc<dyn Notifier>,
    restart_delay: Duration,
    timeout: Duration,
    shown: Option<NotificationId>,
}

impl RestartAlerts {
    pub fn new(notifier: Arc<dyn Notifier>, restart_delay: Duration, timeout: Duration) -> Self {
        Self {
            notifier,
            restart_delay,
            timeout,
            shown: None,
        }
    }

    /// The notifier stopped with `reason`; it stays on screen until replaced.
    pub async fn failed(&mut self, reason: &str) {
        let alert = Notification::critical(
            "calnotify error!",
            format!(
                "{}\nWill restart in {} seconds...",
                reason,
                self.restart_delay.as_secs()
            ),
        );
        self.show(alert).await;
    }

    /// The notifier is starting again. Clicking the notification quits instead.
    pub async fn restarting(&mut self) {
        let notice = Notification {
            title: "calnotify".to_string(),
            body: "Restarting...".to_string(),
            action: Some(ClickAction::Quit),
            timeout: self.timeout,
            urgency: Urgency::Normal,
            replaces: None,
        };
        self.show(notice).await;
    }

    /// Remove whatever alert is still shown.
    pub async fn clear(&mut self) {
        if let Some(id) = self.shown.take() {
            if let Err(e) = self.notifier.close(id).await {
                tracing::debug!("Failed to close notification {}: {}", id, e);
            }
        }
    }

    async fn show(&mut self, notification: Notification) {
        let notification = notification.replacing(self.shown);
        match self.notifier.show(&notification).await {
            Ok(id) => self.shown = Some(id),
            Err(e) => tracing::warn!("Failed to show \"{}\" notification: {}", notification.title, e),
        }
    }
}
