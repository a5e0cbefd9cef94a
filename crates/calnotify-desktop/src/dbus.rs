//! freedesktop.org notifications over the D-Bus session bus.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use calnotify_core::NotificationsConfig;
use calnotify_scheduler::{Notification, NotificationId, Notifier, NotifierError};
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use zbus::zvariant::Value;

use crate::{expire_timeout, run_action, urgency_level, ClickActions, DEFAULT_ACTION};

#[zbus::proxy(
    interface = "org.freedesktop.Notifications",
    default_service = "org.freedesktop.Notifications",
    default_path = "/org/freedesktop/Notifications"
)]
trait Notifications {
    #[allow(clippy::too_many_arguments)]
    fn notify(
        &self,
        app_name: &str,
        replaces_id: u32,
        app_icon: &str,
        summary: &str,
        body: &str,
        actions: &[&str],
        hints: HashMap<&str, Value<'_>>,
        expire_timeout: i32,
    ) -> zbus::Result<u32>;

    fn close_notification(&self, id: u32) -> zbus::Result<()>;

    #[zbus(signal)]
    fn action_invoked(&self, id: u32, action_key: String) -> zbus::Result<()>;

    #[zbus(signal)]
    fn notification_closed(&self, id: u32, reason: u32) -> zbus::Result<()>;
}

pub struct DesktopNotifier {
    proxy: NotificationsProxy<'static>,
    app_name: String,
    icon: String,
    actions: Arc<Mutex<ClickActions>>,
    listeners: Vec<JoinHandle<()>>,
}

impl DesktopNotifier {
    /// Connect to the session bus and start listening for clicks.
    ///
    /// A click on a `ClickAction::Quit` notification cancels `quit`.
    ///
    /// # Errors
    ///
    /// Fails when no session bus or notification daemon is reachable.
    pub async fn connect(
        config: &NotificationsConfig,
        quit: CancellationToken,
    ) -> Result<Self, NotifierError> {
        let connection = zbus::Connection::session().await.map_err(unavailable)?;
        let proxy = NotificationsProxy::new(&connection)
            .await
            .map_err(unavailable)?;

        let actions = Arc::new(Mutex::new(ClickActions::default()));
        let mut invoked = proxy.receive_action_invoked().await.map_err(unavailable)?;
        let mut closed = proxy
            .receive_notification_closed()
            .await
            .map_err(unavailable)?;

        let on_click = {
            let actions = Arc::clone(&actions);
            tokio::spawn(async move {
                while let Some(signal) = invoked.next().await {
                    let Ok(args) = signal.args() else { continue };
                    if args.action_key != DEFAULT_ACTION {
                        continue;
                    }
                    let action = actions.lock().await.take(NotificationId(args.id));
                    if let Some(action) = action {
                        run_action(&action, &quit);
                    }
                }
            })
        };

        let on_close = {
            let actions = Arc::clone(&actions);
            tokio::spawn(async move {
                while let Some(signal) = closed.next().await {
                    if let Ok(args) = signal.args() {
                        actions.lock().await.take(NotificationId(args.id));
                    }
                }
            })
        };

        tracing::info!("Connected to the desktop notification service");
        Ok(Self {
            proxy,
            app_name: config.app_name.clone(),
            icon: config
                .icon
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            actions,
            listeners: vec![on_click, on_close],
        })
    }
}

impl Drop for DesktopNotifier {
    fn drop(&mut self) {
        for listener in &self.listeners {
            listener.abort();
        }
    }
}

#[async_trait]
impl Notifier for DesktopNotifier {
    async fn show(&self, notification: &Notification) -> Result<NotificationId, NotifierError> {
        let buttons: Vec<&str> = match &notification.action {
            Some(action) => vec![DEFAULT_ACTION, action.label()],
            None => Vec::new(),
        };
        let mut hints = HashMap::new();
        hints.insert("urgency", Value::from(urgency_level(notification.urgency)));

        // Held across the call so a click cannot be handled before the action is recorded
        let mut actions = self.actions.lock().await;
        if let Some(replaced) = notification.replaces {
            actions.take(replaced);
        }

        let id = self
            .proxy
            .notify(
                &self.app_name,
                notification.replaces.map_or(0, |id| id.0),
                &self.icon,
                &notification.title,
                &notification.body,
                &buttons,
                hints,
                expire_timeout(notification),
            )
            .await
            .map(NotificationId)
            .map_err(|e| NotifierError::Rejected(e.to_string()))?;

        if let Some(action) = &notification.action {
            actions.insert(id, action.clone());
        }
        tracing::debug!("Notification {} sent to the daemon", id);
        Ok(id)
    }

    async fn close(&self, id: NotificationId) -> Result<(), NotifierError> {
        self.actions.lock().await.take(id);
        self.proxy
            .close_notification(id.0)
            .await
            .map_err(|e| NotifierError::Rejected(e.to_string()))
    }
}

fn unavailable(err: zbus::Error) -> NotifierError {
    NotifierError::Unavailable(err.to_string())
}
