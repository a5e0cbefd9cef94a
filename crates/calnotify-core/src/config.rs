use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_DIR: &str = "calnotify";
const CONFIG_FILE: &str = "config.toml";
const CALENDAR_IDS_FILE: &str = "calendar_ids.txt";

/// Upper bounds for the scheduler timings
pub const MAX_REFRESH_INTERVAL_SECS: u64 = 24 * 3600;
pub const MAX_LOOKAHEAD_HOURS: u32 = 7 * 24;
pub const MAX_GRACE_SECS: u64 = 3600;
pub const MAX_MIN_SLEEP_MILLIS: u64 = 60 * 1000;
pub const MAX_FETCH_TIMEOUT_SECS: u64 = 3600;
pub const MAX_RESTART_DELAY_SECS: u64 = 3600;

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Add an error
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Add a warning
    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a message summarizing all errors
    pub fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            return String::new();
        }
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application configuration directory
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,

    /// Google OAuth client settings
    #[serde(default)]
    pub google: GoogleConfig,

    /// Which calendars to watch
    #[serde(default)]
    pub calendars: CalendarsConfig,

    /// Wake/sleep and refresh timing
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Reminder offset sources
    #[serde(default)]
    pub reminders: RemindersConfig,

    /// Desktop notification appearance
    #[serde(default)]
    pub notifications: NotificationsConfig,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Google OAuth configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleConfig {
    /// OAuth client ID of a "Desktop app" credential
    /// Create at: https://console.cloud.google.com/apis/credentials
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
    /// Loopback port for the OAuth redirect during `calnotify login`
    #[serde(default = "default_redirect_port")]
    pub redirect_port: u16,
}

fn default_redirect_port() -> u16 {
    8080
}

impl GoogleConfig {
    /// Check if credentials are configured (not placeholders)
    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty()
            && !self.client_secret.is_empty()
            && !self.client_id.starts_with("YOUR_")
            && !self.client_secret.starts_with("YOUR_")
    }
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            client_id: "YOUR_GOOGLE_CLIENT_ID".to_string(),
            client_secret: "YOUR_GOOGLE_CLIENT_SECRET".to_string(),
            redirect_port: default_redirect_port(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalendarsConfig {
    /// File with one calendar id per line (default: `<config_dir>/calendar_ids.txt`)
    #[serde(default)]
    pub ids_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between calendar pulls (default: 10 minutes)
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    /// How far ahead events are fetched and notified
    #[serde(default = "default_lookahead_hours")]
    pub lookahead_hours: u32,
    /// How late an instant may still fire after a delayed wake
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,
    /// Lower bound for a single sleep
    #[serde(default = "default_min_sleep_millis")]
    pub min_sleep_millis: u64,
    /// Upper bound for one calendar fetch
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// Pause before the loop is restarted after a fatal error
    #[serde(default = "default_restart_delay_secs")]
    pub restart_delay_secs: u64,
}

fn default_refresh_interval_secs() -> u64 {
    10 * 60
}

fn default_lookahead_hours() -> u32 {
    24
}

fn default_grace_secs() -> u64 {
    60
}

fn default_min_sleep_millis() -> u64 {
    1000
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_restart_delay_secs() -> u64 {
    5
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval_secs(),
            lookahead_hours: default_lookahead_hours(),
            grace_secs: default_grace_secs(),
            min_sleep_millis: default_min_sleep_millis(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            restart_delay_secs: default_restart_delay_secs(),
        }
    }
}

impl SchedulerConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn lookahead(&self) -> Duration {
        Duration::from_secs(u64::from(self.lookahead_hours) * 3600)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }

    pub fn min_sleep(&self) -> Duration {
        Duration::from_millis(self.min_sleep_millis)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_secs(self.restart_delay_secs)
    }
}

/// How remote reminder offsets combine with `reminders.default_minutes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReminderPrecedence {
    /// Use the calendar's popup reminders; fall back to local defaults when it has none
    #[default]
    Remote,
    /// Ignore remote reminders entirely
    Local,
    /// Union of remote and local offsets
    Merge,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemindersConfig {
    #[serde(default)]
    pub precedence: ReminderPrecedence,
    /// Local reminder offsets, in minutes before start
    #[serde(default)]
    pub default_minutes: Vec<u32>,
    /// Notify for all-day events (start treated as UTC midnight)
    #[serde(default = "default_include_all_day")]
    pub include_all_day: bool,
}

fn default_include_all_day() -> bool {
    true
}

impl Default for RemindersConfig {
    fn default() -> Self {
        Self {
            precedence: ReminderPrecedence::default(),
            default_minutes: Vec::new(),
            include_all_day: default_include_all_day(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    /// Application name shown by the notification daemon
    #[serde(default = "default_app_name")]
    pub app_name: String,
    /// Display timeout in milliseconds
    #[serde(default = "default_timeout_millis")]
    pub timeout_millis: u32,
    /// Optional icon path
    #[serde(default)]
    pub icon: Option<PathBuf>,
    /// Google account index appended to Meet links (`authuser=N`)
    #[serde(default = "default_meeting_authuser")]
    pub meeting_authuser: Option<u32>,
}

fn default_app_name() -> String {
    "Google Calendar Notifier".to_string()
}

fn default_timeout_millis() -> u32 {
    1000
}

fn default_meeting_authuser() -> Option<u32> {
    Some(1)
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            timeout_millis: default_timeout_millis(),
            icon: None,
            meeting_authuser: default_meeting_authuser(),
        }
    }
}

impl NotificationsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.timeout_millis))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Write logs to this file instead of stderr
    #[serde(default)]
    pub file: Option<PathBuf>,
    /// Default filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: None,
            level: default_log_level(),
        }
    }
}

fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_dir: default_config_dir(),
            google: GoogleConfig::default(),
            calendars: CalendarsConfig::default(),
            scheduler: SchedulerConfig::default(),
            reminders: RemindersConfig::default(),
            notifications: NotificationsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from `path` (or the default location), creating a default file if missing
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };

        if !config_path.exists() {
            let mut config = Self::default();
            if let Some(parent) = config_path.parent() {
                config.config_dir = parent.to_path_buf();
            }
            config.save_to(&config_path)?;
            tracing::info!("Wrote default configuration to {}", config_path.display());
            return Ok(config);
        }

        let contents = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file {}", config_path.display()))?;

        let config: Config = toml::from_str(&contents)
            .context("Failed to parse config file")?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();
        let scheduler = &self.scheduler;

        if scheduler.refresh_interval_secs == 0 {
            result.add_error(
                "scheduler.refresh_interval_secs",
                "Refresh interval must be greater than 0",
            );
        } else if scheduler.refresh_interval_secs > MAX_REFRESH_INTERVAL_SECS {
            result.add_error(
                "scheduler.refresh_interval_secs",
                format!("Refresh interval must be at most {} seconds", MAX_REFRESH_INTERVAL_SECS),
            );
        }

        if scheduler.lookahead_hours == 0 {
            result.add_error(
                "scheduler.lookahead_hours",
                "Lookahead window must be greater than 0",
            );
        } else if scheduler.lookahead_hours > MAX_LOOKAHEAD_HOURS {
            result.add_error(
                "scheduler.lookahead_hours",
                format!("Lookahead window must be at most {} hours", MAX_LOOKAHEAD_HOURS),
            );
        }

        if scheduler.fetch_timeout_secs == 0 {
            result.add_error(
                "scheduler.fetch_timeout_secs",
                "Fetch timeout must be greater than 0",
            );
        } else if scheduler.fetch_timeout_secs > MAX_FETCH_TIMEOUT_SECS {
            result.add_error(
                "scheduler.fetch_timeout_secs",
                format!("Fetch timeout must be at most {} seconds", MAX_FETCH_TIMEOUT_SECS),
            );
        } else if scheduler.fetch_timeout_secs >= scheduler.refresh_interval_secs {
            result.add_warning(
                "scheduler.fetch_timeout_secs",
                "Fetch timeout is not shorter than the refresh interval",
            );
        }

        if scheduler.grace_secs == 0 {
            result.add_warning(
                "scheduler.grace_secs",
                "No grace window; late wake-ups will drop notifications",
            );
        } else if scheduler.grace_secs > MAX_GRACE_SECS {
            result.add_error(
                "scheduler.grace_secs",
                format!("Grace window must be at most {} seconds", MAX_GRACE_SECS),
            );
        }

        if scheduler.min_sleep_millis == 0 {
            result.add_error(
                "scheduler.min_sleep_millis",
                "Minimum sleep must be greater than 0",
            );
        } else if scheduler.min_sleep_millis > MAX_MIN_SLEEP_MILLIS {
            result.add_error(
                "scheduler.min_sleep_millis",
                format!("Minimum sleep must be at most {} milliseconds", MAX_MIN_SLEEP_MILLIS),
            );
        }

        if scheduler.restart_delay_secs > MAX_RESTART_DELAY_SECS {
            result.add_error(
                "scheduler.restart_delay_secs",
                format!("Restart delay must be at most {} seconds", MAX_RESTART_DELAY_SECS),
            );
        }

        for minutes in &self.reminders.default_minutes {
            if u64::from(*minutes) * 60 > scheduler.lookahead().as_secs() {
                result.add_warning(
                    "reminders.default_minutes",
                    format!(
                        "Reminder {} minutes before start is beyond the {}-hour lookahead and never fires",
                        minutes, scheduler.lookahead_hours
                    ),
                );
            }
        }

        if self.notifications.timeout_millis == 0 {
            result.add_warning(
                "notifications.timeout_millis",
                "Timeout 0 lets the notification daemon pick a default",
            );
        }

        if let Some(icon) = &self.notifications.icon {
            if !icon.exists() {
                result.add_warning(
                    "notifications.icon",
                    format!("Icon does not exist: {}", icon.display()),
                );
            }
        }

        // Just warn; `run` reports the missing credentials again at startup
        if !self.google.is_configured() {
            result.add_warning(
                "google",
                "Google OAuth not configured - calendars cannot be read",
            );
        }

        result
    }

    /// Path of the calendar id list
    pub fn calendar_ids_path(&self) -> PathBuf {
        self.calendars
            .ids_file
            .clone()
            .unwrap_or_else(|| self.config_dir.join(CALENDAR_IDS_FILE))
    }

    /// Directory holding stored OAuth tokens
    pub fn tokens_dir(&self) -> PathBuf {
        self.config_dir.join("tokens")
    }

    /// Save configuration to file
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        // Ensure config directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        std::fs::write(config_path, contents)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get the path to the configuration file
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join(APP_DIR);

        Ok(config_dir.join(CONFIG_FILE))
    }
}
