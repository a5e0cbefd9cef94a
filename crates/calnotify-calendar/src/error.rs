//! Calendar-specific error types.

use calnotify_core::{AuthError, ReqwestErrorExt};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CalendarError {
    #[error("Authentication required")]
    AuthRequired,

    #[error("Token expired")]
    TokenExpired,

    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    #[error("Calendar not found: {0}")]
    CalendarNotFound(String),

    #[error("Server error {status}: {message}")]
    ServerError { status: u16, message: String },

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

impl CalendarError {
    /// Short message for logs and notifications.
    pub fn user_message(&self) -> String {
        match self {
            Self::AuthRequired => "Access to this calendar was denied".to_string(),
            Self::TokenExpired => "Your session has expired. Run `calnotify login`.".to_string(),
            Self::RateLimited(secs) => format!("Too many requests. Google asked to wait {} seconds.", secs),
            Self::CalendarNotFound(_) => "Calendar not found. Check calendar_ids.txt.".to_string(),
            Self::ServerError { .. } => "Google Calendar is unavailable right now.".to_string(),
            Self::ApiError(msg) => format!("Calendar error: {}", msg),
            Self::NetworkError(_) => "Network error. Check your connection.".to_string(),
        }
    }

    /// Whether this error should trigger a token refresh.
    pub fn should_refresh_token(&self) -> bool {
        matches!(self, Self::TokenExpired)
    }

    /// Whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited(_) | Self::NetworkError(_) | Self::ServerError { .. }
        )
    }
}

/// Failure of one calendar fetch, as seen by the event store.
///
/// `Auth` is not retried until the calendar is reconfigured; `RateLimit` and
/// `Network` are retried at the next scheduled refresh.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Rate limited (retry after {retry_after:?}s)")]
    RateLimit { retry_after: Option<u64> },

    #[error("Network error: {0}")]
    Network(String),
}

impl FetchError {
    /// Timeouts count as network failures.
    pub fn timeout(after: std::time::Duration) -> Self {
        Self::Network(format!("timed out after {:?}", after))
    }

    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Auth(_))
    }
}

impl From<CalendarError> for FetchError {
    fn from(err: CalendarError) -> Self {
        match err {
            CalendarError::AuthRequired
            | CalendarError::TokenExpired
            | CalendarError::CalendarNotFound(_) => FetchError::Auth(err.to_string()),
            CalendarError::RateLimited(secs) => FetchError::RateLimit {
                retry_after: Some(secs),
            },
            CalendarError::ServerError { .. } => FetchError::Network(err.to_string()),
            CalendarError::NetworkError(e) => {
                FetchError::Network(e.into_network_error().to_string())
            }
            // Malformed responses clear up on their own more often than not
            CalendarError::ApiError(msg) => FetchError::Network(msg),
        }
    }
}

impl From<AuthError> for FetchError {
    fn from(err: AuthError) -> Self {
        if err.requires_login() {
            FetchError::Auth(err.to_string())
        } else {
            FetchError::Network(err.to_string())
        }
    }
}
