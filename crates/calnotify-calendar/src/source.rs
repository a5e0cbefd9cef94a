//! The calendar source boundary used by the event store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use calnotify_auth::GoogleTokenManager;
use chrono::{DateTime, Utc};

use crate::client::{CalendarClient, CALENDAR_API_BASE};
use crate::error::{CalendarError, FetchError};
use crate::types::{Event, EventStatus};

/// Half-open time range `[start, end)` queried from a calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn starting_at(start: DateTime<Utc>, length: chrono::Duration) -> Self {
        Self {
            start,
            end: start
                .checked_add_signed(length)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t < self.end
    }
}

/// Something that returns the events of one calendar in a window.
#[async_trait]
pub trait CalendarSource: Send + Sync {
    /// Events of `calendar_id` overlapping `window`, ordered by start time.
    async fn fetch(&self, calendar_id: &str, window: TimeWindow) -> Result<Vec<Event>, FetchError>;
}

#[async_trait]
impl<T: CalendarSource + ?Sized> CalendarSource for Arc<T> {
    async fn fetch(&self, calendar_id: &str, window: TimeWindow) -> Result<Vec<Event>, FetchError> {
        (**self).fetch(calendar_id, window).await
    }
}

/// Google Calendar backed source.
pub struct GoogleCalendarSource {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<GoogleTokenManager>,
}

impl GoogleCalendarSource {
    /// `request_timeout` bounds every HTTP request made by the source.
    pub fn new(tokens: Arc<GoogleTokenManager>, request_timeout: Duration) -> Result<Self, FetchError> {
        Self::with_base_url(tokens, request_timeout, CALENDAR_API_BASE)
    }

    pub fn with_base_url(
        tokens: Arc<GoogleTokenManager>,
        request_timeout: Duration,
        base_url: &str,
    ) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| FetchError::Network(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.to_string(),
            tokens,
        })
    }

    async fn list(
        &self,
        token: &str,
        calendar_id: &str,
        window: TimeWindow,
    ) -> Result<Vec<Event>, CalendarError> {
        CalendarClient::with_http(self.http.clone(), token, &self.base_url)
            .list_all_events(calendar_id, window.start, window.end)
            .await
    }
}

#[async_trait]
impl CalendarSource for GoogleCalendarSource {
    /// A 401 is retried once with a refreshed token before it counts as an
    /// authentication failure.
    #[tracing::instrument(skip(self), level = "info")]
    async fn fetch(&self, calendar_id: &str, window: TimeWindow) -> Result<Vec<Event>, FetchError> {
        let token = self.tokens.access_token().await?;
        let result = match self.list(&token, calendar_id, window).await {
            Err(err) if err.should_refresh_token() => {
                tracing::info!("Access token rejected, retrying with a refreshed token");
                self.tokens.invalidate(&token).await;
                let token = self.tokens.access_token().await?;
                self.list(&token, calendar_id, window).await
            }
            other => other,
        };

        match result {
            Ok(events) => Ok(events
                .into_iter()
                .filter(|e| e.status != EventStatus::Cancelled)
                .collect()),
            Err(err) => {
                if let CalendarError::RateLimited(secs) = &err {
                    tracing::warn!("Calendar {} rate limited for {}s", calendar_id, secs);
                }
                Err(FetchError::from(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use calnotify_auth::{GoogleOAuth2Provider, TokenSet, TokenStore, GOOGLE_SERVICE};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tokens(dir: &std::path::Path) -> Arc<GoogleTokenManager> {
        let store = TokenStore::new(dir);
        store
            .store_token(
                GOOGLE_SERVICE,
                &TokenSet {
                    access_token: "ya29.test".to_string(),
                    refresh_token: None,
                    expires_at: chrono::Utc::now().timestamp() + 3600,
                    scopes: vec![],
                },
            )
            .unwrap();
        Arc::new(GoogleTokenManager::new(
            GoogleOAuth2Provider::new("id".into(), "secret".into()),
            store,
        ))
    }

    fn window() -> TimeWindow {
        let start = DateTime::parse_from_rfc3339("2024-02-01T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        TimeWindow::starting_at(start, chrono::Duration::hours(24))
    }

    #[test]
    fn test_window_contains() {
        let w = window();
        assert!(w.contains(w.start));
        assert!(!w.contains(w.end));
    }

    #[tokio::test]
    async fn test_fetch_filters_cancelled() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .and(header("Authorization", "Bearer ya29.test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [
                    {
                        "id": "keep",
                        "summary": "Standup",
                        "start": {"dateTime": "2024-02-01T09:00:00Z"},
                        "end": {"dateTime": "2024-02-01T09:15:00Z"}
                    },
                    {
                        "id": "gone",
                        "status": "cancelled",
                        "start": {"dateTime": "2024-02-01T10:00:00Z"},
                        "end": {"dateTime": "2024-02-01T10:15:00Z"}
                    }
                ]
            })))
            .mount(&mock_server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let source = GoogleCalendarSource::with_base_url(
            tokens(dir.path()),
            Duration::from_secs(5),
            &mock_server.uri(),
        )
        .unwrap();

        let events = source.fetch("primary", window()).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, "keep");
    }

    #[tokio::test]
    async fn test_fetch_maps_errors() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calendars/busy/events"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/calendars/denied/events"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/calendars/flaky/events"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&mock_server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let source = GoogleCalendarSource::with_base_url(
            tokens(dir.path()),
            Duration::from_secs(5),
            &mock_server.uri(),
        )
        .unwrap();

        assert!(matches!(
            source.fetch("busy", window()).await,
            Err(FetchError::RateLimit { retry_after: Some(60) })
        ));
        assert!(matches!(
            source.fetch("flaky", window()).await,
            Err(FetchError::Network(_))
        ));
        assert!(matches!(
            source.fetch("denied", window()).await,
            Err(FetchError::Auth(_))
        ));
        // The rejected token cannot be refreshed without a refresh token
        assert!(matches!(
            source.fetch("flaky", window()).await,
            Err(FetchError::Auth(_))
        ));
    }

    #[tokio::test]
    async fn test_rejected_token_is_refreshed_and_retried() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.fresh",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .and(header("Authorization", "Bearer ya29.test"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .and(header("Authorization", "Bearer ya29.fresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [{
                    "id": "standup",
                    "summary": "Standup",
                    "start": {"dateTime": "2024-02-01T09:00:00Z"},
                    "end": {"dateTime": "2024-02-01T09:15:00Z"}
                }]
            })))
            .mount(&mock_server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path());
        store
            .store_token(
                GOOGLE_SERVICE,
                &TokenSet {
                    access_token: "ya29.test".to_string(),
                    refresh_token: Some("1//refresh".to_string()),
                    expires_at: chrono::Utc::now().timestamp() + 3600,
                    scopes: vec![],
                },
            )
            .unwrap();
        let manager = Arc::new(GoogleTokenManager::new(
            GoogleOAuth2Provider::new_with_token_url(
                "id",
                "secret",
                &format!("{}/token", mock_server.uri()),
            ),
            store,
        ));
        let source =
            GoogleCalendarSource::with_base_url(manager, Duration::from_secs(5), &mock_server.uri())
                .unwrap();

        let events = source.fetch("primary", window()).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, "standup");
        // Later fetches use the refreshed token directly
        assert_eq!(source.fetch("primary", window()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_token_rejected_after_refresh_is_auth_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.fresh",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&mock_server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path());
        store
            .store_token(
                GOOGLE_SERVICE,
                &TokenSet {
                    access_token: "ya29.test".to_string(),
                    refresh_token: Some("1//refresh".to_string()),
                    expires_at: chrono::Utc::now().timestamp() + 3600,
                    scopes: vec![],
                },
            )
            .unwrap();
        let manager = Arc::new(GoogleTokenManager::new(
            GoogleOAuth2Provider::new_with_token_url(
                "id",
                "secret",
                &format!("{}/token", mock_server.uri()),
            ),
            store,
        ));
        let source =
            GoogleCalendarSource::with_base_url(manager, Duration::from_secs(5), &mock_server.uri())
                .unwrap();

        assert!(matches!(
            source.fetch("primary", window()).await,
            Err(FetchError::Auth(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_without_login_is_auth_error() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Arc::new(GoogleTokenManager::new(
            GoogleOAuth2Provider::new("id".into(), "secret".into()),
            TokenStore::new(dir.path()),
        ));
        let source = GoogleCalendarSource::with_base_url(
            manager,
            Duration::from_secs(5),
            "http://127.0.0.1:9",
        )
        .unwrap();

        assert!(matches!(
            source.fetch("primary", window()).await,
            Err(FetchError::Auth(_))
        ));
    }
}
