//! Google Calendar API client.

use chrono::{DateTime, Utc};
use tracing::instrument;

use crate::error::CalendarError;
use crate::types::*;

pub const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// Upper bound on pages followed for one listing.
const MAX_PAGES: usize = 20;

pub struct CalendarClient {
    client: reqwest::Client,
    access_token: String,
    base_url: String,
}

impl CalendarClient {
    pub fn new(access_token: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            access_token: access_token.to_string(),
            base_url: CALENDAR_API_BASE.to_string(),
        }
    }

    /// Build a client sharing an existing connection pool.
    pub fn with_http(client: reqwest::Client, access_token: &str, base_url: &str) -> Self {
        Self {
            client,
            access_token: access_token.to_string(),
            base_url: base_url.to_string(),
        }
    }

    fn auth_header(&self) -> String {
        format!("Bearer {}", self.access_token)
    }

    /// List all calendars of the signed-in account.
    #[instrument(skip(self), level = "info")]
    pub async fn list_calendars(&self) -> Result<Vec<Calendar>, CalendarError> {
        let mut calendars = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let mut url = format!("{}/users/me/calendarList", self.base_url);
            if let Some(pt) = &page_token {
                url.push_str(&format!("?pageToken={}", urlencoding::encode(pt)));
            }

            let response = self
                .client
                .get(&url)
                .header("Authorization", self.auth_header())
                .send()
                .await?;

            let resp: CalendarListResponse = self.handle_response(response, "calendarList").await?;
            calendars.extend(resp.items.into_iter().map(Calendar::from));

            match resp.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        Ok(calendars)
    }

    /// List one page of events from a calendar within a time range.
    #[instrument(skip(self), level = "debug")]
    pub async fn list_events(
        &self,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
        page_token: Option<&str>,
    ) -> Result<EventListResponse, CalendarError> {
        let mut url = format!(
            "{}/calendars/{}/events?timeMin={}&timeMax={}&singleEvents=true&orderBy=startTime&maxResults=250",
            self.base_url,
            urlencoding::encode(calendar_id),
            urlencoding::encode(&time_min.to_rfc3339()),
            urlencoding::encode(&time_max.to_rfc3339()),
        );

        if let Some(pt) = page_token {
            url.push_str(&format!("&pageToken={}", urlencoding::encode(pt)));
        }

        let response = self
            .client
            .get(&url)
            .header("Authorization", self.auth_header())
            .send()
            .await?;

        self.handle_response(response, calendar_id).await
    }

    /// List every event in the range, following pagination, converted to local events.
    #[instrument(skip(self), level = "info")]
    pub async fn list_all_events(
        &self,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<Event>, CalendarError> {
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let page = self
                .list_events(calendar_id, time_min, time_max, page_token.as_deref())
                .await?;

            let defaults = page.default_reminders;
            events.extend(
                page.items
                    .into_iter()
                    .filter_map(|api_event| Event::from_api(api_event, calendar_id, &defaults)),
            );

            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        tracing::info!("Fetched {} events from {}", events.len(), calendar_id);
        Ok(events)
    }

    /// Helper to handle API responses and errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
        resource: &str,
    ) -> Result<T, CalendarError> {
        let status = response.status();

        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| CalendarError::ApiError(format!("JSON parse error: {}", e)));
        }

        match status.as_u16() {
            401 => Err(CalendarError::TokenExpired),
            403 => {
                // Google reports quota exhaustion as 403 with a rate limit reason
                let text = response.text().await.unwrap_or_default();
                if text.contains("rateLimitExceeded") || text.contains("userRateLimitExceeded") {
                    Err(CalendarError::RateLimited(60))
                } else {
                    Err(CalendarError::AuthRequired)
                }
            }
            404 => Err(CalendarError::CalendarNotFound(resource.to_string())),
            429 => {
                let retry_after = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60);
                Err(CalendarError::RateLimited(retry_after))
            }
            code if status.is_server_error() => {
                let text = response.text().await.unwrap_or_default();
                Err(CalendarError::ServerError {
                    status: code,
                    message: text,
                })
            }
            _ => {
                let text = response.text().await.unwrap_or_default();
                Err(CalendarError::ApiError(format!("{}: {}", status, text)))
            }
        }
    }
}
