//! Google OAuth2 provider for read-only Calendar access.

use calnotify_core::{AuthError, ReqwestErrorExt};
use serde::{Deserialize, Serialize};

use crate::storage::TokenSet;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar.readonly";

/// Key under which Google tokens are stored.
pub const GOOGLE_SERVICE: &str = "google";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleTokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: u64,
    pub token_type: String,
    #[serde(default)]
    pub scope: String,
}

impl GoogleTokenResponse {
    /// Convert into a storable token set, keeping `previous_refresh` when
    /// Google does not rotate the refresh token.
    pub fn into_token_set(self, previous_refresh: Option<String>) -> TokenSet {
        let expires_at = chrono::Utc::now().timestamp() + self.expires_in as i64;
        TokenSet {
            access_token: self.access_token,
            refresh_token: self.refresh_token.or(previous_refresh),
            expires_at,
            scopes: self
                .scope
                .split(' ')
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GoogleTokenError {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

pub struct GoogleOAuth2Provider {
    pub client_id: String,
    pub client_secret: String,
    client: reqwest::Client,
    token_url: String,
}

impl GoogleOAuth2Provider {
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            client_id,
            client_secret,
            client: reqwest::Client::new(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
        }
    }

    pub fn new_with_token_url(client_id: &str, client_secret: &str, token_url: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            client: reqwest::Client::new(),
            token_url: token_url.to_string(),
        }
    }

    pub fn redirect_uri(port: u16) -> String {
        format!("http://127.0.0.1:{}/callback", port)
    }

    /// Generate authorization URL for OAuth flow.
    /// Returns (url, state) where state should be verified on callback.
    pub fn authorization_url(&self, port: u16) -> (String, String) {
        let state = uuid::Uuid::new_v4().to_string();
        let redirect_uri = Self::redirect_uri(port);

        let url = format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}&access_type=offline&prompt=consent",
            GOOGLE_AUTH_URL,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&redirect_uri),
            urlencoding::encode(CALENDAR_SCOPE),
            urlencoding::encode(&state),
        );

        (url, state)
    }

    /// Exchange authorization code for tokens.
    #[tracing::instrument(skip(self, code), level = "info")]
    pub async fn exchange_code(&self, code: &str, port: u16) -> Result<GoogleTokenResponse, AuthError> {
        let redirect_uri = Self::redirect_uri(port);
        self.token_request(&[
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", &redirect_uri),
        ])
        .await
    }

    /// Refresh an expired access token.
    #[tracing::instrument(skip(self, refresh_token), level = "info")]
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<GoogleTokenResponse, AuthError> {
        self.token_request(&[
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ])
        .await
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<GoogleTokenResponse, AuthError> {
        let response = self
            .client
            .post(&self.token_url)
            .form(form)
            .send()
            .await
            .map_err(|e| AuthError::RefreshUnavailable(e.into_network_error().to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<GoogleTokenResponse>()
                .await
                .map_err(|e| AuthError::OAuthFailed(format!("Failed to parse token response: {}", e)));
        }

        if status.is_server_error() {
            return Err(AuthError::RefreshUnavailable(format!("token endpoint returned {}", status)));
        }

        let text = response.text().await.unwrap_or_default();
        match serde_json::from_str::<GoogleTokenError>(&text) {
            // Revoked or expired grant: the user has to sign in again
            Ok(err) if err.error == "invalid_grant" => {
                tracing::warn!(
                    "Refresh token rejected: {}",
                    err.error_description.unwrap_or_default()
                );
                Err(AuthError::TokenExpired)
            }
            Ok(err) => Err(AuthError::OAuthFailed(format!(
                "{}: {}",
                err.error,
                err.error_description.unwrap_or_default()
            ))),
            Err(_) => Err(AuthError::OAuthFailed(format!("{}: {}", status, text))),
        }
    }
}
