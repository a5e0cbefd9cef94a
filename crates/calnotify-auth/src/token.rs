//! Access token lifecycle: load the stored grant, refresh it when close to expiry.

use calnotify_core::AuthError;
use tokio::sync::Mutex;

use crate::google::{GoogleOAuth2Provider, GOOGLE_SERVICE};
use crate::storage::{TokenSet, TokenStore};

/// Hands out a valid Google access token, refreshing and persisting as needed.
pub struct GoogleTokenManager {
    provider: GoogleOAuth2Provider,
    store: TokenStore,
    cached: Mutex<Option<TokenSet>>,
}

impl GoogleTokenManager {
    pub fn new(provider: GoogleOAuth2Provider, store: TokenStore) -> Self {
        Self {
            provider,
            store,
            cached: Mutex::new(None),
        }
    }

    /// Get a valid access token.
    ///
    /// Returns `AuthError::TokenNotFound` when `calnotify login` has never run,
    /// `AuthError::TokenExpired` when the grant was revoked, and
    /// `AuthError::RefreshUnavailable` when Google could not be reached.
    pub async fn access_token(&self) -> Result<String, AuthError> {
        let mut cached = self.cached.lock().await;

        let current = match cached.take() {
            Some(token) => token,
            None => self.store.retrieve_token(GOOGLE_SERVICE)?,
        };

        if !current.needs_refresh() {
            let access = current.access_token.clone();
            *cached = Some(current);
            return Ok(access);
        }

        let Some(refresh_token) = current.refresh_token.clone() else {
            // A new login may have replaced the grant on disk
            if let Ok(stored) = self.store.retrieve_token(GOOGLE_SERVICE) {
                if stored.access_token != current.access_token && !stored.needs_refresh() {
                    let access = stored.access_token.clone();
                    *cached = Some(stored);
                    return Ok(access);
                }
            }
            *cached = Some(current);
            return Err(AuthError::TokenExpired);
        };

        tracing::info!("Access token close to expiry, refreshing");
        let refreshed = match self.provider.refresh_token(&refresh_token).await {
            Ok(response) => response.into_token_set(Some(refresh_token)),
            Err(e) => {
                // Keep the old grant around so a transient failure retries next time
                *cached = Some(current);
                return Err(e);
            }
        };

        if let Err(e) = self.store.store_token(GOOGLE_SERVICE, &refreshed) {
            tracing::warn!("Could not persist refreshed token: {}", e);
        }

        let access = refreshed.access_token.clone();
        *cached = Some(refreshed);
        Ok(access)
    }

    /// Force a refresh on the next call, after the API rejected `rejected`.
    ///
    /// Does nothing when the cached token has already moved on, so several
    /// requests failing with the same token cause one refresh.
    pub async fn invalidate(&self, rejected: &str) {
        let mut cached = self.cached.lock().await;
        let current = match cached.take() {
            Some(token) => token,
            None => match self.store.retrieve_token(GOOGLE_SERVICE) {
                Ok(token) => token,
                Err(_) => return,
            },
        };
        if current.access_token != rejected {
            *cached = Some(current);
            return;
        }
        *cached = Some(TokenSet {
            expires_at: 0,
            ..current
        });
    }
}
