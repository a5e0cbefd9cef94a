use calnotify_core::AuthError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Token set for OAuth2 authentication
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSet {
    /// Access token for API requests
    pub access_token: String,

    /// Optional refresh token for token renewal
    pub refresh_token: Option<String>,

    /// Token expiration timestamp (Unix timestamp)
    pub expires_at: i64,

    /// Scopes granted to this token
    pub scopes: Vec<String>,
}

impl TokenSet {
    /// Check if the token needs refresh (within 5 minutes of expiry)
    pub fn needs_refresh(&self) -> bool {
        let now = chrono::Utc::now().timestamp();
        now >= self.expires_at - 300 // 5 minute buffer
    }

    /// Check if the token is expired
    pub fn is_expired(&self) -> bool {
        let now = chrono::Utc::now().timestamp();
        now >= self.expires_at
    }
}

/// File-based storage for OAuth tokens.
///
/// One JSON file per service under the tokens directory
/// (by default `<config_dir>/calnotify/tokens`).
#[derive(Debug, Clone)]
pub struct TokenStore {
    dir: PathBuf,
}

impl TokenStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Get the token file path for a service
    fn token_path(&self, service: &str) -> PathBuf {
        self.dir.join(format!("{}.json", service))
    }

    /// Store a token set
    ///
    /// # Arguments
    /// * `service` - Service identifier (e.g., "google")
    /// * `token_set` - The token set to store
    pub fn store_token(&self, service: &str, token_set: &TokenSet) -> Result<(), AuthError> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| AuthError::StorageError(format!("create tokens directory: {}", e)))?;

        let path = self.token_path(service);
        let json = serde_json::to_string_pretty(token_set)
            .map_err(|e| AuthError::StorageError(format!("serialize token set: {}", e)))?;

        fs::write(&path, &json)
            .map_err(|e| AuthError::StorageError(format!("write token file: {}", e)))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600))
                .map_err(|e| AuthError::StorageError(format!("restrict token file: {}", e)))?;
        }

        tracing::info!("Stored token for service: {} at {:?}", service, path);
        Ok(())
    }

    /// Retrieve a token set
    pub fn retrieve_token(&self, service: &str) -> Result<TokenSet, AuthError> {
        let path = self.token_path(service);

        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AuthError::TokenNotFound(service.to_string()));
            }
            Err(e) => {
                return Err(AuthError::StorageError(format!("read token file: {}", e)));
            }
        };

        let token_set: TokenSet = serde_json::from_str(&json).map_err(|e| {
            tracing::warn!("Stored token for {} is unreadable: {}", service, e);
            AuthError::InvalidToken
        })?;

        tracing::debug!("Retrieved token for service: {}", service);
        Ok(token_set)
    }

    /// Delete a token set
    pub fn delete_token(&self, service: &str) -> Result<(), AuthError> {
        let path = self.token_path(service);

        if path.exists() {
            fs::remove_file(&path)
                .map_err(|e| AuthError::StorageError(format!("delete token file: {}", e)))?;
            tracing::info!("Deleted token for service: {}", service);
        }

        Ok(())
    }

    /// Check if a token exists for a service
    pub fn has_token(&self, service: &str) -> bool {
        self.retrieve_token(service).is_ok()
    }
}
