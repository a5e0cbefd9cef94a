//! Centralized error types for calnotify.
//!
//! This module provides a typed error hierarchy that:
//! - Enables precise error handling throughout the codebase
//! - Provides short operator-facing messages for notifications and logs
//! - Preserves full error context for debugging/logging

use thiserror::Error;

/// Top-level application error type.
///
/// Errors that escape the notifier loop are converted to this type.
/// Use `user_message()` to get a message suitable for a desktop notification.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Calendar or notifier failures surfaced from the scheduler crates.
    #[error("Service error: {0}")]
    Service(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Returns a short, actionable message suitable for a notification body.
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::Network(e) => e.user_message(),
            AppError::Config(e) => e.user_message(),
            AppError::Auth(e) => e.user_message(),
            AppError::Io(_) => "A file operation failed.",
            AppError::Service(_) => "Something went wrong while checking calendars.",
            AppError::Other(_) => "An unexpected error occurred.",
        }
    }

    /// Recover the typed error behind an `anyhow` chain, looking through context.
    pub fn classify(err: anyhow::Error) -> Self {
        let err = match err.downcast::<AuthError>() {
            Ok(e) => return AppError::Auth(e),
            Err(err) => err,
        };
        let err = match err.downcast::<ConfigError>() {
            Ok(e) => return AppError::Config(e),
            Err(err) => err,
        };
        let err = match err.downcast::<NetworkError>() {
            Ok(e) => return AppError::Network(e),
            Err(err) => err,
        };
        match err.downcast::<std::io::Error>() {
            Ok(e) => AppError::Io(e),
            Err(err) => AppError::Other(err),
        }
    }
}

/// Network-related errors (HTTP, connectivity).
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl NetworkError {
    pub fn user_message(&self) -> &'static str {
        match self {
            NetworkError::ConnectionFailed(_) => {
                "Unable to connect. Check your internet connection."
            }
            NetworkError::Timeout => "The request timed out. Will retry on next refresh.",
            NetworkError::ServerError { status, .. } if *status >= 500 => {
                "Google Calendar is experiencing issues. Will retry on next refresh."
            }
            NetworkError::ServerError { .. } => "The request failed.",
            NetworkError::InvalidResponse(_) => "Received an unexpected response.",
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Configuration parse error: {0}")]
    ParseError(String),

    #[error("Missing required setting: {0}")]
    MissingSetting(String),
}

impl ConfigError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::NotFound(_) => "Configuration not found. Using defaults.",
            ConfigError::Invalid(_) => "Invalid configuration. Check your settings.",
            ConfigError::ParseError(_) => "Configuration file is malformed. Check your settings.",
            ConfigError::MissingSetting(_) => "A required setting is missing. Check your settings.",
        }
    }
}

/// Authentication errors (OAuth, tokens, credentials).
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Token expired")]
    TokenExpired,

    #[error("Token not found for service: {0}")]
    TokenNotFound(String),

    #[error("Invalid token")]
    InvalidToken,

    #[error("OAuth flow failed: {0}")]
    OAuthFailed(String),

    #[error("OAuth client credentials are not configured")]
    NotConfigured,

    #[error("Token storage error: {0}")]
    StorageError(String),

    #[error("Port {0} already in use for OAuth callback")]
    PortInUse(u16),

    /// The token endpoint could not be reached; the stored grant may still be valid.
    #[error("Token refresh unavailable: {0}")]
    RefreshUnavailable(String),
}

impl AuthError {
    pub fn user_message(&self) -> &'static str {
        match self {
            AuthError::TokenExpired => "Your session has expired. Run `calnotify login`.",
            AuthError::TokenNotFound(_) => "Not signed in. Run `calnotify login`.",
            AuthError::InvalidToken => "Authentication invalid. Run `calnotify login`.",
            AuthError::OAuthFailed(_) => "Sign-in failed. Please try again.",
            AuthError::NotConfigured => "Google client id/secret missing from config.toml.",
            AuthError::StorageError(_) => "Failed to access stored credentials.",
            AuthError::PortInUse(_) => "Sign-in port is busy. Close other apps and try again.",
            AuthError::RefreshUnavailable(_) => "Could not reach Google to refresh the session.",
        }
    }

    /// Whether the operator has to sign in again before calendars can be read.
    pub fn requires_login(&self) -> bool {
        !matches!(self, AuthError::RefreshUnavailable(_) | AuthError::StorageError(_))
    }
}

/// Extension trait for converting reqwest errors to our error types.
pub trait ReqwestErrorExt {
    fn into_network_error(self) -> NetworkError;
}

impl ReqwestErrorExt for reqwest::Error {
    fn into_network_error(self) -> NetworkError {
        if self.is_timeout() {
            NetworkError::Timeout
        } else if self.is_connect() {
            NetworkError::ConnectionFailed(self.to_string())
        } else if let Some(status) = self.status() {
            NetworkError::ServerError {
                status: status.as_u16(),
                message: self.to_string(),
            }
        } else if self.is_decode() {
            NetworkError::InvalidResponse(self.to_string())
        } else {
            NetworkError::ConnectionFailed(self.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_app_error_conversion() {
        let auth_err = AuthError::TokenExpired;
        let app_err: AppError = auth_err.into();
        assert!(matches!(app_err, AppError::Auth(AuthError::TokenExpired)));
    }

    #[test]
    fn test_classify_looks_through_context() {
        use anyhow::Context;

        let err = Err::<(), _>(AuthError::TokenNotFound("google".into()))
            .context("Not signed in")
            .unwrap_err();
        assert!(matches!(
            AppError::classify(err),
            AppError::Auth(AuthError::TokenNotFound(_))
        ));

        let err = anyhow::anyhow!("something else");
        assert!(matches!(AppError::classify(err), AppError::Other(_)));
    }

    #[test]
    fn test_user_message_propagation() {
        let app_err = AppError::Auth(AuthError::TokenNotFound("google".into()));
        assert_eq!(app_err.user_message(), "Not signed in. Run `calnotify login`.");

        let app_err = AppError::Network(NetworkError::ServerError {
            status: 503,
            message: "unavailable".into(),
        });
        assert!(app_err.user_message().contains("retry"));
    }

    #[test]
    fn test_requires_login() {
        assert!(AuthError::TokenExpired.requires_login());
        assert!(AuthError::InvalidToken.requires_login());
        assert!(!AuthError::RefreshUnavailable("dns".into()).requires_login());
    }
}
