//! Interactive browser sign-in with a loopback callback server.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use calnotify_core::AuthError;
use tokio::sync::{oneshot, Mutex};
use warp::Filter;

use crate::google::{GoogleOAuth2Provider, GOOGLE_SERVICE};
use crate::storage::{TokenSet, TokenStore};

/// How long to wait for the browser to come back to the callback URL.
const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

type CallbackSender = Arc<Mutex<Option<oneshot::Sender<HashMap<String, String>>>>>;

/// Perform the full OAuth2 flow with the browser and a local callback server,
/// then store the resulting tokens.
pub async fn login(
    provider: &GoogleOAuth2Provider,
    store: &TokenStore,
    port: u16,
) -> Result<TokenSet, AuthError> {
    let (auth_url, expected_state) = provider.authorization_url(port);

    let (tx, rx) = oneshot::channel();
    let tx: CallbackSender = Arc::new(Mutex::new(Some(tx)));

    let routes = warp::get()
        .and(warp::path("callback"))
        .and(warp::query::<HashMap<String, String>>())
        .and(warp::any().map(move || tx.clone()))
        .and_then(|params: HashMap<String, String>, tx: CallbackSender| async move {
            if let Some(sender) = tx.lock().await.take() {
                let _ = sender.send(params);
            }

            Ok::<_, warp::Rejection>(warp::reply::html(
                "<html><body><h1>Authorization complete</h1><p>You can close this window and return to calnotify.</p></body></html>",
            ))
        });

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let (addr, server) = warp::serve(routes)
        .try_bind_with_graceful_shutdown(([127, 0, 0, 1], port), async {
            let _ = shutdown_rx.await;
        })
        .map_err(|_| AuthError::PortInUse(port))?;
    let server = tokio::spawn(server);
    tracing::info!("Waiting for OAuth callback on {}", addr);

    println!("Opening browser for Google sign-in. If it does not open, visit:\n{}", auth_url);
    if let Err(e) = webbrowser::open(&auth_url) {
        tracing::warn!("Failed to open browser: {}", e);
    }

    let params = tokio::time::timeout(CALLBACK_TIMEOUT, rx).await;

    let _ = shutdown_tx.send(());
    let _ = server.await;

    let params = match params {
        Ok(Ok(params)) => params,
        Ok(Err(_)) => return Err(AuthError::OAuthFailed("callback channel closed".into())),
        Err(_) => return Err(AuthError::OAuthFailed("timed out waiting for sign-in".into())),
    };

    let code = callback_code(&params, &expected_state)?;
    let response = provider.exchange_code(&code, port).await?;
    if response.refresh_token.is_none() {
        tracing::warn!("Google did not return a refresh token; sign-in will expire within an hour");
    }

    let token_set = response.into_token_set(None);
    store.store_token(GOOGLE_SERVICE, &token_set)?;

    tracing::info!("OAuth2 flow completed for {}", GOOGLE_SERVICE);
    Ok(token_set)
}

/// Validate the callback query and extract the authorization code.
fn callback_code(params: &HashMap<String, String>, expected_state: &str) -> Result<String, AuthError> {
    if let Some(error) = params.get("error") {
        return Err(AuthError::OAuthFailed(format!("authorization denied: {}", error)));
    }

    let state = params.get("state").map(String::as_str).unwrap_or_default();
    if state != expected_state {
        return Err(AuthError::OAuthFailed("CSRF state mismatch".into()));
    }

    match params.get("code") {
        Some(code) if !code.is_empty() => Ok(code.clone()),
        _ => Err(AuthError::OAuthFailed("callback did not include a code".into())),
    }
}
