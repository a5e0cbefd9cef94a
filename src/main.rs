mod alerts;
mod cli;

use std::sync::Arc;

use anyhow::{Context, Result};
use calnotify_auth::{GoogleOAuth2Provider, GoogleTokenManager, TokenStore, GOOGLE_SERVICE};
use calnotify_calendar::{CalendarClient, GoogleCalendarSource};
use calnotify_core::{AppError, Config};
use calnotify_scheduler::{
    CalendarIdsFile, Notifier, RefreshHandle, Scheduler, SchedulerOptions, SystemClock,
};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use crate::alerts::RestartAlerts;
use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;
    let _log_guard = calnotify_core::init(&config.logging)?;

    let validation = config.validate();
    for warning in &validation.warnings {
        tracing::warn!("Config warning: {}", warning);
    }
    if !validation.is_valid() {
        anyhow::bail!(
            "Configuration validation failed: {}",
            validation.error_summary()
        );
    }

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => supervise(config).await,
        Command::Login => login(&config).await,
        Command::Logout => logout(&config),
        Command::ListCalendars => list_calendars(&config).await,
    }
}

/// Run the notifier, restarting it after a delay whenever it fails.
async fn supervise(config: Config) -> Result<()> {
    let shutdown = CancellationToken::new();
    spawn_shutdown_listener(shutdown.clone());

    let notifier = calnotify_desktop::connect(&config.notifications, shutdown.clone()).await;
    let delay = config.scheduler.restart_delay();
    let mut alerts = RestartAlerts::new(
        Arc::clone(&notifier),
        delay,
        config.notifications.timeout(),
    );

    loop {
        let result = run_notifier(&config, Arc::clone(&notifier), shutdown.clone()).await;
        let Err(e) = result else {
            alerts.clear().await;
            return Ok(());
        };

        tracing::error!("calnotify stopped: {:#}", e);
        alerts.failed(&AppError::classify(e).user_message()).await;

        tokio::select! {
            _ = shutdown.cancelled() => {
                alerts.clear().await;
                return Ok(());
            }
            _ = tokio::time::sleep(delay) => {}
        }
        tracing::info!("Restarting");
        alerts.restarting().await;
    }
}

async fn run_notifier(
    config: &Config,
    notifier: Arc<dyn Notifier>,
    shutdown: CancellationToken,
) -> Result<()> {
    let tokens = Arc::new(token_manager(config)?);
    tokens
        .access_token()
        .await
        .context("Not signed in to Google, run `calnotify login`")?;

    let source = GoogleCalendarSource::new(tokens, config.scheduler.fetch_timeout())?;
    let ids_path = config.calendar_ids_path();
    tracing::info!("Watching calendars listed in {}", ids_path.display());

    let mut scheduler = Scheduler::new(
        source,
        notifier,
        SystemClock,
        CalendarIdsFile::new(ids_path),
        SchedulerOptions::from_config(config),
    );

    let refresh_listener = spawn_refresh_listener(scheduler.refresh_handle());
    let result = scheduler.run(shutdown).await;
    if let Some(listener) = refresh_listener {
        listener.abort();
    }
    result?;
    Ok(())
}

async fn login(config: &Config) -> Result<()> {
    let provider = provider(config)?;
    let store = TokenStore::new(config.tokens_dir());
    calnotify_auth::login(&provider, &store, config.google.redirect_port).await?;
    println!("Signed in. Tokens stored in {}", config.tokens_dir().display());
    Ok(())
}

fn logout(config: &Config) -> Result<()> {
    let store = TokenStore::new(config.tokens_dir());
    if !store.has_token(GOOGLE_SERVICE) {
        println!("Not signed in.");
        return Ok(());
    }
    store.delete_token(GOOGLE_SERVICE)?;
    println!("Signed out.");
    Ok(())
}

async fn list_calendars(config: &Config) -> Result<()> {
    let token = token_manager(config)?
        .access_token()
        .await
        .context("Not signed in to Google, run `calnotify login`")?;

    let calendars = CalendarClient::new(&token).list_calendars().await?;
    let ids: Vec<&str> = calendars.iter().map(|c| c.id.as_str()).collect();
    println!("{}", serde_json::to_string_pretty(&ids)?);
    Ok(())
}

fn provider(config: &Config) -> Result<GoogleOAuth2Provider> {
    if !config.google.is_configured() {
        anyhow::bail!("Google OAuth client is not configured: set google.client_id and google.client_secret");
    }
    Ok(GoogleOAuth2Provider::new(
        config.google.client_id.clone(),
        config.google.client_secret.clone(),
    ))
}

fn token_manager(config: &Config) -> Result<GoogleTokenManager> {
    Ok(GoogleTokenManager::new(
        provider(config)?,
        TokenStore::new(config.tokens_dir()),
    ))
}

fn spawn_shutdown_listener(shutdown: CancellationToken) {
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        tracing::info!("Shutdown requested");
        shutdown.cancel();
    });
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            tracing::warn!("Cannot listen for SIGTERM: {}", e);
            ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    ctrl_c().await;
}

/// SIGUSR1 asks for an immediate refresh.
#[cfg(unix)]
fn spawn_refresh_listener(handle: RefreshHandle) -> Option<tokio::task::JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::user_defined1()) {
        Ok(mut usr1) => Some(tokio::spawn(async move {
            while usr1.recv().await.is_some() {
                handle.request_refresh();
            }
        })),
        Err(e) => {
            tracing::warn!("Cannot listen for SIGUSR1, manual refresh disabled: {}", e);
            None
        }
    }
}

#[cfg(not(unix))]
fn spawn_refresh_listener(_handle: RefreshHandle) -> Option<tokio::task::JoinHandle<()>> {
    None
}
