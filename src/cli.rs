use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Desktop notifications for upcoming Google Calendar events.
#[derive(Debug, Parser)]
#[command(name = "calnotify")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config.toml (defaults to the user config directory).
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Watch the configured calendars and show notifications (default).
    Run,
    /// Sign in to Google in the browser and store the tokens.
    Login,
    /// Delete the stored Google tokens.
    Logout,
    /// Print the ids of every calendar in the account as JSON.
    ListCalendars,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_default_command_is_none() {
        let cli = Cli::try_parse_from(["calnotify"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_subcommands_and_global_config() {
        let cli = Cli::try_parse_from(["calnotify", "list-calendars", "--config", "/tmp/c.toml"]).unwrap();
        assert_eq!(cli.command, Some(Command::ListCalendars));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
    }
}
