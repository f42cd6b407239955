//! CLI argument definitions for the querydesk binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// querydesk: turns classified chat intents into schema-valid analytics queries.
#[derive(Parser, Debug)]
#[command(name = "querydesk", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Path to the JSON schema document.
    #[arg(short = 's', long = "schema", global = true)]
    pub schema: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    /// User id for input lines that do not name one.
    #[arg(short = 'u', long = "user", default_value = "local", global = true)]
    pub user: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Write a configuration file with default settings.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Load the schema and print the catalog description as JSON.
    Check,
    /// Read classified messages as JSON lines on stdin and answer on stdout.
    Run,
}

impl CliArgs {
    /// The subcommand to run; `run` when none is given.
    pub fn command(&self) -> Command {
        self.command.unwrap_or(Command::Run)
    }

    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > QUERYDESK_CONFIG env var > ~/.querydesk/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("QUERYDESK_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the log level.
    ///
    /// Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_level.to_string())
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".querydesk").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".querydesk").join("config.toml");
    }
    PathBuf::from("config.toml")
}
