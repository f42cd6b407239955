//! querydesk application binary - composition root.
//!
//! 1. Parse CLI arguments and load configuration from TOML
//! 2. Initialize tracing (stderr; stdout carries replies)
//! 3. `init` writes a default config and stops here
//! 4. Load the schema document into a catalog
//! 5. Wire the intent router around the mock analytics backend
//! 6. Run the requested subcommand

mod cli;
mod driver;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde_json::json;
use tokio::io::{AsyncWriteExt, BufReader};

use querydesk_chat::{ConversationStore, IntentRouter, MockAnalyticsBackend, SchemaCatalog};
use querydesk_core::config::QuerydeskConfig;
use querydesk_core::{init_tracing, QuerydeskError};

use crate::cli::{CliArgs, Command};

/// How often idle conversations are swept.
const EVICTION_INTERVAL: Duration = Duration::from_secs(60);

/// Write the default configuration to `path`.
///
/// An existing file is left alone unless `force` is set.
fn write_default_config(path: &Path, force: bool) -> Result<bool, QuerydeskError> {
    if path.exists() && !force {
        return Ok(false);
    }
    QuerydeskConfig::default().save(path)?;
    Ok(true)
}

/// Periodically drop conversations idle past the configured timeout.
async fn eviction_loop(store: Arc<ConversationStore>) {
    let mut interval = tokio::time::interval(EVICTION_INTERVAL);
    loop {
        interval.tick().await;
        if let Err(e) = store.evict_idle() {
            tracing::warn!(error = %e, "Idle conversation sweep failed");
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    let command = args.command();

    // Config. Loaded before tracing so the configured level applies; `init`
    // never reads the file it is about to write.
    let config_file = args.resolve_config_path();
    let config_exists = config_file.exists() && !matches!(command, Command::Init { .. });
    let config = if config_exists {
        QuerydeskConfig::load(&config_file)?
    } else {
        QuerydeskConfig::default()
    };

    // Tracing.
    init_tracing(&args.resolve_log_level(&config.general.log_level))?;
    tracing::info!("Starting querydesk v{}", env!("CARGO_PKG_VERSION"));

    if let Command::Init { force } = command {
        if !write_default_config(&config_file, force)? {
            return Err(QuerydeskError::Config(format!(
                "{} already exists; pass --force to overwrite",
                config_file.display()
            ))
            .into());
        }
        println!("Wrote default configuration to {}", config_file.display());
        return Ok(());
    }

    if config_exists {
        tracing::info!(path = %config_file.display(), "Configuration loaded");
    } else {
        tracing::info!(path = %config_file.display(), "No configuration file; using defaults");
    }

    // Schema.
    let schema_path = args
        .schema
        .clone()
        .ok_or_else(|| QuerydeskError::Config("--schema <PATH> is required".to_string()))?;
    let catalog = SchemaCatalog::load(&schema_path, &config.query)
        .map_err(|e| QuerydeskError::Schema(format!("{}: {}", schema_path.display(), e)))?;
    let catalog = Arc::new(catalog);

    match command {
        Command::Init { .. } => {}
        Command::Check => {
            let (dimensions, measures) = catalog.describe(usize::MAX);
            let report = json!({
                "model": catalog.model(),
                "view": catalog.view(),
                "fallback_field": catalog.fallback_field(),
                "dimensions": dimensions,
                "measures": measures,
            });
            let mut stdout = tokio::io::stdout();
            stdout
                .write_all(serde_json::to_string_pretty(&report)?.as_bytes())
                .await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
        Command::Run => {
            let backend = Arc::new(MockAnalyticsBackend::new(Arc::clone(&catalog)));
            let router = IntentRouter::from_config(catalog, backend, &config);
            let sweeper = tokio::spawn(eviction_loop(Arc::clone(router.store())));

            tracing::info!(user = %args.user, "Reading classified messages from stdin");
            let stdin = BufReader::new(tokio::io::stdin());
            let handled = driver::run(&router, &args.user, stdin, tokio::io::stdout()).await?;

            sweeper.abort();
            tracing::info!(handled, "querydesk stopped");
        }
    }

    Ok(())
}
