//! Autochain application binary - composition root.
//!
//! 1. Parse CLI flags and load configuration from TOML
//! 2. Initialize tracing
//! 3. Build the automation manager and load saved workflows
//! 4. Monitor until Ctrl-C, then stop, drain and save

mod cli;

use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use autochain_automation::{AutomationError, AutomationManager};
use autochain_core::AutochainConfig;

use cli::CliArgs;

/// How long running executions get to finish after Ctrl-C.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), AutomationError> {
    let args = CliArgs::parse();
    let config_file = args.resolve_config_path();
    let loaded = if config_file.exists() {
        Some(AutochainConfig::load(&config_file)?)
    } else {
        None
    };
    let found = loaded.is_some();
    let mut config = loaded.unwrap_or_default();
    args.apply_overrides(&mut config);

    // Tracing: RUST_LOG wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&config.general.log_level))
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting autochain v{}", env!("CARGO_PKG_VERSION"));
    if found {
        tracing::info!(path = %config_file.display(), "Configuration loaded");
    } else {
        tracing::info!(path = %config_file.display(), "No configuration file, using defaults");
    }

    let manager = AutomationManager::from_config(&config);
    if config.monitor.autoload_workflows {
        match manager.load_config(None) {
            Ok(count) => tracing::info!(count, "Workflows loaded"),
            Err(e) => tracing::warn!(error = %e, "Failed to load workflows"),
        }
    }
    tracing::info!(
        project = %manager.project_path().display(),
        workflows = ?manager.engine().workflow_names(),
        "Automation ready"
    );

    manager.start_monitoring(Duration::from_secs(config.monitor.interval_secs));

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
    }
    tracing::info!("Shutting down");

    manager.stop_monitoring().await;
    if tokio::time::timeout(SHUTDOWN_GRACE, manager.engine().wait_idle())
        .await
        .is_err()
    {
        tracing::warn!("Workflow executions still running, aborting");
        manager.engine().shutdown().await;
    }

    manager.save_config(None)?;
    Ok(())
}
