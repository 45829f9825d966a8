//! CLI argument definitions for the autochain binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

use autochain_core::config::user_config_dir;
use autochain_core::AutochainConfig;

/// Autochain: detect project events and run workflow chains in response.
#[derive(Parser, Debug)]
#[command(name = "autochain", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Project directory to monitor.
    #[arg(short = 'p', long = "project")]
    pub project: Option<PathBuf>,

    /// Seconds between monitoring ticks.
    #[arg(short = 'i', long = "interval")]
    pub interval: Option<u64>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Start without the built-in workflow chains.
    #[arg(long = "no-defaults")]
    pub no_defaults: bool,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > AUTOCHAIN_CONFIG env var > ~/.autochain/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("AUTOCHAIN_CONFIG") {
            return PathBuf::from(p);
        }
        user_config_dir().join("config.toml")
    }

    /// Overlay the flags that were given onto `config`.
    pub fn apply_overrides(&self, config: &mut AutochainConfig) {
        if let Some(ref project) = self.project {
            config.general.project_path = project.display().to_string();
        }
        if let Some(interval) = self.interval {
            config.monitor.interval_secs = interval;
        }
        if let Some(ref level) = self.log_level {
            config.general.log_level = level.clone();
        }
        if self.no_defaults {
            config.workflow.load_default_chains = false;
        }
    }
}
