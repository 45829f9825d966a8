use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{AutochainError, Result};

/// Top-level configuration for autochain.
///
/// Loaded from `~/.autochain/config.toml` by default. Each section maps to
/// one of the workspace crates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutochainConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
}

impl AutochainConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AutochainConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| AutochainError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Root of the project being watched. Relative paths resolve against the
    /// process working directory.
    pub project_path: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// JSON file holding the registered workflow chains.
    pub workflows_file: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            project_path: ".".to_string(),
            log_level: "info".to_string(),
            workflows_file: "~/.autochain/automation_config.json".to_string(),
        }
    }
}

/// Monitoring loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Seconds between detection ticks.
    pub interval_secs: u64,
    /// Load `general.workflows_file` on startup.
    pub autoload_workflows: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            autoload_workflows: true,
        }
    }
}

/// Context detector settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Glob patterns watched for file changes.
    pub watched_patterns: Vec<String>,
    /// Directory names never descended into while scanning.
    pub ignored_dirs: Vec<String>,
    /// Minimum score for a content match to be reported.
    pub min_confidence: f64,
    /// Seconds of inactivity before the agent counts as idle.
    pub idle_threshold_secs: u64,
    pub git_timeout_secs: u64,
    pub test_timeout_secs: u64,
    pub build_timeout_secs: u64,
    /// Quick test commands, tried in order until one succeeds.
    pub test_commands: Vec<Vec<String>>,
    /// Quick build commands, tried in order until one succeeds.
    pub build_commands: Vec<Vec<String>>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            watched_patterns: ["*.py", "*.js", "*.ts", "*.md", "package.json", "requirements.txt"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            ignored_dirs: [".git", "node_modules", "target"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            min_confidence: 0.6,
            idle_threshold_secs: 30,
            git_timeout_secs: 5,
            test_timeout_secs: 30,
            build_timeout_secs: 60,
            test_commands: command_list(&[
                &["npm", "test", "--", "--passWithNoTests"],
                &["pytest", "--tb=no", "-q"],
                &["python", "-m", "pytest", "--tb=no", "-q"],
                &["cargo", "test", "--quiet"],
            ]),
            build_commands: command_list(&[
                &["npm", "run", "build"],
                &["yarn", "build"],
                &["python", "setup.py", "check"],
                &["cargo", "check"],
            ]),
        }
    }
}

fn command_list(commands: &[&[&str]]) -> Vec<Vec<String>> {
    commands
        .iter()
        .map(|argv| argv.iter().map(|s| s.to_string()).collect())
        .collect()
}

/// Workflow engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Completed executions retained in history.
    pub history_limit: usize,
    /// Seed the registry with the built-in example chains.
    pub load_default_chains: bool,
    /// Executable used for tmux-command actions.
    pub tmux_binary: String,
    /// Title used by notification actions that do not set one.
    pub notification_title: String,
    /// Simulated latency of agent-input actions, in milliseconds.
    pub agent_input_latency_ms: u64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            history_limit: 100,
            load_default_chains: true,
            tmux_binary: "tmux".to_string(),
            notification_title: "Autochain".to_string(),
            agent_input_latency_ms: 100,
        }
    }
}

/// Expand a leading `~/` against the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        if let Some(home) = home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// The per-user autochain directory (`~/.autochain`).
pub fn user_config_dir() -> PathBuf {
    home_dir()
        .map(|home| home.join(".autochain"))
        .unwrap_or_else(|| PathBuf::from(".autochain"))
}

fn home_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    let var = "USERPROFILE";
    #[cfg(not(target_os = "windows"))]
    let var = "HOME";
    std::env::var(var).ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = AutochainConfig::default();
        assert_eq!(config.monitor.interval_secs, 5);
        assert_eq!(config.detector.min_confidence, 0.6);
        assert_eq!(config.detector.idle_threshold_secs, 30);
        assert_eq!(config.detector.test_commands.len(), 4);
        assert_eq!(config.detector.build_commands[3], vec!["cargo", "check"]);
        assert_eq!(config.workflow.history_limit, 100);
        assert!(config.workflow.load_default_chains);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let toml_str = r#"
            [monitor]
            interval_secs = 12

            [detector]
            watched_patterns = ["*.rs"]
        "#;
        let config: AutochainConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.monitor.interval_secs, 12);
        assert!(config.monitor.autoload_workflows);
        assert_eq!(config.detector.watched_patterns, vec!["*.rs"]);
        assert_eq!(config.detector.git_timeout_secs, 5);
        assert_eq!(config.general.log_level, "info");
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = AutochainConfig::default();
        config.general.project_path = "/srv/app".to_string();
        config.workflow.history_limit = 7;
        config.save(&path).unwrap();

        let loaded = AutochainConfig::load(&path).unwrap();
        assert_eq!(loaded.general.project_path, "/srv/app");
        assert_eq!(loaded.workflow.history_limit, 7);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "monitor = [[[").unwrap();
        assert!(AutochainConfig::load(&path).is_err());
        assert!(AutochainConfig::load(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_expand_home_leaves_plain_paths() {
        assert_eq!(expand_home("/etc/autochain"), PathBuf::from("/etc/autochain"));
        assert_eq!(expand_home("relative/file"), PathBuf::from("relative/file"));
    }
}
