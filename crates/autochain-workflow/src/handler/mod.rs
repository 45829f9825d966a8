//! Action handlers and dispatch.
//!
//! One module per [`ActionType`]; [`execute_action`] matches exhaustively so
//! a new action kind cannot be added without a handler.

pub mod agent_input;
pub mod condition_check;
pub mod delay;
pub mod file_operation;
pub mod notification;
pub mod parallel;
pub mod shell_command;
pub mod tmux_command;

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::{Output, Stdio};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::process::Command;
use tracing::debug;

use autochain_core::config::WorkflowConfig;
use autochain_core::ContextInfo;

use crate::error::ActionError;
use crate::types::{ActionType, WorkflowAction};

pub use agent_input::{AgentChannel, SimulatedAgent};

/// Boxed future returned by [`execute_action`], boxed so parallel actions
/// can recurse.
pub type ActionFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, ActionError>> + Send + 'a>>;

/// Everything a handler needs from its surroundings.
pub struct ActionEnv {
    /// Working directory for shell commands and root for file operations.
    pub project_root: PathBuf,
    pub tmux_binary: String,
    pub notification_title: String,
    pub agent: Arc<dyn AgentChannel>,
}

impl ActionEnv {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self::from_config(project_root, &WorkflowConfig::default())
    }

    pub fn from_config(project_root: impl Into<PathBuf>, config: &WorkflowConfig) -> Self {
        Self {
            project_root: project_root.into(),
            tmux_binary: config.tmux_binary.clone(),
            notification_title: config.notification_title.clone(),
            agent: Arc::new(SimulatedAgent::new(Duration::from_millis(
                config.agent_input_latency_ms,
            ))),
        }
    }

    /// Replace the agent-input collaborator.
    pub fn with_agent(mut self, agent: Arc<dyn AgentChannel>) -> Self {
        self.agent = agent;
        self
    }
}

/// Run one attempt of `action`.
pub fn execute_action<'a>(
    action: &'a WorkflowAction,
    context: &'a ContextInfo,
    env: &'a Arc<ActionEnv>,
) -> ActionFuture<'a> {
    Box::pin(async move {
        debug!(action_type = %action.action_type, command = %action.command, "Executing action");

        match action.action_type {
            ActionType::ShellCommand => shell_command::execute(action, env).await,
            ActionType::TmuxCommand => tmux_command::execute(action, context, env).await,
            ActionType::AgentInput => agent_input::execute(action, context, env).await,
            ActionType::FileOperation => file_operation::execute(action, env).await,
            ActionType::Notification => notification::execute(action, env).await,
            ActionType::Delay => delay::execute(action).await,
            ActionType::ConditionCheck => condition_check::execute(action, context),
            ActionType::ParallelExecution => parallel::execute(action, context, env).await,
        }
    })
}

/// Spawn `command` with piped output and wait at most `timeout_secs`.
///
/// `label` names the command in errors. The child is killed if it outlives
/// the timeout.
pub(crate) async fn run_with_timeout(
    mut command: Command,
    label: &str,
    timeout_secs: u64,
) -> Result<Output, ActionError> {
    let child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ActionError::Spawn {
            command: label.to_string(),
            reason: e.to_string(),
        })?;

    // On timeout the child is dropped and killed via `kill_on_drop(true)`.
    match tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(ActionError::Io(e)),
        Err(_) => Err(ActionError::Timeout {
            command: label.to_string(),
            seconds: timeout_secs,
        }),
    }
}

/// Session for terminal-bound actions: the context's, else `session_name`
/// from the action parameters.
pub(crate) fn resolve_session(action: &WorkflowAction, context: &ContextInfo) -> Option<String> {
    context
        .session_name
        .clone()
        .filter(|s| !s.is_empty())
        .or_else(|| {
            action
                .parameters
                .get("session_name")
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
        })
}
