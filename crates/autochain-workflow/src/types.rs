//! Core types for the workflow engine.
//!
//! Defines actions, chains, executions and their supporting enumerations.
//! Every type serializes to the workflow configuration JSON format.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use autochain_core::{ContextInfo, ContextType, Timestamp};

// =============================================================================
// Enums
// =============================================================================

/// Action kinds, one handler module each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    ShellCommand,
    TmuxCommand,
    #[serde(alias = "claude_input")]
    AgentInput,
    FileOperation,
    Notification,
    Delay,
    ConditionCheck,
    ParallelExecution,
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionType::ShellCommand => write!(f, "shell_command"),
            ActionType::TmuxCommand => write!(f, "tmux_command"),
            ActionType::AgentInput => write!(f, "agent_input"),
            ActionType::FileOperation => write!(f, "file_operation"),
            ActionType::Notification => write!(f, "notification"),
            ActionType::Delay => write!(f, "delay"),
            ActionType::ConditionCheck => write!(f, "condition_check"),
            ActionType::ParallelExecution => write!(f, "parallel_execution"),
        }
    }
}

impl std::str::FromStr for ActionType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shell_command" => Ok(ActionType::ShellCommand),
            "tmux_command" => Ok(ActionType::TmuxCommand),
            "agent_input" | "claude_input" => Ok(ActionType::AgentInput),
            "file_operation" => Ok(ActionType::FileOperation),
            "notification" => Ok(ActionType::Notification),
            "delay" => Ok(ActionType::Delay),
            "condition_check" => Ok(ActionType::ConditionCheck),
            "parallel_execution" => Ok(ActionType::ParallelExecution),
            _ => Err(format!("Unknown action type: {}", s)),
        }
    }
}

/// Execution lifecycle: `Pending -> Running -> {Completed | Failed}`.
///
/// `Cancelled` and `Paused` are reserved; the engine never assigns them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Paused,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Cancelled
        )
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowStatus::Pending => write!(f, "pending"),
            WorkflowStatus::Running => write!(f, "running"),
            WorkflowStatus::Completed => write!(f, "completed"),
            WorkflowStatus::Failed => write!(f, "failed"),
            WorkflowStatus::Cancelled => write!(f, "cancelled"),
            WorkflowStatus::Paused => write!(f, "paused"),
        }
    }
}

// =============================================================================
// Actions and chains
// =============================================================================

fn default_timeout() -> u64 {
    60
}

fn default_retry_delay() -> u64 {
    5
}

fn default_priority() -> i32 {
    1
}

fn default_enabled() -> bool {
    true
}

/// A single unit of work inside a chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowAction {
    pub action_type: ActionType,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    /// Seconds allowed for subprocess-backed actions.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub retry_count: u32,
    /// Fixed seconds between attempts.
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,
    #[serde(default)]
    pub continue_on_failure: bool,
    #[serde(default)]
    pub condition: Option<String>,
}

impl WorkflowAction {
    pub fn new(action_type: ActionType, command: impl Into<String>) -> Self {
        Self {
            action_type,
            command: command.into(),
            parameters: Map::new(),
            timeout: default_timeout(),
            retry_count: 0,
            retry_delay: default_retry_delay(),
            continue_on_failure: false,
            condition: None,
        }
    }

    pub fn shell(command: impl Into<String>) -> Self {
        Self::new(ActionType::ShellCommand, command)
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout = seconds;
        self
    }

    pub fn with_retries(mut self, count: u32, delay_seconds: u64) -> Self {
        self.retry_count = count;
        self.retry_delay = delay_seconds;
        self
    }

    pub fn allow_failure(mut self) -> Self {
        self.continue_on_failure = true;
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }
}

/// A named, ordered list of actions triggered by one or more context types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowChain {
    pub name: String,
    pub trigger_contexts: Vec<ContextType>,
    pub actions: Vec<WorkflowAction>,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub description: String,
}

impl WorkflowChain {
    pub fn new(name: impl Into<String>, trigger_contexts: Vec<ContextType>) -> Self {
        Self {
            name: name.into(),
            trigger_contexts,
            actions: Vec::new(),
            priority: default_priority(),
            enabled: true,
            description: String::new(),
        }
    }

    pub fn with_action(mut self, action: WorkflowAction) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// True if this chain is enabled and listens for `context_type`.
    pub fn triggers_on(&self, context_type: ContextType) -> bool {
        self.enabled && self.trigger_contexts.contains(&context_type)
    }
}

// =============================================================================
// Executions
// =============================================================================

/// Outcome of one attempt of one action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionAttempt {
    pub action_index: usize,
    /// 1-based attempt number.
    pub attempt: u32,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: Timestamp,
}

impl ActionAttempt {
    pub fn succeeded(action_index: usize, attempt: u32, result: Value) -> Self {
        Self {
            action_index,
            attempt,
            success: true,
            result: Some(result),
            error: None,
            timestamp: Timestamp::now(),
        }
    }

    pub fn failed(action_index: usize, attempt: u32, error: impl Into<String>) -> Self {
        Self {
            action_index,
            attempt,
            success: false,
            result: None,
            error: Some(error.into()),
            timestamp: Timestamp::now(),
        }
    }
}

/// One concrete run of a chain against one context occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub execution_id: String,
    pub workflow_name: String,
    pub context_info: ContextInfo,
    pub status: WorkflowStatus,
    pub start_time: Timestamp,
    #[serde(default)]
    pub end_time: Option<Timestamp>,
    /// Index of the action being (or last) processed.
    #[serde(default)]
    pub current_action: usize,
    #[serde(default)]
    pub results: Vec<ActionAttempt>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl WorkflowExecution {
    pub fn pending(
        execution_id: impl Into<String>,
        workflow_name: impl Into<String>,
        context_info: ContextInfo,
    ) -> Self {
        Self {
            execution_id: execution_id.into(),
            workflow_name: workflow_name.into(),
            context_info,
            status: WorkflowStatus::Pending,
            start_time: Timestamp::now(),
            end_time: None,
            current_action: 0,
            results: Vec::new(),
            error_message: None,
        }
    }

    /// Wall-clock duration in seconds, once finished.
    pub fn duration_secs(&self) -> Option<f64> {
        self.end_time.map(|end| self.start_time.seconds_until(end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_type_display_matches_serde() {
        for at in [
            ActionType::ShellCommand,
            ActionType::TmuxCommand,
            ActionType::AgentInput,
            ActionType::FileOperation,
            ActionType::Notification,
            ActionType::Delay,
            ActionType::ConditionCheck,
            ActionType::ParallelExecution,
        ] {
            let json = serde_json::to_string(&at).unwrap();
            assert_eq!(json, format!("\"{}\"", at));
            assert_eq!(at.to_string().parse::<ActionType>().unwrap(), at);
        }
    }

    #[test]
    fn test_action_type_accepts_legacy_agent_name() {
        let at: ActionType = serde_json::from_str("\"claude_input\"").unwrap();
        assert_eq!(at, ActionType::AgentInput);
        assert_eq!("claude_input".parse::<ActionType>().unwrap(), ActionType::AgentInput);
        assert!("teleport".parse::<ActionType>().is_err());
    }

    #[test]
    fn test_status_terminal() {
        assert!(!WorkflowStatus::Pending.is_terminal());
        assert!(!WorkflowStatus::Running.is_terminal());
        assert!(WorkflowStatus::Completed.is_terminal());
        assert!(WorkflowStatus::Failed.is_terminal());
        assert_eq!(WorkflowStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn test_action_defaults_when_deserializing() {
        let action: WorkflowAction =
            serde_json::from_value(json!({"action_type": "delay", "command": "1"})).unwrap();
        assert_eq!(action.timeout, 60);
        assert_eq!(action.retry_count, 0);
        assert_eq!(action.retry_delay, 5);
        assert!(!action.continue_on_failure);
        assert!(action.condition.is_none());
        assert!(action.parameters.is_empty());
    }

    #[test]
    fn test_action_serializes_all_fields() {
        let action = WorkflowAction::shell("npm run build")
            .with_timeout(180)
            .with_condition("context_type == 'git_commit'");
        let value = serde_json::to_value(&action).unwrap();
        assert_eq!(value["action_type"], "shell_command");
        assert_eq!(value["timeout"], 180);
        assert_eq!(value["retry_delay"], 5);
        assert_eq!(value["continue_on_failure"], false);
        assert_eq!(value["condition"], "context_type == 'git_commit'");

        let none = serde_json::to_value(WorkflowAction::shell("ls")).unwrap();
        assert!(none["condition"].is_null());
        assert_eq!(none["parameters"], json!({}));
    }

    #[test]
    fn test_chain_triggers_on() {
        let chain = WorkflowChain::new("cv", vec![ContextType::GitCommit]);
        assert!(chain.triggers_on(ContextType::GitCommit));
        assert!(!chain.triggers_on(ContextType::TestFailure));
        assert!(!chain.disabled().triggers_on(ContextType::GitCommit));
    }

    #[test]
    fn test_chain_serializes_contexts_as_strings() {
        let chain = WorkflowChain::new("idle", vec![ContextType::ClaudeIdle, ContextType::Unknown])
            .with_action(WorkflowAction::new(ActionType::Delay, "1"))
            .with_priority(3);
        let value = serde_json::to_value(&chain).unwrap();
        assert_eq!(value["trigger_contexts"], json!(["claude_idle", "unknown"]));
        assert_eq!(value["priority"], 3);
        assert_eq!(value["enabled"], true);

        let back: WorkflowChain = serde_json::from_value(value).unwrap();
        assert_eq!(back, chain);
    }

    #[test]
    fn test_attempt_omits_absent_fields() {
        let ok = serde_json::to_value(ActionAttempt::succeeded(0, 1, json!({"x": 1}))).unwrap();
        assert_eq!(ok["success"], true);
        assert!(ok.get("error").is_none());

        let err = serde_json::to_value(ActionAttempt::failed(2, 3, "boom")).unwrap();
        assert_eq!(err["action_index"], 2);
        assert_eq!(err["attempt"], 3);
        assert_eq!(err["error"], "boom");
        assert!(err.get("result").is_none());
    }

    #[test]
    fn test_execution_starts_pending() {
        let ctx = ContextInfo::new(ContextType::GitCommit, 0.9);
        let exec = WorkflowExecution::pending("cv_1", "cv", ctx);
        assert_eq!(exec.status, WorkflowStatus::Pending);
        assert_eq!(exec.current_action, 0);
        assert!(exec.results.is_empty());
        assert!(exec.duration_secs().is_none());
    }
}
