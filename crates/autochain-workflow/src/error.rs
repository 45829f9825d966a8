//! Error types for the workflow engine.

/// Errors from a single action attempt.
///
/// These never escape an execution: the engine records the message in the
/// attempt's result record and applies the action's retry policy.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("Failed to spawn `{command}`: {reason}")]
    Spawn { command: String, reason: String },
    #[error("Command timed out after {seconds}s: {command}")]
    Timeout { command: String, seconds: u64 },
    #[error("Command `{command}` exited with {}{}", exit_label(.code), stderr_label(.stderr))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("No session name provided for tmux command")]
    MissingSession,
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Unsupported file operation: {0}")]
    UnsupportedOperation(String),
    #[error("Path escapes the project root: {0}")]
    PathOutsideProject(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Agent input failed: {0}")]
    Agent(String),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "a signal".to_string(),
    }
}

const STDERR_TAIL_CHARS: usize = 400;

fn stderr_label(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let count = trimmed.chars().count();
    let tail: String = trimmed
        .chars()
        .skip(count.saturating_sub(STDERR_TAIL_CHARS))
        .collect();
    format!(": {}", tail)
}

/// Errors from registry, manual-trigger and persistence operations.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Workflow not found: {0}")]
    NotFound(String),
    #[error("Workflow is disabled: {0}")]
    Disabled(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_error_display() {
        let err = ActionError::Timeout {
            command: "npm test".to_string(),
            seconds: 120,
        };
        assert_eq!(err.to_string(), "Command timed out after 120s: npm test");

        let err = ActionError::MissingSession;
        assert_eq!(err.to_string(), "No session name provided for tmux command");

        let err = ActionError::UnsupportedOperation("chmod".to_string());
        assert_eq!(err.to_string(), "Unsupported file operation: chmod");
    }

    #[test]
    fn test_command_failed_display() {
        let err = ActionError::CommandFailed {
            command: "false".to_string(),
            code: Some(1),
            stderr: String::new(),
        };
        assert_eq!(err.to_string(), "Command `false` exited with status 1");

        let err = ActionError::CommandFailed {
            command: "make".to_string(),
            code: None,
            stderr: "  killed\n".to_string(),
        };
        assert_eq!(err.to_string(), "Command `make` exited with a signal: killed");
    }

    #[test]
    fn test_command_failed_keeps_stderr_tail() {
        let stderr = format!("{}END", "x".repeat(1000));
        let err = ActionError::CommandFailed {
            command: "build".to_string(),
            code: Some(2),
            stderr,
        };
        let msg = err.to_string();
        assert!(msg.ends_with("END"));
        assert!(msg.len() < 500);
    }

    #[test]
    fn test_workflow_error_display() {
        let err = WorkflowError::NotFound("deploy".to_string());
        assert_eq!(err.to_string(), "Workflow not found: deploy");

        let err = WorkflowError::Disabled("nightly".to_string());
        assert_eq!(err.to_string(), "Workflow is disabled: nightly");
    }

    #[test]
    fn test_workflow_error_from_serde() {
        let parsed: Result<serde_json::Value, _> = serde_json::from_str("{ nope");
        let err: WorkflowError = parsed.unwrap_err().into();
        assert!(matches!(err, WorkflowError::Serialization(_)));
    }
}
