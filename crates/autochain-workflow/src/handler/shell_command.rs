//! Shell command action handler.
//!
//! Runs `command` through `sh -c` in the project root, bounded by the
//! action's timeout. A non-zero exit status fails the attempt.

use serde_json::{json, Value};
use tokio::process::Command;
use tracing::debug;

use crate::error::ActionError;
use crate::handler::{run_with_timeout, ActionEnv};
use crate::types::WorkflowAction;

/// Captured stdout and stderr are each truncated to this many bytes.
const MAX_OUTPUT_BYTES: usize = 100 * 1024;

pub async fn execute(action: &WorkflowAction, env: &ActionEnv) -> Result<Value, ActionError> {
    if action.command.trim().is_empty() {
        return Err(ActionError::InvalidParameter(
            "Shell command must not be empty".to_string(),
        ));
    }

    let mut command = Command::new("sh");
    command
        .arg("-c")
        .arg(&action.command)
        .current_dir(&env.project_root);

    let output = run_with_timeout(command, &action.command, action.timeout).await?;
    let code = output.status.code();
    let (stdout, stdout_truncated) = truncate_output(&output.stdout);
    let (stderr, stderr_truncated) = truncate_output(&output.stderr);

    debug!(command = %action.command, exit_code = ?code, "Shell command finished");

    if code != Some(0) {
        return Err(ActionError::CommandFailed {
            command: action.command.clone(),
            code,
            stderr,
        });
    }

    Ok(json!({
        "returncode": code,
        "stdout": stdout,
        "stderr": stderr,
        "stdout_truncated": stdout_truncated,
        "stderr_truncated": stderr_truncated,
    }))
}

/// Lossy UTF-8 conversion capped at [`MAX_OUTPUT_BYTES`].
fn truncate_output(raw: &[u8]) -> (String, bool) {
    if raw.len() <= MAX_OUTPUT_BYTES {
        (String::from_utf8_lossy(raw).into_owned(), false)
    } else {
        let mut s = String::from_utf8_lossy(&raw[..MAX_OUTPUT_BYTES]).into_owned();
        s.push_str("\n... [output truncated at 100 KB]");
        (s, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_shell_success_captures_output() {
        let dir = TempDir::new().unwrap();
        let env = ActionEnv::new(dir.path());
        let result = execute(&WorkflowAction::shell("echo ok; echo warn >&2"), &env)
            .await
            .unwrap();
        assert_eq!(result["returncode"], 0);
        assert_eq!(result["stdout"], "ok\n");
        assert_eq!(result["stderr"], "warn\n");
        assert_eq!(result["stdout_truncated"], false);
    }

    #[tokio::test]
    async fn test_shell_runs_in_project_root() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "here").unwrap();
        let env = ActionEnv::new(dir.path());
        let result = execute(&WorkflowAction::shell("cat marker.txt"), &env)
            .await
            .unwrap();
        assert_eq!(result["stdout"], "here");
    }

    #[tokio::test]
    async fn test_shell_non_zero_exit_fails() {
        let dir = TempDir::new().unwrap();
        let env = ActionEnv::new(dir.path());
        let err = execute(&WorkflowAction::shell("echo nope >&2; exit 4"), &env)
            .await
            .unwrap_err();
        match err {
            ActionError::CommandFailed { code, stderr, .. } => {
                assert_eq!(code, Some(4));
                assert_eq!(stderr.trim(), "nope");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_shell_timeout() {
        let dir = TempDir::new().unwrap();
        let env = ActionEnv::new(dir.path());
        let err = execute(&WorkflowAction::shell("sleep 5").with_timeout(1), &env)
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::Timeout { seconds: 1, .. }));
    }

    #[tokio::test]
    async fn test_shell_empty_command_rejected() {
        let env = ActionEnv::new(std::env::temp_dir());
        let err = execute(&WorkflowAction::shell("  "), &env).await.unwrap_err();
        assert!(matches!(err, ActionError::InvalidParameter(_)));
    }

    #[test]
    fn test_truncate_output() {
        let (s, truncated) = truncate_output(b"short");
        assert_eq!(s, "short");
        assert!(!truncated);

        let big = vec![b'a'; MAX_OUTPUT_BYTES + 10];
        let (s, truncated) = truncate_output(&big);
        assert!(truncated);
        assert!(s.ends_with("[output truncated at 100 KB]"));
    }
}
