//! Terminal multiplexer action handler.
//!
//! Types `command` into a tmux session as literal text, then presses Enter.
//! Key names such as `C-c` or `Escape` inside the command are not interpreted.

use std::process::Output;

use serde_json::{json, Value};
use tokio::process::Command;

use autochain_core::ContextInfo;

use crate::error::ActionError;
use crate::handler::{resolve_session, run_with_timeout, ActionEnv};
use crate::types::WorkflowAction;

async fn send_keys(
    env: &ActionEnv,
    session: &str,
    flags: &[&str],
    keys: &str,
    timeout_secs: u64,
) -> Result<Output, ActionError> {
    let mut command = Command::new(&env.tmux_binary);
    command.arg("send-keys").args(flags).args(["-t", session, keys]);
    let label = format!("{} send-keys -t {}", env.tmux_binary, session);
    let output = run_with_timeout(command, &label, timeout_secs).await?;

    if output.status.code() != Some(0) {
        return Err(ActionError::CommandFailed {
            command: label,
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    Ok(output)
}

pub async fn execute(
    action: &WorkflowAction,
    context: &ContextInfo,
    env: &ActionEnv,
) -> Result<Value, ActionError> {
    let session = resolve_session(action, context).ok_or(ActionError::MissingSession)?;

    send_keys(env, &session, &["-l"], &action.command, action.timeout).await?;
    let output = send_keys(env, &session, &[], "Enter", action.timeout).await?;

    tracing::info!(session = %session, command = %action.command, "Sent keys to tmux session");

    Ok(json!({
        "returncode": output.status.code(),
        "session_name": session,
        "command_sent": action.command,
    }))
}
