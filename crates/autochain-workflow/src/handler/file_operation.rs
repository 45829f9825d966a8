//! File operation action handler.
//!
//! `command` is a path relative to the project root; the `operation`
//! parameter selects `read` (default), `write` or `delete`. Paths that are
//! absolute or contain `..` are rejected.

use std::path::{Component, Path, PathBuf};

use serde_json::{json, Value};

use crate::error::ActionError;
use crate::handler::ActionEnv;
use crate::types::WorkflowAction;

pub async fn execute(action: &WorkflowAction, env: &ActionEnv) -> Result<Value, ActionError> {
    let operation = match action.parameters.get("operation") {
        None => "read",
        Some(Value::String(op)) => op.as_str(),
        Some(other) => {
            return Err(ActionError::InvalidParameter(format!(
                "operation must be a string, got {}",
                other
            )))
        }
    };

    let path = resolve_within(&env.project_root, &action.command)?;

    match operation {
        "read" => {
            let content = tokio::fs::read_to_string(&path).await?;
            Ok(json!({
                "operation": "read",
                "content_length": content.chars().count(),
            }))
        }
        "write" => {
            let content = match action.parameters.get("content") {
                None => "",
                Some(Value::String(c)) => c.as_str(),
                Some(_) => {
                    return Err(ActionError::InvalidParameter(
                        "content must be a string".to_string(),
                    ))
                }
            };
            tokio::fs::write(&path, content).await?;
            tracing::info!(path = %path.display(), bytes = content.len(), "File written");
            Ok(json!({
                "operation": "write",
                "bytes_written": content.len(),
            }))
        }
        "delete" => {
            tokio::fs::remove_file(&path).await?;
            tracing::info!(path = %path.display(), "File deleted");
            Ok(json!({
                "operation": "delete",
                "file_deleted": path.display().to_string(),
            }))
        }
        other => Err(ActionError::UnsupportedOperation(other.to_string())),
    }
}

/// Join `relative` onto `root`, refusing anything that could leave it.
fn resolve_within(root: &Path, relative: &str) -> Result<PathBuf, ActionError> {
    let candidate = Path::new(relative.trim());
    if relative.trim().is_empty() {
        return Err(ActionError::InvalidParameter(
            "file path must not be empty".to_string(),
        ));
    }

    let escapes = candidate.components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if escapes {
        return Err(ActionError::PathOutsideProject(relative.to_string()));
    }

    Ok(root.join(candidate))
}
