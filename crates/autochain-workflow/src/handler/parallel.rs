//! Parallel execution action handler.
//!
//! Runs the sub-actions listed in the `actions` parameter concurrently and
//! waits for all of them. Each sub-action outcome is reported individually;
//! a failing sub-action does not fail the parent.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::task::JoinSet;

use autochain_core::ContextInfo;

use crate::error::ActionError;
use crate::handler::{execute_action, ActionEnv};
use crate::types::WorkflowAction;

pub async fn execute(
    action: &WorkflowAction,
    context: &ContextInfo,
    env: &Arc<ActionEnv>,
) -> Result<Value, ActionError> {
    let entries = match action.parameters.get("actions") {
        None => Vec::new(),
        Some(Value::Array(entries)) => entries.clone(),
        Some(_) => {
            return Err(ActionError::InvalidParameter(
                "actions must be a list of action objects".to_string(),
            ))
        }
    };
    let count = entries.len();

    let mut outcomes: Vec<Option<Value>> = vec![None; count];
    let mut tasks = JoinSet::new();

    for (index, entry) in entries.into_iter().enumerate() {
        let sub: WorkflowAction = match serde_json::from_value(entry) {
            Ok(sub) => sub,
            Err(e) => {
                outcomes[index] = Some(failure(index, format!("Invalid sub-action: {}", e)));
                continue;
            }
        };
        let context = context.clone();
        let env = Arc::clone(env);
        tasks.spawn(async move {
            let outcome = execute_action(&sub, &context, &env).await;
            (index, outcome)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, Ok(result))) => {
                outcomes[index] = Some(json!({
                    "index": index,
                    "success": true,
                    "result": result,
                }));
            }
            Ok((index, Err(e))) => outcomes[index] = Some(failure(index, e.to_string())),
            Err(e) => tracing::warn!(error = %e, "Parallel sub-action task failed"),
        }
    }

    let parallel_results: Vec<Value> = outcomes
        .into_iter()
        .enumerate()
        .map(|(index, outcome)| {
            outcome.unwrap_or_else(|| failure(index, "Sub-action did not complete".to_string()))
        })
        .collect();

    Ok(json!({
        "parallel_results": parallel_results,
        "action_count": count,
    }))
}

fn failure(index: usize, error: String) -> Value {
    json!({
        "index": index,
        "success": false,
        "error": error,
    })
}
