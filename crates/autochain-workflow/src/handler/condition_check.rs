//! Condition check action handler.
//!
//! Evaluates `command` as a condition and reports the outcome without
//! affecting control flow.

use serde_json::{json, Value};

use autochain_core::ContextInfo;

use crate::condition::evaluate_condition;
use crate::error::ActionError;
use crate::types::WorkflowAction;

pub fn execute(action: &WorkflowAction, context: &ContextInfo) -> Result<Value, ActionError> {
    let result = evaluate_condition(&action.command, context);
    Ok(json!({
        "condition": action.command,
        "result": result,
    }))
}
