//! Delay action handler: sleeps for `command` seconds.

use std::time::Duration;

use serde_json::{json, Value};

use crate::error::ActionError;
use crate::types::WorkflowAction;

pub async fn execute(action: &WorkflowAction) -> Result<Value, ActionError> {
    let seconds = parse_seconds(&action.command)?;
    tokio::time::sleep(Duration::from_secs_f64(seconds)).await;

    let reported = if seconds.fract() == 0.0 && seconds <= u64::MAX as f64 {
        json!(seconds as u64)
    } else {
        json!(seconds)
    };
    Ok(json!({ "delay_seconds": reported }))
}

fn parse_seconds(raw: &str) -> Result<f64, ActionError> {
    let seconds: f64 = raw.trim().parse().map_err(|_| {
        ActionError::InvalidParameter(format!("delay must be a number of seconds, got {:?}", raw))
    })?;
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(ActionError::InvalidParameter(format!(
            "delay must be a non-negative number of seconds, got {:?}",
            raw
        )));
    }
    Ok(seconds)
}
