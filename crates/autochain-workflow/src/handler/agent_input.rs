//! Agent input action handler.
//!
//! Forwards `command` as input to the interactive agent process through an
//! [`AgentChannel`]. The default channel only simulates delivery latency.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use autochain_core::ContextInfo;

use crate::error::ActionError;
use crate::handler::{resolve_session, ActionEnv};
use crate::types::WorkflowAction;

/// Delivery boundary to the controlled agent process.
#[async_trait]
pub trait AgentChannel: Send + Sync {
    async fn send_input(&self, session: Option<&str>, input: &str) -> Result<(), ActionError>;
}

/// Channel that accepts every input after a fixed delay.
pub struct SimulatedAgent {
    latency: Duration,
}

impl SimulatedAgent {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

impl Default for SimulatedAgent {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

#[async_trait]
impl AgentChannel for SimulatedAgent {
    async fn send_input(&self, session: Option<&str>, input: &str) -> Result<(), ActionError> {
        tokio::time::sleep(self.latency).await;
        tracing::debug!(session = ?session, chars = input.chars().count(), "Simulated agent input");
        Ok(())
    }
}

pub async fn execute(
    action: &WorkflowAction,
    context: &ContextInfo,
    env: &ActionEnv,
) -> Result<Value, ActionError> {
    let session = resolve_session(action, context);
    env.agent
        .send_input(session.as_deref(), &action.command)
        .await?;

    Ok(json!({
        "input_sent": action.command,
        "session_name": session,
    }))
}
