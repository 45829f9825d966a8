//! Workflow engine for autochain.
//!
//! Holds the registry of [`WorkflowChain`]s, runs one supervised task per
//! triggered chain, gates actions through the [`ConditionEvaluator`] and
//! dispatches each action to its handler.

pub mod condition;
pub mod defaults;
pub mod engine;
pub mod error;
pub mod handler;
pub mod persist;
pub mod types;

pub use condition::{evaluate_condition, ConditionEvaluator};
pub use engine::{EngineStatus, WorkflowEngine};
pub use error::{ActionError, WorkflowError};
pub use handler::{ActionEnv, AgentChannel, SimulatedAgent};
pub use types::{
    ActionAttempt, ActionType, WorkflowAction, WorkflowChain, WorkflowExecution, WorkflowStatus,
};
