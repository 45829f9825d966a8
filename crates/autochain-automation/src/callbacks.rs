//! Callback registry for automation events.
//!
//! Callbacks subscribe to one [`CallbackEvent`] and are awaited in
//! registration order. A failing callback is logged and does not stop the
//! remaining callbacks or the monitoring loop.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use autochain_core::ContextInfo;
use autochain_workflow::WorkflowExecution;

use crate::error::CallbackError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackEvent {
    ContextDetected,
    WorkflowTriggered,
    WorkflowCompleted,
}

impl fmt::Display for CallbackEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallbackEvent::ContextDetected => write!(f, "context_detected"),
            CallbackEvent::WorkflowTriggered => write!(f, "workflow_triggered"),
            CallbackEvent::WorkflowCompleted => write!(f, "workflow_completed"),
        }
    }
}

/// Payload delivered to callbacks.
#[derive(Debug, Clone)]
pub enum AutomationEvent {
    ContextDetected(ContextInfo),
    WorkflowTriggered {
        context: ContextInfo,
        execution_ids: Vec<String>,
    },
    WorkflowCompleted(WorkflowExecution),
}

impl AutomationEvent {
    pub fn kind(&self) -> CallbackEvent {
        match self {
            AutomationEvent::ContextDetected(_) => CallbackEvent::ContextDetected,
            AutomationEvent::WorkflowTriggered { .. } => CallbackEvent::WorkflowTriggered,
            AutomationEvent::WorkflowCompleted(_) => CallbackEvent::WorkflowCompleted,
        }
    }
}

#[async_trait]
pub trait AutomationCallback: Send + Sync {
    async fn on_event(&self, event: &AutomationEvent) -> Result<(), CallbackError>;
}

/// Adapts a synchronous closure into an [`AutomationCallback`].
pub struct FnCallback<F>(F);

impl<F> FnCallback<F>
where
    F: Fn(&AutomationEvent) -> Result<(), CallbackError> + Send + Sync + 'static,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> AutomationCallback for FnCallback<F>
where
    F: Fn(&AutomationEvent) -> Result<(), CallbackError> + Send + Sync + 'static,
{
    async fn on_event(&self, event: &AutomationEvent) -> Result<(), CallbackError> {
        (self.0)(event)
    }
}

/// Handle returned by [`CallbackRegistry::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(Uuid);

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Entry {
    id: CallbackId,
    event: CallbackEvent,
    callback: Arc<dyn AutomationCallback>,
}

#[derive(Default)]
pub struct CallbackRegistry {
    entries: Mutex<Vec<Entry>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, Vec<Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add(&self, event: CallbackEvent, callback: Arc<dyn AutomationCallback>) -> CallbackId {
        let id = CallbackId(Uuid::new_v4());
        self.entries().push(Entry {
            id,
            event,
            callback,
        });
        id
    }

    /// Returns false if `id` was not registered.
    pub fn remove(&self, id: CallbackId) -> bool {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|e| e.id != id);
        entries.len() != before
    }

    pub fn count(&self, event: CallbackEvent) -> usize {
        self.entries().iter().filter(|e| e.event == event).count()
    }

    /// Await every callback subscribed to `event.kind()`.
    pub async fn dispatch(&self, event: &AutomationEvent) {
        let kind = event.kind();
        let targets: Vec<Arc<dyn AutomationCallback>> = self
            .entries()
            .iter()
            .filter(|e| e.event == kind)
            .map(|e| Arc::clone(&e.callback))
            .collect();

        for callback in targets {
            if let Err(e) = callback.on_event(event).await {
                warn!(event = %kind, error = %e, "Callback error");
            }
        }
    }
}
