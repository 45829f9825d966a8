//! Workflow engine: registry, triggering and execution.
//!
//! Every triggered chain runs as its own task inside a [`JoinSet`] owned by
//! the engine. Dropping the engine (or calling [`WorkflowEngine::shutdown`])
//! aborts whatever is still running; aborted executions are recorded as
//! failed so none is silently lost from history.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use autochain_core::config::WorkflowConfig;
use autochain_core::{ContextInfo, Timestamp};

use crate::condition::ConditionEvaluator;
use crate::defaults::default_chains;
use crate::error::WorkflowError;
use crate::handler::{execute_action, ActionEnv};
use crate::persist;
use crate::types::{ActionAttempt, WorkflowAction, WorkflowChain, WorkflowExecution, WorkflowStatus};

/// Capacity of the completion broadcast channel.
const COMPLETION_CHANNEL_CAPACITY: usize = 256;

const ABORTED_MESSAGE: &str = "Execution aborted by engine shutdown";

/// Snapshot returned by [`WorkflowEngine::status`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    pub registered_workflows: usize,
    pub active_executions: usize,
    pub execution_history_count: usize,
    pub workflows: BTreeMap<String, WorkflowChain>,
    pub active: BTreeMap<String, WorkflowExecution>,
}

#[derive(Default)]
struct EngineState {
    workflows: BTreeMap<String, WorkflowChain>,
    active: HashMap<String, WorkflowExecution>,
    history: VecDeque<WorkflowExecution>,
}

impl EngineState {
    fn id_in_use(&self, id: &str) -> bool {
        self.active.contains_key(id) || self.history.iter().any(|e| e.execution_id == id)
    }

    /// `name_secs`, suffixed with `_N` while that id is taken.
    fn allocate_id(&self, name: &str, secs: i64) -> String {
        let base = format!("{}_{}", name, secs);
        if !self.id_in_use(&base) {
            return base;
        }
        let mut n = 1u32;
        loop {
            let candidate = format!("{}_{}", base, n);
            if !self.id_in_use(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }
}

struct EngineInner {
    state: Mutex<EngineState>,
    history_limit: usize,
    env: Arc<ActionEnv>,
    completions: broadcast::Sender<WorkflowExecution>,
}

impl EngineInner {
    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_active<R>(
        &self,
        execution_id: &str,
        f: impl FnOnce(&mut WorkflowExecution) -> R,
    ) -> Option<R> {
        self.lock().active.get_mut(execution_id).map(f)
    }

    fn record(&self, execution_id: &str, attempt: ActionAttempt) {
        self.with_active(execution_id, |e| e.results.push(attempt));
    }

    /// Move an execution from active into history and announce it.
    fn finish(&self, execution_id: &str, failure: Option<String>) {
        let finished = {
            let mut state = self.lock();
            let Some(mut execution) = state.active.remove(execution_id) else {
                return;
            };
            execution.end_time = Some(Timestamp::now());
            match failure {
                Some(message) => {
                    execution.status = WorkflowStatus::Failed;
                    execution.error_message = Some(message);
                }
                None => execution.status = WorkflowStatus::Completed,
            }
            state.history.push_back(execution.clone());
            while state.history.len() > self.history_limit {
                state.history.pop_front();
            }
            execution
        };

        info!(
            workflow = %finished.workflow_name,
            execution_id = %finished.execution_id,
            status = %finished.status,
            duration_secs = finished.duration_secs().unwrap_or_default(),
            "Workflow execution finished"
        );
        let _ = self.completions.send(finished);
    }
}

/// Finishes its execution as failed if dropped before [`ExecutionGuard::finish`].
///
/// Created before the task is spawned, so an execution aborted before its
/// first poll is still moved to history.
struct ExecutionGuard {
    inner: Arc<EngineInner>,
    execution_id: String,
    armed: bool,
}

impl ExecutionGuard {
    fn finish(mut self, failure: Option<String>) {
        self.armed = false;
        self.inner.finish(&self.execution_id, failure);
    }
}

impl Drop for ExecutionGuard {
    fn drop(&mut self) {
        if self.armed {
            self.inner
                .finish(&self.execution_id, Some(ABORTED_MESSAGE.to_string()));
        }
    }
}

/// Registry of workflow chains and supervisor of their executions.
pub struct WorkflowEngine {
    inner: Arc<EngineInner>,
    tasks: Mutex<JoinSet<()>>,
}

impl WorkflowEngine {
    /// Engine with default settings, seeded with the built-in chains.
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self::with_config(project_root, &WorkflowConfig::default())
    }

    pub fn with_config(project_root: impl Into<PathBuf>, config: &WorkflowConfig) -> Self {
        let engine = Self::with_env(
            ActionEnv::from_config(project_root, config),
            config.history_limit,
        );
        if config.load_default_chains {
            for chain in default_chains() {
                engine.register(chain);
            }
        }
        engine
    }

    /// Engine with an empty registry and the given handler environment.
    pub fn with_env(env: ActionEnv, history_limit: usize) -> Self {
        let (completions, _) = broadcast::channel(COMPLETION_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(EngineInner {
                state: Mutex::new(EngineState::default()),
                history_limit,
                env: Arc::new(env),
                completions,
            }),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    pub fn env(&self) -> &ActionEnv {
        &self.inner.env
    }

    // =========================================================================
    // Registry
    // =========================================================================

    /// Insert `chain`, replacing any chain with the same name.
    pub fn register(&self, chain: WorkflowChain) {
        info!(
            workflow = %chain.name,
            actions = chain.actions.len(),
            "Registered workflow"
        );
        self.inner.lock().workflows.insert(chain.name.clone(), chain);
    }

    pub fn unregister(&self, name: &str) -> Option<WorkflowChain> {
        self.inner.lock().workflows.remove(name)
    }

    pub fn workflow(&self, name: &str) -> Option<WorkflowChain> {
        self.inner.lock().workflows.get(name).cloned()
    }

    pub fn workflow_names(&self) -> Vec<String> {
        self.inner.lock().workflows.keys().cloned().collect()
    }

    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), WorkflowError> {
        let mut state = self.inner.lock();
        let chain = state
            .workflows
            .get_mut(name)
            .ok_or_else(|| WorkflowError::NotFound(name.to_string()))?;
        chain.enabled = enabled;
        Ok(())
    }

    // =========================================================================
    // Triggering
    // =========================================================================

    /// Start every enabled chain listening for `context.context_type`.
    ///
    /// Returns the new execution ids immediately; the executions run
    /// concurrently with the caller.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn trigger(&self, context: &ContextInfo) -> Vec<String> {
        let mut matched: Vec<WorkflowChain> = {
            let state = self.inner.lock();
            state
                .workflows
                .values()
                .filter(|chain| chain.triggers_on(context.context_type))
                .cloned()
                .collect()
        };
        matched.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));

        let ids: Vec<String> = matched
            .into_iter()
            .map(|chain| self.start(chain, context.clone()))
            .collect();

        if !ids.is_empty() {
            debug!(
                context_type = %context.context_type,
                executions = ids.len(),
                "Triggered workflows"
            );
        }
        ids
    }

    /// Start the chain `name` regardless of its trigger contexts.
    pub fn trigger_workflow(
        &self,
        name: &str,
        context: &ContextInfo,
    ) -> Result<String, WorkflowError> {
        let chain = self
            .workflow(name)
            .ok_or_else(|| WorkflowError::NotFound(name.to_string()))?;
        if !chain.enabled {
            return Err(WorkflowError::Disabled(name.to_string()));
        }
        Ok(self.start(chain, context.clone()))
    }

    fn start(&self, chain: WorkflowChain, context: ContextInfo) -> String {
        let execution_id = {
            let mut state = self.inner.lock();
            let id = state.allocate_id(&chain.name, Timestamp::now().unix_seconds());
            state.active.insert(
                id.clone(),
                WorkflowExecution::pending(id.clone(), chain.name.clone(), context),
            );
            id
        };

        let guard = ExecutionGuard {
            inner: Arc::clone(&self.inner),
            execution_id: execution_id.clone(),
            armed: true,
        };

        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        while let Some(joined) = tasks.try_join_next() {
            log_join_error(joined);
        }
        tasks.spawn(run_execution(guard, chain));
        execution_id
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Execution by id, active or historical.
    pub fn execution(&self, execution_id: &str) -> Option<WorkflowExecution> {
        let state = self.inner.lock();
        state.active.get(execution_id).cloned().or_else(|| {
            state
                .history
                .iter()
                .find(|e| e.execution_id == execution_id)
                .cloned()
        })
    }

    pub fn active_count(&self) -> usize {
        self.inner.lock().active.len()
    }

    /// Finished executions, oldest first; `limit` keeps the most recent N.
    pub fn history(&self, limit: Option<usize>) -> Vec<WorkflowExecution> {
        let state = self.inner.lock();
        let skip = limit.map_or(0, |n| state.history.len().saturating_sub(n));
        state.history.iter().skip(skip).cloned().collect()
    }

    pub fn status(&self) -> EngineStatus {
        let state = self.inner.lock();
        EngineStatus {
            registered_workflows: state.workflows.len(),
            active_executions: state.active.len(),
            execution_history_count: state.history.len(),
            workflows: state.workflows.clone(),
            active: state
                .active
                .iter()
                .map(|(id, e)| (id.clone(), e.clone()))
                .collect(),
        }
    }

    /// Receiver for every execution that finishes from now on.
    pub fn subscribe_completions(&self) -> broadcast::Receiver<WorkflowExecution> {
        self.inner.completions.subscribe()
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    pub fn save(&self, path: &Path) -> Result<(), WorkflowError> {
        let workflows = self.inner.lock().workflows.clone();
        persist::save_chains(path, &workflows)
    }

    /// Register every chain in `path`, returning how many were loaded.
    pub fn load(&self, path: &Path) -> Result<usize, WorkflowError> {
        let chains = persist::load_chains(path)?;
        let count = chains.len();
        for chain in chains {
            self.register(chain);
        }
        info!(path = %path.display(), count, "Loaded workflow configuration");
        Ok(count)
    }

    // =========================================================================
    // Supervision
    // =========================================================================

    /// Wait until no execution is active.
    pub async fn wait_idle(&self) {
        let mut completions = self.subscribe_completions();
        while self.active_count() > 0 {
            match completions.recv().await {
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        self.reap();
    }

    /// Abort every running execution and wait for the aborts to land.
    pub async fn shutdown(&self) {
        let mut tasks = {
            let mut guard = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
            guard.abort_all();
            std::mem::take(&mut *guard)
        };
        let mut aborted = 0usize;
        while let Some(joined) = tasks.join_next().await {
            if matches!(&joined, Err(e) if e.is_cancelled()) {
                aborted += 1;
            } else {
                log_join_error(joined);
            }
        }
        if aborted > 0 {
            warn!(aborted, "Aborted running workflow executions");
        }
    }

    fn reap(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        while let Some(joined) = tasks.try_join_next() {
            log_join_error(joined);
        }
    }
}

fn log_join_error(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            error!(error = %e, "Workflow execution task panicked");
        }
    }
}

async fn run_execution(guard: ExecutionGuard, chain: WorkflowChain) {
    let inner = Arc::clone(&guard.inner);
    let execution_id = guard.execution_id.clone();

    let Some(context) = inner.with_active(&execution_id, |e| {
        e.status = WorkflowStatus::Running;
        e.context_info.clone()
    }) else {
        return;
    };
    info!(workflow = %chain.name, execution_id = %execution_id, "Starting workflow execution");

    let evaluator = ConditionEvaluator::new(&context);
    let mut failure = None;

    for (index, action) in chain.actions.iter().enumerate() {
        inner.with_active(&execution_id, |e| e.current_action = index);

        if let Some(condition) = action.condition.as_deref().filter(|c| !c.trim().is_empty()) {
            if !evaluator.evaluate(condition) {
                debug!(
                    workflow = %chain.name,
                    action_index = index,
                    condition = %condition,
                    "Skipping action, condition not met"
                );
                continue;
            }
        }

        let succeeded =
            run_with_retries(&inner, &execution_id, &chain.name, index, action, &context).await;
        if !succeeded && !action.continue_on_failure {
            failure = Some(format!(
                "Action {} failed and continue_on_failure is false",
                index
            ));
            break;
        }
    }

    guard.finish(failure);
}

/// Run `action` up to `retry_count + 1` times, recording every attempt.
async fn run_with_retries(
    inner: &Arc<EngineInner>,
    execution_id: &str,
    workflow: &str,
    index: usize,
    action: &WorkflowAction,
    context: &ContextInfo,
) -> bool {
    let attempts = action.retry_count.saturating_add(1);

    for attempt in 1..=attempts {
        match execute_action(action, context, &inner.env).await {
            Ok(result) => {
                inner.record(execution_id, ActionAttempt::succeeded(index, attempt, result));
                return true;
            }
            Err(e) => {
                inner.record(execution_id, ActionAttempt::failed(index, attempt, e.to_string()));
                if attempt < attempts {
                    warn!(
                        workflow = %workflow,
                        action_index = index,
                        attempt,
                        error = %e,
                        "Action failed, retrying in {}s",
                        action.retry_delay
                    );
                    tokio::time::sleep(Duration::from_secs(action.retry_delay)).await;
                } else {
                    error!(
                        workflow = %workflow,
                        action_index = index,
                        attempts,
                        error = %e,
                        "Action failed after all attempts"
                    );
                }
            }
        }
    }
    false
}
