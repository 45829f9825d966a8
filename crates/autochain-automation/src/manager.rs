//! Automation manager: the monitoring loop and its surroundings.
//!
//! Lifecycle is `stopped -> monitoring -> stopped`. While monitoring, one
//! task sleeps for the interval, runs the polled detector probes and feeds
//! every detected context to the workflow engine. The same task counts
//! finished executions and fires `workflow_completed` callbacks.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use autochain_core::config::expand_home;
use autochain_core::{AutochainConfig, ContextInfo, ContextType, Timestamp};
use autochain_detect::{ContextDetector, ContextSummary};
use autochain_workflow::{EngineStatus, WorkflowChain, WorkflowEngine, WorkflowExecution};

use crate::callbacks::{AutomationCallback, AutomationEvent, CallbackEvent, CallbackId, CallbackRegistry};
use crate::error::AutomationError;
use crate::recommend::recommendations_for;
use crate::stats::AutomationStats;

/// Default number of executions returned by [`AutomationManager::execution_history`].
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Shortest interval the loop accepts.
const MIN_INTERVAL: Duration = Duration::from_millis(10);

const TEST_SESSION: &str = "test_session";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringStatus {
    pub is_monitoring: bool,
    /// Seconds since monitoring started, 0 when stopped.
    pub uptime_secs: f64,
}

/// Snapshot returned by [`AutomationManager::automation_status`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationStatus {
    pub monitoring: MonitoringStatus,
    pub statistics: AutomationStats,
    pub workflows: EngineStatus,
    pub current_context: ContextSummary,
    pub project_path: String,
}

/// Result of [`AutomationManager::test_automation_chain`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainTestReport {
    pub test_context: ContextInfo,
    pub triggered_executions: Vec<String>,
    pub execution_count: usize,
    pub active_executions_before: usize,
    pub active_executions_after: usize,
}

/// State shared with the monitoring task.
struct Shared {
    detector: ContextDetector,
    engine: WorkflowEngine,
    callbacks: CallbackRegistry,
    stats: Mutex<AutomationStats>,
}

impl Shared {
    fn stats(&self) -> MutexGuard<'_, AutomationStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn handle_context(&self, context: ContextInfo) {
        self.stats().contexts_detected += 1;
        info!(
            context_type = %context.context_type,
            confidence = context.confidence,
            "Context detected"
        );

        self.callbacks
            .dispatch(&AutomationEvent::ContextDetected(context.clone()))
            .await;

        let execution_ids = self.engine.trigger(&context);
        if execution_ids.is_empty() {
            return;
        }
        self.stats().workflows_triggered += execution_ids.len() as u64;
        self.callbacks
            .dispatch(&AutomationEvent::WorkflowTriggered {
                context,
                execution_ids,
            })
            .await;
    }

    async fn handle_completion(&self, execution: WorkflowExecution) {
        self.stats().workflows_completed += 1;
        self.callbacks
            .dispatch(&AutomationEvent::WorkflowCompleted(execution))
            .await;
    }
}

struct Monitor {
    shutdown: Arc<Notify>,
    handle: JoinHandle<()>,
    started: Timestamp,
}

/// Wires the context detector to the workflow engine.
pub struct AutomationManager {
    project_path: PathBuf,
    workflows_file: PathBuf,
    idle_threshold_secs: u64,
    shared: Arc<Shared>,
    monitor: Mutex<Option<Monitor>>,
}

impl AutomationManager {
    /// Manager for `project_path` with default settings.
    pub fn new(project_path: impl Into<PathBuf>) -> Self {
        let mut config = AutochainConfig::default();
        config.general.project_path = project_path.into().display().to_string();
        Self::from_config(&config)
    }

    pub fn from_config(config: &AutochainConfig) -> Self {
        let project_path = expand_home(&config.general.project_path);
        let detector = ContextDetector::with_config(&project_path, config.detector.clone());
        let engine = WorkflowEngine::with_config(&project_path, &config.workflow);
        Self::with_components(
            project_path,
            detector,
            engine,
            expand_home(&config.general.workflows_file),
        )
        .with_idle_threshold(config.detector.idle_threshold_secs)
    }

    pub fn with_components(
        project_path: impl Into<PathBuf>,
        detector: ContextDetector,
        engine: WorkflowEngine,
        workflows_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            project_path: project_path.into(),
            workflows_file: workflows_file.into(),
            idle_threshold_secs: autochain_core::config::DetectorConfig::default()
                .idle_threshold_secs,
            shared: Arc::new(Shared {
                detector,
                engine,
                callbacks: CallbackRegistry::new(),
                stats: Mutex::new(AutomationStats::new()),
            }),
            monitor: Mutex::new(None),
        }
    }

    fn with_idle_threshold(mut self, seconds: u64) -> Self {
        self.idle_threshold_secs = seconds;
        self
    }

    pub fn project_path(&self) -> &Path {
        &self.project_path
    }

    pub fn workflows_file(&self) -> &Path {
        &self.workflows_file
    }

    pub fn engine(&self) -> &WorkflowEngine {
        &self.shared.engine
    }

    pub fn detector(&self) -> &ContextDetector {
        &self.shared.detector
    }

    pub fn stats(&self) -> AutomationStats {
        self.shared.stats().clone()
    }

    fn monitor(&self) -> MutexGuard<'_, Option<Monitor>> {
        self.monitor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Monitoring lifecycle
    // =========================================================================

    pub fn is_monitoring(&self) -> bool {
        self.monitor().is_some()
    }

    /// Start the monitoring loop. Returns false if it is already running.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn start_monitoring(&self, interval: Duration) -> bool {
        let mut monitor = self.monitor();
        if monitor.is_some() {
            warn!("Automation monitoring already running");
            return false;
        }

        let started = Timestamp::now();
        *self.shared.stats() = AutomationStats {
            start_time: started,
            ..AutomationStats::new()
        };

        let shutdown = Arc::new(Notify::new());
        let handle = tokio::spawn(monitoring_loop(
            Arc::clone(&self.shared),
            interval.max(MIN_INTERVAL),
            Arc::clone(&shutdown),
        ));
        *monitor = Some(Monitor {
            shutdown,
            handle,
            started,
        });

        info!(interval_secs = interval.as_secs_f64(), "Started automation monitoring");
        true
    }

    /// Stop the loop and wait for it to exit. Returns false if not running.
    ///
    /// Running workflow executions are not affected.
    pub async fn stop_monitoring(&self) -> bool {
        let Some(monitor) = self.monitor().take() else {
            warn!("Automation monitoring not running");
            return false;
        };

        monitor.shutdown.notify_one();
        if let Err(e) = monitor.handle.await {
            if e.is_panic() {
                error!(error = %e, "Monitoring loop panicked");
            }
        }
        info!("Stopped automation monitoring");
        true
    }

    // =========================================================================
    // Callbacks
    // =========================================================================

    pub fn add_callback(
        &self,
        event: CallbackEvent,
        callback: Arc<dyn AutomationCallback>,
    ) -> CallbackId {
        self.shared.callbacks.add(event, callback)
    }

    pub fn remove_callback(&self, id: CallbackId) -> bool {
        self.shared.callbacks.remove(id)
    }

    // =========================================================================
    // On-demand detection and workflows
    // =========================================================================

    /// Content matching over e.g. a terminal capture.
    pub fn analyze_content(&self, content: &str, session_name: Option<&str>) -> Vec<ContextInfo> {
        self.shared.detector.detect_from_content(content, session_name)
    }

    /// Idle check; `threshold_secs` defaults to the configured threshold.
    pub fn analyze_idle(
        &self,
        last_activity: Timestamp,
        threshold_secs: Option<u64>,
    ) -> Option<ContextInfo> {
        self.shared
            .detector
            .detect_idle(last_activity, threshold_secs.unwrap_or(self.idle_threshold_secs))
    }

    pub fn register_workflow(&self, chain: WorkflowChain) {
        self.shared.engine.register(chain);
    }

    /// Run the named workflow against `context`, ignoring its trigger contexts.
    pub fn manual_trigger(
        &self,
        workflow_name: &str,
        context: &ContextInfo,
    ) -> Result<String, AutomationError> {
        match self.shared.engine.trigger_workflow(workflow_name, context) {
            Ok(execution_id) => {
                info!(workflow = %workflow_name, execution_id = %execution_id, "Manually triggered workflow");
                Ok(execution_id)
            }
            Err(e) => {
                error!(workflow = %workflow_name, error = %e, "Manual trigger failed");
                Err(e.into())
            }
        }
    }

    /// Most recent `limit` finished executions, oldest first.
    pub fn execution_history(&self, limit: usize) -> Vec<WorkflowExecution> {
        self.shared.engine.history(Some(limit))
    }

    pub fn workflow_recommendations(&self, context: &ContextInfo) -> Vec<String> {
        recommendations_for(context.context_type)
            .iter()
            .map(|r| r.to_string())
            .collect()
    }

    /// Fire a synthetic high-confidence context through the normal trigger
    /// path and report what it started.
    pub async fn test_automation_chain(
        &self,
        context_type: ContextType,
        details: Option<Map<String, Value>>,
    ) -> ChainTestReport {
        let details = details.unwrap_or_else(|| {
            let mut map = Map::new();
            map.insert("test".to_string(), json!(true));
            map.insert("simulated".to_string(), json!(true));
            map
        });
        let test_context = ContextInfo::new(context_type, 0.9)
            .with_details(details)
            .with_project_path(self.project_path.display().to_string())
            .with_session_name(TEST_SESSION);

        let active_executions_before = self.shared.engine.active_count();
        let triggered_executions = self.shared.engine.trigger(&test_context);

        tokio::time::sleep(Duration::from_millis(100)).await;

        info!(
            context_type = %context_type,
            workflows = triggered_executions.len(),
            "Automation test completed"
        );

        ChainTestReport {
            execution_count: triggered_executions.len(),
            active_executions_after: self.shared.engine.active_count(),
            test_context,
            triggered_executions,
            active_executions_before,
        }
    }

    // =========================================================================
    // Status and persistence
    // =========================================================================

    pub async fn current_context_summary(&self) -> ContextSummary {
        self.shared.detector.context_summary().await
    }

    pub async fn automation_status(&self) -> AutomationStatus {
        let started = self.monitor().as_ref().map(|m| m.started);
        let monitoring = MonitoringStatus {
            is_monitoring: started.is_some(),
            uptime_secs: started
                .map(|s| s.seconds_until(Timestamp::now()).max(0.0))
                .unwrap_or(0.0),
        };

        AutomationStatus {
            monitoring,
            statistics: self.stats(),
            workflows: self.shared.engine.status(),
            current_context: self.current_context_summary().await,
            project_path: self.project_path.display().to_string(),
        }
    }

    /// Save the workflow registry; `None` uses the configured workflows file.
    pub fn save_config(&self, path: Option<&Path>) -> Result<PathBuf, AutomationError> {
        let path = path.unwrap_or(&self.workflows_file).to_path_buf();
        self.shared.engine.save(&path)?;
        info!(path = %path.display(), "Saved automation config");
        Ok(path)
    }

    /// Load workflows; a missing file registers nothing.
    pub fn load_config(&self, path: Option<&Path>) -> Result<usize, AutomationError> {
        let path = path.unwrap_or(&self.workflows_file);
        if !path.exists() {
            debug!(path = %path.display(), "No automation config found");
            return Ok(0);
        }
        Ok(self.shared.engine.load(path)?)
    }
}

impl Drop for AutomationManager {
    fn drop(&mut self) {
        if let Some(monitor) = self.monitor().take() {
            monitor.handle.abort();
        }
    }
}

async fn monitoring_loop(shared: Arc<Shared>, interval: Duration, shutdown: Arc<Notify>) {
    let mut completions = shared.engine.subscribe_completions();
    debug!(interval_ms = interval.as_millis() as u64, "Monitoring loop running");

    // Completions must not push the next tick back.
    let tick = tokio::time::sleep(interval);
    tokio::pin!(tick);

    loop {
        tokio::select! {
            _ = shutdown.notified() => break,
            _ = &mut tick => {
                let contexts = tokio::select! {
                    contexts = shared.detector.detect_all() => contexts,
                    _ = shutdown.notified() => break,
                };
                for context in contexts {
                    shared.handle_context(context).await;
                }
                tick.as_mut().reset(Instant::now() + interval);
            }
            received = completions.recv() => match received {
                Ok(execution) => shared.handle_completion(execution).await,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "Missed workflow completion events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    debug!("Monitoring loop exited");
}
