use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// Timestamp
// =============================================================================

/// Wall-clock time as fractional seconds since the Unix epoch.
///
/// Serialized as a bare JSON number so persisted files and condition
/// snapshots see the same representation.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub f64);

impl Timestamp {
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Timestamp(dt.timestamp_micros() as f64 / 1_000_000.0)
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        let micros = (self.0 * 1_000_000.0).round() as i64;
        let secs = micros.div_euclid(1_000_000);
        let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
        Utc.timestamp_opt(secs, nanos).single().unwrap_or_default()
    }

    /// Whole seconds since the epoch, as used in execution ids.
    pub fn unix_seconds(&self) -> i64 {
        self.0.floor() as i64
    }

    /// Seconds elapsed from `self` until `later` (negative if `later` is earlier).
    pub fn seconds_until(&self, later: Timestamp) -> f64 {
        later.0 - self.0
    }
}

// =============================================================================
// ContextType
// =============================================================================

/// Closed set of project lifecycle events the detector can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextType {
    GitCommit,
    TestFailure,
    BuildFailure,
    DependencyUpdate,
    FileChange,
    ClaudeIdle,
    ErrorDetected,
    DeploymentReady,
    CodeReview,
    Unknown,
}

impl ContextType {
    pub const ALL: [ContextType; 10] = [
        ContextType::GitCommit,
        ContextType::TestFailure,
        ContextType::BuildFailure,
        ContextType::DependencyUpdate,
        ContextType::FileChange,
        ContextType::ClaudeIdle,
        ContextType::ErrorDetected,
        ContextType::DeploymentReady,
        ContextType::CodeReview,
        ContextType::Unknown,
    ];

    /// The persisted string value of this context type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextType::GitCommit => "git_commit",
            ContextType::TestFailure => "test_failure",
            ContextType::BuildFailure => "build_failure",
            ContextType::DependencyUpdate => "dependency_update",
            ContextType::FileChange => "file_change",
            ContextType::ClaudeIdle => "claude_idle",
            ContextType::ErrorDetected => "error_detected",
            ContextType::DeploymentReady => "deployment_ready",
            ContextType::CodeReview => "code_review",
            ContextType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ContextType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ContextType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContextType::ALL
            .into_iter()
            .find(|ct| ct.as_str() == s)
            .ok_or_else(|| format!("Unknown context type: {}", s))
    }
}

// =============================================================================
// ContextInfo
// =============================================================================

/// A typed, confidence-scored observation about project state.
///
/// Produced by the detector and handed to the workflow engine by value;
/// nothing downstream mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextInfo {
    pub context_type: ContextType,
    /// Always within `[0.0, 1.0]`.
    pub confidence: f64,
    #[serde(default)]
    pub details: Map<String, Value>,
    pub timestamp: Timestamp,
    #[serde(default)]
    pub project_path: Option<String>,
    #[serde(default)]
    pub session_name: Option<String>,
}

impl ContextInfo {
    /// Create a context stamped with the current time. Confidence is clamped.
    pub fn new(context_type: ContextType, confidence: f64) -> Self {
        Self {
            context_type,
            confidence: clamp_confidence(confidence),
            details: Map::new(),
            timestamp: Timestamp::now(),
            project_path: None,
            session_name: None,
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn with_details(mut self, details: Map<String, Value>) -> Self {
        self.details.extend(details);
        self
    }

    pub fn with_project_path(mut self, path: impl Into<String>) -> Self {
        self.project_path = Some(path.into());
        self
    }

    pub fn with_session_name(mut self, session: impl Into<String>) -> Self {
        self.session_name = Some(session.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Flat, read-only view of this context used by condition evaluation.
    ///
    /// Keys: `context_type`, `confidence`, `details`, `project_path`,
    /// `session_name`, `timestamp`.
    pub fn condition_snapshot(&self) -> Map<String, Value> {
        let mut snapshot = Map::new();
        snapshot.insert(
            "context_type".to_string(),
            Value::String(self.context_type.as_str().to_string()),
        );
        snapshot.insert("confidence".to_string(), Value::from(self.confidence));
        snapshot.insert("details".to_string(), Value::Object(self.details.clone()));
        snapshot.insert(
            "project_path".to_string(),
            self.project_path.clone().map_or(Value::Null, Value::String),
        );
        snapshot.insert(
            "session_name".to_string(),
            self.session_name.clone().map_or(Value::Null, Value::String),
        );
        snapshot.insert("timestamp".to_string(), Value::from(self.timestamp.0));
        snapshot
    }
}

/// Clamp a confidence score into `[0.0, 1.0]`, mapping NaN to 0.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

// =============================================================================
// Tests
// =============================================================================
