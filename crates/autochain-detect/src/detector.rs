//! The context detector.
//!
//! [`ContextDetector`] combines content matching over text blobs with active
//! probes of the live project. The git and file-change probes are stateful:
//! each call compares against, then advances, the last observed HEAD hash
//! and file modification times, so an unchanged project never reports the
//! same event twice.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use autochain_core::config::DetectorConfig;
use autochain_core::{ContextInfo, ContextType, Timestamp};

use crate::glob::GlobPattern;
use crate::patterns::{snippet, PatternSet};
use crate::probe::{argv, run_checked, run_probe};

const GIT_COMMIT_CONFIDENCE: f64 = 0.95;
const FILE_CHANGE_CONFIDENCE: f64 = 0.8;
const DEPLOYMENT_READY_CONFIDENCE: f64 = 0.9;
const SNIPPET_RADIUS: usize = 50;
const SUMMARY_FILE_CHANGES: usize = 5;
const CONFIDENCE_EPSILON: f64 = 1e-9;

#[derive(Debug, Default)]
struct ProbeState {
    last_git_hash: Option<String>,
    last_file_mtimes: HashMap<PathBuf, f64>,
}

/// Snapshot of what the active probes currently report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSummary {
    pub project_path: String,
    pub timestamp: Timestamp,
    pub contexts: Vec<ContextInfo>,
}

/// Detects workflow contexts from text content and project probes.
pub struct ContextDetector {
    project_path: PathBuf,
    config: DetectorConfig,
    patterns: PatternSet,
    globs: Vec<GlobPattern>,
    state: Mutex<ProbeState>,
}

impl ContextDetector {
    /// Create a detector with the default detector configuration.
    pub fn new(project_path: impl Into<PathBuf>) -> Self {
        Self::with_config(project_path, DetectorConfig::default())
    }

    /// Create a detector. Watched patterns that fail to compile are logged
    /// and ignored.
    pub fn with_config(project_path: impl Into<PathBuf>, config: DetectorConfig) -> Self {
        let globs = config
            .watched_patterns
            .iter()
            .filter_map(|p| match GlobPattern::new(p) {
                Ok(g) => Some(g),
                Err(e) => {
                    warn!(pattern = %p, error = %e, "Ignoring invalid watched pattern");
                    None
                }
            })
            .collect();

        Self {
            project_path: project_path.into(),
            config,
            patterns: PatternSet::new(),
            globs,
            state: Mutex::new(ProbeState::default()),
        }
    }

    pub fn project_path(&self) -> &Path {
        &self.project_path
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Mutable access to the pattern library, for registering extra patterns.
    pub fn patterns_mut(&mut self) -> &mut PatternSet {
        &mut self.patterns
    }

    fn state(&self) -> MutexGuard<'_, ProbeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn project_display(&self) -> String {
        self.project_path.display().to_string()
    }

    // =========================================================================
    // Content matching
    // =========================================================================

    /// Scan `content` against the pattern library.
    ///
    /// Every match scoring at least `min_confidence` becomes its own context;
    /// several matches of the same type are not merged.
    pub fn detect_from_content(&self, content: &str, session_name: Option<&str>) -> Vec<ContextInfo> {
        let min_confidence = self.config.min_confidence;
        let contexts: Vec<ContextInfo> = self
            .patterns
            .detect(content)
            .into_iter()
            .filter(|m| m.confidence + CONFIDENCE_EPSILON >= min_confidence)
            .map(|m| {
                let ctx = ContextInfo::new(m.context_type, m.confidence)
                    .with_detail("matched_pattern", m.pattern)
                    .with_detail("matched_text", m.matched_text)
                    .with_detail(
                        "content_snippet",
                        snippet(content, m.start, m.end, SNIPPET_RADIUS),
                    )
                    .with_project_path(self.project_display());
                match session_name {
                    Some(session) => ctx.with_session_name(session),
                    None => ctx,
                }
            })
            .collect();

        if !contexts.is_empty() {
            debug!(count = contexts.len(), "Content scan matched contexts");
        }
        contexts
    }

    // =========================================================================
    // Active probes
    // =========================================================================

    /// Report a new commit if HEAD moved since the previous call.
    ///
    /// The first successful call only records the current hash.
    pub async fn detect_git(&self) -> Option<ContextInfo> {
        let timeout = Duration::from_secs(self.config.git_timeout_secs);
        let head = match run_checked(
            &argv(&["git", "rev-parse", "HEAD"]),
            &self.project_path,
            timeout,
        )
        .await
        {
            Ok(hash) => hash,
            Err(e) => {
                debug!(error = %e, "Git context detection failed");
                return None;
            }
        };

        let previous = self.state().last_git_hash.replace(head.clone());
        match previous {
            Some(prev) if prev != head => {}
            _ => return None,
        }

        let (message, files) = self.commit_info(&head, timeout).await;
        debug!(commit = %head, "New commit detected");

        Some(
            ContextInfo::new(ContextType::GitCommit, GIT_COMMIT_CONFIDENCE)
                .with_detail("commit_hash", head)
                .with_detail("commit_message", message)
                .with_detail("files_changed", files)
                .with_project_path(self.project_display()),
        )
    }

    async fn commit_info(&self, hash: &str, timeout: Duration) -> (String, Vec<String>) {
        let message = run_checked(
            &argv(&["git", "log", "-1", "--pretty=format:%s", hash]),
            &self.project_path,
            timeout,
        )
        .await
        .unwrap_or_else(|e| {
            debug!(error = %e, "Failed to read commit message");
            String::new()
        });

        let files = match run_checked(
            &argv(&["git", "diff-tree", "--no-commit-id", "--name-only", "-r", hash]),
            &self.project_path,
            timeout,
        )
        .await
        {
            Ok(out) => out
                .lines()
                .filter(|l| !l.trim().is_empty())
                .map(|l| l.to_string())
                .collect(),
            Err(e) => {
                debug!(error = %e, "Failed to list changed files");
                Vec::new()
            }
        };

        (message, files)
    }

    /// Report every watched file whose modification time advanced since the
    /// previous call.
    ///
    /// Files seen for the first time are recorded but not reported. The scan
    /// runs on the blocking pool.
    pub async fn detect_file_changes(&self) -> Vec<ContextInfo> {
        let root = self.project_path.clone();
        let globs = self.globs.clone();
        let ignored = self.config.ignored_dirs.clone();

        let scanned =
            match tokio::task::spawn_blocking(move || scan_watched_files(&root, &globs, &ignored))
                .await
            {
                Ok(files) => files,
                Err(e) => {
                    debug!(error = %e, "File change scan failed");
                    return Vec::new();
                }
            };

        let mut changes = Vec::new();
        let mut state = self.state();
        let mut current = HashMap::with_capacity(scanned.len());

        for (path, mtime) in scanned {
            if let Some(&previous) = state.last_file_mtimes.get(&path) {
                if mtime > previous {
                    changes.push(
                        ContextInfo::new(ContextType::FileChange, FILE_CHANGE_CONFIDENCE)
                            .with_detail("file_path", path.display().to_string())
                            .with_detail("file_type", file_suffix(&path))
                            .with_detail("modification_time", mtime)
                            .with_project_path(self.project_display()),
                    );
                }
            }
            current.insert(path, mtime);
        }
        state.last_file_mtimes = current;

        if !changes.is_empty() {
            debug!(count = changes.len(), "File changes detected");
        }
        changes
    }

    /// Report an idle context when more than `threshold_secs` have passed
    /// since `last_activity`.
    ///
    /// Confidence grows linearly and saturates at twice the threshold.
    pub fn detect_idle(&self, last_activity: Timestamp, threshold_secs: u64) -> Option<ContextInfo> {
        let now = Timestamp::now();
        let idle = last_activity.seconds_until(now);
        let threshold = threshold_secs as f64;

        if idle <= threshold {
            return None;
        }

        Some(
            ContextInfo::new(ContextType::ClaudeIdle, (idle / (threshold * 2.0)).min(1.0))
                .with_detail("idle_duration", idle)
                .with_detail("last_activity", last_activity.0)
                .with_timestamp(now)
                .with_project_path(self.project_display()),
        )
    }

    /// Report deployment readiness when a quick test command, a quick build
    /// command and the git-clean check all succeed.
    pub async fn detect_deployment_ready(&self) -> Option<ContextInfo> {
        let tests_passing = self
            .first_success(
                &self.config.test_commands,
                Duration::from_secs(self.config.test_timeout_secs),
            )
            .await;
        if !tests_passing {
            debug!("Deployment readiness: no quick test command passed");
            return None;
        }

        let build_successful = self
            .first_success(
                &self.config.build_commands,
                Duration::from_secs(self.config.build_timeout_secs),
            )
            .await;
        if !build_successful {
            debug!("Deployment readiness: no quick build command passed");
            return None;
        }

        let git_clean = self.is_git_clean().await;
        if !git_clean {
            debug!("Deployment readiness: working tree not clean");
            return None;
        }

        Some(
            ContextInfo::new(ContextType::DeploymentReady, DEPLOYMENT_READY_CONFIDENCE)
                .with_detail("tests_passing", tests_passing)
                .with_detail("build_successful", build_successful)
                .with_detail("git_clean", git_clean)
                .with_project_path(self.project_display()),
        )
    }

    async fn first_success(&self, commands: &[Vec<String>], timeout: Duration) -> bool {
        for command in commands {
            match run_probe(command, &self.project_path, timeout).await {
                Ok(output) if output.success() => return true,
                Ok(output) => {
                    debug!(command = %command.join(" "), code = ?output.code, "Quick check failed");
                }
                Err(e) => debug!(error = %e, "Quick check unavailable"),
            }
        }
        false
    }

    async fn is_git_clean(&self) -> bool {
        match run_checked(
            &argv(&["git", "status", "--porcelain"]),
            &self.project_path,
            Duration::from_secs(self.config.git_timeout_secs),
        )
        .await
        {
            Ok(out) => out.is_empty(),
            Err(e) => {
                debug!(error = %e, "Git clean check failed");
                false
            }
        }
    }

    // =========================================================================
    // Aggregates
    // =========================================================================

    /// Run the polled probes: git, file changes, deployment readiness.
    ///
    /// Idle and content detection are on-demand only.
    pub async fn detect_all(&self) -> Vec<ContextInfo> {
        let mut contexts = Vec::new();
        if let Some(git) = self.detect_git().await {
            contexts.push(git);
        }
        contexts.extend(self.detect_file_changes().await);
        if let Some(deploy) = self.detect_deployment_ready().await {
            contexts.push(deploy);
        }
        contexts
    }

    /// Run the polled probes and keep at most the last five file changes.
    pub async fn context_summary(&self) -> ContextSummary {
        let mut contexts = Vec::new();
        if let Some(git) = self.detect_git().await {
            contexts.push(git);
        }

        let changes = self.detect_file_changes().await;
        let skip = changes.len().saturating_sub(SUMMARY_FILE_CHANGES);
        contexts.extend(changes.into_iter().skip(skip));

        if let Some(deploy) = self.detect_deployment_ready().await {
            contexts.push(deploy);
        }

        ContextSummary {
            project_path: self.project_display(),
            timestamp: Timestamp::now(),
            contexts,
        }
    }
}

/// Walk `root` collecting `(path, mtime)` for files matching any glob.
fn scan_watched_files(root: &Path, globs: &[GlobPattern], ignored: &[String]) -> Vec<(PathBuf, f64)> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, "Skipping unreadable directory");
                continue;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(file_type) = entry.file_type() else {
                continue;
            };

            if file_type.is_dir() {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if !ignored.iter().any(|d| d.as_str() == name) {
                    pending.push(path);
                }
                continue;
            }

            if !(file_type.is_file() || (file_type.is_symlink() && path.is_file())) {
                continue;
            }

            let relative = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");
            if !globs.iter().any(|g| g.matches(&relative)) {
                continue;
            }

            if let Some(mtime) = modified_secs(&path) {
                found.push((path, mtime));
            }
        }
    }

    found.sort_by(|a, b| a.0.cmp(&b.0));
    found
}

fn modified_secs(path: &Path) -> Option<f64> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    modified
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|d| d.as_secs_f64())
}

fn file_suffix(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use std::time::SystemTime;
    use tempfile::TempDir;

    fn touch_forward(path: &Path, secs: u64) {
        let file = std::fs::OpenOptions::new().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(secs))
            .unwrap();
    }

    fn quiet_config() -> DetectorConfig {
        DetectorConfig {
            test_commands: vec![argv(&["false"])],
            build_commands: vec![argv(&["false"])],
            ..DetectorConfig::default()
        }
    }

    fn git_available() -> bool {
        Command::new("git")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn git(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args(["-c", "user.name=autochain", "-c", "user.email=autochain@example.com"])
            .args(args)
            .current_dir(dir)
            .output()
            .unwrap()
            .status;
        assert!(status.success(), "git {:?} failed", args);
    }

    fn init_repo(dir: &Path) {
        git(dir, &["init", "-q"]);
        std::fs::write(dir.join("README.md"), "hello\n").unwrap();
        git(dir, &["add", "."]);
        git(dir, &["commit", "-q", "-m", "initial"]);
    }

    #[test]
    fn test_content_detection_fills_details() {
        let detector = ContextDetector::new("/tmp/project");
        let contexts =
            detector.detect_from_content("$ git log\nChanges committed successfully\n", Some("dev"));
        assert_eq!(contexts.len(), 1);

        let ctx = &contexts[0];
        assert_eq!(ctx.context_type, ContextType::GitCommit);
        assert_eq!(ctx.session_name.as_deref(), Some("dev"));
        assert_eq!(ctx.project_path.as_deref(), Some("/tmp/project"));
        assert_eq!(ctx.details["matched_text"], "Changes committed successfully");
        assert_eq!(ctx.details["matched_pattern"], "Changes committed successfully");
        assert!(ctx.details["content_snippet"]
            .as_str()
            .unwrap()
            .contains("$ git log"));
    }

    #[test]
    fn test_content_detection_threshold_is_inclusive() {
        let detector = ContextDetector::new(".");
        let contexts = detector.detect_from_content("error: boom", None);
        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts[0].context_type, ContextType::ErrorDetected);

        let strict = ContextDetector::with_config(
            ".",
            DetectorConfig {
                min_confidence: 0.8,
                ..DetectorConfig::default()
            },
        );
        assert!(strict.detect_from_content("error: boom", None).is_empty());
    }

    #[test]
    fn test_content_detection_confidence_bounds() {
        let detector = ContextDetector::new(".");
        let capture = "\
            npm ERR! build failed\n\
            FAILED tests/test_api.py::test_login - AssertionError\n\
            pytest: 2 failed, 40 passed\n\
            Traceback (most recent call last):\n\
            error: could not compile `app`\n\
            pull request #12 review requested\n\
            pip install -r requirements.txt\n";
        let contexts = detector.detect_from_content(capture, None);
        assert!(!contexts.is_empty());
        for ctx in &contexts {
            assert!(ctx.confidence >= 0.6 - 1e-9 && ctx.confidence <= 1.0);
        }
        for ct in [
            ContextType::BuildFailure,
            ContextType::TestFailure,
            ContextType::ErrorDetected,
            ContextType::CodeReview,
            ContextType::DependencyUpdate,
        ] {
            assert!(contexts.iter().any(|c| c.context_type == ct), "missing {}", ct);
        }
    }

    #[tokio::test]
    async fn test_file_changes_second_call_is_empty() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("app.py");
        std::fs::write(&file, "print('hi')\n").unwrap();

        let detector = ContextDetector::with_config(dir.path(), quiet_config());
        assert!(detector.detect_file_changes().await.is_empty());
        assert!(detector.detect_file_changes().await.is_empty());

        touch_forward(&file, 10);
        let changes = detector.detect_file_changes().await;
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].context_type, ContextType::FileChange);
        assert_eq!(changes[0].confidence, 0.8);
        assert_eq!(changes[0].details["file_type"], ".py");
        assert_eq!(
            changes[0].details["file_path"],
            file.display().to_string().as_str()
        );

        assert!(detector.detect_file_changes().await.is_empty());
    }

    #[tokio::test]
    async fn test_file_changes_new_files_are_only_recorded() {
        let dir = TempDir::new().unwrap();
        let detector = ContextDetector::with_config(dir.path(), quiet_config());
        assert!(detector.detect_file_changes().await.is_empty());

        std::fs::write(dir.path().join("notes.md"), "# notes\n").unwrap();
        assert!(detector.detect_file_changes().await.is_empty());
    }

    #[tokio::test]
    async fn test_file_changes_skip_ignored_and_unwatched() {
        let dir = TempDir::new().unwrap();
        let modules = dir.path().join("node_modules").join("left-pad");
        std::fs::create_dir_all(&modules).unwrap();
        let vendored = modules.join("index.js");
        let unwatched = dir.path().join("main.rs");
        let nested = dir.path().join("web").join("package.json");
        std::fs::create_dir_all(nested.parent().unwrap()).unwrap();
        for f in [&vendored, &unwatched, &nested] {
            std::fs::write(f, "x").unwrap();
        }

        let detector = ContextDetector::with_config(dir.path(), quiet_config());
        detector.detect_file_changes().await;
        for f in [&vendored, &unwatched, &nested] {
            touch_forward(f, 10);
        }

        let changes = detector.detect_file_changes().await;
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].details["file_type"], ".json");
    }

    #[test]
    fn test_idle_detection_scales_confidence() {
        let detector = ContextDetector::new(".");
        let now = Timestamp::now().0;

        assert!(detector.detect_idle(Timestamp(now - 10.0), 30).is_none());

        let ctx = detector.detect_idle(Timestamp(now - 45.0), 30).unwrap();
        assert_eq!(ctx.context_type, ContextType::ClaudeIdle);
        assert!((ctx.confidence - 0.75).abs() < 0.01);
        assert!(ctx.details["idle_duration"].as_f64().unwrap() >= 45.0);
        assert_eq!(ctx.details["last_activity"], now - 45.0);

        let saturated = detector.detect_idle(Timestamp(now - 600.0), 30).unwrap();
        assert_eq!(saturated.confidence, 1.0);
    }

    #[tokio::test]
    async fn test_git_probe_outside_repository_is_none() {
        let dir = TempDir::new().unwrap();
        let detector = ContextDetector::with_config(dir.path(), quiet_config());
        assert!(detector.detect_git().await.is_none());
        assert!(detector.detect_git().await.is_none());
    }

    #[tokio::test]
    async fn test_git_probe_reports_new_commit_once() {
        if !git_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        init_repo(dir.path());

        let detector = ContextDetector::with_config(dir.path(), quiet_config());
        assert!(detector.detect_git().await.is_none());
        assert!(detector.detect_git().await.is_none());

        std::fs::write(dir.path().join("lib.py"), "x = 1\n").unwrap();
        git(dir.path(), &["add", "lib.py"]);
        git(dir.path(), &["commit", "-q", "-m", "add lib"]);

        let ctx = detector.detect_git().await.unwrap();
        assert_eq!(ctx.context_type, ContextType::GitCommit);
        assert_eq!(ctx.confidence, 0.95);
        assert_eq!(ctx.details["commit_message"], "add lib");
        assert_eq!(ctx.details["files_changed"], serde_json::json!(["lib.py"]));
        assert_eq!(ctx.details["commit_hash"].as_str().unwrap().len(), 40);

        assert!(detector.detect_git().await.is_none());
    }

    #[tokio::test]
    async fn test_deployment_not_ready_when_tests_fail() {
        let dir = TempDir::new().unwrap();
        let detector = ContextDetector::with_config(dir.path(), quiet_config());
        assert!(detector.detect_deployment_ready().await.is_none());
    }

    #[tokio::test]
    async fn test_deployment_ready_on_clean_passing_repo() {
        if !git_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        init_repo(dir.path());

        let config = DetectorConfig {
            test_commands: vec![argv(&["false"]), argv(&["true"])],
            build_commands: vec![argv(&["sh", "-c", "exit 0"])],
            ..DetectorConfig::default()
        };
        let detector = ContextDetector::with_config(dir.path(), config);
        let ctx = detector.detect_deployment_ready().await.unwrap();
        assert_eq!(ctx.context_type, ContextType::DeploymentReady);
        assert_eq!(ctx.confidence, 0.9);
        assert_eq!(ctx.details["git_clean"], true);

        std::fs::write(dir.path().join("dirty.txt"), "x").unwrap();
        assert!(detector.detect_deployment_ready().await.is_none());
    }

    #[tokio::test]
    async fn test_summary_keeps_last_five_file_changes() {
        let dir = TempDir::new().unwrap();
        let files: Vec<PathBuf> = (0..7)
            .map(|i| dir.path().join(format!("mod_{}.ts", i)))
            .collect();
        for f in &files {
            std::fs::write(f, "export {}\n").unwrap();
        }

        let detector = ContextDetector::with_config(dir.path(), quiet_config());
        detector.detect_file_changes().await;
        for f in &files {
            touch_forward(f, 10);
        }

        let summary = detector.context_summary().await;
        assert_eq!(summary.project_path, dir.path().display().to_string());
        assert_eq!(summary.contexts.len(), 5);
        assert_eq!(
            summary.contexts[4].details["file_path"],
            files[6].display().to_string().as_str()
        );
    }

    #[tokio::test]
    async fn test_detect_all_aggregates_probes() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("index.js");
        std::fs::write(&file, "1").unwrap();

        let detector = ContextDetector::with_config(dir.path(), quiet_config());
        assert!(detector.detect_all().await.is_empty());
        touch_forward(&file, 10);
        let contexts = detector.detect_all().await;
        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts[0].context_type, ContextType::FileChange);
    }
}
