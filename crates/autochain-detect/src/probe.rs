//! Bounded external command execution for detector probes.
//!
//! Every probe runs through [`run_probe`]: the child is spawned on the tokio
//! process driver, its output captured, and it is killed if it outlives its
//! timeout, so a slow `git` or `npm` never stalls the monitoring loop.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tracing::debug;

use crate::error::ProbeError;

/// Captured result of a finished probe command.
#[derive(Debug, Clone, Default)]
pub struct ProbeOutput {
    /// Exit code, `None` if the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProbeOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Run `argv` in `cwd`, waiting at most `timeout`.
///
/// A non-zero exit is not an error here; use [`run_checked`] for that.
pub async fn run_probe(
    argv: &[String],
    cwd: &Path,
    timeout: Duration,
) -> Result<ProbeOutput, ProbeError> {
    let command = argv.join(" ");
    let (program, args) = argv.split_first().ok_or_else(|| ProbeError::Spawn {
        command: command.clone(),
        reason: "empty command line".to_string(),
    })?;

    debug!(command = %command, cwd = %cwd.display(), "running probe");

    let child = tokio::process::Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ProbeError::Spawn {
            command: command.clone(),
            reason: e.to_string(),
        })?;

    // On timeout the child is dropped and killed via `kill_on_drop(true)`.
    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(ProbeOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }),
        Ok(Err(e)) => Err(ProbeError::Io(e)),
        Err(_) => Err(ProbeError::Timeout { command, timeout }),
    }
}

/// Run `argv` and return its trimmed stdout, treating a non-zero exit as an
/// error.
pub async fn run_checked(
    argv: &[String],
    cwd: &Path,
    timeout: Duration,
) -> Result<String, ProbeError> {
    let output = run_probe(argv, cwd, timeout).await?;
    if !output.success() {
        return Err(ProbeError::NonZeroExit {
            command: argv.join(" "),
            code: output.code,
        });
    }
    Ok(output.stdout.trim().to_string())
}

/// Build an owned argv from string literals.
pub fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}
