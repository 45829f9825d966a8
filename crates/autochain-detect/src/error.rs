//! Error types for detector probes.

use std::time::Duration;

/// Errors raised while running an external probe command.
///
/// Probes never surface these to callers of the detector: every probe
/// logs the error at `debug` and reports "no context" instead.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("Failed to spawn `{command}`: {reason}")]
    Spawn { command: String, reason: String },
    #[error("`{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },
    #[error("`{command}` exited with status {code:?}")]
    NonZeroExit { command: String, code: Option<i32> },
    #[error("Probe I/O error: {0}")]
    Io(#[from] std::io::Error),
}
