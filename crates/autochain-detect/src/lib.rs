//! Context detection for autochain.
//!
//! Turns raw signals into typed, confidence-scored [`ContextInfo`] values:
//! terminal text through the regex [`PatternSet`], and live project state
//! through the git, file-change, idle and deployment probes of
//! [`ContextDetector`].
//!
//! [`ContextInfo`]: autochain_core::ContextInfo

pub mod detector;
pub mod error;
pub mod glob;
pub mod patterns;
pub mod probe;

pub use detector::{ContextDetector, ContextSummary};
pub use error::ProbeError;
pub use glob::GlobPattern;
pub use patterns::{PatternMatch, PatternSet};
pub use probe::{run_probe, ProbeOutput};
