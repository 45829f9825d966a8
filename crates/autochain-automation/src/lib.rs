//! Process-level automation for autochain.
//!
//! [`AutomationManager`] owns the monitoring loop that feeds detected
//! contexts into the workflow engine, plus callbacks, statistics and the
//! manual-trigger and persistence entry points.

pub mod callbacks;
pub mod error;
pub mod manager;
pub mod recommend;
pub mod stats;

pub use callbacks::{
    AutomationCallback, AutomationEvent, CallbackEvent, CallbackId, CallbackRegistry, FnCallback,
};
pub use error::{AutomationError, CallbackError};
pub use manager::{AutomationManager, AutomationStatus, ChainTestReport, MonitoringStatus};
pub use recommend::recommendations_for;
pub use stats::AutomationStats;
