use serde::{Deserialize, Serialize};

use autochain_core::Timestamp;

/// Counters kept while monitoring. Reset on every start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationStats {
    pub contexts_detected: u64,
    pub workflows_triggered: u64,
    pub workflows_completed: u64,
    pub start_time: Timestamp,
}

impl AutomationStats {
    pub fn new() -> Self {
        Self {
            contexts_detected: 0,
            workflows_triggered: 0,
            workflows_completed: 0,
            start_time: Timestamp::now(),
        }
    }

    pub fn uptime_secs(&self) -> f64 {
        self.start_time.seconds_until(Timestamp::now()).max(0.0)
    }
}

impl Default for AutomationStats {
    fn default() -> Self {
        Self::new()
    }
}
