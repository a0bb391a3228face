//! Tracker configuration.

use serde::{Deserialize, Serialize};

/// Knobs for [`BasicProgressTracker`](crate::BasicProgressTracker).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Lock every item of a sequential course for students who are not enrolled
    pub require_enrollment: bool,

    /// Assumed learning pace used for completion estimates
    pub hours_per_day: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            require_enrollment: true,
            hours_per_day: 1.0,
        }
    }
}
