//! DMS configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::DmsError;

/// Drowsiness decision configuration, fixed for the lifetime of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DmsConfig {
    /// Frame score below this value counts as eyes closed
    pub ear_threshold: f64,

    /// Consecutive closed frames required before alerting
    pub consecutive_frames: u32,

    /// Longest an alert sink may block frame processing (milliseconds)
    pub alert_sink_timeout_ms: u64,
}

impl Default for DmsConfig {
    fn default() -> Self {
        Self {
            ear_threshold: 0.25,
            consecutive_frames: 20,
            alert_sink_timeout_ms: 250,
        }
    }
}

impl DmsConfig {
    /// Create strict config (alerts on shorter, shallower closures)
    pub fn strict() -> Self {
        Self {
            ear_threshold: 0.28,
            consecutive_frames: 10,
            ..Default::default()
        }
    }

    /// Create lenient config (needs longer, deeper closures)
    pub fn lenient() -> Self {
        Self {
            ear_threshold: 0.21,
            consecutive_frames: 30,
            ..Default::default()
        }
    }

    /// Reject configurations the debounce machine cannot run with
    pub fn validate(&self) -> Result<(), DmsError> {
        if !self.ear_threshold.is_finite() || self.ear_threshold <= 0.0 {
            return Err(DmsError::Config(format!(
                "ear_threshold must be a positive number, got {}",
                self.ear_threshold
            )));
        }
        if self.consecutive_frames < 1 {
            return Err(DmsError::Config(
                "consecutive_frames must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Alert sink timeout as a duration
    pub fn sink_timeout(&self) -> Duration {
        Duration::from_millis(self.alert_sink_timeout_ms)
    }
}
