//! Per-frame analysis results

use serde::{Deserialize, Serialize};

use crate::state::{AlertState, Transition};

/// Fault absorbed while processing a frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FrameFault {
    /// Degenerate landmarks, frame treated as no-face
    InvalidLandmarks(String),

    /// Alert sink failed or timed out, state still updated
    SinkFailure(String),
}

/// Result of processing one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameReport {
    /// 1-based frame index within the session
    pub frame_index: u64,

    pub timestamp_ms: u64,

    /// Combined EAR, absent for no-face frames
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,

    /// Transition fired on this frame
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transition: Option<Transition>,

    /// Alert state after this frame
    pub alert_state: AlertState,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub faults: Vec<FrameFault>,
}

impl FrameReport {
    pub fn face_detected(&self) -> bool {
        self.score.is_some()
    }

    pub fn has_faults(&self) -> bool {
        !self.faults.is_empty()
    }

    /// Whether this frame started an alert
    pub fn alert_started(&self) -> bool {
        self.transition == Some(Transition::EnterAlert)
    }
}
