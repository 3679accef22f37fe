//! Driver alert state and per-frame signal

use serde::{Deserialize, Serialize};

/// Alert state owned by the debounce machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertState {
    #[default]
    Awake,
    Alerting,
}

/// Alert state transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Transition {
    /// AWAKE -> ALERTING
    EnterAlert,
    /// ALERTING -> AWAKE
    ExitAlert,
}

/// What one frame contributes to the decision
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameSignal {
    /// Combined EAR of both eyes
    Score(f64),
    /// No usable face in the frame
    NoFace,
}

impl FrameSignal {
    /// NaN scores mean the detector produced nothing usable
    pub fn from_score(score: f64) -> Self {
        if score.is_nan() {
            FrameSignal::NoFace
        } else {
            FrameSignal::Score(score)
        }
    }

    /// Same signal with a NaN score folded into no-face
    pub fn normalized(self) -> Self {
        match self {
            FrameSignal::Score(score) => Self::from_score(score),
            FrameSignal::NoFace => FrameSignal::NoFace,
        }
    }

    pub fn score(&self) -> Option<f64> {
        match self {
            FrameSignal::Score(score) => Some(*score),
            FrameSignal::NoFace => None,
        }
    }

    pub fn is_no_face(&self) -> bool {
        matches!(self, FrameSignal::NoFace)
    }

    /// Counts toward closure: a low score, or no face (drowsiness cannot be
    /// ruled out without one)
    pub fn is_below(&self, threshold: f64) -> bool {
        match self {
            FrameSignal::Score(score) => *score < threshold,
            FrameSignal::NoFace => true,
        }
    }

    /// A measured score under the threshold (no-face excluded)
    pub fn is_drowsy_score(&self, threshold: f64) -> bool {
        matches!(self, FrameSignal::Score(score) if *score < threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nan_is_no_face() {
        assert_eq!(FrameSignal::from_score(f64::NAN), FrameSignal::NoFace);
        assert_eq!(FrameSignal::from_score(0.3), FrameSignal::Score(0.3));
    }

    #[test]
    fn test_threshold_boundary() {
        assert!(FrameSignal::Score(0.249).is_below(0.25));
        assert!(!FrameSignal::Score(0.25).is_below(0.25));
        assert!(FrameSignal::NoFace.is_below(0.25));
    }

    #[test]
    fn test_no_face_is_not_a_drowsy_score() {
        assert!(!FrameSignal::NoFace.is_drowsy_score(0.25));
        assert!(FrameSignal::Score(0.1).is_drowsy_score(0.25));
    }

    #[test]
    fn test_serialized_names() {
        assert_eq!(serde_json_name(Transition::EnterAlert), "\"ENTER_ALERT\"");
        assert_eq!(serde_json_name(AlertState::Alerting), "\"ALERTING\"");
    }

    fn serde_json_name<T: Serialize>(value: T) -> String {
        serde_json::to_string(&value).unwrap()
    }

    #[test]
    fn test_normalized_folds_nan_score() {
        assert_eq!(FrameSignal::Score(f64::NAN).normalized(), FrameSignal::NoFace);
        assert_eq!(FrameSignal::Score(0.2).normalized(), FrameSignal::Score(0.2));
        assert_eq!(FrameSignal::NoFace.normalized(), FrameSignal::NoFace);
    }
}
