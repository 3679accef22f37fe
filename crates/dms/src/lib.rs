//! Drowsiness Monitoring System (DMS)
//!
//! Temporal decision engine over per-frame eye landmarks:
//! - Eye Aspect Ratio (EAR) per frame
//! - Consecutive-frame debounce into a stable alert state
//! - Session statistics and alert event log

pub mod analysis;
pub mod config;
pub mod debounce;
pub mod landmarks;
pub mod metric;
pub mod session;
pub mod state;

pub use analysis::{FrameFault, FrameReport};
pub use config::DmsConfig;
pub use debounce::{DebounceOutcome, DebounceStateMachine};
pub use landmarks::{EyeLandmarks, EyePair, LandmarkFrame, Point};
pub use metric::{compute_frame_score, eye_aspect_ratio};
pub use session::{AlertEvent, SessionAggregator, SessionRecord, SessionStats};
pub use state::{AlertState, FrameSignal, Transition};

use alerting::AlertSink;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

/// DMS error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DmsError {
    #[error("Invalid eye landmarks: {0}")]
    InvalidLandmarks(String),

    #[error("Session already finalized")]
    AlreadyFinalized,

    #[error("Alert event open since frame {open_since} cannot be reopened at frame {frame}")]
    OverlappingEvent { open_since: u64, frame: u64 },

    #[error("No open alert event to close at frame {0}")]
    NoOpenEvent(u64),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Frame-sequential drowsiness monitor: extract, debounce, aggregate
pub struct DrowsinessMonitor {
    config: DmsConfig,
    debounce: DebounceStateMachine,
    session: SessionAggregator,
}

impl DrowsinessMonitor {
    /// Create a monitor with an injected alert sink
    pub fn new(config: DmsConfig, sink: Box<dyn AlertSink>) -> Result<Self, DmsError> {
        let debounce = DebounceStateMachine::new(&config, sink)?;
        Ok(Self {
            session: SessionAggregator::new(&config),
            debounce,
            config,
        })
    }

    /// Analyze one frame of detector output
    pub fn process(&mut self, frame: &LandmarkFrame) -> Result<FrameReport, DmsError> {
        let mut faults = Vec::new();

        let signal = match &frame.eyes {
            None => FrameSignal::NoFace,
            Some(eyes) => match compute_frame_score(&eyes.left, &eyes.right) {
                Ok(score) => FrameSignal::from_score(score),
                Err(e) => {
                    warn!("Frame at {}ms treated as no-face: {}", frame.timestamp_ms, e);
                    faults.push(FrameFault::InvalidLandmarks(e.to_string()));
                    FrameSignal::NoFace
                }
            },
        };

        let mut report = self.process_signal(signal, frame.timestamp_ms)?;
        faults.append(&mut report.faults);
        report.faults = faults;
        Ok(report)
    }

    /// Feed an already computed signal (score or no-face)
    pub fn process_signal(
        &mut self,
        signal: FrameSignal,
        timestamp_ms: u64,
    ) -> Result<FrameReport, DmsError> {
        if self.session.is_finalized() {
            return Err(DmsError::AlreadyFinalized);
        }

        let signal = signal.normalized();
        let outcome = self.debounce.observe(signal);
        let frame_index = self
            .session
            .record_frame(signal, outcome.transition, timestamp_ms)?;

        metrics::counter!("dms_frames_total").increment(1);
        match signal {
            FrameSignal::Score(score) => metrics::gauge!("dms_frame_score").set(score),
            FrameSignal::NoFace => metrics::counter!("dms_no_face_frames_total").increment(1),
        }
        if outcome.transition == Some(Transition::EnterAlert) {
            metrics::counter!("dms_alerts_total").increment(1);
        }

        let mut faults = Vec::new();
        if let Some(e) = outcome.sink_error {
            metrics::counter!("dms_sink_failures_total").increment(1);
            faults.push(FrameFault::SinkFailure(e.to_string()));
        }

        debug!(frame_index, ?signal, state = ?self.debounce.state(), "Frame processed");

        Ok(FrameReport {
            frame_index,
            timestamp_ms,
            score: signal.score(),
            transition: outcome.transition,
            alert_state: self.debounce.state(),
            faults,
        })
    }

    /// Live statistics of the current session
    pub fn stats(&self) -> SessionStats {
        self.session.stats()
    }

    /// Finalize the current session. An active alert is ended through the sink.
    pub fn finish(&mut self) -> Result<SessionRecord, DmsError> {
        let record = self.session.finalize()?;
        self.debounce.reset();
        Ok(record)
    }

    /// Start a new session. The unfinished one, if any, is finalized and returned.
    pub fn restart(&mut self) -> Result<Option<SessionRecord>, DmsError> {
        let previous = if self.session.is_finalized() {
            None
        } else {
            Some(self.session.finalize()?)
        };
        self.debounce.reset();
        self.session = SessionAggregator::new(&self.config);
        Ok(previous)
    }

    pub fn state(&self) -> AlertState {
        self.debounce.state()
    }

    pub fn session_id(&self) -> Uuid {
        self.session.session_id()
    }

    pub fn config(&self) -> &DmsConfig {
        &self.config
    }
}
