//! Session aggregation
//!
//! Counts frames, tracks alert events and produces the finalized
//! [`SessionRecord`]. Frame indices are 1-based; timestamps come from the
//! caller's monotonic clock in milliseconds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::DmsConfig;
use crate::state::{FrameSignal, Transition};
use crate::DmsError;

/// One sustained eye-closure alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertEvent {
    pub start_frame_index: u64,
    pub end_frame_index: Option<u64>,
    pub start_timestamp: u64,
    pub end_timestamp: Option<u64>,
    /// Mean score over the frames spent alerting (no-face frames excluded)
    pub mean_score: Option<f64>,
    /// Lowest score over the frames spent alerting
    pub peak_score: Option<f64>,
}

impl AlertEvent {
    pub fn is_closed(&self) -> bool {
        self.end_frame_index.is_some()
    }

    /// Alert length by timestamp, if closed
    pub fn duration_ms(&self) -> Option<u64> {
        self.end_timestamp
            .map(|end| end.saturating_sub(self.start_timestamp))
    }
}

/// Finalized record of one monitoring session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub total_frames: u64,
    pub no_face_frames: u64,
    pub drowsy_frames: u64,
    pub events: Vec<AlertEvent>,
    /// Mean score over frames with a face; `None` when there were none
    pub mean_score: Option<f64>,
}

impl SessionRecord {
    /// Frames with a face and a score at or above the threshold
    pub fn awake_frames(&self) -> u64 {
        self.total_frames
            .saturating_sub(self.drowsy_frames)
            .saturating_sub(self.no_face_frames)
    }

    /// Drowsy and no-face frames fit inside the frame total
    pub fn is_consistent(&self) -> bool {
        self.drowsy_frames
            .checked_add(self.no_face_frames)
            .is_some_and(|n| n <= self.total_frames)
    }

    /// Share of frames judged drowsy (0-100)
    pub fn drowsiness_percentage(&self) -> f64 {
        percentage(self.drowsy_frames, self.total_frames)
    }

    /// Wall-clock length of the session
    pub fn duration(&self) -> chrono::Duration {
        self.end_time - self.start_time
    }
}

/// Live snapshot of an in-progress session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStats {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// First to last frame timestamp
    pub elapsed_ms: u64,
    pub total_frames: u64,
    pub drowsy_frames: u64,
    pub no_face_frames: u64,
    /// Closed events plus the open one, if any
    pub events: usize,
    pub alerting: bool,
    pub drowsiness_percentage: f64,
    pub current_score: Option<f64>,
    pub mean_score: Option<f64>,
    pub min_score: Option<f64>,
    pub max_score: Option<f64>,
}

fn percentage(part: u64, total: u64) -> f64 {
    part as f64 / total.max(1) as f64 * 100.0
}

/// Running sum/min/max of defined scores
#[derive(Debug, Clone, Copy, Default)]
struct ScoreAccumulator {
    sum: f64,
    count: u64,
    min: Option<f64>,
    max: Option<f64>,
}

impl ScoreAccumulator {
    fn add(&mut self, score: Option<f64>) {
        let Some(score) = score else {
            return;
        };
        self.sum += score;
        self.count += 1;
        self.min = Some(self.min.map_or(score, |m| m.min(score)));
        self.max = Some(self.max.map_or(score, |m| m.max(score)));
    }

    fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

#[derive(Debug, Clone)]
struct OpenEvent {
    start_frame_index: u64,
    start_timestamp: u64,
    scores: ScoreAccumulator,
}

impl OpenEvent {
    fn close(self, end_frame_index: u64, end_timestamp: u64) -> AlertEvent {
        AlertEvent {
            start_frame_index: self.start_frame_index,
            end_frame_index: Some(end_frame_index),
            start_timestamp: self.start_timestamp,
            end_timestamp: Some(end_timestamp),
            mean_score: self.scores.mean(),
            peak_score: self.scores.min,
        }
    }
}

/// Accumulates one session's frames and events
#[derive(Debug)]
pub struct SessionAggregator {
    session_id: Uuid,
    start_time: DateTime<Utc>,
    ear_threshold: f64,
    total_frames: u64,
    no_face_frames: u64,
    drowsy_frames: u64,
    scores: ScoreAccumulator,
    last_score: Option<f64>,
    first_timestamp: Option<u64>,
    last_timestamp: Option<u64>,
    open_event: Option<OpenEvent>,
    events: Vec<AlertEvent>,
    finalized: bool,
}

impl SessionAggregator {
    pub fn new(config: &DmsConfig) -> Self {
        let session_id = Uuid::new_v4();
        info!("Starting session {}", session_id);
        Self {
            session_id,
            start_time: Utc::now(),
            ear_threshold: config.ear_threshold,
            total_frames: 0,
            no_face_frames: 0,
            drowsy_frames: 0,
            scores: ScoreAccumulator::default(),
            last_score: None,
            first_timestamp: None,
            last_timestamp: None,
            open_event: None,
            events: Vec::new(),
            finalized: false,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Record one frame and the transition it fired. Returns the frame index.
    pub fn record_frame(
        &mut self,
        signal: FrameSignal,
        transition: Option<Transition>,
        timestamp_ms: u64,
    ) -> Result<u64, DmsError> {
        if self.finalized {
            return Err(DmsError::AlreadyFinalized);
        }

        let signal = signal.normalized();
        let frame = self.total_frames + 1;

        // Contract checks before any counter moves
        match (transition, &self.open_event) {
            (Some(Transition::EnterAlert), Some(open)) => {
                error!(
                    "ENTER_ALERT at frame {} while event from frame {} is open",
                    frame, open.start_frame_index
                );
                return Err(DmsError::OverlappingEvent {
                    open_since: open.start_frame_index,
                    frame,
                });
            }
            (Some(Transition::ExitAlert), None) => {
                error!("EXIT_ALERT at frame {} with no open event", frame);
                return Err(DmsError::NoOpenEvent(frame));
            }
            _ => {}
        }

        self.total_frames = frame;
        if signal.is_no_face() {
            self.no_face_frames += 1;
        } else if signal.is_drowsy_score(self.ear_threshold) {
            self.drowsy_frames += 1;
        }
        self.scores.add(signal.score());
        self.last_score = signal.score();
        if self.first_timestamp.is_none() {
            self.first_timestamp = Some(timestamp_ms);
        }
        self.last_timestamp = Some(timestamp_ms);

        match transition {
            Some(Transition::EnterAlert) => {
                debug!("Opening alert event at frame {}", frame);
                self.open_event = Some(OpenEvent {
                    start_frame_index: frame,
                    start_timestamp: timestamp_ms,
                    scores: ScoreAccumulator::default(),
                });
            }
            Some(Transition::ExitAlert) => {
                if let Some(open) = self.open_event.take() {
                    let event = open.close(frame, timestamp_ms);
                    debug!(
                        "Closed alert event frames {}-{}",
                        event.start_frame_index, frame
                    );
                    self.events.push(event);
                }
            }
            None => {}
        }

        if let Some(open) = self.open_event.as_mut() {
            open.scores.add(signal.score());
        }

        Ok(frame)
    }

    /// Close the session. An alert still running ends at the last frame.
    pub fn finalize(&mut self) -> Result<SessionRecord, DmsError> {
        if self.finalized {
            return Err(DmsError::AlreadyFinalized);
        }

        if let Some(open) = self.open_event.take() {
            let end_timestamp = self.last_timestamp.unwrap_or(open.start_timestamp);
            let event = open.close(self.total_frames, end_timestamp);
            debug!(
                "Closing in-progress alert event at session end (frames {}-{})",
                event.start_frame_index, self.total_frames
            );
            self.events.push(event);
        }

        self.finalized = true;
        let record = SessionRecord {
            session_id: self.session_id,
            start_time: self.start_time,
            end_time: Utc::now(),
            total_frames: self.total_frames,
            no_face_frames: self.no_face_frames,
            drowsy_frames: self.drowsy_frames,
            events: self.events.clone(),
            mean_score: self.scores.mean(),
        };

        info!(
            "Session {} finalized: {} frames, {} drowsy, {} no-face, {} events",
            record.session_id,
            record.total_frames,
            record.drowsy_frames,
            record.no_face_frames,
            record.events.len()
        );
        Ok(record)
    }

    pub fn stats(&self) -> SessionStats {
        let elapsed_ms = match (self.first_timestamp, self.last_timestamp) {
            (Some(first), Some(last)) => last.saturating_sub(first),
            _ => 0,
        };

        SessionStats {
            session_id: self.session_id,
            started_at: self.start_time,
            elapsed_ms,
            total_frames: self.total_frames,
            drowsy_frames: self.drowsy_frames,
            no_face_frames: self.no_face_frames,
            events: self.events.len() + usize::from(self.open_event.is_some()),
            alerting: self.open_event.is_some(),
            drowsiness_percentage: percentage(self.drowsy_frames, self.total_frames),
            current_score: self.last_score,
            mean_score: self.scores.mean(),
            min_score: self.scores.min,
            max_score: self.scores.max,
        }
    }
}
