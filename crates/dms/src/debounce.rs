//! Consecutive-frame debounce
//!
//! Turns the noisy per-frame signal into a stable alert state. Entering
//! ALERTING needs `consecutive_frames` below-threshold frames in a row;
//! a single frame at or above the threshold leaves it. Both directions use
//! the same comparator.

use alerting::{AlertSink, SinkError};
use tracing::{debug, info, warn};

use crate::config::DmsConfig;
use crate::state::{AlertState, FrameSignal, Transition};
use crate::DmsError;

/// Result of observing one frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DebounceOutcome {
    /// Transition fired on this frame, if any
    pub transition: Option<Transition>,
    /// Non-fatal sink failure raised while firing the transition
    pub sink_error: Option<SinkError>,
}

/// Alert state machine for one session
pub struct DebounceStateMachine {
    ear_threshold: f64,
    consecutive_frames: u32,
    below_count: u32,
    state: AlertState,
    sink: Box<dyn AlertSink>,
}

impl DebounceStateMachine {
    pub fn new(config: &DmsConfig, sink: Box<dyn AlertSink>) -> Result<Self, DmsError> {
        config.validate()?;
        Ok(Self {
            ear_threshold: config.ear_threshold,
            consecutive_frames: config.consecutive_frames,
            below_count: 0,
            state: AlertState::Awake,
            sink,
        })
    }

    /// Feed one frame
    pub fn observe(&mut self, signal: FrameSignal) -> DebounceOutcome {
        let signal = signal.normalized();
        if signal.is_below(self.ear_threshold) {
            self.below_count = self.below_count.saturating_add(1);
            debug!(below = self.below_count, ?signal, "Below threshold");

            if self.below_count == self.consecutive_frames && self.state == AlertState::Awake {
                self.state = AlertState::Alerting;
                info!("Entering ALERTING after {} consecutive frames", self.below_count);
                let sink_error = self.notify(Transition::EnterAlert);
                return DebounceOutcome {
                    transition: Some(Transition::EnterAlert),
                    sink_error,
                };
            }
            return DebounceOutcome::default();
        }

        self.below_count = 0;
        if self.state == AlertState::Alerting {
            self.state = AlertState::Awake;
            info!("Leaving ALERTING");
            let sink_error = self.notify(Transition::ExitAlert);
            return DebounceOutcome {
                transition: Some(Transition::ExitAlert),
                sink_error,
            };
        }

        DebounceOutcome::default()
    }

    /// Sink failures never hold back the state change
    fn notify(&mut self, transition: Transition) -> Option<SinkError> {
        let result = match transition {
            Transition::EnterAlert => self.sink.on_alert_start(),
            Transition::ExitAlert => self.sink.on_alert_end(),
        };
        match result {
            Ok(()) => None,
            Err(e) => {
                warn!("Alert sink failed on {:?}: {}", transition, e);
                Some(e)
            }
        }
    }

    pub fn state(&self) -> AlertState {
        self.state
    }

    pub fn is_alerting(&self) -> bool {
        self.state == AlertState::Alerting
    }

    /// Consecutive below-threshold frames so far
    pub fn below_count(&self) -> u32 {
        self.below_count
    }

    /// Back to AWAKE with a cleared counter (session restart).
    /// An active alert is ended through the sink first.
    pub fn reset(&mut self) {
        if self.is_alerting() {
            if let Some(e) = self.notify(Transition::ExitAlert) {
                warn!("Alert sink failed while resetting: {}", e);
            }
        }
        self.state = AlertState::Awake;
        self.below_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct FakeSink {
        calls: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    impl AlertSink for FakeSink {
        fn on_alert_start(&mut self) -> Result<(), SinkError> {
            self.calls.lock().unwrap().push("start");
            if self.fail {
                return Err(SinkError::Unavailable("no audio device".to_string()));
            }
            Ok(())
        }

        fn on_alert_end(&mut self) -> Result<(), SinkError> {
            self.calls.lock().unwrap().push("end");
            if self.fail {
                return Err(SinkError::Unavailable("no audio device".to_string()));
            }
            Ok(())
        }
    }

    fn machine(threshold: f64, frames: u32, sink: FakeSink) -> DebounceStateMachine {
        let config = DmsConfig {
            ear_threshold: threshold,
            consecutive_frames: frames,
            ..Default::default()
        };
        DebounceStateMachine::new(&config, Box::new(sink)).unwrap()
    }

    fn transitions(machine: &mut DebounceStateMachine, scores: &[f64]) -> Vec<Option<Transition>> {
        scores
            .iter()
            .map(|&s| machine.observe(FrameSignal::from_score(s)).transition)
            .collect()
    }

    #[test]
    fn test_reference_sequence() {
        let sink = FakeSink::default();
        let mut m = machine(0.25, 3, sink.clone());

        let fired = transitions(&mut m, &[0.30, 0.20, 0.18, 0.19, 0.30]);
        assert_eq!(
            fired,
            vec![
                None,
                None,
                Some(Transition::EnterAlert),
                None,
                Some(Transition::ExitAlert)
            ]
        );
        assert_eq!(*sink.calls.lock().unwrap(), vec!["start", "end"]);
    }

    #[test]
    fn test_raw_nan_score_counts_as_below() {
        let mut m = machine(0.25, 2, FakeSink::default());
        assert_eq!(m.observe(FrameSignal::Score(0.1)).transition, None);
        assert_eq!(
            m.observe(FrameSignal::Score(f64::NAN)).transition,
            Some(Transition::EnterAlert)
        );

        // NaN never reads as an eye-open frame either
        assert_eq!(m.observe(FrameSignal::Score(f64::NAN)).transition, None);
        assert!(m.is_alerting());
    }

    #[test]
    fn test_one_short_of_boundary_never_alerts() {
        let mut m = machine(0.25, 4, FakeSink::default());
        let fired = transitions(&mut m, &[0.1, 0.1, 0.1, 0.25]);
        assert!(fired.iter().all(Option::is_none));
        assert_eq!(m.state(), AlertState::Awake);
        assert_eq!(m.below_count(), 0);
    }

    #[test]
    fn test_boundary_fires_exactly_once() {
        let sink = FakeSink::default();
        let mut m = machine(0.25, 3, sink.clone());
        let fired = transitions(&mut m, &[0.1; 10]);

        let enters = fired.iter().filter(|t| **t == Some(Transition::EnterAlert)).count();
        assert_eq!(enters, 1);
        assert_eq!(fired[2], Some(Transition::EnterAlert));
        assert_eq!(m.below_count(), 10);
        assert_eq!(sink.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_single_awake_frame_exits_and_resets() {
        let mut m = machine(0.25, 2, FakeSink::default());
        transitions(&mut m, &[0.1, 0.1]);
        assert!(m.is_alerting());

        let outcome = m.observe(FrameSignal::Score(0.25));
        assert_eq!(outcome.transition, Some(Transition::ExitAlert));
        assert_eq!(m.below_count(), 0);
        assert_eq!(m.state(), AlertState::Awake);
    }

    #[test]
    fn test_exactly_threshold_counts_as_awake() {
        let mut m = machine(0.25, 1, FakeSink::default());
        assert_eq!(m.observe(FrameSignal::Score(0.25)).transition, None);
        assert_eq!(
            m.observe(FrameSignal::Score(0.2499)).transition,
            Some(Transition::EnterAlert)
        );
    }

    #[test]
    fn test_no_face_counts_as_below() {
        let mut m = machine(0.25, 3, FakeSink::default());
        m.observe(FrameSignal::NoFace);
        m.observe(FrameSignal::Score(0.1));
        assert_eq!(m.below_count(), 2);
        assert_eq!(
            m.observe(FrameSignal::NoFace).transition,
            Some(Transition::EnterAlert)
        );
    }

    #[test]
    fn test_sink_failure_does_not_block_transition() {
        let sink = FakeSink {
            fail: true,
            ..Default::default()
        };
        let mut m = machine(0.25, 1, sink.clone());

        let outcome = m.observe(FrameSignal::Score(0.1));
        assert_eq!(outcome.transition, Some(Transition::EnterAlert));
        assert!(matches!(outcome.sink_error, Some(SinkError::Unavailable(_))));
        assert!(m.is_alerting());

        let outcome = m.observe(FrameSignal::Score(0.3));
        assert_eq!(outcome.transition, Some(Transition::ExitAlert));
        assert!(outcome.sink_error.is_some());
        assert!(!m.is_alerting());
    }

    #[test]
    fn test_reset_ends_active_alert() {
        let sink = FakeSink::default();
        let mut m = machine(0.25, 1, sink.clone());
        m.observe(FrameSignal::Score(0.1));
        m.reset();

        assert_eq!(m.state(), AlertState::Awake);
        assert_eq!(m.below_count(), 0);
        assert_eq!(*sink.calls.lock().unwrap(), vec!["start", "end"]);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = DmsConfig {
            consecutive_frames: 0,
            ..Default::default()
        };
        assert!(DebounceStateMachine::new(&config, Box::new(FakeSink::default())).is_err());
    }

    fn arb_signal() -> impl Strategy<Value = FrameSignal> {
        prop_oneof![
            4 => (0.0f64..0.5).prop_map(FrameSignal::Score),
            1 => Just(FrameSignal::NoFace),
        ]
    }

    proptest! {
        #[test]
        fn prop_enters_match_long_runs(
            signals in proptest::collection::vec(arb_signal(), 0..200),
            frames in 1u32..8,
        ) {
            let threshold = 0.25;
            let mut m = machine(threshold, frames, FakeSink::default());
            let fired: Vec<_> = signals.iter().map(|s| m.observe(*s).transition).collect();

            // Every maximal run of >= `frames` below-threshold frames enters once
            let mut expected_enters = 0;
            let mut run = 0u32;
            for s in &signals {
                if s.is_below(threshold) {
                    run += 1;
                    if run == frames {
                        expected_enters += 1;
                    }
                } else {
                    run = 0;
                }
            }
            let enters = fired.iter().filter(|t| **t == Some(Transition::EnterAlert)).count();
            prop_assert_eq!(enters, expected_enters);

            // Enter and exit strictly alternate, starting with enter
            let mut alerting = false;
            for t in fired.into_iter().flatten() {
                match t {
                    Transition::EnterAlert => prop_assert!(!alerting),
                    Transition::ExitAlert => prop_assert!(alerting),
                }
                alerting = t == Transition::EnterAlert;
            }
            prop_assert_eq!(alerting, m.is_alerting());
        }
    }
}
