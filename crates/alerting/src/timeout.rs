//! Timeout-bounded sink delivery
//!
//! The wrapped sink runs on its own worker thread. Each call waits at most
//! the configured timeout for the worker to answer; a slow or hung sink is
//! reported as [`SinkError::Timeout`] and the caller moves on.

use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, RecvTimeoutError, SendTimeoutError, Sender};
use tracing::{debug, warn};

use crate::sink::AlertSink;
use crate::SinkError;

/// Calls that can queue up behind a hung sink before sends start timing out
const PENDING_CALLS: usize = 8;

#[derive(Debug, Clone, Copy)]
enum Call {
    Start,
    End,
}

type Request = (Call, Sender<Result<(), SinkError>>);

/// Sink wrapper that never blocks longer than `timeout`
pub struct TimeoutSink {
    calls: Sender<Request>,
    timeout: Duration,
}

impl TimeoutSink {
    /// Move `sink` onto a dedicated worker thread
    pub fn spawn<S>(mut sink: S, timeout: Duration) -> Result<Self, SinkError>
    where
        S: AlertSink + 'static,
    {
        let (calls, requests) = bounded::<Request>(PENDING_CALLS);

        thread::Builder::new()
            .name("alert-sink".to_string())
            .spawn(move || {
                for (call, reply) in requests.iter() {
                    let result = match call {
                        Call::Start => sink.on_alert_start(),
                        Call::End => sink.on_alert_end(),
                    };
                    // Caller may have given up waiting
                    let _ = reply.send(result);
                }
                debug!("Alert sink worker stopped");
            })?;

        debug!("Alert sink worker started (timeout {:?})", timeout);
        Ok(Self { calls, timeout })
    }

    /// Configured timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }

    fn dispatch(&mut self, call: Call) -> Result<(), SinkError> {
        let deadline = Instant::now() + self.timeout;
        let (reply_tx, reply_rx) = bounded(1);

        self.calls
            .send_deadline((call, reply_tx), deadline)
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => SinkError::Timeout(self.timeout_ms()),
                SendTimeoutError::Disconnected(_) => SinkError::Disconnected,
            })?;

        match reply_rx.recv_deadline(deadline) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                warn!("Alert sink {:?} call exceeded {}ms", call, self.timeout_ms());
                Err(SinkError::Timeout(self.timeout_ms()))
            }
            Err(RecvTimeoutError::Disconnected) => Err(SinkError::Disconnected),
        }
    }
}

impl AlertSink for TimeoutSink {
    fn on_alert_start(&mut self) -> Result<(), SinkError> {
        self.dispatch(Call::Start)
    }

    fn on_alert_end(&mut self) -> Result<(), SinkError> {
        self.dispatch(Call::End)
    }
}
