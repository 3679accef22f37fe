//! Alerting System
//!
//! The drowsiness core only knows the narrow [`AlertSink`] capability. This
//! crate defines it and provides the concrete sinks (log, terminal bell,
//! external command) plus a wrapper that bounds how long a sink may block.

mod command;
mod sink;
mod timeout;

pub use command::CommandSink;
pub use sink::{AlertSink, BellSink, LogSink, NullSink};
pub use timeout::TimeoutSink;

use thiserror::Error;

/// Alert delivery failures. Never fatal to frame processing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("Alert device unavailable: {0}")]
    Unavailable(String),

    #[error("Alert sink timed out after {0}ms")]
    Timeout(u64),

    #[error("Alert sink worker disconnected")]
    Disconnected,

    #[error("Alert sink I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for SinkError {
    fn from(e: std::io::Error) -> Self {
        SinkError::Io(e.to_string())
    }
}
