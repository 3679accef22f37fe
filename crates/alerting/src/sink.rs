//! Alert sink capability and the simple in-process sinks

use std::io::Write;

use tracing::{info, warn};

use crate::SinkError;

/// Capability invoked on transitions into and out of the alerting state
pub trait AlertSink: Send {
    /// Called once when the subject is judged drowsy
    fn on_alert_start(&mut self) -> Result<(), SinkError>;

    /// Called once when the subject is judged awake again
    fn on_alert_end(&mut self) -> Result<(), SinkError>;
}

impl<S: AlertSink + ?Sized> AlertSink for Box<S> {
    fn on_alert_start(&mut self) -> Result<(), SinkError> {
        (**self).on_alert_start()
    }

    fn on_alert_end(&mut self) -> Result<(), SinkError> {
        (**self).on_alert_end()
    }
}

/// Sink that does nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl AlertSink for NullSink {
    fn on_alert_start(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    fn on_alert_end(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Sink that reports alerts through the tracing log
#[derive(Debug, Default)]
pub struct LogSink {
    alerts: usize,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of alerts started through this sink
    pub fn alert_count(&self) -> usize {
        self.alerts
    }
}

impl AlertSink for LogSink {
    fn on_alert_start(&mut self) -> Result<(), SinkError> {
        self.alerts += 1;
        warn!(alert = self.alerts, "DROWSINESS ALERT: sustained eye closure");
        Ok(())
    }

    fn on_alert_end(&mut self) -> Result<(), SinkError> {
        info!(alert = self.alerts, "Drowsiness alert cleared");
        Ok(())
    }
}

/// Sink that rings the terminal bell and prints a banner
pub struct BellSink<W: Write + Send> {
    out: W,
}

impl BellSink<std::io::Stdout> {
    /// Bell on standard output
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> BellSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Consume the sink and return the writer
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> AlertSink for BellSink<W> {
    fn on_alert_start(&mut self) -> Result<(), SinkError> {
        writeln!(self.out, "\x07****************ALERT!****************")?;
        self.out.flush()?;
        Ok(())
    }

    fn on_alert_end(&mut self) -> Result<(), SinkError> {
        writeln!(self.out, "alert cleared")?;
        self.out.flush()?;
        Ok(())
    }
}
