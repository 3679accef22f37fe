//! External command sink (audio player, notifier, ...)

use std::process::{Child, Command, Stdio};

use tracing::{debug, info, warn};

use crate::sink::AlertSink;
use crate::SinkError;

/// Starts an external program when an alert begins and stops it when the
/// alert ends, e.g. `aplay alarm.wav`.
pub struct CommandSink {
    program: String,
    args: Vec<String>,
    child: Option<Child>,
}

impl CommandSink {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            child: None,
        }
    }

    /// Build from an argv list, first element is the program
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone(), args.to_vec()))
    }

    /// Whether the alert process is still running
    pub fn is_running(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    fn stop(&mut self) -> Result<(), SinkError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        if let Ok(Some(status)) = child.try_wait() {
            debug!("Alert command already exited: {}", status);
            return Ok(());
        }

        child.kill()?;
        child.wait()?;
        debug!("Alert command stopped");
        Ok(())
    }
}

impl AlertSink for CommandSink {
    fn on_alert_start(&mut self) -> Result<(), SinkError> {
        if self.is_running() {
            return Ok(());
        }

        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| SinkError::Unavailable(format!("{}: {}", self.program, e)))?;

        info!("Alert command started: {} (pid {})", self.program, child.id());
        self.child = Some(child);
        Ok(())
    }

    fn on_alert_end(&mut self) -> Result<(), SinkError> {
        self.stop()
    }
}

impl Drop for CommandSink {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Failed to stop alert command on drop: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_argv() {
        assert!(CommandSink::from_argv(&[]).is_none());

        let sink = CommandSink::from_argv(&["aplay".to_string(), "alarm.wav".to_string()]).unwrap();
        assert_eq!(sink.program, "aplay");
        assert_eq!(sink.args, vec!["alarm.wav".to_string()]);
    }

    #[test]
    fn test_missing_program_is_unavailable() {
        let mut sink = CommandSink::new("/nonexistent/alarm-player", vec![]);
        assert!(matches!(sink.on_alert_start(), Err(SinkError::Unavailable(_))));
        assert!(!sink.is_running());
    }

    #[test]
    fn test_end_without_start_is_ok() {
        let mut sink = CommandSink::new("true", vec![]);
        assert!(sink.on_alert_end().is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_start_then_stop_long_running_command() {
        let mut sink = CommandSink::new("sleep", vec!["30".to_string()]);
        sink.on_alert_start().unwrap();
        assert!(sink.is_running());

        sink.on_alert_end().unwrap();
        assert!(!sink.is_running());
    }
}
