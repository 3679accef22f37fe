//! Layered application settings
//!
//! Resolution order, later wins: built-in defaults, optional config file,
//! `DROWSY_*` environment variables (sections nested with `__`, e.g.
//! `DROWSY_DMS__EAR_THRESHOLD=0.22`), then command-line flags applied by
//! the binary.

use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment, File};
use dms::DmsConfig;
use frame_queue::QueueConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub dms: DmsConfig,
    pub queue: QueueConfig,
    pub storage: StorageSettings,
    pub server: ServerSettings,
    pub alert: AlertSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// JSON session log
    pub log_path: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from("sessions.json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub addr: String,
    /// Scrape endpoint for a running monitor, off when unset
    pub metrics_addr: Option<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".to_string(),
            metrics_addr: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    /// External alarm command and arguments, started on alert
    pub command: Vec<String>,
    /// Ring the terminal bell instead of logging only
    pub bell: bool,
}

impl Settings {
    /// Load defaults, then `file` if given, then the environment
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = file {
            builder = builder.add_source(File::from(path));
        }

        builder
            .add_source(
                Environment::with_prefix("DROWSY")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(" ")
                    .with_list_parse_key("alert.command")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Check the monitor configuration before anything starts
    pub fn validate(&self) -> Result<(), dms::DmsError> {
        self.dms.validate()
    }
}
