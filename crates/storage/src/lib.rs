//! Storage Layer
//!
//! Session log persistence with repository pattern. Finalized session
//! records are kept in memory and mirrored to a JSON log file.

mod repository;

pub use repository::{HistorySummary, Repository};

use thiserror::Error;
use uuid::Uuid;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Lock error: {0}")]
    Lock(String),
    #[error("Session not found: {0}")]
    NotFound(Uuid),
    #[error("Session already stored: {0}")]
    Duplicate(Uuid),
}
