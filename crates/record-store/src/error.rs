//! Record store error types

use chess_core::{EngineError, ReplayError};
use thiserror::Error;

use crate::storage::StorageStatus;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage unavailable: {0}")]
    Unavailable(StorageStatus),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("PGN import failed: {0}")]
    Replay(#[from] ReplayError),

    #[error("Record {id} is malformed: {reason}")]
    MalformedRecord { id: i64, reason: String },

    #[error("Record ids must run 1..n without gaps: expected {expected}, found {found}")]
    NotContiguous { expected: i64, found: i64 },

    #[error("No records to import")]
    NoRecords,

    #[error("XML error: {0}")]
    Xml(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
