//! A persisted snapshot and the move that produced it.

use chess_core::BoardSnapshot;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: i64,
    pub snapshot: BoardSnapshot,
    /// `None` for the starting position and for hand-edited records.
    pub move_san: Option<String>,
}

impl Record {
    pub fn new(id: i64, snapshot: BoardSnapshot, move_san: Option<String>) -> Self {
        Self {
            id,
            snapshot,
            move_san,
        }
    }

    /// Rebuild a record from its `BoardSquareStr` / `GameStateStr` /
    /// `MoveSANStr` columns. An empty SAN reads back as `None`.
    pub fn from_columns(
        id: i64,
        board: &str,
        state: &str,
        move_san: Option<String>,
    ) -> Result<Self, StoreError> {
        let snapshot =
            BoardSnapshot::from_strs(board, state).map_err(|e| StoreError::MalformedRecord {
                id,
                reason: e.to_string(),
            })?;
        Ok(Self {
            id,
            snapshot,
            move_san: move_san.filter(|san| !san.is_empty()),
        })
    }

    pub fn board_str(&self) -> String {
        self.snapshot.board_str()
    }

    pub fn state_str(&self) -> String {
        self.snapshot.state_str()
    }
}

/// Ids must be exactly `1..=records.len()`, in order.
pub fn check_contiguous(records: &[Record]) -> Result<(), StoreError> {
    if records.is_empty() {
        return Err(StoreError::NoRecords);
    }
    for (expected, record) in (1..).zip(records) {
        if record.id != expected {
            return Err(StoreError::NotContiguous {
                expected,
                found: record.id,
            });
        }
    }
    Ok(())
}
