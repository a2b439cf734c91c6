//! SQLite persistence for one game instance's record table.

use std::fmt;
use std::path::Path;

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::record::Record;
use crate::registry::InstanceId;

/// Outcome of probing a database file before use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageStatus {
    Ready,
    FileMissing,
    ReadWriteFailure,
    TablesMissing,
}

impl fmt::Display for StorageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StorageStatus::Ready => "ready",
            StorageStatus::FileMissing => "database file is missing",
            StorageStatus::ReadWriteFailure => "database cannot be read and written",
            StorageStatus::TablesMissing => "record table is missing",
        };
        f.write_str(text)
    }
}

pub struct SqliteStorage {
    conn: Connection,
    table: String,
}

impl SqliteStorage {
    /// Check a database file without creating or changing anything.
    pub fn check_status(path: &Path, instance: InstanceId) -> StorageStatus {
        if !path.is_file() {
            return StorageStatus::FileMissing;
        }
        let Ok(conn) = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_WRITE) else {
            return StorageStatus::ReadWriteFailure;
        };
        // Taking and releasing the write lock proves both directions work.
        if conn.execute_batch("BEGIN IMMEDIATE; ROLLBACK;").is_err() {
            return StorageStatus::ReadWriteFailure;
        }
        match table_exists(&conn, &instance.table_name()) {
            Ok(true) => StorageStatus::Ready,
            Ok(false) => StorageStatus::TablesMissing,
            Err(_) => StorageStatus::ReadWriteFailure,
        }
    }

    /// Open an existing, initialised database.
    pub fn open(path: &Path, instance: InstanceId) -> Result<Self, StoreError> {
        match Self::check_status(path, instance) {
            StorageStatus::Ready => {}
            status => return Err(StoreError::Unavailable(status)),
        }
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_WRITE)?;
        Ok(Self::with_connection(conn, instance))
    }

    /// Open a database, creating the file and record table when absent.
    pub fn open_or_create(path: &Path, instance: InstanceId) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let storage = Self::with_connection(conn, instance);
        storage.create_table()?;
        info!(path = %path.display(), table = %storage.table, "Record storage ready");
        Ok(storage)
    }

    pub fn open_in_memory(instance: InstanceId) -> Result<Self, StoreError> {
        let storage = Self::with_connection(Connection::open_in_memory()?, instance);
        storage.create_table()?;
        Ok(storage)
    }

    fn with_connection(conn: Connection, instance: InstanceId) -> Self {
        Self {
            conn,
            table: instance.table_name(),
        }
    }

    fn create_table(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                Id INTEGER PRIMARY KEY,
                BoardSquareStr TEXT NOT NULL,
                GameStateStr TEXT NOT NULL,
                MoveSANStr TEXT
            )",
            self.table
        ))?;
        Ok(())
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Every record, ordered by id.
    pub fn load_all(&self) -> Result<Vec<Record>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT Id, BoardSquareStr, GameStateStr, MoveSANStr FROM {} ORDER BY Id",
            self.table
        ))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, board, state, san)| Record::from_columns(id, &board, &state, san))
            .collect()
    }

    /// Insert unless the id is taken. Returns rows written (0 or 1).
    pub fn insert(&self, record: &Record) -> Result<usize, StoreError> {
        let rows = self.conn.execute(
            &format!(
                "INSERT OR IGNORE INTO {} (Id, BoardSquareStr, GameStateStr, MoveSANStr)
                 VALUES (?1, ?2, ?3, ?4)",
                self.table
            ),
            params![
                record.id,
                record.board_str(),
                record.state_str(),
                record.move_san
            ],
        )?;
        debug!(id = record.id, rows, "Inserted record");
        Ok(rows)
    }

    /// Overwrite an existing id. Returns rows written (0 when absent).
    pub fn update(&self, record: &Record) -> Result<usize, StoreError> {
        let rows = self.conn.execute(
            &format!(
                "UPDATE {} SET BoardSquareStr = ?2, GameStateStr = ?3, MoveSANStr = ?4
                 WHERE Id = ?1",
                self.table
            ),
            params![
                record.id,
                record.board_str(),
                record.state_str(),
                record.move_san
            ],
        )?;
        debug!(id = record.id, rows, "Updated record");
        Ok(rows)
    }

    /// Delete every record with `Id >= id`.
    pub fn delete_from(&self, id: i64) -> Result<usize, StoreError> {
        let rows = self
            .conn
            .execute(&format!("DELETE FROM {} WHERE Id >= ?1", self.table), [id])?;
        Ok(rows)
    }

    pub fn clear(&self) -> Result<usize, StoreError> {
        let rows = self.conn.execute(&format!("DELETE FROM {}", self.table), [])?;
        Ok(rows)
    }

    pub fn max_id(&self) -> Result<Option<i64>, StoreError> {
        let max = self
            .conn
            .query_row(&format!("SELECT MAX(Id) FROM {}", self.table), [], |row| {
                row.get::<_, Option<i64>>(0)
            })?;
        Ok(max)
    }

    pub fn all_ids(&self) -> Result<Vec<i64>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT Id FROM {} ORDER BY Id", self.table))?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    pub fn get(&self, id: i64) -> Result<Option<Record>, StoreError> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT BoardSquareStr, GameStateStr, MoveSANStr FROM {} WHERE Id = ?1",
                    self.table
                ),
                [id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                    ))
                },
            )
            .optional()?;
        row.map(|(board, state, san)| Record::from_columns(id, &board, &state, san))
            .transpose()
    }

    /// Swap the whole table for `records` in one transaction.
    pub fn replace_all(&mut self, records: &[Record]) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        tx.execute(&format!("DELETE FROM {}", self.table), [])?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} (Id, BoardSquareStr, GameStateStr, MoveSANStr)
                 VALUES (?1, ?2, ?3, ?4)",
                self.table
            ))?;
            for record in records {
                stmt.execute(params![
                    record.id,
                    record.board_str(),
                    record.state_str(),
                    record.move_san
                ])?;
            }
        }
        tx.commit()?;
        info!(table = %self.table, records = records.len(), "Replaced record table");
        Ok(())
    }

    /// Raw connection, for callers that share the database file.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool, rusqlite::Error> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}
