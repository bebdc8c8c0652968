//! Storage module for persisting the catalog hierarchy
//!
//! This module handles all database operations for the importer, including:
//! - SQLite database initialization and schema management
//! - Expansion, set and card persistence with natural-key uniqueness
//! - Import checkpoints and run records
//! - Per-catalog lease locks

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::import::RunStats;
use crate::state::ImportPhase;

use std::path::Path;

/// Initializes or opens a storage database
pub fn open_storage(path: &Path) -> StorageResult<SqliteStorage> {
    SqliteStorage::new(path)
}

/// Represents an import run in the database
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub catalog: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: ImportPhase,
    pub stats: RunStats,
}

/// Result of trying to take a catalog lease
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome {
    Acquired,
    HeldBy { owner: String, expires_at: String },
}

impl LockOutcome {
    pub fn is_acquired(&self) -> bool {
        matches!(self, Self::Acquired)
    }
}
