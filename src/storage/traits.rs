//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::NaiveDate;
use thiserror::Error;

use crate::catalog::{CardKey, CardSet, Expansion, NewCard, PriceSummary, SetInventory, SetMetadata, StoredCard};
use crate::import::RunStats;
use crate::state::{FreezeState, ImportCheckpoint, ImportPhase};
use crate::storage::{LockOutcome, RunRecord};

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Set not found: {catalog}/{set_code}")]
    SetNotFound { catalog: String, set_code: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A unique index rejected the write; another writer created the row first
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// This trait defines all database operations needed by the importer. Natural keys are
/// enforced by the backend: inserting a duplicate expansion, set or card must fail with
/// `StorageError::ConstraintViolation` so callers can re-fetch the winner.
pub trait Storage {
    // ===== Run Management =====

    /// Creates a new import run for `catalog`
    fn create_run(&mut self, catalog: &str, config_hash: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run of a catalog
    fn get_latest_run(&self, catalog: &str) -> StorageResult<Option<RunRecord>>;

    /// Records the final phase and counters of a run
    fn finish_run(&mut self, run_id: i64, status: ImportPhase, stats: &RunStats) -> StorageResult<()>;

    // ===== Catalog Leases =====

    /// Takes the catalog lease unless another owner holds an unexpired one
    fn try_acquire_lock(&mut self, catalog: &str, owner: &str, ttl: Duration) -> StorageResult<LockOutcome>;

    /// Releases the lease if `owner` holds it
    fn release_lock(&mut self, catalog: &str, owner: &str) -> StorageResult<()>;

    // ===== Expansions =====

    fn find_expansion(&self, catalog: &str, title: &str) -> StorageResult<Option<Expansion>>;

    fn insert_expansion(&mut self, catalog: &str, title: &str, freeze_state: FreezeState) -> StorageResult<Expansion>;

    fn set_expansion_freeze_state(&mut self, expansion_id: i64, freeze_state: FreezeState) -> StorageResult<()>;

    /// Freezes an expansion by title; returns false when it does not exist
    fn freeze_expansion(&mut self, catalog: &str, title: &str) -> StorageResult<bool>;

    // ===== Sets =====

    fn find_set(&self, catalog: &str, set_code: &str) -> StorageResult<Option<CardSet>>;

    fn insert_set(
        &mut self,
        expansion_id: i64,
        catalog: &str,
        metadata: &SetMetadata,
        freeze_state: FreezeState,
    ) -> StorageResult<CardSet>;

    /// Applies upstream metadata and marks the set auto-managed
    ///
    /// Absent metadata fields leave the stored value alone.
    fn update_set_metadata(&mut self, set_id: i64, metadata: &SetMetadata) -> StorageResult<()>;

    fn update_set_release_date(&mut self, set_id: i64, release_date: NaiveDate) -> StorageResult<()>;

    /// Freezes a set by code; returns false when it does not exist
    fn freeze_set(&mut self, catalog: &str, set_code: &str) -> StorageResult<bool>;

    fn list_sets(&self, catalog: &str) -> StorageResult<Vec<CardSet>>;

    /// Loads every local set of a catalog with its distinct stored card count
    fn load_set_inventory(&self, catalog: &str) -> StorageResult<HashMap<String, SetInventory>>;

    // ===== Cards =====

    fn find_card_id(&self, catalog: &str, key: &CardKey) -> StorageResult<Option<i64>>;

    fn get_card(&self, catalog: &str, key: &CardKey) -> StorageResult<Option<StoredCard>>;

    fn insert_card(&mut self, card: &NewCard) -> StorageResult<i64>;

    /// Overwrites the full price summary of a card
    fn update_card_prices(&mut self, card_id: i64, prices: &PriceSummary) -> StorageResult<()>;

    /// Loads the keys of every card stored under a set
    fn load_card_keys(&self, catalog: &str, set_code: &str) -> StorageResult<HashSet<CardKey>>;

    fn count_cards(&self, catalog: &str) -> StorageResult<u64>;

    /// Deletes every card under a set and returns how many were removed
    fn delete_cards_in_set(&mut self, catalog: &str, set_code: &str) -> StorageResult<u64>;

    // ===== Checkpoints =====

    fn load_checkpoint(&self, catalog: &str) -> StorageResult<Option<ImportCheckpoint>>;

    fn save_checkpoint(&mut self, checkpoint: &ImportCheckpoint) -> StorageResult<()>;
}
