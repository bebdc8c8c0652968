//! Import pipeline and operator entry points
//!
//! The orchestrator drives catalog imports; the free functions here are what the
//! CLI (or any embedding program) calls to start imports, reset a set or inspect a
//! catalog's checkpoint.

mod maintenance;
mod orchestrator;
mod stats;

pub use maintenance::{discover_games, sync_release_dates, ReleaseDateSync};
pub use orchestrator::{ImportOptions, ImportOrchestrator, DEFAULT_LOCK_TTL};
pub use stats::{BatchStatus, BatchSummary, ImportReport, RunStats, SetCounts};

use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::catalog::Catalog;
use crate::config::Config;
use crate::state::ImportCheckpoint;
use crate::storage::{open_storage, RunRecord, Storage, StorageError};
use crate::{IngestError, Result};

/// Imports one configured catalog against the configured database
pub async fn start_import(config: &Config, config_hash: &str, catalog_code: &str) -> Result<ImportReport> {
    let entry = config
        .catalog(catalog_code)
        .ok_or_else(|| IngestError::UnknownCatalog(catalog_code.to_string()))?;
    let catalog = Catalog::from(entry);

    let storage = open_storage(Path::new(&config.output.database_path))?;
    let orchestrator = ImportOrchestrator::from_config(config, config_hash, Arc::new(Mutex::new(storage)))?;

    orchestrator.import_catalog(&catalog).await
}

/// Deletes every stored card of a set so the next import re-fetches it in full
///
/// The set row itself and its freeze state survive. If the checkpoint points into
/// the set, its position is cleared. Returns the number of deleted cards.
pub fn reset_set<S: Storage + ?Sized>(storage: &mut S, catalog: &str, set_code: &str) -> Result<u64> {
    if storage.find_set(catalog, set_code)?.is_none() {
        return Err(StorageError::SetNotFound {
            catalog: catalog.to_string(),
            set_code: set_code.to_string(),
        }
        .into());
    }

    let deleted = storage.delete_cards_in_set(catalog, set_code)?;

    if let Some(mut checkpoint) = storage.load_checkpoint(catalog)? {
        if checkpoint.points_at(set_code) {
            checkpoint.clear_position();
            storage.save_checkpoint(&checkpoint)?;
        }
    }

    tracing::info!("Reset {}/{}: {} cards deleted", catalog, set_code, deleted);
    Ok(deleted)
}

/// Snapshot of a catalog's import progress
#[derive(Debug, Clone)]
pub struct CheckpointStatus {
    pub catalog: String,
    pub checkpoint: Option<ImportCheckpoint>,
    pub latest_run: Option<RunRecord>,
    pub stored_cards: u64,
}

/// Reads the checkpoint, latest run and card count of a catalog
pub fn checkpoint_status<S: Storage + ?Sized>(storage: &S, catalog: &str) -> Result<CheckpointStatus> {
    Ok(CheckpointStatus {
        catalog: catalog.to_string(),
        checkpoint: storage.load_checkpoint(catalog)?,
        latest_run: storage.get_latest_run(catalog)?,
        stored_cards: storage.count_cards(catalog)?,
    })
}
