//! Catalog statistics from the import database
//!
//! Extracts per-catalog counts from the storage layer for the `--status` view.

use crate::import::{checkpoint_status, CheckpointStatus};
use crate::state::FreezeState;
use crate::storage::Storage;
use crate::Result;

/// Stored state of one catalog
#[derive(Debug, Clone)]
pub struct CatalogStatistics {
    pub status: CheckpointStatus,

    /// Number of stored sets
    pub total_sets: u64,

    /// Sets an operator has frozen
    pub frozen_sets: u64,

    /// Sets created from card references that never saw a set listing
    pub untouched_sets: u64,
}

/// Loads statistics of `catalog` from storage
pub fn load_statistics<S: Storage + ?Sized>(storage: &S, catalog: &str) -> Result<CatalogStatistics> {
    let status = checkpoint_status(storage, catalog)?;
    let sets = storage.list_sets(catalog)?;

    let count = |state: FreezeState| sets.iter().filter(|s| s.freeze_state == state).count() as u64;

    Ok(CatalogStatistics {
        total_sets: sets.len() as u64,
        frozen_sets: count(FreezeState::Frozen),
        untouched_sets: count(FreezeState::NeverTouched),
        status,
    })
}

/// Prints statistics to stdout
pub fn print_statistics(stats: &CatalogStatistics) {
    let status = &stats.status;
    println!("=== {} ===\n", status.catalog);

    println!("Stored:");
    println!("  Sets: {}", stats.total_sets);
    println!("  Frozen sets: {}", stats.frozen_sets);
    println!("  Sets without listing metadata: {}", stats.untouched_sets);
    println!("  Cards: {}", status.stored_cards);
    println!();

    println!("Checkpoint:");
    match &status.checkpoint {
        Some(checkpoint) => {
            let position = match &checkpoint.set_code {
                Some(set) => format!("{} @ {}", set, checkpoint.last_offset),
                None if checkpoint.last_offset > 0 => format!("offset {}", checkpoint.last_offset),
                None => "start".to_string(),
            };
            println!("  Position: {}", position);
            println!("  Complete: {}", if checkpoint.is_complete { "yes" } else { "no" });
            println!("  Pages processed: {}", checkpoint.pages_processed);
            if let Some(updated) = checkpoint.last_updated {
                println!("  Last updated: {}", updated.to_rfc3339());
            }
            if let Some(checked) = checkpoint.last_check_date {
                println!("  Last checked: {}", checked.to_rfc3339());
            }
        }
        None => println!("  (never imported)"),
    }
    println!();

    if let Some(run) = &status.latest_run {
        println!("Latest run #{}:", run.id);
        println!("  Started: {}", run.started_at);
        println!(
            "  Finished: {}",
            run.finished_at.as_deref().unwrap_or("(running or interrupted)")
        );
        if run.status.is_active() {
            println!("  Status: {} (did not finish)", run.status);
        } else {
            println!("  Status: {}", run.status);
        }
        println!(
            "  Cards: {} processed, {} new, {} updated, {} errored",
            run.stats.cards_processed,
            run.stats.inserted,
            run.stats.refreshed,
            run.stats.card_errors
        );
        println!(
            "  Pages: {} fetched, {} failed",
            run.stats.pages_fetched, run.stats.pages_failed
        );
    }
}
