//! Maintenance jobs that run outside a full import

use std::sync::{Arc, Mutex};

use crate::catalog::{parse_release_date, Catalog};
use crate::client::{GameDto, Paginator, RateLimitedFetcher};
use crate::storage::{SqliteStorage, Storage, StorageError};
use crate::Result;

/// Lists the games the upstream API serves, for filling in catalog game ids
pub async fn discover_games(fetcher: &RateLimitedFetcher) -> Result<Vec<GameDto>> {
    let games = fetcher.fetch_games().await?;
    tracing::info!("Upstream serves {} games", games.len());
    Ok(games)
}

/// Outcome of a release-date sync
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReleaseDateSync {
    pub updated: u64,
    /// Set-listing pages that could not be fetched; their sets were not checked
    pub pages_failed: u64,
}

/// Copies upstream release dates onto stored sets
///
/// Frozen sets are left alone. A set is updated when it has no date yet or when
/// its date differs from upstream.
pub async fn sync_release_dates(
    fetcher: &RateLimitedFetcher,
    storage: &Arc<Mutex<SqliteStorage>>,
    catalog: &Catalog,
) -> Result<ReleaseDateSync> {
    let mut outcome = ReleaseDateSync::default();
    let mut pages = Paginator::sets(fetcher, &catalog.game_id);

    while let Some(page) = pages.next_page().await {
        let request = page.request.clone();
        let sets = match page.into_sets() {
            Ok(sets) => sets,
            Err(e) => {
                tracing::warn!("Failed to list {}: {}", request, e);
                outcome.pages_failed += 1;
                continue;
            }
        };

        let mut guard = storage.lock().map_err(|_| StorageError::LockPoisoned)?;
        for upstream in &sets {
            let Some(date) = upstream.release_date.as_deref().and_then(parse_release_date) else {
                continue;
            };
            let Some(local) = guard.find_set(&catalog.code, &upstream.id)? else {
                continue;
            };
            if !local.freeze_state.accepts_upstream() {
                tracing::debug!("Skipping frozen set {}", local.set_code);
                continue;
            }
            if local.release_date != Some(date) {
                guard.update_set_release_date(local.id, date)?;
                outcome.updated += 1;
            }
        }
    }

    if outcome.pages_failed > 0 {
        tracing::warn!(
            "Updated release dates of {} sets in {}, {} set pages failed",
            outcome.updated,
            catalog.code,
            outcome.pages_failed
        );
    } else {
        tracing::info!("Updated release dates of {} sets in {}", outcome.updated, catalog.code);
    }
    Ok(outcome)
}
