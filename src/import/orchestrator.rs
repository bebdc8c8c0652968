//! Catalog import orchestration
//!
//! One catalog is imported sequentially:
//!
//! 1. Take the catalog lease, open a run record, clear the catalog's cache entries
//! 2. List upstream sets by cursor and push their metadata onto existing local sets
//! 3. Classify against the local inventory (the only step whose failure aborts the run)
//! 4. Full-fetch NEW and EMPTY sets, then delta-fetch HAS_DELTA sets
//! 5. Persist the checkpoint after every fully upserted page
//! 6. Finish the run as Completed or PartiallyFailed and release the lease
//!
//! Page, set and card failures are logged, counted and skipped.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;

use super::stats::{BatchSummary, ImportReport, RunStats, SetCounts};
use crate::catalog::{
    classify, CardSet, CardUpsertEngine, Catalog, CatalogHierarchyResolver, HierarchyCache,
    MetadataSync, SetMetadata,
};
use crate::client::{
    ApiKeyPool, CardDto, CardScope, PageRequest, Paginator, RateLimitedFetcher,
};
use crate::config::{Config, ImportMode};
use crate::state::{ImportCheckpoint, ImportPhase};
use crate::storage::{LockOutcome, SqliteStorage, Storage, StorageError, StorageResult};
use crate::{IngestError, Result};

/// Default lifetime of a catalog lease
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(6 * 3600);

/// Knobs of an orchestrator that do not come from the fetcher
#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub page_size: u32,
    pub max_consecutive_page_failures: u32,
    pub config_hash: String,
    /// Lease owner recorded in the catalog lock table
    pub owner: String,
    pub lock_ttl: Duration,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            page_size: 100,
            max_consecutive_page_failures: 3,
            config_hash: String::new(),
            owner: format!("tcg-ingest-{}", std::process::id()),
            lock_ttl: DEFAULT_LOCK_TTL,
        }
    }
}

/// Which engine a set is walked with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SetFetch {
    Full,
    Delta,
}

/// Mutable state of one catalog run
struct CatalogRun {
    catalog: Catalog,
    run_id: i64,
    phase: ImportPhase,
    stats: RunStats,
    sets: SetCounts,
    checkpoint: ImportCheckpoint,
    /// Set once a set fails; the checkpoint then stays at that set's last good page
    position_held: bool,
}

impl CatalogRun {
    fn advance(&mut self, next: ImportPhase) {
        if !self.phase.can_transition_to(next) {
            tracing::warn!(
                "Unexpected phase change for {}: {} -> {}",
                self.catalog.code,
                self.phase,
                next
            );
        }
        tracing::debug!("{}: {} -> {}", self.catalog.code, self.phase, next);
        self.phase = next;
    }
}

/// Drives catalog imports
///
/// Cheap to clone: every field is shared, so clones can run different catalogs
/// concurrently against the same key pool, store and cache.
#[derive(Clone)]
pub struct ImportOrchestrator {
    fetcher: Arc<RateLimitedFetcher>,
    storage: Arc<Mutex<SqliteStorage>>,
    resolver: CatalogHierarchyResolver,
    options: ImportOptions,
}

impl ImportOrchestrator {
    pub fn new(
        fetcher: Arc<RateLimitedFetcher>,
        storage: Arc<Mutex<SqliteStorage>>,
        cache: Arc<HierarchyCache>,
        options: ImportOptions,
    ) -> Self {
        Self {
            fetcher,
            storage,
            resolver: CatalogHierarchyResolver::new(cache),
            options,
        }
    }

    /// Builds an orchestrator with a fresh key pool and cache from the configuration
    pub fn from_config(
        config: &Config,
        config_hash: &str,
        storage: Arc<Mutex<SqliteStorage>>,
    ) -> Result<Self> {
        let pool = ApiKeyPool::new(
            config.api.keys.clone(),
            Duration::from_secs(config.api.key_cooldown_secs),
        )
        .ok_or_else(|| crate::ConfigError::Validation("api.keys must not be empty".to_string()))?;

        let fetcher = RateLimitedFetcher::from_config(config, Arc::new(pool))?;
        let options = ImportOptions {
            page_size: config.fetch.page_size,
            max_consecutive_page_failures: config.fetch.max_consecutive_page_failures,
            config_hash: config_hash.to_string(),
            ..ImportOptions::default()
        };

        Ok(Self::new(
            Arc::new(fetcher),
            storage,
            Arc::new(HierarchyCache::new()),
            options,
        ))
    }

    pub fn fetcher(&self) -> &Arc<RateLimitedFetcher> {
        &self.fetcher
    }

    pub fn storage(&self) -> &Arc<Mutex<SqliteStorage>> {
        &self.storage
    }

    /// Imports several catalogs concurrently, one tokio task each
    pub async fn import_catalogs(&self, catalogs: Vec<Catalog>) -> BatchSummary {
        let mut handles = Vec::with_capacity(catalogs.len());
        let mut seen = HashSet::new();
        for catalog in catalogs {
            // Same owner on both tasks would pass the lease check
            if !seen.insert(catalog.code.clone()) {
                tracing::warn!("Catalog {} listed twice, importing it once", catalog.code);
                continue;
            }
            let this = self.clone();
            let code = catalog.code.clone();
            handles.push((
                code,
                tokio::spawn(async move { this.import_catalog(&catalog).await }),
            ));
        }

        let mut summary = BatchSummary::default();
        for (code, handle) in handles {
            match handle.await {
                Ok(Ok(report)) => summary.reports.push(report),
                Ok(Err(e)) => {
                    tracing::error!("Import of {} failed: {}", code, e);
                    summary.failures.push((code, e.to_string()));
                }
                Err(e) => {
                    tracing::error!("Import task for {} panicked: {}", code, e);
                    summary.failures.push((code, IngestError::Task(e).to_string()));
                }
            }
        }

        tracing::info!(
            "Batch finished with status {} ({} catalogs)",
            summary.overall_status(),
            summary.reports.len() + summary.failures.len()
        );
        summary
    }

    /// Imports one catalog under its lease
    pub async fn import_catalog(&self, catalog: &Catalog) -> Result<ImportReport> {
        let owner = self.options.owner.clone();
        let lease = self.with_storage(|s| {
            s.try_acquire_lock(&catalog.code, &owner, self.options.lock_ttl)
        })?;
        if let LockOutcome::HeldBy { owner, .. } = lease {
            return Err(IngestError::CatalogLocked {
                catalog: catalog.code.clone(),
                owner,
            });
        }

        let result = self.run_locked(catalog).await;

        self.resolver.cache().clear_catalog(&catalog.code);
        if let Err(e) = self.with_storage(|s| s.release_lock(&catalog.code, &owner)) {
            tracing::warn!("Could not release lease on {}: {}", catalog.code, e);
        }

        result
    }

    async fn run_locked(&self, catalog: &Catalog) -> Result<ImportReport> {
        tracing::info!("Starting import of {} ({})", catalog.display_name, catalog.game_id);

        let run_id = self.with_storage(|s| s.create_run(&catalog.code, &self.options.config_hash))?;
        self.resolver.cache().clear_catalog(&catalog.code);

        let mut checkpoint = self
            .with_storage(|s| s.load_checkpoint(&catalog.code))?
            .unwrap_or_else(|| ImportCheckpoint::new(&catalog.code));
        let was_complete = checkpoint.is_complete;
        checkpoint.begin(Utc::now());
        self.with_storage(|s| s.save_checkpoint(&checkpoint))?;

        let mut run = CatalogRun {
            catalog: catalog.clone(),
            run_id,
            phase: ImportPhase::Idle,
            stats: RunStats::default(),
            sets: SetCounts::default(),
            checkpoint,
            position_held: false,
        };
        run.advance(ImportPhase::Classifying);

        let outcome = match catalog.mode {
            ImportMode::PerSet => self.run_per_set(&mut run).await,
            ImportMode::CatalogWide => self.run_catalog_wide(&mut run, was_complete).await,
        };

        if let Err(e) = outcome {
            run.advance(ImportPhase::Aborted);
            tracing::error!("Import of {} aborted: {}", catalog.code, e);
            if let Err(finish) = self.with_storage(|s| s.finish_run(run_id, ImportPhase::Aborted, &run.stats)) {
                tracing::warn!("Could not record aborted run {}: {}", run_id, finish);
            }
            return Err(e);
        }

        let final_phase = if run.stats.has_failures() {
            ImportPhase::PartiallyFailed
        } else {
            ImportPhase::Completed
        };
        run.advance(final_phase);

        if final_phase == ImportPhase::Completed {
            let keep_position = catalog.mode == ImportMode::CatalogWide;
            run.checkpoint.mark_complete(keep_position, Utc::now());
            self.with_storage(|s| s.save_checkpoint(&run.checkpoint))?;
        }

        self.with_storage(|s| s.finish_run(run_id, final_phase, &run.stats))?;

        tracing::info!(
            "Import of {} finished {}: {} processed, {} new, {} refreshed, {} skipped, {} errors, {} failed pages",
            catalog.code,
            final_phase,
            run.stats.cards_processed,
            run.stats.inserted,
            run.stats.refreshed,
            run.stats.skipped,
            run.stats.card_errors,
            run.stats.pages_failed
        );

        Ok(ImportReport {
            catalog: catalog.code.clone(),
            run_id,
            phase: final_phase,
            stats: run.stats,
            sets: run.sets,
        })
    }

    // ===== Per-set mode =====

    async fn run_per_set(&self, run: &mut CatalogRun) -> Result<()> {
        let upstream = self.list_sets(run).await;
        let code = run.catalog.code.clone();

        for metadata in &upstream {
            match self.with_storage(|s| self.resolver.sync_metadata(s, &code, metadata)) {
                Ok(MetadataSync::Frozen) => tracing::debug!("{} is frozen, metadata left alone", metadata.set_code),
                Ok(_) => {}
                Err(e) => tracing::warn!("Could not sync metadata of {}: {}", metadata.set_code, e),
            }
        }

        let inventory = self
            .with_storage(|s| s.load_set_inventory(&code))
            .map_err(|source| IngestError::Classification {
                catalog: code.clone(),
                source,
            })?;

        let mut classification = classify(&upstream, &inventory);

        // A completed per-set run leaves no set in the checkpoint, so one here was cut off
        if let Some(interrupted) = run.checkpoint.set_code.clone() {
            match classification.requeue(&interrupted) {
                Some(class) => tracing::info!(
                    "Resuming interrupted set {} at offset {} ({:?})",
                    interrupted,
                    run.checkpoint.last_offset,
                    class
                ),
                None => tracing::warn!(
                    "Checkpoint points at {}, which upstream no longer lists",
                    interrupted
                ),
            }
        }

        run.sets = SetCounts::from(&classification);
        tracing::info!(
            "{}: {} new, {} empty, {} with delta, {} current",
            code,
            run.sets.new,
            run.sets.empty,
            run.sets.has_delta,
            run.sets.current
        );

        if classification.is_idle() {
            tracing::info!("{} is up to date", code);
        }

        run.advance(ImportPhase::FullImporting);
        for metadata in classification.full_queue() {
            self.import_set(run, metadata, SetFetch::Full).await;
        }

        run.advance(ImportPhase::DeltaImporting);
        for metadata in &classification.has_delta {
            self.import_set(run, metadata, SetFetch::Delta).await;
        }

        Ok(())
    }

    /// Lists every upstream set of the catalog; failed pages are counted and end the walk
    async fn list_sets(&self, run: &mut CatalogRun) -> Vec<SetMetadata> {
        let mut sets = Vec::new();
        let mut pages = Paginator::sets(&self.fetcher, &run.catalog.game_id);

        while let Some(page) = pages.next_page().await {
            let request = page.request.clone();
            match page.into_sets() {
                Ok(batch) => {
                    run.stats.pages_fetched += 1;
                    sets.extend(batch.iter().map(SetMetadata::from_set));
                }
                Err(e) => {
                    run.stats.pages_failed += 1;
                    tracing::warn!("Failed to list {}: {}", request, e);
                }
            }
        }

        tracing::debug!("Listed {} upstream sets for {}", sets.len(), run.catalog.code);
        sets
    }

    async fn import_set(&self, run: &mut CatalogRun, metadata: &SetMetadata, mode: SetFetch) {
        let code = run.catalog.code.clone();

        let set = match self.with_storage(|s| self.resolver.resolve(s, &code, metadata)) {
            Ok(set) => set,
            Err(e) => {
                run.stats.sets_failed += 1;
                tracing::warn!("Could not resolve set {}: {}", metadata.set_code, e);
                return;
            }
        };

        let mut engine = match mode {
            SetFetch::Full => CardUpsertEngine::full(),
            SetFetch::Delta => match self.with_storage(|s| s.load_card_keys(&code, &set.set_code)) {
                Ok(keys) => CardUpsertEngine::delta(keys),
                Err(e) => {
                    run.stats.sets_failed += 1;
                    tracing::warn!("Could not load stored keys of {}: {}", set.set_code, e);
                    return;
                }
            },
        };

        let start = run.checkpoint.resume_offset(&set.set_code);
        if start > 0 {
            tracing::info!("Resuming {} at offset {}", set.set_code, start);
        }

        let first = PageRequest::cards(CardScope::Set(set.set_code.clone()), start, self.options.page_size);
        let mut pages = Paginator::new(&self.fetcher, first, self.options.max_consecutive_page_failures);
        let mut contiguous = !run.position_held;
        let mut set_failed = false;

        while let Some(page) = pages.next_page().await {
            let request = page.request.clone();
            let cards = match page.into_cards() {
                Ok(cards) => cards,
                Err(e) => {
                    run.stats.pages_failed += 1;
                    contiguous = false;
                    set_failed = true;
                    tracing::warn!("Skipping {}: {}", request, e);
                    continue;
                }
            };
            run.stats.pages_fetched += 1;

            let card_errors = self.upsert_page(&mut run.stats, &mut engine, &set, &code, &cards);
            if card_errors > 0 {
                contiguous = false;
                set_failed = true;
            }

            if contiguous {
                let next = request.next_offset().unwrap_or(0);
                run.checkpoint.record_page(Some(&set.set_code), next, Utc::now());
                if let Err(e) = self.with_storage(|s| s.save_checkpoint(&run.checkpoint)) {
                    tracing::warn!("Could not persist checkpoint for {}: {}", code, e);
                }
            }
        }

        if set_failed {
            run.stats.sets_failed += 1;
            run.position_held = true;
        } else if !run.position_held && run.checkpoint.points_at(&set.set_code) {
            // The next set starts from zero
            run.checkpoint.clear_position();
            if let Err(e) = self.with_storage(|s| s.save_checkpoint(&run.checkpoint)) {
                tracing::warn!("Could not persist checkpoint for {}: {}", code, e);
            }
        }
        tracing::debug!(
            "Finished {} ({:?}), checkpoint at {:?}/{}",
            set.set_code,
            mode,
            run.checkpoint.set_code,
            run.checkpoint.last_offset
        );
    }

    /// Upserts one page under a single storage lock; returns the number of failed cards
    fn upsert_page(
        &self,
        stats: &mut RunStats,
        engine: &mut CardUpsertEngine,
        set: &CardSet,
        catalog: &str,
        cards: &[CardDto],
    ) -> u64 {
        let result = self.with_storage(|s| {
            let mut errors = 0;
            for card in cards {
                match engine.upsert(s, card, set, catalog) {
                    Ok(outcome) => stats.record(outcome),
                    Err(e) => {
                        errors += 1;
                        stats.record_card_error();
                        tracing::warn!("Failed to store card {:?} in {}: {}", card.name, set.set_code, e);
                    }
                }
            }
            Ok(errors)
        });

        match result {
            Ok(errors) => errors,
            Err(e) => {
                tracing::error!("Storage unavailable while importing {}: {}", set.set_code, e);
                for _ in cards {
                    stats.record_card_error();
                }
                cards.len() as u64
            }
        }
    }

    // ===== Catalog-wide mode =====

    async fn run_catalog_wide(&self, run: &mut CatalogRun, was_complete: bool) -> Result<()> {
        let game = run.catalog.game_id.clone();
        let code = run.catalog.code.clone();
        let limit = self.options.page_size;
        let start = if run.checkpoint.set_code.is_none() {
            run.checkpoint.last_offset
        } else {
            0
        };

        run.advance(ImportPhase::FullImporting);

        if was_complete && start > 0 {
            let tail = PageRequest::cards(CardScope::Game(game.clone()), start, limit);
            match self.fetcher.fetch(&tail).await {
                Ok(page) if page.is_empty() => {
                    tracing::info!("No new cards for {} past offset {}", code, start);
                    return Ok(());
                }
                Ok(_) => tracing::info!("New cards for {} past offset {}", code, start),
                Err(e) => {
                    run.stats.pages_failed += 1;
                    tracing::warn!("Checking {} for new cards failed: {}", tail, e);
                    return Ok(());
                }
            }
        } else if start > 0 {
            tracing::info!("Resuming {} at offset {}", code, start);
        }

        let first = PageRequest::cards(CardScope::Game(game), start, limit);
        let mut pages = Paginator::new(&self.fetcher, first, self.options.max_consecutive_page_failures);
        let mut contiguous = true;
        let mut engine = CardUpsertEngine::full();

        while let Some(page) = pages.next_page().await {
            let request = page.request.clone();
            let cards = match page.into_cards() {
                Ok(cards) => cards,
                Err(e) => {
                    run.stats.pages_failed += 1;
                    contiguous = false;
                    tracing::warn!("Skipping {}: {}", request, e);
                    continue;
                }
            };
            run.stats.pages_fetched += 1;

            let errors = self.upsert_wide_page(&mut run.stats, &mut engine, &code, &cards);
            if errors > 0 {
                contiguous = false;
            }

            if contiguous {
                let next = request.next_offset().unwrap_or(0);
                run.checkpoint.record_page(None, next, Utc::now());
                if let Err(e) = self.with_storage(|s| s.save_checkpoint(&run.checkpoint)) {
                    tracing::warn!("Could not persist checkpoint for {}: {}", code, e);
                }
            }
        }

        Ok(())
    }

    /// Upserts a page of a game listing, resolving each card's set from its reference
    fn upsert_wide_page(
        &self,
        stats: &mut RunStats,
        engine: &mut CardUpsertEngine,
        catalog: &str,
        cards: &[CardDto],
    ) -> u64 {
        let result = self.with_storage(|s| {
            let mut errors = 0;
            for card in cards {
                let Some(metadata) = SetMetadata::from_card(card) else {
                    errors += 1;
                    stats.record_card_error();
                    tracing::warn!("Card {:?} has no set reference", card.name);
                    continue;
                };
                let stored = self
                    .resolver
                    .resolve(s, catalog, &metadata)
                    .and_then(|set| engine.upsert(s, card, &set, catalog));
                match stored {
                    Ok(outcome) => stats.record(outcome),
                    Err(e) => {
                        errors += 1;
                        stats.record_card_error();
                        tracing::warn!("Failed to store card {:?}: {}", card.name, e);
                    }
                }
            }
            Ok(errors)
        });

        match result {
            Ok(errors) => errors,
            Err(e) => {
                tracing::error!("Storage unavailable while importing {}: {}", catalog, e);
                for _ in cards {
                    stats.record_card_error();
                }
                cards.len() as u64
            }
        }
    }

    /// Runs `f` with the store locked; the guard never outlives the call
    fn with_storage<T>(&self, f: impl FnOnce(&mut SqliteStorage) -> StorageResult<T>) -> StorageResult<T> {
        let mut guard = self.storage.lock().map_err(|_| StorageError::LockPoisoned)?;
        f(&mut *guard)
    }
}
