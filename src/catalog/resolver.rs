//! Get-or-create resolution of the Expansion → Set hierarchy
//!
//! Lookups go in-run cache → store → create. A unique-index violation on create means a
//! concurrent import won the race; the winner's row is re-fetched instead of failing.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::model::{CardSet, Expansion, SetMetadata};
use crate::state::FreezeState;
use crate::storage::{Storage, StorageError, StorageResult};

type CatalogKey = (String, String);

/// In-run cache of resolved rows, shared by every concurrent catalog import
#[derive(Debug, Default)]
pub struct HierarchyCache {
    expansions: Mutex<HashMap<CatalogKey, Expansion>>,
    sets: Mutex<HashMap<CatalogKey, CardSet>>,
}

fn recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Cached rows are plain values; a panicking writer cannot leave half an entry behind.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn key(catalog: &str, natural_key: &str) -> CatalogKey {
    (catalog.to_string(), natural_key.to_string())
}

impl HierarchyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expansion(&self, catalog: &str, title: &str) -> Option<Expansion> {
        recover(&self.expansions).get(&key(catalog, title)).cloned()
    }

    pub fn put_expansion(&self, expansion: Expansion) {
        let k = key(&expansion.catalog, &expansion.title);
        recover(&self.expansions).insert(k, expansion);
    }

    pub fn set(&self, catalog: &str, set_code: &str) -> Option<CardSet> {
        recover(&self.sets).get(&key(catalog, set_code)).cloned()
    }

    pub fn put_set(&self, set: CardSet) {
        let k = key(&set.catalog, &set.set_code);
        recover(&self.sets).insert(k, set);
    }

    /// Drops every cached row of one catalog
    pub fn clear_catalog(&self, catalog: &str) {
        recover(&self.expansions).retain(|(c, _), _| c != catalog);
        recover(&self.sets).retain(|(c, _), _| c != catalog);
    }

    /// Number of cached (expansions, sets)
    pub fn len(&self) -> (usize, usize) {
        (recover(&self.expansions).len(), recover(&self.sets).len())
    }
}

/// Runs `insert`; on a uniqueness violation returns the row `refetch` finds instead
pub fn create_or_refetch<S, T>(
    storage: &mut S,
    insert: impl FnOnce(&mut S) -> StorageResult<T>,
    refetch: impl FnOnce(&S) -> StorageResult<Option<T>>,
) -> StorageResult<T>
where
    S: ?Sized,
{
    match insert(storage) {
        Ok(row) => Ok(row),
        Err(StorageError::ConstraintViolation(what)) => {
            tracing::debug!("{} was created concurrently, re-fetching", what);
            refetch(storage)?.ok_or(StorageError::ConstraintViolation(what))
        }
        Err(e) => Err(e),
    }
}

/// What happened when upstream metadata was offered to an existing set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataSync {
    Updated,
    Frozen,
    Missing,
}

/// Resolves expansions and sets against the cache and the store
#[derive(Debug, Clone)]
pub struct CatalogHierarchyResolver {
    cache: std::sync::Arc<HierarchyCache>,
}

impl CatalogHierarchyResolver {
    pub fn new(cache: std::sync::Arc<HierarchyCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &HierarchyCache {
        &self.cache
    }

    /// Finds or creates the expansion titled `title`
    pub fn resolve_expansion<S: Storage + ?Sized>(
        &self,
        storage: &mut S,
        catalog: &str,
        title: &str,
    ) -> StorageResult<Expansion> {
        if let Some(expansion) = self.cache.expansion(catalog, title) {
            return Ok(expansion);
        }

        let expansion = match storage.find_expansion(catalog, title)? {
            Some(existing) => existing,
            None => {
                let created = create_or_refetch(
                    storage,
                    |s| s.insert_expansion(catalog, title, FreezeState::NeverTouched),
                    |s| s.find_expansion(catalog, title),
                )?;
                tracing::debug!("Created expansion {} for {}", title, catalog);
                created
            }
        };

        self.cache.put_expansion(expansion.clone());
        Ok(expansion)
    }

    /// Finds or creates the set described by `metadata` under `expansion`
    ///
    /// Existing non-frozen sets take the upstream fields and become auto-managed. Frozen
    /// sets come back untouched.
    pub fn resolve_set<S: Storage + ?Sized>(
        &self,
        storage: &mut S,
        catalog: &str,
        metadata: &SetMetadata,
        expansion: &Expansion,
    ) -> StorageResult<CardSet> {
        if let Some(set) = self.cache.set(catalog, &metadata.set_code) {
            return Ok(set);
        }

        let set = match storage.find_set(catalog, &metadata.set_code)? {
            Some(existing) if !existing.freeze_state.accepts_upstream() => existing,
            Some(existing) => {
                if metadata.is_authoritative() {
                    storage.update_set_metadata(existing.id, metadata)?;
                    storage
                        .find_set(catalog, &metadata.set_code)?
                        .unwrap_or(existing)
                } else {
                    existing
                }
            }
            None => {
                let freeze = if metadata.is_authoritative() {
                    FreezeState::AutoManaged
                } else {
                    FreezeState::NeverTouched
                };
                let created = create_or_refetch(
                    storage,
                    |s| s.insert_set(expansion.id, catalog, metadata, freeze),
                    |s| s.find_set(catalog, &metadata.set_code),
                )?;
                tracing::debug!("Created set {} ({}) for {}", created.name, created.set_code, catalog);
                created
            }
        };

        if metadata.is_authoritative() && expansion.freeze_state == FreezeState::NeverTouched {
            storage.set_expansion_freeze_state(expansion.id, FreezeState::AutoManaged)?;
            let mut managed = expansion.clone();
            managed.freeze_state = FreezeState::AutoManaged;
            self.cache.put_expansion(managed);
        }

        self.cache.put_set(set.clone());
        Ok(set)
    }

    /// Resolves the expansion named after the set, then the set itself
    pub fn resolve<S: Storage + ?Sized>(
        &self,
        storage: &mut S,
        catalog: &str,
        metadata: &SetMetadata,
    ) -> StorageResult<CardSet> {
        if let Some(set) = self.cache.set(catalog, &metadata.set_code) {
            return Ok(set);
        }

        let expansion = self.resolve_expansion(storage, catalog, metadata.expansion_title())?;
        self.resolve_set(storage, catalog, metadata, &expansion)
    }

    /// Applies upstream metadata to an existing set without creating anything
    pub fn sync_metadata<S: Storage + ?Sized>(
        &self,
        storage: &mut S,
        catalog: &str,
        metadata: &SetMetadata,
    ) -> StorageResult<MetadataSync> {
        match storage.find_set(catalog, &metadata.set_code)? {
            None => Ok(MetadataSync::Missing),
            Some(set) if !set.freeze_state.accepts_upstream() => Ok(MetadataSync::Frozen),
            Some(set) => {
                storage.update_set_metadata(set.id, metadata)?;
                Ok(MetadataSync::Updated)
            }
        }
    }
}
