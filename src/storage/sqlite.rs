//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior};

use crate::catalog::{
    CardKey, CardSet, Expansion, NewCard, PriceSummary, Rarity, SetInventory, SetMetadata, StoredCard,
};
use crate::import::RunStats;
use crate::state::{FreezeState, ImportCheckpoint, ImportPhase};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{LockOutcome, RunRecord};

const DATE_FORMAT: &str = "%Y-%m-%d";

const SET_COLUMNS: &str =
    "id, expansion_id, catalog, set_code, name, declared_card_count, release_date, freeze_state";

const CARD_COLUMNS: &str = "id, set_id, catalog, set_code, name, card_number, upstream_id, tcgplayer_id,
     rarity, description, image_url, price_low, price_high, market_price, price_near_mint,
     price_lightly_played, price_moderately_played, price_heavily_played, price_damaged,
     price_foil_near_mint, price_foil, last_price_update";

const RUN_COLUMNS: &str = "id, catalog, started_at, finished_at, config_hash, status, pages_fetched,
     pages_failed, sets_failed, cards_processed, cards_inserted, cards_refreshed, cards_skipped,
     card_errors";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens or creates the database at `path`
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;
        conn.busy_timeout(Duration::from_secs(5))?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

/// Converts unique-index failures into `ConstraintViolation`
fn map_write_error(error: rusqlite::Error, what: impl FnOnce() -> String) -> StorageError {
    match &error {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
            StorageError::ConstraintViolation(what())
        }
        _ => StorageError::Sqlite(error),
    }
}

fn parse_timestamp(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn freeze_from_row(raw: String) -> FreezeState {
    FreezeState::from_db_string(&raw).unwrap_or_default()
}

fn row_to_expansion(row: &Row<'_>) -> rusqlite::Result<Expansion> {
    Ok(Expansion {
        id: row.get(0)?,
        catalog: row.get(1)?,
        title: row.get(2)?,
        freeze_state: freeze_from_row(row.get(3)?),
    })
}

fn row_to_set(row: &Row<'_>) -> rusqlite::Result<CardSet> {
    Ok(CardSet {
        id: row.get(0)?,
        expansion_id: row.get(1)?,
        catalog: row.get(2)?,
        set_code: row.get(3)?,
        name: row.get(4)?,
        declared_card_count: row.get(5)?,
        release_date: row
            .get::<_, Option<String>>(6)?
            .and_then(|s| NaiveDate::parse_from_str(&s, DATE_FORMAT).ok()),
        freeze_state: freeze_from_row(row.get(7)?),
    })
}

fn row_to_card(row: &Row<'_>) -> rusqlite::Result<StoredCard> {
    Ok(StoredCard {
        id: row.get(0)?,
        set_id: row.get(1)?,
        catalog: row.get(2)?,
        key: CardKey {
            set_code: row.get(3)?,
            name: row.get(4)?,
            number: row.get(5)?,
        },
        upstream_id: row.get(6)?,
        tcgplayer_id: row.get(7)?,
        rarity: Rarity::from_db_string(&row.get::<_, String>(8)?).unwrap_or_default(),
        description: row.get(9)?,
        image_url: row.get(10)?,
        prices: PriceSummary {
            low: row.get(11)?,
            high: row.get(12)?,
            market: row.get(13)?,
            near_mint: row.get(14)?,
            lightly_played: row.get(15)?,
            moderately_played: row.get(16)?,
            heavily_played: row.get(17)?,
            damaged: row.get(18)?,
            foil_near_mint: row.get(19)?,
            foil: row.get(20)?,
            last_updated: parse_timestamp(row.get(21)?),
        },
    })
}

fn row_to_run(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        catalog: row.get(1)?,
        started_at: row.get(2)?,
        finished_at: row.get(3)?,
        config_hash: row.get(4)?,
        status: ImportPhase::from_db_string(&row.get::<_, String>(5)?).unwrap_or(ImportPhase::Idle),
        stats: RunStats {
            pages_fetched: row.get(6)?,
            pages_failed: row.get(7)?,
            sets_failed: row.get(8)?,
            cards_processed: row.get(9)?,
            inserted: row.get(10)?,
            refreshed: row.get(11)?,
            skipped: row.get(12)?,
            card_errors: row.get(13)?,
        },
    })
}

fn row_to_checkpoint(row: &Row<'_>) -> rusqlite::Result<ImportCheckpoint> {
    Ok(ImportCheckpoint {
        catalog: row.get(0)?,
        set_code: row.get(1)?,
        last_offset: row.get(2)?,
        pages_processed: row.get(3)?,
        is_complete: row.get(4)?,
        last_updated: parse_timestamp(row.get(5)?),
        last_check_date: parse_timestamp(row.get(6)?),
    })
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, catalog: &str, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO import_runs (catalog, started_at, config_hash, status) VALUES (?1, ?2, ?3, ?4)",
            params![catalog, now, config_hash, ImportPhase::Idle.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM import_runs WHERE id = ?1", RUN_COLUMNS),
                params![run_id],
                row_to_run,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self, catalog: &str) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM import_runs WHERE catalog = ?1 ORDER BY id DESC LIMIT 1",
                    RUN_COLUMNS
                ),
                params![catalog],
                row_to_run,
            )
            .optional()?;
        Ok(run)
    }

    fn finish_run(&mut self, run_id: i64, status: ImportPhase, stats: &RunStats) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE import_runs SET status = ?1, finished_at = ?2, pages_fetched = ?3,
             pages_failed = ?4, sets_failed = ?5, cards_processed = ?6, cards_inserted = ?7,
             cards_refreshed = ?8, cards_skipped = ?9, card_errors = ?10 WHERE id = ?11",
            params![
                status.to_db_string(),
                now,
                stats.pages_fetched,
                stats.pages_failed,
                stats.sets_failed,
                stats.cards_processed,
                stats.inserted,
                stats.refreshed,
                stats.skipped,
                stats.card_errors,
                run_id
            ],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Catalog Leases =====

    fn try_acquire_lock(&mut self, catalog: &str, owner: &str, ttl: Duration) -> StorageResult<LockOutcome> {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::hours(1));
        let expires_at = now + ttl;

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let holder: Option<(String, String)> = tx
            .query_row(
                "SELECT owner, expires_at FROM catalog_locks WHERE catalog = ?1",
                params![catalog],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        if let Some((holder, holder_expires)) = holder {
            let live = parse_timestamp(Some(holder_expires.clone())).map_or(false, |at| at > now);
            if live && holder != owner {
                return Ok(LockOutcome::HeldBy {
                    owner: holder,
                    expires_at: holder_expires,
                });
            }
        }

        tx.execute(
            "INSERT INTO catalog_locks (catalog, owner, acquired_at, expires_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(catalog) DO UPDATE SET owner = excluded.owner,
             acquired_at = excluded.acquired_at, expires_at = excluded.expires_at",
            params![catalog, owner, now.to_rfc3339(), expires_at.to_rfc3339()],
        )?;
        tx.commit()?;

        Ok(LockOutcome::Acquired)
    }

    fn release_lock(&mut self, catalog: &str, owner: &str) -> StorageResult<()> {
        self.conn.execute(
            "DELETE FROM catalog_locks WHERE catalog = ?1 AND owner = ?2",
            params![catalog, owner],
        )?;
        Ok(())
    }

    // ===== Expansions =====

    fn find_expansion(&self, catalog: &str, title: &str) -> StorageResult<Option<Expansion>> {
        let expansion = self
            .conn
            .query_row(
                "SELECT id, catalog, title, freeze_state FROM expansions WHERE catalog = ?1 AND title = ?2",
                params![catalog, title],
                row_to_expansion,
            )
            .optional()?;
        Ok(expansion)
    }

    fn insert_expansion(&mut self, catalog: &str, title: &str, freeze_state: FreezeState) -> StorageResult<Expansion> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO expansions (catalog, title, freeze_state, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![catalog, title, freeze_state.to_db_string(), now],
            )
            .map_err(|e| map_write_error(e, || format!("expansion {}/{}", catalog, title)))?;

        Ok(Expansion {
            id: self.conn.last_insert_rowid(),
            catalog: catalog.to_string(),
            title: title.to_string(),
            freeze_state,
        })
    }

    fn set_expansion_freeze_state(&mut self, expansion_id: i64, freeze_state: FreezeState) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE expansions SET freeze_state = ?1, updated_at = ?2 WHERE id = ?3",
            params![freeze_state.to_db_string(), Utc::now().to_rfc3339(), expansion_id],
        )?;
        Ok(())
    }

    fn freeze_expansion(&mut self, catalog: &str, title: &str) -> StorageResult<bool> {
        let updated = self.conn.execute(
            "UPDATE expansions SET freeze_state = ?1, updated_at = ?2 WHERE catalog = ?3 AND title = ?4",
            params![
                FreezeState::Frozen.to_db_string(),
                Utc::now().to_rfc3339(),
                catalog,
                title
            ],
        )?;
        Ok(updated > 0)
    }

    // ===== Sets =====

    fn find_set(&self, catalog: &str, set_code: &str) -> StorageResult<Option<CardSet>> {
        let set = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM card_sets WHERE catalog = ?1 AND set_code = ?2",
                    SET_COLUMNS
                ),
                params![catalog, set_code],
                row_to_set,
            )
            .optional()?;
        Ok(set)
    }

    fn insert_set(
        &mut self,
        expansion_id: i64,
        catalog: &str,
        metadata: &SetMetadata,
        freeze_state: FreezeState,
    ) -> StorageResult<CardSet> {
        let now = Utc::now().to_rfc3339();
        let name = metadata.expansion_title().to_string();
        let release_date = metadata
            .release_date
            .map(|d| d.format(DATE_FORMAT).to_string());

        self.conn
            .execute(
                "INSERT INTO card_sets (expansion_id, catalog, set_code, name, declared_card_count,
                 release_date, freeze_state, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                params![
                    expansion_id,
                    catalog,
                    metadata.set_code,
                    name,
                    metadata.declared_count,
                    release_date,
                    freeze_state.to_db_string(),
                    now
                ],
            )
            .map_err(|e| map_write_error(e, || format!("set {}/{}", catalog, metadata.set_code)))?;

        Ok(CardSet {
            id: self.conn.last_insert_rowid(),
            expansion_id,
            catalog: catalog.to_string(),
            set_code: metadata.set_code.clone(),
            name,
            declared_card_count: metadata.declared_count,
            release_date: metadata.release_date,
            freeze_state,
        })
    }

    fn update_set_metadata(&mut self, set_id: i64, metadata: &SetMetadata) -> StorageResult<()> {
        let release_date = metadata
            .release_date
            .map(|d| d.format(DATE_FORMAT).to_string());

        self.conn.execute(
            "UPDATE card_sets SET
                name = COALESCE(?1, name),
                declared_card_count = COALESCE(?2, declared_card_count),
                release_date = COALESCE(?3, release_date),
                freeze_state = ?4,
                updated_at = ?5
             WHERE id = ?6",
            params![
                metadata.name,
                metadata.declared_count,
                release_date,
                FreezeState::AutoManaged.to_db_string(),
                Utc::now().to_rfc3339(),
                set_id
            ],
        )?;
        Ok(())
    }

    fn update_set_release_date(&mut self, set_id: i64, release_date: NaiveDate) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE card_sets SET release_date = ?1, updated_at = ?2 WHERE id = ?3",
            params![
                release_date.format(DATE_FORMAT).to_string(),
                Utc::now().to_rfc3339(),
                set_id
            ],
        )?;
        Ok(())
    }

    fn freeze_set(&mut self, catalog: &str, set_code: &str) -> StorageResult<bool> {
        let updated = self.conn.execute(
            "UPDATE card_sets SET freeze_state = ?1, updated_at = ?2 WHERE catalog = ?3 AND set_code = ?4",
            params![
                FreezeState::Frozen.to_db_string(),
                Utc::now().to_rfc3339(),
                catalog,
                set_code
            ],
        )?;
        Ok(updated > 0)
    }

    fn list_sets(&self, catalog: &str) -> StorageResult<Vec<CardSet>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM card_sets WHERE catalog = ?1 ORDER BY set_code",
            SET_COLUMNS
        ))?;
        let sets = stmt
            .query_map(params![catalog], row_to_set)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sets)
    }

    fn load_set_inventory(&self, catalog: &str) -> StorageResult<HashMap<String, SetInventory>> {
        let mut stmt = self.conn.prepare(
            "SELECT s.set_code, s.declared_card_count, s.freeze_state, COUNT(c.id)
             FROM card_sets s
             LEFT JOIN cards c ON c.set_id = s.id
             WHERE s.catalog = ?1
             GROUP BY s.id",
        )?;

        let rows = stmt.query_map(params![catalog], |row| {
            Ok(SetInventory {
                set_code: row.get(0)?,
                declared_card_count: row.get(1)?,
                freeze_state: freeze_from_row(row.get(2)?),
                stored_cards: row.get(3)?,
            })
        })?;

        let mut inventory = HashMap::new();
        for row in rows {
            let set = row?;
            inventory.insert(set.set_code.clone(), set);
        }
        Ok(inventory)
    }

    // ===== Cards =====

    fn find_card_id(&self, catalog: &str, key: &CardKey) -> StorageResult<Option<i64>> {
        let id = self
            .conn
            .query_row(
                "SELECT id FROM cards WHERE catalog = ?1 AND set_code = ?2 AND name = ?3 AND card_number = ?4",
                params![catalog, key.set_code, key.name, key.number],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    fn get_card(&self, catalog: &str, key: &CardKey) -> StorageResult<Option<StoredCard>> {
        let card = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM cards WHERE catalog = ?1 AND set_code = ?2 AND name = ?3 AND card_number = ?4",
                    CARD_COLUMNS
                ),
                params![catalog, key.set_code, key.name, key.number],
                row_to_card,
            )
            .optional()?;
        Ok(card)
    }

    fn insert_card(&mut self, card: &NewCard) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        let prices = &card.prices;
        self.conn
            .execute(
                "INSERT INTO cards (set_id, catalog, set_code, name, card_number, upstream_id,
                 tcgplayer_id, rarity, description, image_url, price_low, price_high, market_price,
                 price_near_mint, price_lightly_played, price_moderately_played, price_heavily_played,
                 price_damaged, price_foil_near_mint, price_foil, last_price_update, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                 ?17, ?18, ?19, ?20, ?21, ?22)",
                params![
                    card.set_id,
                    card.catalog,
                    card.key.set_code,
                    card.key.name,
                    card.key.number,
                    card.upstream_id,
                    card.tcgplayer_id,
                    card.rarity.to_db_string(),
                    card.description,
                    card.image_url,
                    prices.low,
                    prices.high,
                    prices.market,
                    prices.near_mint,
                    prices.lightly_played,
                    prices.moderately_played,
                    prices.heavily_played,
                    prices.damaged,
                    prices.foil_near_mint,
                    prices.foil,
                    prices.last_updated.map(|t| t.to_rfc3339()),
                    now
                ],
            )
            .map_err(|e| {
                map_write_error(e, || {
                    format!(
                        "card {}/{}/{}/{}",
                        card.catalog, card.key.set_code, card.key.name, card.key.number
                    )
                })
            })?;

        Ok(self.conn.last_insert_rowid())
    }

    fn update_card_prices(&mut self, card_id: i64, prices: &PriceSummary) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE cards SET price_low = ?1, price_high = ?2, market_price = ?3, price_near_mint = ?4,
             price_lightly_played = ?5, price_moderately_played = ?6, price_heavily_played = ?7,
             price_damaged = ?8, price_foil_near_mint = ?9, price_foil = ?10, last_price_update = ?11
             WHERE id = ?12",
            params![
                prices.low,
                prices.high,
                prices.market,
                prices.near_mint,
                prices.lightly_played,
                prices.moderately_played,
                prices.heavily_played,
                prices.damaged,
                prices.foil_near_mint,
                prices.foil,
                prices.last_updated.map(|t| t.to_rfc3339()),
                card_id
            ],
        )?;
        Ok(())
    }

    fn load_card_keys(&self, catalog: &str, set_code: &str) -> StorageResult<HashSet<CardKey>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, card_number FROM cards WHERE catalog = ?1 AND set_code = ?2",
        )?;
        let keys = stmt
            .query_map(params![catalog, set_code], |row| {
                Ok(CardKey {
                    name: row.get(0)?,
                    set_code: set_code.to_string(),
                    number: row.get(1)?,
                })
            })?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(keys)
    }

    fn count_cards(&self, catalog: &str) -> StorageResult<u64> {
        let count: u64 = self.conn.query_row(
            "SELECT COUNT(*) FROM cards WHERE catalog = ?1",
            params![catalog],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn delete_cards_in_set(&mut self, catalog: &str, set_code: &str) -> StorageResult<u64> {
        let deleted = self.conn.execute(
            "DELETE FROM cards WHERE catalog = ?1 AND set_code = ?2",
            params![catalog, set_code],
        )?;
        Ok(deleted as u64)
    }

    // ===== Checkpoints =====

    fn load_checkpoint(&self, catalog: &str) -> StorageResult<Option<ImportCheckpoint>> {
        let checkpoint = self
            .conn
            .query_row(
                "SELECT catalog, set_code, last_offset, pages_processed, is_complete, last_updated,
                 last_check_date FROM import_checkpoints WHERE catalog = ?1",
                params![catalog],
                row_to_checkpoint,
            )
            .optional()?;
        Ok(checkpoint)
    }

    fn save_checkpoint(&mut self, checkpoint: &ImportCheckpoint) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO import_checkpoints (catalog, set_code, last_offset, pages_processed,
             is_complete, last_updated, last_check_date) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(catalog) DO UPDATE SET set_code = excluded.set_code,
             last_offset = excluded.last_offset, pages_processed = excluded.pages_processed,
             is_complete = excluded.is_complete, last_updated = excluded.last_updated,
             last_check_date = excluded.last_check_date",
            params![
                checkpoint.catalog,
                checkpoint.set_code,
                checkpoint.last_offset,
                checkpoint.pages_processed,
                checkpoint.is_complete,
                checkpoint.last_updated.map(|t| t.to_rfc3339()),
                checkpoint.last_check_date.map(|t| t.to_rfc3339())
            ],
        )?;
        Ok(())
    }
}
