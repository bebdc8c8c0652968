//! Database schema definitions and migrations
//!
//! This module contains all SQL schema definitions for the tcg-ingest database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track import runs, one row per catalog run
CREATE TABLE IF NOT EXISTS import_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    catalog TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    pages_fetched INTEGER NOT NULL DEFAULT 0,
    pages_failed INTEGER NOT NULL DEFAULT 0,
    sets_failed INTEGER NOT NULL DEFAULT 0,
    cards_processed INTEGER NOT NULL DEFAULT 0,
    cards_inserted INTEGER NOT NULL DEFAULT 0,
    cards_refreshed INTEGER NOT NULL DEFAULT 0,
    cards_skipped INTEGER NOT NULL DEFAULT 0,
    card_errors INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_import_runs_catalog ON import_runs(catalog);

-- Expansions, one per distinct set name within a catalog
CREATE TABLE IF NOT EXISTS expansions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    catalog TEXT NOT NULL,
    title TEXT NOT NULL,
    freeze_state TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(catalog, title)
);

-- Sets, keyed by upstream set code within a catalog
CREATE TABLE IF NOT EXISTS card_sets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    expansion_id INTEGER NOT NULL REFERENCES expansions(id),
    catalog TEXT NOT NULL,
    set_code TEXT NOT NULL,
    name TEXT NOT NULL,
    declared_card_count INTEGER,
    release_date TEXT,
    freeze_state TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(catalog, set_code)
);

CREATE INDEX IF NOT EXISTS idx_card_sets_expansion ON card_sets(expansion_id);

-- Cards, deduplicated on (name, set code, card number)
CREATE TABLE IF NOT EXISTS cards (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    set_id INTEGER NOT NULL REFERENCES card_sets(id),
    catalog TEXT NOT NULL,
    set_code TEXT NOT NULL,
    name TEXT NOT NULL,
    card_number TEXT NOT NULL,
    upstream_id TEXT,
    tcgplayer_id TEXT,
    rarity TEXT NOT NULL,
    description TEXT,
    image_url TEXT,
    price_low REAL,
    price_high REAL,
    market_price REAL,
    price_near_mint REAL,
    price_lightly_played REAL,
    price_moderately_played REAL,
    price_heavily_played REAL,
    price_damaged REAL,
    price_foil_near_mint REAL,
    price_foil REAL,
    last_price_update TEXT,
    created_at TEXT NOT NULL,
    UNIQUE(catalog, set_code, name, card_number)
);

CREATE INDEX IF NOT EXISTS idx_cards_set ON cards(set_id);

-- Resumable import position, one row per catalog
CREATE TABLE IF NOT EXISTS import_checkpoints (
    catalog TEXT PRIMARY KEY,
    set_code TEXT,
    last_offset INTEGER NOT NULL DEFAULT 0,
    pages_processed INTEGER NOT NULL DEFAULT 0,
    is_complete INTEGER NOT NULL DEFAULT 0,
    last_updated TEXT,
    last_check_date TEXT
);

-- Single-writer lease per catalog
CREATE TABLE IF NOT EXISTS catalog_locks (
    catalog TEXT PRIMARY KEY,
    owner TEXT NOT NULL,
    acquired_at TEXT NOT NULL,
    expires_at TEXT NOT NULL
);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

/// Gets the current schema version
///
/// This can be used for future migrations if the schema changes.
pub fn get_schema_version() -> u32 {
    1
}
