//! Integration tests for tcg-ingest
//!
//! These tests use wiremock to stand in for the upstream pricing API and run
//! the fetcher and the import pipeline end-to-end against SQLite.

mod fetch_tests;
mod import_tests;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::Client;
use tcg_ingest::catalog::HierarchyCache;
use tcg_ingest::client::{ApiKeyPool, RateLimitedFetcher, RecordingSleeper, RetryPolicy};
use tcg_ingest::config::ImportMode;
use tcg_ingest::import::ImportOptions;
use tcg_ingest::storage::SqliteStorage;
use tcg_ingest::{Catalog, ImportOrchestrator};
use url::Url;
use wiremock::MockServer;

/// Fetcher against `server` with the given key ring and no real sleeping
pub fn fetcher(server: &MockServer, keys: &[&str], policy: RetryPolicy) -> RateLimitedFetcher {
    let pool = ApiKeyPool::new(
        keys.iter().map(|k| k.to_string()).collect(),
        Duration::from_secs(3600),
    )
    .expect("at least one key");

    RateLimitedFetcher::new(
        Client::new(),
        Url::parse(&server.uri()).expect("mock server uri"),
        Arc::new(pool),
        policy,
        Arc::new(RecordingSleeper::new()),
        Duration::ZERO,
    )
}

/// Orchestrator with a single key, one attempt per page and the given page size
pub fn orchestrator(
    server: &MockServer,
    storage: Arc<Mutex<SqliteStorage>>,
    page_size: u32,
) -> ImportOrchestrator {
    let policy = RetryPolicy {
        max_attempts: 1,
        ..RetryPolicy::default()
    };
    let options = ImportOptions {
        page_size,
        config_hash: "test".to_string(),
        owner: "test-runner".to_string(),
        ..ImportOptions::default()
    };

    ImportOrchestrator::new(
        Arc::new(fetcher(server, &["k0"], policy)),
        storage,
        Arc::new(HierarchyCache::new()),
        options,
    )
}

pub fn catalog(mode: ImportMode) -> Catalog {
    Catalog {
        code: "pokemon".to_string(),
        game_id: "pokemon".to_string(),
        display_name: "Pokémon".to_string(),
        mode,
    }
}

/// A card with a near-mint normal printing at `price`
pub fn card_json(name: &str, set: &str, number: &str, price: f64) -> String {
    format!(
        r#"{{"id":"{set}-{number}","name":"{name}","set":"{set}","set_name":"Set {set}","number":"{number}","rarity":"Rare","variants":[{{"id":"v-{set}-{number}","printing":"Normal","condition":"Near Mint","price":{price}}}]}}"#
    )
}

pub fn cards_page(cards: &[String]) -> String {
    format!(r#"{{"data":[{}]}}"#, cards.join(","))
}

pub fn empty_page() -> String {
    r#"{"data":[]}"#.to_string()
}
