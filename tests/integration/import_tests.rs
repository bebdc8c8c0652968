//! End-to-end import runs against a mock upstream

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tcg_ingest::catalog::{CardKey, SetMetadata};
use tcg_ingest::config::{parse_config, ImportMode};
use tcg_ingest::state::ImportCheckpoint;
use tcg_ingest::storage::{open_storage, SqliteStorage, Storage};
use tcg_ingest::{start_import, FreezeState, ImportPhase, IngestError};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::{card_json, cards_page, catalog, empty_page, orchestrator};

async fn mount_sets(server: &MockServer, body: &str) {
    Mock::given(method("GET"))
        .and(path("/sets"))
        .and(query_param("game", "pokemon"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body.to_string()))
        .mount(server)
        .await;
}

async fn mount_set_page(server: &MockServer, set: &str, offset: u32, body: String) {
    Mock::given(method("GET"))
        .and(path("/cards"))
        .and(query_param("set", set))
        .and(query_param("offset", offset.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

async fn mount_game_page(server: &MockServer, offset: u32, body: String) {
    Mock::given(method("GET"))
        .and(path("/cards"))
        .and(query_param("game", "pokemon"))
        .and(query_param("offset", offset.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

/// Stores set `code` with `names` as numbered cards
fn seed_set(storage: &mut SqliteStorage, code: &str, declared: i64, names: &[&str]) {
    let expansion = storage
        .insert_expansion("pokemon", &format!("Set {}", code), FreezeState::AutoManaged)
        .unwrap();
    let meta = SetMetadata {
        set_code: code.to_string(),
        name: Some(format!("Set {}", code)),
        declared_count: Some(declared),
        release_date: None,
    };
    let set = storage
        .insert_set(expansion.id, "pokemon", &meta, FreezeState::AutoManaged)
        .unwrap();

    for (i, name) in names.iter().enumerate() {
        let number = (i + 1).to_string();
        storage
            .insert_card(&tcg_ingest::catalog::NewCard {
                set_id: set.id,
                catalog: "pokemon".to_string(),
                key: CardKey::new(name, code, Some(&number)),
                upstream_id: None,
                tcgplayer_id: None,
                rarity: Default::default(),
                description: None,
                image_url: None,
                prices: Default::default(),
            })
            .unwrap();
    }
}

/// Set A is new with three cards; set B declares five and four are stored
async fn pokemon_upstream(server: &MockServer) {
    mount_sets(
        server,
        r#"{"data":[{"id":"A","name":"Set A","cards_count":3},{"id":"B","name":"Set B","cards_count":5}]}"#,
    )
    .await;

    mount_set_page(
        server,
        "A",
        0,
        cards_page(&[card_json("A1", "A", "1", 1.0), card_json("A2", "A", "2", 2.0)]),
    )
    .await;
    mount_set_page(server, "A", 2, cards_page(&[card_json("A3", "A", "3", 3.0)])).await;
    mount_set_page(server, "A", 4, empty_page()).await;

    mount_set_page(
        server,
        "B",
        0,
        cards_page(&[card_json("B1", "B", "1", 1.0), card_json("B2", "B", "2", 2.0)]),
    )
    .await;
    mount_set_page(
        server,
        "B",
        2,
        cards_page(&[card_json("B3", "B", "3", 3.0), card_json("B4", "B", "4", 4.0)]),
    )
    .await;
    mount_set_page(server, "B", 4, cards_page(&[card_json("B5", "B", "5", 5.0)])).await;
    mount_set_page(server, "B", 6, empty_page()).await;
}

fn pokemon_storage() -> Arc<Mutex<SqliteStorage>> {
    let mut storage = SqliteStorage::new_in_memory().unwrap();
    seed_set(&mut storage, "B", 4, &["B1", "B2", "B3", "B4"]);
    Arc::new(Mutex::new(storage))
}

#[tokio::test]
async fn test_pokemon_two_set_import() {
    let server = MockServer::start().await;
    pokemon_upstream(&server).await;
    let storage = pokemon_storage();

    let report = orchestrator(&server, storage.clone(), 2)
        .import_catalog(&catalog(ImportMode::PerSet))
        .await
        .unwrap();

    assert_eq!(report.phase, ImportPhase::Completed);
    assert_eq!(report.sets.new, 1);
    assert_eq!(report.sets.has_delta, 1);
    assert_eq!(report.stats.inserted, 4);
    assert_eq!(report.stats.skipped, 4);
    assert_eq!(report.stats.card_errors, 0);

    let guard = storage.lock().unwrap();
    assert_eq!(guard.count_cards("pokemon").unwrap(), 8);
    assert_eq!(guard.load_card_keys("pokemon", "A").unwrap().len(), 3);

    let b5 = guard
        .get_card("pokemon", &CardKey::new("B5", "B", Some("5")))
        .unwrap()
        .unwrap();
    assert_eq!(b5.prices.near_mint, Some(5.0));

    let checkpoint = guard.load_checkpoint("pokemon").unwrap().unwrap();
    assert!(checkpoint.is_complete);
    assert_eq!(checkpoint.set_code, None);

    let run = guard.get_latest_run("pokemon").unwrap().unwrap();
    assert_eq!(run.id, report.run_id);
    assert_eq!(run.status, ImportPhase::Completed);
    assert_eq!(run.stats, report.stats);
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let server = MockServer::start().await;
    pokemon_upstream(&server).await;
    let storage = pokemon_storage();
    let orchestrator = orchestrator(&server, storage.clone(), 2);

    orchestrator
        .import_catalog(&catalog(ImportMode::PerSet))
        .await
        .unwrap();
    let second = orchestrator
        .import_catalog(&catalog(ImportMode::PerSet))
        .await
        .unwrap();

    assert_eq!(second.phase, ImportPhase::Completed);
    assert_eq!(second.sets.current, 2);
    assert_eq!(second.stats.inserted, 0);
    assert_eq!(second.stats.cards_processed, 0);
    assert_eq!(storage.lock().unwrap().count_cards("pokemon").unwrap(), 8);
}

#[tokio::test]
async fn test_resumes_inside_set_from_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("ingest.db");

    {
        let mut storage = open_storage(&db_path).unwrap();
        let mut checkpoint = ImportCheckpoint::new("pokemon");
        checkpoint.record_page(Some("A"), 2, Utc::now());
        storage.save_checkpoint(&checkpoint).unwrap();
    }

    let server = MockServer::start().await;
    mount_sets(&server, r#"{"data":[{"id":"A","name":"Set A","cards_count":3}]}"#).await;
    Mock::given(method("GET"))
        .and(path("/cards"))
        .and(query_param("set", "A"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_string(empty_page()))
        .expect(0)
        .mount(&server)
        .await;
    mount_set_page(&server, "A", 2, cards_page(&[card_json("A3", "A", "3", 3.0)])).await;
    mount_set_page(&server, "A", 4, empty_page()).await;

    let storage = Arc::new(Mutex::new(open_storage(&db_path).unwrap()));
    let report = orchestrator(&server, storage.clone(), 2)
        .import_catalog(&catalog(ImportMode::PerSet))
        .await
        .unwrap();

    assert_eq!(report.stats.inserted, 1);
    assert!(storage
        .lock()
        .unwrap()
        .load_checkpoint("pokemon")
        .unwrap()
        .unwrap()
        .is_complete);
}

#[tokio::test]
async fn test_resumes_interrupted_set_without_declared_count() {
    let mut storage = SqliteStorage::new_in_memory().unwrap();
    seed_set(&mut storage, "A", 0, &["A1", "A2"]);
    let mut checkpoint = ImportCheckpoint::new("pokemon");
    checkpoint.record_page(Some("A"), 2, Utc::now());
    storage.save_checkpoint(&checkpoint).unwrap();
    let storage = Arc::new(Mutex::new(storage));

    let server = MockServer::start().await;
    mount_sets(&server, r#"{"data":[{"id":"A","name":"Set A"}]}"#).await;
    Mock::given(method("GET"))
        .and(path("/cards"))
        .and(query_param("set", "A"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_string(empty_page()))
        .expect(0)
        .mount(&server)
        .await;
    mount_set_page(&server, "A", 2, cards_page(&[card_json("A3", "A", "3", 3.0)])).await;
    mount_set_page(&server, "A", 4, empty_page()).await;

    let report = orchestrator(&server, storage.clone(), 2)
        .import_catalog(&catalog(ImportMode::PerSet))
        .await
        .unwrap();

    assert_eq!(report.phase, ImportPhase::Completed);
    assert_eq!(report.sets.current, 0);
    assert_eq!(report.sets.has_delta, 1);
    assert_eq!(report.stats.inserted, 1);

    let guard = storage.lock().unwrap();
    assert_eq!(guard.count_cards("pokemon").unwrap(), 3);
    let checkpoint = guard.load_checkpoint("pokemon").unwrap().unwrap();
    assert!(checkpoint.is_complete);
    assert_eq!(checkpoint.set_code, None);
}

#[tokio::test]
async fn test_duplicate_cards_are_refreshed_not_inserted() {
    let server = MockServer::start().await;
    mount_sets(&server, r#"{"data":[{"id":"A","name":"Set A","cards_count":3}]}"#).await;
    mount_set_page(
        &server,
        "A",
        0,
        cards_page(&[card_json("A1", "A", "1", 1.0), card_json("A2", "A", "2", 2.0)]),
    )
    .await;
    mount_set_page(&server, "A", 2, cards_page(&[card_json("A1", "A", "1", 9.0)])).await;
    mount_set_page(&server, "A", 4, empty_page()).await;

    let storage = Arc::new(Mutex::new(SqliteStorage::new_in_memory().unwrap()));
    let report = orchestrator(&server, storage.clone(), 2)
        .import_catalog(&catalog(ImportMode::PerSet))
        .await
        .unwrap();

    assert_eq!(report.stats.inserted, 2);
    assert_eq!(report.stats.refreshed, 1);

    let guard = storage.lock().unwrap();
    assert_eq!(guard.count_cards("pokemon").unwrap(), 2);
    let a1 = guard
        .get_card("pokemon", &CardKey::new("A1", "A", Some("1")))
        .unwrap()
        .unwrap();
    assert_eq!(a1.prices.near_mint, Some(9.0));
}

#[tokio::test]
async fn test_failed_page_is_skipped_and_run_partially_fails() {
    let server = MockServer::start().await;
    mount_sets(&server, r#"{"data":[{"id":"A","name":"Set A","cards_count":3}]}"#).await;
    Mock::given(method("GET"))
        .and(path("/cards"))
        .and(query_param("set", "A"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    mount_set_page(&server, "A", 2, cards_page(&[card_json("A3", "A", "3", 3.0)])).await;
    mount_set_page(&server, "A", 4, empty_page()).await;

    let storage = Arc::new(Mutex::new(SqliteStorage::new_in_memory().unwrap()));
    let report = orchestrator(&server, storage.clone(), 2)
        .import_catalog(&catalog(ImportMode::PerSet))
        .await
        .unwrap();

    assert_eq!(report.phase, ImportPhase::PartiallyFailed);
    assert_eq!(report.stats.pages_failed, 1);
    assert_eq!(report.stats.sets_failed, 1);
    assert_eq!(report.stats.inserted, 1);

    let guard = storage.lock().unwrap();
    let checkpoint = guard.load_checkpoint("pokemon").unwrap().unwrap();
    assert!(!checkpoint.is_complete);
    assert_eq!(
        guard.get_latest_run("pokemon").unwrap().unwrap().status,
        ImportPhase::PartiallyFailed
    );
}

#[tokio::test]
async fn test_frozen_set_keeps_local_metadata() {
    let server = MockServer::start().await;
    mount_sets(
        &server,
        r#"{"data":[{"id":"B","name":"Renamed Upstream","cards_count":2}]}"#,
    )
    .await;

    let mut storage = SqliteStorage::new_in_memory().unwrap();
    seed_set(&mut storage, "B", 2, &["B1", "B2"]);
    assert!(storage.freeze_set("pokemon", "B").unwrap());
    let storage = Arc::new(Mutex::new(storage));

    let report = orchestrator(&server, storage.clone(), 2)
        .import_catalog(&catalog(ImportMode::PerSet))
        .await
        .unwrap();

    assert_eq!(report.sets.current, 1);
    let set = storage.lock().unwrap().find_set("pokemon", "B").unwrap().unwrap();
    assert_eq!(set.name, "Set B");
    assert_eq!(set.freeze_state, FreezeState::Frozen);
}

#[tokio::test]
async fn test_catalog_wide_import_then_tail_check() {
    let server = MockServer::start().await;
    mount_game_page(
        &server,
        0,
        cards_page(&[card_json("A1", "A", "1", 1.0), card_json("B1", "B", "1", 2.0)]),
    )
    .await;
    mount_game_page(&server, 2, cards_page(&[card_json("B2", "B", "2", 3.0)])).await;
    Mock::given(method("GET"))
        .and(path("/cards"))
        .and(query_param("game", "pokemon"))
        .and(query_param("offset", "4"))
        .respond_with(ResponseTemplate::new(200).set_body_string(empty_page()))
        .expect(2)
        .mount(&server)
        .await;

    let storage = Arc::new(Mutex::new(SqliteStorage::new_in_memory().unwrap()));
    let orchestrator = orchestrator(&server, storage.clone(), 2);

    let first = orchestrator
        .import_catalog(&catalog(ImportMode::CatalogWide))
        .await
        .unwrap();
    assert_eq!(first.phase, ImportPhase::Completed);
    assert_eq!(first.stats.inserted, 3);

    {
        let guard = storage.lock().unwrap();
        let checkpoint = guard.load_checkpoint("pokemon").unwrap().unwrap();
        assert!(checkpoint.is_complete);
        assert_eq!(checkpoint.last_offset, 4);

        let sets = guard.list_sets("pokemon").unwrap();
        assert_eq!(sets.len(), 2);
        assert!(sets.iter().all(|s| s.freeze_state == FreezeState::NeverTouched));
    }

    // Only the page at offset 4 is requested
    let second = orchestrator
        .import_catalog(&catalog(ImportMode::CatalogWide))
        .await
        .unwrap();
    assert_eq!(second.phase, ImportPhase::Completed);
    assert_eq!(second.stats.cards_processed, 0);
    assert_eq!(storage.lock().unwrap().count_cards("pokemon").unwrap(), 3);
}

#[tokio::test]
async fn test_locked_catalog_is_refused() {
    let server = MockServer::start().await;
    let mut storage = SqliteStorage::new_in_memory().unwrap();
    assert!(storage
        .try_acquire_lock("pokemon", "other-host", Duration::from_secs(600))
        .unwrap()
        .is_acquired());
    let storage = Arc::new(Mutex::new(storage));

    let err = orchestrator(&server, storage, 2)
        .import_catalog(&catalog(ImportMode::PerSet))
        .await
        .unwrap_err();

    match err {
        IngestError::CatalogLocked { catalog, owner } => {
            assert_eq!(catalog, "pokemon");
            assert_eq!(owner, "other-host");
        }
        other => panic!("expected a lock error, got {}", other),
    }
}

#[tokio::test]
async fn test_import_catalogs_reports_batch() {
    let server = MockServer::start().await;
    pokemon_upstream(&server).await;
    let storage = pokemon_storage();

    let summary = orchestrator(&server, storage, 2)
        .import_catalogs(vec![catalog(ImportMode::PerSet)])
        .await;

    assert_eq!(summary.reports.len(), 1);
    assert!(summary.failures.is_empty());
    assert_eq!(summary.totals().inserted, 4);
    assert_eq!(
        summary.overall_status(),
        tcg_ingest::import::BatchStatus::Success
    );
}

#[tokio::test]
async fn test_start_import_from_config() {
    let server = MockServer::start().await;
    mount_sets(&server, r#"{"data":[{"id":"A","name":"Set A","cards_count":2}]}"#).await;
    mount_set_page(
        &server,
        "A",
        0,
        cards_page(&[card_json("A1", "A", "1", 1.0), card_json("A2", "A", "2", 2.0)]),
    )
    .await;
    mount_set_page(&server, "A", 2, empty_page()).await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("ingest.db");
    let config = parse_config(&format!(
        r#"
[api]
base-url = "{}"
keys = ["k0"]

[fetch]
page-size = 2
inter-page-delay-ms = 0

[output]
database-path = "{}"

[[catalog]]
code = "pokemon"
game-id = "pokemon"
"#,
        server.uri(),
        db_path.display()
    ))
    .unwrap();

    let report = start_import(&config, "hash", "pokemon").await.unwrap();
    assert_eq!(report.phase, ImportPhase::Completed);
    assert_eq!(report.stats.inserted, 2);

    let storage = open_storage(&db_path).unwrap();
    assert_eq!(storage.count_cards("pokemon").unwrap(), 2);
    assert_eq!(
        storage.get_latest_run("pokemon").unwrap().unwrap().config_hash,
        "hash"
    );

    let err = start_import(&config, "hash", "mtg").await.unwrap_err();
    assert!(matches!(err, IngestError::UnknownCatalog(code) if code == "mtg"));
}
