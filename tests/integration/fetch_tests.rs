//! Key rotation and retry behaviour of the fetcher

use tcg_ingest::client::{CardScope, FetchError, Page, PageRequest, RetryPolicy};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::{card_json, cards_page, fetcher};

fn request() -> PageRequest {
    PageRequest::cards(CardScope::Set("base1".to_string()), 0, 20)
}

#[tokio::test]
async fn test_rate_limited_on_every_key_gives_up() {
    let server = MockServer::start().await;
    for key in ["k0", "k1", "k2"] {
        Mock::given(method("GET"))
            .and(path("/cards"))
            .and(header("x-api-key", key))
            .respond_with(ResponseTemplate::new(429))
            .expect(1)
            .mount(&server)
            .await;
    }

    let fetcher = fetcher(&server, &["k0", "k1", "k2"], RetryPolicy::default());
    let err = fetcher.fetch(&request()).await.unwrap_err();

    assert!(matches!(err, FetchError::Fatal { status: Some(429), .. }));
    assert_eq!(fetcher.key_pool().current_index(), 2);
}

#[tokio::test]
async fn test_rate_limit_rotates_to_next_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cards"))
        .and(header("x-api-key", "k0"))
        .respond_with(ResponseTemplate::new(429))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/cards"))
        .and(header("x-api-key", "k1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(cards_page(&[card_json("Pikachu", "base1", "58", 2.5)])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = fetcher(&server, &["k0", "k1", "k2"], RetryPolicy::default());
    let page = fetcher.fetch(&request()).await.unwrap();

    match page {
        Page::Cards(envelope) => {
            let cards = envelope.into_cards();
            assert_eq!(cards.len(), 1);
            assert_eq!(cards[0].name.as_deref(), Some("Pikachu"));
        }
        other => panic!("expected a card page, got {:?}", other),
    }
    assert_eq!(fetcher.key_pool().current_key(), "k1");
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cards"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such set"))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = fetcher(&server, &["k0", "k1"], RetryPolicy::default());
    let err = fetcher.fetch(&request()).await.unwrap_err();

    assert!(matches!(err, FetchError::Fatal { status: Some(404), .. }));
    assert_eq!(fetcher.key_pool().current_index(), 0);
}
