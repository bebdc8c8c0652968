//! Card insert-or-refresh
//!
//! A card is identified by `CardKey`. Stored cards only get their price summary rewritten;
//! new cards are inserted with mapped rarity and prices. A unique-index race on insert is
//! resolved by refreshing the row the other writer created.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use super::model::{CardKey, CardSet, NewCard};
use super::price::PriceSummary;
use super::rarity::Rarity;
use crate::client::CardDto;
use crate::storage::{Storage, StorageError, StorageResult};

/// Why a card was left alone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Upstream sent a card without a name
    MissingName,
    /// Delta fetch: the key was already stored before the fetch started
    AlreadyStored,
}

/// Result of upserting one card
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    PriceRefreshed,
    Skipped(SkipReason),
}

/// Upserts the cards of one set
///
/// In delta mode the keys stored before the fetch are loaded once and matching cards are
/// skipped without a write.
#[derive(Debug, Default)]
pub struct CardUpsertEngine {
    known_keys: Option<HashSet<CardKey>>,
}

impl CardUpsertEngine {
    /// Engine for a full fetch
    pub fn full() -> Self {
        Self { known_keys: None }
    }

    /// Engine for a delta fetch over a set whose stored keys are `known_keys`
    pub fn delta(known_keys: HashSet<CardKey>) -> Self {
        Self {
            known_keys: Some(known_keys),
        }
    }

    pub fn is_delta(&self) -> bool {
        self.known_keys.is_some()
    }

    pub fn upsert<S: Storage + ?Sized>(
        &mut self,
        storage: &mut S,
        card: &CardDto,
        set: &CardSet,
        catalog: &str,
    ) -> StorageResult<UpsertOutcome> {
        self.upsert_at(storage, card, set, catalog, Utc::now())
    }

    pub fn upsert_at<S: Storage + ?Sized>(
        &mut self,
        storage: &mut S,
        card: &CardDto,
        set: &CardSet,
        catalog: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<UpsertOutcome> {
        let Some(key) = CardKey::for_card(card, &set.set_code) else {
            tracing::debug!("Skipping nameless card {:?} in {}", card.id, set.set_code);
            return Ok(UpsertOutcome::Skipped(SkipReason::MissingName));
        };

        if let Some(known) = &self.known_keys {
            if known.contains(&key) {
                return Ok(UpsertOutcome::Skipped(SkipReason::AlreadyStored));
            }
        }

        let prices = PriceSummary::from_variants(&card.variants, now);

        if let Some(card_id) = storage.find_card_id(catalog, &key)? {
            refresh_prices(storage, card_id, prices.as_ref())?;
            return Ok(UpsertOutcome::PriceRefreshed);
        }

        let new_card = NewCard {
            set_id: set.id,
            catalog: catalog.to_string(),
            key: key.clone(),
            upstream_id: card.id.clone(),
            tcgplayer_id: card.tcgplayer_id.clone(),
            rarity: Rarity::from_upstream(card.rarity.as_deref()),
            description: card.details.clone(),
            image_url: card.image_url.clone(),
            prices: prices.clone().unwrap_or_default(),
        };

        match storage.insert_card(&new_card) {
            Ok(_) => Ok(UpsertOutcome::Inserted),
            Err(StorageError::ConstraintViolation(what)) => {
                tracing::debug!("{} was inserted concurrently, refreshing prices", what);
                let card_id = storage
                    .find_card_id(catalog, &key)?
                    .ok_or(StorageError::ConstraintViolation(what))?;
                refresh_prices(storage, card_id, prices.as_ref())?;
                Ok(UpsertOutcome::PriceRefreshed)
            }
            Err(e) => Err(e),
        }
    }
}

/// Rewrites the stored summary; a fetch with no priced variant keeps the old one
fn refresh_prices<S: Storage + ?Sized>(
    storage: &mut S,
    card_id: i64,
    prices: Option<&PriceSummary>,
) -> StorageResult<()> {
    match prices {
        Some(prices) => storage.update_card_prices(card_id, prices),
        None => Ok(()),
    }
}
