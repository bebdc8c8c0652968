//! Local catalog hierarchy: Catalog → Expansion → Set → Card

use chrono::NaiveDate;

use super::price::PriceSummary;
use super::rarity::Rarity;
use crate::client::{CardDto, SetDto};
use crate::config::{CatalogEntry, ImportMode};
use crate::state::FreezeState;

/// Card number used when upstream sends none
pub const UNKNOWN_CARD_NUMBER: &str = "N/A";

/// A trading-card game, mapped 1:1 to an upstream game id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    pub code: String,
    pub game_id: String,
    pub display_name: String,
    pub mode: ImportMode,
}

impl From<&CatalogEntry> for Catalog {
    fn from(entry: &CatalogEntry) -> Self {
        Self {
            code: entry.code.clone(),
            game_id: entry.game_id.clone(),
            display_name: entry
                .display_name
                .clone()
                .unwrap_or_else(|| entry.code.clone()),
            mode: entry.mode,
        }
    }
}

/// Dedup identity of a card: (name, set code, card number)
///
/// Upstream ids are never part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CardKey {
    pub name: String,
    pub set_code: String,
    pub number: String,
}

impl CardKey {
    pub fn new(name: &str, set_code: &str, number: Option<&str>) -> Self {
        let number = number
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(UNKNOWN_CARD_NUMBER);

        Self {
            name: name.to_string(),
            set_code: set_code.to_string(),
            number: number.to_string(),
        }
    }

    /// Builds the key of an upstream card stored under `set_code`; `None` when the card has
    /// no name
    pub fn for_card(card: &CardDto, set_code: &str) -> Option<Self> {
        let name = card.name.as_deref().map(str::trim).filter(|n| !n.is_empty())?;
        Some(Self::new(name, set_code, card.number.as_deref()))
    }
}

/// Upstream facts about a set, applied to non-frozen local rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetMetadata {
    pub set_code: String,
    pub name: Option<String>,
    pub declared_count: Option<i64>,
    pub release_date: Option<NaiveDate>,
}

impl SetMetadata {
    pub fn from_set(set: &SetDto) -> Self {
        Self {
            set_code: set.id.clone(),
            name: set.name.clone().filter(|n| !n.trim().is_empty()),
            declared_count: set.declared_count(),
            release_date: set.release_date.as_deref().and_then(parse_release_date),
        }
    }

    /// Minimal metadata recovered from a card's set reference
    pub fn from_card(card: &CardDto) -> Option<Self> {
        let set_code = card.set.clone().filter(|s| !s.is_empty())?;
        Some(Self {
            set_code,
            name: card.set_name.clone().filter(|n| !n.trim().is_empty()),
            declared_count: None,
            release_date: None,
        })
    }

    /// True when the metadata came from the set listing rather than a card reference
    pub fn is_authoritative(&self) -> bool {
        self.declared_count.is_some() || self.release_date.is_some()
    }

    /// Title of the expansion this set belongs to (one expansion per set name)
    pub fn expansion_title(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.set_code)
    }
}

/// Parses an upstream release date (`2024-01-15` or an RFC 3339 timestamp)
pub fn parse_release_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            chrono::DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.date_naive())
        })
        .or_else(|| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
                .ok()
                .map(|dt| dt.date())
        })
}

/// An expansion row
#[derive(Debug, Clone, PartialEq)]
pub struct Expansion {
    pub id: i64,
    pub catalog: String,
    pub title: String,
    pub freeze_state: FreezeState,
}

/// A set row
#[derive(Debug, Clone, PartialEq)]
pub struct CardSet {
    pub id: i64,
    pub expansion_id: i64,
    pub catalog: String,
    pub set_code: String,
    pub name: String,
    pub declared_card_count: Option<i64>,
    pub release_date: Option<NaiveDate>,
    pub freeze_state: FreezeState,
}

/// Card data ready to be inserted
#[derive(Debug, Clone, PartialEq)]
pub struct NewCard {
    pub set_id: i64,
    pub catalog: String,
    pub key: CardKey,
    pub upstream_id: Option<String>,
    pub tcgplayer_id: Option<String>,
    pub rarity: Rarity,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub prices: PriceSummary,
}

/// A stored card
#[derive(Debug, Clone, PartialEq)]
pub struct StoredCard {
    pub id: i64,
    pub set_id: i64,
    pub catalog: String,
    pub key: CardKey,
    pub upstream_id: Option<String>,
    pub tcgplayer_id: Option<String>,
    pub rarity: Rarity,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub prices: PriceSummary,
}

/// What the classifier needs to know about one local set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetInventory {
    pub set_code: String,
    pub declared_card_count: Option<i64>,
    /// Distinct card keys stored under the set
    pub stored_cards: i64,
    pub freeze_state: FreezeState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_key_defaults_number() {
        assert_eq!(CardKey::new("Pikachu", "sv1", None).number, "N/A");
        assert_eq!(CardKey::new("Pikachu", "sv1", Some("  ")).number, "N/A");
        assert_eq!(CardKey::new("Pikachu", "sv1", Some("025")).number, "025");
    }

    #[test]
    fn test_card_key_for_card() {
        let card = CardDto {
            id: Some("upstream-1".into()),
            name: Some("Charizard".into()),
            set: Some("base1".into()),
            set_name: None,
            number: Some("4".into()),
            tcgplayer_id: None,
            rarity: None,
            details: None,
            image_url: None,
            variants: vec![],
        };
        let key = CardKey::for_card(&card, "base1").unwrap();
        assert_eq!(key, CardKey::new("Charizard", "base1", Some("4")));
        assert_eq!(key.name, "Charizard");

        let nameless = CardDto {
            name: Some("   ".into()),
            ..card
        };
        assert!(CardKey::for_card(&nameless, "base1").is_none());
    }

    #[test]
    fn test_release_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 15);
        assert_eq!(parse_release_date("2024-01-15"), expected);
        assert_eq!(parse_release_date("2024-01-15T00:00:00Z"), expected);
        assert_eq!(parse_release_date("2024-01-15T10:30:00"), expected);
        assert_eq!(parse_release_date("January 2024"), None);
        assert_eq!(parse_release_date(""), None);
    }

    #[test]
    fn test_expansion_title_falls_back_to_code() {
        let meta = SetMetadata {
            set_code: "sv1".into(),
            name: None,
            declared_count: None,
            release_date: None,
        };
        assert_eq!(meta.expansion_title(), "sv1");
    }
}
