//! Upstream wire types
//!
//! These mirror the JSON the catalog API returns. Unknown fields are ignored and every
//! optional field tolerates `null`, because the upstream is inconsistent across games.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};

/// Accepts an id that upstream sends either as a JSON string or a number
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    }))
}

/// Like `string_or_number`, for ids that must be present
fn required_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    string_or_number(deserializer)?.ok_or_else(|| D::Error::custom("id is null"))
}

/// A game as listed by `GET /games`
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct GameDto {
    #[serde(deserialize_with = "required_string_or_number")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// `GET /games` answers with a bare array on some deployments and an envelope on others
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum GamesResponse {
    List(Vec<GameDto>),
    Envelope { data: Vec<GameDto> },
}

impl GamesResponse {
    pub fn into_games(self) -> Vec<GameDto> {
        match self {
            Self::List(games) => games,
            Self::Envelope { data } => data,
        }
    }
}

/// A set as listed by `GET /sets`
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SetDto {
    /// Upstream set code, the natural key of a local Set
    #[serde(deserialize_with = "required_string_or_number")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub game_id: Option<String>,
    #[serde(default)]
    pub count: Option<i64>,
    #[serde(default)]
    pub cards_count: Option<i64>,
    #[serde(default)]
    pub release_date: Option<String>,
}

impl SetDto {
    /// Declared card count, preferring `cards_count` over the older `count` field
    pub fn declared_count(&self) -> Option<i64> {
        self.cards_count.or(self.count)
    }
}

/// A card as listed by `GET /cards`
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CardDto {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// Upstream set code this card belongs to
    #[serde(default)]
    pub set: Option<String>,
    #[serde(default)]
    pub set_name: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub number: Option<String>,
    #[serde(default, rename = "tcgplayerId", deserialize_with = "string_or_number")]
    pub tcgplayer_id: Option<String>,
    #[serde(default)]
    pub rarity: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default, rename = "imageUrl")]
    pub image_url: Option<String>,
    #[serde(default)]
    pub variants: Vec<VariantDto>,
}

/// One printing/condition offer for a card
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct VariantDto {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub printing: Option<String>,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    /// Unix seconds
    #[serde(default, rename = "lastUpdated")]
    pub last_updated: Option<i64>,
}

/// Envelope for `GET /sets`
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SetsEnvelope {
    #[serde(default)]
    data: Option<Vec<SetDto>>,
    #[serde(default)]
    sets: Option<Vec<SetDto>>,
    #[serde(default, rename = "hasMore")]
    pub has_more: bool,
    #[serde(default, rename = "nextCursor")]
    pub next_cursor: Option<String>,
}

impl SetsEnvelope {
    pub fn len(&self) -> usize {
        self.data.as_ref().or(self.sets.as_ref()).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_sets(self) -> Vec<SetDto> {
        self.data.or(self.sets).unwrap_or_default()
    }
}

/// Envelope for `GET /cards`
#[derive(Debug, Clone, Deserialize, Default)]
pub struct CardsEnvelope {
    #[serde(default)]
    data: Option<Vec<CardDto>>,
    #[serde(default)]
    cards: Option<Vec<CardDto>>,
    #[serde(default, rename = "hasMore")]
    pub has_more: bool,
    #[serde(default, rename = "nextCursor")]
    pub next_cursor: Option<String>,
}

impl CardsEnvelope {
    pub fn len(&self) -> usize {
        self.data.as_ref().or(self.cards.as_ref()).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_cards(self) -> Vec<CardDto> {
        self.data.or(self.cards).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sets_envelope_prefers_data() {
        let json = r#"{"data":[{"id":"sv1","name":"Scarlet","cards_count":10}],"sets":[{"id":"x"}],"hasMore":true,"nextCursor":"c2"}"#;
        let env: SetsEnvelope = serde_json::from_str(json).unwrap();
        assert!(env.has_more);
        assert_eq!(env.next_cursor.as_deref(), Some("c2"));
        let sets = env.into_sets();
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].id, "sv1");
        assert_eq!(sets[0].declared_count(), Some(10));
    }

    #[test]
    fn test_sets_envelope_fallback_key() {
        let json = r#"{"sets":[{"id":"base1","count":102}]}"#;
        let env: SetsEnvelope = serde_json::from_str(json).unwrap();
        assert!(!env.has_more);
        let sets = env.into_sets();
        assert_eq!(sets[0].declared_count(), Some(102));
    }

    #[test]
    fn test_cards_envelope_fallback_and_empty() {
        let env: CardsEnvelope = serde_json::from_str(r#"{"cards":[{"name":"Pikachu"}]}"#).unwrap();
        assert_eq!(env.into_cards().len(), 1);

        let env: CardsEnvelope = serde_json::from_str("{}").unwrap();
        assert!(env.into_cards().is_empty());
    }

    #[test]
    fn test_card_wire_names() {
        let json = r#"{
            "id": "pokemon-sv1-pikachu",
            "name": "Pikachu",
            "set": "sv1",
            "set_name": "Scarlet & Violet",
            "number": "025",
            "tcgplayerId": "12345",
            "rarity": "Common",
            "imageUrl": "https://img/p.png",
            "variants": [
                {"id": "v1", "printing": "Normal", "condition": "Near Mint", "price": 1.5, "lastUpdated": 1700000000},
                {"id": "v2", "printing": "Holofoil", "condition": "Near Mint", "price": null}
            ]
        }"#;
        let card: CardDto = serde_json::from_str(json).unwrap();
        assert_eq!(card.tcgplayer_id.as_deref(), Some("12345"));
        assert_eq!(card.image_url.as_deref(), Some("https://img/p.png"));
        assert_eq!(card.variants.len(), 2);
        assert_eq!(card.variants[0].last_updated, Some(1_700_000_000));
        assert_eq!(card.variants[1].price, None);
    }

    #[test]
    fn test_numeric_tcgplayer_id() {
        let card: CardDto = serde_json::from_str(r#"{"name":"Mew","tcgplayerId":987}"#).unwrap();
        assert_eq!(card.tcgplayer_id.as_deref(), Some("987"));

        let card: CardDto = serde_json::from_str(r#"{"name":"Mew","tcgplayerId":null}"#).unwrap();
        assert_eq!(card.tcgplayer_id, None);
    }

    #[test]
    fn test_games_response_shapes() {
        let list: GamesResponse = serde_json::from_str(r#"[{"id":"pokemon","name":"Pokemon"}]"#).unwrap();
        assert_eq!(list.into_games()[0].id, "pokemon");

        let env: GamesResponse = serde_json::from_str(r#"{"data":[{"id":"yugioh"}]}"#).unwrap();
        assert_eq!(env.into_games()[0].id, "yugioh");
    }

    #[test]
    fn test_numeric_set_and_card_ids() {
        let env: SetsEnvelope = serde_json::from_str(r#"{"data":[{"id":151,"cards_count":165}]}"#).unwrap();
        assert_eq!(env.into_sets()[0].id, "151");

        let card: CardDto = serde_json::from_str(r#"{"id":4021,"name":"Mew","set":"151","number":151}"#).unwrap();
        assert_eq!(card.id.as_deref(), Some("4021"));
        assert_eq!(card.number.as_deref(), Some("151"));

        let games: GamesResponse = serde_json::from_str(r#"[{"id":7}]"#).unwrap();
        assert_eq!(games.into_games()[0].id, "7");

        assert!(serde_json::from_str::<SetDto>(r#"{"id":null}"#).is_err());
        assert!(serde_json::from_str::<SetDto>(r#"{"name":"no id"}"#).is_err());
    }
}
