//! Catalog domain: the Expansion → Set → Card hierarchy and the engines that maintain it
//!
//! - `model`: rows and keys
//! - `price`: `PriceSummary` from upstream variants
//! - `rarity`: rarity normalization
//! - `resolver`: get-or-create of expansions and sets with an in-run cache
//! - `classifier`: which sets need a full or delta fetch
//! - `upsert`: insert-or-refresh of cards

mod classifier;
mod model;
mod price;
mod rarity;
mod resolver;
mod upsert;

pub use classifier::{classify, classify_set, Classification, SetClass};
pub use model::{
    parse_release_date, CardKey, CardSet, Catalog, Expansion, NewCard, SetInventory, SetMetadata,
    StoredCard, UNKNOWN_CARD_NUMBER,
};
pub use price::PriceSummary;
pub use rarity::Rarity;
pub use resolver::{create_or_refetch, CatalogHierarchyResolver, HierarchyCache, MetadataSync};
pub use upsert::{CardUpsertEngine, SkipReason, UpsertOutcome};
