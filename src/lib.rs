//! tcg-ingest: resumable catalog and price ingestion for trading-card games
//!
//! This crate pulls sets, cards and variant prices for several trading-card games from a
//! rate-limited HTTP API and materializes them into a local Expansion → Set → Card
//! hierarchy. Imports resume from a persisted checkpoint and never duplicate records.

pub mod catalog;
pub mod client;
pub mod config;
pub mod import;
pub mod output;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for tcg-ingest operations
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Request failed: {0}")]
    Fetch(#[from] client::FetchError),

    #[error("Unknown catalog: {0}")]
    UnknownCatalog(String),

    #[error("Catalog {catalog} is already being imported by {owner}")]
    CatalogLocked { catalog: String, owner: String },

    #[error("Could not read local inventory for {catalog}: {source}")]
    Classification {
        catalog: String,
        source: storage::StorageError,
    },

    #[error("Import task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for tcg-ingest operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use catalog::{CardKey, Catalog, PriceSummary};
pub use config::Config;
pub use import::{checkpoint_status, reset_set, start_import, ImportOrchestrator, ImportReport};
pub use state::{FreezeState, ImportPhase};
