//! Upstream API client
//!
//! This module handles everything between the importer and the remote catalog API:
//! - `ApiKeyPool`: the shared, rotating set of API keys
//! - `RetryState`: bounded exponential backoff with an injectable `Sleeper`
//! - `RateLimitedFetcher`: one HTTP request per page, classified and retried
//! - `Paginator`: lazy cursor and offset walks over `PageRequest`s
//! - `models`: wire types for games, sets, cards and variants

mod fetcher;
pub mod key_pool;
pub mod models;
mod pagination;
pub mod retry;

use thiserror::Error;

pub use fetcher::{build_http_client, Page, RateLimitedFetcher};
pub use key_pool::{ApiKeyPool, DEFAULT_KEY_COOLDOWN};
pub use models::{CardDto, GameDto, SetDto, VariantDto};
pub use pagination::{CardScope, PageRequest, PageResult, Paginator};
pub use retry::{
    FailureKind, RecordingSleeper, RetryDecision, RetryPolicy, RetryState, Sleeper, TokioSleeper,
};

/// Page-level failure taxonomy
///
/// Only `RateLimited` and `Transient` are retried. Whatever the fetcher finally returns is
/// what the importer records for the page.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    #[error("Rate limited (HTTP 429)")]
    RateLimited,

    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Request failed (status {status:?}): {message}")]
    Fatal { status: Option<u16>, message: String },

    #[error("Could not parse response: {0}")]
    Parse(String),
}

impl FetchError {
    /// Maps the error to a retryable failure kind, if it is one
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::RateLimited => Some(FailureKind::RateLimited),
            Self::Transient(_) => Some(FailureKind::Transient),
            Self::Fatal { .. } | Self::Parse(_) => None,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. } | Self::Parse(_))
    }
}

/// Result type alias for fetch operations
pub type FetchResult<T> = std::result::Result<T, FetchError>;
