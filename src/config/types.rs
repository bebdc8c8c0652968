use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for tcg-ingest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    pub output: OutputConfig,
    #[serde(default, rename = "catalog")]
    pub catalogs: Vec<CatalogEntry>,
}

impl Config {
    /// Looks up a configured catalog by its code
    pub fn catalog(&self, code: &str) -> Option<&CatalogEntry> {
        self.catalogs.iter().find(|c| c.code == code)
    }
}

/// Upstream API access configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the pricing API (e.g. "https://api.justtcg.com/v1")
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Ordered credential ring; the first key is the primary
    pub keys: Vec<String>,

    /// Seconds after the last rotation before the pool falls back to the primary key
    #[serde(rename = "key-cooldown-secs", default = "default_key_cooldown_secs")]
    pub key_cooldown_secs: u64,

    /// Per-request timeout in seconds
    #[serde(
        rename = "request-timeout-secs",
        default = "default_request_timeout_secs"
    )]
    pub request_timeout_secs: u64,

    /// User agent sent with each request
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,
}

/// Pagination, pacing and retry behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// Number of cards requested per page in offset mode
    #[serde(rename = "page-size", default = "default_page_size")]
    pub page_size: u32,

    /// Fixed delay between successful page fetches (milliseconds)
    #[serde(rename = "inter-page-delay-ms", default = "default_inter_page_delay_ms")]
    pub inter_page_delay_ms: u64,

    /// First backoff delay after a failed attempt (milliseconds)
    #[serde(rename = "retry-base-delay-ms", default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Upper bound for the doubling backoff delay (milliseconds)
    #[serde(rename = "retry-max-delay-ms", default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    /// Maximum attempts per page, including the first one
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Consecutive failed pages after which an offset walk gives up
    #[serde(
        rename = "max-consecutive-page-failures",
        default = "default_max_consecutive_page_failures"
    )]
    pub max_consecutive_page_failures: u32,
}

impl FetchConfig {
    pub fn inter_page_delay(&self) -> Duration {
        Duration::from_millis(self.inter_page_delay_ms)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            inter_page_delay_ms: default_inter_page_delay_ms(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            max_attempts: default_max_attempts(),
            max_consecutive_page_failures: default_max_consecutive_page_failures(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// How a catalog's cards are walked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImportMode {
    /// Classify sets and page through each set that needs work
    #[default]
    PerSet,
    /// Page through the whole game's card listing by offset
    CatalogWide,
}

/// A trading-card game to import
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    /// Stable local code (e.g. "pokemon")
    pub code: String,

    /// Upstream game identifier (e.g. "magic-the-gathering")
    #[serde(rename = "game-id")]
    pub game_id: String,

    /// Human readable name
    #[serde(rename = "display-name")]
    pub display_name: Option<String>,

    #[serde(default)]
    pub mode: ImportMode,
}

fn default_key_cooldown_secs() -> u64 {
    3600
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("tcg-ingest/{}", env!("CARGO_PKG_VERSION"))
}

fn default_page_size() -> u32 {
    100
}

fn default_inter_page_delay_ms() -> u64 {
    3000
}

fn default_retry_base_delay_ms() -> u64 {
    5000
}

fn default_retry_max_delay_ms() -> u64 {
    120_000
}

fn default_max_attempts() -> u32 {
    5
}

fn default_max_consecutive_page_failures() -> u32 {
    3
}
