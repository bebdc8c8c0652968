//! HTTP fetcher implementation
//!
//! One logical request per page. Each attempt is classified:
//!
//! | Response | Classification |
//! |----------|----------------|
//! | 2xx, parseable | Page |
//! | 2xx, unparseable | Parse (fatal) |
//! | 429 | RateLimited: rotate key, back off, retry |
//! | 5xx, timeout, connect failure | Transient: back off, retry |
//! | other | Fatal |
//!
//! Rate-limit retries stop once every key in the pool has answered 429 for the request.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use super::key_pool::ApiKeyPool;
use super::models::{CardsEnvelope, GameDto, GamesResponse, SetsEnvelope};
use super::pagination::PageRequest;
use super::retry::{RetryDecision, RetryPolicy, RetryState, Sleeper, TokioSleeper};
use super::{FetchError, FetchResult};
use crate::config::{ApiConfig, Config};

/// Header carrying the active API key
const API_KEY_HEADER: &str = "x-api-key";

/// A successfully fetched and parsed page
#[derive(Debug, Clone)]
pub enum Page {
    Sets(SetsEnvelope),
    Cards(CardsEnvelope),
}

impl Page {
    /// Number of records on the page
    pub fn len(&self) -> usize {
        match self {
            Self::Sets(env) => env.len(),
            Self::Cards(env) => env.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Builds an HTTP client with proper configuration
pub fn build_http_client(config: &ApiConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches pages from the upstream API with key rotation and bounded retry
pub struct RateLimitedFetcher {
    http: Client,
    base_url: Url,
    keys: Arc<ApiKeyPool>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    inter_page_delay: Duration,
}

impl RateLimitedFetcher {
    pub fn new(
        http: Client,
        base_url: Url,
        keys: Arc<ApiKeyPool>,
        policy: RetryPolicy,
        sleeper: Arc<dyn Sleeper>,
        inter_page_delay: Duration,
    ) -> Self {
        Self {
            http,
            base_url,
            keys,
            policy,
            sleeper,
            inter_page_delay,
        }
    }

    /// Builds a fetcher from the loaded configuration, sharing `keys`
    pub fn from_config(config: &Config, keys: Arc<ApiKeyPool>) -> crate::Result<Self> {
        let base_url = Url::parse(&config.api.base_url)
            .map_err(|e| crate::ConfigError::InvalidUrl(format!("{}: {}", config.api.base_url, e)))?;
        let http = build_http_client(&config.api)?;

        Ok(Self::new(
            http,
            base_url,
            keys,
            RetryPolicy::from(&config.fetch),
            Arc::new(TokioSleeper),
            config.fetch.inter_page_delay(),
        ))
    }

    /// Replaces the sleeper used for backoff and inter-page pauses
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn key_pool(&self) -> &Arc<ApiKeyPool> {
        &self.keys
    }

    /// Fixed pause applied between successful page fetches
    pub async fn pause_between_pages(&self) {
        if !self.inter_page_delay.is_zero() {
            self.sleeper.sleep(self.inter_page_delay).await;
        }
    }

    /// Fetches one page
    pub async fn fetch(&self, request: &PageRequest) -> FetchResult<Page> {
        let query = request.query();
        match request {
            PageRequest::Sets { .. } => self
                .get_json::<SetsEnvelope>(request.endpoint(), &query)
                .await
                .map(Page::Sets),
            PageRequest::Cards { .. } => self
                .get_json::<CardsEnvelope>(request.endpoint(), &query)
                .await
                .map(Page::Cards),
        }
    }

    /// Lists the games the upstream knows about
    pub async fn fetch_games(&self) -> FetchResult<Vec<GameDto>> {
        self.get_json::<GamesResponse>("games", &[])
            .await
            .map(GamesResponse::into_games)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&'static str, String)],
    ) -> FetchResult<T> {
        let url = self.endpoint_url(endpoint)?;
        let mut retry = RetryState::new(self.policy, self.keys.len());

        loop {
            self.keys.maybe_revert_to_primary();
            let key = self.keys.current_key();

            let error = match self.attempt(&url, query, &key).await {
                Ok(body) => {
                    return serde_json::from_str::<T>(&body).map_err(|e| {
                        tracing::warn!("Unparseable response from {}: {}", url, e);
                        FetchError::Parse(e.to_string())
                    });
                }
                Err(error) => error,
            };

            let Some(kind) = error.failure_kind() else {
                tracing::warn!("Request to {} failed: {}", url, error);
                return Err(error);
            };

            match retry.on_failure(kind) {
                RetryDecision::Retry { delay, rotate_key } => {
                    tracing::debug!(
                        "Attempt {} for {} failed ({}), retrying in {:?}",
                        retry.attempts(),
                        url,
                        error,
                        delay
                    );
                    if rotate_key {
                        self.keys.rotate();
                    }
                    self.sleeper.sleep(delay).await;
                }
                RetryDecision::GiveUp => {
                    tracing::warn!(
                        "Giving up on {} after {} attempts: {}",
                        url,
                        retry.attempts(),
                        error
                    );
                    return Err(match error {
                        FetchError::RateLimited => FetchError::Fatal {
                            status: Some(StatusCode::TOO_MANY_REQUESTS.as_u16()),
                            message: format!(
                                "rate limited on all {} API keys",
                                retry.rate_limit_hits()
                            ),
                        },
                        other => other,
                    });
                }
            }
        }
    }

    /// Sends a single GET and classifies the outcome
    async fn attempt(
        &self,
        url: &Url,
        query: &[(&'static str, String)],
        key: &str,
    ) -> FetchResult<String> {
        let response = self
            .http
            .get(url.clone())
            .query(query)
            .header(API_KEY_HEADER, key)
            .send()
            .await
            .map_err(classify_send_error)?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited);
        }

        if status.is_server_error() {
            return Err(FetchError::Transient(format!("HTTP {}", status.as_u16())));
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(FetchError::Fatal {
                status: Some(status.as_u16()),
                message: truncate(&message, 200),
            });
        }

        response
            .text()
            .await
            .map_err(|e| FetchError::Transient(format!("failed to read body: {}", e)))
    }

    fn endpoint_url(&self, endpoint: &str) -> FetchResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| FetchError::Fatal {
                status: None,
                message: format!("base URL {} cannot carry a path", self.base_url),
            })?
            .pop_if_empty()
            .push(endpoint);
        Ok(url)
    }
}

fn classify_send_error(error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Transient("request timeout".to_string())
    } else if error.is_connect() {
        FetchError::Transient(format!("connection failed: {}", error))
    } else if error.is_builder() {
        FetchError::Fatal {
            status: None,
            message: error.to_string(),
        }
    } else {
        FetchError::Transient(error.to_string())
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
