//! Lazy pagination over the upstream listings
//!
//! Sets are listed by cursor (`nextCursor` while `hasMore`); cards are listed by offset and
//! the walk ends at the first empty page. Each yielded `PageResult` carries the request that
//! produced it so the importer can checkpoint exactly where it is.

use std::fmt;

use super::fetcher::{Page, RateLimitedFetcher};
use super::models::{CardDto, SetDto};
use super::FetchResult;

/// What a card listing is filtered by
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardScope {
    /// Every card of an upstream game
    Game(String),
    /// Every card of one upstream set
    Set(String),
}

/// One page to request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageRequest {
    Sets {
        game: String,
        cursor: Option<String>,
    },
    Cards {
        scope: CardScope,
        offset: u32,
        limit: u32,
    },
}

impl PageRequest {
    /// First page of a game's set listing
    pub fn first_sets(game: impl Into<String>) -> Self {
        Self::Sets {
            game: game.into(),
            cursor: None,
        }
    }

    pub fn cards(scope: CardScope, offset: u32, limit: u32) -> Self {
        Self::Cards {
            scope,
            offset,
            limit,
        }
    }

    /// Path segment appended to the API base URL
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::Sets { .. } => "sets",
            Self::Cards { .. } => "cards",
        }
    }

    /// Query parameters for the request
    pub fn query(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::Sets { game, cursor } => {
                let mut query = vec![("game", game.clone())];
                if let Some(cursor) = cursor {
                    query.push(("cursor", cursor.clone()));
                }
                query
            }
            Self::Cards {
                scope,
                offset,
                limit,
            } => {
                let filter = match scope {
                    CardScope::Game(game) => ("game", game.clone()),
                    CardScope::Set(set) => ("set", set.clone()),
                };
                vec![filter, ("limit", limit.to_string()), ("offset", offset.to_string())]
            }
        }
    }

    /// Offset of a card request; `None` for set listings
    pub fn offset(&self) -> Option<u32> {
        match self {
            Self::Cards { offset, .. } => Some(*offset),
            Self::Sets { .. } => None,
        }
    }

    /// Offset of the page after this one; `None` for set listings
    pub fn next_offset(&self) -> Option<u32> {
        match self {
            Self::Cards { offset, limit, .. } => Some(offset.saturating_add(*limit)),
            Self::Sets { .. } => None,
        }
    }
}

impl fmt::Display for PageRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sets { game, cursor } => match cursor {
                Some(cursor) => write!(f, "sets of {} (cursor {})", game, cursor),
                None => write!(f, "sets of {}", game),
            },
            Self::Cards {
                scope,
                offset,
                limit,
            } => {
                let (kind, id) = match scope {
                    CardScope::Game(game) => ("game", game),
                    CardScope::Set(set) => ("set", set),
                };
                write!(f, "cards of {} {} [{}..+{}]", kind, id, offset, limit)
            }
        }
    }
}

/// A page together with the request that produced it
#[derive(Debug, Clone)]
pub struct PageResult {
    pub request: PageRequest,
    pub outcome: FetchResult<Page>,
}

impl PageResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Cards on a successful card page
    pub fn into_cards(self) -> FetchResult<Vec<CardDto>> {
        self.outcome.map(|page| match page {
            Page::Cards(env) => env.into_cards(),
            Page::Sets(_) => Vec::new(),
        })
    }

    /// Sets on a successful set page
    pub fn into_sets(self) -> FetchResult<Vec<SetDto>> {
        self.outcome.map(|page| match page {
            Page::Sets(env) => env.into_sets(),
            Page::Cards(_) => Vec::new(),
        })
    }
}

/// Lazy, finite walk over one listing
pub struct Paginator<'a> {
    fetcher: &'a RateLimitedFetcher,
    next: Option<PageRequest>,
    max_consecutive_failures: u32,
    consecutive_failures: u32,
    previous_succeeded: bool,
}

impl<'a> Paginator<'a> {
    /// Starts a walk at `start`; offset walks stop after `max_consecutive_failures` failed pages
    pub fn new(fetcher: &'a RateLimitedFetcher, start: PageRequest, max_consecutive_failures: u32) -> Self {
        Self {
            fetcher,
            next: Some(start),
            max_consecutive_failures: max_consecutive_failures.max(1),
            consecutive_failures: 0,
            previous_succeeded: false,
        }
    }

    /// Walks a game's sets by cursor
    pub fn sets(fetcher: &'a RateLimitedFetcher, game: &str) -> Self {
        Self::new(fetcher, PageRequest::first_sets(game), 1)
    }

    /// Fetches the next page, or `None` when the walk is over
    ///
    /// Empty card pages end the walk and are not yielded.
    pub async fn next_page(&mut self) -> Option<PageResult> {
        let request = self.next.take()?;

        if self.previous_succeeded {
            self.fetcher.pause_between_pages().await;
        }

        let outcome = self.fetcher.fetch(&request).await;
        self.previous_succeeded = outcome.is_ok();

        match (&request, &outcome) {
            (PageRequest::Sets { game, cursor }, Ok(Page::Sets(env))) => {
                self.next = match &env.next_cursor {
                    Some(next) if env.has_more && !next.is_empty() => {
                        if cursor.as_deref() == Some(next.as_str()) {
                            tracing::warn!("Cursor {} repeated for {}, stopping", next, game);
                            None
                        } else {
                            Some(PageRequest::Sets {
                                game: game.clone(),
                                cursor: Some(next.clone()),
                            })
                        }
                    }
                    _ => None,
                };
            }
            (PageRequest::Cards { scope, limit, .. }, Ok(page)) => {
                if page.is_empty() {
                    return None;
                }
                self.consecutive_failures = 0;
                self.next = request.next_offset().map(|offset| PageRequest::Cards {
                    scope: scope.clone(),
                    offset,
                    limit: *limit,
                });
            }
            (PageRequest::Cards { scope, limit, .. }, Err(error)) => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.max_consecutive_failures {
                    tracing::warn!(
                        "Stopping {} after {} consecutive failed pages: {}",
                        request,
                        self.consecutive_failures,
                        error
                    );
                } else {
                    self.next = request.next_offset().map(|offset| PageRequest::Cards {
                        scope: scope.clone(),
                        offset,
                        limit: *limit,
                    });
                }
            }
            // No cursor to continue from after a failed or mismatched set page.
            (PageRequest::Sets { .. }, _) => {}
        }

        Some(PageResult { request, outcome })
    }
}
