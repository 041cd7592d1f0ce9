// src/services/pager.rs

//! Paginated media retrieval with bounded retries.
//!
//! Chapter readers serve one image per page. The first page is fetched by
//! the caller (it also yields the page count), so walking starts at page 2.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Total attempts per page index used by every built-in source.
pub const DEFAULT_ATTEMPTS: u32 = 5;

/// How a page index is retried before it is abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Fetch failures and missing content share one attempt counter.
    /// Exhausting it abandons the index and stops the walk.
    Unified { attempts: u32, delay: Duration },

    /// Only fetch failures are retried; exhausting them stops the walk.
    /// A page without content is skipped and the walk continues.
    NetworkOnly { attempts: u32, delay: Duration },
}

impl RetryPolicy {
    pub const fn unified() -> Self {
        Self::Unified {
            attempts: DEFAULT_ATTEMPTS,
            delay: Duration::from_millis(500),
        }
    }

    pub const fn network_only() -> Self {
        Self::NetworkOnly {
            attempts: DEFAULT_ATTEMPTS,
            delay: Duration::from_millis(100),
        }
    }

    fn attempts(&self) -> u32 {
        match *self {
            Self::Unified { attempts, .. } | Self::NetworkOnly { attempts, .. } => attempts.max(1),
        }
    }

    fn delay(&self) -> Duration {
        match *self {
            Self::Unified { delay, .. } | Self::NetworkOnly { delay, .. } => delay,
        }
    }
}

/// One chapter's pages, as seen by the retriever.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch the body of the page at `index` (1-based).
    async fn fetch_page(&self, index: u32) -> Result<String>;

    /// Extract the media reference from a page body, if present.
    fn extract(&self, body: &str) -> Option<String>;
}

/// Result of walking a chapter's pages. Partial results are kept.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PageWalk {
    pub images: Vec<String>,
    /// Index whose retry budget ran out, ending the walk early
    pub abandoned_at: Option<u32>,
    /// Indexes skipped because they carried no content
    pub skipped: Vec<u32>,
}

impl PageWalk {
    pub fn is_complete(&self) -> bool {
        self.abandoned_at.is_none() && self.skipped.is_empty()
    }

    /// Split into the retrieved images and how far the walk got.
    pub fn into_parts(self) -> (Vec<String>, ChapterOutcome) {
        let outcome = if self.is_complete() {
            ChapterOutcome::Complete
        } else {
            ChapterOutcome::Partial {
                stopped_at: self.abandoned_at,
                skipped: self.skipped,
            }
        };
        (self.images, outcome)
    }
}

/// How much of a chapter a successful crawl retrieved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ChapterOutcome {
    #[default]
    Complete,

    /// Some pages are missing: the walk stopped early, or skipped pages
    /// without content.
    Partial {
        stopped_at: Option<u32>,
        skipped: Vec<u32>,
    },
}

impl ChapterOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

impl fmt::Display for ChapterOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Complete => f.write_str("complete"),
            Self::Partial { stopped_at, skipped } => {
                let mut parts = Vec::new();
                if let Some(index) = stopped_at {
                    parts.push(format!("stopped at page {index}"));
                }
                if !skipped.is_empty() {
                    let pages: Vec<String> = skipped.iter().map(u32::to_string).collect();
                    parts.push(format!("skipped pages {}", pages.join(",")));
                }
                f.write_str(&parts.join(", "))
            }
        }
    }
}

/// Bounded-retry walk over pages `2..=page_count`.
#[derive(Debug, Clone, Copy)]
pub struct Pager {
    policy: RetryPolicy,
}

impl Pager {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Walk pages after the first. `first` is the media reference already
    /// extracted from page 1.
    pub async fn walk(
        &self,
        pages: &dyn PageSource,
        first: Option<String>,
        page_count: u32,
    ) -> PageWalk {
        let mut walk = PageWalk::default();
        walk.images.extend(first);

        let attempts = self.policy.attempts();
        let delay = self.policy.delay();

        'pages: for index in 2..=page_count {
            let mut attempt = 1;
            loop {
                match pages.fetch_page(index).await {
                    Ok(body) => match (pages.extract(&body), self.policy) {
                        (Some(image), _) => {
                            walk.images.push(image);
                            continue 'pages;
                        }
                        (None, RetryPolicy::NetworkOnly { .. }) => {
                            log::warn!("Page {index} has no image, skipping");
                            walk.skipped.push(index);
                            continue 'pages;
                        }
                        (None, RetryPolicy::Unified { .. }) => {
                            log::warn!("Page {index} has no image (attempt {attempt}/{attempts})");
                        }
                    },
                    Err(e) => {
                        log::warn!("Page {index} fetch failed (attempt {attempt}/{attempts}): {e}");
                    }
                }

                if attempt >= attempts {
                    log::warn!("Abandoning page {index} of {page_count}");
                    walk.abandoned_at = Some(index);
                    break 'pages;
                }
                attempt += 1;
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }

        walk
    }
}
