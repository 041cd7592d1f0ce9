//! Service layer for the crawler application.
//!
//! This module contains the source crawlers and the suggestion lookup:
//! - Source capability (`SourceCrawler`) and its registry (`build_sources`)
//! - MangaFox, MangaHere and StarKana crawlers
//! - Paginated chapter retrieval (`Pager`)
//! - AnimePlanet suggestions (`AnimePlanetSuggestions`)
//!
//! Pages are fetched as text and parsed in synchronous helpers, so no
//! `scraper::Html` is ever held across an await point.

mod animeplanet;
mod mangafox;
mod mangahere;
pub mod pager;
mod starkana;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::{AppError, Result};
use crate::models::{Chapter, CrawlSource, Manga};
use crate::utils::http::fetch_text_with_retry;

pub use animeplanet::AnimePlanetSuggestions;
pub use mangafox::MangaFoxCrawler;
pub use mangahere::MangaHereCrawler;
pub use pager::{ChapterOutcome, PageSource, PageWalk, Pager, RetryPolicy};
pub use starkana::{StarKanaCrawler, StarKanaUrlFormatter};

/// Delay between retries of a detail page fetch.
const DETAIL_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Capability of one content source.
#[async_trait]
pub trait SourceCrawler: Send + Sync {
    fn source(&self) -> CrawlSource;

    /// List the whole catalog. Items carry only title, url and source.
    async fn list_catalog(&self) -> Result<Vec<Manga>>;

    /// Enrich `manga` in place and return the chapters listed on its page.
    /// The caller merges them into the persisted chapters.
    ///
    /// Fails with `AppError::NotFound` when the page is absent or unparsable.
    async fn crawl_manga(&self, manga: &mut Manga) -> Result<Vec<Chapter>>;

    /// Fill the chapter's media references. Partial results are kept and
    /// reported through the outcome; fails with `AppError::NotFound` only
    /// when nothing was retrieved.
    async fn crawl_chapter(&self, chapter: &mut Chapter) -> Result<ChapterOutcome>;

    /// List recently updated items.
    async fn list_recently_updated(&self) -> Result<Vec<Manga>>;
}

/// Lookup of recommended titles for a manga.
#[async_trait]
pub trait SuggestionFinder: Send + Sync {
    /// Titles recommended for `manga`. Fails with `AppError::NotFound` when
    /// the manga is unknown to the suggestion source.
    async fn find_suggestions(&self, manga: &Manga) -> Result<Vec<String>>;
}

/// Instantiate the crawlers for the configured sources, in order.
/// Duplicate entries are ignored.
pub fn build_sources(sources: &[CrawlSource], client: &Client) -> Result<Vec<Arc<dyn SourceCrawler>>> {
    let mut seen = HashSet::new();
    let mut crawlers: Vec<Arc<dyn SourceCrawler>> = Vec::with_capacity(sources.len());

    for source in sources {
        if !seen.insert(*source) {
            log::warn!("Source {source} configured twice, ignoring duplicate");
            continue;
        }
        let crawler: Arc<dyn SourceCrawler> = match source {
            CrawlSource::MangaFox => Arc::new(MangaFoxCrawler::new(client.clone())?),
            CrawlSource::MangaHere => Arc::new(MangaHereCrawler::new(client.clone())),
            CrawlSource::StarKana => Arc::new(StarKanaCrawler::new(client.clone())),
        };
        crawlers.push(crawler);
    }
    Ok(crawlers)
}

/// Metadata parsed from a manga detail page.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MangaDetail {
    pub alt_titles: Option<Vec<String>>,
    pub authors: Vec<String>,
    pub artists: Vec<String>,
    pub genres: Vec<String>,
    pub year: Option<i32>,
    pub summary: Option<String>,
    pub thumbnail: Option<String>,
    pub ongoing: Option<bool>,
    pub chapters: Vec<Chapter>,
}

impl MangaDetail {
    /// Copy metadata onto `manga` and hand back the listed chapters.
    pub fn apply(self, manga: &mut Manga) -> Vec<Chapter> {
        manga.authors = self.authors;
        manga.artists = self.artists;
        manga.genres = self.genres;
        if let Some(alt_titles) = self.alt_titles {
            manga.alt_titles = alt_titles;
        }
        if self.year.is_some() {
            manga.year = self.year;
        }
        if self.summary.is_some() {
            manga.summary = self.summary;
        }
        if self.thumbnail.is_some() {
            manga.thumbnail = self.thumbnail;
        }
        if let Some(ongoing) = self.ongoing {
            manga.ongoing = ongoing;
        }
        self.chapters
    }
}

/// Fetch a detail page; exhausted retries become `NotFound` for that unit.
async fn fetch_detail(client: &Client, url: &str) -> Result<String> {
    fetch_text_with_retry(client, url, pager::DEFAULT_ATTEMPTS, DETAIL_RETRY_DELAY)
        .await
        .map_err(|e| {
            log::debug!("Giving up on {url}: {e}");
            AppError::not_found(format!("{url} ({e})"))
        })
}

/// Parse a year cell, logging unparsable values.
fn parse_year(title: &str, raw: &str) -> Option<i32> {
    let raw = raw.trim();
    match raw.parse() {
        Ok(year) => Some(year),
        Err(_) => {
            if !raw.is_empty() {
                log::warn!("Could not read start year for '{title}': '{raw}'");
            }
            None
        }
    }
}

/// Chapter number from a link text that repeats the manga title.
fn chapter_number(link_text: &str, title: &str) -> String {
    if title.is_empty() {
        return link_text.trim().to_string();
    }
    link_text.replace(title, "").trim().to_string()
}
