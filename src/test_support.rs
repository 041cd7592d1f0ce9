//! Scripted source, suggestion and storage fakes for tests.

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::{Chapter, CrawlSource, Manga, MangaId};
use crate::services::{ChapterOutcome, SourceCrawler, SuggestionFinder};
use crate::storage::{LocalStorage, MangaCursor, MangaStore};

/// A source answering from in-memory pages. Unknown urls are `NotFound`.
pub struct FakeSource {
    source: CrawlSource,
    catalog: Vec<Manga>,
    recent: Vec<Manga>,
    details: HashMap<String, Vec<Chapter>>,
    pages: HashMap<String, Vec<String>>,
    stopped_at: HashMap<String, u32>,
    detail_calls: AtomicUsize,
    chapter_calls: AtomicUsize,
}

impl FakeSource {
    pub fn new(source: CrawlSource) -> Self {
        Self {
            source,
            catalog: Vec::new(),
            recent: Vec::new(),
            details: HashMap::new(),
            pages: HashMap::new(),
            stopped_at: HashMap::new(),
            detail_calls: AtomicUsize::new(0),
            chapter_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_catalog(mut self, title: &str, url: &str) -> Self {
        self.catalog.push(Manga::new(title, url, self.source));
        self
    }

    pub fn with_recent(mut self, title: &str, url: &str) -> Self {
        self.recent.push(Manga::new(title, url, self.source));
        self
    }

    pub fn with_detail(mut self, url: &str, chapters: Vec<Chapter>) -> Self {
        self.details.insert(url.to_string(), chapters);
        self
    }

    pub fn with_pages(mut self, chapter_url: &str, images: &[&str]) -> Self {
        self.pages.insert(
            chapter_url.to_string(),
            images.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    /// Pages of a chapter whose walk stops at `stopped_at`.
    pub fn with_partial_pages(mut self, chapter_url: &str, images: &[&str], stopped_at: u32) -> Self {
        self.stopped_at.insert(chapter_url.to_string(), stopped_at);
        self.with_pages(chapter_url, images)
    }

    pub fn detail_calls(&self) -> usize {
        self.detail_calls.load(Ordering::SeqCst)
    }

    pub fn chapter_calls(&self) -> usize {
        self.chapter_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceCrawler for FakeSource {
    fn source(&self) -> CrawlSource {
        self.source
    }

    async fn list_catalog(&self) -> Result<Vec<Manga>> {
        Ok(self.catalog.clone())
    }

    async fn crawl_manga(&self, manga: &mut Manga) -> Result<Vec<Chapter>> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        let chapters = self
            .details
            .get(&manga.url)
            .ok_or_else(|| AppError::not_found(manga.url.clone()))?;
        manga.summary = Some(format!("About {}", manga.title));
        Ok(chapters.clone())
    }

    async fn crawl_chapter(&self, chapter: &mut Chapter) -> Result<ChapterOutcome> {
        self.chapter_calls.fetch_add(1, Ordering::SeqCst);
        match self.pages.get(&chapter.url) {
            Some(images) if !images.is_empty() => {
                chapter.set_image_urls(images.clone());
                Ok(match self.stopped_at.get(&chapter.url) {
                    Some(&index) => ChapterOutcome::Partial {
                        stopped_at: Some(index),
                        skipped: Vec::new(),
                    },
                    None => ChapterOutcome::Complete,
                })
            }
            _ => Err(AppError::not_found(chapter.url.clone())),
        }
    }

    async fn list_recently_updated(&self) -> Result<Vec<Manga>> {
        Ok(self.recent.clone())
    }
}

/// Suggestions keyed by manga title. Unknown titles are `NotFound`.
#[derive(Default)]
pub struct FakeSuggestions {
    titles: HashMap<String, Vec<String>>,
}

impl FakeSuggestions {
    pub fn with(mut self, title: &str, suggestions: &[&str]) -> Self {
        self.titles.insert(
            title.to_string(),
            suggestions.iter().map(|s| s.to_string()).collect(),
        );
        self
    }
}

#[async_trait]
impl SuggestionFinder for FakeSuggestions {
    async fn find_suggestions(&self, manga: &Manga) -> Result<Vec<String>> {
        self.titles
            .get(&manga.title)
            .cloned()
            .ok_or_else(|| AppError::not_found(manga.title.clone()))
    }
}

/// `LocalStorage` whose writes fail for chosen titles, or for every batch.
pub struct FailingStore {
    inner: LocalStorage,
    failing_titles: HashSet<String>,
    failing_batches: bool,
}

impl FailingStore {
    pub fn new(inner: LocalStorage) -> Self {
        Self {
            inner,
            failing_titles: HashSet::new(),
            failing_batches: false,
        }
    }

    /// Make `save` fail for the manga titled `title`.
    pub fn failing_save(mut self, title: &str) -> Self {
        self.failing_titles.insert(title.to_string());
        self
    }

    /// Make every `save_all` fail.
    pub fn failing_batches(mut self) -> Self {
        self.failing_batches = true;
        self
    }

    fn disk_full() -> AppError {
        AppError::Io(io::Error::other("disk full"))
    }
}

#[async_trait]
impl MangaStore for FailingStore {
    async fn save(&self, manga: &mut Manga) -> Result<()> {
        if self.failing_titles.contains(&manga.title) {
            return Err(Self::disk_full());
        }
        self.inner.save(manga).await
    }

    async fn save_all(&self, mangas: &mut [Manga]) -> Result<()> {
        if self.failing_batches {
            return Err(Self::disk_full());
        }
        self.inner.save_all(mangas).await
    }

    async fn find_by_urls(&self, urls: &[String]) -> Result<Vec<Manga>> {
        self.inner.find_by_urls(urls).await
    }

    async fn find_by_titles(&self, titles: &[String]) -> Result<Vec<Manga>> {
        self.inner.find_by_titles(titles).await
    }

    async fn browse(&self, ids: &[MangaId]) -> Result<MangaCursor> {
        self.inner.browse(ids).await
    }

    async fn find_all(&self) -> Result<MangaCursor> {
        self.inner.find_all().await
    }

    async fn drop_all(&self) -> Result<()> {
        self.inner.drop_all().await
    }

    async fn count(&self) -> Result<usize> {
        self.inner.count().await
    }
}
