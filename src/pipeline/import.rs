// src/pipeline/import.rs

//! Import orchestration across sources.
//!
//! Sources are processed one after another. Within a source, full and merge
//! imports split the manga ids into a fixed number of shards and run one
//! worker task per shard; the orchestrator waits for them with a bound.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio::time::Instant;

use crate::error::Result;
use crate::models::{Activity, Config, CrawlSource, MAX_POOL_TIMEOUT_HOURS, Manga, MangaId};
use crate::pipeline::merge::{merge_chapters, merge_mangas};
use crate::pipeline::report::{ImportReport, ShardReport, SourceReport, SuggestionReport};
use crate::pipeline::split::split;
use crate::pipeline::worker::{CrawlWorker, crawl_pending_chapters};
use crate::services::{SourceCrawler, SuggestionFinder};
use crate::storage::{ActivityStore, MangaStore};

fn max_pool_timeout() -> Duration {
    Duration::from_secs(MAX_POOL_TIMEOUT_HOURS * 3600)
}

/// Runs imports for a set of sources against one repository.
pub struct Importer {
    sources: Vec<Arc<dyn SourceCrawler>>,
    store: Arc<dyn MangaStore>,
    activities: Arc<dyn ActivityStore>,
    workers: usize,
    pool_timeout: Duration,
    request_delay: Duration,
}

impl Importer {
    pub fn new(
        sources: Vec<Arc<dyn SourceCrawler>>,
        store: Arc<dyn MangaStore>,
        activities: Arc<dyn ActivityStore>,
    ) -> Self {
        let defaults = Config::default();
        Self {
            sources,
            store,
            activities,
            workers: defaults.import.workers,
            pool_timeout: defaults.import.pool_timeout(),
            request_delay: defaults.crawler.request_delay(),
        }
    }

    /// Apply worker count, pool timeout and request delay from configuration.
    pub fn with_config(mut self, config: &Config) -> Self {
        self.workers = config.import.workers.max(1);
        self.pool_timeout = config.import.pool_timeout().min(max_pool_timeout());
        self.request_delay = config.crawler.request_delay();
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Bound the wait for a source's workers, capped at
    /// `MAX_POOL_TIMEOUT_HOURS`.
    pub fn with_pool_timeout(mut self, timeout: Duration) -> Self {
        self.pool_timeout = timeout.min(max_pool_timeout());
        self
    }

    /// Wipe the catalog, then list and crawl every source from scratch.
    pub async fn full_import(&self) -> Result<ImportReport> {
        let mut report = ImportReport::start("full");

        log::info!("Full import: dropping all stored mangas");
        self.store.drop_all().await?;

        for source in &self.sources {
            let mut source_report = SourceReport::new(source.source());
            match self.list_and_store(source.as_ref()).await {
                Ok(ids) => {
                    source_report.listed = ids.len();
                    self.run_pool(source, ids, &mut source_report).await;
                }
                Err(e) => {
                    log::error!("[{}] catalog listing failed: {e}", source.source());
                    source_report.errors.push(format!("list catalog: {e}"));
                }
            }
            report.sources.push(source_report);
        }

        Ok(report.finish())
    }

    /// Crawl every stored manga again with its own source, keeping all
    /// gathered detail. No wipe and no catalog listing.
    pub async fn merge_import(&self) -> Result<ImportReport> {
        let mut report = ImportReport::start("merge");

        let mut by_source: HashMap<CrawlSource, Vec<MangaId>> = HashMap::new();
        let mut cursor = self.store.find_all().await?;
        while let Some(item) = cursor.next().await {
            match item {
                Ok(manga) => {
                    if let Some(id) = manga.id {
                        by_source.entry(manga.source).or_default().push(id);
                    }
                }
                Err(e) => log::warn!("Skipping unreadable manga: {e}"),
            }
        }
        drop(cursor);

        for source in &self.sources {
            let ids = by_source.remove(&source.source()).unwrap_or_default();
            let mut source_report = SourceReport::new(source.source());
            source_report.listed = ids.len();
            self.run_pool(source, ids, &mut source_report).await;
            report.sources.push(source_report);
        }

        for (source, ids) in by_source {
            log::warn!(
                "{} stored mangas from {source} skipped: source not configured",
                ids.len()
            );
        }

        Ok(report.finish())
    }

    /// Crawl recently updated mangas inline, recording new mangas and
    /// newly crawled chapters as activities.
    pub async fn update_import(&self) -> Result<ImportReport> {
        let mut report = ImportReport::start("update");
        for source in &self.sources {
            let source_report = self.update_source(source.as_ref()).await;
            report.sources.push(source_report);
        }
        Ok(report.finish())
    }

    /// Refresh the suggestion titles of every stored manga.
    pub async fn update_suggestions(&self, finder: &dyn SuggestionFinder) -> Result<SuggestionReport> {
        let mut report = SuggestionReport::default();
        let mut cursor = self.store.find_all().await?;

        while let Some(item) = cursor.next().await {
            let mut manga = match item {
                Ok(manga) => manga,
                Err(e) => {
                    report.errors.push(format!("load manga: {e}"));
                    continue;
                }
            };
            report.scanned += 1;

            let titles = match finder.find_suggestions(&manga).await {
                Ok(titles) => titles,
                Err(e) if e.is_not_found() => {
                    log::info!("No suggestions for '{}'", manga.title);
                    report.not_found.push(manga.title);
                    continue;
                }
                Err(e) => {
                    log::warn!("Suggestion lookup failed for '{}': {e}", manga.title);
                    report.errors.push(format!("lookup '{}': {e}", manga.title));
                    continue;
                }
            };

            let known: HashSet<String> = match self.store.find_by_titles(&titles).await {
                Ok(found) => found.into_iter().map(|m| m.title).collect(),
                Err(e) => {
                    report.errors.push(format!("resolve titles for '{}': {e}", manga.title));
                    continue;
                }
            };
            manga.suggestions = titles.into_iter().filter(|t| known.contains(t)).collect();

            match self.store.save(&mut manga).await {
                Ok(()) => report.updated += 1,
                Err(e) => report.errors.push(format!("save '{}': {e}", manga.title)),
            }
            if !self.request_delay.is_zero() {
                tokio::time::sleep(self.request_delay).await;
            }
        }

        report.log_summary();
        Ok(report)
    }

    /// List a source's catalog and persist it, returning the assigned ids.
    async fn list_and_store(&self, source: &dyn SourceCrawler) -> Result<Vec<MangaId>> {
        let mut mangas = merge_mangas(Vec::new(), source.list_catalog().await?);
        self.store.save_all(&mut mangas).await?;
        log::info!("[{}] {} mangas stored", source.source(), mangas.len());
        Ok(mangas.into_iter().filter_map(|m| m.id).collect())
    }

    /// Run one worker task per shard and wait for all of them, at most
    /// until the pool timeout. Late workers are left running.
    async fn run_pool(
        &self,
        source: &Arc<dyn SourceCrawler>,
        ids: Vec<MangaId>,
        report: &mut SourceReport,
    ) {
        let shards = split(ids, self.workers);
        log::info!(
            "[{}] starting {} workers for {} mangas",
            source.source(),
            shards.len(),
            report.listed
        );

        let mut pending: FuturesUnordered<_> = shards
            .into_iter()
            .enumerate()
            .map(|(shard, ids)| {
                let worker =
                    CrawlWorker::new(shard, ids, Arc::clone(source), Arc::clone(&self.store))
                        .with_request_delay(self.request_delay);
                tokio::spawn(worker.run())
            })
            .collect();

        let deadline = Instant::now() + self.pool_timeout;
        loop {
            match tokio::time::timeout_at(deadline, pending.next()).await {
                Ok(Some(Ok(shard))) => report.shards.push(shard),
                Ok(Some(Err(e))) => {
                    log::error!("[{}] worker task failed: {e}", source.source());
                    report.errors.push(format!("worker task failed: {e}"));
                }
                Ok(None) => break,
                Err(_) => {
                    report.timed_out_shards = pending.len();
                    log::error!(
                        "[{}] pool timeout of {:?} elapsed, {} workers still running",
                        source.source(),
                        self.pool_timeout,
                        pending.len()
                    );
                    break;
                }
            }
        }

        report.shards.sort_by_key(|s| s.shard);
    }

    async fn update_source(&self, source: &dyn SourceCrawler) -> SourceReport {
        let mut report = SourceReport::new(source.source());

        let recent = match source.list_recently_updated().await {
            Ok(recent) => merge_mangas(Vec::new(), recent),
            Err(e) => {
                log::error!("[{}] recent updates listing failed: {e}", source.source());
                report.errors.push(format!("list recent updates: {e}"));
                return report;
            }
        };
        report.listed = recent.len();

        let urls: Vec<String> = recent.iter().map(|m| m.url.clone()).collect();
        let mut persisted: HashMap<String, Manga> = match self.store.find_by_urls(&urls).await {
            Ok(found) => found.into_iter().map(|m| (m.url.clone(), m)).collect(),
            Err(e) => {
                report.errors.push(format!("find by urls: {e}"));
                return report;
            }
        };

        let mut shard = ShardReport::new(0, recent.len());
        let mut activities = Vec::new();
        let mut updated = Vec::new();

        for fresh in recent {
            let (mut manga, is_new) = match persisted.remove(&fresh.url) {
                Some(existing) => (existing, false),
                None => (fresh, true),
            };
            let crawled_before: HashSet<String> = manga
                .chapters
                .iter()
                .filter(|c| c.has_images())
                .map(|c| c.number.clone())
                .collect();

            match source.crawl_manga(&mut manga).await {
                Ok(chapters) => {
                    let known = std::mem::take(&mut manga.chapters);
                    manga.chapters = merge_chapters(known, chapters);
                    shard.detailed += 1;
                }
                Err(e) => {
                    log::warn!("Detail crawl failed for '{}': {e}", manga.title);
                    shard.manga_failures.push(manga.title.clone());
                    continue;
                }
            }
            crawl_pending_chapters(source, &mut manga, self.request_delay, &mut shard).await;

            let id = manga.assign_identity();
            if is_new {
                activities.push(Activity::new_manga(id.clone()));
            }
            activities.extend(
                manga
                    .chapters
                    .iter()
                    .filter(|c| c.has_images() && !crawled_before.contains(&c.number))
                    .map(|c| Activity::new_chapter(id.clone(), c.number.clone())),
            );
            updated.push(manga);
        }

        // Activities only point at mangas that made it to the store.
        match self.store.save_all(&mut updated).await {
            Ok(()) => match self.activities.append(&activities).await {
                Ok(()) => report.activities = activities.len(),
                Err(e) => report.errors.push(format!("append activities: {e}")),
            },
            Err(e) => {
                log::error!(
                    "[{}] saving {} updated mangas failed, dropping {} activities: {e}",
                    source.source(),
                    updated.len(),
                    activities.len()
                );
                report.errors.push(format!("save {} updated mangas: {e}", updated.len()));
            }
        }

        report.shards.push(shard);
        report
    }
}
