// src/pipeline/worker.rs

//! Shard worker: detail crawl, then chapter crawl, persisting as it goes.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::Serialize;

use crate::models::{Manga, MangaId};
use crate::pipeline::merge::merge_chapters;
use crate::pipeline::report::ShardReport;
use crate::services::SourceCrawler;
use crate::storage::MangaStore;

/// Lifecycle of a worker. Transitions only move forward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    #[default]
    Idle,
    DetailCrawl,
    ChapterCrawl,
    Done,
}

/// Crawls the mangas of one shard.
pub struct CrawlWorker {
    ids: Vec<MangaId>,
    source: Arc<dyn SourceCrawler>,
    store: Arc<dyn MangaStore>,
    request_delay: Duration,
    report: ShardReport,
}

impl CrawlWorker {
    pub fn new(
        shard: usize,
        ids: Vec<MangaId>,
        source: Arc<dyn SourceCrawler>,
        store: Arc<dyn MangaStore>,
    ) -> Self {
        let report = ShardReport::new(shard, ids.len());
        Self {
            ids,
            source,
            store,
            request_delay: Duration::ZERO,
            report,
        }
    }

    /// Pause between chapter requests.
    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    /// Run both phases to completion. Failures end up in the report,
    /// whose `state` is `Done` on return.
    pub async fn run(mut self) -> ShardReport {
        if self.ids.is_empty() {
            self.enter(WorkerState::Done);
            return self.report;
        }
        log::debug!(
            "[{}] shard {} starting with {} mangas",
            self.source.source(),
            self.report.shard,
            self.ids.len()
        );

        self.enter(WorkerState::DetailCrawl);
        let failed = self.detail_crawl().await;

        self.enter(WorkerState::ChapterCrawl);
        self.chapter_crawl(&failed).await;

        self.enter(WorkerState::Done);
        log::info!(
            "[{}] shard {} done: {} detailed, {} skipped, {} chapters",
            self.source.source(),
            self.report.shard,
            self.report.detailed,
            self.report.skipped,
            self.report.chapters_crawled
        );
        self.report
    }

    /// Crawl details of every owned manga that has no chapters yet.
    /// Returns the ids whose detail crawl failed.
    async fn detail_crawl(&mut self) -> HashSet<MangaId> {
        let mut failed = HashSet::new();
        let mut cursor = match self.store.browse(&self.ids).await {
            Ok(cursor) => cursor,
            Err(e) => {
                self.record_error(format!("browse for detail crawl: {e}"));
                return failed;
            }
        };

        let mut detailed = Vec::new();
        while let Some(item) = cursor.next().await {
            let mut manga = match item {
                Ok(manga) => manga,
                Err(e) => {
                    self.record_error(format!("load manga: {e}"));
                    continue;
                }
            };

            if manga.is_detailed() {
                self.report.skipped += 1;
                continue;
            }

            match self.source.crawl_manga(&mut manga).await {
                Ok(chapters) => {
                    let persisted = std::mem::take(&mut manga.chapters);
                    manga.chapters = merge_chapters(persisted, chapters);
                    self.report.detailed += 1;
                    detailed.push(manga);
                }
                Err(e) => {
                    log::warn!("Detail crawl failed for '{}': {e}", manga.title);
                    self.report.manga_failures.push(manga.title.clone());
                    if let Some(id) = manga.id {
                        failed.insert(id);
                    }
                }
            }
        }
        drop(cursor);

        if !detailed.is_empty() {
            if let Err(e) = self.store.save_all(&mut detailed).await {
                self.record_error(format!("save {} detailed mangas: {e}", detailed.len()));
            }
        }
        failed
    }

    /// Crawl pending chapters of every owned manga, saving each manga
    /// once its chapters are done.
    async fn chapter_crawl(&mut self, failed: &HashSet<MangaId>) {
        let ids: Vec<MangaId> = self
            .ids
            .iter()
            .filter(|id| !failed.contains(*id))
            .cloned()
            .collect();

        let mut cursor = match self.store.browse(&ids).await {
            Ok(cursor) => cursor,
            Err(e) => {
                self.record_error(format!("browse for chapter crawl: {e}"));
                return;
            }
        };

        while let Some(item) = cursor.next().await {
            let mut manga = match item {
                Ok(manga) => manga,
                Err(e) => {
                    self.record_error(format!("load manga: {e}"));
                    continue;
                }
            };
            if manga.pending_chapters() == 0 {
                continue;
            }

            crawl_pending_chapters(
                self.source.as_ref(),
                &mut manga,
                self.request_delay,
                &mut self.report,
            )
            .await;

            if let Err(e) = self.store.save(&mut manga).await {
                self.record_error(format!("save '{}': {e}", manga.title));
            }
        }
    }

    fn enter(&mut self, state: WorkerState) {
        debug_assert!(state >= self.report.state);
        log::debug!(
            "[{}] shard {}: {:?} -> {:?}",
            self.source.source(),
            self.report.shard,
            self.report.state,
            state
        );
        self.report.state = state;
    }

    fn record_error(&mut self, message: String) {
        log::error!(
            "[{}] shard {}: {message}",
            self.source.source(),
            self.report.shard
        );
        self.report.errors.push(message);
    }
}

/// Crawl every chapter of `manga` with missing media, in order.
/// Chapter failures are recorded and do not stop the siblings. Chapters
/// kept with missing pages are flagged partial so a later crawl retries them.
pub(crate) async fn crawl_pending_chapters(
    source: &dyn SourceCrawler,
    manga: &mut Manga,
    delay: Duration,
    report: &mut ShardReport,
) {
    let mut chapters = std::mem::take(&mut manga.chapters);

    for chapter in chapters.iter_mut().filter(|c| c.needs_crawl()) {
        match source.crawl_chapter(chapter).await {
            Ok(outcome) => {
                report.chapters_crawled += 1;
                chapter.set_partial(!outcome.is_complete());
                if !outcome.is_complete() {
                    log::warn!(
                        "Chapter {} of '{}' is incomplete: {outcome}",
                        chapter.number,
                        manga.title
                    );
                    report
                        .incomplete_chapters
                        .push(format!("{} #{} ({outcome})", manga.title, chapter.number));
                }
            }
            Err(e) => {
                log::warn!(
                    "Chapter {} of '{}' failed: {e}",
                    chapter.number,
                    manga.title
                );
                report
                    .chapter_failures
                    .push(format!("{} #{}", manga.title, chapter.number));
            }
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    manga.chapters = chapters;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chapter, CrawlSource};
    use crate::storage::LocalStorage;
    use crate::test_support::{FailingStore, FakeSource};
    use futures::TryStreamExt;
    use tempfile::TempDir;

    async fn stored(store: &LocalStorage, ids: &[MangaId]) -> Vec<Manga> {
        store.browse(ids).await.unwrap().try_collect().await.unwrap()
    }

    #[tokio::test]
    async fn test_empty_shard_finishes_immediately() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(LocalStorage::open(tmp.path()).await.unwrap());
        let source = Arc::new(FakeSource::new(CrawlSource::MangaFox));

        let report = CrawlWorker::new(3, Vec::new(), source.clone(), store)
            .run()
            .await;

        assert_eq!(report.shard, 3);
        assert_eq!(report.state, WorkerState::Done);
        assert_eq!(report.assigned, 0);
        assert_eq!(source.detail_calls(), 0);
    }

    #[tokio::test]
    async fn test_worker_skips_detailed_and_resumes_chapters() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(LocalStorage::open(tmp.path()).await.unwrap());

        // Already detailed, one chapter crawled and one pending.
        let mut done = Chapter::new("1", "http://x/akira/1");
        done.set_image_urls(vec!["http://img/akira/1-1.jpg".into()]);
        let mut akira = Manga::new("Akira", "http://x/akira", CrawlSource::MangaFox);
        akira.chapters = vec![done.clone(), Chapter::new("2", "http://x/akira/2")];
        store.save(&mut akira).await.unwrap();

        let source = Arc::new(
            FakeSource::new(CrawlSource::MangaFox)
                .with_pages("http://x/akira/2", &["http://img/akira/2-1.jpg"]),
        );
        let id = akira.id.clone().unwrap();
        let report = CrawlWorker::new(0, vec![id.clone()], source.clone(), store.clone())
            .run()
            .await;

        assert_eq!(report.skipped, 1);
        assert_eq!(report.detailed, 0);
        assert_eq!(report.chapters_crawled, 1);
        assert_eq!(source.detail_calls(), 0);
        assert_eq!(source.chapter_calls(), 1);

        let akira = stored(&store, &[id]).await.remove(0);
        assert_eq!(akira.chapters[0], done);
        assert_eq!(akira.chapters[1].page_count(), 1);
    }

    #[tokio::test]
    async fn test_chapter_failure_does_not_stop_siblings() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(LocalStorage::open(tmp.path()).await.unwrap());

        let mut bleach = Manga::new("Bleach", "http://x/bleach", CrawlSource::MangaFox);
        store.save(&mut bleach).await.unwrap();

        let source = Arc::new(
            FakeSource::new(CrawlSource::MangaFox)
                .with_detail(
                    "http://x/bleach",
                    vec![
                        Chapter::new("1", "http://x/bleach/1"),
                        Chapter::new("2", "http://x/bleach/2"),
                        Chapter::new("3", "http://x/bleach/3"),
                    ],
                )
                .with_pages("http://x/bleach/1", &["b1"])
                .with_pages("http://x/bleach/3", &["b3a", "b3b"]),
        );

        let id = bleach.id.clone().unwrap();
        let report = CrawlWorker::new(0, vec![id.clone()], source, store.clone())
            .run()
            .await;

        assert_eq!(report.detailed, 1);
        assert_eq!(report.chapters_crawled, 2);
        assert_eq!(report.chapter_failures, vec!["Bleach #2"]);

        let bleach = stored(&store, &[id]).await.remove(0);
        let pages: Vec<usize> = bleach.chapters.iter().map(|c| c.page_count()).collect();
        assert_eq!(pages, vec![1, 0, 2]);
    }

    #[tokio::test]
    async fn test_partial_chapter_is_reported_and_retried() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(LocalStorage::open(tmp.path()).await.unwrap());

        let mut naruto = Manga::new("Naruto", "http://x/naruto", CrawlSource::MangaFox);
        store.save(&mut naruto).await.unwrap();
        let id = naruto.id.clone().unwrap();

        let partial = Arc::new(
            FakeSource::new(CrawlSource::MangaFox)
                .with_detail("http://x/naruto", vec![Chapter::new("700", "http://x/naruto/700")])
                .with_partial_pages("http://x/naruto/700", &["n1"], 2),
        );
        let report = CrawlWorker::new(0, vec![id.clone()], partial, store.clone())
            .run()
            .await;

        assert_eq!(report.chapters_crawled, 1);
        assert!(report.chapter_failures.is_empty());
        assert_eq!(
            report.incomplete_chapters,
            vec!["Naruto #700 (stopped at page 2)"]
        );

        let stored_naruto = stored(&store, &[id.clone()]).await.remove(0);
        assert_eq!(stored_naruto.chapters[0].page_count(), 1);
        assert!(stored_naruto.chapters[0].is_partial());
        assert_eq!(stored_naruto.pending_chapters(), 1);

        // The next run picks the chapter up again and completes it.
        let complete = Arc::new(
            FakeSource::new(CrawlSource::MangaFox)
                .with_pages("http://x/naruto/700", &["n1", "n2", "n3"]),
        );
        let report = CrawlWorker::new(0, vec![id.clone()], complete.clone(), store.clone())
            .run()
            .await;

        assert_eq!(report.skipped, 1);
        assert_eq!(complete.chapter_calls(), 1);
        assert!(report.incomplete_chapters.is_empty());

        let stored_naruto = stored(&store, &[id]).await.remove(0);
        assert_eq!(stored_naruto.chapters[0].page_count(), 3);
        assert!(!stored_naruto.chapters[0].is_partial());
        assert_eq!(stored_naruto.pending_chapters(), 0);
    }

    #[tokio::test]
    async fn test_each_manga_saved_after_its_chapters() {
        let tmp = TempDir::new().unwrap();
        let local = LocalStorage::open(tmp.path()).await.unwrap();

        let mut first = Manga::new("Akira", "http://x/akira", CrawlSource::MangaFox);
        let mut second = Manga::new("Bleach", "http://x/bleach", CrawlSource::MangaFox);
        local.save(&mut first).await.unwrap();
        local.save(&mut second).await.unwrap();
        let ids = vec![first.id.clone().unwrap(), second.id.clone().unwrap()];

        let store = Arc::new(FailingStore::new(local.clone()).failing_save("Bleach"));
        let source = Arc::new(
            FakeSource::new(CrawlSource::MangaFox)
                .with_detail("http://x/akira", vec![Chapter::new("1", "http://x/akira/1")])
                .with_detail("http://x/bleach", vec![Chapter::new("1", "http://x/bleach/1")])
                .with_pages("http://x/akira/1", &["a1", "a2"])
                .with_pages("http://x/bleach/1", &["b1"]),
        );

        let report = CrawlWorker::new(0, ids.clone(), source, store).run().await;

        assert_eq!(report.state, WorkerState::Done);
        assert_eq!(report.detailed, 2);
        assert_eq!(report.chapters_crawled, 2);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("Bleach"));

        let mangas = stored(&local, &ids).await;
        assert_eq!(mangas[0].chapters[0].image_urls(), ["a1", "a2"]);
        // Detail was saved as a batch; the chapter save of the second failed.
        assert_eq!(mangas[1].chapters.len(), 1);
        assert!(!mangas[1].chapters[0].has_images());
    }
}
