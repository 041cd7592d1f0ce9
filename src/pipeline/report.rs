// src/pipeline/report.rs

//! Structured run reports.
//!
//! Workers never return errors: every failure is recorded here and the
//! orchestrator assembles shard reports into a source report, and source
//! reports into an import report.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::CrawlSource;
use crate::pipeline::worker::WorkerState;

/// Outcome of one worker over one shard.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ShardReport {
    pub shard: usize,
    /// Last phase the worker entered
    pub state: WorkerState,
    /// Mangas assigned to the shard
    pub assigned: usize,
    /// Mangas whose detail crawl succeeded
    pub detailed: usize,
    /// Mangas that already had chapters
    pub skipped: usize,
    /// Titles whose detail crawl failed
    pub manga_failures: Vec<String>,
    pub chapters_crawled: usize,
    /// `"{title} #{number}"` of chapters whose crawl failed
    pub chapter_failures: Vec<String>,
    /// `"{title} #{number} ({outcome})"` of chapters kept with missing pages
    pub incomplete_chapters: Vec<String>,
    /// Repository errors, logged and swallowed
    pub errors: Vec<String>,
}

impl ShardReport {
    pub fn new(shard: usize, assigned: usize) -> Self {
        Self {
            shard,
            assigned,
            ..Self::default()
        }
    }

    /// Fold another report's counters into this one.
    pub fn absorb(&mut self, other: ShardReport) {
        self.assigned += other.assigned;
        self.detailed += other.detailed;
        self.skipped += other.skipped;
        self.manga_failures.extend(other.manga_failures);
        self.chapters_crawled += other.chapters_crawled;
        self.chapter_failures.extend(other.chapter_failures);
        self.incomplete_chapters.extend(other.incomplete_chapters);
        self.errors.extend(other.errors);
    }
}

/// Outcome of one operation over one source.
#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub source: CrawlSource,
    /// Mangas returned by the catalog or recent-updates listing
    pub listed: usize,
    pub shards: Vec<ShardReport>,
    /// Shards still running when the pool timeout elapsed
    pub timed_out_shards: usize,
    /// Activities written (delta update only)
    pub activities: usize,
    /// Errors that stopped the source early
    pub errors: Vec<String>,
}

impl SourceReport {
    pub fn new(source: CrawlSource) -> Self {
        Self {
            source,
            listed: 0,
            shards: Vec::new(),
            timed_out_shards: 0,
            activities: 0,
            errors: Vec::new(),
        }
    }

    /// Sum of all shard reports.
    pub fn totals(&self) -> ShardReport {
        let mut totals = ShardReport::default();
        for shard in &self.shards {
            totals.absorb(shard.clone());
        }
        totals
    }

    pub fn log_summary(&self) {
        let totals = self.totals();
        log::info!(
            "[{}] listed={} detailed={} skipped={} chapters={} activities={}",
            self.source,
            self.listed,
            totals.detailed,
            totals.skipped,
            totals.chapters_crawled,
            self.activities
        );

        if !totals.manga_failures.is_empty() {
            log::warn!(
                "[{}] {} manga failures: {}",
                self.source,
                totals.manga_failures.len(),
                totals.manga_failures.join(", ")
            );
        }
        if !totals.chapter_failures.is_empty() {
            log::warn!(
                "[{}] {} chapter failures: {}",
                self.source,
                totals.chapter_failures.len(),
                totals.chapter_failures.join(", ")
            );
        }
        if !totals.incomplete_chapters.is_empty() {
            log::warn!(
                "[{}] {} incomplete chapters: {}",
                self.source,
                totals.incomplete_chapters.len(),
                totals.incomplete_chapters.join(", ")
            );
        }
        for error in totals.errors.iter().chain(&self.errors) {
            log::error!("[{}] {}", self.source, error);
        }
        if self.timed_out_shards > 0 {
            log::error!(
                "[{}] {} shards did not finish before the pool timeout",
                self.source,
                self.timed_out_shards
            );
        }
    }
}

/// Outcome of a whole import operation.
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub operation: &'static str,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub sources: Vec<SourceReport>,
}

impl ImportReport {
    pub fn start(operation: &'static str) -> Self {
        let now = Utc::now();
        Self {
            operation,
            start_time: now,
            end_time: now,
            sources: Vec::new(),
        }
    }

    pub fn finish(mut self) -> Self {
        self.end_time = Utc::now();
        self.log_summary();
        self
    }

    pub fn source(&self, source: CrawlSource) -> Option<&SourceReport> {
        self.sources.iter().find(|s| s.source == source)
    }

    pub fn log_summary(&self) {
        for source in &self.sources {
            source.log_summary();
        }
        let elapsed = self.end_time - self.start_time;
        log::info!(
            "{} import finished in {}s over {} sources",
            self.operation,
            elapsed.num_seconds(),
            self.sources.len()
        );
    }
}

/// Outcome of a suggestion refresh.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SuggestionReport {
    /// Mangas looked up
    pub scanned: usize,
    /// Mangas whose suggestions were saved
    pub updated: usize,
    /// Titles unknown to the suggestion source
    pub not_found: Vec<String>,
    pub errors: Vec<String>,
}

impl SuggestionReport {
    pub fn log_summary(&self) {
        log::info!(
            "Suggestions: scanned={} updated={} not_found={}",
            self.scanned,
            self.updated,
            self.not_found.len()
        );
        for error in &self.errors {
            log::error!("Suggestions: {error}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_totals() {
        let mut report = SourceReport::new(CrawlSource::MangaFox);

        let mut a = ShardReport::new(0, 2);
        a.detailed = 2;
        a.chapters_crawled = 10;
        let mut b = ShardReport::new(1, 2);
        b.detailed = 1;
        b.manga_failures.push("B".into());
        b.chapter_failures.push("C #3".into());
        b.incomplete_chapters.push("C #4 (stopped at page 2)".into());
        report.shards = vec![a, b];

        let totals = report.totals();
        assert_eq!(totals.assigned, 4);
        assert_eq!(totals.detailed, 3);
        assert_eq!(totals.chapters_crawled, 10);
        assert_eq!(totals.manga_failures, vec!["B"]);
        assert_eq!(totals.chapter_failures, vec!["C #3"]);
        assert_eq!(totals.incomplete_chapters, vec!["C #4 (stopped at page 2)"]);
    }

    #[test]
    fn test_import_report_lookup() {
        let mut report = ImportReport::start("full");
        report.sources.push(SourceReport::new(CrawlSource::StarKana));
        let report = report.finish();

        assert!(report.source(CrawlSource::StarKana).is_some());
        assert!(report.source(CrawlSource::MangaFox).is_none());
        assert!(report.end_time >= report.start_time);
    }
}
