//! Import pipeline.
//!
//! - `merge`: reconcile persisted and crawled collections
//! - `split`: partition manga ids into worker shards
//! - `worker`: per-shard detail and chapter crawl
//! - `import`: full, merge and update imports plus suggestions
//! - `report`: structured run reports

pub mod import;
pub mod merge;
pub mod report;
pub mod split;
pub mod worker;

pub use import::Importer;
pub use merge::{merge, merge_chapters, merge_mangas};
pub use report::{ImportReport, ShardReport, SourceReport, SuggestionReport};
pub use split::split;
pub use worker::{CrawlWorker, WorkerState};
