//! Storage abstractions for catalog persistence.
//!
//! Mangas are stored one document per identity so concurrent workers can
//! upsert disjoint mangas without coordination. Activities are append-only.
//!
//! ## Directory Structure
//!
//! ```text
//! storage/
//! ├── config.toml           # Crawler configuration
//! ├── activity.jsonl        # Append-only activity log
//! └── mangas/
//!     ├── 5f1c0e...a9.json  # One file per manga identity
//!     └── 7be2d4...13.json
//! ```

pub mod local;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;
use crate::models::{Activity, Manga, MangaId};

// Re-export for convenience
pub use local::LocalStorage;

/// Lazy sequence of stored mangas. Dropping the cursor closes it.
pub type MangaCursor = BoxStream<'static, Result<Manga>>;

/// Trait for manga storage backends.
#[async_trait]
pub trait MangaStore: Send + Sync {
    /// Insert or update one manga, assigning its identity if it has none.
    async fn save(&self, manga: &mut Manga) -> Result<()>;

    /// Insert or update a batch of mangas, assigning missing identities.
    async fn save_all(&self, mangas: &mut [Manga]) -> Result<()>;

    /// Find stored mangas whose URL is one of `urls`.
    async fn find_by_urls(&self, urls: &[String]) -> Result<Vec<Manga>>;

    /// Find stored mangas whose title is one of `titles`.
    async fn find_by_titles(&self, titles: &[String]) -> Result<Vec<Manga>>;

    /// Lazily load the given mangas, in the given order. Unknown ids are skipped.
    async fn browse(&self, ids: &[MangaId]) -> Result<MangaCursor>;

    /// Lazily load every stored manga.
    async fn find_all(&self) -> Result<MangaCursor>;

    /// Remove every stored manga.
    async fn drop_all(&self) -> Result<()>;

    /// Number of stored mangas.
    async fn count(&self) -> Result<usize>;
}

/// Trait for activity sinks.
#[async_trait]
pub trait ActivityStore: Send + Sync {
    /// Append activities to the log.
    async fn append(&self, activities: &[Activity]) -> Result<()>;

    /// Load every recorded activity, oldest first.
    async fn load_activities(&self) -> Result<Vec<Activity>>;
}
