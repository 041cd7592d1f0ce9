// src/models/manga.rs

//! Catalog item (manga) data structure and its identity.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::models::Chapter;

/// Per-process counter mixed into generated ids.
static ID_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Opaque identity of a persisted manga.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MangaId(String);

impl MangaId {
    /// Generate a fresh 24-hex-digit identifier.
    pub fn generate(seed: &str) -> Self {
        let sequence = ID_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();

        let mut hasher = Sha256::new();
        hasher.update(seed.as_bytes());
        hasher.update(nanos.to_be_bytes());
        hasher.update(sequence.to_be_bytes());
        let digest = hex::encode(hasher.finalize());

        Self(digest[..24].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MangaId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for MangaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Content source a manga was listed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CrawlSource {
    #[serde(rename = "mangafox")]
    MangaFox,
    #[serde(rename = "mangahere")]
    MangaHere,
    #[serde(rename = "starkana")]
    StarKana,
}

impl CrawlSource {
    pub fn name(&self) -> &'static str {
        match self {
            CrawlSource::MangaFox => "mangafox",
            CrawlSource::MangaHere => "mangahere",
            CrawlSource::StarKana => "starkana",
        }
    }
}

impl fmt::Display for CrawlSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A manga tracked by the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Manga {
    /// Identity, `None` until the manga is first persisted
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MangaId>,

    /// Main title
    pub title: String,

    #[serde(default)]
    pub alt_titles: Vec<String>,

    #[serde(default)]
    pub authors: Vec<String>,

    #[serde(default)]
    pub artists: Vec<String>,

    /// Year of first publication
    #[serde(default)]
    pub year: Option<i32>,

    #[serde(default)]
    pub summary: Option<String>,

    #[serde(default)]
    pub genres: Vec<String>,

    /// Chapters in source order, unique by number
    #[serde(default)]
    pub chapters: Vec<Chapter>,

    /// Canonical URL of the manga page on its source
    #[serde(default)]
    pub url: String,

    pub source: CrawlSource,

    /// Identifier used by the source itself
    #[serde(default)]
    pub source_id: Option<String>,

    #[serde(default)]
    pub ongoing: bool,

    /// Titles of recommended mangas
    #[serde(default)]
    pub suggestions: Vec<String>,

    /// Cover image URL
    #[serde(default)]
    pub thumbnail: Option<String>,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Manga {
    /// Create a minimal, unpersisted manga as produced by a catalog listing.
    pub fn new(title: impl Into<String>, url: impl Into<String>, source: CrawlSource) -> Self {
        Self {
            id: None,
            title: title.into(),
            alt_titles: Vec::new(),
            authors: Vec::new(),
            artists: Vec::new(),
            year: None,
            summary: None,
            genres: Vec::new(),
            chapters: Vec::new(),
            url: url.into(),
            source,
            source_id: None,
            ongoing: false,
            suggestions: Vec::new(),
            thumbnail: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// Set the source-specific identifier.
    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    /// Whether the manga has been stored at least once.
    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    /// Return the identity, generating one (and the creation date) if the
    /// manga has never been persisted.
    pub fn assign_identity(&mut self) -> MangaId {
        match &self.id {
            Some(id) => id.clone(),
            None => {
                let id = MangaId::generate(&self.url);
                self.id = Some(id.clone());
                self.created_at = Some(Utc::now());
                id
            }
        }
    }

    /// Mark the manga as updated now.
    pub fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }

    /// Whether detail crawl already ran (at least one chapter is known).
    pub fn is_detailed(&self) -> bool {
        !self.chapters.is_empty()
    }

    /// Chapters whose media references are missing or incomplete.
    pub fn pending_chapters(&self) -> usize {
        self.chapters.iter().filter(|c| c.needs_crawl()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_manga_is_unpersisted() {
        let manga = Manga::new("Naruto", "http://mangafox.me/manga/naruto/", CrawlSource::MangaFox);
        assert!(!manga.is_persisted());
        assert!(!manga.is_detailed());
        assert!(manga.created_at.is_none());
    }

    #[test]
    fn test_assign_identity_is_stable() {
        let mut manga = Manga::new("Bleach", "http://mangafox.me/manga/bleach/", CrawlSource::MangaFox);
        let first = manga.assign_identity();
        let created = manga.created_at;
        let second = manga.assign_identity();

        assert_eq!(first, second);
        assert_eq!(first.as_str().len(), 24);
        assert_eq!(manga.created_at, created);
    }

    #[test]
    fn test_generated_ids_differ() {
        let a = MangaId::generate("same-url");
        let b = MangaId::generate("same-url");
        assert_ne!(a, b);
    }

    #[test]
    fn test_source_serialization() {
        let json = serde_json::to_string(&CrawlSource::MangaHere).unwrap();
        assert_eq!(json, "\"mangahere\"");
        let parsed: CrawlSource = serde_json::from_str("\"starkana\"").unwrap();
        assert_eq!(parsed, CrawlSource::StarKana);
    }

    #[test]
    fn test_id_serialized_as_underscore_id() {
        let mut manga = Manga::new("One Piece", "http://x/one-piece", CrawlSource::StarKana);
        let json = serde_json::to_value(&manga).unwrap();
        assert!(json.get("_id").is_none());

        let id = manga.assign_identity();
        let json = serde_json::to_value(&manga).unwrap();
        assert_eq!(json["_id"], id.as_str());
    }
}
