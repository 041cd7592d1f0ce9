//! Activity records emitted by update imports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::MangaId;

/// Kind of catalog change an activity reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityType {
    NewChapter,
    NewManga,
}

/// An append-only record of a newly discovered manga or chapter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Activity {
    pub manga: MangaId,

    /// Set for `NewChapter` activities
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter_number: Option<String>,

    #[serde(rename = "type")]
    pub kind: ActivityType,

    pub created_at: DateTime<Utc>,
}

impl Activity {
    pub fn new_chapter(manga: MangaId, chapter_number: impl Into<String>) -> Self {
        Self {
            manga,
            chapter_number: Some(chapter_number.into()),
            kind: ActivityType::NewChapter,
            created_at: Utc::now(),
        }
    }

    pub fn new_manga(manga: MangaId) -> Self {
        Self {
            manga,
            chapter_number: None,
            kind: ActivityType::NewManga,
            created_at: Utc::now(),
        }
    }
}
