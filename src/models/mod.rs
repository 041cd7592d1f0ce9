// src/models/mod.rs

//! Domain models for the crawler application.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod activity;
mod chapter;
mod config;
mod manga;

// Re-export all public types
pub use activity::{Activity, ActivityType};
pub use chapter::Chapter;
pub use config::{Config, CrawlerConfig, ImportConfig, MAX_POOL_TIMEOUT_HOURS, SuggestionConfig};
pub use manga::{CrawlSource, Manga, MangaId};
