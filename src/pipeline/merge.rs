// src/pipeline/merge.rs

//! Reconciliation of persisted and freshly crawled collections.
//!
//! Persisted elements always win: a crawled element is only appended when no
//! element with the same key is already present. This keeps chapters whose
//! media has been crawled even when the fresh listing carries an empty twin.

use std::collections::HashSet;
use std::hash::Hash;

use crate::models::{Chapter, Manga};

/// Merge `crawled` into `persisted`, keyed by `key_of`.
///
/// The result starts as `persisted` unchanged; each crawled element whose key
/// is not yet present is appended in crawl order. Duplicate keys inside
/// `crawled` collapse to their first occurrence.
pub fn merge<T, K, F>(persisted: Vec<T>, crawled: Vec<T>, key_of: F) -> Vec<T>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut seen: HashSet<K> = persisted.iter().map(&key_of).collect();
    let mut merged = persisted;
    merged.reserve(crawled.len());

    for item in crawled {
        if seen.insert(key_of(&item)) {
            merged.push(item);
        }
    }
    merged
}

/// Merge chapter lists by chapter number.
pub fn merge_chapters(persisted: Vec<Chapter>, crawled: Vec<Chapter>) -> Vec<Chapter> {
    merge(persisted, crawled, |c| c.number.clone())
}

/// Merge manga lists by canonical URL.
pub fn merge_mangas(persisted: Vec<Manga>, crawled: Vec<Manga>) -> Vec<Manga> {
    merge(persisted, crawled, |m| m.url.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CrawlSource;

    fn chapter(number: &str) -> Chapter {
        Chapter::new(number, format!("http://x/c{number}/1.html"))
    }

    fn numbers(chapters: &[Chapter]) -> Vec<&str> {
        chapters.iter().map(|c| c.number.as_str()).collect()
    }

    #[test]
    fn test_merge_is_idempotent() {
        let persisted = vec![chapter("1"), chapter("2")];
        let crawled = vec![chapter("2"), chapter("3")];

        let once = merge_chapters(persisted, crawled.clone());
        let twice = merge_chapters(once.clone(), crawled);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_merge_preserves_detail() {
        let mut detailed = chapter("10");
        detailed.set_image_urls((1..=5).map(|i| format!("http://img/{i}.jpg")).collect());

        let merged = merge_chapters(vec![detailed.clone()], vec![chapter("10")]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0], detailed);
        assert_eq!(merged[0].page_count(), 5);
    }

    #[test]
    fn test_merge_appends_in_order() {
        let merged = merge_chapters(
            vec![chapter("1"), chapter("2")],
            vec![chapter("1"), chapter("2"), chapter("3")],
        );
        assert_eq!(numbers(&merged), vec!["1", "2", "3"]);

        let merged = merge_chapters(vec![chapter("5")], vec![chapter("7"), chapter("6")]);
        assert_eq!(numbers(&merged), vec!["5", "7", "6"]);
    }

    #[test]
    fn test_merge_into_empty_is_crawled() {
        let crawled = vec![chapter("1"), chapter("1.5"), chapter("2")];
        assert_eq!(merge_chapters(Vec::new(), crawled.clone()), crawled);
    }

    #[test]
    fn test_merge_collapses_crawled_duplicates() {
        let merged = merge_chapters(Vec::new(), vec![chapter("1"), chapter("1")]);
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn test_merge_mangas_by_url() {
        let mut persisted = Manga::new("Naruto", "http://x/naruto", CrawlSource::MangaFox);
        persisted.assign_identity();
        let crawled = vec![
            Manga::new("Naruto (renamed)", "http://x/naruto", CrawlSource::MangaFox),
            Manga::new("Bleach", "http://x/bleach", CrawlSource::MangaFox),
        ];

        let merged = merge_mangas(vec![persisted.clone()], crawled);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0], persisted);
        assert_eq!(merged[1].title, "Bleach");
    }
}
