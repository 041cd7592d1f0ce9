//! Chapter data structure.

use serde::{Deserialize, Serialize};

/// A chapter of a manga.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chapter {
    /// Chapter number, unique within a manga (not necessarily numeric)
    pub number: String,

    /// Display name
    #[serde(default)]
    pub name: Option<String>,

    /// URL of the first chapter page
    pub url: String,

    /// Image URLs, one per page, in reading order
    #[serde(default)]
    image_urls: Vec<String>,

    /// Set when the last crawl kept only some of the pages
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    partial: bool,
}

impl Chapter {
    pub fn new(number: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            name: None,
            url: url.into(),
            image_urls: Vec::new(),
            partial: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn image_urls(&self) -> &[String] {
        &self.image_urls
    }

    /// Replace the image URLs.
    pub fn set_image_urls(&mut self, image_urls: Vec<String>) {
        self.image_urls = image_urls;
    }

    pub fn push_image_url(&mut self, url: impl Into<String>) {
        self.image_urls.push(url.into());
    }

    pub fn has_images(&self) -> bool {
        !self.image_urls.is_empty()
    }

    pub fn is_partial(&self) -> bool {
        self.partial
    }

    pub fn set_partial(&mut self, partial: bool) {
        self.partial = partial;
    }

    /// Whether the chapter still has pages to retrieve.
    pub fn needs_crawl(&self) -> bool {
        !self.has_images() || self.partial
    }

    /// Number of pages, derived from the image URLs.
    pub fn page_count(&self) -> usize {
        self.image_urls.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_count_follows_images() {
        let mut chapter = Chapter::new("12", "http://example.com/c012/1.html");
        assert_eq!(chapter.page_count(), 0);
        assert!(!chapter.has_images());

        chapter.push_image_url("http://img/1.jpg");
        chapter.push_image_url("http://img/2.jpg");
        assert_eq!(chapter.page_count(), 2);

        chapter.set_image_urls(vec!["http://img/only.jpg".into()]);
        assert_eq!(chapter.page_count(), 1);
    }

    #[test]
    fn test_missing_images_deserialize_empty() {
        let chapter: Chapter =
            serde_json::from_str(r#"{"number":"3.5","url":"http://x/3.5"}"#).unwrap();
        assert_eq!(chapter.number, "3.5");
        assert!(chapter.image_urls().is_empty());
        assert!(!chapter.is_partial());
    }

    #[test]
    fn test_partial_chapter_needs_crawl() {
        let mut chapter = Chapter::new("7", "http://example.com/c007/1.html");
        assert!(chapter.needs_crawl());

        chapter.push_image_url("http://img/1.jpg");
        assert!(!chapter.needs_crawl());

        chapter.set_partial(true);
        assert!(chapter.needs_crawl());

        let json = serde_json::to_string(&chapter).unwrap();
        let restored: Chapter = serde_json::from_str(&json).unwrap();
        assert!(restored.is_partial());

        chapter.set_partial(false);
        let json = serde_json::to_string(&chapter).unwrap();
        assert!(!json.contains("partial"));
    }
}
