//! Utility functions and helpers.

pub mod http;

use scraper::{ElementRef, Selector};
use url::Url;

use crate::error::{AppError, Result};

/// Resolve a potentially relative URL against a base URL.
pub fn resolve_url(base: &Url, href: &str) -> String {
    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Parse a CSS selector, mapping failures to `AppError::Selector`.
pub fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

/// Concatenated, trimmed text of an element and its descendants.
pub fn text_of(element: &ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Trimmed text of an element's direct text children only.
pub fn own_text(element: &ElementRef<'_>) -> String {
    let mut out = String::new();
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        }
    }
    out.trim().to_string()
}

/// Split a comma separated field into trimmed, non-empty values.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    #[test]
    fn test_resolve_url() {
        let base = Url::parse("https://example.com/path/").unwrap();
        assert_eq!(
            resolve_url(&base, "page.html"),
            "https://example.com/path/page.html"
        );
        assert_eq!(
            resolve_url(&base, "/root.html"),
            "https://example.com/root.html"
        );
        assert_eq!(
            resolve_url(&base, "https://other.com/x"),
            "https://other.com/x"
        );
    }

    #[test]
    fn test_parse_selector() {
        assert!(parse_selector("div.class").is_ok());
        assert!(parse_selector("[[invalid").is_err());
    }

    #[test]
    fn test_own_text_skips_children() {
        let html = Html::parse_fragment(r#"<p id="show">Story text <span>more</span> end</p>"#);
        let sel = parse_selector("#show").unwrap();
        let p = html.select(&sel).next().unwrap();

        assert_eq!(own_text(&p), "Story text  end");
        assert_eq!(text_of(&p), "Story text more end");
    }

    #[test]
    fn test_split_list() {
        assert_eq!(
            split_list(" Action, Comedy ,, Drama"),
            vec!["Action", "Comedy", "Drama"]
        );
        assert!(split_list("").is_empty());
    }
}
