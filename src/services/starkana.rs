// src/services/starkana.rs

//! StarKana source crawler and its title-based URL formatter.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use scraper::{ElementRef, Html};
use url::Url;
use url::form_urlencoded::byte_serialize;

use crate::error::{AppError, Result};
use crate::models::{Chapter, CrawlSource, Manga};
use crate::services::{ChapterOutcome, MangaDetail, SourceCrawler, fetch_detail, parse_year};
use crate::utils::http::fetch_text;
use crate::utils::{parse_selector, resolve_url, text_of};

const WEBSITE_URL: &str = "http://starkana.com/";
const LIST_URL: &str = "http://starkana.com/manga/list";
const MANGA_BASE_URL: &str = "http://starkana.com/manga/";

const TITLE_LABEL: &str = "Title(s):";
const AUTHOR_LABEL: &str = "Author(s):";
const ARTIST_LABEL: &str = "Artist(s):";
const GENRE_LABEL: &str = "Genres:";
const YEAR_LABEL: &str = "Start Date:";
const SUMMARY_LABEL: &str = "Summary:";

/// Characters the site turns into two underscores.
const TWO_UNDERSCORES: &str = "èЯä³ß°Ω";
/// Characters the site turns into three underscores.
const THREE_UNDERSCORES: &str = "♀♥－スナイプ←草薙の剣";

/// Builds StarKana manga URLs from titles the way the site does.
///
/// Results are cached per title for the lifetime of the formatter.
pub struct StarKanaUrlFormatter {
    other_chars: Regex,
    cache: Mutex<HashMap<String, String>>,
}

impl StarKanaUrlFormatter {
    pub fn new() -> Result<Self> {
        let pattern = format!(
            r#"[^0-9A-Za-z_\-:~().$'!",{TWO_UNDERSCORES}{THREE_UNDERSCORES}]"#
        );
        let other_chars = Regex::new(&pattern)
            .map_err(|e| AppError::config(format!("starkana title pattern: {e}")))?;
        Ok(Self {
            other_chars,
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// URL of the manga page for `title`.
    pub fn manga_url(&self, title: &str) -> String {
        if let Some(url) = self.cached(title) {
            return url;
        }

        let letter = match title.chars().next() {
            Some(c) if c.is_ascii_alphabetic() => c.to_ascii_uppercase(),
            _ => '0',
        };

        let mut slug = String::with_capacity(title.len());
        for c in self.other_chars.replace_all(title, "_").chars() {
            if TWO_UNDERSCORES.contains(c) {
                slug.push_str("__");
            } else if THREE_UNDERSCORES.contains(c) {
                slug.push_str("___");
            } else if c != '\'' && c != '"' {
                slug.push(c);
            }
        }
        let slug = slug
            .trim_start_matches(['+', '$', '_'])
            .trim_end_matches(['+', '_']);
        let encoded: String = byte_serialize(slug.as_bytes()).collect();

        let url = format!("{MANGA_BASE_URL}{letter}/{encoded}");
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(title.to_string(), url.clone());
        }
        url
    }

    fn cached(&self, title: &str) -> Option<String> {
        self.cache.lock().ok()?.get(title).cloned()
    }
}

/// Crawler for starkana.com.
pub struct StarKanaCrawler {
    client: Client,
    formatter: Option<StarKanaUrlFormatter>,
}

impl StarKanaCrawler {
    pub fn new(client: Client) -> Self {
        let formatter = StarKanaUrlFormatter::new()
            .inspect_err(|e| log::warn!("StarKana URL formatter unavailable: {e}"))
            .ok();
        Self { client, formatter }
    }
}

fn is_list_link(link: &ElementRef<'_>) -> bool {
    text_of(link) != "&"
}

fn parse_catalog(body: &str, base: &Url) -> Result<Vec<Manga>> {
    let document = Html::parse_document(body);
    let link_sel = parse_selector(".c_h2 a, .c_h2b a")?;
    Ok(document
        .select(&link_sel)
        .filter(is_list_link)
        .filter_map(|link| {
            let href = link.value().attr("href")?;
            Some(Manga::new(text_of(&link), resolve_url(base, href), CrawlSource::StarKana))
        })
        .collect())
}

fn parse_detail(body: &str, base: &Url, title: &str) -> Result<MangaDetail> {
    let document = Html::parse_document(body);

    let removed_sel = parse_selector("#inner_page > div:nth-child(2) > span:nth-child(1)")?;
    if document.select(&removed_sel).next().is_some() {
        log::warn!("The manga '{title}' has been removed");
        return Err(AppError::not_found(format!("'{title}' was removed")));
    }

    let thumbnail_sel = parse_selector(".olol > img")?;
    let row_sel = parse_selector(
        "#inner_page > div:nth-child(5) > table:nth-child(1) > tbody > tr:nth-child(1) \
         > td:nth-child(2) > table:nth-child(1) tr",
    )?;
    let label_sel = parse_selector("td:nth-child(1)")?;
    let value_sel = parse_selector("td:nth-child(2)")?;
    let link_sel = parse_selector("a")?;
    let chapter_sel = parse_selector(".download-link")?;
    let number_sel = parse_selector("strong")?;

    let mut detail = MangaDetail {
        thumbnail: document
            .select(&thumbnail_sel)
            .next()
            .and_then(|img| img.value().attr("src"))
            .map(|src| resolve_url(base, src)),
        ..MangaDetail::default()
    };

    for row in document.select(&row_sel) {
        let (Some(label), Some(value)) = (row.select(&label_sel).next(), row.select(&value_sel).next())
        else {
            continue;
        };
        let links = || value.select(&link_sel).map(|a| text_of(&a)).collect::<Vec<_>>();

        match text_of(&label).as_str() {
            TITLE_LABEL => {
                detail.alt_titles = Some(
                    value
                        .inner_html()
                        .split("<br>")
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect(),
                );
            }
            AUTHOR_LABEL => detail.authors = links(),
            ARTIST_LABEL => detail.artists = links(),
            GENRE_LABEL => detail.genres = links(),
            YEAR_LABEL => detail.year = parse_year(title, &text_of(&value)),
            SUMMARY_LABEL => detail.summary = Some(text_of(&value)),
            _ => {}
        }
    }

    detail.chapters = document
        .select(&chapter_sel)
        .filter_map(|link| {
            let href = link.value().attr("href")?;
            let number = link.select(&number_sel).map(|s| text_of(&s)).collect::<String>();
            Some(Chapter::new(number, resolve_url(base, href)))
        })
        .collect();

    Ok(detail)
}

/// All images of a chapter rendered in scroll mode.
fn parse_scroll_page(body: &str, base: &Url) -> Result<Vec<String>> {
    let document = Html::parse_document(body);
    let image_sel = parse_selector(".dyn")?;
    Ok(document
        .select(&image_sel)
        .filter_map(|img| img.value().attr("src"))
        .map(|src| resolve_url(base, src))
        .collect())
}

/// Parse the home page listing of recent chapters.
///
/// Links read `Title <i>Chapter</i> <b>400</b>` and point at a chapter;
/// the title is the text before the first tag and the url is cut back to
/// the manga page.
fn parse_recent(body: &str, base: &Url) -> Result<Vec<Manga>> {
    let document = Html::parse_document(body);
    let link_sel = parse_selector(".c_h2 a, .c_h2b a")?;
    Ok(document
        .select(&link_sel)
        .filter_map(|link| {
            let html = link.inner_html();
            let title = html.split('<').next().unwrap_or_default().trim().to_string();
            let mut url = resolve_url(base, link.value().attr("href")?);
            if url.contains("/chapter/") {
                if let Some(offset) = url.find("/chapter") {
                    url.truncate(offset);
                }
            }
            Some(Manga::new(title, url, CrawlSource::StarKana))
        })
        .collect())
}

#[async_trait]
impl SourceCrawler for StarKanaCrawler {
    fn source(&self) -> CrawlSource {
        CrawlSource::StarKana
    }

    async fn list_catalog(&self) -> Result<Vec<Manga>> {
        log::info!("Crawling StarKana manga list");
        let body = fetch_text(&self.client, LIST_URL).await?;
        let mangas = parse_catalog(&body, &Url::parse(WEBSITE_URL)?)?;
        log::info!("StarKana lists {} mangas", mangas.len());
        Ok(mangas)
    }

    async fn crawl_manga(&self, manga: &mut Manga) -> Result<Vec<Chapter>> {
        if manga.title.trim().is_empty() {
            return Err(AppError::validation("manga title is not set"));
        }
        if manga.url.trim().is_empty() {
            if let Some(formatter) = &self.formatter {
                manga.url = formatter.manga_url(&manga.title);
            }
        }
        log::debug!("Crawling manga '{}' at {}", manga.title, manga.url);

        let base = Url::parse(&manga.url)
            .map_err(|e| AppError::not_found(format!("'{}' has no valid url: {e}", manga.title)))?;
        let body = fetch_detail(&self.client, &manga.url).await?;
        let detail = parse_detail(&body, &base, &manga.title)?;
        Ok(detail.apply(manga))
    }

    async fn crawl_chapter(&self, chapter: &mut Chapter) -> Result<ChapterOutcome> {
        if !chapter.needs_crawl() {
            return Ok(ChapterOutcome::Complete);
        }

        let url = format!("{}?scroll", chapter.url);
        let body = fetch_detail(&self.client, &url).await?;
        let images = parse_scroll_page(&body, &Url::parse(&url)?)?;
        if images.is_empty() {
            return Err(AppError::not_found(format!("images of chapter {}", chapter.number)));
        }
        chapter.set_image_urls(images);
        Ok(ChapterOutcome::Complete)
    }

    async fn list_recently_updated(&self) -> Result<Vec<Manga>> {
        log::info!("Crawling StarKana recent updates");
        let body = fetch_text(&self.client, WEBSITE_URL).await?;
        parse_recent(&body, &Url::parse(WEBSITE_URL)?)
    }
}
