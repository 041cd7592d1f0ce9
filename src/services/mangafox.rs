// src/services/mangafox.rs

//! MangaFox source crawler.

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{Chapter, CrawlSource, Manga};
use crate::services::pager::{ChapterOutcome, PageSource, Pager, RetryPolicy};
use crate::services::{MangaDetail, SourceCrawler, chapter_number, fetch_detail, parse_year};
use crate::utils::http::fetch_text;
use crate::utils::{parse_selector, resolve_url, split_list, text_of};

const WEBSITE_URL: &str = "http://mangafox.me/";
const LIST_URL: &str = "http://mangafox.me/manga";
const RECENT_URL: &str = "http://mangafox.me/releases";

/// Crawler for mangafox.me.
pub struct MangaFoxCrawler {
    client: Client,
    pager: Pager,
    page_pattern: Regex,
}

impl MangaFoxCrawler {
    pub fn new(client: Client) -> Result<Self> {
        let page_pattern = Regex::new(r"[0-9]+\.html")
            .map_err(|e| AppError::config(format!("mangafox page pattern: {e}")))?;
        Ok(Self {
            client,
            pager: Pager::new(RetryPolicy::unified()),
            page_pattern,
        })
    }

    /// URL of page `index` of the chapter whose first page is `chapter_url`.
    fn page_url(&self, chapter_url: &str, index: u32) -> String {
        self.page_pattern
            .replace_all(chapter_url, format!("{index}.html").as_str())
            .into_owned()
    }
}

/// Parse the catalog listing.
fn parse_catalog(body: &str, base: &Url) -> Result<Vec<Manga>> {
    let document = Html::parse_document(body);
    let link_sel = parse_selector(".manga_list li > a")?;

    Ok(document
        .select(&link_sel)
        .filter_map(|link| {
            let href = link.value().attr("href")?;
            let mut manga = Manga::new(text_of(&link), resolve_url(base, href), CrawlSource::MangaFox);
            if let Some(rel) = link.value().attr("rel") {
                manga = manga.with_source_id(rel);
            }
            Some(manga)
        })
        .collect())
}

/// Parse a manga detail page.
fn parse_detail(body: &str, base: &Url, title: &str) -> Result<MangaDetail> {
    let document = Html::parse_document(body);

    let title_block = parse_selector("#title")?;
    if document.select(&title_block).next().is_none() {
        return Err(AppError::not_found(format!("detail block of '{title}'")));
    }

    let alt_titles_sel = parse_selector("#title > h3:nth-child(2)")?;
    let alt_titles = document.select(&alt_titles_sel).next();
    // The info table shifts down when alternate titles are present.
    let table = if alt_titles.is_some() { 3 } else { 2 };
    let cell = |n: usize| {
        format!("#title > table:nth-child({table}) > tbody > tr:nth-child(2) > td:nth-child({n})")
    };

    let year_sel = parse_selector(&format!("{} > a", cell(1)))?;
    let authors_sel = parse_selector(&cell(2))?;
    let artists_sel = parse_selector(&cell(3))?;
    let genres_sel = parse_selector(&cell(4))?;
    let thumbnail_sel = parse_selector(".cover > img")?;
    let ongoing_sel = parse_selector("div.data:nth-child(5) > span:nth-child(2)")?;
    let summary_sel = parse_selector(".summary")?;
    let chapter_sel = parse_selector(".chlist .tips")?;

    let cell_list = |sel: &Selector| {
        document
            .select(sel)
            .next()
            .map(|cell| split_list(&text_of(&cell)))
            .unwrap_or_default()
    };

    let chapters = document
        .select(&chapter_sel)
        .filter_map(|link| {
            let href = link.value().attr("href")?;
            let text = text_of(&link);
            Some(Chapter::new(chapter_number(&text, title), resolve_url(base, href)).with_name(text))
        })
        .collect();

    Ok(MangaDetail {
        alt_titles: alt_titles.map(|el| {
            text_of(&el)
                .split(';')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        }),
        authors: cell_list(&authors_sel),
        artists: cell_list(&artists_sel),
        genres: cell_list(&genres_sel),
        year: document
            .select(&year_sel)
            .next()
            .and_then(|el| parse_year(title, &text_of(&el))),
        summary: document.select(&summary_sel).next().map(|el| text_of(&el)),
        thumbnail: document
            .select(&thumbnail_sel)
            .next()
            .and_then(|img| img.value().attr("src"))
            .map(|src| resolve_url(base, src)),
        ongoing: document
            .select(&ongoing_sel)
            .next()
            .map(|el| text_of(&el).contains("Ongoing")),
        chapters,
    })
}

/// Page count and page-1 image of a chapter reader page.
///
/// The page selector carries one extra entry for the comments page.
fn parse_first_page(body: &str, base: &Url) -> Result<(u32, Option<String>)> {
    let document = Html::parse_document(body);
    let option_sel = parse_selector("#top_bar .l .m option")?;
    let options = document.select(&option_sel).count();
    let page_count = u32::try_from(options.saturating_sub(1)).unwrap_or(u32::MAX);
    Ok((page_count, extract_image(&document, base)))
}

fn extract_image(document: &Html, base: &Url) -> Option<String> {
    let image_sel = parse_selector("#viewer img").ok()?;
    document
        .select(&image_sel)
        .next()
        .and_then(|img| img.value().attr("src"))
        .map(|src| resolve_url(base, src))
}

/// Parse the recent releases page.
fn parse_recent(body: &str, base: &Url) -> Result<Vec<Manga>> {
    let document = Html::parse_document(body);
    let entry_sel = parse_selector("#updates li")?;
    let link_sel = parse_selector(".title a")?;

    Ok(document
        .select(&entry_sel)
        .filter_map(|entry| {
            let link = entry.select(&link_sel).next()?;
            let href = link.value().attr("href")?;
            Some(Manga::new(text_of(&link), resolve_url(base, href), CrawlSource::MangaFox))
        })
        .collect())
}

/// Reader pages of one chapter.
struct ChapterPages<'a> {
    crawler: &'a MangaFoxCrawler,
    chapter_url: &'a str,
    base: Url,
}

#[async_trait]
impl PageSource for ChapterPages<'_> {
    async fn fetch_page(&self, index: u32) -> Result<String> {
        let url = self.crawler.page_url(self.chapter_url, index);
        fetch_text(&self.crawler.client, &url).await
    }

    fn extract(&self, body: &str) -> Option<String> {
        extract_image(&Html::parse_document(body), &self.base)
    }
}

#[async_trait]
impl SourceCrawler for MangaFoxCrawler {
    fn source(&self) -> CrawlSource {
        CrawlSource::MangaFox
    }

    async fn list_catalog(&self) -> Result<Vec<Manga>> {
        log::info!("Crawling MangaFox manga list");
        let body = fetch_text(&self.client, LIST_URL).await?;
        let mangas = parse_catalog(&body, &Url::parse(WEBSITE_URL)?)?;
        log::info!("MangaFox lists {} mangas", mangas.len());
        Ok(mangas)
    }

    async fn crawl_manga(&self, manga: &mut Manga) -> Result<Vec<Chapter>> {
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

        let base = Url::parse(&chapter.url)?;
        let body = fetch_detail(&self.client, &chapter.url).await?;
        let (page_count, first) = parse_first_page(&body, &base)?;
        log::debug!("Chapter {} has {} pages", chapter.number, page_count);

        let pages = ChapterPages {
            crawler: self,
            chapter_url: &chapter.url,
            base,
        };
        let (images, outcome) = self.pager.walk(&pages, first, page_count).await.into_parts();
        if images.is_empty() {
            return Err(AppError::not_found(format!("images of chapter {}", chapter.number)));
        }
        chapter.set_image_urls(images);
        Ok(outcome)
    }

    async fn list_recently_updated(&self) -> Result<Vec<Manga>> {
        log::info!("Crawling MangaFox recent releases");
        let body = fetch_text(&self.client, RECENT_URL).await?;
        parse_recent(&body, &Url::parse(WEBSITE_URL)?)
    }
}
