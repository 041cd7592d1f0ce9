// src/services/mangahere.rs

//! MangaHere source crawler.

use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{Chapter, CrawlSource, Manga};
use crate::services::pager::{ChapterOutcome, PageSource, Pager, RetryPolicy};
use crate::services::{MangaDetail, SourceCrawler, chapter_number, fetch_detail};
use crate::utils::http::fetch_text;
use crate::utils::{own_text, parse_selector, resolve_url, split_list, text_of};

const WEBSITE_URL: &str = "http://mangahere.co/";
const LIST_URL: &str = "http://mangahere.co/mangalist/";
const LATEST_URL: &str = "http://mangahere.co/latest/";

/// Crawler for mangahere.co.
pub struct MangaHereCrawler {
    client: Client,
    pager: Pager,
}

impl MangaHereCrawler {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            pager: Pager::new(RetryPolicy::network_only()),
        }
    }
}

fn manga_from_link(link: &ElementRef<'_>, base: &Url) -> Option<Manga> {
    let href = link.value().attr("href")?;
    Some(Manga::new(
        text_of(link),
        resolve_url(base, href),
        CrawlSource::MangaHere,
    ))
}

fn parse_catalog(body: &str, base: &Url) -> Result<Vec<Manga>> {
    let document = Html::parse_document(body);
    let link_sel = parse_selector(".manga_info")?;
    Ok(document
        .select(&link_sel)
        .filter_map(|link| manga_from_link(&link, base))
        .collect())
}

fn parse_detail(body: &str, base: &Url, title: &str) -> Result<MangaDetail> {
    let document = Html::parse_document(body);

    let info_sel = parse_selector(".detail_topText")?;
    if document.select(&info_sel).next().is_none() {
        return Err(AppError::not_found(format!("detail block of '{title}'")));
    }

    let authors_sel = parse_selector(".detail_topText > li:nth-child(5) > a")?;
    let artists_sel = parse_selector(".detail_topText > li:nth-child(6) > a")?;
    let alt_titles_sel = parse_selector(".detail_topText > li:nth-child(3)")?;
    let genres_sel = parse_selector(".detail_topText > li:nth-child(4)")?;
    let thumbnail_sel = parse_selector(".img")?;
    let summary_sel = parse_selector("#show")?;
    let chapter_sel = parse_selector(".detail_list a.color_0077")?;

    let alt_titles = document.select(&alt_titles_sel).next().map(|li| {
        own_text(&li)
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    });

    let chapters = document
        .select(&chapter_sel)
        .filter_map(|link| {
            let href = link.value().attr("href")?;
            Some(Chapter::new(
                chapter_number(&text_of(&link), title),
                resolve_url(base, href),
            ))
        })
        .collect();

    Ok(MangaDetail {
        alt_titles,
        authors: document.select(&authors_sel).map(|a| text_of(&a)).collect(),
        artists: document.select(&artists_sel).map(|a| text_of(&a)).collect(),
        genres: document
            .select(&genres_sel)
            .next()
            .map(|li| split_list(&own_text(&li)))
            .unwrap_or_default(),
        year: None,
        summary: document.select(&summary_sel).next().map(|el| own_text(&el)),
        thumbnail: document
            .select(&thumbnail_sel)
            .next()
            .and_then(|img| img.value().attr("src"))
            .map(|src| resolve_url(base, src)),
        ongoing: None,
        chapters,
    })
}

/// Page count and page-1 image of a chapter reader page.
fn parse_first_page(body: &str, base: &Url) -> Result<(u32, Option<String>)> {
    let document = Html::parse_document(body);
    let option_sel = parse_selector("div.go_page select.wid60 option")?;
    let options = document.select(&option_sel).count();
    let page_count = u32::try_from(options).unwrap_or(u32::MAX);
    Ok((page_count, extract_image(&document, base)))
}

fn extract_image(document: &Html, base: &Url) -> Option<String> {
    let image_sel = parse_selector("#image").ok()?;
    document
        .select(&image_sel)
        .next()
        .and_then(|img| img.value().attr("src"))
        .map(|src| resolve_url(base, src))
}

/// Parse the latest updates page, keeping only today's entries.
fn parse_latest(body: &str, base: &Url) -> Result<Vec<Manga>> {
    let document = Html::parse_document(body);
    let block_sel = parse_selector(".manga_updates dl")?;
    let time_sel = parse_selector(".time")?;
    let link_sel = parse_selector(".manga_info")?;

    Ok(document
        .select(&block_sel)
        .filter(|block| {
            block
                .select(&time_sel)
                .next()
                .is_some_and(|time| text_of(&time).contains("Today"))
        })
        .filter_map(|block| manga_from_link(&block.select(&link_sel).next()?, base))
        .collect())
}

/// Reader pages of one chapter: `{chapter_url}{index}.html`.
struct ChapterPages<'a> {
    client: &'a Client,
    chapter_url: &'a str,
    base: Url,
}

#[async_trait]
impl PageSource for ChapterPages<'_> {
    async fn fetch_page(&self, index: u32) -> Result<String> {
        let url = format!("{}{index}.html", self.chapter_url);
        fetch_text(self.client, &url).await
    }

    fn extract(&self, body: &str) -> Option<String> {
        extract_image(&Html::parse_document(body), &self.base)
    }
}

#[async_trait]
impl SourceCrawler for MangaHereCrawler {
    fn source(&self) -> CrawlSource {
        CrawlSource::MangaHere
    }

    async fn list_catalog(&self) -> Result<Vec<Manga>> {
        log::info!("Crawling MangaHere manga list");
        let body = fetch_text(&self.client, LIST_URL).await?;
        let mangas = parse_catalog(&body, &Url::parse(WEBSITE_URL)?)?;
        log::info!("MangaHere lists {} mangas", mangas.len());
        Ok(mangas)
    }

    async fn crawl_manga(&self, manga: &mut Manga) -> Result<Vec<Chapter>> {
        if manga.title.trim().is_empty() {
            return Err(AppError::validation("manga title is not set"));
        }
        log::debug!("Crawling manga '{}' at {}", manga.title, manga.url);

        let base = Url::parse(&manga.url)
            .map_err(|e| AppError::not_found(format!("'{}' has no valid url: {e}", manga.title)))?;
        let body = fetch_detail(&self.client, &manga.url).await?;
        let detail = parse_detail(&body, &base, &manga.title)?;
        log::debug!("{} chapters listed for '{}'", detail.chapters.len(), manga.title);
        Ok(detail.apply(manga))
    }

    async fn crawl_chapter(&self, chapter: &mut Chapter) -> Result<ChapterOutcome> {
        if !chapter.needs_crawl() {
            return Ok(ChapterOutcome::Complete);
        }

        let base = Url::parse(&chapter.url)?;
        let body = fetch_detail(&self.client, &chapter.url).await?;
        let (page_count, first) = parse_first_page(&body, &base)?;

        let pages = ChapterPages {
            client: &self.client,
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
        log::info!("Crawling MangaHere latest updates");
        let body = fetch_text(&self.client, LATEST_URL).await?;
        parse_latest(&body, &Url::parse(WEBSITE_URL)?)
    }
}
