// src/services/animeplanet.rs

//! AnimePlanet recommendation lookup.

use async_trait::async_trait;
use reqwest::Client;
use scraper::Html;
use url::Url;
use url::form_urlencoded::byte_serialize;

use crate::error::{AppError, Result};
use crate::models::Manga;
use crate::services::{SuggestionFinder, fetch_detail};
use crate::utils::{parse_selector, resolve_url, text_of};

const SEARCH_URL: &str = "http://www.anime-planet.com/manga/all?name=";

/// Finds recommended titles by searching anime-planet.com.
pub struct AnimePlanetSuggestions {
    client: Client,
}

impl AnimePlanetSuggestions {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn search_url(title: &str) -> String {
        let query: String = byte_serialize(title.as_bytes()).collect();
        format!("{SEARCH_URL}{query}")
    }
}

/// URL of the first search result, if any.
fn parse_search(body: &str, base: &Url) -> Result<Option<String>> {
    let document = Html::parse_document(body);
    let result_sel = parse_selector("tr td a")?;
    Ok(document
        .select(&result_sel)
        .next()
        .and_then(|link| link.value().attr("href"))
        .map(|href| resolve_url(base, href)))
}

/// Recommended titles listed on a manga page.
fn parse_recommendations(body: &str) -> Result<Vec<String>> {
    let document = Html::parse_document(body);
    let container_sel = parse_selector(".recommendations")?;
    let title_sel = parse_selector("h4")?;

    let Some(container) = document.select(&container_sel).next() else {
        return Ok(Vec::new());
    };
    Ok(container
        .select(&title_sel)
        .map(|h4| text_of(&h4))
        .filter(|title| !title.is_empty())
        .collect())
}

#[async_trait]
impl SuggestionFinder for AnimePlanetSuggestions {
    async fn find_suggestions(&self, manga: &Manga) -> Result<Vec<String>> {
        log::debug!("Looking for suggestions for '{}'", manga.title);

        let search_url = Self::search_url(&manga.title);
        let body = fetch_detail(&self.client, &search_url).await?;
        let Some(page_url) = parse_search(&body, &Url::parse(&search_url)?)? else {
            return Err(AppError::not_found(format!("suggestions for '{}'", manga.title)));
        };

        let body = fetch_detail(&self.client, &page_url).await?;
        let titles = parse_recommendations(&body)?;
        log::debug!("{} recommendations for '{}'", titles.len(), manga.title);
        Ok(titles)
    }
}
