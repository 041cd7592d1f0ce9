// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use reqwest::Client;

use crate::error::Result;
use crate::models::CrawlerConfig;

/// Create a configured asynchronous HTTP client.
pub fn create_client(config: &CrawlerConfig) -> Result<Client> {
    let client = Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    Ok(client)
}

/// Fetch a page body. Non-success statuses are errors.
///
/// Bodies are returned as text so callers parse them synchronously;
/// `scraper::Html` is not `Send` and must not be held across an await.
pub async fn fetch_text(client: &Client, url: &str) -> Result<String> {
    let response = client.get(url).send().await?.error_for_status()?;
    Ok(response.text().await?)
}

/// Fetch a page body, retrying transport failures up to `attempts` times.
pub async fn fetch_text_with_retry(
    client: &Client,
    url: &str,
    attempts: u32,
    delay: Duration,
) -> Result<String> {
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match fetch_text(client, url).await {
            Ok(body) => return Ok(body),
            Err(e) if e.is_transient() && attempt < attempts => {
                log::warn!("Fetch {url} failed (attempt {attempt}/{attempts}): {e}");
                attempt += 1;
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_client() {
        assert!(create_client(&CrawlerConfig::default()).is_ok());
    }

    #[tokio::test]
    async fn test_invalid_url_is_not_retried_forever() {
        let client = create_client(&CrawlerConfig::default()).unwrap();
        let result = fetch_text_with_retry(&client, "not a url", 3, Duration::ZERO).await;
        assert!(result.is_err());
    }
}
