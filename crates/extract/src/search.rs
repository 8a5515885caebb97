//! Google Search scrape source.
//!
//! Fetches the first ten result pages for a query with a desktop user
//! agent and pulls the organic result links out of the HTML. Waits a
//! randomised 30-60 seconds between pages to look like a person.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use scraper::{Html, Selector};
use tracing::debug;

use siteaudit_core::{Error, Result};

use crate::Source;

const SEARCH_BASE_URL: &str = "https://google.com";
const RESULT_PAGES: usize = 10;
const USER_AGENT: &str = "Mozilla/5.0 (X11; CrOS x86_64 14541.0.0) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/137.0.0.0 Safari/537.36";

/// Extracts URLs by scraping Google Search results.
pub struct GoogleSearchSource {
    query: String,
}

impl GoogleSearchSource {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
        }
    }
}

#[async_trait]
impl Source for GoogleSearchSource {
    fn name(&self) -> &'static str {
        "google search"
    }

    async fn extract(&self) -> Result<Vec<String>> {
        let client = reqwest::Client::new();
        let encoded = urlencoding::encode(&self.query);
        let mut urls = Vec::new();

        for page in 0..RESULT_PAGES {
            let path = format!("/search?q={}&start={}", encoded, page * 10);
            let html = fetch_page(&client, &path).await?;
            let links = extract_result_links(&html);
            debug!(page, count = links.len(), "scraped result page");
            urls.extend(links);

            if page + 1 < RESULT_PAGES {
                let delay = rand::thread_rng().gen_range(30..=60);
                tokio::time::sleep(Duration::from_secs(delay)).await;
            }
        }

        Ok(urls)
    }
}

/// Fetch one search path, following Google's interstitial redirect link
/// when one is served instead of results.
async fn fetch_page(client: &reqwest::Client, path: &str) -> Result<String> {
    let mut path = path.to_string();

    // At most one interstitial hop.
    for _ in 0..2 {
        let response = client
            .get(format!("{}{}", SEARCH_BASE_URL, path))
            .header("User-Agent", USER_AGENT)
            .send()
            .await
            .map_err(|e| Error::Extract(format!("failed search request: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Extract(format!(
                "non-200 search response: {}",
                response.status()
            )));
        }

        let html = response
            .text()
            .await
            .map_err(|e| Error::Extract(format!("failed to read search response: {}", e)))?;

        match redirect_path(&html) {
            Some(redirect) => path = redirect,
            None => return Ok(html),
        }
    }

    Err(Error::Extract("search redirect loop".to_string()))
}

/// Organic result links out of a result page.
fn extract_result_links(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("div.yuRUbf a").expect("valid selector");

    document
        .select(&selector)
        .filter_map(|anchor| anchor.value().attr("href"))
        .filter(|href| href.starts_with("http") && !href.contains("google.com"))
        .map(|href| href.to_string())
        .collect()
}

/// Google sometimes answers with an interstitial page holding a single
/// redirect link instead of results.
fn redirect_path(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("div#yvlrue a").expect("valid selector");

    document
        .select(&selector)
        .next()
        .and_then(|anchor| anchor.value().attr("href"))
        .map(|href| href.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESULT_PAGE: &str = r#"
        <html><body>
            <div class="yuRUbf"><a href="https://first.example/">First</a></div>
            <div class="yuRUbf"><a href="https://maps.google.com/place">Maps</a></div>
            <div class="yuRUbf"><a href="/relative">Relative</a></div>
            <div class="other"><a href="https://ignored.example/">Other</a></div>
            <div class="yuRUbf"><a href="http://second.example/page">Second</a></div>
        </body></html>"#;

    #[test]
    fn test_extracts_organic_links_only() {
        let links = extract_result_links(RESULT_PAGE);
        assert_eq!(
            links,
            vec!["https://first.example/", "http://second.example/page"]
        );
    }

    #[test]
    fn test_redirect_detection() {
        let interstitial = r#"<div id="yvlrue"><a href="/sorry/redirect">continue</a></div>"#;
        assert_eq!(redirect_path(interstitial).as_deref(), Some("/sorry/redirect"));
        assert_eq!(redirect_path(RESULT_PAGE), None);
    }
}
