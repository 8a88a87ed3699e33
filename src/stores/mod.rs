//! Retailer integrations.
//!
//! Each adapter owns one store's markup quirks and price-text conventions and
//! turns listing/detail pages into [`ScrapedItem`]s. A malformed entry is
//! skipped with a log line; only page-level fetch/parse failures surface as
//! errors, which the orchestrator treats as "zero items from this store".

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::header::USER_AGENT;
use scraper::{ElementRef, Selector};
use std::time::Duration;

use crate::domain::model::{Category, ScrapedItem};

pub mod aussar;
pub mod coolmod;
pub mod ebay;

pub use aussar::AussarScraper;
pub use coolmod::CoolmodScraper;
pub use ebay::EbayScraper;

/// One retailer integration.
#[async_trait]
pub trait StoreScraper: Send + Sync {
    /// Store display name, as stored on price quotes.
    fn store(&self) -> &'static str;

    /// Whether a product URL belongs to this store's domain.
    fn owns_url(&self, url: &str) -> bool;

    /// Scrape the store's listing page for a category. Unsupported
    /// categories return a descriptive error so the caller can skip the
    /// (store, category) pair.
    async fn fetch_category(&self, category: &Category) -> Result<Vec<ScrapedItem>>;

    /// Scrape a single product's detail page.
    async fn fetch_product_detail(&self, url: &str) -> Result<ScrapedItem>;
}

const USER_AGENTS: [&str; 5] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/92.0.4515.107 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.1.1 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:90.0) Gecko/20100101 Firefox/90.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.114 Safari/537.36",
];

fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// Shared HTML fetcher with explicit timeouts and a rotating desktop
/// user-agent per request.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building scraper http client")?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub async fn get_text(&self, url: &str) -> Result<String> {
        let resp = self
            .client
            .get(url)
            .header(USER_AGENT, random_user_agent())
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        let status = resp.status();
        if !status.is_success() {
            bail!("GET {url} returned status {status}");
        }
        resp.text().await.context("reading response body")
    }
}

/// Parse a compiled-in CSS selector.
pub(crate) fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("static css selector")
}

/// Resolve an href against the store base URL when it is not absolute.
pub(crate) fn absolutize(base_url: &str, href: &str) -> String {
    if href.is_empty() || href.starts_with("http") {
        href.to_string()
    } else {
        format!("{base_url}{href}")
    }
}

/// Trimmed text of the first element matching `sel` under `el`.
pub(crate) fn child_text(el: ElementRef<'_>, sel: &Selector) -> String {
    el.select(sel)
        .next()
        .map(|n| n.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

/// Attribute of the first element matching `sel` under `el`.
pub(crate) fn child_attr(el: ElementRef<'_>, sel: &Selector, attr: &str) -> String {
    el.select(sel)
        .next()
        .and_then(|n| n.value().attr(attr))
        .unwrap_or_default()
        .trim()
        .to_string()
}
