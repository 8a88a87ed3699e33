//! Coolmod adapter (coolmod.com, EUR).
//!
//! Coolmod renders prices as two sibling spans (integer and decimal part),
//! which get rejoined with a comma before normalization.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use scraper::Html;
use tracing::{debug, info, warn};

use crate::domain::model::{Category, ScrapedItem};
use crate::normalization::price::extract_price;
use crate::stores::{absolutize, child_attr, child_text, selector, HttpFetcher, StoreScraper};

pub struct CoolmodScraper {
    base_url: String,
    fetcher: HttpFetcher,
}

impl CoolmodScraper {
    pub const STORE: &'static str = "Coolmod";

    pub fn new(fetcher: HttpFetcher) -> Self {
        Self {
            base_url: "https://www.coolmod.com".to_string(),
            fetcher,
        }
    }

    #[cfg(test)]
    fn with_base_url(fetcher: HttpFetcher, base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            fetcher,
        }
    }

    /// Map a canonical category slug onto Coolmod's on-site search.
    fn category_url(&self, slug: &str) -> Result<String> {
        let query = match slug.to_lowercase().as_str() {
            "portatiles" => "m=n&q=portatiles",
            "ssd" => "m=and&q=ssd",
            "auriculares" => "m=and&q=auriculares",
            "teclados" => "m=and&q=teclados",
            "monitores" => "m=and&q=monitores",
            "tarjetas-graficas" => "m=and&q=tarjetas+graficas",
            other => bail!("category not supported by Coolmod: {other}"),
        };
        Ok(format!("{}/#01cc/fullscreen/{query}", self.base_url))
    }

    fn parse_listing(&self, html: &str, category: &Category) -> Vec<ScrapedItem> {
        let doc = Html::parse_document(html);
        let card_sel = selector("article.product-card");
        let title_sel = selector("p.card-title a");
        let title_fallback_sel = selector(".card-title a");
        let image_sel = selector("figure a img");
        let int_price_sel = selector("span.product_price.int_price");
        let dec_price_sel = selector("span.dec_price");

        let mut items = Vec::new();
        for card in doc.select(&card_sel) {
            let mut name = child_text(card, &title_sel);
            let mut product_url = child_attr(card, &title_sel, "href");
            if name.is_empty() {
                name = child_text(card, &title_fallback_sel);
                product_url = child_attr(card, &title_fallback_sel, "href");
            }
            if name.is_empty() {
                continue;
            }
            let product_url = absolutize(&self.base_url, &product_url);

            let image_url = absolutize(&self.base_url, &child_attr(card, &image_sel, "src"));

            // Integer and decimal halves are separate spans; rejoin with a
            // comma so the normalizer sees European format.
            let int_part = child_text(card, &int_price_sel);
            let dec_part = child_text(card, &dec_price_sel);
            let price_text = if dec_part.is_empty() {
                int_part
            } else {
                format!("{int_part},{dec_part}")
            };

            let price = match extract_price(&price_text) {
                Ok(p) => p,
                Err(e) => {
                    warn!(store = Self::STORE, item = %name, error = %e, "skipping entry with unparseable price");
                    continue;
                }
            };

            items.push(ScrapedItem::listing(
                name,
                image_url,
                category.id,
                Self::STORE,
                product_url,
                price,
                "EUR",
            ));
        }
        items
    }

    fn parse_detail(&self, html: &str, url: &str) -> Result<ScrapedItem> {
        let doc = Html::parse_document(html);
        let name_sel = selector("h1.card-title, .product-name");
        let desc_sel = selector(".product-description, .desc-det");
        let image_sel = selector(".swiper-slide img, figure a img");
        let int_price_sel = selector("span.product_price.int_price");
        let dec_price_sel = selector("span.dec_price");
        let stock_sel = selector(".card-text.text-xs.text-cool-green, .text-delivered");

        let root = doc.root_element();

        let name = child_text(root, &name_sel);
        if name.is_empty() {
            bail!("could not extract product name from {url}");
        }

        let description = child_text(root, &desc_sel);
        let image_url = absolutize(&self.base_url, &child_attr(root, &image_sel, "src"));

        let int_part = child_text(root, &int_price_sel);
        let dec_part = child_text(root, &dec_price_sel);
        let price_text = if dec_part.is_empty() {
            int_part
        } else {
            format!("{int_part},{dec_part}")
        };
        let price = extract_price(&price_text)?;

        // Available unless the delivery blurb says sold out.
        let stock_text = child_text(root, &stock_sel).to_lowercase();
        let is_available =
            !(stock_text.contains("agotado") || stock_text.contains("no disponible"));

        Ok(ScrapedItem {
            name,
            description,
            image_url,
            category_id: 0,
            store: Self::STORE.to_string(),
            url: url.to_string(),
            price,
            currency: "EUR".to_string(),
            is_available,
            retrieved_at: Utc::now(),
        })
    }
}

#[async_trait]
impl StoreScraper for CoolmodScraper {
    fn store(&self) -> &'static str {
        Self::STORE
    }

    fn owns_url(&self, url: &str) -> bool {
        url.contains("coolmod.com")
    }

    async fn fetch_category(&self, category: &Category) -> Result<Vec<ScrapedItem>> {
        let url = self.category_url(&category.slug)?;
        debug!(store = Self::STORE, category = %category.name, url = %url, "fetching listing");
        let body = self.fetcher.get_text(&url).await?;
        let items = self.parse_listing(&body, category);
        info!(store = Self::STORE, category = %category.name, count = items.len(), "scraped listing");
        Ok(items)
    }

    async fn fetch_product_detail(&self, url: &str) -> Result<ScrapedItem> {
        if !self.owns_url(url) {
            bail!("url does not belong to Coolmod: {url}");
        }
        let body = self.fetcher.get_text(url).await?;
        self.parse_detail(&body, url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn scraper() -> CoolmodScraper {
        CoolmodScraper::with_base_url(
            HttpFetcher::new(Duration::from_secs(5)).unwrap(),
            "https://www.coolmod.com",
        )
    }

    fn category() -> Category {
        Category {
            id: 4,
            name: "Teclados".into(),
            slug: "teclados".into(),
            product_count: 0,
        }
    }

    const LISTING: &str = r#"
        <html><body>
        <article class="product-card">
          <p class="card-title"><a href="/teclado-gaming-x">Teclado Gaming X RGB</a></p>
          <figure><a href="/p"><img src="/img/teclado-x.jpg"></a></figure>
          <span class="product_price int_price">89</span><span class="dec_price">95</span>
        </article>
        <article class="product-card">
          <p class="card-title"><a href="/raton-y">Ratón Y</a></p>
          <figure><a href="/p"><img src="https://cdn.coolmod.com/raton-y.jpg"></a></figure>
          <span class="product_price int_price">no disponible</span>
        </article>
        <article class="product-card">
          <p class="card-title"><a href="/sin-nombre"></a></p>
          <span class="product_price int_price">10</span>
        </article>
        </body></html>
    "#;

    #[test]
    fn parses_listing_and_joins_split_price() {
        let items = scraper().parse_listing(LISTING, &category());
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.name, "Teclado Gaming X RGB");
        assert_eq!(item.price, 89.95);
        assert_eq!(item.currency, "EUR");
        assert_eq!(item.url, "https://www.coolmod.com/teclado-gaming-x");
        assert_eq!(item.image_url, "https://www.coolmod.com/img/teclado-x.jpg");
        assert!(item.is_available);
    }

    #[test]
    fn unsupported_category_is_an_error() {
        let cat_url = scraper().category_url("neveras");
        assert!(cat_url.is_err());
    }

    const DETAIL: &str = r#"
        <html><body>
        <h1 class="card-title">Teclado Mecánico Z</h1>
        <div class="product-description">Switches rojos, formato TKL.</div>
        <figure><a href="/p"><img src="/img/z.jpg"></a></figure>
        <span class="product_price int_price">119</span>
        <span class="dec_price">00</span>
        <div class="card-text text-xs text-cool-green">Producto agotado</div>
        </body></html>
    "#;

    #[test]
    fn parses_detail_page_with_availability() {
        let item = scraper().parse_detail(DETAIL, "https://www.coolmod.com/z").unwrap();
        assert_eq!(item.name, "Teclado Mecánico Z");
        assert_eq!(item.description, "Switches rojos, formato TKL.");
        assert_eq!(item.price, 119.0);
        assert!(!item.is_available);
    }

    #[test]
    fn detail_without_name_is_an_error() {
        assert!(scraper()
            .parse_detail("<html><body></body></html>", "https://www.coolmod.com/x")
            .is_err());
    }
}
