//! Aussar adapter (aussar.es, EUR).
//!
//! PrestaShop-style markup: fixed category paths, lazy-loaded thumbnails
//! behind `data-src`, and European price formatting.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use scraper::Html;
use tracing::{debug, info, warn};

use crate::domain::model::{Category, ScrapedItem};
use crate::normalization::price::extract_price;
use crate::stores::{absolutize, child_attr, child_text, selector, HttpFetcher, StoreScraper};

pub struct AussarScraper {
    base_url: String,
    fetcher: HttpFetcher,
}

impl AussarScraper {
    pub const STORE: &'static str = "Aussar";

    pub fn new(fetcher: HttpFetcher) -> Self {
        Self {
            base_url: "https://www.aussar.es".to_string(),
            fetcher,
        }
    }

    fn category_url(&self, slug: &str) -> Result<String> {
        let path = match slug.to_lowercase().as_str() {
            "portatiles" => "/equipos/portatiles",
            "tarjetas-graficas" => "/tarjetas-graficas",
            "auriculares" => "/perifericos/auriculares",
            "teclados" => "/perifericos/teclados",
            "monitores" => "/monitores",
            "ssd" => "/almacenamiento/discos-ssd",
            other => bail!("category not supported by Aussar: {other}"),
        };
        Ok(format!("{}{path}", self.base_url))
    }

    /// Strip the euro sign and thousands dots, then normalize the decimal
    /// comma. "1.299,99 €" becomes "1299.99".
    fn clean_price_text(text: &str) -> String {
        text.replace('€', "")
            .replace('.', "")
            .replace(',', ".")
            .trim()
            .to_string()
    }

    fn parse_listing(&self, html: &str, category: &Category) -> Vec<ScrapedItem> {
        let doc = Html::parse_document(html);
        let card_sel = selector(".product-miniature");
        let title_sel = selector(".product-title a");
        let image_sel = selector(".product-thumbnail img");
        let price_sel = selector(".product-price-and-shipping .price");

        let mut items = Vec::new();
        for card in doc.select(&card_sel) {
            let name = child_text(card, &title_sel);
            if name.is_empty() {
                continue;
            }

            let product_url = absolutize(&self.base_url, &child_attr(card, &title_sel, "href"));

            let mut image_url = child_attr(card, &image_sel, "src");
            if image_url.is_empty() {
                image_url = child_attr(card, &image_sel, "data-src");
            }

            let price_text = Self::clean_price_text(&child_text(card, &price_sel));
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
        let name_sel = selector("h1.h1");
        let desc_sel = selector(".product-description");
        let image_sel = selector(".product-cover img");
        let price_sel = selector(".current-price .price");
        let avail_sel = selector(".product-availability");

        let root = doc.root_element();

        let name = child_text(root, &name_sel);
        if name.is_empty() {
            bail!("could not extract product name from {url}");
        }

        let description = child_text(root, &desc_sel);

        let mut image_url = child_attr(root, &image_sel, "src");
        if image_url.is_empty() {
            image_url = child_attr(root, &image_sel, "data-src");
        }

        let price = extract_price(&Self::clean_price_text(&child_text(root, &price_sel)))?;

        let avail_text = child_text(root, &avail_sel).to_lowercase();
        let is_available =
            !(avail_text.contains("agotado") || avail_text.contains("no disponible"));

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
impl StoreScraper for AussarScraper {
    fn store(&self) -> &'static str {
        Self::STORE
    }

    fn owns_url(&self, url: &str) -> bool {
        url.contains("aussar.es")
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
            bail!("url does not belong to Aussar: {url}");
        }
        let body = self.fetcher.get_text(url).await?;
        self.parse_detail(&body, url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn scraper() -> AussarScraper {
        AussarScraper::new(HttpFetcher::new(Duration::from_secs(5)).unwrap())
    }

    fn category() -> Category {
        Category {
            id: 2,
            name: "Tarjetas Gráficas".into(),
            slug: "tarjetas-graficas".into(),
            product_count: 0,
        }
    }

    const LISTING: &str = r#"
        <html><body>
        <div class="product-miniature">
          <div class="product-title"><a href="/tarjeta-rtx-4070">Tarjeta Gráfica RTX 4070</a></div>
          <div class="product-thumbnail"><img data-src="https://www.aussar.es/img/rtx4070.jpg"></div>
          <div class="product-price-and-shipping"><span class="price">1.299,99 €</span></div>
        </div>
        <div class="product-miniature">
          <div class="product-title"><a href="/misterioso">Artículo sin precio</a></div>
          <div class="product-price-and-shipping"><span class="price">consultar</span></div>
        </div>
        </body></html>
    "#;

    #[test]
    fn parses_listing_with_lazy_image_and_thousands_separator() {
        let items = scraper().parse_listing(LISTING, &category());
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.name, "Tarjeta Gráfica RTX 4070");
        assert_eq!(item.price, 1299.99);
        assert_eq!(item.image_url, "https://www.aussar.es/img/rtx4070.jpg");
        assert_eq!(item.url, "https://www.aussar.es/tarjeta-rtx-4070");
    }

    #[test]
    fn clean_price_text_normalizes_european_format() {
        assert_eq!(AussarScraper::clean_price_text("1.299,99 €"), "1299.99");
        assert_eq!(AussarScraper::clean_price_text("29,95€"), "29.95");
    }

    const DETAIL: &str = r#"
        <html><body>
        <h1 class="h1">Tarjeta Gráfica RX 7800 XT</h1>
        <div class="product-description">16GB GDDR6.</div>
        <div class="product-cover"><img src="https://www.aussar.es/img/rx7800.jpg"></div>
        <div class="current-price"><span class="price">549,90 €</span></div>
        <div class="product-availability">Agotado temporalmente</div>
        </body></html>
    "#;

    #[test]
    fn parses_detail_page() {
        let item = scraper()
            .parse_detail(DETAIL, "https://www.aussar.es/rx-7800")
            .unwrap();
        assert_eq!(item.name, "Tarjeta Gráfica RX 7800 XT");
        assert_eq!(item.price, 549.9);
        assert!(!item.is_available);
    }

    #[test]
    fn foreign_urls_are_rejected() {
        assert!(!scraper().owns_url("https://www.coolmod.com/x"));
        assert!(scraper().owns_url("https://www.aussar.es/x"));
    }
}
