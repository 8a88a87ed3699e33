//! eBay adapter (ebay.com, USD).
//!
//! eBay listings lazy-load nearly every thumbnail, so image extraction walks
//! a fallback chain: the thumbnail attributes, any descendant image, the
//! page's prefetched high-res images (matched by image id), and finally the
//! product detail page. Whatever survives is normalized to the s-l500 tier.

use anyhow::{bail, Result};
use async_trait::async_trait;
use regex::Regex;
use scraper::Html;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::domain::model::{Category, ScrapedItem};
use crate::imagehash::is_placeholder_image;
use crate::stores::{child_attr, child_text, selector, HttpFetcher, StoreScraper};

/// Thumbnail size tokens replaced by the preferred high-res tier.
const LOW_RES_TIERS: [&str; 10] = [
    "s-l64", "s-l75", "s-l96", "s-l140", "s-l160", "s-l180", "s-l200", "s-l225", "s-l300",
    "s-l400",
];

pub struct EbayScraper {
    base_url: String,
    fetcher: HttpFetcher,
}

/// A listing entry whose image fell all the way through to the detail-page
/// fallback; resolved asynchronously after parsing.
struct PendingImage {
    index: usize,
    url: String,
}

impl EbayScraper {
    pub const STORE: &'static str = "eBay";

    pub fn new(fetcher: HttpFetcher) -> Self {
        Self {
            base_url: "https://www.ebay.com".to_string(),
            fetcher,
        }
    }

    fn search_url(&self, slug: &str) -> Result<String> {
        let term = match slug.to_lowercase().as_str() {
            "portatiles" => "laptop+computers+notebooks",
            "tarjetas-graficas" => "graphics+card+gpu+nvidia+amd",
            "auriculares" => "gaming+headphones+headset",
            "teclados" => "gaming+keyboard+mechanical",
            "monitores" => "computer+monitor+gaming",
            "ssd" => "ssd+solid+state+drive",
            other => bail!("category not supported by eBay: {other}"),
        };
        Ok(format!("{}/sch/i.html?_nkw={term}&_sacat=0", self.base_url))
    }

    fn parse_listing(
        &self,
        html: &str,
        category: &Category,
    ) -> (Vec<ScrapedItem>, Vec<PendingImage>) {
        let doc = Html::parse_document(html);
        let prefetch_sel = selector("div.s-prefetch-image img");
        let item_sel = selector("li.s-item");
        let tagblock_sel = selector(".s-item__title--tagblock");
        let title_sel = selector(".s-item__title");
        let link_sel = selector("a.s-item__link");
        let thumb_sel = selector("img.s-item__image-img");
        let any_img_sel = selector("img");
        let price_sel = selector(".s-item__price");

        let image_id_re = Regex::new(r"images/([^/]+/[^/]+)/").expect("static image id regex");
        let price_re = Regex::new(r"^[\d.]+$").expect("static price shape regex");

        // High-res images the page preloads, keyed by eBay image id.
        let mut prefetch: HashMap<String, String> = HashMap::new();
        for img in doc.select(&prefetch_sel) {
            let src = img.value().attr("src").unwrap_or_default();
            if !src.is_empty() && !is_placeholder_image(src) {
                if let Some(id) = extract_image_id(&image_id_re, src) {
                    prefetch.insert(id, src.to_string());
                }
            }
        }

        let mut items = Vec::new();
        let mut pending = Vec::new();

        for entry in doc.select(&item_sel) {
            // Promotional tiles carry a tag block instead of a listing.
            if !child_text(entry, &tagblock_sel).is_empty() {
                continue;
            }

            let name = child_text(entry, &title_sel);
            if name.is_empty() || name == "Shop on eBay" {
                continue;
            }

            let url = child_attr(entry, &link_sel, "href");

            // 1. listing thumbnail, then lazy-load attributes
            let mut image_url = child_attr(entry, &thumb_sel, "src");
            if is_placeholder_image(&image_url) {
                for attr in ["data-src", "data-lazyimg", "data-srcset"] {
                    let candidate = child_attr(entry, &thumb_sel, attr);
                    if !is_placeholder_image(&candidate) {
                        image_url = candidate;
                        break;
                    }
                }
            }

            // 2. any descendant image
            if is_placeholder_image(&image_url) {
                for img in entry.select(&any_img_sel) {
                    let src = img.value().attr("src").unwrap_or_default();
                    if !src.is_empty() && !is_placeholder_image(src) {
                        image_url = src.to_string();
                    }
                }
            }

            // 3. prefetched high-res image, matched by image id
            if is_placeholder_image(&image_url) {
                let placeholder_id =
                    extract_image_id(&image_id_re, &image_url).unwrap_or_default();
                if let Some(found) = prefetch.get(&placeholder_id) {
                    image_url = found.clone();
                } else {
                    for (id, img) in &prefetch {
                        if image_url.contains(id.as_str())
                            || (!placeholder_id.is_empty() && id.contains(placeholder_id.as_str()))
                        {
                            image_url = img.clone();
                            break;
                        }
                    }
                }
            }

            // 4. normalize whatever we found to the high-res tier
            if !is_placeholder_image(&image_url) {
                for tier in LOW_RES_TIERS {
                    image_url = image_url.replacen(tier, "s-l500", 1);
                }
            }

            let mut price_text = child_text(entry, &price_sel);

            // Price ranges take the lower bound: "$150.00 to $210.00", or the
            // squashed "$150.00$210.00" variant without a "to".
            if let Some((low, _)) = price_text.split_once(" to ") {
                price_text = low.to_string();
            } else if price_text.matches('$').count() > 1 {
                let mut parts = price_text.splitn(3, '$');
                let _ = parts.next();
                if let Some(first) = parts.next() {
                    price_text = format!("${first}");
                }
            }

            let cleaned = price_text
                .replace('$', "")
                .replace("US ", "")
                .replace(',', "")
                .trim()
                .to_string();

            if cleaned.is_empty() || !price_re.is_match(&cleaned) {
                debug!(store = Self::STORE, item = %name, price_text = %cleaned, "skipping entry with invalid price text");
                continue;
            }

            let price: f64 = match cleaned.parse() {
                Ok(p) => p,
                Err(e) => {
                    warn!(store = Self::STORE, item = %name, error = %e, "skipping entry with unparseable price");
                    continue;
                }
            };
            if price <= 0.0 {
                continue;
            }

            if is_placeholder_image(&image_url) && !url.is_empty() {
                pending.push(PendingImage {
                    index: items.len(),
                    url: url.clone(),
                });
            }

            items.push(ScrapedItem::listing(
                name,
                image_url,
                category.id,
                Self::STORE,
                url,
                price,
                "USD",
            ));
        }

        (items, pending)
    }

    /// Pull the main product image off a detail page. The og:image meta tag
    /// usually carries the high-res original; `img#icImg` is the legacy spot.
    fn parse_detail_image(html: &str) -> Option<String> {
        let doc = Html::parse_document(html);
        let og_sel = selector(r#"meta[property="og:image"]"#);
        let ic_sel = selector("img#icImg");

        let root = doc.root_element();
        let og = child_attr(root, &og_sel, "content");
        if !is_placeholder_image(&og) {
            return Some(og);
        }
        let ic = child_attr(root, &ic_sel, "src");
        if !is_placeholder_image(&ic) {
            return Some(ic);
        }
        None
    }
}

#[async_trait]
impl StoreScraper for EbayScraper {
    fn store(&self) -> &'static str {
        Self::STORE
    }

    fn owns_url(&self, url: &str) -> bool {
        url.contains("ebay.com")
    }

    async fn fetch_category(&self, category: &Category) -> Result<Vec<ScrapedItem>> {
        let url = self.search_url(&category.slug)?;
        debug!(store = Self::STORE, category = %category.name, url = %url, "fetching search results");
        let body = self.fetcher.get_text(&url).await?;
        let (mut items, pending) = self.parse_listing(&body, category);

        // Last-resort image fallback: visit the detail page of entries whose
        // every listed image was a placeholder.
        for p in &pending {
            match self.fetcher.get_text(&p.url).await {
                Ok(detail_html) => {
                    if let Some(img) = Self::parse_detail_image(&detail_html) {
                        items[p.index].image_url = img;
                    }
                }
                Err(e) => {
                    debug!(store = Self::STORE, url = %p.url, error = %e, "detail image fallback failed");
                }
            }
        }

        let with_image = items
            .iter()
            .filter(|i| !is_placeholder_image(&i.image_url))
            .count();
        info!(
            store = Self::STORE,
            category = %category.name,
            count = items.len(),
            with_image,
            without_image = items.len() - with_image,
            "scraped listing"
        );
        Ok(items)
    }

    async fn fetch_product_detail(&self, url: &str) -> Result<ScrapedItem> {
        bail!("product detail scraping is not supported for eBay: {url}")
    }
}

fn extract_image_id(re: &Regex, url: &str) -> Option<String> {
    re.captures(url).map(|c| c[1].to_string())
}
