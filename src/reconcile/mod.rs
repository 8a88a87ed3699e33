//! Product reconciliation: the core of the ingestion pipeline.
//!
//! Every scraped item goes through classification, image fingerprinting and
//! identity resolution before it touches the catalog. Identity resolution
//! tries, in order: a fingerprint scan over the most relevant products in the
//! same category (catches the same physical product listed under different
//! wording across stores), an exact slug match, and normalized-name
//! containment (absorbs minor rewordings within one store's re-scrape).
//!
//! Product creation is serialized per category behind an async mutex so two
//! store scrapers racing on the same new product produce one row and a
//! detectable merge instead of a silent duplicate.

use anyhow::{anyhow, Result};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::classify::{Classifier, Verdict};
use crate::domain::model::{NewPrice, NewProduct, Product, ScrapedItem};
use crate::domain::repos::Repos;
use crate::imagehash::{is_placeholder_image, Fingerprint, Fingerprinter, HashKind};
use crate::normalization::slug::{generate_slug, generate_unique_slug_async};
use crate::stores::StoreScraper;

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Max Hamming distance for two fingerprints to mean "same product".
    pub phash_threshold: u32,
    /// How many same-category products the fingerprint scan considers.
    pub candidate_window: i64,
    /// How many same-category products the name-containment scan considers.
    pub name_match_window: i64,
    /// Per-store freshness window applied after each batch: a repeat scrape
    /// that did not reconfirm a quote within this window retires it.
    pub batch_fresh_window: chrono::Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            phash_threshold: 5,
            candidate_window: 200,
            name_match_window: 1000,
            batch_fresh_window: chrono::Duration::days(3),
        }
    }
}

/// Per-item result, surfaced so batches can keep counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Saved {
        product_id: i64,
        reclassified: bool,
    },
    /// No category accepted the item; nothing was persisted.
    Discarded,
}

/// Counters for one (store, category) batch.
#[derive(Debug, Default, Clone)]
pub struct BatchStats {
    pub total: usize,
    pub valid: usize,
    pub reclassified: usize,
    pub discarded: usize,
    pub failed: usize,
    pub stale_prices_deleted: u64,
}

pub struct Reconciler {
    repos: Repos,
    classifier: Arc<Classifier>,
    fingerprinter: Arc<dyn Fingerprinter>,
    stores: Vec<Arc<dyn StoreScraper>>,
    cfg: ReconcilerConfig,
    create_locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl Reconciler {
    pub fn new(
        repos: Repos,
        classifier: Arc<Classifier>,
        fingerprinter: Arc<dyn Fingerprinter>,
        stores: Vec<Arc<dyn StoreScraper>>,
        cfg: ReconcilerConfig,
    ) -> Self {
        Self {
            repos,
            classifier,
            fingerprinter,
            stores,
            cfg,
            create_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Process one scraped item end to end. Classifier rejection and
    /// fingerprint failures are designed outcomes, not errors; only
    /// persistence failures surface as `Err`.
    pub async fn ingest(&self, mut item: ScrapedItem) -> Result<IngestOutcome> {
        let mut reclassified = false;

        match self
            .classifier
            .evaluate(&item.name, &item.description, item.category_id)
        {
            Verdict::Accept => {}
            Verdict::Redirect(target) => {
                if target != item.category_id {
                    debug!(item = %item.name, from = item.category_id, to = target, "override moved item to another category");
                    reclassified = true;
                }
                item.category_id = target;
            }
            Verdict::Reject => {
                let categories = self.repos.categories.get_all().await?;
                let ids: Vec<i64> = categories.iter().map(|c| c.id).collect();
                match self
                    .classifier
                    .classify(&item.name, &item.description, &ids)
                {
                    Some(target) => {
                        debug!(item = %item.name, from = item.category_id, to = target, "item reclassified");
                        item.category_id = target;
                        reclassified = true;
                    }
                    None => {
                        debug!(item = %item.name, "no category accepts item; discarding");
                        return Ok(IngestOutcome::Discarded);
                    }
                }
            }
        }

        // Fingerprint failures leave the item without image dedup, nothing more.
        let mut fingerprint: Option<Fingerprint> = None;
        if !is_placeholder_image(&item.image_url) {
            match self.fingerprinter.fingerprint_url(&item.image_url).await {
                Ok(fp) => fingerprint = Some(fp),
                Err(e) => {
                    debug!(item = %item.name, error = %e, "fingerprinting failed; continuing without image dedup")
                }
            }
        }

        // Match-or-create is serialized per category: concurrent scrapers
        // racing on the same logical product merge instead of duplicating.
        let lock = self.category_lock(item.category_id).await;
        let _guard = lock.lock().await;

        let product_id = match self.resolve_existing(&item, fingerprint.as_ref()).await? {
            Some(mut product) => {
                let mut dirty = false;
                if is_placeholder_image(&product.image_url)
                    && !is_placeholder_image(&item.image_url)
                {
                    product.image_url = item.image_url.clone();
                    dirty = true;
                }
                if product.image_hash.is_none() {
                    if let Some(fp) = fingerprint {
                        product.image_hash = Some(fp.bits);
                        dirty = true;
                    }
                }
                if dirty {
                    if let Err(e) = self.repos.products.update(&product).await {
                        warn!(product = product.id, error = %e, "failed to refresh existing product");
                    }
                }
                product.id
            }
            None => {
                let slug = generate_unique_slug_async(&item.name, |candidate| {
                    let products = self.repos.products.clone();
                    async move { products.exists_by_slug(&candidate).await }
                })
                .await?;

                let product = self
                    .repos
                    .products
                    .create(NewProduct {
                        name: item.name.clone(),
                        slug,
                        description: item.description.clone(),
                        image_url: item.image_url.clone(),
                        category_id: item.category_id,
                        image_hash: fingerprint.map(|f| f.bits),
                    })
                    .await?;
                debug!(product = product.id, name = %product.name, "created new product");
                product.id
            }
        };

        self.upsert_price(product_id, &item).await?;

        Ok(IngestOutcome::Saved {
            product_id,
            reclassified,
        })
    }

    /// Reconcile a whole (store, category) batch, then retire quotes the
    /// batch did not reconfirm within the freshness window.
    pub async fn ingest_batch(
        &self,
        items: Vec<ScrapedItem>,
        store: &str,
        category_name: &str,
    ) -> BatchStats {
        let mut stats = BatchStats {
            total: items.len(),
            ..Default::default()
        };
        let mut touched: HashSet<i64> = HashSet::new();

        for item in items {
            let name = item.name.clone();
            match self.ingest(item).await {
                Ok(IngestOutcome::Saved {
                    product_id,
                    reclassified,
                }) => {
                    touched.insert(product_id);
                    if reclassified {
                        stats.reclassified += 1;
                    } else {
                        stats.valid += 1;
                    }
                }
                Ok(IngestOutcome::Discarded) => stats.discarded += 1,
                Err(e) => {
                    warn!(store, category = category_name, item = %name, error = %e, "failed to persist scraped item");
                    stats.failed += 1;
                }
            }
        }

        let cutoff = Utc::now() - self.cfg.batch_fresh_window;
        for product_id in &touched {
            let prices = match self.repos.prices.find_by_product(*product_id).await {
                Ok(prices) => prices,
                Err(e) => {
                    warn!(product = product_id, error = %e, "could not load prices for stale pruning");
                    continue;
                }
            };
            for price in prices.iter().filter(|p| p.retrieved_at < cutoff) {
                match self.repos.prices.delete(price.id).await {
                    Ok(()) => stats.stale_prices_deleted += 1,
                    Err(e) => warn!(price = price.id, error = %e, "failed to delete stale price"),
                }
            }
        }

        info!(
            store,
            category = category_name,
            total = stats.total,
            valid = stats.valid,
            reclassified = stats.reclassified,
            discarded = stats.discarded,
            failed = stats.failed,
            stale_deleted = stats.stale_prices_deleted,
            "batch reconciled"
        );
        stats
    }

    /// One full sweep: every category, every store adapter, fetch+reconcile
    /// fanned out concurrently. A failing (store, category) pair contributes
    /// zero items and never aborts the cycle.
    pub async fn run_ingestion_cycle(self: &Arc<Self>) {
        let categories = match self.repos.categories.get_all().await {
            Ok(categories) => categories,
            Err(e) => {
                error!(error = %e, "cannot load categories; skipping ingestion cycle");
                return;
            }
        };
        if categories.is_empty() {
            warn!("no categories defined; nothing to scrape");
            return;
        }

        info!(
            categories = categories.len(),
            stores = self.stores.len(),
            "ingestion cycle started"
        );

        let mut tasks = JoinSet::new();
        for category in categories {
            for store in &self.stores {
                let store = store.clone();
                let reconciler = self.clone();
                let category = category.clone();
                tasks.spawn(async move {
                    match store.fetch_category(&category).await {
                        Ok(items) if !items.is_empty() => {
                            reconciler
                                .ingest_batch(items, store.store(), &category.name)
                                .await;
                        }
                        Ok(_) => {
                            debug!(store = store.store(), category = %category.name, "no items scraped")
                        }
                        Err(e) => {
                            warn!(store = store.store(), category = %category.name, error = %e, "store fetch failed; continuing with other stores")
                        }
                    }
                });
            }
        }
        while let Some(res) = tasks.join_next().await {
            if let Err(e) = res {
                error!(error = %e, "ingestion task failed");
            }
        }

        info!("ingestion cycle finished");
    }

    /// Global sweep deleting quotes not refreshed within `older_than`.
    /// Returns the number of quotes deleted.
    pub async fn run_cleanup(&self, older_than: chrono::Duration) -> Result<u64> {
        let cutoff = Utc::now() - older_than;
        let deleted = self.repos.prices.delete_older_than(cutoff).await?;
        info!(deleted, "stale price cleanup finished");
        Ok(deleted)
    }

    /// Scrape one product's detail page from whichever store owns the URL
    /// and reconcile it into the given category.
    pub async fn scrape_product_detail(
        &self,
        url: &str,
        category_id: i64,
    ) -> Result<IngestOutcome> {
        let category = self
            .repos
            .categories
            .find_by_id(category_id)
            .await?
            .ok_or_else(|| anyhow!("category {category_id} not found"))?;
        let store = self
            .stores
            .iter()
            .find(|s| s.owns_url(url))
            .ok_or_else(|| anyhow!("url does not belong to a supported store: {url}"))?;

        let mut item = store.fetch_product_detail(url).await?;
        item.category_id = category.id;
        self.ingest(item).await
    }

    async fn category_lock(&self, category_id: i64) -> Arc<Mutex<()>> {
        let mut locks = self.create_locks.lock().await;
        locks
            .entry(category_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn resolve_existing(
        &self,
        item: &ScrapedItem,
        fingerprint: Option<&Fingerprint>,
    ) -> Result<Option<Product>> {
        // a. fingerprint scan over the category's most relevant products
        if let Some(fp) = fingerprint {
            match self
                .repos
                .products
                .find_by_category(item.category_id, self.cfg.candidate_window, 0, None)
                .await
            {
                Ok(candidates) => {
                    for candidate in candidates {
                        let Some(bits) = candidate.image_hash else {
                            continue;
                        };
                        let stored = Fingerprint::new(HashKind::Perception, bits);
                        match stored.is_similar(fp, self.cfg.phash_threshold) {
                            Ok(true) => {
                                info!(item = %item.name, matched = %candidate.name, "near-duplicate found by image fingerprint");
                                return Ok(Some(candidate));
                            }
                            Ok(false) => {}
                            Err(e) => warn!(error = %e, "fingerprint comparison failed"),
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "candidate scan failed; falling back to slug match")
                }
            }
        }

        // b. exact slug
        let slug = generate_slug(&item.name);
        if let Some(product) = self.repos.products.find_by_slug(&slug).await? {
            debug!(item = %item.name, "existing product found by slug");
            return Ok(Some(product));
        }

        // c. normalized-name containment within the category
        let candidates = self
            .repos
            .products
            .find_by_category(item.category_id, self.cfg.name_match_window, 0, None)
            .await?;
        let needle = item.name.trim().to_lowercase();
        for candidate in candidates {
            let hay = candidate.name.trim().to_lowercase();
            if hay == needle || hay.contains(&needle) || needle.contains(&hay) {
                debug!(item = %item.name, matched = %candidate.name, "existing product found by name containment");
                return Ok(Some(candidate));
            }
        }

        Ok(None)
    }

    /// At most one live quote per (product, store): update it when present,
    /// insert otherwise.
    async fn upsert_price(&self, product_id: i64, item: &ScrapedItem) -> Result<()> {
        let existing = self.repos.prices.find_by_product(product_id).await?;
        match existing.into_iter().find(|p| p.store == item.store) {
            Some(mut price) => {
                price.amount = item.price;
                price.currency = item.currency.clone();
                price.url = item.url.clone();
                price.is_available = item.is_available;
                price.retrieved_at = item.retrieved_at;
                self.repos.prices.update(&price).await?;
                debug!(product = product_id, store = %item.store, amount = item.price, "updated price quote");
            }
            None => {
                self.repos
                    .prices
                    .create(NewPrice {
                        product_id,
                        store: item.store.clone(),
                        amount: item.price,
                        currency: item.currency.clone(),
                        url: item.url.clone(),
                        is_available: item.is_available,
                        retrieved_at: item.retrieved_at,
                    })
                    .await?;
                debug!(product = product_id, store = %item.store, amount = item.price, "created price quote");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::memory::MemoryStore;
    use crate::persistence::seed_categories;
    use anyhow::bail;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Canned fingerprints keyed by URL; unknown URLs fail like a dead link.
    struct StaticFingerprinter {
        hashes: HashMap<String, u64>,
    }

    #[async_trait]
    impl Fingerprinter for StaticFingerprinter {
        async fn fingerprint_url(&self, url: &str) -> Result<Fingerprint> {
            match self.hashes.get(url) {
                Some(bits) => Ok(Fingerprint::new(HashKind::Perception, *bits)),
                None => bail!("download failed: {url}"),
            }
        }
    }

    async fn reconciler_with(hashes: HashMap<String, u64>) -> (Arc<Reconciler>, Repos) {
        let store = MemoryStore::new();
        let repos = store.repos();
        seed_categories(repos.categories.as_ref()).await.unwrap();
        let reconciler = Arc::new(Reconciler::new(
            repos.clone(),
            Arc::new(Classifier::with_default_rules().unwrap()),
            Arc::new(StaticFingerprinter { hashes }),
            vec![],
            ReconcilerConfig::default(),
        ));
        (reconciler, repos)
    }

    fn item(name: &str, image_url: &str, category_id: i64, store: &str, price: f64) -> ScrapedItem {
        ScrapedItem {
            name: name.to_string(),
            description: String::new(),
            image_url: image_url.to_string(),
            category_id,
            store: store.to_string(),
            url: format!("https://example.com/{}", generate_slug(name)),
            price,
            currency: "EUR".to_string(),
            is_available: true,
            retrieved_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn same_laptop_from_two_stores_merges_by_fingerprint() {
        let base: u64 = 0xDEAD_BEEF_CAFE_F00D;
        let hashes = HashMap::from([
            ("https://a.example/tuf.jpg".to_string(), base),
            // Hamming distance 2 from the first image.
            ("https://b.example/tuf-press.jpg".to_string(), base ^ 0b11),
        ]);
        let (reconciler, repos) = reconciler_with(hashes).await;

        let first = item(
            "Portátil ASUS TUF Gaming F15",
            "https://a.example/tuf.jpg",
            1,
            "Coolmod",
            999.0,
        );
        let second = item(
            "ASUS TUF Gaming F15 FX506 Laptop 16GB RAM",
            "https://b.example/tuf-press.jpg",
            1,
            "eBay",
            1049.0,
        );

        let out1 = reconciler.ingest(first).await.unwrap();
        let out2 = reconciler.ingest(second).await.unwrap();

        let IngestOutcome::Saved { product_id: id1, .. } = out1 else {
            panic!("first item discarded")
        };
        let IngestOutcome::Saved { product_id: id2, .. } = out2 else {
            panic!("second item discarded")
        };
        assert_eq!(id1, id2, "both listings must land on one product");

        let products = repos.products.find_by_category(1, 0, 0, None).await.unwrap();
        assert_eq!(products.len(), 1);

        let mut prices = repos.prices.find_by_product(id1).await.unwrap();
        prices.sort_by(|a, b| a.store.cmp(&b.store));
        assert_eq!(prices.len(), 2);
        assert_eq!(prices[0].store, "Coolmod");
        assert_eq!(prices[1].store, "eBay");
    }

    #[tokio::test]
    async fn reingesting_same_store_updates_price_in_place() {
        let (reconciler, repos) = reconciler_with(HashMap::new()).await;

        let first = item("Teclado HyperX Alloy Origins", "", 4, "Coolmod", 109.99);
        let out = reconciler.ingest(first).await.unwrap();
        let IngestOutcome::Saved { product_id, .. } = out else {
            panic!("discarded")
        };

        let mut again = item("Teclado HyperX Alloy Origins", "", 4, "Coolmod", 99.99);
        again.retrieved_at = Utc::now();
        reconciler.ingest(again).await.unwrap();

        let prices = repos.prices.find_by_product(product_id).await.unwrap();
        assert_eq!(prices.len(), 1, "re-scrape must not duplicate the quote");
        assert_eq!(prices[0].amount, 99.99);
    }

    #[tokio::test]
    async fn misfiled_item_is_reclassified() {
        let (reconciler, repos) = reconciler_with(HashMap::new()).await;

        // A graphics card scraped under the laptops category.
        let gpu = item("Tarjeta Gráfica MSI GeForce RTX 4070", "", 1, "Aussar", 649.0);
        let out = reconciler.ingest(gpu).await.unwrap();
        let IngestOutcome::Saved {
            product_id,
            reclassified,
        } = out
        else {
            panic!("discarded")
        };
        assert!(reclassified);

        let product = repos.products.find_by_id(product_id).await.unwrap().unwrap();
        assert_eq!(product.category_id, 2);
    }

    #[tokio::test]
    async fn accessories_are_discarded() {
        let (reconciler, repos) = reconciler_with(HashMap::new()).await;

        let out = reconciler
            .ingest(item("Funda para portátil 15.6", "", 1, "eBay", 19.99))
            .await
            .unwrap();
        assert_eq!(out, IngestOutcome::Discarded);
        for category in 1..=6 {
            assert!(repos
                .products
                .find_by_category(category, 0, 0, None)
                .await
                .unwrap()
                .is_empty());
        }
    }

    #[tokio::test]
    async fn fingerprint_failure_still_saves_the_item() {
        // No canned hash for this URL: the download "fails".
        let (reconciler, repos) = reconciler_with(HashMap::new()).await;

        let out = reconciler
            .ingest(item(
                "Monitor LG UltraGear 27",
                "https://dead.example/img.jpg",
                5,
                "Coolmod",
                299.0,
            ))
            .await
            .unwrap();
        let IngestOutcome::Saved { product_id, .. } = out else {
            panic!("discarded")
        };
        let product = repos.products.find_by_id(product_id).await.unwrap().unwrap();
        assert!(product.image_hash.is_none());
    }

    #[tokio::test]
    async fn batch_prunes_quotes_the_rescrape_did_not_confirm() {
        let (reconciler, repos) = reconciler_with(HashMap::new()).await;

        // Existing product with a quote nobody has confirmed in 10 days.
        let product = repos
            .products
            .create(NewProduct {
                name: "Teclado HyperX Alloy Origins".into(),
                slug: "teclado-hyperx-alloy-origins".into(),
                description: String::new(),
                image_url: String::new(),
                category_id: 4,
                image_hash: None,
            })
            .await
            .unwrap();
        repos
            .prices
            .create(NewPrice {
                product_id: product.id,
                store: "eBay".into(),
                amount: 120.0,
                currency: "USD".into(),
                url: String::new(),
                is_available: true,
                retrieved_at: Utc::now() - chrono::Duration::days(10),
            })
            .await
            .unwrap();

        let stats = reconciler
            .ingest_batch(
                vec![item("Teclado HyperX Alloy Origins", "", 4, "Coolmod", 104.5)],
                "Coolmod",
                "Teclados",
            )
            .await;
        assert_eq!(stats.valid, 1);
        assert_eq!(stats.stale_prices_deleted, 1);

        let prices = repos.prices.find_by_product(product.id).await.unwrap();
        assert_eq!(prices.len(), 1);
        assert_eq!(prices[0].store, "Coolmod");
    }

    #[tokio::test]
    async fn cleanup_deletes_old_quotes_and_reports_count() {
        let (reconciler, repos) = reconciler_with(HashMap::new()).await;

        let out = reconciler
            .ingest(item("Disco SSD Samsung 980 1TB NVMe", "", 6, "Aussar", 79.0))
            .await
            .unwrap();
        let IngestOutcome::Saved { product_id, .. } = out else {
            panic!("discarded")
        };

        // Age the quote past the cleanup window.
        let mut price = repos.prices.find_by_product(product_id).await.unwrap()[0].clone();
        price.retrieved_at = Utc::now() - chrono::Duration::days(8);
        repos.prices.update(&price).await.unwrap();

        assert!(repos
            .prices
            .best_price_for_product(product_id)
            .await
            .unwrap()
            .is_some());

        let deleted = reconciler
            .run_cleanup(chrono::Duration::days(7))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert!(repos
            .prices
            .best_price_for_product(product_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn name_containment_merges_minor_rewordings() {
        let (reconciler, repos) = reconciler_with(HashMap::new()).await;

        let out1 = reconciler
            .ingest(item("Monitor LG UltraGear 27GP850", "", 5, "Coolmod", 329.0))
            .await
            .unwrap();
        // Same product, longer name; no image, so only name containment can match.
        let out2 = reconciler
            .ingest(item(
                "Monitor LG UltraGear 27GP850 QHD 165Hz",
                "",
                5,
                "Aussar",
                319.0,
            ))
            .await
            .unwrap();

        let IngestOutcome::Saved { product_id: id1, .. } = out1 else {
            panic!("discarded")
        };
        let IngestOutcome::Saved { product_id: id2, .. } = out2 else {
            panic!("discarded")
        };
        assert_eq!(id1, id2);
        assert_eq!(repos.prices.find_by_product(id1).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn new_product_gets_fresh_unique_slug() {
        let (reconciler, repos) = reconciler_with(HashMap::new()).await;

        // A soft-deleted product still reserves its slug: it is invisible to
        // the match lookups but the uniqueness check must route around it.
        let tombstone = repos
            .products
            .create(NewProduct {
                name: "Auriculares Corsair HS80".into(),
                slug: "auriculares-corsair-hs80".into(),
                description: String::new(),
                image_url: String::new(),
                category_id: 3,
                image_hash: None,
            })
            .await
            .unwrap();
        repos.products.soft_delete(tombstone.id).await.unwrap();

        let out = reconciler
            .ingest(item("Auriculares Corsair HS80", "", 3, "Coolmod", 129.0))
            .await
            .unwrap();
        let IngestOutcome::Saved { product_id, .. } = out else {
            panic!("discarded")
        };
        let product = repos.products.find_by_id(product_id).await.unwrap().unwrap();
        assert_eq!(product.slug, "auriculares-corsair-hs80-1");
    }
}
