//! In-memory repository implementations.
//!
//! Backs the end-to-end tests and `--dry-run` style invocations; semantics
//! mirror the Postgres backend, including soft deletion and the
//! "limit 0 means no limit" convention.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::model::{
    Category, NewNotification, NewPrice, NewPriceAlert, NewProduct, Notification, Price,
    PriceAlert, Product,
};
use crate::domain::repos::{
    CategoryRepo, NotificationRepo, PriceAlertRepo, PriceRepo, ProductRepo, Repos,
};

#[derive(Default)]
struct Tables {
    categories: Vec<Category>,
    products: Vec<Product>,
    prices: Vec<Price>,
    alerts: Vec<PriceAlert>,
    notifications: Vec<Notification>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// All tables behind one lock; a single instance implements every repository
/// trait.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Repository bundle sharing this store.
    pub fn repos(self: &Arc<Self>) -> Repos {
        Repos {
            categories: self.clone(),
            products: self.clone(),
            prices: self.clone(),
            alerts: self.clone(),
            notifications: self.clone(),
        }
    }
}

fn apply_window<T>(items: Vec<T>, limit: i64, offset: i64) -> Vec<T> {
    let iter = items.into_iter().skip(offset.max(0) as usize);
    if limit > 0 {
        iter.take(limit as usize).collect()
    } else {
        iter.collect()
    }
}

#[async_trait]
impl CategoryRepo for MemoryStore {
    async fn create(&self, name: &str, slug: &str) -> Result<Category> {
        let mut t = self.tables.write().await;
        let id = t.next_id();
        let category = Category {
            id,
            name: name.to_string(),
            slug: slug.to_string(),
            product_count: 0,
        };
        t.categories.push(category.clone());
        Ok(category)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Category>> {
        let t = self.tables.read().await;
        Ok(t.categories.iter().find(|c| c.id == id).cloned())
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Category>> {
        let t = self.tables.read().await;
        Ok(t.categories.iter().find(|c| c.slug == slug).cloned())
    }

    async fn get_all(&self) -> Result<Vec<Category>> {
        let t = self.tables.read().await;
        Ok(t.categories.clone())
    }

    async fn get_all_with_product_count(&self) -> Result<Vec<Category>> {
        let t = self.tables.read().await;
        let mut out: Vec<Category> = t
            .categories
            .iter()
            .map(|c| {
                let mut c = c.clone();
                c.product_count = t
                    .products
                    .iter()
                    .filter(|p| p.category_id == c.id && p.deleted_at.is_none())
                    .count() as i64;
                c
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }
}

#[async_trait]
impl ProductRepo for MemoryStore {
    async fn create(&self, product: NewProduct) -> Result<Product> {
        let mut t = self.tables.write().await;
        let id = t.next_id();
        let now = Utc::now();
        let product = Product {
            id,
            name: product.name,
            slug: product.slug,
            description: product.description,
            image_url: product.image_url,
            category_id: product.category_id,
            image_hash: product.image_hash,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        t.products.push(product.clone());
        Ok(product)
    }

    async fn update(&self, product: &Product) -> Result<()> {
        let mut t = self.tables.write().await;
        if let Some(existing) = t.products.iter_mut().find(|p| p.id == product.id) {
            let mut updated = product.clone();
            updated.updated_at = Utc::now();
            *existing = updated;
        }
        Ok(())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Product>> {
        let t = self.tables.read().await;
        Ok(t.products
            .iter()
            .find(|p| p.id == id && p.deleted_at.is_none())
            .cloned())
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Product>> {
        let t = self.tables.read().await;
        Ok(t.products
            .iter()
            .find(|p| p.slug == slug && p.deleted_at.is_none())
            .cloned())
    }

    async fn exists_by_slug(&self, slug: &str) -> Result<bool> {
        let t = self.tables.read().await;
        Ok(t.products.iter().any(|p| p.slug == slug))
    }

    async fn find_by_category(
        &self,
        category_id: i64,
        limit: i64,
        offset: i64,
        store: Option<&str>,
    ) -> Result<Vec<Product>> {
        let t = self.tables.read().await;
        let matches: Vec<Product> = t
            .products
            .iter()
            .filter(|p| p.category_id == category_id && p.deleted_at.is_none())
            .filter(|p| match store {
                Some(store) => t.prices.iter().any(|pr| {
                    pr.product_id == p.id && pr.store == store && pr.deleted_at.is_none()
                }),
                None => true,
            })
            .cloned()
            .collect();
        Ok(apply_window(matches, limit, offset))
    }

    async fn find_best_deals(&self, limit: i64) -> Result<Vec<Product>> {
        let t = self.tables.read().await;
        let mut with_min: Vec<(f64, Product)> = t
            .products
            .iter()
            .filter(|p| p.deleted_at.is_none())
            .filter_map(|p| {
                t.prices
                    .iter()
                    .filter(|pr| {
                        pr.product_id == p.id && pr.is_available && pr.deleted_at.is_none()
                    })
                    .map(|pr| pr.amount)
                    .min_by(f64::total_cmp)
                    .map(|min| (min, p.clone()))
            })
            .collect();
        with_min.sort_by(|a, b| a.0.total_cmp(&b.0));
        Ok(apply_window(
            with_min.into_iter().map(|(_, p)| p).collect(),
            limit,
            0,
        ))
    }

    async fn count_by_category(&self, category_id: i64, store: Option<&str>) -> Result<i64> {
        Ok(self
            .find_by_category(category_id, 0, 0, store)
            .await?
            .len() as i64)
    }

    async fn soft_delete(&self, id: i64) -> Result<()> {
        let mut t = self.tables.write().await;
        if let Some(p) = t.products.iter_mut().find(|p| p.id == id) {
            p.deleted_at = Some(Utc::now());
        }
        Ok(())
    }
}

#[async_trait]
impl PriceRepo for MemoryStore {
    async fn create(&self, price: NewPrice) -> Result<Price> {
        let mut t = self.tables.write().await;
        let id = t.next_id();
        let now = Utc::now();
        let price = Price {
            id,
            product_id: price.product_id,
            store: price.store,
            amount: price.amount,
            currency: price.currency,
            url: price.url,
            is_available: price.is_available,
            retrieved_at: price.retrieved_at,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        t.prices.push(price.clone());
        Ok(price)
    }

    async fn update(&self, price: &Price) -> Result<()> {
        let mut t = self.tables.write().await;
        if let Some(existing) = t.prices.iter_mut().find(|p| p.id == price.id) {
            let mut updated = price.clone();
            updated.updated_at = Utc::now();
            *existing = updated;
        }
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let mut t = self.tables.write().await;
        if let Some(p) = t.prices.iter_mut().find(|p| p.id == id) {
            p.deleted_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn find_by_product(&self, product_id: i64) -> Result<Vec<Price>> {
        let t = self.tables.read().await;
        Ok(t.prices
            .iter()
            .filter(|p| p.product_id == product_id && p.deleted_at.is_none())
            .cloned()
            .collect())
    }

    async fn best_price_for_product(&self, product_id: i64) -> Result<Option<Price>> {
        Ok(self
            .top_offers_for_product(product_id, 1)
            .await?
            .into_iter()
            .next())
    }

    async fn top_offers_for_product(&self, product_id: i64, limit: i64) -> Result<Vec<Price>> {
        let t = self.tables.read().await;
        let mut offers: Vec<Price> = t
            .prices
            .iter()
            .filter(|p| p.product_id == product_id && p.is_available && p.deleted_at.is_none())
            .cloned()
            .collect();
        offers.sort_by(|a, b| a.amount.total_cmp(&b.amount));
        Ok(apply_window(offers, limit, 0))
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut t = self.tables.write().await;
        let now = Utc::now();
        let mut deleted = 0u64;
        for price in t
            .prices
            .iter_mut()
            .filter(|p| p.deleted_at.is_none() && p.retrieved_at < cutoff)
        {
            price.deleted_at = Some(now);
            deleted += 1;
        }
        Ok(deleted)
    }
}

#[async_trait]
impl PriceAlertRepo for MemoryStore {
    async fn create(&self, alert: NewPriceAlert) -> Result<PriceAlert> {
        let mut t = self.tables.write().await;
        let id = t.next_id();
        let now = Utc::now();
        let alert = PriceAlert {
            id,
            user_id: alert.user_id,
            product_id: alert.product_id,
            target_price: alert.target_price,
            notify_by_email: alert.notify_by_email,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        t.alerts.push(alert.clone());
        Ok(alert)
    }

    async fn update(&self, alert: &PriceAlert) -> Result<()> {
        let mut t = self.tables.write().await;
        if let Some(existing) = t.alerts.iter_mut().find(|a| a.id == alert.id) {
            let mut updated = alert.clone();
            updated.updated_at = Utc::now();
            *existing = updated;
        }
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let mut t = self.tables.write().await;
        t.alerts.retain(|a| a.id != id);
        Ok(())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<PriceAlert>> {
        let t = self.tables.read().await;
        Ok(t.alerts.iter().find(|a| a.id == id).cloned())
    }

    async fn find_by_user(&self, user_id: i64) -> Result<Vec<PriceAlert>> {
        let t = self.tables.read().await;
        Ok(t.alerts
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn active_alerts_for_price(
        &self,
        product_id: i64,
        price: f64,
    ) -> Result<Vec<PriceAlert>> {
        let t = self.tables.read().await;
        Ok(t.alerts
            .iter()
            .filter(|a| a.product_id == product_id && a.is_active && a.target_price >= price)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl NotificationRepo for MemoryStore {
    async fn create(&self, notification: NewNotification) -> Result<Notification> {
        let mut t = self.tables.write().await;
        let id = t.next_id();
        let notification = Notification {
            id,
            user_id: notification.user_id,
            product_id: notification.product_id,
            alert_id: notification.alert_id,
            title: notification.title,
            message: notification.message,
            is_read: false,
            created_at: Utc::now(),
        };
        t.notifications.push(notification.clone());
        Ok(notification)
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let mut t = self.tables.write().await;
        t.notifications.retain(|n| n.id != id);
        Ok(())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Notification>> {
        let t = self.tables.read().await;
        Ok(t.notifications.iter().find(|n| n.id == id).cloned())
    }

    async fn find_by_alert(&self, alert_id: i64) -> Result<Vec<Notification>> {
        let t = self.tables.read().await;
        Ok(t.notifications
            .iter()
            .filter(|n| n.alert_id == Some(alert_id))
            .cloned()
            .collect())
    }

    async fn find_by_user(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Notification>> {
        let t = self.tables.read().await;
        let mut out: Vec<Notification> = t
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(apply_window(out, limit, offset))
    }

    async fn find_unread_by_user(&self, user_id: i64) -> Result<Vec<Notification>> {
        let t = self.tables.read().await;
        Ok(t.notifications
            .iter()
            .filter(|n| n.user_id == user_id && !n.is_read)
            .cloned()
            .collect())
    }

    async fn count_unread_by_user(&self, user_id: i64) -> Result<i64> {
        Ok(self.find_unread_by_user(user_id).await?.len() as i64)
    }

    async fn mark_read(&self, id: i64) -> Result<()> {
        let mut t = self.tables.write().await;
        if let Some(n) = t.notifications.iter_mut().find(|n| n.id == id) {
            n.is_read = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::seed_categories;

    #[tokio::test]
    async fn seeding_is_idempotent() {
        let store = MemoryStore::new();
        let repos = store.repos();
        seed_categories(repos.categories.as_ref()).await.unwrap();
        seed_categories(repos.categories.as_ref()).await.unwrap();
        let all = repos.categories.get_all().await.unwrap();
        assert_eq!(all.len(), 6);
        assert_eq!(all[0].slug, "portatiles");
    }

    #[tokio::test]
    async fn best_deals_orders_by_cheapest_available_quote() {
        let store = MemoryStore::new();
        let repos = store.repos();

        let cat = repos.categories.create("Teclados", "teclados").await.unwrap();
        let mut ids = Vec::new();
        for (name, slug, amount) in [
            ("A", "a", 50.0),
            ("B", "b", 20.0),
            ("C", "c", 35.0),
        ] {
            let p = repos
                .products
                .create(NewProduct {
                    name: name.into(),
                    slug: slug.into(),
                    description: String::new(),
                    image_url: String::new(),
                    category_id: cat.id,
                    image_hash: None,
                })
                .await
                .unwrap();
            repos
                .prices
                .create(NewPrice {
                    product_id: p.id,
                    store: "Coolmod".into(),
                    amount,
                    currency: "EUR".into(),
                    url: String::new(),
                    is_available: true,
                    retrieved_at: Utc::now(),
                })
                .await
                .unwrap();
            ids.push(p.id);
        }

        let deals = repos.products.find_best_deals(2).await.unwrap();
        assert_eq!(deals.len(), 2);
        assert_eq!(deals[0].id, ids[1]);
        assert_eq!(deals[1].id, ids[2]);
    }

    #[tokio::test]
    async fn product_counts_ignore_soft_deleted_rows() {
        let store = MemoryStore::new();
        let repos = store.repos();
        let cat = repos.categories.create("Discos SSD", "ssd").await.unwrap();

        let mut last_id = 0;
        for slug in ["ssd-a", "ssd-b"] {
            let p = repos
                .products
                .create(NewProduct {
                    name: slug.to_uppercase(),
                    slug: slug.into(),
                    description: String::new(),
                    image_url: String::new(),
                    category_id: cat.id,
                    image_hash: None,
                })
                .await
                .unwrap();
            last_id = p.id;
        }
        repos.products.soft_delete(last_id).await.unwrap();

        assert_eq!(repos.products.count_by_category(cat.id, None).await.unwrap(), 1);
        let counted = repos.categories.get_all_with_product_count().await.unwrap();
        assert_eq!(counted.len(), 1);
        assert_eq!(counted[0].product_count, 1);
    }

    #[tokio::test]
    async fn store_filter_restricts_category_listing() {
        let store = MemoryStore::new();
        let repos = store.repos();
        let cat = repos.categories.create("Monitores", "monitores").await.unwrap();
        let p = repos
            .products
            .create(NewProduct {
                name: "Monitor X".into(),
                slug: "monitor-x".into(),
                description: String::new(),
                image_url: String::new(),
                category_id: cat.id,
                image_hash: None,
            })
            .await
            .unwrap();
        repos
            .prices
            .create(NewPrice {
                product_id: p.id,
                store: "Aussar".into(),
                amount: 199.0,
                currency: "EUR".into(),
                url: String::new(),
                is_available: true,
                retrieved_at: Utc::now(),
            })
            .await
            .unwrap();

        let aussar = repos
            .products
            .find_by_category(cat.id, 0, 0, Some("Aussar"))
            .await
            .unwrap();
        let ebay = repos
            .products
            .find_by_category(cat.id, 0, 0, Some("eBay"))
            .await
            .unwrap();
        assert_eq!(aussar.len(), 1);
        assert!(ebay.is_empty());
    }
}
