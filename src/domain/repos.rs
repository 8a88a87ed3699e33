//! Repository interfaces consumed by the ingestion pipeline.
//!
//! The pipeline only ever talks to these traits; the concrete backends live
//! in `persistence` (Postgres for the daemon, in-memory for tests).

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::domain::model::{
    Category, NewNotification, NewPrice, NewPriceAlert, NewProduct, Notification, Price,
    PriceAlert, Product,
};

#[async_trait]
pub trait CategoryRepo: Send + Sync {
    /// Insert a category and return it with its assigned id.
    async fn create(&self, name: &str, slug: &str) -> Result<Category>;
    async fn find_by_id(&self, id: i64) -> Result<Option<Category>>;
    async fn find_by_slug(&self, slug: &str) -> Result<Option<Category>>;
    async fn get_all(&self) -> Result<Vec<Category>>;
    /// All categories with their live product counts.
    async fn get_all_with_product_count(&self) -> Result<Vec<Category>>;
}

#[async_trait]
pub trait ProductRepo: Send + Sync {
    async fn create(&self, product: NewProduct) -> Result<Product>;
    async fn update(&self, product: &Product) -> Result<()>;
    async fn find_by_id(&self, id: i64) -> Result<Option<Product>>;
    async fn find_by_slug(&self, slug: &str) -> Result<Option<Product>>;
    async fn exists_by_slug(&self, slug: &str) -> Result<bool>;
    /// Products in a category, optionally restricted to ones quoted by a
    /// given store. `limit == 0` means no limit.
    async fn find_by_category(
        &self,
        category_id: i64,
        limit: i64,
        offset: i64,
        store: Option<&str>,
    ) -> Result<Vec<Product>>;
    /// Products ordered by their lowest available quote, cheapest first.
    async fn find_best_deals(&self, limit: i64) -> Result<Vec<Product>>;
    async fn count_by_category(&self, category_id: i64, store: Option<&str>) -> Result<i64>;
    async fn soft_delete(&self, id: i64) -> Result<()>;
}

#[async_trait]
pub trait PriceRepo: Send + Sync {
    async fn create(&self, price: NewPrice) -> Result<Price>;
    async fn update(&self, price: &Price) -> Result<()>;
    async fn delete(&self, id: i64) -> Result<()>;
    async fn find_by_product(&self, product_id: i64) -> Result<Vec<Price>>;
    /// Lowest available quote for a product, if any.
    async fn best_price_for_product(&self, product_id: i64) -> Result<Option<Price>>;
    /// Up to `limit` available quotes for a product, cheapest first.
    async fn top_offers_for_product(&self, product_id: i64, limit: i64) -> Result<Vec<Price>>;
    /// Drop quotes last refreshed before `cutoff`; returns how many went.
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

#[async_trait]
pub trait PriceAlertRepo: Send + Sync {
    async fn create(&self, alert: NewPriceAlert) -> Result<PriceAlert>;
    async fn update(&self, alert: &PriceAlert) -> Result<()>;
    async fn delete(&self, id: i64) -> Result<()>;
    async fn find_by_id(&self, id: i64) -> Result<Option<PriceAlert>>;
    async fn find_by_user(&self, user_id: i64) -> Result<Vec<PriceAlert>>;
    /// Active alerts on a product whose target price is at or above `price`.
    async fn active_alerts_for_price(&self, product_id: i64, price: f64)
        -> Result<Vec<PriceAlert>>;
}

#[async_trait]
pub trait NotificationRepo: Send + Sync {
    async fn create(&self, notification: NewNotification) -> Result<Notification>;
    async fn delete(&self, id: i64) -> Result<()>;
    async fn find_by_id(&self, id: i64) -> Result<Option<Notification>>;
    async fn find_by_alert(&self, alert_id: i64) -> Result<Vec<Notification>>;
    async fn find_by_user(&self, user_id: i64, limit: i64, offset: i64)
        -> Result<Vec<Notification>>;
    async fn find_unread_by_user(&self, user_id: i64) -> Result<Vec<Notification>>;
    async fn count_unread_by_user(&self, user_id: i64) -> Result<i64>;
    async fn mark_read(&self, id: i64) -> Result<()>;
}

/// Bundle of repository handles threaded through the pipeline.
#[derive(Clone)]
pub struct Repos {
    pub categories: Arc<dyn CategoryRepo>,
    pub products: Arc<dyn ProductRepo>,
    pub prices: Arc<dyn PriceRepo>,
    pub alerts: Arc<dyn PriceAlertRepo>,
    pub notifications: Arc<dyn NotificationRepo>,
}
