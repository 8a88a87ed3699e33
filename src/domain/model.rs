//! Core catalog entities shared by the scrapers, the reconciler and the
//! persistence layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fixed product category. The set is seeded once at startup and never
/// deleted by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub slug: String,
    /// Derived count of live products; only populated by count-aware queries.
    #[serde(default)]
    pub product_count: i64,
}

/// Canonical catalog product. The slug is globally unique and stable once
/// assigned; the category id may be corrected during ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub image_url: String,
    pub category_id: i64,
    /// 64-bit perceptual hash of the product image, when one was computed.
    pub image_hash: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Insert payload for a product; the repository assigns id and timestamps.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub slug: String,
    pub description: String,
    pub image_url: String,
    pub category_id: i64,
    pub image_hash: Option<u64>,
}

/// One store's price quote for a product. The reconciler keeps at most one
/// live quote per (product, store) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Price {
    pub id: i64,
    pub product_id: i64,
    pub store: String,
    pub amount: f64,
    pub currency: String,
    pub url: String,
    pub is_available: bool,
    pub retrieved_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewPrice {
    pub product_id: i64,
    pub store: String,
    pub amount: f64,
    pub currency: String,
    pub url: String,
    pub is_available: bool,
    pub retrieved_at: DateTime<Utc>,
}

/// A user's standing request to be notified when a product drops to or below
/// a target price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceAlert {
    pub id: i64,
    pub user_id: i64,
    pub product_id: i64,
    pub target_price: f64,
    pub notify_by_email: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPriceAlert {
    pub user_id: i64,
    pub product_id: i64,
    pub target_price: f64,
    pub notify_by_email: bool,
}

/// In-app notification produced when an alert triggers. Write-once per
/// triggering price observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub product_id: i64,
    pub alert_id: Option<i64>,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: i64,
    pub product_id: i64,
    pub alert_id: Option<i64>,
    pub title: String,
    pub message: String,
}

/// One listing entry as extracted from a retailer page. Ephemeral: produced
/// by a store adapter, consumed and discarded by the reconciler.
#[derive(Debug, Clone)]
pub struct ScrapedItem {
    pub name: String,
    pub description: String,
    pub image_url: String,
    /// Category being scraped; may be corrected by classification.
    pub category_id: i64,
    pub store: String,
    pub url: String,
    pub price: f64,
    pub currency: String,
    pub is_available: bool,
    pub retrieved_at: DateTime<Utc>,
}

impl ScrapedItem {
    /// Convenience constructor for a listing entry with the fields every
    /// adapter extracts; description stays empty until a detail scrape.
    #[allow(clippy::too_many_arguments)]
    pub fn listing(
        name: String,
        image_url: String,
        category_id: i64,
        store: &str,
        url: String,
        price: f64,
        currency: &str,
    ) -> Self {
        Self {
            name,
            description: String::new(),
            image_url,
            category_id,
            store: store.to_string(),
            url,
            price,
            currency: currency.to_string(),
            is_available: true,
            retrieved_at: Utc::now(),
        }
    }
}
