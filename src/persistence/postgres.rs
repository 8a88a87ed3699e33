//! Postgres repository implementations.
//!
//! Runtime (non-macro) queries with manual row mapping; soft-deleted rows are
//! filtered everywhere. `LIMIT NULLIF($n, 0)` implements the "limit 0 means
//! no limit" convention the callers rely on.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::domain::model::{
    Category, NewNotification, NewPrice, NewPriceAlert, NewProduct, Notification, Price,
    PriceAlert, Product,
};
use crate::domain::repos::{
    CategoryRepo, NotificationRepo, PriceAlertRepo, PriceRepo, ProductRepo, Repos,
};
use crate::persistence::db::Db;

/// Build the full repository bundle over one pool.
pub fn postgres_repos(db: &Db) -> Repos {
    Repos {
        categories: std::sync::Arc::new(PgCategoryRepo::new(db.pool.clone())),
        products: std::sync::Arc::new(PgProductRepo::new(db.pool.clone())),
        prices: std::sync::Arc::new(PgPriceRepo::new(db.pool.clone())),
        alerts: std::sync::Arc::new(PgPriceAlertRepo::new(db.pool.clone())),
        notifications: std::sync::Arc::new(PgNotificationRepo::new(db.pool.clone())),
    }
}

fn category_from_row(row: &PgRow) -> Result<Category> {
    Ok(Category {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        slug: row.try_get("slug")?,
        product_count: row.try_get("product_count").unwrap_or(0),
    })
}

fn product_from_row(row: &PgRow) -> Result<Product> {
    Ok(Product {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        slug: row.try_get("slug")?,
        description: row.try_get("description")?,
        image_url: row.try_get("image_url")?,
        category_id: row.try_get("category_id")?,
        image_hash: row
            .try_get::<Option<i64>, _>("image_hash")?
            .map(|v| v as u64),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

fn price_from_row(row: &PgRow) -> Result<Price> {
    Ok(Price {
        id: row.try_get("id")?,
        product_id: row.try_get("product_id")?,
        store: row.try_get("store")?,
        amount: row.try_get("amount")?,
        currency: row.try_get("currency")?,
        url: row.try_get("url")?,
        is_available: row.try_get("is_available")?,
        retrieved_at: row.try_get("retrieved_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

fn alert_from_row(row: &PgRow) -> Result<PriceAlert> {
    Ok(PriceAlert {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        product_id: row.try_get("product_id")?,
        target_price: row.try_get("target_price")?,
        notify_by_email: row.try_get("notify_by_email")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn notification_from_row(row: &PgRow) -> Result<Notification> {
    Ok(Notification {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        product_id: row.try_get("product_id")?,
        alert_id: row.try_get("alert_id")?,
        title: row.try_get("title")?,
        message: row.try_get("message")?,
        is_read: row.try_get("is_read")?,
        created_at: row.try_get("created_at")?,
    })
}

pub struct PgCategoryRepo {
    pool: PgPool,
}

impl PgCategoryRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CategoryRepo for PgCategoryRepo {
    async fn create(&self, name: &str, slug: &str) -> Result<Category> {
        let row = sqlx::query("INSERT INTO categories (name, slug) VALUES ($1, $2) RETURNING id, name, slug")
            .bind(name)
            .bind(slug)
            .fetch_one(&self.pool)
            .await?;
        category_from_row(&row)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Category>> {
        let row = sqlx::query("SELECT id, name, slug FROM categories WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(category_from_row).transpose()
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Category>> {
        let row = sqlx::query("SELECT id, name, slug FROM categories WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(category_from_row).transpose()
    }

    async fn get_all(&self) -> Result<Vec<Category>> {
        let rows = sqlx::query("SELECT id, name, slug FROM categories ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(category_from_row).collect()
    }

    async fn get_all_with_product_count(&self) -> Result<Vec<Category>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.name, c.slug, COUNT(p.id) AS product_count
            FROM categories c
            LEFT JOIN products p ON p.category_id = c.id AND p.deleted_at IS NULL
            GROUP BY c.id
            ORDER BY c.name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(category_from_row).collect()
    }
}

pub struct PgProductRepo {
    pool: PgPool,
}

impl PgProductRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const PRODUCT_COLS: &str =
    "id, name, slug, description, image_url, category_id, image_hash, created_at, updated_at, deleted_at";

#[async_trait]
impl ProductRepo for PgProductRepo {
    async fn create(&self, product: NewProduct) -> Result<Product> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO products (name, slug, description, image_url, category_id, image_hash)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {PRODUCT_COLS}
            "#
        ))
        .bind(&product.name)
        .bind(&product.slug)
        .bind(&product.description)
        .bind(&product.image_url)
        .bind(product.category_id)
        .bind(product.image_hash.map(|h| h as i64))
        .fetch_one(&self.pool)
        .await?;
        product_from_row(&row)
    }

    async fn update(&self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE products
            SET name = $1, description = $2, image_url = $3, category_id = $4,
                image_hash = $5, updated_at = now()
            WHERE id = $6
            "#,
        )
        .bind(&product.name)
        .bind(&product.description)
        .bind(&product.image_url)
        .bind(product.category_id)
        .bind(product.image_hash.map(|h| h as i64))
        .bind(product.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Product>> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLS} FROM products WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(product_from_row).transpose()
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Product>> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLS} FROM products WHERE slug = $1 AND deleted_at IS NULL"
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(product_from_row).transpose()
    }

    async fn exists_by_slug(&self, slug: &str) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM products WHERE slug = $1)")
                .bind(slug)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn find_by_category(
        &self,
        category_id: i64,
        limit: i64,
        offset: i64,
        store: Option<&str>,
    ) -> Result<Vec<Product>> {
        let rows = match store {
            Some(store) => {
                sqlx::query(&format!(
                    r#"
                    SELECT DISTINCT p.id, p.name, p.slug, p.description, p.image_url,
                           p.category_id, p.image_hash, p.created_at, p.updated_at, p.deleted_at
                    FROM products p
                    JOIN prices pr ON pr.product_id = p.id AND pr.deleted_at IS NULL
                    WHERE p.category_id = $1 AND p.deleted_at IS NULL AND pr.store = $2
                    ORDER BY p.id
                    LIMIT NULLIF($3, 0) OFFSET $4
                    "#
                ))
                .bind(category_id)
                .bind(store)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    r#"
                    SELECT {PRODUCT_COLS} FROM products
                    WHERE category_id = $1 AND deleted_at IS NULL
                    ORDER BY id
                    LIMIT NULLIF($2, 0) OFFSET $3
                    "#
                ))
                .bind(category_id)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.iter().map(product_from_row).collect()
    }

    async fn find_best_deals(&self, limit: i64) -> Result<Vec<Product>> {
        let rows = sqlx::query(
            r#"
            SELECT p.id, p.name, p.slug, p.description, p.image_url,
                   p.category_id, p.image_hash, p.created_at, p.updated_at, p.deleted_at
            FROM products p
            JOIN (
                SELECT product_id, MIN(amount) AS min_amount
                FROM prices
                WHERE is_available = TRUE AND deleted_at IS NULL
                GROUP BY product_id
            ) best ON best.product_id = p.id
            WHERE p.deleted_at IS NULL
            ORDER BY best.min_amount ASC
            LIMIT NULLIF($1, 0)
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(product_from_row).collect()
    }

    async fn count_by_category(&self, category_id: i64, store: Option<&str>) -> Result<i64> {
        let count: i64 = match store {
            Some(store) => {
                sqlx::query_scalar(
                    r#"
                    SELECT COUNT(DISTINCT p.id)
                    FROM products p
                    JOIN prices pr ON pr.product_id = p.id AND pr.deleted_at IS NULL
                    WHERE p.category_id = $1 AND p.deleted_at IS NULL AND pr.store = $2
                    "#,
                )
                .bind(category_id)
                .bind(store)
                .fetch_one(&self.pool)
                .await?
            }
            None => {
                sqlx::query_scalar(
                    "SELECT COUNT(*) FROM products WHERE category_id = $1 AND deleted_at IS NULL",
                )
                .bind(category_id)
                .fetch_one(&self.pool)
                .await?
            }
        };
        Ok(count)
    }

    async fn soft_delete(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE products SET deleted_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

pub struct PgPriceRepo {
    pool: PgPool,
}

impl PgPriceRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const PRICE_COLS: &str = "id, product_id, store, amount, currency, url, is_available, retrieved_at, created_at, updated_at, deleted_at";

#[async_trait]
impl PriceRepo for PgPriceRepo {
    async fn create(&self, price: NewPrice) -> Result<Price> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO prices (product_id, store, amount, currency, url, is_available, retrieved_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {PRICE_COLS}
            "#
        ))
        .bind(price.product_id)
        .bind(&price.store)
        .bind(price.amount)
        .bind(&price.currency)
        .bind(&price.url)
        .bind(price.is_available)
        .bind(price.retrieved_at)
        .fetch_one(&self.pool)
        .await?;
        price_from_row(&row)
    }

    async fn update(&self, price: &Price) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE prices
            SET amount = $1, currency = $2, url = $3, is_available = $4,
                retrieved_at = $5, updated_at = now()
            WHERE id = $6
            "#,
        )
        .bind(price.amount)
        .bind(&price.currency)
        .bind(&price.url)
        .bind(price.is_available)
        .bind(price.retrieved_at)
        .bind(price.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE prices SET deleted_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_by_product(&self, product_id: i64) -> Result<Vec<Price>> {
        let rows = sqlx::query(&format!(
            "SELECT {PRICE_COLS} FROM prices WHERE product_id = $1 AND deleted_at IS NULL"
        ))
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(price_from_row).collect()
    }

    async fn best_price_for_product(&self, product_id: i64) -> Result<Option<Price>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {PRICE_COLS} FROM prices
            WHERE product_id = $1 AND is_available = TRUE AND deleted_at IS NULL
            ORDER BY amount ASC
            LIMIT 1
            "#
        ))
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(price_from_row).transpose()
    }

    async fn top_offers_for_product(&self, product_id: i64, limit: i64) -> Result<Vec<Price>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {PRICE_COLS} FROM prices
            WHERE product_id = $1 AND is_available = TRUE AND deleted_at IS NULL
            ORDER BY amount ASC
            LIMIT NULLIF($2, 0)
            "#
        ))
        .bind(product_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(price_from_row).collect()
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE prices SET deleted_at = now() WHERE retrieved_at < $1 AND deleted_at IS NULL",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

pub struct PgPriceAlertRepo {
    pool: PgPool,
}

impl PgPriceAlertRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const ALERT_COLS: &str =
    "id, user_id, product_id, target_price, notify_by_email, is_active, created_at, updated_at";

#[async_trait]
impl PriceAlertRepo for PgPriceAlertRepo {
    async fn create(&self, alert: NewPriceAlert) -> Result<PriceAlert> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO price_alerts (user_id, product_id, target_price, notify_by_email)
            VALUES ($1, $2, $3, $4)
            RETURNING {ALERT_COLS}
            "#
        ))
        .bind(alert.user_id)
        .bind(alert.product_id)
        .bind(alert.target_price)
        .bind(alert.notify_by_email)
        .fetch_one(&self.pool)
        .await?;
        alert_from_row(&row)
    }

    async fn update(&self, alert: &PriceAlert) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE price_alerts
            SET target_price = $1, notify_by_email = $2, is_active = $3, updated_at = now()
            WHERE id = $4
            "#,
        )
        .bind(alert.target_price)
        .bind(alert.notify_by_email)
        .bind(alert.is_active)
        .bind(alert.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM price_alerts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<PriceAlert>> {
        let row = sqlx::query(&format!("SELECT {ALERT_COLS} FROM price_alerts WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(alert_from_row).transpose()
    }

    async fn find_by_user(&self, user_id: i64) -> Result<Vec<PriceAlert>> {
        let rows = sqlx::query(&format!(
            "SELECT {ALERT_COLS} FROM price_alerts WHERE user_id = $1 ORDER BY id"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(alert_from_row).collect()
    }

    async fn active_alerts_for_price(
        &self,
        product_id: i64,
        price: f64,
    ) -> Result<Vec<PriceAlert>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ALERT_COLS} FROM price_alerts
            WHERE product_id = $1 AND is_active = TRUE AND target_price >= $2
            "#
        ))
        .bind(product_id)
        .bind(price)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(alert_from_row).collect()
    }
}

pub struct PgNotificationRepo {
    pool: PgPool,
}

impl PgNotificationRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const NOTIFICATION_COLS: &str =
    "id, user_id, product_id, alert_id, title, message, is_read, created_at";

#[async_trait]
impl NotificationRepo for PgNotificationRepo {
    async fn create(&self, notification: NewNotification) -> Result<Notification> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO notifications (user_id, product_id, alert_id, title, message)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {NOTIFICATION_COLS}
            "#
        ))
        .bind(notification.user_id)
        .bind(notification.product_id)
        .bind(notification.alert_id)
        .bind(&notification.title)
        .bind(&notification.message)
        .fetch_one(&self.pool)
        .await?;
        notification_from_row(&row)
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM notifications WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Notification>> {
        let row = sqlx::query(&format!(
            "SELECT {NOTIFICATION_COLS} FROM notifications WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(notification_from_row).transpose()
    }

    async fn find_by_alert(&self, alert_id: i64) -> Result<Vec<Notification>> {
        let rows = sqlx::query(&format!(
            "SELECT {NOTIFICATION_COLS} FROM notifications WHERE alert_id = $1 ORDER BY id"
        ))
        .bind(alert_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(notification_from_row).collect()
    }

    async fn find_by_user(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Notification>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {NOTIFICATION_COLS} FROM notifications
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT NULLIF($2, 0) OFFSET $3
            "#
        ))
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(notification_from_row).collect()
    }

    async fn find_unread_by_user(&self, user_id: i64) -> Result<Vec<Notification>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {NOTIFICATION_COLS} FROM notifications
            WHERE user_id = $1 AND is_read = FALSE
            ORDER BY created_at DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(notification_from_row).collect()
    }

    async fn count_unread_by_user(&self, user_id: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND is_read = FALSE",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn mark_read(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE notifications SET is_read = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
