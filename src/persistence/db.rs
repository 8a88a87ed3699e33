//! Postgres pool bootstrap.

use anyhow::Result;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::PgPool;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument};

#[derive(Clone)]
pub struct Db {
    pub pool: PgPool,
}

impl Db {
    // SECURITY: never include raw DSNs in tracing spans (they may contain credentials).
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let mut connect_options = PgConnectOptions::from_str(database_url)?;

        if database_url.contains("sslmode=require") {
            connect_options = connect_options.ssl_mode(PgSslMode::Require);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .connect_with(connect_options)
            .await?;
        info!("connected to db");
        Ok(Self { pool })
    }

    /// Bring the schema up idempotently. Gated behind an explicit call so
    /// read-only deployments never push DDL.
    pub async fn ensure_schema(&self) -> Result<()> {
        for stmt in SCHEMA {
            sqlx::query(stmt).execute(&self.pool).await?;
        }
        info!("schema ensured");
        Ok(())
    }
}

const SCHEMA: [&str; 9] = [
    r#"
    CREATE TABLE IF NOT EXISTS categories (
        id          BIGSERIAL PRIMARY KEY,
        name        TEXT NOT NULL,
        slug        TEXT NOT NULL UNIQUE,
        created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
    r#"
    CREATE TABLE IF NOT EXISTS products (
        id          BIGSERIAL PRIMARY KEY,
        name        VARCHAR(200) NOT NULL,
        slug        VARCHAR(100) NOT NULL UNIQUE,
        description TEXT NOT NULL DEFAULT '',
        image_url   VARCHAR(1024) NOT NULL DEFAULT '',
        category_id BIGINT NOT NULL REFERENCES categories(id),
        image_hash  BIGINT,
        created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
        deleted_at  TIMESTAMPTZ
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_products_category ON products(category_id)",
    r#"
    CREATE TABLE IF NOT EXISTS prices (
        id           BIGSERIAL PRIMARY KEY,
        product_id   BIGINT NOT NULL REFERENCES products(id),
        store        VARCHAR(50) NOT NULL,
        amount       DOUBLE PRECISION NOT NULL,
        currency     VARCHAR(3) NOT NULL DEFAULT 'EUR',
        url          VARCHAR(1024) NOT NULL,
        is_available BOOLEAN NOT NULL DEFAULT TRUE,
        retrieved_at TIMESTAMPTZ NOT NULL,
        created_at   TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at   TIMESTAMPTZ NOT NULL DEFAULT now(),
        deleted_at   TIMESTAMPTZ
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_prices_product ON prices(product_id)",
    "CREATE INDEX IF NOT EXISTS idx_prices_retrieved_at ON prices(retrieved_at)",
    r#"
    CREATE TABLE IF NOT EXISTS price_alerts (
        id              BIGSERIAL PRIMARY KEY,
        user_id         BIGINT NOT NULL,
        product_id      BIGINT NOT NULL REFERENCES products(id),
        target_price    DOUBLE PRECISION NOT NULL,
        notify_by_email BOOLEAN NOT NULL DEFAULT FALSE,
        is_active       BOOLEAN NOT NULL DEFAULT TRUE,
        created_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at      TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
    r#"
    CREATE TABLE IF NOT EXISTS notifications (
        id         BIGSERIAL PRIMARY KEY,
        user_id    BIGINT NOT NULL,
        product_id BIGINT NOT NULL,
        alert_id   BIGINT,
        title      TEXT NOT NULL,
        message    TEXT NOT NULL,
        is_read    BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id)",
];
