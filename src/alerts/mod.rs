//! Price alert evaluation and notification fan-out.
//!
//! Alerts are created/updated by the user-facing API; this service owns the
//! triggering side: the immediate check after a create/update, the periodic
//! sweep over the current best deals, and the exactly-once guarantee per
//! triggering price observation. Delivery (email etc.) sits behind the
//! [`Notifier`] trait and can never block or fail the ingestion path.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::model::{
    NewNotification, NewPriceAlert, Notification, Price, PriceAlert, Product,
};
use crate::domain::repos::Repos;

/// Downstream delivery channel for triggered alerts.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, alert: &PriceAlert, product: &Product, price: &Price) -> Result<()>;
}

/// Delivery stand-in that only writes a log line; used when no email
/// transport is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, alert: &PriceAlert, product: &Product, price: &Price) -> Result<()> {
        info!(
            user = alert.user_id,
            product = %product.name,
            amount = price.amount,
            store = %price.store,
            target = alert.target_price,
            "price alert triggered"
        );
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct AlertConfig {
    /// How many best-deal products the periodic sweep considers.
    pub best_deals_window: i64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            best_deals_window: 100,
        }
    }
}

pub struct AlertService {
    repos: Repos,
    notifier: Arc<dyn Notifier>,
    cfg: AlertConfig,
}

impl AlertService {
    pub fn new(repos: Repos, notifier: Arc<dyn Notifier>, cfg: AlertConfig) -> Self {
        Self {
            repos,
            notifier,
            cfg,
        }
    }

    /// Create an alert and, when the product's best price already meets the
    /// target, notify right away.
    pub async fn create_alert(
        &self,
        user_id: i64,
        product_id: i64,
        target_price: f64,
        notify_by_email: bool,
    ) -> Result<PriceAlert> {
        let product = self
            .repos
            .products
            .find_by_id(product_id)
            .await?
            .ok_or_else(|| anyhow!("product {product_id} not found"))?;

        let alert = self
            .repos
            .alerts
            .create(NewPriceAlert {
                user_id,
                product_id,
                target_price,
                notify_by_email,
            })
            .await?;

        if let Some(best) = self.repos.prices.best_price_for_product(product_id).await? {
            if best.amount <= alert.target_price {
                self.trigger(&alert, &product, &best).await;
            }
        }

        Ok(alert)
    }

    /// Update an alert's parameters; re-checks the current price when the
    /// alert stays active.
    pub async fn update_alert(
        &self,
        alert_id: i64,
        user_id: i64,
        target_price: f64,
        notify_by_email: bool,
        is_active: bool,
    ) -> Result<PriceAlert> {
        let mut alert = self
            .repos
            .alerts
            .find_by_id(alert_id)
            .await?
            .ok_or_else(|| anyhow!("alert {alert_id} not found"))?;
        if alert.user_id != user_id {
            bail!("alert {alert_id} does not belong to user {user_id}");
        }

        alert.target_price = target_price;
        alert.notify_by_email = notify_by_email;
        alert.is_active = is_active;
        self.repos.alerts.update(&alert).await?;

        if alert.is_active {
            if let Some(product) = self.repos.products.find_by_id(alert.product_id).await? {
                if let Some(best) = self
                    .repos
                    .prices
                    .best_price_for_product(alert.product_id)
                    .await?
                {
                    if best.amount <= alert.target_price {
                        self.trigger(&alert, &product, &best).await;
                    }
                }
            }
        }

        Ok(alert)
    }

    /// Delete an alert. Its notifications go first: the cascade lives here,
    /// not in the schema.
    pub async fn delete_alert(&self, alert_id: i64, user_id: i64) -> Result<()> {
        let alert = self
            .repos
            .alerts
            .find_by_id(alert_id)
            .await?
            .ok_or_else(|| anyhow!("alert {alert_id} not found"))?;
        if alert.user_id != user_id {
            bail!("alert {alert_id} does not belong to user {user_id}");
        }

        for notification in self.repos.notifications.find_by_alert(alert_id).await? {
            if let Err(e) = self.repos.notifications.delete(notification.id).await {
                warn!(notification = notification.id, error = %e, "failed to delete notification for alert");
            }
        }

        self.repos.alerts.delete(alert_id).await
    }

    pub async fn user_alerts(&self, user_id: i64) -> Result<Vec<PriceAlert>> {
        self.repos.alerts.find_by_user(user_id).await
    }

    /// Periodic sweep: match the current best deals against active alerts.
    pub async fn check_alerts(&self) -> Result<()> {
        let started = std::time::Instant::now();
        let deals = self
            .repos
            .products
            .find_best_deals(self.cfg.best_deals_window)
            .await?;

        for product in deals {
            let best = match self.repos.prices.best_price_for_product(product.id).await {
                Ok(Some(price)) => price,
                Ok(None) => continue,
                Err(e) => {
                    warn!(product = product.id, error = %e, "could not load best price");
                    continue;
                }
            };

            let alerts = match self
                .repos
                .alerts
                .active_alerts_for_price(product.id, best.amount)
                .await
            {
                Ok(alerts) => alerts,
                Err(e) => {
                    warn!(product = product.id, error = %e, "could not load alerts");
                    continue;
                }
            };

            for alert in alerts {
                self.trigger(&alert, &product, &best).await;
            }
        }

        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "alert check finished"
        );
        Ok(())
    }

    /// Record and deliver one triggered alert. Exactly once per triggering
    /// price observation: an alert already notified at or after the quote's
    /// retrieval time is skipped.
    async fn trigger(&self, alert: &PriceAlert, product: &Product, price: &Price) {
        match self.repos.notifications.find_by_alert(alert.id).await {
            Ok(existing) => {
                if existing.iter().any(|n| n.created_at >= price.retrieved_at) {
                    debug!(alert = alert.id, "already notified for this price observation");
                    return;
                }
            }
            Err(e) => {
                warn!(alert = alert.id, error = %e, "could not check prior notifications; skipping trigger");
                return;
            }
        }

        let title = format!("¡Alerta de precio para {}!", product.name);
        let message = format!(
            "El precio actual es {:.2} {} en {}, por debajo de tu objetivo de {:.2}.",
            price.amount, price.currency, price.store, alert.target_price
        );

        if let Err(e) = self
            .repos
            .notifications
            .create(NewNotification {
                user_id: alert.user_id,
                product_id: product.id,
                alert_id: Some(alert.id),
                title,
                message,
            })
            .await
        {
            warn!(alert = alert.id, error = %e, "failed to store notification");
        }

        if alert.notify_by_email {
            if let Err(e) = self.notifier.notify(alert, product, price).await {
                warn!(alert = alert.id, error = %e, "notifier failed");
            }
        }
    }

    pub async fn user_notifications(&self, user_id: i64) -> Result<Vec<Notification>> {
        const PAGE: i64 = 50;
        self.repos.notifications.find_by_user(user_id, PAGE, 0).await
    }

    pub async fn unread_count(&self, user_id: i64) -> Result<i64> {
        self.repos.notifications.count_unread_by_user(user_id).await
    }

    pub async fn mark_notification_read(&self, notification_id: i64, user_id: i64) -> Result<()> {
        let notification = self
            .repos
            .notifications
            .find_by_id(notification_id)
            .await?
            .ok_or_else(|| anyhow!("notification {notification_id} not found"))?;
        if notification.user_id != user_id {
            bail!("notification {notification_id} does not belong to user {user_id}");
        }
        self.repos.notifications.mark_read(notification_id).await
    }

    pub async fn mark_all_read(&self, user_id: i64) -> Result<()> {
        for notification in self.repos.notifications.find_unread_by_user(user_id).await? {
            if let Err(e) = self.repos.notifications.mark_read(notification.id).await {
                warn!(notification = notification.id, error = %e, "failed to mark notification read");
            }
        }
        Ok(())
    }

    pub async fn delete_notification(&self, notification_id: i64, user_id: i64) -> Result<()> {
        let notification = self
            .repos
            .notifications
            .find_by_id(notification_id)
            .await?
            .ok_or_else(|| anyhow!("notification {notification_id} not found"))?;
        if notification.user_id != user_id {
            bail!("notification {notification_id} does not belong to user {user_id}");
        }
        self.repos.notifications.delete(notification_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{NewPrice, NewProduct};
    use crate::persistence::memory::MemoryStore;
    use crate::persistence::seed_categories;
    use chrono::Utc;

    async fn service_with_product(amount: f64) -> (AlertService, Repos, i64) {
        let store = MemoryStore::new();
        let repos = store.repos();
        seed_categories(repos.categories.as_ref()).await.unwrap();

        let product = repos
            .products
            .create(NewProduct {
                name: "Monitor LG 27".into(),
                slug: "monitor-lg-27".into(),
                description: String::new(),
                image_url: String::new(),
                category_id: 5,
                image_hash: None,
            })
            .await
            .unwrap();
        repos
            .prices
            .create(NewPrice {
                product_id: product.id,
                store: "Coolmod".into(),
                amount,
                currency: "EUR".into(),
                url: String::new(),
                is_available: true,
                retrieved_at: Utc::now(),
            })
            .await
            .unwrap();

        let service = AlertService::new(repos.clone(), Arc::new(LogNotifier), AlertConfig::default());
        (service, repos, product.id)
    }

    #[tokio::test]
    async fn alert_at_or_above_current_price_notifies_exactly_once() {
        let (service, repos, product_id) = service_with_product(250.0).await;

        let alert = service
            .create_alert(7, product_id, 300.0, false)
            .await
            .unwrap();

        let after_create = repos.notifications.find_by_alert(alert.id).await.unwrap();
        assert_eq!(after_create.len(), 1, "immediate check must notify once");

        // A sweep over the same price observation must not notify again.
        service.check_alerts().await.unwrap();
        service.check_alerts().await.unwrap();
        let after_sweeps = repos.notifications.find_by_alert(alert.id).await.unwrap();
        assert_eq!(after_sweeps.len(), 1);
    }

    #[tokio::test]
    async fn alert_below_current_price_stays_silent_until_price_drops() {
        let (service, repos, product_id) = service_with_product(250.0).await;

        let alert = service
            .create_alert(7, product_id, 200.0, false)
            .await
            .unwrap();
        assert!(repos
            .notifications
            .find_by_alert(alert.id)
            .await
            .unwrap()
            .is_empty());

        // The next scrape observes a lower price.
        let mut price = repos.prices.find_by_product(product_id).await.unwrap()[0].clone();
        price.amount = 189.0;
        price.retrieved_at = Utc::now();
        repos.prices.update(&price).await.unwrap();

        service.check_alerts().await.unwrap();
        let notifications = repos.notifications.find_by_alert(alert.id).await.unwrap();
        assert_eq!(notifications.len(), 1);
        assert!(notifications[0].message.contains("189.00"));
    }

    #[tokio::test]
    async fn new_price_observation_triggers_again() {
        let (service, repos, product_id) = service_with_product(250.0).await;
        let alert = service
            .create_alert(7, product_id, 300.0, false)
            .await
            .unwrap();
        assert_eq!(
            repos.notifications.find_by_alert(alert.id).await.unwrap().len(),
            1
        );

        // Re-scrape confirms a qualifying price later: one more notification.
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let mut price = repos.prices.find_by_product(product_id).await.unwrap()[0].clone();
        price.retrieved_at = Utc::now();
        repos.prices.update(&price).await.unwrap();

        service.check_alerts().await.unwrap();
        service.check_alerts().await.unwrap();
        assert_eq!(
            repos.notifications.find_by_alert(alert.id).await.unwrap().len(),
            2
        );
    }

    #[tokio::test]
    async fn deleting_an_alert_cascades_its_notifications() {
        let (service, repos, product_id) = service_with_product(250.0).await;
        let alert = service
            .create_alert(7, product_id, 300.0, false)
            .await
            .unwrap();
        assert_eq!(
            repos.notifications.find_by_alert(alert.id).await.unwrap().len(),
            1
        );

        service.delete_alert(alert.id, 7).await.unwrap();
        assert!(repos.alerts.find_by_id(alert.id).await.unwrap().is_none());
        assert!(repos
            .notifications
            .find_by_alert(alert.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn alerts_are_owner_scoped() {
        let (service, _repos, product_id) = service_with_product(250.0).await;
        let alert = service
            .create_alert(7, product_id, 100.0, false)
            .await
            .unwrap();

        assert!(service.update_alert(alert.id, 8, 120.0, false, true).await.is_err());
        assert!(service.delete_alert(alert.id, 8).await.is_err());
        // The owner can.
        assert!(service.update_alert(alert.id, 7, 120.0, false, true).await.is_ok());
    }

    #[tokio::test]
    async fn deactivated_alert_never_triggers() {
        let (service, repos, product_id) = service_with_product(250.0).await;
        let alert = service
            .create_alert(7, product_id, 200.0, false)
            .await
            .unwrap();
        service
            .update_alert(alert.id, 7, 300.0, false, false)
            .await
            .unwrap();

        service.check_alerts().await.unwrap();
        assert!(repos
            .notifications
            .find_by_alert(alert.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn notification_upkeep_round_trip() {
        let (service, _repos, product_id) = service_with_product(250.0).await;
        service.create_alert(7, product_id, 300.0, false).await.unwrap();

        assert_eq!(service.unread_count(7).await.unwrap(), 1);
        let notifications = service.user_notifications(7).await.unwrap();
        assert_eq!(notifications.len(), 1);

        service
            .mark_notification_read(notifications[0].id, 7)
            .await
            .unwrap();
        assert_eq!(service.unread_count(7).await.unwrap(), 0);
    }
}
