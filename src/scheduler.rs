//! Periodic driver for the ingestion pipeline.
//!
//! Three independent tickers while running: full ingestion (with a trailing
//! alert check), stale-price cleanup, and the standalone alert sweep.
//! Ingestion and the alert sweep also fire once immediately at startup.
//! Stopping cancels future firings; in-flight work drains to completion.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::alerts::AlertService;
use crate::reconcile::Reconciler;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub ingest_interval: Duration,
    pub cleanup_interval: Duration,
    pub alert_interval: Duration,
    /// Age past which the cleanup sweep deletes price quotes.
    pub cleanup_max_age: chrono::Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            ingest_interval: Duration::from_secs(48 * 3600),
            cleanup_interval: Duration::from_secs(72 * 3600),
            alert_interval: Duration::from_secs(6 * 3600),
            cleanup_max_age: chrono::Duration::days(7),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Stopped,
    Running,
}

struct Inner {
    state: State,
    shutdown: Option<broadcast::Sender<()>>,
    tasks: Option<JoinSet<()>>,
}

pub struct Scheduler {
    reconciler: Arc<Reconciler>,
    alerts: Arc<AlertService>,
    cfg: SchedulerConfig,
    inner: Mutex<Inner>,
}

impl Scheduler {
    pub fn new(reconciler: Arc<Reconciler>, alerts: Arc<AlertService>, cfg: SchedulerConfig) -> Self {
        Self {
            reconciler,
            alerts,
            cfg,
            inner: Mutex::new(Inner {
                state: State::Stopped,
                shutdown: None,
                tasks: None,
            }),
        }
    }

    pub async fn is_running(&self) -> bool {
        self.inner.lock().await.state == State::Running
    }

    /// Start the tickers. A second start while running is a no-op.
    pub async fn start(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state == State::Running {
            warn!("scheduler already running");
            return;
        }

        let (shutdown_tx, _) = broadcast::channel::<()>(4);
        let mut tasks = JoinSet::new();

        // Ingestion loop: immediate first run, each run ends with an alert
        // check.
        {
            let reconciler = self.reconciler.clone();
            let alerts = self.alerts.clone();
            let mut rx = shutdown_tx.subscribe();
            let period = self.cfg.ingest_interval;
            tasks.spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                ticker.tick().await;
                loop {
                    info!("ingest: tick");
                    reconciler.run_ingestion_cycle().await;
                    if let Err(e) = alerts.check_alerts().await {
                        error!(error = %e, "post-ingest alert check failed");
                    }
                    tokio::select! {
                        _ = ticker.tick() => {}
                        _ = rx.recv() => {
                            info!("ingest: shutdown");
                            break;
                        }
                    }
                }
            });
        }

        // Cleanup loop: first run only after a full interval.
        {
            let reconciler = self.reconciler.clone();
            let mut rx = shutdown_tx.subscribe();
            let period = self.cfg.cleanup_interval;
            let max_age = self.cfg.cleanup_max_age;
            tasks.spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            info!("cleanup: tick");
                            if let Err(e) = reconciler.run_cleanup(max_age).await {
                                error!(error = %e, "price cleanup failed");
                            }
                        }
                        _ = rx.recv() => {
                            info!("cleanup: shutdown");
                            break;
                        }
                    }
                }
            });
        }

        // Alert loop: immediate first check.
        {
            let alerts = self.alerts.clone();
            let mut rx = shutdown_tx.subscribe();
            let period = self.cfg.alert_interval;
            tasks.spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                ticker.tick().await;
                loop {
                    info!("alerts: tick");
                    if let Err(e) = alerts.check_alerts().await {
                        error!(error = %e, "alert check failed");
                    }
                    tokio::select! {
                        _ = ticker.tick() => {}
                        _ = rx.recv() => {
                            info!("alerts: shutdown");
                            break;
                        }
                    }
                }
            });
        }

        inner.state = State::Running;
        inner.shutdown = Some(shutdown_tx);
        inner.tasks = Some(tasks);
        info!("scheduler started");
    }

    /// Stop the tickers and wait for in-flight work to drain. A stop while
    /// stopped is a no-op.
    pub async fn stop(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state != State::Running {
            return;
        }

        if let Some(tx) = inner.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(mut tasks) = inner.tasks.take() {
            while let Some(res) = tasks.join_next().await {
                if let Err(e) = res {
                    error!(error = %e, "scheduler task failed during shutdown");
                }
            }
        }

        inner.state = State::Stopped;
        info!("scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{AlertConfig, LogNotifier};
    use crate::classify::Classifier;
    use crate::imagehash::ImageFingerprinter;
    use crate::persistence::memory::MemoryStore;
    use crate::persistence::seed_categories;
    use crate::reconcile::ReconcilerConfig;

    async fn scheduler() -> Scheduler {
        let store = MemoryStore::new();
        let repos = store.repos();
        seed_categories(repos.categories.as_ref()).await.unwrap();

        let reconciler = Arc::new(Reconciler::new(
            repos.clone(),
            Arc::new(Classifier::with_default_rules().unwrap()),
            Arc::new(ImageFingerprinter::new(Duration::from_secs(1)).unwrap()),
            vec![], // no stores: the immediate ingestion run is a no-op sweep
            ReconcilerConfig::default(),
        ));
        let alerts = Arc::new(AlertService::new(
            repos,
            Arc::new(LogNotifier),
            AlertConfig::default(),
        ));
        Scheduler::new(reconciler, alerts, SchedulerConfig::default())
    }

    #[tokio::test]
    async fn start_stop_transitions() {
        let scheduler = scheduler().await;
        assert!(!scheduler.is_running().await);

        scheduler.start().await;
        assert!(scheduler.is_running().await);

        scheduler.stop().await;
        assert!(!scheduler.is_running().await);
    }

    #[tokio::test]
    async fn repeated_start_and_stop_are_noops() {
        let scheduler = scheduler().await;
        scheduler.start().await;
        scheduler.start().await;
        assert!(scheduler.is_running().await);

        scheduler.stop().await;
        scheduler.stop().await;
        assert!(!scheduler.is_running().await);
    }

    #[tokio::test]
    async fn restart_after_stop_works() {
        let scheduler = scheduler().await;
        scheduler.start().await;
        scheduler.stop().await;
        scheduler.start().await;
        assert!(scheduler.is_running().await);
        scheduler.stop().await;
    }
}
