use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use price_scout::alerts::{AlertConfig, AlertService, LogNotifier};
use price_scout::classify::Classifier;
use price_scout::cli::{Cli, Command};
use price_scout::imagehash::ImageFingerprinter;
use price_scout::persistence::db::Db;
use price_scout::persistence::postgres::postgres_repos;
use price_scout::persistence::seed_categories;
use price_scout::reconcile::{Reconciler, ReconcilerConfig};
use price_scout::scheduler::{Scheduler, SchedulerConfig};
use price_scout::stores::{AussarScraper, CoolmodScraper, EbayScraper, HttpFetcher, StoreScraper};
use price_scout::util::env as env_util;

#[tokio::main]
async fn main() -> Result<()> {
    env_util::init_env();
    price_scout::tracing::init_tracing("info,sqlx=warn")?;

    let cli = Cli::parse();

    // --- DB connect ----------------------------------------------------------
    let database_url = env_util::db_url()?;
    let max_conns: u32 = env_util::env_parse("DB_MAX_CONNS", 10);
    let db = Db::connect(&database_url, max_conns)
        .await
        .context("Db::connect failed")?;
    if env_util::env_flag("AUTO_MIGRATE", true) {
        db.ensure_schema().await?;
    }
    let repos = postgres_repos(&db);
    seed_categories(repos.categories.as_ref()).await?;

    // --- pipeline wiring -----------------------------------------------------
    let http_timeout = Duration::from_secs(env_util::env_parse("SCRAPER_TIMEOUT_SECS", 20u64));
    let fetcher = HttpFetcher::new(http_timeout)?;
    let stores: Vec<Arc<dyn StoreScraper>> = vec![
        Arc::new(EbayScraper::new(fetcher.clone())),
        Arc::new(CoolmodScraper::new(fetcher.clone())),
        Arc::new(AussarScraper::new(fetcher)),
    ];

    let reconciler_cfg = ReconcilerConfig {
        phash_threshold: env_util::env_parse("PHASH_THRESHOLD", 5),
        candidate_window: env_util::env_parse("PHASH_CANDIDATE_WINDOW", 200),
        name_match_window: env_util::env_parse("NAME_MATCH_WINDOW", 1000),
        batch_fresh_window: chrono::Duration::days(env_util::env_parse("BATCH_FRESH_DAYS", 3)),
    };
    let reconciler = Arc::new(Reconciler::new(
        repos.clone(),
        Arc::new(Classifier::with_default_rules()?),
        Arc::new(ImageFingerprinter::new(http_timeout)?),
        stores,
        reconciler_cfg,
    ));
    let alerts = Arc::new(AlertService::new(
        repos,
        Arc::new(LogNotifier),
        AlertConfig::default(),
    ));

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            let scheduler_cfg = SchedulerConfig {
                ingest_interval: Duration::from_secs(env_util::env_parse(
                    "INGEST_INTERVAL_SECS",
                    48 * 3600,
                )),
                cleanup_interval: Duration::from_secs(env_util::env_parse(
                    "CLEANUP_INTERVAL_SECS",
                    72 * 3600,
                )),
                alert_interval: Duration::from_secs(env_util::env_parse(
                    "ALERT_INTERVAL_SECS",
                    6 * 3600,
                )),
                cleanup_max_age: chrono::Duration::days(env_util::env_parse(
                    "CLEANUP_MAX_AGE_DAYS",
                    7,
                )),
            };
            let scheduler = Scheduler::new(reconciler, alerts, scheduler_cfg);
            scheduler.start().await;

            info!("service started — press Ctrl+C to stop");
            tokio::signal::ctrl_c()
                .await
                .context("waiting for ctrl-c")?;
            info!("shutdown: Ctrl+C received");
            scheduler.stop().await;
            info!("all tasks stopped — goodbye");
        }
        Command::ScrapeOnce => {
            reconciler.run_ingestion_cycle().await;
            alerts.check_alerts().await?;
        }
        Command::Cleanup { days } => {
            let deleted = reconciler.run_cleanup(chrono::Duration::days(days)).await?;
            info!(deleted, "cleanup complete");
        }
        Command::CheckAlerts => {
            alerts.check_alerts().await?;
        }
    }

    Ok(())
}
