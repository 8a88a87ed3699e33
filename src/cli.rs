use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "price-scout", version, about = "Multi-store price tracking pipeline")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the scraping daemon (default)
    Run,
    /// Run one full ingestion cycle and exit
    ScrapeOnce,
    /// Delete price quotes older than the given number of days
    Cleanup {
        #[arg(long, default_value_t = 7)]
        days: i64,
    },
    /// Evaluate price alerts once and exit
    CheckAlerts,
}
