//! Command-line interface for the market ingestion pipeline.
//!
//! # Commands
//!
//! - `markets`: Page through every listing year and merge the pages
//! - `buys`: Retrieve buy history for every market maker in the merged listing
//! - `run`: Both phases
//! - `categories`: Print the category set, optionally checking one label
//!
//! # Example
//!
//! ```bash
//! # Full run (safe to repeat; only missing units are fetched)
//! market-ingest run
//!
//! # Check a label against the listing's categories
//! CATEGORY_POLICY=reject market-ingest categories --check Sports
//! ```

use crate::categories::CategoryVerdict;
use crate::config::Config;
use crate::error::IngestResult;
use crate::pipeline::{BuysSummary, MarketsSummary, Pipeline};
use crate::rpc::ClientStats;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

/// Prediction market ingestion pipeline
#[derive(Parser, Debug)]
#[command(name = "market-ingest")]
#[command(about = "Resumable ingestion of market listings and on-chain buy events", long_about = None)]
#[command(version)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch listing pages for every configured year and merge them
    Markets,

    /// Fetch FPMMBuy logs for every market maker in the merged listing
    Buys {
        /// Worker pool size (overrides MAX_CONCURRENCY)
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Run both phases
    Run {
        /// Worker pool size (overrides MAX_CONCURRENCY)
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Print the category set of the merged listing
    Categories {
        /// Validate this label under CATEGORY_POLICY
        #[arg(short, long)]
        check: Option<String>,
    },
}

/// Parse CLI arguments and execute the appropriate command.
///
/// # Errors
///
/// Returns an error if:
/// - Configuration loading fails
/// - A listing source fails, or a phase fails as a whole (individual
///   contracts never do)
/// - A checked label is rejected
pub async fn run() -> IngestResult<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::Markets => {
            let pipeline = Pipeline::new(config)?;
            let summary = pipeline.run_markets().await?;
            print_markets(&summary);
            print_stats(pipeline.client().stats());
        }
        Commands::Buys { workers } => {
            let pipeline = Pipeline::new(with_workers(config, workers))?;
            let summary = pipeline.run_buys().await?;
            print_buys(&summary);
            print_stats(pipeline.client().stats());
        }
        Commands::Run { workers } => {
            let pipeline = Pipeline::new(with_workers(config, workers))?;
            let summary = pipeline.run().await?;
            print_markets(&summary.markets);
            print_buys(&summary.buys);
            print_stats(summary.stats);
        }
        Commands::Categories { check } => run_categories(config, check.as_deref())?,
    }

    Ok(())
}

fn with_workers(config: Config, workers: Option<usize>) -> Config {
    match workers {
        Some(workers) => config.with_max_concurrency(workers),
        None => config,
    }
}

fn run_categories(config: Config, check: Option<&str>) -> IngestResult<()> {
    let policy = config.category_policy();
    let pipeline = Pipeline::new(config)?;
    let categories = pipeline.categories()?;
    info!(categories = categories.len(), "Category set derived");

    println!("{} {} categories", "🏷️".cyan(), categories.len().to_string().bold());
    for label in categories.labels() {
        println!("   {label}");
    }

    if let Some(label) = check {
        match categories.validate(label, policy)? {
            CategoryVerdict::Known => println!("{} '{}' is a known category", "✅".green(), label),
            CategoryVerdict::Flagged => println!(
                "{} '{}' is not a known category (policy: {})",
                "⚠️".yellow(),
                label,
                policy
            ),
        }
    }

    Ok(())
}

fn print_markets(summary: &MarketsSummary) {
    println!("{} {}", timestamp().dimmed(), "Markets".cyan().bold());
    for source in &summary.sources {
        println!(
            "   {} {} records, {} pages ({} cached)",
            source.name.yellow(),
            source.records,
            source.pages,
            source.cache_hits
        );
    }
    println!(
        "   {} {} rows → {}",
        "✅".green(),
        summary.merged_rows.to_string().bold(),
        summary.output.display()
    );
}

fn print_buys(summary: &BuysSummary) {
    let report = &summary.report;
    println!("{} {}", timestamp().dimmed(), "Buys".cyan().bold());
    println!(
        "   {} candidates, {} excluded",
        summary.candidates,
        report.excluded.len()
    );
    println!(
        "   fetched {} | cached {} | migrated {} | failed {}",
        report.fetched.to_string().green(),
        report.cached.to_string().blue(),
        report.migrated.to_string().magenta(),
        if report.failed == 0 {
            report.failed.to_string().normal()
        } else {
            report.failed.to_string().red().bold()
        }
    );
    for (contract, reason) in report.failures() {
        println!("   {} {} {}", "✗".red().bold(), contract.to_string().yellow(), reason);
    }
    println!(
        "   {} {} rows → {}",
        "✅".green(),
        summary.merged_rows.to_string().bold(),
        summary.output.display()
    );
}

fn print_stats(stats: ClientStats) {
    println!(
        "{} {} requests, {} throttled, {} backoffs",
        "📊".cyan(),
        stats.requests,
        stats.throttled,
        stats.backoffs
    );
}

fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
