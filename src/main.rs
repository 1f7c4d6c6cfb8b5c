use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use church_directory::concurrency::Batching;
use church_directory::db::SqliteStore;
use church_directory::{DirectoryBuilder, RunOptions, RunOutcome};

#[derive(Parser)]
#[command(name = "church_directory", about = "Orthodox parish directory builder")]
struct Cli {
    /// Config file (default: ./churchdir.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum BatchingArg {
    Waves,
    Pool,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape every jurisdiction, clean, validate, deduplicate, save and export
    Run {
        /// Directory for churches.json, churches.csv and the run reports
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        /// Max scrapers running at once
        #[arg(short = 'j', long)]
        max_concurrent: Option<usize>,
        #[arg(long)]
        batching: Option<BatchingArg>,
        /// Skip website reachability checks
        #[arg(long)]
        no_url_check: bool,
        /// Keep duplicate records
        #[arg(long)]
        no_dedup: bool,
        /// Do not write to the SQLite store
        #[arg(long)]
        no_db: bool,
        #[arg(long)]
        database: Option<PathBuf>,
    },
    /// Show counts from the SQLite store
    Stats {
        #[arg(long)]
        database: Option<PathBuf>,
    },
    /// Recent scraping sessions
    Sessions {
        #[arg(long)]
        database: Option<PathBuf>,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let opts = RunOptions::load(cli.config.as_deref())?;
    init_logging(&opts)?;

    let t0 = Instant::now();
    let result = match cli.command {
        Commands::Run {
            output_dir,
            max_concurrent,
            batching,
            no_url_check,
            no_dedup,
            no_db,
            database,
        } => {
            let mut opts = opts;
            if let Some(dir) = output_dir {
                opts.output_dir = dir;
            }
            if let Some(n) = max_concurrent {
                opts.max_concurrent_scrapers = n;
            }
            if let Some(b) = batching {
                opts.batching = match b {
                    BatchingArg::Waves => Batching::Waves,
                    BatchingArg::Pool => Batching::Pool,
                };
            }
            if let Some(path) = database {
                opts.database.path = path;
            }
            opts.validate_urls &= !no_url_check;
            opts.enable_duplicate_detection &= !no_dedup;
            opts.save_to_database &= !no_db;

            let mut builder = DirectoryBuilder::new(opts)?;
            match builder.run_autonomous_scraping().await {
                Ok(outcome) => {
                    print_outcome(&outcome);
                    println!("\nExports written to {}", builder.options().output_dir.display());
                    Ok(())
                }
                Err(failure) => {
                    print_outcome(&failure.outcome);
                    Err(anyhow::Error::new(failure).context("Directory build failed"))
                }
            }
        }
        Commands::Stats { database } => {
            let path = database.unwrap_or(opts.database.path);
            let store = SqliteStore::open_initialized(&path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            let s = store.stats()?;
            println!("Churches:     {}", s.churches);
            println!("Validated:    {}", s.validated);
            println!("With website: {}", s.with_website);
            println!("Sessions:     {}", s.sessions);
            if !s.by_jurisdiction.is_empty() {
                println!("\n--- By jurisdiction ---");
                for (jurisdiction, count) in &s.by_jurisdiction {
                    println!("  {:>5}  {}", count, jurisdiction);
                }
            }
            Ok(())
        }
        Commands::Sessions { database, limit } => {
            let path = database.unwrap_or(opts.database.path);
            let store = SqliteStore::open_initialized(&path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            let rows = store.recent_sessions(limit)?;
            if rows.is_empty() {
                println!("No scraping sessions recorded.");
                return Ok(());
            }
            println!(
                "{:>4} | {:<9} | {:<25} | {:<25} | {:>8} | {:>6}",
                "ID", "Status", "Started", "Ended", "Churches", "Errors"
            );
            println!("{}", "-".repeat(92));
            for r in &rows {
                println!(
                    "{:>4} | {:<9} | {:<25} | {:<25} | {:>8} | {:>6}",
                    r.id,
                    r.status,
                    truncate(&r.started_at, 25),
                    truncate(r.ended_at.as_deref().unwrap_or("-"), 25),
                    r.total_churches.map(|n| n.to_string()).unwrap_or_else(|| "-".into()),
                    r.error_count.map(|n| n.to_string()).unwrap_or_else(|| "-".into()),
                );
                if let Some(msg) = &r.error_message {
                    println!("       {}", msg);
                }
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

/// `RUST_LOG` wins over the configured level. A configured log file gets
/// the same events without ANSI colours.
fn init_logging(opts: &RunOptions) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&opts.log_level));

    let file_layer = match &opts.log_file {
        Some(path) => {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
            }
            let file = File::options()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();
    Ok(())
}

fn print_outcome(outcome: &RunOutcome) {
    let s = &outcome.statistics;
    println!(
        "Churches: {} ({} scraped, {} dropped, {} duplicates removed)",
        s.total_churches, s.records_scraped, s.records_dropped, s.duplicates_found
    );
    for (jurisdiction, count) in &s.jurisdiction_counts {
        println!("  {:>5}  {}", count, jurisdiction);
    }
    if let Some(v) = &s.validation_results {
        println!(
            "Validated: {}/{} ({:.1}%), average score {:.1}",
            v.valid, v.total, v.validation_rate, v.average_score
        );
    }
    println!("Reachable websites: {}", s.validated_urls);
    if let Some(db) = &s.database {
        println!(
            "Database: {} inserted, {} updated",
            db.inserted_count, db.updated_count
        );
    }
    if let Some(id) = outcome.session_id {
        println!("Session: {}", id);
    }
    if !outcome.errors.is_empty() {
        println!("\n--- Errors ({}) ---", outcome.errors.len());
        for e in outcome.errors.iter().take(20) {
            println!(
                "  [{:?}] {}{}",
                e.kind,
                e.jurisdiction
                    .as_deref()
                    .map(|j| format!("{}: ", j))
                    .unwrap_or_default(),
                truncate(&e.error, 120)
            );
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
