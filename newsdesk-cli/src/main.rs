//! Newsdesk CLI: fetch news and manage the news cache.
//!
//! Commands:
//! - `fetch`: recent news for one or more security codes (cache first)
//! - `cache status`: list cached records, their age and size
//! - `cache clean`: remove records older than a number of days
//! - `config show`: print the effective configuration

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use newsdesk_core::news::{
    format_publish_time, store, CircuitBreaker, EastmoneySource, FileSource, JsonFileStore,
    NewsCache, NewsOrigin, NewsQuery, NewsReport, NewsSource,
};
use newsdesk_core::{NewsConfig, NewsService};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const LOCAL_CONFIG: &str = "newsdesk.toml";

#[derive(Parser)]
#[command(name = "newsdesk", about = "Newsdesk CLI: per-security news with a local cache")]
struct Cli {
    /// Path to a TOML config file. Defaults to ./newsdesk.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Cache directory (overrides the config file).
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Log level when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch recent news for one or more security codes.
    Fetch {
        /// Security codes (e.g., 600519 000858).
        #[arg(required = true)]
        codes: Vec<String>,

        /// Keep news published within this many days. Defaults to the config value.
        #[arg(long)]
        days: Option<u32>,

        /// Maximum items per code. Defaults to the config value.
        #[arg(long)]
        max: Option<usize>,

        /// Read raw records from {dir}/{code}.json instead of the network.
        #[arg(long)]
        offline_dir: Option<PathBuf>,

        /// Output format.
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
    /// Cache management commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Configuration commands.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// List cached records with their date, item count, and freshness.
    Status,
    /// Remove records cached more than the given number of days ago.
    Clean {
        #[arg(long)]
        older_than_days: u32,

        /// Actually delete (without this flag, only previews what would be removed).
        #[arg(long, default_value_t = false)]
        confirm: bool,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML.
    Show,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config = load_config(cli.config.as_deref(), cli.cache_dir)?;

    match cli.command {
        Commands::Fetch {
            codes,
            days,
            max,
            offline_dir,
            format,
        } => run_fetch(&config, &codes, days, max, offline_dir, format),
        Commands::Cache { action } => match action {
            CacheAction::Status => run_cache_status(&config),
            CacheAction::Clean {
                older_than_days,
                confirm,
            } => run_cache_clean(&config, older_than_days, confirm),
        },
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                print!("{}", config.to_toml()?);
                Ok(())
            }
        },
    }
}

fn init_logging(level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("newsdesk={level},newsdesk_core={level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(path: Option<&Path>, cache_dir: Option<PathBuf>) -> Result<NewsConfig> {
    let mut config = match path {
        Some(path) => NewsConfig::from_file(path)?,
        None if Path::new(LOCAL_CONFIG).exists() => NewsConfig::from_file(Path::new(LOCAL_CONFIG))?,
        None => NewsConfig::default(),
    };
    if let Some(dir) = cache_dir {
        config.cache_dir = dir;
    }
    config.validate()?;
    tracing::debug!(cache_dir = %config.cache_dir.display(), "configuration loaded");
    Ok(config)
}

fn build_source(config: &NewsConfig, offline_dir: Option<PathBuf>) -> Result<Box<dyn NewsSource>> {
    match offline_dir {
        Some(dir) => {
            if !dir.is_dir() {
                bail!("offline directory does not exist: {}", dir.display());
            }
            Ok(Box::new(FileSource::new(dir)))
        }
        None => {
            let breaker = Arc::new(CircuitBreaker::new(config.source.breaker_cooldown()));
            let source = EastmoneySource::new(&config.source, breaker)
                .context("failed to set up the Eastmoney source")?;
            Ok(Box::new(source))
        }
    }
}

fn run_fetch(
    config: &NewsConfig,
    codes: &[String],
    days: Option<u32>,
    max: Option<usize>,
    offline_dir: Option<PathBuf>,
    format: OutputFormat,
) -> Result<()> {
    let queries = codes
        .iter()
        .map(|code| {
            NewsQuery::new(
                code.as_str(),
                days.unwrap_or(config.default_lookback_days),
                max.unwrap_or(config.default_max_items),
            )
        })
        .collect::<Result<Vec<_>, _>>()?;

    let source = build_source(config, offline_dir)?;
    let service = NewsService::new(source, JsonFileStore::new(&config.cache_dir), config);
    let now = chrono::Local::now().naive_local();

    let reports: Vec<NewsReport> = queries
        .par_iter()
        .map(|query| service.get_news_at(query, now))
        .collect();

    match format {
        OutputFormat::Table => print_table(&reports, service.source_name()),
        OutputFormat::Json => print_json(&reports)?,
        OutputFormat::Csv => print_csv(&reports)?,
    }

    let failed: Vec<&NewsReport> = reports
        .iter()
        .filter(|r| r.origin == NewsOrigin::SourceFailed)
        .collect();
    if !failed.is_empty() {
        for report in &failed {
            if let Some(err) = &report.source_error {
                eprintln!("Error for {}: {err}", report.security_id);
            }
        }
        std::process::exit(1);
    }

    Ok(())
}

fn origin_label(origin: NewsOrigin, source_name: &str) -> String {
    match origin {
        NewsOrigin::Cache => "cache".to_string(),
        NewsOrigin::Source => source_name.to_string(),
        NewsOrigin::SourceFailed => format!("{source_name} (failed)"),
    }
}

fn print_table(reports: &[NewsReport], source_name: &str) {
    for report in reports {
        println!();
        println!(
            "=== {}: {} item(s) from {} ===",
            report.security_id,
            report.items.len(),
            origin_label(report.origin, source_name)
        );
        if let Some(err) = &report.cache_write_error {
            println!("(cache not updated: {err})");
        }
        for item in &report.items {
            println!(
                "{}  {:<12}  {}",
                format_publish_time(&item.publish_time),
                truncate(&item.source, 12),
                item.title
            );
            if !item.url.is_empty() {
                println!("{:>21}{}", "", item.url);
            }
        }
    }
}

fn print_json(reports: &[NewsReport]) -> Result<()> {
    let value: Vec<serde_json::Value> = reports
        .iter()
        .map(|r| {
            serde_json::json!({
                "security_id": r.security_id,
                "from_cache": r.from_cache(),
                "error": r.source_error.as_ref().map(|e| e.to_string()),
                "news": r.items,
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn print_csv(reports: &[NewsReport]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(std::io::stdout());
    writer.write_record(["security_id", "publish_time", "source", "title", "url", "content"])?;
    for report in reports {
        for item in &report.items {
            let published = format_publish_time(&item.publish_time);
            writer.write_record([
                report.security_id.as_str(),
                published.as_str(),
                item.source.as_str(),
                item.title.as_str(),
                item.url.as_str(),
                item.content.as_str(),
            ])?;
        }
    }
    writer.flush()?;
    Ok(())
}

fn run_cache_status(config: &NewsConfig) -> Result<()> {
    let store = JsonFileStore::new(&config.cache_dir);
    let entries = store.entries()?;

    if entries.is_empty() {
        println!("Cache is empty: {}", config.cache_dir.display());
        return Ok(());
    }

    let cache = NewsCache::new(store, config.cache_valid_days);
    let today = chrono::Local::now().date_naive();
    let total_size: u64 = entries.iter().map(|e| e.size_bytes).sum();

    println!("Cache: {}", config.cache_dir.display());
    println!("Records: {}", entries.len());
    println!("Total size: {}", format_size(total_size));
    println!("Valid for: {} day(s)", config.cache_valid_days);
    println!();
    println!(
        "{:<20} {:<12} {:>6} {:<8} {:>10}",
        "Key", "Cached", "Items", "State", "Size"
    );
    println!("{}", "-".repeat(60));
    for entry in &entries {
        let (cached, items, state) = match &entry.record {
            Ok(record) => (
                record.cached_at.to_string(),
                record.items.len().to_string(),
                if cache.is_fresh(record.cached_at, today) {
                    "fresh"
                } else {
                    "stale"
                },
            ),
            Err(_) => ("-".to_string(), "-".to_string(), "corrupt"),
        };
        println!(
            "{:<20} {:<12} {:>6} {:<8} {:>10}",
            truncate(&entry.stem, 20),
            cached,
            items,
            state,
            format_size(entry.size_bytes)
        );
    }

    Ok(())
}

fn run_cache_clean(config: &NewsConfig, older_than_days: u32, confirm: bool) -> Result<()> {
    let store = JsonFileStore::new(&config.cache_dir);
    let today = chrono::Local::now().date_naive();

    let to_remove: Vec<_> = store
        .entries()?
        .into_iter()
        .filter(|entry| match &entry.record {
            Ok(record) => record.age_days(today) > i64::from(older_than_days),
            // don't remove what we can't date
            Err(_) => false,
        })
        .collect();

    if to_remove.is_empty() {
        println!("No records older than {older_than_days} days to remove.");
        return Ok(());
    }

    println!(
        "Found {} record(s) cached more than {older_than_days} days ago:",
        to_remove.len()
    );
    for entry in &to_remove {
        println!("  {} ({})", entry.stem, format_size(entry.size_bytes));
    }

    if !confirm {
        println!();
        println!("Dry run. Pass --confirm to actually delete.");
        return Ok(());
    }

    for entry in &to_remove {
        store::remove_file(&entry.path)?;
        println!("Removed: {}", entry.stem);
    }

    println!("Done. Removed {} record(s).", to_remove.len());
    Ok(())
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let mut out: String = text.chars().take(width.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
