use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use release_tracker::config::TrackerConfig;
use release_tracker::db::Database;
use release_tracker::feed::FeedService;
use release_tracker::filter::{filter_records, DateRange, FilterConfig, SortOrder};
use release_tracker::models::{window_start, FeatureRecord, ReleaseStatus};
use release_tracker::{api, export, refresh};

#[derive(Parser)]
#[command(name = "release-tracker")]
#[command(about = "Track Dynamics 365 and Power Platform release plans")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Port for HTTP API
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
    /// Fetch the feed, store a snapshot and record changes
    Refresh,
    /// List features matching the given filters
    List {
        #[command(flatten)]
        filters: FilterArgs,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Export features matching the given filters as CSV
    Export {
        #[command(flatten)]
        filters: FilterArgs,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show recently detected changes
    Changes {
        /// How many days back to look
        #[arg(short, long, default_value = "7")]
        days: i64,

        /// Maximum number of changes to show
        #[arg(short, long, default_value = "50")]
        limit: u32,

        /// Print counts by category and type instead of the changes
        #[arg(long)]
        summary: bool,
    },
}

#[derive(Args, Debug)]
struct FilterArgs {
    /// Product name (repeatable)
    #[arg(long = "product")]
    products: Vec<String>,

    /// Status: planned, early_access, public_preview, generally_available (repeatable)
    #[arg(long = "status", value_parser = parse_status)]
    statuses: Vec<ReleaseStatus>,

    /// Release wave (repeatable)
    #[arg(long = "wave")]
    waves: Vec<String>,

    /// Investment area (repeatable)
    #[arg(long = "investment-area")]
    investment_areas: Vec<String>,

    /// Enabled for (repeatable)
    #[arg(long = "enabled-for")]
    enabled_for: Vec<String>,

    /// Earliest GA date (YYYY-MM-DD)
    #[arg(long)]
    ga_from: Option<NaiveDate>,

    /// Latest GA date (YYYY-MM-DD)
    #[arg(long)]
    ga_to: Option<NaiveDate>,

    /// Case-insensitive text search
    #[arg(short = 'q', long)]
    search: Option<String>,

    /// Sort key, prefix with '-' for descending
    #[arg(long, value_parser = parse_sort, allow_hyphen_values = true)]
    sort: Option<SortOrder>,
}

impl FilterArgs {
    fn into_config(self) -> FilterConfig {
        let ga_range = DateRange {
            start: self.ga_from,
            end: self.ga_to,
        };
        FilterConfig {
            products: self.products.into_iter().collect(),
            statuses: self.statuses.into_iter().collect(),
            waves: self.waves.into_iter().collect(),
            investment_areas: self.investment_areas.into_iter().collect(),
            enabled_for: self.enabled_for.into_iter().collect(),
            ga_range: ga_range.is_active().then_some(ga_range),
            search: self.search,
            sort: self.sort,
        }
    }
}

fn parse_status(s: &str) -> Result<ReleaseStatus, String> {
    ReleaseStatus::from_str(s).ok_or_else(|| format!("unknown status: {}", s))
}

fn parse_sort(s: &str) -> Result<SortOrder, String> {
    SortOrder::parse(s).ok_or_else(|| format!("unknown sort key: {}", s))
}

/// Initialize tracing with output to stderr (for commands that print data) or stdout
fn init_tracing(use_stderr: bool) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG")
            .unwrap_or_else(|_| "release_tracker=debug,tower_http=debug".into()),
    );

    if use_stderr {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn open_database(config: &TrackerConfig) -> anyhow::Result<Database> {
    let db = match &config.database_path {
        Some(path) => Database::open(path.clone())?,
        None => Database::open_default()?,
    };
    db.migrate()?;
    Ok(db)
}

async fn serve(config: &TrackerConfig, port: u16) -> anyhow::Result<()> {
    tracing::info!("Starting release tracker on port {}", port);

    let db = open_database(config)?;
    let feed = Arc::new(FeedService::from_config(config)?);
    let app = api::create_router(db, feed);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!("Release tracker listening on http://127.0.0.1:{}", port);

    axum::serve(listener, app).await?;
    Ok(())
}

async fn load_records(config: &TrackerConfig) -> anyhow::Result<Arc<Vec<FeatureRecord>>> {
    let feed = FeedService::from_config(config)?;
    let loaded = feed.load().await?;
    Ok(loaded.records)
}

fn print_table(records: &[&FeatureRecord], today: NaiveDate) {
    println!(
        "{:<12} {:<36} {:<50} {:<20} {:<10}",
        "ID", "PRODUCT", "FEATURE", "STATUS", "GA"
    );
    for r in records {
        println!(
            "{:<12} {:<36} {:<50} {:<20} {:<10}",
            truncate(&r.release_plan_id, 12),
            truncate(&r.product_name, 36),
            truncate(&r.feature_name, 50),
            r.status(today).label(),
            r.ga_date
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-".to_string()),
        );
    }
    println!("{} features", records.len());
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(width.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let use_stderr = !matches!(cli.command, None | Some(Commands::Serve { .. }));
    init_tracing(use_stderr);

    let config = TrackerConfig::load();
    let today = Utc::now().date_naive();

    match cli.command {
        Some(Commands::Serve { port }) => serve(&config, port).await?,
        None => serve(&config, 3000).await?,
        Some(Commands::Refresh) => {
            let db = open_database(&config)?;
            let feed = FeedService::from_config(&config)?;
            let summary = refresh::run_refresh(&feed, &db).await?;
            println!(
                "Loaded {} features from {} ({} new, {} changed, {} skipped entries)",
                summary.total_features,
                summary.source.as_str(),
                summary.new_features,
                summary.changed_features,
                summary.skipped_entries
            );
            for warning in &summary.warnings {
                println!("warning: {}", serde_json::to_string(warning)?);
            }
        }
        Some(Commands::List { filters, json }) => {
            let records = load_records(&config).await?;
            let matched = filter_records(&records, &filters.into_config(), today);
            if json {
                let views: Vec<_> = matched.iter().map(|r| r.view(today)).collect();
                println!("{}", serde_json::to_string_pretty(&views)?);
            } else {
                print_table(&matched, today);
            }
        }
        Some(Commands::Export { filters, output }) => {
            let records = load_records(&config).await?;
            let matched = filter_records(&records, &filters.into_config(), today);
            match output {
                Some(path) => {
                    let file = File::create(&path)
                        .with_context(|| format!("Failed to create {}", path.display()))?;
                    export::write_csv(BufWriter::new(file), matched.iter().copied(), today)?;
                    tracing::info!("Exported {} features to {}", matched.len(), path.display());
                }
                None => {
                    let stdout = io::stdout();
                    let mut lock = stdout.lock();
                    export::write_csv(&mut lock, matched.iter().copied(), today)?;
                    lock.flush()?;
                }
            }
        }
        Some(Commands::Changes {
            days,
            limit,
            summary,
        }) => {
            let db = open_database(&config)?;
            let cutoff = window_start(Utc::now(), days)
                .ok_or_else(|| anyhow::anyhow!("--days {} is out of range", days))?;
            if summary {
                let summary = db.get_change_summary(cutoff)?;
                println!(
                    "{} changes to {} features in the last {} days",
                    summary.total, summary.features, days
                );
                for (category, count) in &summary.by_category {
                    println!("  {:<14} {}", category.as_str(), count);
                }
                for (change_type, count) in summary.by_type.iter().filter(|(_, c)| **c > 0) {
                    println!("    {:<26} {}", change_type.as_str(), count);
                }
                return Ok(());
            }
            let changes = db.get_recent_changes(cutoff, limit)?;
            if changes.is_empty() {
                println!("No changes in the last {} days", days);
            }
            for entry in changes {
                let e = &entry.event;
                println!(
                    "{}  {:<26} {:<12} {}: {} -> {}",
                    e.detected_at.format("%Y-%m-%d %H:%M"),
                    e.change_type.as_str(),
                    e.release_plan_id,
                    e.feature_name,
                    e.old_value.as_deref().unwrap_or("-"),
                    e.new_value.as_deref().unwrap_or("-"),
                );
            }
        }
    }

    Ok(())
}
