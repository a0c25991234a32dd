use analytics::{AggregateStats, StatisticsReport, StatsDimension};
use analyzer::{DEFAULT_TOP_LIMIT, StatisticsAggregator};
use anyhow::Context;
use api_client::BinanceClient;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use comfy_table::{Cell, Table};
use configuration::{Config, init_tracing, load_config_from};
use core_types::SignalRequest;
use database::{
    CheckStore, DbRepository, FailoverSink, FileFallbackQueue, connect, run_migrations,
};
use engine::{
    EvaluationJob, IntervalScheduler, OutcomeEvaluator, ResyncTask, SignalTracker, SignalValidator,
};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// The main entry point for the Hindsight outcome tracker.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; the environment may already be set.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = load_config_from(&cli.config)
        .with_context(|| format!("Failed to load configuration from '{}'", cli.config))?;
    // Held for the life of the process so buffered file logs get flushed.
    let _log_guard = init_tracing(&config.logging)?;

    match cli.command {
        Commands::Run => handle_run(config).await,
        Commands::Track(args) => handle_track(args, config).await,
        Commands::Cancel(args) => handle_cancel(args, config).await,
        Commands::Stats(args) => handle_stats(args, config).await,
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Tracks trading signals and grades them against the market after the fact.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = configuration::DEFAULT_CONFIG_PATH)]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the evaluation daemon until interrupted.
    Run,
    /// Register a signal. A running daemon picks it up on its next resync.
    Track(TrackArgs),
    /// Cancel the pending checks of a signal.
    Cancel(CancelArgs),
    /// Print win-rate statistics for a recent window.
    Stats(StatsArgs),
}

#[derive(Parser)]
struct TrackArgs {
    /// Caller-supplied signal id. Generated when omitted.
    #[arg(long)]
    id: Option<String>,

    /// The base asset (e.g., "BTC").
    #[arg(long)]
    symbol: String,

    /// LONG or SHORT.
    #[arg(long)]
    direction: String,

    #[arg(long)]
    entry_price: Decimal,

    /// RFC 3339 timestamp. Defaults to now.
    #[arg(long)]
    entry_time: Option<DateTime<Utc>>,

    #[arg(long)]
    scanner_source: Option<String>,

    #[arg(long)]
    tier: Option<String>,

    #[arg(long)]
    unified_score: Option<Decimal>,
}

#[derive(Parser)]
struct CancelArgs {
    /// The id of the signal to cancel.
    id: String,
}

#[derive(Parser)]
struct StatsArgs {
    /// Window size in days, counted back from now.
    #[arg(long, default_value_t = 7)]
    days: u32,

    /// Only show the breakdown along one dimension (scanner_source, tier, interval, direction).
    #[arg(long)]
    by: Option<StatsDimension>,

    /// Entries per best/worst list.
    #[arg(long, default_value_t = DEFAULT_TOP_LIMIT)]
    top: usize,

    /// Print the report as JSON instead of tables.
    #[arg(long)]
    json: bool,
}

// ==============================================================================
// Command Logic
// ==============================================================================

async fn open_repository(config: &Config) -> anyhow::Result<Arc<DbRepository>> {
    let pool = connect(&config.database)
        .await
        .context("Failed to connect to the database")?;
    run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    Ok(Arc::new(DbRepository::new(pool)))
}

/// Wires the evaluation pipeline together and runs it until Ctrl-C.
async fn handle_run(config: Config) -> anyhow::Result<()> {
    let repo = open_repository(&config).await?;

    let oracle = Arc::new(BinanceClient::new(&config.price_oracle)?);
    let fallback = Arc::new(FileFallbackQueue::new(config.fallback.path.clone()));
    let sink = Arc::new(FailoverSink::new(
        repo.clone(),
        fallback,
        config.evaluation.store_timeout(),
    ));
    let evaluator = Arc::new(OutcomeEvaluator::new(
        oracle,
        sink,
        config.evaluation.thresholds(),
        config.evaluation.price_timeout(),
    ));
    let job = Arc::new(EvaluationJob::new(
        evaluator,
        repo.clone(),
        config.evaluation.store_timeout(),
    ));

    let scheduler = IntervalScheduler::new(job, config.scheduler.max_concurrent_evaluations);
    let timer_loop = scheduler.start();

    let tracker = Arc::new(SignalTracker::new(
        SignalValidator::new(&config.signals),
        repo.clone(),
        Arc::new(scheduler.clone()),
    ));

    let recovered = tracker.resync().await.context("Initial resync failed")?;
    info!(
        rescheduled = recovered.rescheduled,
        fallback = %config.fallback.path.display(),
        "Evaluation daemon running"
    );

    let resync = ResyncTask::new(
        tracker,
        Duration::from_secs(config.scheduler.resync_interval_secs),
    )
    .spawn();

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested, pending checks resume on next start");
    resync.abort();
    timer_loop.abort();
    Ok(())
}

async fn handle_track(args: TrackArgs, config: Config) -> anyhow::Result<()> {
    let request = SignalRequest {
        id: args.id,
        symbol: args.symbol,
        direction: args.direction,
        entry_price: args.entry_price,
        entry_time: args.entry_time,
        scanner_source: args.scanner_source,
        tier: args.tier,
        unified_score: args.unified_score,
    };
    // Rejected before touching the database.
    let signal = SignalValidator::new(&config.signals).validate(&request, Utc::now())?;

    let repo = open_repository(&config).await?;
    if repo.insert_signal(&signal, &signal.checks()).await? {
        println!(
            "Tracking {} {} {} @ {} (id {})",
            signal.symbol, signal.direction, signal.entry_time, signal.entry_price, signal.id
        );
    } else {
        println!("Signal {} is already tracked; nothing changed", signal.id);
    }
    Ok(())
}

async fn handle_cancel(args: CancelArgs, config: Config) -> anyhow::Result<()> {
    let repo = open_repository(&config).await?;
    let cancelled = repo.cancel_signal(&args.id).await?;
    if cancelled == 0 {
        warn!(signal_id = %args.id, "No pending checks to cancel");
    }
    println!("Cancelled {} pending check(s) of signal {}", cancelled, args.id);
    Ok(())
}

async fn handle_stats(args: StatsArgs, config: Config) -> anyhow::Result<()> {
    let repo = open_repository(&config).await?;
    let aggregator = StatisticsAggregator::new(repo, &config.statistics);

    if let Some(dimension) = args.by {
        let groups = aggregator.stats_by_dimension(dimension, args.days).await?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&groups)?);
        } else {
            println!("{}", stats_table(dimension.as_str(), &groups));
        }
        return Ok(());
    }

    let mut report = aggregator.full_report(args.days).await?;
    if args.top != DEFAULT_TOP_LIMIT {
        report.top_performers = aggregator.top_performers(args.days, args.top).await?;
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

// ==============================================================================
// Report Rendering
// ==============================================================================

fn print_report(report: &StatisticsReport) {
    println!(
        "Outcome statistics for the last {} day(s), generated {}",
        report.window_days,
        report.generated_at.format("%Y-%m-%d %H:%M UTC")
    );

    let overall = BTreeMap::from([("all".to_string(), report.overall.clone())]);
    println!("{}", stats_table("overall", &overall));
    for dimension in StatsDimension::ALL {
        println!("{}", stats_table(dimension.as_str(), report.breakdown(dimension)));
    }

    let top = &report.top_performers;
    let mut signals = Table::new();
    signals.set_header(vec![
        "Rank", "Signal", "Symbol", "Interval", "Direction", "P&L %", "Outcome",
    ]);
    for (rank, list) in [("best", &top.best_signals), ("worst", &top.worst_signals)] {
        for record in list {
            signals.add_row(vec![
                Cell::new(rank),
                Cell::new(&record.signal_id),
                Cell::new(&record.symbol),
                Cell::new(record.interval.label()),
                Cell::new(record.direction),
                Cell::new(record.pnl_pct.round_dp(2)),
                Cell::new(record.outcome),
            ]);
        }
    }
    println!("{signals}");

    let mut symbols = Table::new();
    symbols.set_header(vec!["Rank", "Symbol", "Checks", "Win Rate %", "Avg P&L %"]);
    for (rank, list) in [("best", &top.best_symbols), ("worst", &top.worst_symbols)] {
        for entry in list {
            symbols.add_row(vec![
                Cell::new(rank),
                Cell::new(&entry.symbol),
                Cell::new(entry.stats.total),
                Cell::new(entry.stats.win_rate.round_dp(1)),
                Cell::new(entry.stats.avg_pnl_pct.round_dp(2)),
            ]);
        }
    }
    println!("{symbols}");

    println!("Recommendations:");
    for recommendation in &report.recommendations {
        println!("  [{}] {}", recommendation.severity, recommendation.message);
    }
}

fn stats_table(label: &str, groups: &BTreeMap<String, AggregateStats>) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        label,
        "Total",
        "Wins",
        "Losses",
        "Neutral",
        "Win Rate %",
        "Avg Win %",
        "Avg Loss %",
        "Avg P&L %",
    ]);
    for (key, stats) in groups {
        table.add_row(vec![
            Cell::new(key),
            Cell::new(stats.total),
            Cell::new(stats.wins),
            Cell::new(stats.losses),
            Cell::new(stats.neutral),
            Cell::new(stats.win_rate.round_dp(1)),
            Cell::new(stats.avg_win_pct.round_dp(2)),
            Cell::new(stats.avg_loss_pct.round_dp(2)),
            Cell::new(stats.avg_pnl_pct.round_dp(2)),
        ]);
    }
    table
}
