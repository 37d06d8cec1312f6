//! KB Bake-Off benchmark runner.
//!
//! Usage:
//!   kb-bench http://localhost:8080 --pattern lookup-95 --requests 10000
//!   kb-bench http://localhost:8080 --pattern balanced-50 --cache --output results/run1
//!   kb-bench http://localhost:8080 --pattern 55/35/10 --concurrency 50 --seed 7

use clap::Parser;
use colored::Colorize;
use kb_bench::runner::{run_session, SessionConfig, DEFAULT_TIMEOUT};
use kb_bench::workload::MixPattern;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;

const PATTERN_HELP: &str = "\
Available workload patterns:
  lookup-95    Lookup Heavy (95/4/1)
  lookup-90    Lookup Heavy (90/8/2)
  lookup-85    Lookup Heavy (85/12/3)
  lookup-80    Lookup Medium (80/15/5)
  lookup-75    Lookup Medium (75/20/5)
  balanced-60  Balanced (60/35/5)
  balanced-50  Balanced (50/40/10)
  balanced-40  Balanced (40/45/15)
  analytics-30 Analytics Heavy (30/60/10)
  analytics-20 Analytics Heavy (20/70/10)
  analytics-10 Analytics Heavy (10/80/10)
  write-30     Write Heavy (50/20/30)
  write-40     Write Heavy (40/20/40)
  write-50     Write Heavy (30/20/50)

Ad-hoc patterns are accepted as L/A/W weights summing to 100, e.g. 55/35/10.";

#[derive(Parser, Debug)]
#[command(name = "kb-bench", about = "Knowledge-base bake-off benchmark runner", after_help = PATTERN_HELP)]
struct Cli {
    /// Base URL of the SUT (e.g. http://localhost:8080).
    url: String,

    /// Workload pattern: a built-in name or L/A/W weights.
    #[arg(long, short)]
    pattern: String,

    /// Total request budget.
    #[arg(long, short = 'n', default_value = "10000")]
    requests: u64,

    /// Number of concurrent in-flight requests.
    #[arg(long, short = 'c', default_value = "10")]
    concurrency: usize,

    /// Caching is enabled on the SUT (recorded in session metadata).
    #[arg(long)]
    cache: bool,

    /// Output file prefix for the JSON/CSV/evaluation artifacts.
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Path segment prepended to all catalogue paths (multiplexed SUTs).
    #[arg(long)]
    db_prefix: Option<String>,

    /// Seed for the dataset selector and workload generator.
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Optional JSON pool file with curated identifier values.
    #[arg(long)]
    data_file: Option<PathBuf>,

    /// Per-request timeout in seconds.
    #[arg(long, default_value = "30")]
    timeout_secs: u64,
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("LOG_LEVEL")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    std::process::exit(real_main().await);
}

async fn real_main() -> i32 {
    init_logging();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let is_help = e.exit_code() == 0;
            let _ = e.print();
            return if is_help { 0 } else { 64 };
        }
    };

    let pattern = match MixPattern::resolve(&cli.pattern) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("{}: {e}", "error".red().bold());
            return 64;
        }
    };
    if cli.requests == 0 {
        eprintln!("{}: request budget must be positive", "error".red().bold());
        return 64;
    }

    let mut cfg = SessionConfig::new(&cli.url, pattern);
    cfg.requests = cli.requests;
    cfg.concurrency = cli.concurrency.max(1);
    cfg.cache_enabled = cli.cache;
    cfg.db_prefix = cli.db_prefix;
    cfg.seed = cli.seed;
    cfg.data_file = cli.data_file;
    cfg.output_prefix = cli.output;
    cfg.timeout = if cli.timeout_secs == 0 {
        DEFAULT_TIMEOUT
    } else {
        Duration::from_secs(cli.timeout_secs)
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; stopping issuance");
            let _ = shutdown_tx.send(true);
        }
    });

    match run_session(&cfg, shutdown_rx).await {
        Ok(artifact) => artifact.exit_code(),
        Err(e) => {
            eprintln!("{}: {e}", "error".red().bold());
            e.exit_code()
        }
    }
}
