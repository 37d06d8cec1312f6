//! KB Bake-Off comparison driver: run the {database × pattern ×
//! concurrency} matrix and produce crossover + scoring artifacts.
//!
//! Usage:
//!   kb-compare http://localhost:8080 --databases postgresql,neo4j,memgraph
//!   kb-compare http://localhost:8080 --databases pg=http://a:8080,neo4j=http://b:8080 \
//!       --workloads lookup-95,balanced-50,analytics-20 --test-type workload

use clap::Parser;
use colored::Colorize;
use kb_bench::comparison::{
    run_comparison, CompareConfig, DbTarget, TestType, DEFAULT_WARMUP_REQUESTS,
    DEFAULT_WORKLOAD_CONCURRENCY,
};
use kb_bench::thresholds::Thresholds;
use kb_bench::workload::MixPattern;
use kb_bench::BenchError;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Parser, Debug)]
#[command(name = "kb-compare", about = "Knowledge-base bake-off comparison engine")]
struct Cli {
    /// Default base URL for databases given without their own URL.
    url: String,

    /// Databases to compare: `id` or `id=url`, comma-separated.
    #[arg(long, value_delimiter = ',', required = true)]
    databases: Vec<String>,

    /// Workload patterns to test (default: all built-ins).
    #[arg(long, value_delimiter = ',')]
    workloads: Vec<String>,

    /// Concurrency levels for the scaling axis.
    #[arg(long, value_delimiter = ',', default_values_t = [1usize, 5, 10, 20, 50, 100])]
    concurrency: Vec<usize>,

    /// Requests per measured session.
    #[arg(long, default_value = "50000")]
    requests: u64,

    /// Requests per discarded warm-up block (0 disables warm-up).
    #[arg(long, default_value_t = DEFAULT_WARMUP_REQUESTS)]
    warmup_requests: u64,

    /// Fixed concurrency for the workload-pattern axis.
    #[arg(long, default_value_t = DEFAULT_WORKLOAD_CONCURRENCY)]
    workload_concurrency: usize,

    /// Which axis of the matrix to run.
    #[arg(long, default_value = "both", value_parser = ["workload", "concurrency", "both"])]
    test_type: String,

    /// Output directory for all artifacts.
    #[arg(long, default_value = "results")]
    output: PathBuf,

    /// JSON file with caller-supplied curation/operational scores.
    #[arg(long)]
    scores: Option<PathBuf>,

    /// Seed shared by every session so all databases see the same load.
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Caching is enabled on the SUTs.
    #[arg(long)]
    cache: bool,

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

    let cfg = match build_config(cli) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}: {e}", "error".red().bold());
            return 64;
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; finishing the current session");
            let _ = shutdown_tx.send(true);
        }
    });

    match run_comparison(&cfg, shutdown_rx).await {
        Ok(outcome) if outcome.interrupted => {
            eprintln!("{}", "comparison interrupted; partial results saved".yellow());
            3
        }
        Ok(_) => 0,
        Err(e) => {
            eprintln!("{}: {e}", "error".red().bold());
            e.exit_code()
        }
    }
}

fn build_config(cli: Cli) -> Result<CompareConfig, BenchError> {
    let databases = cli
        .databases
        .iter()
        .map(|entry| DbTarget::parse(entry, &cli.url))
        .collect::<Result<Vec<_>, _>>()?;

    let workloads = if cli.workloads.is_empty() {
        MixPattern::builtin().into_iter().map(|p| p.name).collect()
    } else {
        // Validate every pattern up front so bad input fails before load.
        for w in &cli.workloads {
            MixPattern::resolve(w)?;
        }
        cli.workloads
    };

    if cli.requests == 0 {
        return Err(BenchError::Usage("request budget must be positive".into()));
    }

    Ok(CompareConfig {
        databases,
        workloads,
        concurrency_levels: cli.concurrency,
        requests: cli.requests,
        warmup_requests: cli.warmup_requests,
        workload_concurrency: cli.workload_concurrency.max(1),
        test_type: TestType::parse(&cli.test_type)?,
        output_dir: cli.output,
        seed: cli.seed,
        timeout: Duration::from_secs(cli.timeout_secs.max(1)),
        cache_enabled: cli.cache,
        thresholds: Thresholds::default(),
        scores_file: cli.scores,
    })
}
