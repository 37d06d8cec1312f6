//! Single-session orchestration: preflight, generate, execute, evaluate,
//! report.

use crate::dataset::DatasetSelector;
use crate::executor::{self, ExecutorConfig};
use crate::metrics::SessionSummary;
use crate::report::{self, ArtifactPaths};
use crate::thresholds::{EvalInput, SessionEvaluation, Thresholds};
use crate::workload::{MixPattern, WorkloadGenerator};
use crate::{catalog, BenchError, BenchResult};
use colored::Colorize;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::watch;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const PREFLIGHT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub name: String,
    pub base_url: String,
    pub db_prefix: Option<String>,
    pub pattern: MixPattern,
    pub requests: u64,
    pub concurrency: usize,
    pub timeout: Duration,
    pub cache_enabled: bool,
    pub seed: u64,
    pub data_file: Option<PathBuf>,
    pub thresholds: Thresholds,
    /// Artifact prefix; no files are written when absent.
    pub output_prefix: Option<PathBuf>,
    /// Suppress console output (warm-ups, comparison sub-runs).
    pub quiet: bool,
}

impl SessionConfig {
    pub fn new(base_url: impl Into<String>, pattern: MixPattern) -> Self {
        let pattern_name = pattern.name.clone();
        Self {
            name: format!("benchmark-{pattern_name}"),
            base_url: base_url.into(),
            db_prefix: None,
            pattern,
            requests: 10_000,
            concurrency: 10,
            timeout: DEFAULT_TIMEOUT,
            cache_enabled: false,
            seed: 42,
            data_file: None,
            thresholds: Thresholds::default(),
            output_prefix: None,
            quiet: false,
        }
    }
}

/// A completed run: frozen metrics, its evaluation, and any files written.
#[derive(Debug)]
pub struct RunArtifact {
    pub summary: SessionSummary,
    pub evaluation: SessionEvaluation,
    pub artifacts: Option<ArtifactPaths>,
}

impl RunArtifact {
    /// Runner exit code: interrupt wins over the verdict.
    pub fn exit_code(&self) -> i32 {
        if self.summary.interrupted {
            3
        } else {
            self.evaluation.summary.aggregate.exit_code()
        }
    }
}

/// Verify the SUT is reachable before issuing load.
pub async fn preflight(base_url: &str) -> BenchResult<()> {
    let client = reqwest::Client::builder()
        .timeout(PREFLIGHT_TIMEOUT)
        .build()?;
    let url = format!("{}/health", base_url.trim_end_matches('/'));
    match client.get(&url).send().await {
        Ok(resp) if resp.status().is_success() => {
            tracing::debug!("preflight ok: {url}");
            Ok(())
        }
        Ok(resp) => Err(BenchError::Preflight(format!(
            "{url} returned {}; is the SUT ready?",
            resp.status()
        ))),
        Err(e) => Err(BenchError::Preflight(format!(
            "cannot reach {url}: {e}; check the base URL and that the SUT is running"
        ))),
    }
}

/// Run one benchmark session end to end.
pub async fn run_session(
    cfg: &SessionConfig,
    shutdown: watch::Receiver<bool>,
) -> BenchResult<RunArtifact> {
    preflight(&cfg.base_url).await?;

    if !cfg.quiet {
        print_banner(cfg);
    }

    let dataset = DatasetSelector::new(cfg.seed, cfg.data_file.as_deref());
    let synthetic_data_used = dataset.synthetic_data_used();
    let generator = WorkloadGenerator::new(cfg.pattern.clone(), cfg.requests, cfg.seed, dataset)?;

    let started_unix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    tracing::info!(
        pattern = %cfg.pattern.name,
        requests = cfg.requests,
        concurrency = cfg.concurrency,
        "session start"
    );

    let exec_cfg = ExecutorConfig {
        base_url: cfg.base_url.clone(),
        db_prefix: cfg.db_prefix.clone(),
        concurrency: cfg.concurrency,
        timeout: cfg.timeout,
    };
    let metrics = executor::drive(generator, &exec_cfg, shutdown).await?;

    let mut kinds = Vec::with_capacity(metrics.kinds.len());
    for (id, m) in &metrics.kinds {
        let category = catalog::category_of(id).ok_or_else(|| {
            BenchError::Invariant(format!("observation for uncatalogued kind '{id}'"))
        })?;
        kinds.push(m.summary(id, category));
    }

    let summary = SessionSummary {
        session_name: cfg.name.clone(),
        sut_url: cfg.base_url.clone(),
        pattern: cfg.pattern.clone(),
        concurrency: cfg.concurrency,
        request_budget: cfg.requests,
        seed: cfg.seed,
        cache_enabled: cfg.cache_enabled,
        db_prefix: cfg.db_prefix.clone(),
        synthetic_data_used,
        interrupted: metrics.interrupted,
        started_unix,
        wall_clock_sec: metrics.wall_clock_sec,
        issued: metrics.total_issued(),
        ok: metrics.total_ok(),
        failed: metrics.total_failed(),
        kinds,
    };

    let inputs: Vec<EvalInput> = summary.kinds.iter().map(EvalInput::from).collect();
    let evaluation = cfg.thresholds.evaluate_session(&inputs, cfg.cache_enabled);

    let artifacts = match &cfg.output_prefix {
        Some(prefix) => Some(report::write_artifacts(prefix, &summary, &evaluation)?),
        None => None,
    };

    if !cfg.quiet {
        report::print_session(&summary, &evaluation);
    }

    tracing::info!(
        issued = summary.issued,
        ok = summary.ok,
        failed = summary.failed,
        interrupted = summary.interrupted,
        verdict = %evaluation.summary.aggregate,
        "session complete"
    );

    Ok(RunArtifact {
        summary,
        evaluation,
        artifacts,
    })
}

fn print_banner(cfg: &SessionConfig) {
    println!("\n{}", "╔══════════════════════════════════════════════════════╗".bold().blue());
    println!("{}", "║          KB Bake-Off Benchmark Runner                ║".bold().blue());
    println!("{}", "╚══════════════════════════════════════════════════════╝".bold().blue());
    println!("  Target:      {}", cfg.base_url);
    println!("  Pattern:     {} ({})", cfg.pattern.name, cfg.pattern.label);
    println!("  Requests:    {}", cfg.requests);
    println!("  Concurrency: {}", cfg.concurrency);
    println!("  Cache:       {}", if cfg.cache_enabled { "enabled" } else { "disabled" });
    println!("  Seed:        {}", cfg.seed);
    if let Some(prefix) = &cfg.db_prefix {
        println!("  DB prefix:   {prefix}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thresholds::Verdict;
    use crate::metrics::SessionSummary;

    fn artifact(interrupted: bool) -> RunArtifact {
        let pattern = MixPattern::named("lookup-95").unwrap();
        RunArtifact {
            summary: SessionSummary {
                session_name: "t".into(),
                sut_url: "http://localhost:1".into(),
                pattern,
                concurrency: 1,
                request_budget: 1,
                seed: 1,
                cache_enabled: false,
                db_prefix: None,
                synthetic_data_used: true,
                interrupted,
                started_unix: 0,
                wall_clock_sec: 0.0,
                issued: 0,
                ok: 0,
                failed: 0,
                kinds: vec![],
            },
            evaluation: Thresholds::default().evaluate_session(&[], false),
            artifacts: None,
        }
    }

    #[test]
    fn exit_code_prefers_interrupt_over_verdict() {
        let mut a = artifact(true);
        a.evaluation.summary.aggregate = Verdict::Fail;
        assert_eq!(a.exit_code(), 3);

        let mut a = artifact(false);
        a.evaluation.summary.aggregate = Verdict::ConditionalPass;
        assert_eq!(a.exit_code(), 1);
        a.evaluation.summary.aggregate = Verdict::Fail;
        assert_eq!(a.exit_code(), 2);
        a.evaluation.summary.aggregate = Verdict::Pass;
        assert_eq!(a.exit_code(), 0);
    }
}
