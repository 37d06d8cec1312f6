//! Comparison engine: drive the {database × pattern × concurrency} run
//! matrix in-process, then derive crossover and scoring artifacts.
//!
//! Every measured block is preceded by a discarded warm-up session. All
//! databases see the same seeded request sequence so runs differ only in
//! the SUT behind them.

use crate::metrics::{round2, SessionSummary};
use crate::runner::{self, RunArtifact, SessionConfig};
use crate::scoring::{self, DecisionScore, ExternalScores};
use crate::thresholds::{Thresholds, Verdict};
use crate::workload::MixPattern;
use crate::{BenchError, BenchResult};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::watch;

pub const WARMUP_PATTERN: &str = "lookup-95";
pub const DEFAULT_WARMUP_REQUESTS: u64 = 5_000;
/// Fixed concurrency for the workload-pattern axis of the matrix.
pub const DEFAULT_WORKLOAD_CONCURRENCY: usize = 20;
/// Pattern used along the concurrency-scaling axis.
pub const SCALING_PATTERN: &str = "balanced-50";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestType {
    Workload,
    Concurrency,
    Both,
}

impl TestType {
    pub fn parse(s: &str) -> BenchResult<Self> {
        match s {
            "workload" => Ok(TestType::Workload),
            "concurrency" => Ok(TestType::Concurrency),
            "both" => Ok(TestType::Both),
            other => Err(BenchError::Usage(format!(
                "unknown test type '{other}' (expected workload, concurrency or both)"
            ))),
        }
    }

    fn runs_workload(self) -> bool {
        matches!(self, TestType::Workload | TestType::Both)
    }

    fn runs_concurrency(self) -> bool {
        matches!(self, TestType::Concurrency | TestType::Both)
    }
}

/// One database under comparison. Parsed from `id` (uses the default base
/// URL) or `id=url`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbTarget {
    pub id: String,
    pub base_url: String,
}

impl DbTarget {
    pub fn parse(entry: &str, default_url: &str) -> BenchResult<Self> {
        let (id, url) = match entry.split_once('=') {
            Some((id, url)) => (id.trim(), url.trim().to_string()),
            None => (entry.trim(), default_url.to_string()),
        };
        if id.is_empty() || url.is_empty() {
            return Err(BenchError::Usage(format!(
                "bad database entry '{entry}' (expected 'id' or 'id=url')"
            )));
        }
        Ok(Self {
            id: id.to_string(),
            base_url: url,
        })
    }
}

#[derive(Debug, Clone)]
pub struct CompareConfig {
    pub databases: Vec<DbTarget>,
    pub workloads: Vec<String>,
    pub concurrency_levels: Vec<usize>,
    pub requests: u64,
    pub warmup_requests: u64,
    pub workload_concurrency: usize,
    pub test_type: TestType,
    pub output_dir: PathBuf,
    pub seed: u64,
    pub timeout: Duration,
    pub cache_enabled: bool,
    pub thresholds: Thresholds,
    pub scores_file: Option<PathBuf>,
}

/// One measured run, projected for summaries and crossover. Overall
/// percentiles are request-weighted across kinds; the representative p99
/// is the one crossover compares.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub database: String,
    pub workload_pattern: String,
    pub requests: u64,
    pub concurrency: usize,
    pub p50_ms: Option<f64>,
    pub p95_ms: Option<f64>,
    pub p99_ms: Option<f64>,
    pub mean_ms: Option<f64>,
    pub representative_kind: String,
    pub representative_p99_ms: Option<f64>,
    pub throughput_qps: f64,
    pub success_count: u64,
    pub fail_count: u64,
    pub test_duration_sec: f64,
    pub verdict: Verdict,
}

#[derive(Debug, Serialize, Deserialize)]
struct DbSummaryFile {
    database: String,
    test_type: String,
    results: Vec<ComparisonRow>,
}

#[derive(Debug)]
pub struct ComparisonOutcome {
    pub workload_rows: Vec<ComparisonRow>,
    pub concurrency_rows: Vec<ComparisonRow>,
    pub crossover: CrossoverReport,
    pub scores: Vec<DecisionScore>,
    pub interrupted: bool,
}

/// The representative kind whose p99 decides a pattern's crossover.
pub fn representative_kind(pattern: &str) -> &'static str {
    if pattern.starts_with("lookup") {
        "mode_s"
    } else if pattern.starts_with("analytics") {
        "cross_domain"
    } else if pattern.starts_with("write") {
        "activity_log"
    } else {
        "country_two_hop"
    }
}

/// Run the full matrix. On an external interrupt the partial artifacts
/// are still written and `interrupted` is set.
pub async fn run_comparison(
    cfg: &CompareConfig,
    shutdown: watch::Receiver<bool>,
) -> BenchResult<ComparisonOutcome> {
    std::fs::create_dir_all(&cfg.output_dir)?;

    let mut workload_rows: Vec<ComparisonRow> = Vec::new();
    let mut concurrency_rows: Vec<ComparisonRow> = Vec::new();
    let mut interrupted = false;

    'matrix: for db in &cfg.databases {
        println!(
            "\n{}",
            format!("═══ database: {} ({}) ═══", db.id, db.base_url).bold().blue()
        );
        runner::preflight(&db.base_url).await?;

        if cfg.test_type.runs_workload() {
            if !warmup(cfg, db, shutdown.clone()).await? {
                interrupted = true;
                break 'matrix;
            }
            for pattern_name in &cfg.workloads {
                if *shutdown.borrow() {
                    interrupted = true;
                    break 'matrix;
                }
                let row = measured_run(
                    cfg,
                    db,
                    pattern_name,
                    cfg.workload_concurrency,
                    shutdown.clone(),
                )
                .await?;
                match row {
                    Some(row) => workload_rows.push(row),
                    None => {
                        interrupted = true;
                        break 'matrix;
                    }
                }
            }
            save_db_summary(cfg, &db.id, "workload", &workload_rows)?;
        }

        if cfg.test_type.runs_concurrency() {
            if !warmup(cfg, db, shutdown.clone()).await? {
                interrupted = true;
                break 'matrix;
            }
            for &level in &cfg.concurrency_levels {
                if *shutdown.borrow() {
                    interrupted = true;
                    break 'matrix;
                }
                let row = measured_run(cfg, db, SCALING_PATTERN, level, shutdown.clone()).await?;
                match row {
                    Some(row) => concurrency_rows.push(row),
                    None => {
                        interrupted = true;
                        break 'matrix;
                    }
                }
            }
            save_db_summary(cfg, &db.id, "concurrency", &concurrency_rows)?;
        }
    }

    if interrupted {
        // Persist whatever exists before reporting the interrupt.
        for db in &cfg.databases {
            save_db_summary(cfg, &db.id, "workload", &workload_rows)?;
            save_db_summary(cfg, &db.id, "concurrency", &concurrency_rows)?;
        }
    }

    let crossover = analyze_crossover(&workload_rows, &concurrency_rows);
    write_crossover_markdown(&cfg.output_dir.join("CROSSOVER_ANALYSIS.md"), &crossover)?;

    let external = load_external_scores(cfg.scores_file.as_deref())?;
    let scores = scoring::compute_scores(&workload_rows, &concurrency_rows, &external);
    crate::report::write_json(&cfg.output_dir.join("decision_scores.json"), &scores)?;

    print_comparison_summary(&crossover, &scores);

    Ok(ComparisonOutcome {
        workload_rows,
        concurrency_rows,
        crossover,
        scores,
        interrupted,
    })
}

/// Discarded warm-up block. Returns false when interrupted.
async fn warmup(
    cfg: &CompareConfig,
    db: &DbTarget,
    shutdown: watch::Receiver<bool>,
) -> BenchResult<bool> {
    if cfg.warmup_requests == 0 || *shutdown.borrow() {
        return Ok(!*shutdown.borrow());
    }
    println!("  [{}] warm-up ({} requests)...", db.id, cfg.warmup_requests);
    let pattern = MixPattern::named(WARMUP_PATTERN)
        .ok_or_else(|| BenchError::Invariant("warm-up pattern missing from catalogue".into()))?;
    let mut session = SessionConfig::new(&db.base_url, pattern);
    session.name = format!("{}-warmup", db.id);
    session.requests = cfg.warmup_requests;
    session.concurrency = cfg.workload_concurrency;
    session.timeout = cfg.timeout;
    session.seed = cfg.seed;
    session.quiet = true;
    let artifact = runner::run_session(&session, shutdown).await?;
    Ok(!artifact.summary.interrupted)
}

/// One measured session. Returns None when the session was interrupted.
async fn measured_run(
    cfg: &CompareConfig,
    db: &DbTarget,
    pattern_name: &str,
    concurrency: usize,
    shutdown: watch::Receiver<bool>,
) -> BenchResult<Option<ComparisonRow>> {
    let pattern = MixPattern::resolve(pattern_name)?;
    let prefix = cfg
        .output_dir
        .join(&db.id)
        .join(format!("{pattern_name}_c{concurrency}"));

    let mut session = SessionConfig::new(&db.base_url, pattern);
    session.name = format!("{}-{pattern_name}-c{concurrency}", db.id);
    session.requests = cfg.requests;
    session.concurrency = concurrency;
    session.timeout = cfg.timeout;
    session.cache_enabled = cfg.cache_enabled;
    session.seed = cfg.seed;
    session.thresholds = cfg.thresholds.clone();
    session.output_prefix = Some(prefix);
    session.quiet = true;

    let artifact = runner::run_session(&session, shutdown).await?;
    let row = row_from_artifact(&db.id, pattern_name, concurrency, &artifact);
    println!(
        "  [{}] {pattern_name} c{concurrency}: p99={} throughput={:.1} qps verdict={}",
        db.id,
        row.representative_p99_ms
            .map(|v| format!("{v:.2}ms"))
            .unwrap_or_else(|| "n/a".into()),
        row.throughput_qps,
        row.verdict,
    );
    if artifact.summary.interrupted {
        return Ok(None);
    }
    Ok(Some(row))
}

fn row_from_artifact(
    database: &str,
    pattern: &str,
    concurrency: usize,
    artifact: &RunArtifact,
) -> ComparisonRow {
    let summary = &artifact.summary;
    let rep = representative_kind(pattern);
    let rep_p99 = summary
        .kinds
        .iter()
        .find(|k| k.query_name == rep)
        .and_then(|k| k.latency.p99_ms);

    ComparisonRow {
        database: database.to_string(),
        workload_pattern: pattern.to_string(),
        requests: summary.issued,
        concurrency,
        p50_ms: weighted_ms(summary, |k| k.latency.p50_ms),
        p95_ms: weighted_ms(summary, |k| k.latency.p95_ms),
        p99_ms: weighted_ms(summary, |k| k.latency.p99_ms),
        mean_ms: weighted_ms(summary, |k| k.latency.mean_ms),
        representative_kind: rep.to_string(),
        representative_p99_ms: rep_p99,
        throughput_qps: if summary.wall_clock_sec > 0.0 {
            summary.ok as f64 / summary.wall_clock_sec
        } else {
            0.0
        },
        success_count: summary.ok,
        fail_count: summary.failed,
        test_duration_sec: summary.wall_clock_sec,
        verdict: artifact.evaluation.summary.aggregate,
    }
}

/// Success-weighted average of a per-kind latency field.
fn weighted_ms(
    summary: &SessionSummary,
    field: impl Fn(&crate::metrics::KindSummary) -> Option<f64>,
) -> Option<f64> {
    let mut num = 0.0;
    let mut den = 0u64;
    for k in &summary.kinds {
        if let Some(v) = field(k) {
            num += v * k.successful_requests as f64;
            den += k.successful_requests;
        }
    }
    if den == 0 {
        None
    } else {
        Some(round2(num / den as f64))
    }
}

fn save_db_summary(
    cfg: &CompareConfig,
    database: &str,
    test_type: &str,
    rows: &[ComparisonRow],
) -> BenchResult<()> {
    let own: Vec<ComparisonRow> = rows
        .iter()
        .filter(|r| r.database == database)
        .cloned()
        .collect();
    let file = DbSummaryFile {
        database: database.to_string(),
        test_type: test_type.to_string(),
        results: own,
    };
    let path = cfg
        .output_dir
        .join(database)
        .join(format!("{test_type}_summary.json"));
    crate::report::write_json(&path, &file)
}

fn load_external_scores(
    path: Option<&Path>,
) -> BenchResult<BTreeMap<String, ExternalScores>> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&text)?)
        }
        None => {
            tracing::warn!("no scores file supplied; curation/operational dimensions score 0");
            Ok(BTreeMap::new())
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Crossover analysis
// ────────────────────────────────────────────────────────────────────────────

/// A pattern where one database beats the rest on representative p99.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossoverPoint {
    pub pattern: String,
    pub winner: String,
    pub runner_up: String,
    pub winner_p99_ms: f64,
    pub runner_up_p99_ms: f64,
    /// `(runner_up − winner) / runner_up`.
    pub margin: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyWinner {
    pub concurrency: usize,
    pub winner: String,
    pub winner_p99_ms: f64,
    pub winner_throughput_qps: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossoverReport {
    pub points: Vec<CrossoverPoint>,
    pub wins: BTreeMap<String, usize>,
    pub win_rate: BTreeMap<String, f64>,
    pub concurrency_winners: Vec<ConcurrencyWinner>,
    /// First concurrency level with <10% throughput gain, per database.
    pub plateaus: BTreeMap<String, Option<usize>>,
}

pub fn analyze_crossover(
    workload_rows: &[ComparisonRow],
    concurrency_rows: &[ComparisonRow],
) -> CrossoverReport {
    let patterns: BTreeSet<&str> = workload_rows
        .iter()
        .map(|r| r.workload_pattern.as_str())
        .collect();

    let mut points = Vec::new();
    for pattern in patterns {
        let mut contenders: Vec<(&str, f64)> = workload_rows
            .iter()
            .filter(|r| r.workload_pattern == pattern)
            .filter_map(|r| r.representative_p99_ms.map(|p| (r.database.as_str(), p)))
            .collect();
        if contenders.len() < 2 {
            continue;
        }
        contenders.sort_by(|a, b| a.1.total_cmp(&b.1));
        let (winner, winner_p99) = contenders[0];
        let (runner_up, runner_up_p99) = contenders[1];
        points.push(CrossoverPoint {
            pattern: pattern.to_string(),
            winner: winner.to_string(),
            runner_up: runner_up.to_string(),
            winner_p99_ms: winner_p99,
            runner_up_p99_ms: runner_up_p99,
            margin: if runner_up_p99 > 0.0 {
                (runner_up_p99 - winner_p99) / runner_up_p99
            } else {
                0.0
            },
        });
    }

    let mut wins: BTreeMap<String, usize> = BTreeMap::new();
    for row in workload_rows {
        wins.entry(row.database.clone()).or_default();
    }
    for p in &points {
        *wins.entry(p.winner.clone()).or_default() += 1;
    }
    let total = points.len().max(1);
    let win_rate = wins
        .iter()
        .map(|(db, w)| (db.clone(), *w as f64 / total as f64))
        .collect();

    // Concurrency axis: winner per level, plus throughput plateaus.
    let levels: BTreeSet<usize> = concurrency_rows.iter().map(|r| r.concurrency).collect();
    let mut concurrency_winners = Vec::new();
    for level in levels {
        let mut contenders: Vec<&ComparisonRow> = concurrency_rows
            .iter()
            .filter(|r| r.concurrency == level && r.p99_ms.is_some())
            .collect();
        if contenders.is_empty() {
            continue;
        }
        contenders.sort_by(|a, b| a.p99_ms.unwrap().total_cmp(&b.p99_ms.unwrap()));
        let best = contenders[0];
        concurrency_winners.push(ConcurrencyWinner {
            concurrency: level,
            winner: best.database.clone(),
            winner_p99_ms: best.p99_ms.unwrap_or_default(),
            winner_throughput_qps: best.throughput_qps,
        });
    }

    let databases: BTreeSet<&str> = concurrency_rows
        .iter()
        .map(|r| r.database.as_str())
        .collect();
    let mut plateaus = BTreeMap::new();
    for db in databases {
        let mut rows: Vec<&ComparisonRow> = concurrency_rows
            .iter()
            .filter(|r| r.database == db)
            .collect();
        rows.sort_by_key(|r| r.concurrency);
        let mut plateau = None;
        for pair in rows.windows(2) {
            let (prev, next) = (pair[0], pair[1]);
            if prev.throughput_qps > 0.0 {
                let gain = (next.throughput_qps - prev.throughput_qps) / prev.throughput_qps;
                if gain < 0.10 {
                    plateau = Some(next.concurrency);
                    break;
                }
            }
        }
        plateaus.insert(db.to_string(), plateau);
    }

    CrossoverReport {
        points,
        wins,
        win_rate,
        concurrency_winners,
        plateaus,
    }
}

pub fn write_crossover_markdown(path: &Path, report: &CrossoverReport) -> BenchResult<()> {
    let mut md = String::new();
    md.push_str("# Crossover Analysis Report\n\n");
    md.push_str("## Workload Crossover Points\n\n");

    let mut by_winner: BTreeMap<&str, Vec<&CrossoverPoint>> = BTreeMap::new();
    for p in &report.points {
        by_winner.entry(p.winner.as_str()).or_default().push(p);
    }
    for (winner, points) in &by_winner {
        let _ = writeln!(md, "### {} wins\n", winner.to_uppercase());
        md.push_str("| Workload Pattern | p99 Latency | Margin vs Runner-up |\n");
        md.push_str("|------------------|-------------|---------------------|\n");
        for p in points {
            let _ = writeln!(
                md,
                "| {} | {:.2} ms | {:.1}% |",
                p.pattern,
                p.winner_p99_ms,
                p.margin * 100.0
            );
        }
        md.push('\n');
    }

    md.push_str("## Win Rate\n\n");
    md.push_str("| Database | Wins | Win Rate |\n");
    md.push_str("|----------|------|----------|\n");
    let total = report.points.len().max(1);
    for (db, wins) in &report.wins {
        let _ = writeln!(
            md,
            "| {db} | {wins}/{total} | {:.1}% |",
            report.win_rate.get(db).copied().unwrap_or(0.0) * 100.0
        );
    }
    md.push('\n');

    if !report.concurrency_winners.is_empty() {
        md.push_str("## Concurrency Scaling\n\n");
        md.push_str("| Concurrency | Winner | p99 | Throughput |\n");
        md.push_str("|-------------|--------|-----|------------|\n");
        for w in &report.concurrency_winners {
            let _ = writeln!(
                md,
                "| {} | {} | {:.2} ms | {:.1} qps |",
                w.concurrency, w.winner, w.winner_p99_ms, w.winner_throughput_qps
            );
        }
        md.push('\n');

        md.push_str("### Scalability Limits\n\n");
        for (db, plateau) in &report.plateaus {
            match plateau {
                Some(level) => {
                    let _ = writeln!(md, "- {db}: throughput plateau at concurrency ~{level}");
                }
                None => {
                    let _ = writeln!(md, "- {db}: no plateau detected (scales well)");
                }
            }
        }
        md.push('\n');
    }

    if let Some((winner, wins)) = report.wins.iter().max_by_key(|(_, w)| **w) {
        md.push_str("## Overall Winner\n\n");
        let _ = writeln!(md, "**Winner: {}**\n", winner.to_uppercase());
        let _ = writeln!(
            md,
            "- Wins: {wins}/{} patterns ({:.1}%)",
            report.points.len().max(1),
            report.win_rate.get(winner).copied().unwrap_or(0.0) * 100.0
        );
        md.push_str("- Best p99 on the representative kind in the majority of patterns\n\n");

        md.push_str("## Use-Case Recommendations\n\n");
        for (db, points) in &by_winner {
            let families: BTreeSet<&str> = points
                .iter()
                .map(|p| {
                    if p.pattern.starts_with("lookup") {
                        "lookup-heavy"
                    } else if p.pattern.starts_with("analytics") {
                        "analytics-heavy"
                    } else if p.pattern.starts_with("write") {
                        "write-heavy"
                    } else {
                        "balanced"
                    }
                })
                .collect();
            for family in families {
                let _ = writeln!(md, "- {family} workloads → use {db}");
            }
        }
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, md)?;
    Ok(())
}

fn print_comparison_summary(report: &CrossoverReport, scores: &[DecisionScore]) {
    println!("\n{}", "── Crossover Summary ──".bold().yellow());
    for p in &report.points {
        println!(
            "  {:<16} {:<12} p99 {:>8.2} ms  margin {:>5.1}%",
            p.pattern,
            p.winner,
            p.winner_p99_ms,
            p.margin * 100.0
        );
    }
    println!("\n{}", "── Decision Scores ──".bold().yellow());
    for s in scores {
        println!(
            "  #{} {:<12} total {:>5.1}/100 (perf {:>4.1} cur {:>4.1} ops {:>4.1}) {} - {}",
            s.rank,
            s.database,
            s.total_score,
            s.performance_total,
            s.curation_total,
            s.operational_total,
            s.threshold_status,
            s.recommendation
        );
    }
}
