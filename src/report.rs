//! Session reporter: JSON, CSV and console artifacts.
//!
//! CSV header and column order are fixed; downstream diffing and
//! reporting tools depend on them byte for byte.

use crate::catalog;
use crate::metrics::{KindSummary, SessionSummary};
use crate::thresholds::{EvalInput, SessionEvaluation, Verdict};
use crate::BenchResult;
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One CSV row. Field order is the column order; do not reorder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsvRow {
    pub query_name: String,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub duration_sec: f64,
    pub throughput_qps: f64,
    pub error_rate: f64,
    pub latency_min_ms: Option<f64>,
    pub latency_p50_ms: Option<f64>,
    pub latency_p95_ms: Option<f64>,
    pub latency_p99_ms: Option<f64>,
    pub latency_max_ms: Option<f64>,
    pub latency_mean_ms: Option<f64>,
    pub latency_stddev_ms: Option<f64>,
}

impl From<&KindSummary> for CsvRow {
    fn from(k: &KindSummary) -> Self {
        Self {
            query_name: k.query_name.clone(),
            total_requests: k.total_requests,
            successful_requests: k.successful_requests,
            failed_requests: k.failed_requests,
            duration_sec: k.duration_sec,
            throughput_qps: k.throughput_qps,
            error_rate: k.error_rate,
            latency_min_ms: k.latency.min_ms,
            latency_p50_ms: k.latency.p50_ms,
            latency_p95_ms: k.latency.p95_ms,
            latency_p99_ms: k.latency.p99_ms,
            latency_max_ms: k.latency.max_ms,
            latency_mean_ms: k.latency.mean_ms,
            latency_stddev_ms: k.latency.stddev_ms,
        }
    }
}

/// Paths of the files a session wrote.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub json: PathBuf,
    pub csv: PathBuf,
    pub evaluation: PathBuf,
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> BenchResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

pub fn write_csv(path: &Path, rows: &[CsvRow]) -> BenchResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut wtr = csv::Writer::from_path(path)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn read_csv(path: &Path) -> BenchResult<Vec<CsvRow>> {
    let mut rdr = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for row in rdr.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

/// Write `<prefix>.json`, `<prefix>.csv` and `<prefix>-evaluation.json`.
pub fn write_artifacts(
    prefix: &Path,
    summary: &SessionSummary,
    evaluation: &SessionEvaluation,
) -> BenchResult<ArtifactPaths> {
    let paths = ArtifactPaths {
        json: PathBuf::from(format!("{}.json", prefix.display())),
        csv: PathBuf::from(format!("{}.csv", prefix.display())),
        evaluation: PathBuf::from(format!("{}-evaluation.json", prefix.display())),
    };
    write_json(&paths.json, summary)?;
    let rows: Vec<CsvRow> = summary.kinds.iter().map(CsvRow::from).collect();
    write_csv(&paths.csv, &rows)?;
    write_json(&paths.evaluation, evaluation)?;
    tracing::info!(
        "artifacts written: {}, {}, {}",
        paths.json.display(),
        paths.csv.display(),
        paths.evaluation.display()
    );
    Ok(paths)
}

/// Rebuild evaluator inputs from a CSV projection. Rows whose query name
/// is not in the catalogue are skipped with a warning.
pub fn eval_inputs_from_csv(rows: &[CsvRow]) -> Vec<EvalInput> {
    let mut inputs = Vec::new();
    for row in rows {
        match catalog::category_of(&row.query_name) {
            Some(category) => inputs.push(EvalInput {
                query_name: row.query_name.clone(),
                category,
                p50_ms: row.latency_p50_ms,
                p95_ms: row.latency_p95_ms,
                p99_ms: row.latency_p99_ms,
                error_rate: row.error_rate,
            }),
            None => tracing::warn!("no category mapping for query '{}'", row.query_name),
        }
    }
    inputs
}

/// Console summary: per-kind table followed by the aggregate verdict.
pub fn print_session(summary: &SessionSummary, evaluation: &SessionEvaluation) {
    println!(
        "\n{}",
        format!("━━━ {} ━━━", summary.session_name).bold().cyan()
    );

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS);
    table.set_header(vec![
        "Query",
        "Category",
        "Requests",
        "OK",
        "Failed",
        "p50 (ms)",
        "p95 (ms)",
        "p99 (ms)",
        "Max (ms)",
        "QPS",
        "Verdict",
    ]);

    for kind in &summary.kinds {
        let verdict = evaluation
            .evaluations
            .iter()
            .find(|e| e.query_name == kind.query_name)
            .map(|e| e.verdict);
        let fmt_ms = |v: Option<f64>| v.map(|x| format!("{x:.2}")).unwrap_or_else(|| "-".into());
        table.add_row(vec![
            Cell::new(&kind.query_name),
            Cell::new(kind.category),
            Cell::new(kind.total_requests),
            Cell::new(kind.successful_requests),
            Cell::new(kind.failed_requests),
            Cell::new(fmt_ms(kind.latency.p50_ms)),
            Cell::new(fmt_ms(kind.latency.p95_ms)),
            Cell::new(fmt_ms(kind.latency.p99_ms)),
            Cell::new(fmt_ms(kind.latency.max_ms)),
            Cell::new(format!("{:.1}", kind.throughput_qps)),
            verdict_cell(verdict),
        ]);
    }
    println!("{table}");

    println!(
        "  issued {}  ok {}  failed {}  wall clock {:.2}s{}",
        summary.issued,
        summary.ok,
        summary.failed,
        summary.wall_clock_sec,
        if summary.interrupted {
            "  [interrupted]".yellow().bold().to_string()
        } else {
            String::new()
        }
    );

    let agg = evaluation.summary.aggregate;
    let agg_str = match agg {
        Verdict::Pass => agg.as_str().green().bold(),
        Verdict::ConditionalPass => agg.as_str().yellow().bold(),
        Verdict::Fail => agg.as_str().red().bold(),
    };
    println!(
        "  verdict: {}  (pass {} / conditional {} / fail {})",
        agg_str,
        evaluation.summary.pass,
        evaluation.summary.conditional_pass,
        evaluation.summary.fail
    );
    for e in &evaluation.evaluations {
        if e.verdict != Verdict::Pass {
            println!("    {} {}: {}", "·".dimmed(), e.query_name, e.details.dimmed());
        }
    }
}

fn verdict_cell(verdict: Option<Verdict>) -> Cell {
    match verdict {
        Some(Verdict::Pass) => Cell::new("PASS").fg(Color::Green),
        Some(Verdict::ConditionalPass) => Cell::new("COND").fg(Color::Yellow),
        Some(Verdict::Fail) => Cell::new("FAIL").fg(Color::Red),
        None => Cell::new("-"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::QueryCategory;
    use crate::metrics::LatencySummary;
    use crate::thresholds::Thresholds;

    fn sample_kind(name: &str, p50: f64) -> KindSummary {
        KindSummary {
            query_name: name.into(),
            category: catalog::category_of(name).unwrap(),
            total_requests: 100,
            successful_requests: 100,
            failed_requests: 0,
            http_errors: 0,
            timeouts: 0,
            transport_errors: 0,
            duration_sec: 1.5,
            throughput_qps: 66.7,
            error_rate: 0.0,
            latency: LatencySummary {
                min_ms: Some(p50 / 2.0),
                mean_ms: Some(p50),
                stddev_ms: Some(0.5),
                p50_ms: Some(p50),
                p75_ms: Some(p50 + 0.5),
                p90_ms: Some(p50 + 1.0),
                p95_ms: Some(p50 + 1.5),
                p99_ms: Some(p50 + 2.0),
                p999_ms: Some(p50 + 2.5),
                max_ms: Some(p50 + 3.0),
            },
        }
    }

    #[test]
    fn csv_header_is_bit_exact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        write_csv(&path, &[CsvRow::from(&sample_kind("mode_s", 2.0))]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let header = text.lines().next().unwrap();
        assert_eq!(
            header,
            "query_name,total_requests,successful_requests,failed_requests,duration_sec,\
             throughput_qps,error_rate,latency_min_ms,latency_p50_ms,latency_p95_ms,\
             latency_p99_ms,latency_max_ms,latency_mean_ms,latency_stddev_ms"
        );
    }

    #[test]
    fn csv_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let rows = vec![
            CsvRow::from(&sample_kind("mode_s", 2.0)),
            CsvRow::from(&sample_kind("cross_domain", 40.0)),
        ];
        write_csv(&path, &rows).unwrap();
        let back = read_csv(&path).unwrap();
        assert_eq!(rows, back);
    }

    #[test]
    fn empty_latencies_round_trip_as_nulls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut k = sample_kind("mode_s", 2.0);
        k.successful_requests = 0;
        k.failed_requests = 100;
        k.error_rate = 1.0;
        k.latency = LatencySummary::default();
        write_csv(&path, &[CsvRow::from(&k)]).unwrap();
        let back = read_csv(&path).unwrap();
        assert_eq!(back[0].latency_p50_ms, None);
        assert_eq!(back[0].latency_max_ms, None);
    }

    #[test]
    fn evaluation_from_csv_matches_evaluation_from_summaries() {
        let kinds = vec![sample_kind("mode_s", 2.0), sample_kind("country_two_hop", 80.0)];
        let thresholds = Thresholds::default();
        let direct = thresholds.evaluate_session(
            &kinds.iter().map(EvalInput::from).collect::<Vec<_>>(),
            false,
        );

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let rows: Vec<CsvRow> = kinds.iter().map(CsvRow::from).collect();
        write_csv(&path, &rows).unwrap();
        let from_csv =
            thresholds.evaluate_session(&eval_inputs_from_csv(&read_csv(&path).unwrap()), false);

        assert_eq!(
            serde_json::to_value(&direct).unwrap(),
            serde_json::to_value(&from_csv).unwrap()
        );
    }
}
