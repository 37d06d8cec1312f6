//! End-to-end sessions against in-process stub SUTs.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Router;
use kb_bench::comparison::{
    self, run_comparison, CompareConfig, ComparisonRow, DbTarget, TestType,
};
use kb_bench::report;
use kb_bench::runner::{run_session, SessionConfig};
use kb_bench::thresholds::{Thresholds, Verdict};
use kb_bench::workload::MixPattern;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Clone, Default)]
struct Stub {
    delay: Duration,
    /// Extra-slow handling for paths with this prefix.
    slow_prefix: Option<(&'static str, Duration)>,
    always_500: bool,
}

async fn handle(State(stub): State<Stub>, req: Request) -> impl IntoResponse {
    let path = req.uri().path().to_string();
    if path == "/health" {
        return (StatusCode::OK, r#"{"status":"ok"}"#);
    }
    if stub.always_500 {
        return (StatusCode::INTERNAL_SERVER_ERROR, r#"{"error":"boom"}"#);
    }
    let delay = match stub.slow_prefix {
        Some((prefix, slow)) if path.starts_with(prefix) => slow,
        _ => stub.delay,
    };
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    (StatusCode::OK, r#"{"ok":true}"#)
}

async fn spawn_stub(stub: Stub) -> String {
    let app = Router::new().fallback(handle).with_state(stub);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn no_shutdown() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    // Keep the sender alive for the whole test process.
    std::mem::forget(tx);
    rx
}

fn session(url: &str, pattern: &str, requests: u64, concurrency: usize) -> SessionConfig {
    let mut cfg = SessionConfig::new(url, MixPattern::resolve(pattern).unwrap());
    cfg.requests = requests;
    cfg.concurrency = concurrency;
    cfg.seed = 42;
    cfg.quiet = true;
    cfg
}

#[tokio::test]
async fn steady_fast_sut_passes() {
    let url = spawn_stub(Stub {
        delay: Duration::from_millis(1),
        ..Default::default()
    })
    .await;

    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("fast");
    let mut cfg = session(&url, "lookup-95", 2000, 10);
    cfg.output_prefix = Some(prefix.clone());

    let artifact = run_session(&cfg, no_shutdown()).await.unwrap();
    let summary = &artifact.summary;

    assert!(!summary.interrupted);
    assert_eq!(summary.issued, 2000);
    assert_eq!(summary.failed, 0);
    assert_eq!(artifact.evaluation.summary.aggregate, Verdict::Pass);
    assert_eq!(artifact.exit_code(), 0);

    // Per-kind counters sum to the session totals.
    let ok_sum: u64 = summary.kinds.iter().map(|k| k.successful_requests).sum();
    let failed_sum: u64 = summary.kinds.iter().map(|k| k.failed_requests).sum();
    assert_eq!(ok_sum, summary.ok);
    assert_eq!(failed_sum, summary.failed);

    // The dominant kind saw roughly its share of a 95/4/1 mix.
    let mode_s = summary.kinds.iter().find(|k| k.query_name == "mode_s").unwrap();
    assert!(
        mode_s.total_requests > 800,
        "mode_s drew only {}",
        mode_s.total_requests
    );
    // Latency clusters just above the stub's fixed delay.
    let p50 = mode_s.latency.p50_ms.unwrap();
    assert!(p50 >= 1.0 && p50 < 15.0, "p50 {p50}");
    for k in &summary.kinds {
        let l = &k.latency;
        let v = [
            l.p50_ms.unwrap(),
            l.p75_ms.unwrap(),
            l.p90_ms.unwrap(),
            l.p95_ms.unwrap(),
            l.p99_ms.unwrap(),
            l.p999_ms.unwrap(),
            l.max_ms.unwrap(),
        ];
        for w in v.windows(2) {
            assert!(w[0] <= w[1], "{}: {v:?}", k.query_name);
        }
        assert!(l.min_ms.unwrap() <= l.p50_ms.unwrap());
    }

    // JSON round trip preserves counts and percentiles.
    let json_text = std::fs::read_to_string(format!("{}.json", prefix.display())).unwrap();
    let parsed: kb_bench::metrics::SessionSummary = serde_json::from_str(&json_text).unwrap();
    assert_eq!(parsed.issued, summary.issued);
    for (a, b) in parsed.kinds.iter().zip(&summary.kinds) {
        assert_eq!(a.latency.p99_ms, b.latency.p99_ms);
        assert_eq!(a.total_requests, b.total_requests);
    }

    // Re-running the evaluator on the CSV projection reproduces the
    // evaluation artifact.
    let rows = report::read_csv(&PathBuf::from(format!("{}.csv", prefix.display()))).unwrap();
    let from_csv = Thresholds::default()
        .evaluate_session(&report::eval_inputs_from_csv(&rows), false);
    let eval_text =
        std::fs::read_to_string(format!("{}-evaluation.json", prefix.display())).unwrap();
    assert_eq!(
        serde_json::to_value(&from_csv).unwrap(),
        serde_json::from_str::<serde_json::Value>(&eval_text).unwrap()
    );
}

#[tokio::test]
async fn slow_identifier_lookup_fails_the_session() {
    let url = spawn_stub(Stub {
        delay: Duration::from_millis(2),
        slow_prefix: Some(("/api/aircraft/mode_s", Duration::from_millis(150))),
        ..Default::default()
    })
    .await;

    let artifact = run_session(&session(&url, "lookup-95", 400, 20), no_shutdown())
        .await
        .unwrap();

    let mode_s = artifact
        .summary
        .kinds
        .iter()
        .find(|k| k.query_name == "mode_s")
        .unwrap();
    assert!(mode_s.latency.p99_ms.unwrap() > 100.0);
    assert_eq!(artifact.evaluation.summary.aggregate, Verdict::Fail);
    assert_eq!(artifact.exit_code(), 2);

    let mode_s_eval = artifact
        .evaluation
        .evaluations
        .iter()
        .find(|e| e.query_name == "mode_s")
        .unwrap();
    assert_eq!(mode_s_eval.verdict, Verdict::Fail);
    assert!(mode_s_eval.details.contains("p99 exceeded maximum"));
}

#[tokio::test]
async fn crossover_names_the_faster_sut_with_runner_up_margin() {
    let fast = spawn_stub(Stub {
        delay: Duration::from_millis(2),
        ..Default::default()
    })
    .await;
    let slow = spawn_stub(Stub {
        delay: Duration::from_millis(2),
        slow_prefix: Some(("/api/aircraft/mode_s", Duration::from_millis(150))),
        ..Default::default()
    })
    .await;

    let mut rows = Vec::new();
    for (db, url) in [("fast", &fast), ("slow", &slow)] {
        let artifact = run_session(&session(url, "lookup-95", 300, 20), no_shutdown())
            .await
            .unwrap();
        let rep_p99 = artifact
            .summary
            .kinds
            .iter()
            .find(|k| k.query_name == "mode_s")
            .and_then(|k| k.latency.p99_ms);
        rows.push(ComparisonRow {
            database: db.into(),
            workload_pattern: "lookup-95".into(),
            requests: artifact.summary.issued,
            concurrency: 20,
            p50_ms: None,
            p95_ms: None,
            p99_ms: rep_p99,
            mean_ms: None,
            representative_kind: "mode_s".into(),
            representative_p99_ms: rep_p99,
            throughput_qps: 0.0,
            success_count: artifact.summary.ok,
            fail_count: artifact.summary.failed,
            test_duration_sec: artifact.summary.wall_clock_sec,
            verdict: artifact.evaluation.summary.aggregate,
        });
    }

    let report = comparison::analyze_crossover(&rows, &[]);
    assert_eq!(report.points.len(), 1);
    let point = &report.points[0];
    assert_eq!(point.winner, "fast");
    assert_eq!(point.runner_up, "slow");
    // Roughly (150 − fast_p99) / 150 for a 150ms-vs-fast split.
    assert!(point.margin > 0.8, "margin {}", point.margin);
    assert_eq!(report.win_rate["fast"], 1.0);
    assert_eq!(report.win_rate["slow"], 0.0);
}

#[tokio::test]
async fn erroring_sut_fails_on_error_rate_with_null_percentiles() {
    let url = spawn_stub(Stub {
        always_500: true,
        ..Default::default()
    })
    .await;

    let artifact = run_session(&session(&url, "balanced-50", 300, 10), no_shutdown())
        .await
        .unwrap();
    let summary = &artifact.summary;

    assert_eq!(summary.ok, 0);
    assert_eq!(summary.failed, summary.issued);
    for k in &summary.kinds {
        assert_eq!(k.successful_requests, 0);
        assert_eq!(k.latency.p50_ms, None);
        assert_eq!(k.latency.p99_ms, None);
        assert_eq!(k.error_rate, 1.0);
        assert_eq!(k.http_errors, k.failed_requests);
    }
    assert_eq!(artifact.evaluation.summary.aggregate, Verdict::Fail);
    for e in &artifact.evaluation.evaluations {
        assert!(e.details.contains("error_rate"), "{}", e.details);
    }
    assert_eq!(artifact.exit_code(), 2);
}

#[tokio::test]
async fn timeouts_are_classified_and_excluded_from_percentiles() {
    let url = spawn_stub(Stub {
        delay: Duration::from_secs(2),
        ..Default::default()
    })
    .await;

    let mut cfg = session(&url, "lookup-95", 30, 10);
    cfg.timeout = Duration::from_millis(100);
    let artifact = run_session(&cfg, no_shutdown()).await.unwrap();
    let summary = &artifact.summary;

    assert_eq!(summary.ok, 0);
    assert_eq!(summary.issued, 30);
    let timeouts: u64 = summary.kinds.iter().map(|k| k.timeouts).sum();
    assert_eq!(timeouts, 30);
    assert_eq!(artifact.evaluation.summary.aggregate, Verdict::Fail);
}

#[tokio::test]
async fn interrupt_snapshots_a_partial_flagged_session() {
    let url = spawn_stub(Stub {
        delay: Duration::from_millis(5),
        ..Default::default()
    })
    .await;

    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("partial");
    let mut cfg = session(&url, "lookup-95", 200_000, 10);
    cfg.output_prefix = Some(prefix.clone());

    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        let _ = tx.send(true);
    });

    let artifact = run_session(&cfg, rx).await.unwrap();
    assert!(artifact.summary.interrupted);
    assert!(artifact.summary.issued > 0);
    assert!(artifact.summary.issued < 200_000);
    assert_eq!(artifact.exit_code(), 3);

    let json_text = std::fs::read_to_string(format!("{}.json", prefix.display())).unwrap();
    let parsed: kb_bench::metrics::SessionSummary = serde_json::from_str(&json_text).unwrap();
    assert!(parsed.interrupted);
    assert!(parsed.issued > 0 && parsed.issued < 200_000);
}

#[tokio::test]
async fn comparison_matrix_produces_crossover_and_scores() {
    let fast = spawn_stub(Stub {
        delay: Duration::from_millis(2),
        ..Default::default()
    })
    .await;
    let slow = spawn_stub(Stub {
        delay: Duration::from_millis(2),
        slow_prefix: Some(("/api/aircraft/mode_s", Duration::from_millis(120))),
        ..Default::default()
    })
    .await;

    let dir = tempfile::tempdir().unwrap();
    let cfg = CompareConfig {
        databases: vec![
            DbTarget::parse(&format!("fastdb={fast}"), "").unwrap(),
            DbTarget::parse(&format!("slowdb={slow}"), "").unwrap(),
        ],
        workloads: vec!["lookup-95".to_string()],
        concurrency_levels: vec![],
        requests: 200,
        warmup_requests: 20,
        workload_concurrency: 10,
        test_type: TestType::Workload,
        output_dir: dir.path().to_path_buf(),
        seed: 1,
        timeout: Duration::from_secs(30),
        cache_enabled: false,
        thresholds: Thresholds::default(),
        scores_file: None,
    };

    let outcome = run_comparison(&cfg, no_shutdown()).await.unwrap();
    assert!(!outcome.interrupted);
    assert_eq!(outcome.workload_rows.len(), 2);
    assert_eq!(outcome.crossover.points.len(), 1);
    assert_eq!(outcome.crossover.points[0].winner, "fastdb");

    // Decision scoring ranks the faster database first (externals all 0).
    assert_eq!(outcome.scores[0].database, "fastdb");
    assert_eq!(outcome.scores[0].rank, 1);

    for file in [
        "fastdb/workload_summary.json",
        "slowdb/workload_summary.json",
        "fastdb/lookup-95_c10.csv",
        "CROSSOVER_ANALYSIS.md",
        "decision_scores.json",
    ] {
        assert!(dir.path().join(file).exists(), "missing artifact {file}");
    }

    let summary_text =
        std::fs::read_to_string(dir.path().join("fastdb/workload_summary.json")).unwrap();
    let summary: serde_json::Value = serde_json::from_str(&summary_text).unwrap();
    assert_eq!(summary["database"], "fastdb");
    assert_eq!(summary["results"][0]["workload_pattern"], "lookup-95");
}
