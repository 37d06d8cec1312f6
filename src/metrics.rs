//! HDRHistogram-based metrics collection for accurate percentile measurement.
//!
//! One `KindMetrics` per encountered query kind, owned by a single fold
//! task; executor tasks only send `Observation`s. Only OK observations
//! contribute to the latency distribution; failures are counted by class.

use crate::catalog::QueryCategory;
use crate::workload::MixPattern;
use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::mpsc;

/// Lowest trackable latency: 1 microsecond, in nanoseconds.
pub const LOWEST_TRACKABLE_NS: u64 = 1_000;
/// Highest trackable latency: 60 seconds, in nanoseconds.
pub const HIGHEST_TRACKABLE_NS: u64 = 60_000_000_000;
/// Significant figures of histogram precision.
pub const SIGFIGS: u8 = 3;

/// Classified result of a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Ok { status: u16, bytes: u64 },
    HttpError { status: u16 },
    Timeout,
    Transport,
}

/// One completed request, folded into metrics and discarded.
#[derive(Debug, Clone)]
pub struct Observation {
    pub kind_id: &'static str,
    /// Monotonic offset of the request start from session start.
    pub start_ns: u64,
    /// Monotonic start-to-end difference, never wall clock.
    pub latency_ns: u64,
    pub outcome: Outcome,
}

/// Accumulating per-kind state. Append-only until snapshot.
pub struct KindMetrics {
    hist: Histogram<u64>,
    pub issued: u64,
    pub ok: u64,
    pub http_errors: u64,
    pub timeouts: u64,
    pub transport_errors: u64,
    first_start_ns: Option<u64>,
    last_end_ns: Option<u64>,
}

impl KindMetrics {
    pub fn new() -> Self {
        let hist = Histogram::new_with_bounds(LOWEST_TRACKABLE_NS, HIGHEST_TRACKABLE_NS, SIGFIGS)
            .expect("histogram bounds are static");
        Self {
            hist,
            issued: 0,
            ok: 0,
            http_errors: 0,
            timeouts: 0,
            transport_errors: 0,
            first_start_ns: None,
            last_end_ns: None,
        }
    }

    pub fn record(&mut self, obs: &Observation) {
        self.issued += 1;
        let end_ns = obs.start_ns.saturating_add(obs.latency_ns);
        self.first_start_ns = Some(self.first_start_ns.map_or(obs.start_ns, |f| f.min(obs.start_ns)));
        self.last_end_ns = Some(self.last_end_ns.map_or(end_ns, |l| l.max(end_ns)));

        match obs.outcome {
            Outcome::Ok { .. } => {
                self.ok += 1;
                let nanos = obs.latency_ns.clamp(LOWEST_TRACKABLE_NS, HIGHEST_TRACKABLE_NS);
                let _ = self.hist.record(nanos);
            }
            Outcome::HttpError { .. } => self.http_errors += 1,
            Outcome::Timeout => self.timeouts += 1,
            Outcome::Transport => self.transport_errors += 1,
        }
    }

    pub fn failed(&self) -> u64 {
        self.http_errors + self.timeouts + self.transport_errors
    }

    /// Freeze into a serializable summary. Latencies in milliseconds,
    /// rounded to two decimals; empty distributions yield nulls.
    pub fn summary(&self, query_name: &str, category: QueryCategory) -> KindSummary {
        let duration_sec = match (self.first_start_ns, self.last_end_ns) {
            (Some(first), Some(last)) if last > first => (last - first) as f64 / 1e9,
            _ => 0.0,
        };
        let throughput_qps = if duration_sec > 0.0 {
            self.ok as f64 / duration_sec
        } else {
            0.0
        };
        let error_rate = if self.issued > 0 {
            self.failed() as f64 / self.issued as f64
        } else {
            0.0
        };

        let latency = if self.ok == 0 {
            LatencySummary::default()
        } else {
            let ms = |ns: u64| Some(round2(ns as f64 / 1e6));
            LatencySummary {
                min_ms: ms(self.hist.min()),
                mean_ms: Some(round2(self.hist.mean() / 1e6)),
                stddev_ms: Some(round2(self.hist.stdev() / 1e6)),
                p50_ms: ms(self.hist.value_at_percentile(50.0)),
                p75_ms: ms(self.hist.value_at_percentile(75.0)),
                p90_ms: ms(self.hist.value_at_percentile(90.0)),
                p95_ms: ms(self.hist.value_at_percentile(95.0)),
                p99_ms: ms(self.hist.value_at_percentile(99.0)),
                p999_ms: ms(self.hist.value_at_percentile(99.9)),
                max_ms: ms(self.hist.max()),
            }
        };

        KindSummary {
            query_name: query_name.to_string(),
            category,
            total_requests: self.issued,
            successful_requests: self.ok,
            failed_requests: self.failed(),
            http_errors: self.http_errors,
            timeouts: self.timeouts,
            transport_errors: self.transport_errors,
            duration_sec,
            throughput_qps,
            error_rate,
            latency,
        }
    }
}

impl Default for KindMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Session-level accumulated state, produced by the fold task.
pub struct SessionMetrics {
    pub kinds: BTreeMap<&'static str, KindMetrics>,
    pub wall_clock_sec: f64,
    pub interrupted: bool,
}

impl SessionMetrics {
    pub fn total_issued(&self) -> u64 {
        self.kinds.values().map(|k| k.issued).sum()
    }

    pub fn total_ok(&self) -> u64 {
        self.kinds.values().map(|k| k.ok).sum()
    }

    pub fn total_failed(&self) -> u64 {
        self.kinds.values().map(|k| k.failed()).sum()
    }
}

/// Fold task: the single writer over all per-kind state. Runs until every
/// sender is dropped, then returns the accumulated metrics.
pub async fn collect(mut rx: mpsc::Receiver<Observation>) -> SessionMetrics {
    let mut kinds: BTreeMap<&'static str, KindMetrics> = BTreeMap::new();
    while let Some(obs) = rx.recv().await {
        kinds.entry(obs.kind_id).or_default().record(&obs);
    }
    SessionMetrics {
        kinds,
        wall_clock_sec: 0.0,
        interrupted: false,
    }
}

/// Percentile vector in milliseconds, two decimals. All fields are null
/// when the kind saw no successful request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub min_ms: Option<f64>,
    pub mean_ms: Option<f64>,
    pub stddev_ms: Option<f64>,
    pub p50_ms: Option<f64>,
    pub p75_ms: Option<f64>,
    pub p90_ms: Option<f64>,
    pub p95_ms: Option<f64>,
    pub p99_ms: Option<f64>,
    pub p999_ms: Option<f64>,
    pub max_ms: Option<f64>,
}

/// Frozen per-kind metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KindSummary {
    pub query_name: String,
    pub category: QueryCategory,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub http_errors: u64,
    pub timeouts: u64,
    pub transport_errors: u64,
    pub duration_sec: f64,
    pub throughput_qps: f64,
    pub error_rate: f64,
    pub latency: LatencySummary,
}

/// Frozen session metrics plus metadata; the JSON artifact body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_name: String,
    pub sut_url: String,
    pub pattern: MixPattern,
    pub concurrency: usize,
    pub request_budget: u64,
    pub seed: u64,
    pub cache_enabled: bool,
    pub db_prefix: Option<String>,
    pub synthetic_data_used: bool,
    pub interrupted: bool,
    pub started_unix: u64,
    pub wall_clock_sec: f64,
    pub issued: u64,
    pub ok: u64,
    pub failed: u64,
    pub kinds: Vec<KindSummary>,
}

pub(crate) fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
