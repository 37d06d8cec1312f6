//! Threshold evaluation: classify per-kind metrics as PASS,
//! CONDITIONAL_PASS or FAIL against the category's latency budget.
//!
//! The evaluator only consumes (p50, p95, p99, error_rate), so it can be
//! re-run from the CSV projection of a session and reproduce the
//! evaluation artifact.

use crate::catalog::QueryCategory;
use crate::metrics::KindSummary;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Verdict for a kind or a session. Ordered by severity so the aggregate
/// verdict is the maximum across kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Pass,
    ConditionalPass,
    Fail,
}

impl Verdict {
    pub fn exit_code(self) -> i32 {
        match self {
            Verdict::Pass => 0,
            Verdict::ConditionalPass => 1,
            Verdict::Fail => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Pass => "PASS",
            Verdict::ConditionalPass => "CONDITIONAL_PASS",
            Verdict::Fail => "FAIL",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latency budget for one query category, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyThresholds {
    pub target_p50_ms: f64,
    pub acceptable_p95_ms: f64,
    pub maximum_p99_ms: f64,
}

/// The full threshold table plus the error-rate ceiling. Configurable;
/// `Default` is the baseline table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thresholds {
    pub identifier_lookup: LatencyThresholds,
    pub two_hop: LatencyThresholds,
    pub three_hop: LatencyThresholds,
    pub six_hop: LatencyThresholds,
    pub property_write: LatencyThresholds,
    pub relationship_write: LatencyThresholds,
    pub max_error_rate: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        let t = |p50, p95, p99| LatencyThresholds {
            target_p50_ms: p50,
            acceptable_p95_ms: p95,
            maximum_p99_ms: p99,
        };
        Self {
            identifier_lookup: t(10.0, 50.0, 100.0),
            two_hop: t(50.0, 150.0, 300.0),
            three_hop: t(100.0, 300.0, 500.0),
            six_hop: t(500.0, 1000.0, 2000.0),
            property_write: t(50.0, 200.0, 500.0),
            relationship_write: t(100.0, 300.0, 500.0),
            max_error_rate: 0.01,
        }
    }
}

impl Thresholds {
    pub fn for_category(&self, category: QueryCategory) -> LatencyThresholds {
        match category {
            QueryCategory::IdentifierLookup => self.identifier_lookup,
            QueryCategory::TwoHop => self.two_hop,
            QueryCategory::ThreeHop => self.three_hop,
            QueryCategory::SixHop => self.six_hop,
            QueryCategory::PropertyWrite => self.property_write,
            QueryCategory::RelationshipWrite => self.relationship_write,
        }
    }

    /// Evaluate a single kind.
    pub fn evaluate_kind(&self, input: &EvalInput, cache_enabled: bool) -> KindEvaluation {
        let t = self.for_category(input.category);

        let (p50, p95, p99) = match (input.p50_ms, input.p95_ms, input.p99_ms) {
            (Some(a), Some(b), Some(c)) => (a, b, c),
            _ => {
                // No successful requests at all.
                let na = "n/a (no successful requests): ✗".to_string();
                return KindEvaluation {
                    query_name: input.query_name.clone(),
                    category: input.category,
                    verdict: Verdict::Fail,
                    p50_status: na.clone(),
                    p95_status: na.clone(),
                    p99_status: na,
                    error_rate_status: status_pct(input.error_rate, self.max_error_rate, false),
                    details: format!(
                        "failed: error_rate {:.2}% exceeds {:.2}%",
                        input.error_rate * 100.0,
                        self.max_error_rate * 100.0
                    ),
                };
            }
        };

        let p50_ok = p50 <= t.target_p50_ms;
        let p95_ok = p95 <= t.acceptable_p95_ms;
        let p99_ok = p99 <= t.maximum_p99_ms;
        let err_ok = input.error_rate <= self.max_error_rate;

        let (verdict, details) = if !p99_ok || !err_ok {
            let mut failures = Vec::new();
            if !p50_ok {
                failures.push("p50 exceeded target");
            }
            if !p95_ok {
                failures.push("p95 exceeded acceptable");
            }
            if !p99_ok {
                failures.push("p99 exceeded maximum");
            }
            if !err_ok {
                failures.push("error_rate above maximum");
            }
            (Verdict::Fail, format!("failed: {}", failures.join(", ")))
        } else if p50_ok && p95_ok {
            (Verdict::Pass, "all thresholds met".to_string())
        } else if cache_enabled {
            (
                Verdict::ConditionalPass,
                "p99 within maximum; passes with caching enabled (80%+ hit rate required)"
                    .to_string(),
            )
        } else {
            (
                Verdict::ConditionalPass,
                "p99 within maximum; p50/p95 above target".to_string(),
            )
        };

        KindEvaluation {
            query_name: input.query_name.clone(),
            category: input.category,
            verdict,
            p50_status: status_ms(p50, t.target_p50_ms, p50_ok),
            p95_status: status_ms(p95, t.acceptable_p95_ms, p95_ok),
            p99_status: status_ms(p99, t.maximum_p99_ms, p99_ok),
            error_rate_status: status_pct(input.error_rate, self.max_error_rate, err_ok),
            details,
        }
    }

    /// Evaluate every kind and derive the aggregate (worst) verdict.
    pub fn evaluate_session(&self, inputs: &[EvalInput], cache_enabled: bool) -> SessionEvaluation {
        let evaluations: Vec<KindEvaluation> = inputs
            .iter()
            .map(|i| self.evaluate_kind(i, cache_enabled))
            .collect();
        let aggregate = evaluations
            .iter()
            .map(|e| e.verdict)
            .max()
            .unwrap_or(Verdict::Pass);
        let count = |v: Verdict| evaluations.iter().filter(|e| e.verdict == v).count();
        SessionEvaluation {
            summary: EvaluationCounts {
                total: evaluations.len(),
                pass: count(Verdict::Pass),
                conditional_pass: count(Verdict::ConditionalPass),
                fail: count(Verdict::Fail),
                aggregate,
            },
            evaluations,
        }
    }
}

fn status_ms(actual: f64, threshold: f64, passed: bool) -> String {
    let symbol = if passed { "✓" } else { "✗" };
    format!("{actual:.2}ms (threshold <={threshold:.2}ms): {symbol}")
}

fn status_pct(actual: f64, threshold: f64, passed: bool) -> String {
    let symbol = if passed { "✓" } else { "✗" };
    format!(
        "{:.2}% (threshold <={:.2}%): {symbol}",
        actual * 100.0,
        threshold * 100.0
    )
}

/// The slice of a kind's metrics the evaluator consumes.
#[derive(Debug, Clone)]
pub struct EvalInput {
    pub query_name: String,
    pub category: QueryCategory,
    pub p50_ms: Option<f64>,
    pub p95_ms: Option<f64>,
    pub p99_ms: Option<f64>,
    pub error_rate: f64,
}

impl From<&KindSummary> for EvalInput {
    fn from(k: &KindSummary) -> Self {
        Self {
            query_name: k.query_name.clone(),
            category: k.category,
            p50_ms: k.latency.p50_ms,
            p95_ms: k.latency.p95_ms,
            p99_ms: k.latency.p99_ms,
            error_rate: k.error_rate,
        }
    }
}

/// Per-kind evaluation with human-readable evidence strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KindEvaluation {
    pub query_name: String,
    pub category: QueryCategory,
    pub verdict: Verdict,
    pub p50_status: String,
    pub p95_status: String,
    pub p99_status: String,
    pub error_rate_status: String,
    pub details: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationCounts {
    pub total: usize,
    pub pass: usize,
    pub conditional_pass: usize,
    pub fail: usize,
    pub aggregate: Verdict,
}

/// The evaluation artifact body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvaluation {
    pub summary: EvaluationCounts,
    pub evaluations: Vec<KindEvaluation>,
}
