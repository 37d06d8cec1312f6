//! Weighted decision scoring: performance 60, curation 20, operational 20.
//!
//! Performance components come from the comparison rows; curation and
//! operational components are opaque scalars supplied by the caller.

use crate::comparison::ComparisonRow;
use crate::thresholds::Verdict;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

const P99_POINTS: f64 = 30.0;
const THROUGHPUT_POINTS: f64 = 15.0;
/// Two scores within this distance trigger the tie-break chain.
const TIE_WINDOW: f64 = 5.0;

/// Caller-supplied dimension scores. Curation scalars live in [0, 10],
/// operational scalars in [0, 5]; out-of-range values are clamped.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ExternalScores {
    #[serde(default)]
    pub self_service: f64,
    #[serde(default)]
    pub visualization: f64,
    #[serde(default)]
    pub resource_efficiency: f64,
    #[serde(default)]
    pub stability: f64,
    #[serde(default)]
    pub config_complexity: f64,
    #[serde(default)]
    pub ecosystem: f64,
}

impl ExternalScores {
    fn clamped(self) -> Self {
        Self {
            self_service: self.self_service.clamp(0.0, 10.0),
            visualization: self.visualization.clamp(0.0, 10.0),
            resource_efficiency: self.resource_efficiency.clamp(0.0, 5.0),
            stability: self.stability.clamp(0.0, 5.0),
            config_complexity: self.config_complexity.clamp(0.0, 5.0),
            ecosystem: self.ecosystem.clamp(0.0, 5.0),
        }
    }
}

/// Final per-database tally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionScore {
    pub database: String,
    pub p99_score: f64,
    pub throughput_score: f64,
    pub scalability_score: f64,
    pub performance_total: f64,
    pub curation_total: f64,
    pub operational_total: f64,
    pub total_score: f64,
    pub threshold_status: Verdict,
    pub requires_mitigation: bool,
    pub rank: usize,
    pub recommendation: String,
}

/// Piecewise scalability scale over the highest still-passing concurrency.
fn scalability_points(max_passing_concurrency: usize) -> f64 {
    if max_passing_concurrency >= 100 {
        15.0
    } else if max_passing_concurrency >= 50 {
        12.0
    } else if max_passing_concurrency >= 20 {
        9.0
    } else {
        6.0
    }
}

pub fn compute_scores(
    workload_rows: &[ComparisonRow],
    concurrency_rows: &[ComparisonRow],
    external: &BTreeMap<String, ExternalScores>,
) -> Vec<DecisionScore> {
    let databases: BTreeSet<&str> = workload_rows
        .iter()
        .chain(concurrency_rows)
        .map(|r| r.database.as_str())
        .collect();
    if databases.is_empty() {
        return Vec::new();
    }

    let patterns: BTreeSet<&str> = workload_rows
        .iter()
        .map(|r| r.workload_pattern.as_str())
        .collect();

    // Representative p99 per (pattern, db) and the per-pattern minimum.
    let rep_p99 = |db: &str, pattern: &str| -> Option<f64> {
        workload_rows
            .iter()
            .find(|r| r.database == db && r.workload_pattern == pattern)
            .and_then(|r| r.representative_p99_ms)
    };

    let best_qps: f64 = databases
        .iter()
        .copied()
        .map(|db| best_throughput(db, workload_rows, concurrency_rows))
        .fold(0.0, f64::max);

    let mut scores: Vec<DecisionScore> = databases
        .iter()
        .copied()
        .map(|db| {
            // p99 component: 30 × min/this, averaged across the mixes the
            // database actually ran.
            let mut components = Vec::new();
            for pattern in patterns.iter().copied() {
                let this = match rep_p99(db, pattern) {
                    Some(v) if v > 0.0 => v,
                    _ => continue,
                };
                let min = databases
                    .iter()
                    .copied()
                    .filter_map(|other| rep_p99(other, pattern))
                    .filter(|v| *v > 0.0)
                    .fold(f64::INFINITY, f64::min);
                if min.is_finite() {
                    components.push(P99_POINTS * min / this);
                }
            }
            let p99_score = if components.is_empty() {
                0.0
            } else {
                components.iter().sum::<f64>() / components.len() as f64
            };

            let qps = best_throughput(db, workload_rows, concurrency_rows);
            let throughput_score = if best_qps > 0.0 {
                THROUGHPUT_POINTS * qps / best_qps
            } else {
                0.0
            };

            let scalability_score = scalability_points(max_passing_concurrency(
                db,
                workload_rows,
                concurrency_rows,
            ));

            let ext = external.get(db).copied().unwrap_or_default().clamped();
            let curation_total = ext.self_service + ext.visualization;
            let operational_total = ext.resource_efficiency
                + ext.stability
                + ext.config_complexity
                + ext.ecosystem;

            let threshold_status = best_verdict(db, workload_rows, concurrency_rows);
            let performance_total = p99_score + throughput_score + scalability_score;

            DecisionScore {
                database: db.to_string(),
                p99_score,
                throughput_score,
                scalability_score,
                performance_total,
                curation_total,
                operational_total,
                total_score: performance_total + curation_total + operational_total,
                threshold_status,
                requires_mitigation: threshold_status == Verdict::Fail,
                rank: 0,
                recommendation: String::new(),
            }
        })
        .collect();

    rank(&mut scores);
    scores
}

fn best_throughput(db: &str, workload: &[ComparisonRow], concurrency: &[ComparisonRow]) -> f64 {
    workload
        .iter()
        .chain(concurrency)
        .filter(|r| r.database == db)
        .map(|r| r.throughput_qps)
        .fold(0.0, f64::max)
}

/// Highest concurrency level at which the database still avoided FAIL.
fn max_passing_concurrency(
    db: &str,
    workload: &[ComparisonRow],
    concurrency: &[ComparisonRow],
) -> usize {
    workload
        .iter()
        .chain(concurrency)
        .filter(|r| r.database == db && r.verdict != Verdict::Fail)
        .map(|r| r.concurrency)
        .max()
        .unwrap_or(0)
}

/// Best (least severe) verdict the database achieved anywhere.
fn best_verdict(db: &str, workload: &[ComparisonRow], concurrency: &[ComparisonRow]) -> Verdict {
    workload
        .iter()
        .chain(concurrency)
        .filter(|r| r.database == db)
        .map(|r| r.verdict)
        .min()
        .unwrap_or(Verdict::Fail)
}

/// Rank by total score; within the tie window fall back to verdict
/// priority, then curation subtotal, then operational subtotal.
fn rank(scores: &mut [DecisionScore]) {
    scores.sort_by(|a, b| {
        if (a.total_score - b.total_score).abs() < TIE_WINDOW {
            a.threshold_status
                .cmp(&b.threshold_status)
                .then(b.curation_total.total_cmp(&a.curation_total))
                .then(b.operational_total.total_cmp(&a.operational_total))
                .then(b.total_score.total_cmp(&a.total_score))
        } else {
            b.total_score.total_cmp(&a.total_score)
        }
    });

    let count = scores.len();
    for (i, score) in scores.iter_mut().enumerate() {
        score.rank = i + 1;
        score.recommendation = match (i, score.threshold_status) {
            (0, Verdict::Pass) => "RECOMMENDED - winner, meets all thresholds".to_string(),
            (0, Verdict::ConditionalPass) => {
                "RECOMMENDED - winner, requires caching/optimization".to_string()
            }
            (0, Verdict::Fail) => {
                "CONDITIONAL - winner but fails thresholds, mitigation required".to_string()
            }
            (1, _) => "ALTERNATIVE - second choice".to_string(),
            _ => format!("NOT RECOMMENDED - ranked {}/{count}", i + 1),
        };
    }
}
