//! Mix patterns and the workload generator.
//!
//! A mix pattern allocates percentages across the three top-level request
//! categories. The generator lazily turns a pattern plus a request budget
//! into a finite sequence of bound request plans, drawing a category by
//! pattern weight, a kind by catalogue sub-weight, and parameters from
//! the dataset selector. A seed fixes the whole sequence.

use crate::catalog::{self, ParamSlot, QueryKind, TopCategory};
use crate::dataset::{DatasetSelector, IdentifierPool};
use crate::{BenchError, BenchResult};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named allocation of request categories; weights sum to 100.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MixPattern {
    pub name: String,
    pub label: String,
    pub lookup: u32,
    pub analytics: u32,
    pub write: u32,
}

impl MixPattern {
    pub fn new(
        name: impl Into<String>,
        label: impl Into<String>,
        lookup: i64,
        analytics: i64,
        write: i64,
    ) -> BenchResult<Self> {
        if lookup < 0 || analytics < 0 || write < 0 {
            return Err(BenchError::InvalidPattern(format!(
                "weights must be non-negative, got {lookup}/{analytics}/{write}"
            )));
        }
        let total = lookup + analytics + write;
        if total != 100 {
            return Err(BenchError::InvalidPattern(format!(
                "weights must sum to 100, got {total}"
            )));
        }
        Ok(Self {
            name: name.into(),
            label: label.into(),
            lookup: lookup as u32,
            analytics: analytics as u32,
            write: write as u32,
        })
    }

    /// The built-in pattern catalogue.
    pub fn builtin() -> Vec<MixPattern> {
        let table: &[(&str, &str, i64, i64, i64)] = &[
            ("lookup-95", "Lookup Heavy (95/4/1)", 95, 4, 1),
            ("lookup-90", "Lookup Heavy (90/8/2)", 90, 8, 2),
            ("lookup-85", "Lookup Heavy (85/12/3)", 85, 12, 3),
            ("lookup-80", "Lookup Medium (80/15/5)", 80, 15, 5),
            ("lookup-75", "Lookup Medium (75/20/5)", 75, 20, 5),
            ("balanced-60", "Balanced (60/35/5)", 60, 35, 5),
            ("balanced-50", "Balanced (50/40/10)", 50, 40, 10),
            ("balanced-40", "Balanced (40/45/15)", 40, 45, 15),
            ("analytics-30", "Analytics Heavy (30/60/10)", 30, 60, 10),
            ("analytics-20", "Analytics Heavy (20/70/10)", 20, 70, 10),
            ("analytics-10", "Analytics Heavy (10/80/10)", 10, 80, 10),
            ("write-30", "Write Heavy (50/20/30)", 50, 20, 30),
            ("write-40", "Write Heavy (40/20/40)", 40, 20, 40),
            ("write-50", "Write Heavy (30/20/50)", 30, 20, 50),
        ];
        table
            .iter()
            .map(|(name, label, l, a, w)| {
                MixPattern::new(*name, *label, *l, *a, *w).expect("built-in pattern table is valid")
            })
            .collect()
    }

    pub fn named(name: &str) -> Option<MixPattern> {
        MixPattern::builtin().into_iter().find(|p| p.name == name)
    }

    /// Resolve a pattern spec: a built-in name, or an ad-hoc `L/A/W` triple.
    pub fn resolve(spec: &str) -> BenchResult<MixPattern> {
        if let Some(p) = MixPattern::named(spec) {
            return Ok(p);
        }
        let parts: Vec<&str> = spec.split('/').collect();
        if parts.len() != 3 {
            return Err(BenchError::InvalidPattern(format!(
                "unknown pattern '{spec}' (expected a built-in name or L/A/W weights)"
            )));
        }
        let mut w = [0i64; 3];
        for (i, part) in parts.iter().enumerate() {
            w[i] = part.trim().parse().map_err(|_| {
                BenchError::InvalidPattern(format!("weight '{part}' is not an integer"))
            })?;
        }
        MixPattern::new(
            spec,
            format!("Ad-hoc ({}/{}/{})", w[0], w[1], w[2]),
            w[0],
            w[1],
            w[2],
        )
    }
}

/// One concrete request: a catalogue kind with bound parameters.
#[derive(Debug, Clone)]
pub struct RequestPlan {
    pub ordinal: u64,
    pub kind: &'static QueryKind,
    /// Path with the parameter slot substituted.
    pub path: String,
    /// JSON body for write kinds.
    pub body: Option<Value>,
}

/// Lazy, finite, seed-deterministic sequence of request plans.
pub struct WorkloadGenerator {
    pattern: MixPattern,
    budget: u64,
    emitted: u64,
    rng: ChaCha8Rng,
    dataset: DatasetSelector,
    lookup_kinds: Vec<&'static QueryKind>,
    analytics_kinds: Vec<&'static QueryKind>,
    write_kinds: Vec<&'static QueryKind>,
}

impl WorkloadGenerator {
    pub fn new(
        pattern: MixPattern,
        budget: u64,
        seed: u64,
        dataset: DatasetSelector,
    ) -> BenchResult<Self> {
        if budget == 0 {
            return Err(BenchError::InvalidPattern(
                "request budget must be positive".into(),
            ));
        }
        if pattern.lookup + pattern.analytics + pattern.write != 100 {
            return Err(BenchError::InvalidPattern(format!(
                "weights must sum to 100, got {}",
                pattern.lookup + pattern.analytics + pattern.write
            )));
        }
        Ok(Self {
            pattern,
            budget,
            emitted: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
            dataset,
            lookup_kinds: catalog::kinds_in(TopCategory::Lookup),
            analytics_kinds: catalog::kinds_in(TopCategory::Analytics),
            write_kinds: catalog::kinds_in(TopCategory::Write),
        })
    }

    pub fn pattern(&self) -> &MixPattern {
        &self.pattern
    }

    pub fn synthetic_data_used(&self) -> bool {
        self.dataset.synthetic_data_used()
    }

    fn draw_kind(&mut self) -> &'static QueryKind {
        let Self {
            pattern,
            rng,
            lookup_kinds,
            analytics_kinds,
            write_kinds,
            ..
        } = self;
        let cats = [
            (TopCategory::Lookup, pattern.lookup),
            (TopCategory::Analytics, pattern.analytics),
            (TopCategory::Write, pattern.write),
        ];
        let top = cats
            .choose_weighted(rng, |c| c.1)
            .expect("pattern weights sum to 100")
            .0;
        let kinds: &Vec<&'static QueryKind> = match top {
            TopCategory::Lookup => lookup_kinds,
            TopCategory::Analytics => analytics_kinds,
            TopCategory::Write => write_kinds,
        };
        *kinds
            .choose_weighted(rng, |k| k.weight)
            .expect("catalogue sub-weights are positive")
    }

    fn bind(&mut self, kind: &'static QueryKind, ordinal: u64) -> RequestPlan {
        let (path, body) = match kind.slot {
            ParamSlot::AirIdentifier => (
                kind.path
                    .replace("{v}", &self.dataset.pick_identifier(IdentifierPool::Air)),
                None,
            ),
            ParamSlot::SeaIdentifier => (
                kind.path
                    .replace("{v}", &self.dataset.pick_identifier(IdentifierPool::Sea)),
                None,
            ),
            ParamSlot::Country => (
                kind.path.replace("{v}", &self.dataset.pick_country()),
                None,
            ),
            ParamSlot::WritePayload => {
                (kind.path.to_string(), Some(self.dataset.pick_write_payload()))
            }
        };
        RequestPlan {
            ordinal,
            kind,
            path,
            body,
        }
    }
}

impl Iterator for WorkloadGenerator {
    type Item = RequestPlan;

    fn next(&mut self) -> Option<RequestPlan> {
        if self.emitted >= self.budget {
            return None;
        }
        let ordinal = self.emitted;
        self.emitted += 1;
        let kind = self.draw_kind();
        Some(self.bind(kind, ordinal))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.budget - self.emitted) as usize;
        (left, Some(left))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::QueryCategory;
    use std::collections::HashMap;

    fn generator(pattern: &str, budget: u64, seed: u64) -> WorkloadGenerator {
        WorkloadGenerator::new(
            MixPattern::resolve(pattern).unwrap(),
            budget,
            seed,
            DatasetSelector::new(seed, None),
        )
        .unwrap()
    }

    #[test]
    fn builtin_patterns_are_present_verbatim() {
        let expected = [
            ("lookup-95", 95, 4, 1),
            ("lookup-90", 90, 8, 2),
            ("lookup-85", 85, 12, 3),
            ("lookup-80", 80, 15, 5),
            ("lookup-75", 75, 20, 5),
            ("balanced-60", 60, 35, 5),
            ("balanced-50", 50, 40, 10),
            ("balanced-40", 40, 45, 15),
            ("analytics-30", 30, 60, 10),
            ("analytics-20", 20, 70, 10),
            ("analytics-10", 10, 80, 10),
            ("write-30", 50, 20, 30),
            ("write-40", 40, 20, 40),
            ("write-50", 30, 20, 50),
        ];
        for (name, l, a, w) in expected {
            let p = MixPattern::named(name).unwrap_or_else(|| panic!("missing pattern {name}"));
            assert_eq!((p.lookup, p.analytics, p.write), (l, a, w), "{name}");
        }
        assert_eq!(MixPattern::builtin().len(), expected.len());
    }

    #[test]
    fn invalid_patterns_are_rejected() {
        assert!(matches!(
            MixPattern::new("bad", "bad", 50, 40, 20),
            Err(BenchError::InvalidPattern(_))
        ));
        assert!(matches!(
            MixPattern::new("bad", "bad", -5, 95, 10),
            Err(BenchError::InvalidPattern(_))
        ));
        assert!(matches!(
            MixPattern::resolve("no-such-pattern"),
            Err(BenchError::InvalidPattern(_))
        ));
    }

    #[test]
    fn adhoc_pattern_parses() {
        let p = MixPattern::resolve("55/35/10").unwrap();
        assert_eq!((p.lookup, p.analytics, p.write), (55, 35, 10));
    }

    #[test]
    fn zero_budget_is_rejected() {
        let r = WorkloadGenerator::new(
            MixPattern::named("balanced-50").unwrap(),
            0,
            1,
            DatasetSelector::new(1, None),
        );
        assert!(matches!(r, Err(BenchError::InvalidPattern(_))));
    }

    #[test]
    fn sequence_has_exact_length() {
        let plans: Vec<_> = generator("lookup-95", 1000, 7).collect();
        assert_eq!(plans.len(), 1000);
        assert_eq!(plans.last().unwrap().ordinal, 999);
    }

    #[test]
    fn same_seed_yields_identical_sequences() {
        let a: Vec<_> = generator("balanced-50", 500, 1234).collect();
        let b: Vec<_> = generator("balanced-50", 500, 1234).collect();
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.kind.id, y.kind.id);
            assert_eq!(x.path, y.path);
            assert_eq!(x.body, y.body);
        }
    }

    #[test]
    fn drawn_category_shares_track_the_pattern() {
        // balanced-50 over 20k draws: shares within one percentage point.
        let mut counts: HashMap<&str, u64> = HashMap::new();
        for plan in generator("balanced-50", 20_000, 42) {
            let top = match plan.kind.category.top() {
                TopCategory::Lookup => "lookup",
                TopCategory::Analytics => "analytics",
                TopCategory::Write => "write",
            };
            *counts.entry(top).or_default() += 1;
        }
        let share = |k: &str| *counts.get(k).unwrap_or(&0) as f64 / 20_000.0 * 100.0;
        assert!((share("lookup") - 50.0).abs() <= 1.0, "lookup {}", share("lookup"));
        assert!((share("analytics") - 40.0).abs() <= 1.0, "analytics {}", share("analytics"));
        assert!((share("write") - 10.0).abs() <= 1.0, "write {}", share("write"));
    }

    #[test]
    fn write_plans_carry_a_body() {
        for plan in generator("write-50", 200, 11) {
            if plan.kind.category == QueryCategory::PropertyWrite {
                let body = plan.body.expect("write plan without body");
                assert!(body["track_id"].as_str().unwrap().starts_with("BENCH-"));
            } else {
                assert!(plan.body.is_none());
                assert!(!plan.path.contains("{v}"));
            }
        }
    }
}
