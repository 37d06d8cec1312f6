//! Dataset selector: realistic parameter values for request generation.
//!
//! Pools come either from a curated JSON file or from a synthetic
//! generator. The accepted file format is a JSON object with optional
//! `mode_s`, `mmsi` and `countries` string arrays; any pool that is
//! missing or empty falls back to the synthetic generator and the
//! session is flagged with `synthetic_data_used`.

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;

/// Identifier pool tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierPool {
    Air,
    Sea,
    Mixed,
}

const SYNTHETIC_POOL_SIZE: usize = 256;

const DEFAULT_COUNTRIES: &[&str] = &[
    "USA",
    "China",
    "Russia",
    "United Kingdom",
    "France",
    "Germany",
    "Japan",
    "India",
    "Italy",
    "Canada",
];

#[derive(Debug, Default, Deserialize)]
struct PoolFile {
    #[serde(default)]
    mode_s: Vec<String>,
    #[serde(default)]
    mmsi: Vec<String>,
    #[serde(default)]
    countries: Vec<String>,
}

pub struct DatasetSelector {
    mode_s: Vec<String>,
    mmsi: Vec<String>,
    countries: Vec<String>,
    rng: ChaCha8Rng,
    synthetic_data_used: bool,
}

impl DatasetSelector {
    /// Build a selector from an optional pool file. Never fails: a missing
    /// or unreadable file downgrades to a warning plus synthetic pools.
    pub fn new(seed: u64, data_file: Option<&Path>) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let pools = match data_file {
            Some(path) => match std::fs::read_to_string(path) {
                Ok(text) => match serde_json::from_str::<PoolFile>(&text) {
                    Ok(p) => p,
                    Err(e) => {
                        tracing::warn!("pool file {} is not valid JSON ({e}); using synthetic pools", path.display());
                        PoolFile::default()
                    }
                },
                Err(e) => {
                    tracing::warn!("pool file {} unavailable ({e}); using synthetic pools", path.display());
                    PoolFile::default()
                }
            },
            None => PoolFile::default(),
        };

        let mut synthetic = false;
        let mode_s = if pools.mode_s.is_empty() {
            synthetic = true;
            (0..SYNTHETIC_POOL_SIZE)
                .map(|_| format!("A{:05}", rng.gen_range(0..100_000)))
                .collect()
        } else {
            pools.mode_s
        };
        let mmsi = if pools.mmsi.is_empty() {
            synthetic = true;
            (0..SYNTHETIC_POOL_SIZE)
                .map(|_| format!("{:09}", rng.gen_range(100_000_000u32..1_000_000_000u32)))
                .collect()
        } else {
            pools.mmsi
        };
        let countries = if pools.countries.is_empty() {
            DEFAULT_COUNTRIES.iter().map(|s| s.to_string()).collect()
        } else {
            pools.countries
        };

        if synthetic {
            tracing::debug!("identifier pools are synthetic for this session");
        }

        Self {
            mode_s,
            mmsi,
            countries,
            rng,
            synthetic_data_used: synthetic,
        }
    }

    /// True when at least one identifier pool fell back to the synthetic
    /// generator; recorded in the session metadata.
    pub fn synthetic_data_used(&self) -> bool {
        self.synthetic_data_used
    }

    /// Uniform draw from the pool for the given tag.
    pub fn pick_identifier(&mut self, pool: IdentifierPool) -> String {
        match pool {
            IdentifierPool::Air => {
                let i = self.rng.gen_range(0..self.mode_s.len());
                self.mode_s[i].clone()
            }
            IdentifierPool::Sea => {
                let i = self.rng.gen_range(0..self.mmsi.len());
                self.mmsi[i].clone()
            }
            IdentifierPool::Mixed => {
                if self.rng.gen_bool(0.5) {
                    self.pick_identifier(IdentifierPool::Air)
                } else {
                    self.pick_identifier(IdentifierPool::Sea)
                }
            }
        }
    }

    pub fn pick_country(&mut self) -> String {
        let i = self.rng.gen_range(0..self.countries.len());
        self.countries[i].clone()
    }

    /// Semantically valid body for the activity-log write endpoint.
    pub fn pick_write_payload(&mut self) -> Value {
        let track = self.rng.gen_range(1000..10_000);
        let mode_s = self.pick_identifier(IdentifierPool::Air);
        json!({
            "track_id": format!("BENCH-{track}"),
            "event_type": "activity_detected",
            "domain": "AIR",
            "mode_s": mode_s,
            "activity_type": "benchmark_test",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn synthetic_identifiers_match_expected_shapes() {
        let mut sel = DatasetSelector::new(1, None);
        assert!(sel.synthetic_data_used());
        for _ in 0..50 {
            let air = sel.pick_identifier(IdentifierPool::Air);
            assert_eq!(air.len(), 6);
            assert!(air.starts_with('A'));
            assert!(air[1..].chars().all(|c| c.is_ascii_digit()));

            let sea = sel.pick_identifier(IdentifierPool::Sea);
            assert_eq!(sea.len(), 9);
            assert!(sea.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn seeded_selectors_are_deterministic() {
        let mut a = DatasetSelector::new(99, None);
        let mut b = DatasetSelector::new(99, None);
        for _ in 0..100 {
            assert_eq!(
                a.pick_identifier(IdentifierPool::Mixed),
                b.pick_identifier(IdentifierPool::Mixed)
            );
            assert_eq!(a.pick_country(), b.pick_country());
        }
    }

    #[test]
    fn pool_file_overrides_synthetic_pools() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(
            f,
            r#"{{"mode_s": ["A00001", "A00002"], "mmsi": ["366123456"]}}"#
        )
        .unwrap();

        let mut sel = DatasetSelector::new(5, Some(f.path()));
        assert!(!sel.synthetic_data_used());
        for _ in 0..20 {
            let air = sel.pick_identifier(IdentifierPool::Air);
            assert!(air == "A00001" || air == "A00002");
            assert_eq!(sel.pick_identifier(IdentifierPool::Sea), "366123456");
        }
    }

    #[test]
    fn missing_pool_file_falls_back_with_flag() {
        let mut sel = DatasetSelector::new(5, Some(Path::new("/does/not/exist.json")));
        assert!(sel.synthetic_data_used());
        let _ = sel.pick_identifier(IdentifierPool::Air);
    }

    #[test]
    fn write_payload_is_well_formed() {
        let mut sel = DatasetSelector::new(3, None);
        let body = sel.pick_write_payload();
        assert!(body["track_id"].as_str().unwrap().starts_with("BENCH-"));
        assert_eq!(body["event_type"], "activity_detected");
        assert_eq!(body["domain"], "AIR");
        assert!(body["mode_s"].as_str().unwrap().starts_with('A'));
    }
}
