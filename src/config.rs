//! Engine configuration
//!
//! Scheduler, cache and propagation defaults. Everything has a sensible
//! default so a partial JSON file only needs to name what it overrides.

use crate::propagation::state::PerturbationToggles;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Worker pool and job delivery settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Upper bound on pool size; the pool uses min(hardware threads, cap).
    /// Zero disables workers and runs every job on the calling thread.
    pub max_workers: usize,

    /// Samples per streamed chunk
    pub chunk_size: usize,

    /// Window in which repeated update requests for one vehicle coalesce
    pub debounce_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            chunk_size: 256,
            debounce_ms: 50,
        }
    }
}

/// Trajectory cache bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_entries: usize,

    /// Entries older than this (seconds of wall time) are purged
    pub max_age_secs: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 64,
            max_age_secs: 300.0,
        }
    }
}

/// Default resolution and force toggles for orbit updates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropagationConfig {
    pub samples_per_period: usize,

    /// Orbital periods covered by a default update
    pub coverage_periods: f64,

    /// Minimum RK4 substeps between consecutive output samples
    pub substeps_per_sample: usize,

    /// Minimum RK4 steps per orbital period, whatever the sample spacing
    pub min_steps_per_period: usize,

    /// Hard bound on samples per request
    pub max_samples: usize,

    /// Duration used when the orbit is parabolic or hyperbolic (seconds)
    pub open_orbit_duration: f64,

    pub perturbations: PerturbationToggles,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            samples_per_period: 180,
            coverage_periods: 1.0,
            substeps_per_sample: 4,
            min_steps_per_period: 720,
            max_samples: 20_000,
            open_orbit_duration: 86_400.0,
            perturbations: PerturbationToggles::default(),
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub scheduler: SchedulerConfig,
    pub cache: CacheConfig,
    pub propagation: PropagationConfig,
}

impl EngineConfig {
    /// Responsive settings for interactive editing (coarser, smaller chunks)
    pub fn interactive() -> Self {
        Self {
            scheduler: SchedulerConfig {
                chunk_size: 64,
                debounce_ms: 30,
                ..Default::default()
            },
            propagation: PropagationConfig {
                samples_per_period: 120,
                substeps_per_sample: 2,
                min_steps_per_period: 360,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Dense sampling with all perturbations enabled
    pub fn high_fidelity() -> Self {
        Self {
            propagation: PropagationConfig {
                samples_per_period: 360,
                substeps_per_sample: 8,
                min_steps_per_period: 2880,
                max_samples: 100_000,
                perturbations: PerturbationToggles::all(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Load configuration from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open config file: {}", path.display()))?;
        let config: Self = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        log::info!("Loaded engine configuration from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "scheduler": { "max_workers": 2 }, "cache": { "max_entries": 8 } }"#;
        let config: EngineConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.scheduler.max_workers, 2);
        assert_eq!(config.scheduler.chunk_size, 256);
        assert_eq!(config.cache.max_entries, 8);
        assert_eq!(config.propagation.samples_per_period, 180);
    }

    #[test]
    fn test_presets_differ_from_default() {
        let fast = EngineConfig::interactive();
        let fine = EngineConfig::high_fidelity();
        assert!(fast.propagation.samples_per_period < fine.propagation.samples_per_period);
        assert!(fine.propagation.perturbations.third_body);
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join("orbit_engine_config_test.json");
        std::fs::write(&path, r#"{ "propagation": { "samples_per_period": 90 } }"#).unwrap();

        let config = EngineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.propagation.samples_per_period, 90);

        let _ = std::fs::remove_file(&path);
        assert!(EngineConfig::from_json_file(&path).is_err());
    }
}
