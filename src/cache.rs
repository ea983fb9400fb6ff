//! Per-vehicle trajectory cache
//!
//! Entries are keyed by vehicle and checked against a [`StalenessKey`]
//! built from the vehicle's current situation. Position and velocity never
//! take part: they change every frame, while the cached trajectory stays
//! valid until the dominant body or the maneuver plan changes.
//!
//! The scheduler is the only writer; anyone holding the cache may read.

use crate::bodies::BodyId;
use crate::config::CacheConfig;
use crate::propagation::state::{PerturbationToggles, TrajectorySample, VehicleId};
use crate::transitions::{find_transitions, SoiTransition};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Slack when comparing coverages derived from floating-point sample times
const COVERAGE_EPSILON: f64 = 1e-9;

/// What a cached trajectory was computed for
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StalenessKey {
    pub dominant_body: BodyId,

    /// Maneuver revision of the vehicle; newer than the entry's means stale
    pub maneuver_stamp: u64,

    pub samples_per_period: usize,
    pub perturbations: PerturbationToggles,
}

/// A cached trajectory
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub samples: Vec<TrajectorySample>,

    /// Orbital periods covered by `samples`
    pub coverage: f64,

    pub samples_per_period: usize,
    pub state_hash: u64,

    /// Wall-clock time of calculation
    pub calculated_at: Instant,

    /// Dominant body at calculation time
    pub dominant_body: BodyId,

    /// Cut short by cancellation
    pub partial: bool,

    pub maneuver_stamp: u64,
    pub perturbations: PerturbationToggles,

    /// Absolute simulation time of the first sample
    pub start_time: f64,

    /// Sample spacing the trajectory was computed with
    pub time_step: f64,

    /// Orbital period used to turn durations into coverage (s)
    pub period: Option<f64>,

    pub transitions: Vec<SoiTransition>,
}

impl CacheEntry {
    /// Entry for freshly computed samples
    pub fn new(samples: Vec<TrajectorySample>, key: &StalenessKey, start_time: f64, time_step: f64) -> Self {
        let transitions = find_transitions(&samples);
        Self {
            samples,
            coverage: 0.0,
            samples_per_period: key.samples_per_period,
            state_hash: 0,
            calculated_at: Instant::now(),
            dominant_body: key.dominant_body,
            partial: false,
            maneuver_stamp: key.maneuver_stamp,
            perturbations: key.perturbations,
            start_time,
            time_step,
            period: None,
            transitions,
        }
    }

    /// Set the period and derive coverage from the last sample's time
    pub fn with_period(mut self, period: Option<f64>, fallback_coverage: f64) -> Self {
        self.period = period;
        self.coverage = match (period, self.samples.last()) {
            (Some(p), Some(last)) if p > 0.0 => last.time / p,
            _ => fallback_coverage,
        };
        self
    }

    pub fn with_state_hash(mut self, state_hash: u64) -> Self {
        self.state_hash = state_hash;
        self
    }

    pub fn partial(mut self, partial: bool) -> Self {
        self.partial = partial;
        self
    }

    pub fn last_sample(&self) -> Option<&TrajectorySample> {
        self.samples.last()
    }

    /// Whether the vehicle's situation no longer matches this entry
    pub fn is_stale(&self, key: &StalenessKey) -> bool {
        self.dominant_body != key.dominant_body
            || key.maneuver_stamp > self.maneuver_stamp
            || self.samples_per_period != key.samples_per_period
            || self.perturbations != key.perturbations
    }

    /// Leading samples covering `coverage` of this entry's periods
    pub fn truncated(&self, coverage: f64) -> &[TrajectorySample] {
        let n = self.samples.len();
        if n == 0 || self.coverage <= 0.0 {
            return &self.samples;
        }
        let wanted = (n as f64 * coverage / self.coverage - COVERAGE_EPSILON).ceil();
        let count = if wanted.is_finite() { (wanted as usize).clamp(1, n) } else { n };
        &self.samples[..count]
    }

    /// Append extension samples, recomputing coverage and transitions
    pub fn extend_with(&mut self, samples: &[TrajectorySample], fallback_coverage: f64) {
        self.samples.extend_from_slice(samples);
        self.transitions = find_transitions(&self.samples);
        self.calculated_at = Instant::now();
        self.coverage = match (self.period, self.samples.last()) {
            (Some(p), Some(last)) if p > 0.0 => last.time / p,
            _ => fallback_coverage.max(self.coverage),
        };
    }
}

/// Outcome of consulting the cache for an update
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    /// Enough coverage; `samples` is a prefix of the cached trajectory
    Hit { samples: Vec<TrajectorySample>, coverage: f64 },

    /// Valid but too short; extend from `seed`
    Extend { seed: TrajectorySample, entry: CacheEntry },

    /// Nothing usable
    Miss,
}

struct Slot {
    entry: CacheEntry,
    last_access: Instant,
}

/// Bounded vehicle → trajectory map
pub struct TrajectoryCache {
    config: CacheConfig,
    slots: RwLock<HashMap<VehicleId, Slot>>,
}

impl TrajectoryCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            slots: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Copy of the entry, marking it recently used
    pub fn get(&self, vehicle: VehicleId) -> Option<CacheEntry> {
        let mut slots = self.slots.write();
        let slot = slots.get_mut(&vehicle)?;
        slot.last_access = Instant::now();
        Some(slot.entry.clone())
    }

    pub fn set(&self, vehicle: VehicleId, entry: CacheEntry) {
        log::debug!(
            "Caching {} samples ({:.2} periods{}) for {}",
            entry.samples.len(),
            entry.coverage,
            if entry.partial { ", partial" } else { "" },
            vehicle
        );
        let now = Instant::now();
        let mut slots = self.slots.write();
        slots.insert(vehicle, Slot { entry, last_access: now });
        Self::purge_expired_locked(&mut slots, self.max_age(), now);
        self.evict_lru_locked(&mut slots);
    }

    pub fn remove(&self, vehicle: VehicleId) -> Option<CacheEntry> {
        self.slots.write().remove(&vehicle).map(|slot| slot.entry)
    }

    pub fn contains(&self, vehicle: VehicleId) -> bool {
        self.slots.read().contains_key(&vehicle)
    }

    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    pub fn clear(&self) {
        self.slots.write().clear();
    }

    /// Decide between serving, extending, or recomputing
    ///
    /// Stale entries are dropped on the spot.
    pub fn lookup(&self, vehicle: VehicleId, key: &StalenessKey, requested_coverage: f64) -> CacheLookup {
        let Some(entry) = self.get(vehicle) else {
            log::debug!("Cache miss for {}", vehicle);
            return CacheLookup::Miss;
        };

        if entry.is_stale(key) {
            log::debug!("Cache entry for {} is stale", vehicle);
            self.remove(vehicle);
            return CacheLookup::Miss;
        }

        if requested_coverage <= entry.coverage + COVERAGE_EPSILON {
            log::debug!(
                "Cache hit for {} ({:.2} of {:.2} periods)",
                vehicle,
                requested_coverage,
                entry.coverage
            );
            return CacheLookup::Hit {
                samples: entry.truncated(requested_coverage).to_vec(),
                coverage: requested_coverage,
            };
        }

        match entry.last_sample().copied() {
            Some(seed) => {
                log::debug!(
                    "Extending {} from {:.2} to {:.2} periods",
                    vehicle,
                    entry.coverage,
                    requested_coverage
                );
                CacheLookup::Extend { seed, entry }
            }
            None => CacheLookup::Miss,
        }
    }

    /// Drop entries older than the configured maximum age
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    /// [`purge_expired`](Self::purge_expired) against an explicit clock
    pub fn purge_expired_at(&self, now: Instant) -> usize {
        let mut slots = self.slots.write();
        Self::purge_expired_locked(&mut slots, self.max_age(), now)
    }

    /// Ages too large for a `Duration` (or NaN) never expire
    fn max_age(&self) -> Duration {
        let secs = self.config.max_age_secs;
        if secs.is_nan() {
            return Duration::MAX;
        }
        Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX)
    }

    fn purge_expired_locked(slots: &mut HashMap<VehicleId, Slot>, max_age: Duration, now: Instant) -> usize {
        let before = slots.len();
        slots.retain(|vehicle, slot| {
            let keep = now.saturating_duration_since(slot.entry.calculated_at) <= max_age;
            if !keep {
                log::debug!("Evicting expired cache entry for {}", vehicle);
            }
            keep
        });
        before - slots.len()
    }

    fn evict_lru_locked(&self, slots: &mut HashMap<VehicleId, Slot>) {
        while slots.len() > self.config.max_entries {
            let Some(oldest) = slots
                .iter()
                .min_by_key(|(_, slot)| slot.last_access)
                .map(|(&vehicle, _)| vehicle)
            else {
                break;
            };
            log::debug!("Evicting least recently used cache entry for {}", oldest);
            slots.remove(&oldest);
        }
    }
}

impl Default for TrajectoryCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}
