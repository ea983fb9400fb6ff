//! Orbit shape classification and propagation sizing hints
//!
//! Derived from specific energy and angular momentum about the dominant
//! body. Only used to choose sensible defaults for how long and how finely
//! to propagate; the integrator never consults it.

use crate::config::PropagationConfig;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

/// Eccentricities within this band of 1 count as parabolic
const PARABOLIC_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrbitType {
    Elliptical,
    Parabolic,
    Hyperbolic,
}

/// Osculating summary of an orbit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitSummary {
    pub orbit_type: OrbitType,

    /// Specific orbital energy (km²/s²)
    pub specific_energy: f64,

    /// |r × v| (km²/s)
    pub angular_momentum: f64,

    pub eccentricity: f64,

    /// Negative for hyperbolic orbits, infinite for parabolic
    pub semi_major_axis: f64,

    /// Orbital period (s), elliptical orbits only
    pub period: Option<f64>,

    /// Closest approach distance (km)
    pub periapsis: f64,

    /// Farthest distance (km), elliptical orbits only
    pub apoapsis: Option<f64>,
}

impl OrbitSummary {
    pub fn is_closed(&self) -> bool {
        self.orbit_type == OrbitType::Elliptical
    }
}

/// Classify the orbit of a body-relative state about a body with parameter `gm`
pub fn analyze(position: &Vector3<f64>, velocity: &Vector3<f64>, gm: f64) -> OrbitSummary {
    let r = position.norm();
    let v2 = velocity.norm_squared();
    let energy = 0.5 * v2 - gm / r;
    let h = position.cross(velocity);

    // Eccentricity vector: ((v² - μ/r) r - (r·v) v) / μ
    let e_vec = ((v2 - gm / r) * position - position.dot(velocity) * velocity) / gm;
    let eccentricity = e_vec.norm();

    let orbit_type = if (eccentricity - 1.0).abs() < PARABOLIC_TOLERANCE {
        OrbitType::Parabolic
    } else if energy < 0.0 {
        OrbitType::Elliptical
    } else {
        OrbitType::Hyperbolic
    };

    let h_mag = h.norm();
    let semi_latus = h_mag * h_mag / gm;
    let periapsis = semi_latus / (1.0 + eccentricity);

    let (semi_major_axis, period, apoapsis) = match orbit_type {
        OrbitType::Elliptical => {
            let a = -gm / (2.0 * energy);
            (a, Some(TAU * (a.powi(3) / gm).sqrt()), Some(a * (1.0 + eccentricity)))
        }
        OrbitType::Parabolic => (f64::INFINITY, None, None),
        OrbitType::Hyperbolic => (-gm / (2.0 * energy), None, None),
    };

    OrbitSummary {
        orbit_type,
        specific_energy: energy,
        angular_momentum: h_mag,
        eccentricity,
        semi_major_axis,
        period,
        periapsis,
        apoapsis,
    }
}

/// Time that stands in for one period when sizing a propagation
///
/// Open orbits have no period; the configured fixed horizon takes its place.
pub fn nominal_period(summary: &OrbitSummary, config: &PropagationConfig) -> f64 {
    summary.period.unwrap_or(config.open_orbit_duration)
}

/// Propagation span for `coverage` orbital periods
pub fn duration_hint(summary: &OrbitSummary, coverage: f64, config: &PropagationConfig) -> f64 {
    nominal_period(summary, config) * coverage.max(0.0)
}

/// Output time step for the requested sample density
///
/// Spaces samples so that `samples_per_period · coverage` samples span the
/// full duration end to end, bounded by `max_samples`.
pub fn resolution_hint(
    summary: &OrbitSummary,
    coverage: f64,
    samples_per_period: usize,
    config: &PropagationConfig,
) -> f64 {
    let duration = duration_hint(summary, coverage, config);
    let wanted = (samples_per_period as f64 * coverage.max(0.0)).round() as usize;
    let samples = wanted.clamp(2, config.max_samples.max(2));
    duration / (samples - 1) as f64
}
