//! Third-body gravitational perturbations
//!
//! Every massive body in the snapshot other than the dominant one pulls on
//! both the vehicle and the dominant body. Only the difference matters in
//! the dominant-body frame:
//!
//! a = μ_k × (d/|d|³ - R/|R|³)
//!
//! with d the vehicle→body vector and R the dominant→body vector.

use super::{ForceContext, ForceModel};
use nalgebra::Vector3;

/// Closer than this (km) to a body centre the term is skipped
const MIN_DISTANCE: f64 = 1e-3;

/// Differential gravity of all non-dominant massive bodies
#[derive(Debug, Clone, Copy, Default)]
pub struct ThirdBodyPerturbation;

impl ThirdBodyPerturbation {
    /// Differential acceleration from one perturbing body
    pub fn differential_accel(
        vehicle_pos: &Vector3<f64>,
        dominant_pos: &Vector3<f64>,
        body_pos: &Vector3<f64>,
        mu_body: f64,
    ) -> Vector3<f64> {
        // Vector from vehicle to body
        let d = body_pos - vehicle_pos;
        let d_mag = d.norm();

        // Vector from dominant body centre to body
        let big_r = body_pos - dominant_pos;
        let big_r_mag = big_r.norm();

        if d_mag < MIN_DISTANCE || big_r_mag < MIN_DISTANCE {
            log::warn!("Third-body geometry degenerate (d = {:.3e} km), skipping term", d_mag);
            return Vector3::zeros();
        }

        let term1 = d / d_mag.powi(3);
        let term2 = big_r / big_r_mag.powi(3);

        mu_body * (term1 - term2)
    }
}

impl ForceModel for ThirdBodyPerturbation {
    fn acceleration(&self, ctx: &ForceContext) -> Vector3<f64> {
        let vehicle_pos = ctx.global_position();
        let dominant = ctx.dominant;

        // BTreeMap iteration keeps the summation order fixed
        ctx.snapshot
            .bodies()
            .filter(|b| b.is_massive() && b.id != dominant.id)
            .map(|b| Self::differential_accel(&vehicle_pos, &dominant.position, &b.position, b.gm))
            .fold(Vector3::zeros(), |acc, a| acc + a)
    }

    fn name(&self) -> &'static str {
        "Third Body"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bodies::tests::{sun_earth_moon, EARTH, GM_MOON, MOON};
    use crate::propagation::state::VehicleProperties;
    use approx::assert_relative_eq;

    #[test]
    fn test_zero_at_dominant_center() {
        // At the dominant body's centre both terms cancel exactly
        let a = ThirdBodyPerturbation::differential_accel(
            &Vector3::new(1.0e8, 0.0, 0.0),
            &Vector3::new(1.0e8, 0.0, 0.0),
            &Vector3::new(0.0, 0.0, 0.0),
            1.327e11,
        );
        assert_eq!(a, Vector3::zeros());
    }

    #[test]
    fn test_moon_tidal_direction() {
        let snapshot = sun_earth_moon();
        let earth = snapshot.get(EARTH).unwrap();
        let moon = snapshot.get(MOON).unwrap();

        // Vehicle between Earth and Moon is pulled towards the Moon
        let toward_moon = (moon.position - earth.position).normalize();
        let ctx = ForceContext::new(
            toward_moon * 42_164.0,
            Vector3::zeros(),
            VehicleProperties::default(),
            earth,
            &snapshot,
        );
        let accel = ThirdBodyPerturbation.acceleration(&ctx);
        assert!(accel.dot(&toward_moon) > 0.0);

        // The Moon term alone matches the closed-form tidal approximation 2μr/R³
        let moon_only = ThirdBodyPerturbation::differential_accel(
            &ctx.global_position(),
            &earth.position,
            &moon.position,
            GM_MOON,
        );
        let big_r = 384_400.0_f64;
        let tidal = 2.0 * GM_MOON * 42_164.0 / big_r.powi(3);
        assert_relative_eq!(moon_only.norm(), tidal, max_relative = 0.4);
    }

    #[test]
    fn test_excludes_dominant_body() {
        let snapshot = sun_earth_moon();
        let earth = snapshot.get(EARTH).unwrap();
        let ctx = ForceContext::new(
            Vector3::new(7000.0, 0.0, 0.0),
            Vector3::zeros(),
            VehicleProperties::default(),
            earth,
            &snapshot,
        );
        // Perturbation is tiny compared with Earth's own pull
        let accel = ThirdBodyPerturbation.acceleration(&ctx);
        assert!(accel.norm() < 1e-6 * earth.gm / (7000.0 * 7000.0));
    }
}
