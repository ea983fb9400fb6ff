//! Dominant-body gravity
//!
//! - Point mass (μ/r²)
//! - J2 oblateness about the body's rotation axis

use super::{ForceContext, ForceModel};
use nalgebra::Vector3;

/// Below this radius (km) the field is treated as singular and ignored
const MIN_RADIUS: f64 = 1e-3;

/// Point mass acceleration: a = -μ/r³ × r
#[derive(Debug, Clone, Copy, Default)]
pub struct PointMassGravity;

impl PointMassGravity {
    pub fn accel(gm: f64, position: &Vector3<f64>) -> Vector3<f64> {
        let r = position.norm();
        if r < MIN_RADIUS {
            // Avoid singularity at origin
            return Vector3::zeros();
        }
        let r3 = r * r * r;
        -gm / r3 * position
    }
}

impl ForceModel for PointMassGravity {
    fn acceleration(&self, ctx: &ForceContext) -> Vector3<f64> {
        Self::accel(ctx.dominant.gm, &ctx.position)
    }

    fn name(&self) -> &'static str {
        "Point Mass Gravity"
    }
}

/// Second zonal harmonic of the dominant body
///
/// Uses the body's pole from its rotation parameters; bodies without
/// rotation data are assumed to spin about +Z.
#[derive(Debug, Clone, Copy, Default)]
pub struct J2Gravity;

impl J2Gravity {
    /// J2 perturbation in vector form about pole `p̂`:
    /// a = (3/2) J2 μ Re² / r⁵ × [(5 (r·p̂)²/r² - 1) r - 2 (r·p̂) p̂]
    pub fn accel(
        gm: f64,
        j2: f64,
        equatorial_radius: f64,
        pole: &Vector3<f64>,
        position: &Vector3<f64>,
    ) -> Vector3<f64> {
        let r = position.norm();
        if r < MIN_RADIUS {
            return Vector3::zeros();
        }

        let r2 = r * r;
        let r5 = r2 * r2 * r;
        let re2 = equatorial_radius * equatorial_radius;

        // Common factor: (3/2) × J2 × μ × Re² / r⁵
        let factor = 1.5 * j2 * gm * re2 / r5;

        // Height along the pole
        let z = position.dot(pole);
        let z2_r2 = z * z / r2;

        factor * ((5.0 * z2_r2 - 1.0) * position - 2.0 * z * pole)
    }
}

impl ForceModel for J2Gravity {
    fn acceleration(&self, ctx: &ForceContext) -> Vector3<f64> {
        let body = ctx.dominant;
        let Some(j2) = body.j2 else {
            return Vector3::zeros();
        };
        let pole = body.rotation.map_or_else(|| Vector3::z(), |r| r.pole);
        Self::accel(body.gm, j2, body.radius, &pole, &ctx.position)
    }

    fn name(&self) -> &'static str {
        "J2 Oblateness"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bodies::tests::GM_EARTH;
    use approx::assert_relative_eq;

    const J2: f64 = 1.082_626_68e-3;
    const RE: f64 = 6378.1366;

    #[test]
    fn test_point_mass_magnitude() {
        let r = 6778.0;
        let accel = PointMassGravity::accel(GM_EARTH, &Vector3::new(r, 0.0, 0.0));
        assert_relative_eq!(accel.norm(), GM_EARTH / (r * r), max_relative = 1e-12);
        assert_eq!(PointMassGravity::accel(GM_EARTH, &Vector3::zeros()), Vector3::zeros());
    }

    #[test]
    fn test_j2_matches_cartesian_form_for_z_pole() {
        let p = Vector3::new(4000.0, 3000.0, 5000.0);
        let accel = J2Gravity::accel(GM_EARTH, J2, RE, &Vector3::z(), &p);

        let r = p.norm();
        let factor = 1.5 * J2 * GM_EARTH * RE * RE / r.powi(5);
        let z2_r2 = p.z * p.z / (r * r);
        let expected = Vector3::new(
            factor * p.x * (5.0 * z2_r2 - 1.0),
            factor * p.y * (5.0 * z2_r2 - 1.0),
            factor * p.z * (5.0 * z2_r2 - 3.0),
        );
        assert_relative_eq!(accel, expected, max_relative = 1e-12);
    }

    #[test]
    fn test_j2_follows_tilted_pole() {
        // Equatorial point for a pole along +X is a polar point for +Z
        let p = Vector3::new(0.0, 0.0, 7000.0);
        let about_x = J2Gravity::accel(GM_EARTH, J2, RE, &Vector3::x(), &p);
        let about_z = J2Gravity::accel(GM_EARTH, J2, RE, &Vector3::z(), &p);

        // On the equator J2 adds to the inward pull
        assert!(about_x.z < 0.0);
        // Over the pole J2 pushes outward
        assert!(about_z.z > 0.0);
        assert_relative_eq!(about_z.z, -2.0 * about_x.z, max_relative = 1e-12);
    }

    #[test]
    fn test_j2_relative_magnitude_leo() {
        let p = Vector3::new(RE + 400.0, 0.0, 0.0);
        let ratio = J2Gravity::accel(GM_EARTH, J2, RE, &Vector3::z(), &p).norm()
            / PointMassGravity::accel(GM_EARTH, &p).norm();
        // ~1.5 × J2 × (Re/r)² ≈ 1.4e-3
        assert!(ratio > 1e-3 && ratio < 2e-3);
    }
}
