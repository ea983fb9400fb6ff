//! Atmospheric drag force model
//!
//! Computes acceleration due to atmospheric drag using the formula:
//!
//! a = -½ (Cd × A / m) ρ |v_rel| v_rel
//!
//! where:
//! - ρ is the dominant body's atmospheric density at the vehicle altitude
//! - v_rel is velocity relative to the atmosphere co-rotating about the
//!   body's actual (tilted) pole: v_rel = v - ω × r
//! - Cd × A / m is the vehicle's ballistic factor

use super::{ForceContext, ForceModel};
use crate::propagation::atmosphere::{AtmosphereModel, Exponential};
use nalgebra::Vector3;

/// Atmospheric drag force model
///
/// The atmosphere belongs to whichever body is dominant at evaluation
/// time, so the density model is built from that body's parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct AtmosphericDrag;

impl AtmosphericDrag {
    pub fn new() -> Self {
        Self
    }

    /// Velocity relative to the co-rotating atmosphere
    pub fn relative_velocity(ctx: &ForceContext) -> Vector3<f64> {
        match ctx.dominant.rotation {
            // Atmospheric velocity at vehicle position: ω × r
            Some(rotation) => ctx.velocity - rotation.angular_velocity().cross(&ctx.position),
            None => ctx.velocity,
        }
    }

    /// Drag for an arbitrary density model
    pub fn accel_with<A: AtmosphereModel>(&self, atmosphere: &A, ctx: &ForceContext) -> Vector3<f64> {
        let altitude = ctx.altitude();

        // Skip below the surface (impact) and above the atmosphere
        if altitude < 0.0 || altitude > atmosphere.max_altitude() {
            return Vector3::zeros();
        }

        let density = atmosphere.density(altitude);
        if density <= 0.0 {
            return Vector3::zeros();
        }

        let v_rel = Self::relative_velocity(ctx);
        let v_rel_mag = v_rel.norm();
        if v_rel_mag < 1e-9 {
            return Vector3::zeros();
        }

        let cd_a_m = ctx.properties.ballistic_factor();

        -0.5 * cd_a_m * density * v_rel_mag * v_rel
    }
}

impl ForceModel for AtmosphericDrag {
    fn acceleration(&self, ctx: &ForceContext) -> Vector3<f64> {
        match &ctx.dominant.atmosphere {
            Some(params) => self.accel_with(&Exponential::from_params(params), ctx),
            None => Vector3::zeros(),
        }
    }

    fn name(&self) -> &'static str {
        "Atmospheric Drag"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bodies::catalog::SolarSystemCatalog;
    use crate::bodies::{Body, BodyId, EphemerisSnapshot, RotationParams};
    use crate::propagation::forces::{J2Gravity, PointMassGravity};
    use crate::propagation::state::VehicleProperties;
    use approx::assert_relative_eq;

    const EARTH: BodyId = BodyId(399);

    fn circular_ctx<'a>(snapshot: &'a EphemerisSnapshot, altitude: f64) -> ForceContext<'a> {
        let earth = snapshot.get(EARTH).unwrap();
        let r = earth.radius + altitude;
        let v = (earth.gm / r).sqrt();
        ForceContext::new(
            Vector3::new(r, 0.0, 0.0),
            Vector3::new(0.0, v, 0.0),
            VehicleProperties::default(),
            earth,
            snapshot,
        )
    }

    #[test]
    fn test_drag_direction() {
        let snapshot = SolarSystemCatalog::builtin().snapshot(0.0);
        let ctx = circular_ctx(&snapshot, 300.0);
        let accel = AtmosphericDrag::new().acceleration(&ctx);
        let v_rel = AtmosphericDrag::relative_velocity(&ctx);

        // Drag should oppose relative velocity
        assert!(accel.norm() > 0.0);
        assert!(accel.dot(&v_rel) < 0.0);
        assert_relative_eq!(accel.normalize(), -v_rel.normalize(), epsilon = 1e-12);
    }

    #[test]
    fn test_no_drag_above_max_altitude() {
        let snapshot = SolarSystemCatalog::builtin().snapshot(0.0);
        let ctx = circular_ctx(&snapshot, 600.0);
        assert_eq!(AtmosphericDrag::new().acceleration(&ctx), Vector3::zeros());
    }

    #[test]
    fn test_corotation_uses_tilted_axis() {
        let atmosphere = crate::bodies::AtmosphereParams {
            reference_density: 1.0,
            reference_altitude: 0.0,
            scale_height: 50.0,
            max_altitude: 1000.0,
        };
        let rate = 7.292e-5;
        let tilted = Body::new(EARTH, "Tilted", 398_600.4, 6378.0)
            .with_atmosphere(atmosphere)
            .with_rotation(RotationParams::new(Vector3::x(), rate));
        let snapshot = EphemerisSnapshot::from_bodies(0.0, [tilted]);
        let body = snapshot.get(EARTH).unwrap();

        // On the spin axis the atmosphere is at rest
        let on_axis = ForceContext::new(
            Vector3::new(6578.0, 0.0, 0.0),
            Vector3::new(0.0, 7.8, 0.0),
            VehicleProperties::default(),
            body,
            &snapshot,
        );
        assert_relative_eq!(AtmosphericDrag::relative_velocity(&on_axis), on_axis.velocity);

        // Off axis the atmosphere moves with ω × r
        let off_axis = ForceContext {
            position: Vector3::new(0.0, 6578.0, 0.0),
            ..on_axis
        };
        let expected = off_axis.velocity - Vector3::new(0.0, 0.0, rate * 6578.0);
        assert_relative_eq!(AtmosphericDrag::relative_velocity(&off_axis), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_j2_between_gravity_and_drag_leo() {
        let snapshot = SolarSystemCatalog::builtin().snapshot(0.0);
        let ctx = circular_ctx(&snapshot, 300.0);

        let gravity = PointMassGravity.acceleration(&ctx).norm();
        let j2 = J2Gravity.acceleration(&ctx).norm();
        let drag = AtmosphericDrag::new().acceleration(&ctx).norm();

        assert!(drag > 0.0);
        assert!(j2 < gravity, "J2 {} vs gravity {}", j2, gravity);
        assert!(j2 > drag, "J2 {} vs drag {}", j2, drag);
    }
}
