//! Impulsive maneuvers in the local orbital frame

use crate::propagation::state::{ManeuverDeltaV, OrbitalState};
use nalgebra::Vector3;

/// Orthonormal prograde / normal / radial axes for a body-relative state
///
/// - prograde: along velocity
/// - normal: along velocity × position
/// - radial: normal × prograde, outward for a prograde orbit
pub fn local_basis(
    position: &Vector3<f64>,
    velocity: &Vector3<f64>,
) -> (Vector3<f64>, Vector3<f64>, Vector3<f64>) {
    let prograde = velocity.try_normalize(1e-12).unwrap_or_else(|| {
        log::warn!("Zero velocity in maneuver frame, using radial direction as prograde");
        position.try_normalize(1e-12).unwrap_or_else(Vector3::x)
    });

    let normal = velocity
        .cross(position)
        .try_normalize(1e-12)
        .unwrap_or_else(|| {
            // Rectilinear motion: any axis perpendicular to prograde will do
            log::warn!("Degenerate orbit normal in maneuver frame");
            let seed = if prograde.x.abs() < 0.9 { Vector3::x() } else { Vector3::y() };
            prograde.cross(&seed).normalize()
        });

    let radial = normal.cross(&prograde);
    (prograde, normal, radial)
}

/// Apply a local-frame delta-V to the state's velocity
pub fn apply_delta_v(state: &OrbitalState, delta_v: &ManeuverDeltaV) -> OrbitalState {
    if delta_v.is_zero() {
        return *state;
    }
    let (prograde, normal, radial) = local_basis(&state.position, &state.velocity);
    let dv = prograde * delta_v.prograde + normal * delta_v.normal + radial * delta_v.radial;
    OrbitalState::new(state.position, state.velocity + dv, state.time)
}
