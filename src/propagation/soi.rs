//! Dominant-body selection and frame re-centering
//!
//! The dominant body is found by descending the dynamical hierarchy from
//! the primary: at each level the vehicle moves into the nearest satellite
//! whose sphere of influence strictly contains it, and stops when none
//! does. Barycenters never dominate since the dynamical hierarchy skips
//! them.

use crate::bodies::{Body, BodyHierarchy, BodyId, EphemerisSnapshot};
use crate::error::{EngineError, Result};
use crate::propagation::state::OrbitalState;
use nalgebra::Vector3;

/// Body whose SOI contains `global_position`, descending from the primary
pub fn dominant_body_at(snapshot: &EphemerisSnapshot, global_position: &Vector3<f64>) -> Result<BodyId> {
    let mut current = snapshot
        .primary()
        .ok_or_else(|| EngineError::InvalidRequest("snapshot has no massive body".into()))?;

    // Each level moves strictly down the tree, so the depth bounds the loop
    for _ in 0..snapshot.len() {
        let next = snapshot
            .satellites_of(current)
            .filter(|b| b.soi_radius.is_some() && b.soi_contains(global_position))
            .min_by(|a, b| {
                let da = (global_position - a.position).norm_squared();
                let db = (global_position - b.position).norm_squared();
                da.total_cmp(&db)
            });
        match next {
            Some(body) => current = body.id,
            None => break,
        }
    }

    Ok(current)
}

/// Outcome of checking the vehicle against the SOI tree
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Recentered {
    pub state: OrbitalState,
    pub dominant: BodyId,
    pub entered_soi: bool,
    pub exited_soi: bool,
}

impl Recentered {
    pub fn changed(&self) -> bool {
        self.entered_soi || self.exited_soi
    }
}

/// Translate a body-relative state from `from` to `to`
pub fn translate(state: &OrbitalState, from: &Body, to: &Body) -> OrbitalState {
    OrbitalState::new(
        state.position + from.position - to.position,
        state.velocity + from.velocity - to.velocity,
        state.time,
    )
}

/// Re-evaluate the dominant body and express the state relative to it
///
/// `entered_soi` is set when the new body is not on the old body's
/// dynamical ancestry (the vehicle went down or sideways); `exited_soi`
/// when the old body is not on the new body's ancestry (it went up or
/// sideways). A lateral hop sets both.
pub fn recenter(snapshot: &EphemerisSnapshot, state: &OrbitalState, current: BodyId) -> Result<Recentered> {
    let from = snapshot.require(current)?;
    let global = from.position + state.position;
    let dominant = dominant_body_at(snapshot, &global)?;

    if dominant == current {
        return Ok(Recentered {
            state: *state,
            dominant,
            entered_soi: false,
            exited_soi: false,
        });
    }

    let to = snapshot.require(dominant)?;
    let hierarchy = DynamicalHierarchy(snapshot);
    let entered_soi = !hierarchy.is_ancestor_or_self(dominant, current);
    let exited_soi = !hierarchy.is_ancestor_or_self(current, dominant);

    log::debug!(
        "SOI change at t={:.1}s: {} ({}) -> {} ({})",
        state.time,
        from.name,
        current,
        to.name,
        dominant
    );

    Ok(Recentered {
        state: translate(state, from, to),
        dominant,
        entered_soi,
        exited_soi,
    })
}

/// The snapshot's tree with barycenters folded away
struct DynamicalHierarchy<'a>(&'a EphemerisSnapshot);

impl BodyHierarchy for DynamicalHierarchy<'_> {
    fn parent_of(&self, id: BodyId) -> Option<BodyId> {
        self.0.dynamical_parent(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bodies::tests::{earth_only, sun_earth_moon, EARTH, MOON, SUN};
    use approx::assert_relative_eq;

    #[test]
    fn test_single_body_always_dominant() {
        let snapshot = earth_only();
        let far = Vector3::new(1.0e9, 0.0, 0.0);
        assert_eq!(dominant_body_at(&snapshot, &far).unwrap(), EARTH);
    }

    #[test]
    fn test_descends_to_moon() {
        let snapshot = sun_earth_moon();
        let earth = snapshot.get(EARTH).unwrap();
        let moon = snapshot.get(MOON).unwrap();

        // Near Earth
        let leo = earth.position + Vector3::new(7000.0, 0.0, 0.0);
        assert_eq!(dominant_body_at(&snapshot, &leo).unwrap(), EARTH);

        // Near the Moon
        let low_lunar = moon.position + Vector3::new(0.0, 2000.0, 0.0);
        assert_eq!(dominant_body_at(&snapshot, &low_lunar).unwrap(), MOON);

        // Far outside Earth's SOI
        let deep_space = earth.position + Vector3::new(0.0, 5.0e6, 0.0);
        assert_eq!(dominant_body_at(&snapshot, &deep_space).unwrap(), SUN);
    }

    #[test]
    fn test_recenter_preserves_global_state() {
        let snapshot = sun_earth_moon();
        let earth = snapshot.get(EARTH).unwrap();
        let moon = snapshot.get(MOON).unwrap();

        // Earth-relative state that sits inside the Moon's SOI
        let rel = moon.position - earth.position + Vector3::new(0.0, 3000.0, 0.0);
        let state = OrbitalState::new(rel, Vector3::new(0.1, 0.9, 0.0), 42.0);

        let result = recenter(&snapshot, &state, EARTH).unwrap();
        assert_eq!(result.dominant, MOON);
        assert!(result.entered_soi);
        assert!(!result.exited_soi);
        assert_relative_eq!(result.state.position, Vector3::new(0.0, 3000.0, 0.0), epsilon = 1e-6);
        assert_relative_eq!(
            result.state.velocity + moon.velocity,
            state.velocity + earth.velocity,
            epsilon = 1e-12
        );
        assert_eq!(result.state.time, 42.0);

        // And back out again
        let back = recenter(
            &snapshot,
            &OrbitalState::new(Vector3::new(0.0, 1.0e5, 0.0), Vector3::zeros(), 0.0),
            MOON,
        )
        .unwrap();
        assert_eq!(back.dominant, EARTH);
        assert!(back.exited_soi);
        assert!(!back.entered_soi);
    }

    #[test]
    fn test_no_change_inside_soi() {
        let snapshot = sun_earth_moon();
        let state = OrbitalState::new(Vector3::new(7000.0, 0.0, 0.0), Vector3::new(0.0, 7.5, 0.0), 0.0);
        let result = recenter(&snapshot, &state, EARTH).unwrap();
        assert!(!result.changed());
        assert_eq!(result.state, state);
    }
}
