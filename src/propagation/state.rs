//! Vehicle and trajectory state representations
//!
//! All vectors are expressed relative to the vehicle's dominant body,
//! in km and km/s, on the simulation's inertial axes.

use crate::bodies::BodyId;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Vehicle identifier, also the key for jobs and cache entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VehicleId(pub u64);

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vehicle-{}", self.0)
    }
}

/// Physical properties used by the drag model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehicleProperties {
    /// Mass (kg)
    pub mass: f64,

    /// Cross-sectional drag area (km²)
    pub drag_area: f64,

    /// Drag coefficient (dimensionless)
    pub drag_coefficient: f64,
}

impl Default for VehicleProperties {
    fn default() -> Self {
        Self {
            mass: 1000.0,
            drag_area: 10.0e-6, // 10 m²
            drag_coefficient: 2.2,
        }
    }
}

impl VehicleProperties {
    /// Cd × A / m (km²/kg); zero for a massless vehicle
    pub fn ballistic_factor(&self) -> f64 {
        if self.mass <= 0.0 {
            return 0.0;
        }
        self.drag_coefficient * self.drag_area / self.mass
    }
}

/// Velocity change in the local orbital frame (km/s)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ManeuverDeltaV {
    /// Along the velocity vector
    pub prograde: f64,
    /// Along the orbit normal (velocity × position)
    pub normal: f64,
    /// Completes the right-handed frame, pointing away from the body
    pub radial: f64,
}

impl ManeuverDeltaV {
    pub fn new(prograde: f64, normal: f64, radial: f64) -> Self {
        Self {
            prograde,
            normal,
            radial,
        }
    }

    pub fn prograde(dv: f64) -> Self {
        Self::new(dv, 0.0, 0.0)
    }

    pub fn magnitude(&self) -> f64 {
        (self.prograde * self.prograde + self.normal * self.normal + self.radial * self.radial)
            .sqrt()
    }

    pub fn is_zero(&self) -> bool {
        self.magnitude() == 0.0
    }
}

/// Scheduled impulsive burn
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Maneuver {
    pub id: u64,

    /// Execution time in simulation seconds (same clock as snapshot `sim_time`)
    pub time: f64,

    pub delta_v: ManeuverDeltaV,
}

impl Maneuver {
    pub fn new(id: u64, time: f64, delta_v: ManeuverDeltaV) -> Self {
        Self { id, time, delta_v }
    }
}

/// Live state of a simulated vehicle
///
/// Propagation only ever reads this; re-centering happens on copies.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleState {
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    pub properties: VehicleProperties,
    pub dominant_body: BodyId,
    maneuvers: Vec<Maneuver>,
    /// Bumped on every maneuver edit; compared against cache entries
    maneuver_revision: u64,
}

impl VehicleState {
    pub fn new(position: Vector3<f64>, velocity: Vector3<f64>, dominant_body: BodyId) -> Self {
        Self {
            position,
            velocity,
            properties: VehicleProperties::default(),
            dominant_body,
            maneuvers: Vec::new(),
            maneuver_revision: 0,
        }
    }

    pub fn with_properties(mut self, properties: VehicleProperties) -> Self {
        self.properties = properties;
        self
    }

    /// Pending maneuvers ordered by execution time
    pub fn maneuvers(&self) -> &[Maneuver] {
        &self.maneuvers
    }

    pub fn maneuver_revision(&self) -> u64 {
        self.maneuver_revision
    }

    /// Insert or replace (by id) a maneuver
    pub fn upsert_maneuver(&mut self, maneuver: Maneuver) {
        self.maneuvers.retain(|m| m.id != maneuver.id);
        self.maneuvers.push(maneuver);
        self.maneuvers.sort_by(|a, b| a.time.total_cmp(&b.time));
        self.maneuver_revision += 1;
    }

    pub fn remove_maneuver(&mut self, id: u64) -> Option<Maneuver> {
        let index = self.maneuvers.iter().position(|m| m.id == id)?;
        self.maneuver_revision += 1;
        Some(self.maneuvers.remove(index))
    }

    pub fn clear_maneuvers(&mut self) {
        if !self.maneuvers.is_empty() {
            self.maneuvers.clear();
            self.maneuver_revision += 1;
        }
    }

    pub fn orbital_state(&self) -> OrbitalState {
        OrbitalState::new(self.position, self.velocity, 0.0)
    }
}

/// One point of a predicted trajectory
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajectorySample {
    /// Position relative to `dominant_body` (km)
    pub position: Vector3<f64>,

    /// Velocity relative to `dominant_body` (km/s)
    pub velocity: Vector3<f64>,

    /// Seconds since the start of the propagation
    pub time: f64,

    pub dominant_body: BodyId,

    /// The vehicle moved down into a child body's SOI at this sample
    pub entered_soi: bool,

    /// The vehicle left its previous dominant body's SOI at this sample
    pub exited_soi: bool,
}

impl TrajectorySample {
    pub fn new(state: &OrbitalState, dominant_body: BodyId) -> Self {
        Self {
            position: state.position,
            velocity: state.velocity,
            time: state.time,
            dominant_body,
            entered_soi: false,
            exited_soi: false,
        }
    }

    pub fn orbital_state(&self) -> OrbitalState {
        OrbitalState::new(self.position, self.velocity, self.time)
    }
}

/// Optional force terms on top of the dominant body's point-mass gravity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct PerturbationToggles {
    pub j2: bool,
    pub drag: bool,
    pub third_body: bool,
}

impl Default for PerturbationToggles {
    fn default() -> Self {
        Self {
            j2: true,
            drag: true,
            third_body: false,
        }
    }
}

impl PerturbationToggles {
    /// Pure two-body motion
    pub fn none() -> Self {
        Self {
            j2: false,
            drag: false,
            third_body: false,
        }
    }

    pub fn all() -> Self {
        Self {
            j2: true,
            drag: true,
            third_body: true,
        }
    }
}

/// Integrator state vector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitalState {
    /// Position relative to the dominant body (km)
    pub position: Vector3<f64>,

    /// Velocity relative to the dominant body (km/s)
    pub velocity: Vector3<f64>,

    /// Seconds since the propagation start
    pub time: f64,
}

impl OrbitalState {
    pub fn new(position: Vector3<f64>, velocity: Vector3<f64>, time: f64) -> Self {
        Self {
            position,
            velocity,
            time,
        }
    }

    pub fn radius(&self) -> f64 {
        self.position.norm()
    }

    pub fn speed(&self) -> f64 {
        self.velocity.norm()
    }

    /// Specific orbital energy (km²/s²) about a body with parameter `mu`
    pub fn specific_energy(&self, mu: f64) -> f64 {
        0.5 * self.velocity.norm_squared() - mu / self.position.norm()
    }

    /// Specific angular momentum vector r × v
    pub fn angular_momentum(&self) -> Vector3<f64> {
        self.position.cross(&self.velocity)
    }

    pub fn is_finite(&self) -> bool {
        self.position.iter().chain(self.velocity.iter()).all(|c| c.is_finite())
            && self.time.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maneuver_edits_bump_revision() {
        let mut vehicle = VehicleState::new(Vector3::new(7000.0, 0.0, 0.0), Vector3::zeros(), BodyId(399));
        assert_eq!(vehicle.maneuver_revision(), 0);

        vehicle.upsert_maneuver(Maneuver::new(2, 500.0, ManeuverDeltaV::prograde(0.1)));
        vehicle.upsert_maneuver(Maneuver::new(1, 100.0, ManeuverDeltaV::prograde(0.2)));
        assert_eq!(vehicle.maneuvers()[0].id, 1);
        assert_eq!(vehicle.maneuver_revision(), 2);

        // Replacing by id keeps a single entry
        vehicle.upsert_maneuver(Maneuver::new(1, 900.0, ManeuverDeltaV::prograde(0.2)));
        assert_eq!(vehicle.maneuvers().len(), 2);
        assert_eq!(vehicle.maneuvers()[1].id, 1);

        assert!(vehicle.remove_maneuver(7).is_none());
        assert_eq!(vehicle.maneuver_revision(), 3);
        assert!(vehicle.remove_maneuver(2).is_some());
        assert_eq!(vehicle.maneuver_revision(), 4);
    }

    #[test]
    fn test_specific_energy_circular() {
        let mu = 398_600.4;
        let r = 7000.0;
        let state = OrbitalState::new(Vector3::new(r, 0.0, 0.0), Vector3::new(0.0, (mu / r).sqrt(), 0.0), 0.0);
        assert!((state.specific_energy(mu) + mu / (2.0 * r)).abs() < 1e-12);
        assert!(state.is_finite());
    }

    #[test]
    fn test_ballistic_factor() {
        let props = VehicleProperties::default();
        assert!((props.ballistic_factor() - 2.2e-8).abs() < 1e-20);
        let massless = VehicleProperties { mass: 0.0, ..props };
        assert_eq!(massless.ballistic_factor(), 0.0);
    }
}
