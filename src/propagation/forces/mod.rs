//! Force models for orbital mechanics
//!
//! This module provides composable force models that can be combined
//! to create a complete dynamics model for orbit propagation.
//!
//! # Architecture
//!
//! Each force model implements the `ForceModel` trait, which computes
//! the acceleration contribution for a vehicle described by a
//! [`ForceContext`]: its state relative to the dominant body, the dominant
//! body record, and the ephemeris snapshot used for everything else.
//!
//! Multiple models are combined using `CompositeForce`, which sums
//! all force contributions in insertion order, so identical
//! inputs give bit-identical results.
//!
//! # Available Models
//!
//! - **PointMassGravity**: Dominant body μ/r² (always present)
//! - **J2Gravity**: Oblateness about the body's true rotation axis
//! - **AtmosphericDrag**: Exponential atmosphere co-rotating with the body
//! - **ThirdBodyPerturbation**: Differential pull of every other massive body

mod drag;
mod gravity;
mod third_body;

pub use drag::AtmosphericDrag;
pub use gravity::{J2Gravity, PointMassGravity};
pub use third_body::ThirdBodyPerturbation;

use crate::bodies::{Body, EphemerisSnapshot};
use crate::propagation::state::{PerturbationToggles, VehicleProperties};
use nalgebra::Vector3;

/// Everything a force model may look at
#[derive(Debug, Clone, Copy)]
pub struct ForceContext<'a> {
    /// Position relative to the dominant body (km)
    pub position: Vector3<f64>,

    /// Velocity relative to the dominant body (km/s)
    pub velocity: Vector3<f64>,

    pub properties: VehicleProperties,

    pub dominant: &'a Body,

    /// Body states for the evaluation instant
    pub snapshot: &'a EphemerisSnapshot,
}

impl<'a> ForceContext<'a> {
    pub fn new(
        position: Vector3<f64>,
        velocity: Vector3<f64>,
        properties: VehicleProperties,
        dominant: &'a Body,
        snapshot: &'a EphemerisSnapshot,
    ) -> Self {
        Self {
            position,
            velocity,
            properties,
            dominant,
            snapshot,
        }
    }

    /// Vehicle position in the snapshot's inertial frame
    pub fn global_position(&self) -> Vector3<f64> {
        self.dominant.position + self.position
    }

    /// Height above the dominant body's equatorial radius (km)
    pub fn altitude(&self) -> f64 {
        self.position.norm() - self.dominant.radius
    }
}

/// Trait for force model contributions
///
/// Each force model computes its acceleration contribution for a given
/// context. Models must be thread-safe for use inside pool workers.
pub trait ForceModel: Send + Sync {
    /// Acceleration contribution (km/s²) in the dominant body's frame
    fn acceleration(&self, ctx: &ForceContext) -> Vector3<f64>;

    /// Force model name for debugging and logging
    fn name(&self) -> &'static str;
}

/// Composite force model that aggregates multiple force contributions
///
/// # Example
///
/// ```ignore
/// let forces = CompositeForce::from_toggles(&PerturbationToggles::all());
/// let accel = forces.total_acceleration(&ctx);
/// ```
pub struct CompositeForce {
    forces: Vec<Box<dyn ForceModel>>,
}

impl Default for CompositeForce {
    fn default() -> Self {
        Self::new()
    }
}

impl CompositeForce {
    /// Create an empty composite force model
    pub fn new() -> Self {
        Self { forces: Vec::new() }
    }

    /// Add a force model to the composite
    pub fn add(&mut self, force: Box<dyn ForceModel>) {
        log::debug!("Adding force model: {}", force.name());
        self.forces.push(force);
    }

    /// Create a builder for convenient force model construction
    pub fn builder() -> CompositeForceBuilder {
        CompositeForceBuilder::new()
    }

    /// Point-mass gravity plus whichever perturbations are toggled on
    pub fn from_toggles(toggles: &PerturbationToggles) -> Self {
        let mut builder = Self::builder().with(Box::new(PointMassGravity));
        if toggles.j2 {
            builder = builder.with(Box::new(J2Gravity));
        }
        if toggles.drag {
            builder = builder.with_drag(AtmosphericDrag::new());
        }
        if toggles.third_body {
            builder = builder.with(Box::new(ThirdBodyPerturbation));
        }
        builder.build()
    }

    /// Get the number of force models
    pub fn len(&self) -> usize {
        self.forces.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.forces.is_empty()
    }

    /// List all force model names
    pub fn model_names(&self) -> Vec<&'static str> {
        self.forces.iter().map(|f| f.name()).collect()
    }

    /// Compute total acceleration from all force models
    pub fn total_acceleration(&self, ctx: &ForceContext) -> Vector3<f64> {
        self.forces
            .iter()
            .map(|f| f.acceleration(ctx))
            .fold(Vector3::zeros(), |acc, a| acc + a)
    }

    /// Compute acceleration with individual contributions for debugging
    pub fn acceleration_breakdown(&self, ctx: &ForceContext) -> Vec<(&'static str, Vector3<f64>)> {
        self.forces
            .iter()
            .map(|f| (f.name(), f.acceleration(ctx)))
            .collect()
    }
}

/// Builder for CompositeForce
pub struct CompositeForceBuilder {
    forces: Vec<Box<dyn ForceModel>>,
}

impl CompositeForceBuilder {
    fn new() -> Self {
        Self { forces: Vec::new() }
    }

    /// Add a force model
    pub fn with(mut self, force: Box<dyn ForceModel>) -> Self {
        self.forces.push(force);
        self
    }

    /// Add atmospheric drag
    pub fn with_drag(self, drag: AtmosphericDrag) -> Self {
        self.with(Box::new(drag))
    }

    /// Build the composite force model
    pub fn build(self) -> CompositeForce {
        let mut composite = CompositeForce::new();
        for force in self.forces {
            composite.add(force);
        }
        composite
    }
}

/// Instantaneous acceleration for a context and set of toggles
///
/// Stateless convenience over [`CompositeForce::from_toggles`]; hot loops
/// should build the composite once and reuse it.
pub fn total_acceleration(ctx: &ForceContext, toggles: &PerturbationToggles) -> Vector3<f64> {
    CompositeForce::from_toggles(toggles).total_acceleration(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bodies::tests::{earth_only, EARTH, GM_EARTH};

    #[test]
    fn test_composite_force_empty() {
        let forces = CompositeForce::new();
        assert!(forces.is_empty());

        let snapshot = earth_only();
        let earth = snapshot.get(EARTH).unwrap();
        let r = 7000.0;
        let ctx = ForceContext::new(
            Vector3::new(r, 0.0, 0.0),
            Vector3::new(0.0, (GM_EARTH / r).sqrt(), 0.0),
            VehicleProperties::default(),
            earth,
            &snapshot,
        );

        assert_eq!(forces.total_acceleration(&ctx), Vector3::zeros());
    }

    #[test]
    fn test_composite_force_gravity() {
        let forces = CompositeForce::from_toggles(&PerturbationToggles::none());
        assert_eq!(forces.model_names(), vec!["Point Mass Gravity"]);

        let snapshot = earth_only();
        let earth = snapshot.get(EARTH).unwrap();
        let r = 7000.0;
        let ctx = ForceContext::new(
            Vector3::new(r, 0.0, 0.0),
            Vector3::new(0.0, (GM_EARTH / r).sqrt(), 0.0),
            VehicleProperties::default(),
            earth,
            &snapshot,
        );

        let accel = forces.total_acceleration(&ctx);

        // Should be pointing toward the body center (negative x)
        assert!(accel.x < 0.0);
        assert!(accel.y.abs() < 1e-15);
        assert!(accel.z.abs() < 1e-15);

        let expected_mag = GM_EARTH / (r * r);
        assert!((accel.norm() - expected_mag).abs() / expected_mag < 1e-12);
    }

    #[test]
    fn test_toggles_select_models() {
        let forces = CompositeForce::from_toggles(&PerturbationToggles::all());
        assert_eq!(
            forces.model_names(),
            vec!["Point Mass Gravity", "J2 Oblateness", "Atmospheric Drag", "Third Body"]
        );
    }

    #[test]
    fn test_breakdown_sums_to_total() {
        let snapshot = crate::bodies::catalog::SolarSystemCatalog::builtin().snapshot(0.0);
        let earth = snapshot.get(EARTH).unwrap();
        let r = earth.radius + 300.0;
        let ctx = ForceContext::new(
            Vector3::new(r, 0.0, 0.0),
            Vector3::new(0.0, (earth.gm / r).sqrt(), 0.0),
            VehicleProperties::default(),
            earth,
            &snapshot,
        );
        let forces = CompositeForce::from_toggles(&PerturbationToggles::default());
        let breakdown = forces.acceleration_breakdown(&ctx);
        assert_eq!(breakdown.len(), 3);

        let sum = breakdown.iter().fold(Vector3::zeros(), |acc, (_, a)| acc + a);
        let total = forces.total_acceleration(&ctx);
        assert!((sum - total).norm() <= 1e-15 * total.norm());

        let magnitude = |name: &str| breakdown.iter().find(|(n, _)| *n == name).map(|(_, a)| a.norm()).unwrap();
        assert!(magnitude("Point Mass Gravity") > magnitude("J2 Oblateness"));
        assert!(magnitude("J2 Oblateness") > magnitude("Atmospheric Drag"));
    }

    #[test]
    fn test_deterministic() {
        let snapshot = crate::bodies::catalog::SolarSystemCatalog::builtin().snapshot(0.0);
        let earth = snapshot.get(EARTH).unwrap();
        let ctx = ForceContext::new(
            Vector3::new(6778.0, 10.0, 20.0),
            Vector3::new(0.1, 7.6, 0.3),
            VehicleProperties::default(),
            earth,
            &snapshot,
        );
        let toggles = PerturbationToggles::all();
        let a = total_acceleration(&ctx, &toggles);
        let b = total_acceleration(&ctx, &toggles);
        assert_eq!(a.as_slice(), b.as_slice());
    }
}
