//! Massive bodies and ephemeris snapshots
//!
//! The engine never owns the ephemeris. It receives an [`EphemerisSnapshot`]
//! (a read-only map of bodies at one simulation time) before each batch of
//! propagation work and shares it between workers behind an `Arc`.
//!
//! # Hierarchy
//!
//! Bodies form a tree through their `parent` links (moon → system
//! barycenter → solar-system barycenter, planet → system barycenter). Massless nodes such as
//! barycenters are kept in the tree for frame bookkeeping but never act as
//! a dominant body; [`EphemerisSnapshot::dynamical_parent`] skips over them.

pub mod catalog;
pub mod kepler;

use crate::error::{EngineError, Result};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Guard against malformed (cyclic) parent links
const MAX_HIERARCHY_DEPTH: usize = 64;

/// Body identifier (NAIF numbering in the built-in catalog)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BodyId(pub u32);

impl fmt::Display for BodyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Exponential atmosphere description
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AtmosphereParams {
    /// Density at the reference altitude (kg/km³)
    pub reference_density: f64,
    /// Altitude above the equatorial radius where the reference density holds (km)
    pub reference_altitude: f64,
    /// Density e-folding height (km)
    pub scale_height: f64,
    /// No drag is computed above this altitude (km)
    pub max_altitude: f64,
}

/// Spin state of a body
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationParams {
    /// Unit vector along the north pole in the simulation frame
    pub pole: Vector3<f64>,
    /// Sidereal rotation rate (rad/s), negative for retrograde spin
    pub rate: f64,
}

impl RotationParams {
    pub fn new(pole: Vector3<f64>, rate: f64) -> Self {
        let pole = pole.try_normalize(0.0).unwrap_or_else(|| {
            log::warn!("Degenerate rotation pole, defaulting to +Z");
            Vector3::z()
        });
        Self { pole, rate }
    }

    /// Angular velocity vector ω = rate · pole
    pub fn angular_velocity(&self) -> Vector3<f64> {
        self.pole * self.rate
    }
}

/// A massive body (or massless barycenter) at one instant
#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    pub id: BodyId,
    pub name: String,

    /// Gravitational parameter (km³/s²); zero for barycenters
    pub gm: f64,

    /// Equatorial radius (km)
    pub radius: f64,

    pub j2: Option<f64>,
    pub atmosphere: Option<AtmosphereParams>,
    pub rotation: Option<RotationParams>,

    /// Sphere of influence radius (km); `None` means unbounded
    pub soi_radius: Option<f64>,

    pub parent: Option<BodyId>,

    /// Position in the simulation's inertial frame (km)
    pub position: Vector3<f64>,

    /// Velocity in the simulation's inertial frame (km/s)
    pub velocity: Vector3<f64>,
}

impl Body {
    pub fn new(id: BodyId, name: impl Into<String>, gm: f64, radius: f64) -> Self {
        Self {
            id,
            name: name.into(),
            gm,
            radius,
            j2: None,
            atmosphere: None,
            rotation: None,
            soi_radius: None,
            parent: None,
            position: Vector3::zeros(),
            velocity: Vector3::zeros(),
        }
    }

    pub fn with_parent(mut self, parent: BodyId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_j2(mut self, j2: f64) -> Self {
        self.j2 = Some(j2);
        self
    }

    pub fn with_atmosphere(mut self, atmosphere: AtmosphereParams) -> Self {
        self.atmosphere = Some(atmosphere);
        self
    }

    pub fn with_rotation(mut self, rotation: RotationParams) -> Self {
        self.rotation = Some(rotation);
        self
    }

    pub fn with_soi_radius(mut self, soi_radius: f64) -> Self {
        self.soi_radius = Some(soi_radius);
        self
    }

    pub fn with_state(mut self, position: Vector3<f64>, velocity: Vector3<f64>) -> Self {
        self.position = position;
        self.velocity = velocity;
        self
    }

    /// Whether the body can act as a gravitating / dominant body
    pub fn is_massive(&self) -> bool {
        self.gm > 0.0
    }

    /// Whether a global position lies inside this body's sphere of influence
    pub fn soi_contains(&self, global_position: &Vector3<f64>) -> bool {
        match self.soi_radius {
            Some(radius) => (global_position - self.position).norm() < radius,
            None => true,
        }
    }
}

/// Laplace sphere-of-influence radius a · (m / M)^0.4
pub fn soi_radius(semi_major_axis: f64, gm_body: f64, gm_parent: f64) -> f64 {
    if gm_parent <= 0.0 {
        return f64::INFINITY;
    }
    semi_major_axis * (gm_body / gm_parent).powf(0.4)
}

/// Parent lookups over a body tree
pub trait BodyHierarchy {
    fn parent_of(&self, id: BodyId) -> Option<BodyId>;

    /// The body itself followed by every ancestor up to the root
    fn lineage(&self, id: BodyId) -> Vec<BodyId> {
        let mut chain = vec![id];
        let mut current = id;
        while let Some(parent) = self.parent_of(current) {
            if chain.len() >= MAX_HIERARCHY_DEPTH || chain.contains(&parent) {
                log::warn!("Body hierarchy cycle or excessive depth at {}", parent);
                break;
            }
            chain.push(parent);
            current = parent;
        }
        chain
    }

    /// Whether `ancestor` appears on the parent chain of `id` (or equals it)
    fn is_ancestor_or_self(&self, ancestor: BodyId, id: BodyId) -> bool {
        self.lineage(id).contains(&ancestor)
    }
}

/// Child → parent map, handy for hierarchies without ephemeris data
impl BodyHierarchy for BTreeMap<BodyId, BodyId> {
    fn parent_of(&self, id: BodyId) -> Option<BodyId> {
        self.get(&id).copied()
    }
}

/// Read-only set of bodies at one simulation time
#[derive(Debug, Clone)]
pub struct EphemerisSnapshot {
    /// Simulation time the body states refer to (seconds)
    pub sim_time: f64,
    bodies: BTreeMap<BodyId, Body>,
    dynamical_parents: BTreeMap<BodyId, BodyId>,
    primary: Option<BodyId>,
}

impl BodyHierarchy for EphemerisSnapshot {
    fn parent_of(&self, id: BodyId) -> Option<BodyId> {
        self.bodies.get(&id).and_then(|b| b.parent)
    }
}

impl EphemerisSnapshot {
    /// Build a snapshot from externally supplied bodies
    ///
    /// Massive non-primary bodies without an SOI radius get a Laplace radius
    /// from their osculating semi-major axis about their dynamical parent
    /// (current distance when that relative orbit is open).
    pub fn from_bodies(sim_time: f64, bodies: impl IntoIterator<Item = Body>) -> Self {
        let bodies: BTreeMap<BodyId, Body> = bodies.into_iter().map(|b| (b.id, b)).collect();
        let mut snapshot = Self {
            sim_time,
            bodies,
            dynamical_parents: BTreeMap::new(),
            primary: None,
        };
        snapshot.index_hierarchy();

        let missing: Vec<(BodyId, f64)> = snapshot
            .bodies
            .values()
            .filter(|b| b.is_massive() && b.soi_radius.is_none())
            .filter_map(|b| {
                let parent = snapshot.dynamical_parent(b.id)?;
                let parent = snapshot.bodies.get(&parent)?;
                let rel_pos = b.position - parent.position;
                let rel_vel = b.velocity - parent.velocity;
                let mu = parent.gm + b.gm;
                let energy = 0.5 * rel_vel.norm_squared() - mu / rel_pos.norm();
                let a = if energy < 0.0 {
                    -mu / (2.0 * energy)
                } else {
                    rel_pos.norm()
                };
                Some((b.id, soi_radius(a, b.gm, parent.gm)))
            })
            .collect();
        for (id, radius) in missing {
            if let Some(body) = snapshot.bodies.get_mut(&id) {
                body.soi_radius = Some(radius);
            }
        }

        snapshot
    }

    fn index_hierarchy(&mut self) {
        self.dynamical_parents = self
            .bodies
            .keys()
            .filter_map(|&id| self.find_dynamical_parent(id).map(|p| (id, p)))
            .collect();

        // The primary is the most massive body without a dynamical parent
        self.primary = self
            .bodies
            .values()
            .filter(|b| b.is_massive() && !self.dynamical_parents.contains_key(&b.id))
            .max_by(|a, b| a.gm.total_cmp(&b.gm))
            .map(|b| b.id);
    }

    /// Massive stand-in for a node: itself if massive, else its heaviest child
    fn representative(&self, id: BodyId) -> Option<BodyId> {
        let body = self.bodies.get(&id)?;
        if body.is_massive() {
            return Some(id);
        }
        self.children_of(id)
            .into_iter()
            .filter_map(|c| self.bodies.get(&c))
            .filter(|c| c.is_massive())
            .max_by(|a, b| a.gm.total_cmp(&b.gm))
            .map(|c| c.id)
    }

    fn find_dynamical_parent(&self, id: BodyId) -> Option<BodyId> {
        self.lineage(id)
            .into_iter()
            .skip(1)
            .filter_map(|ancestor| self.representative(ancestor))
            .find(|&rep| rep != id)
    }

    pub fn get(&self, id: BodyId) -> Option<&Body> {
        self.bodies.get(&id)
    }

    /// Look up a body, failing with [`EngineError::MissingBody`]
    pub fn require(&self, id: BodyId) -> Result<&Body> {
        self.bodies.get(&id).ok_or(EngineError::MissingBody(id))
    }

    pub fn contains(&self, id: BodyId) -> bool {
        self.bodies.contains_key(&id)
    }

    pub fn bodies(&self) -> impl Iterator<Item = &Body> {
        self.bodies.values()
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// Direct children in the parent tree
    pub fn children_of(&self, id: BodyId) -> Vec<BodyId> {
        self.bodies
            .values()
            .filter(|b| b.parent == Some(id))
            .map(|b| b.id)
            .collect()
    }

    /// Ancestors of `id`, nearest first, excluding the body itself
    pub fn ancestors(&self, id: BodyId) -> Vec<BodyId> {
        self.lineage(id).into_iter().skip(1).collect()
    }

    /// Massive body this body orbits, skipping barycenters
    pub fn dynamical_parent(&self, id: BodyId) -> Option<BodyId> {
        self.dynamical_parents.get(&id).copied()
    }

    /// Massive bodies whose dynamical parent is `id`
    pub fn satellites_of(&self, id: BodyId) -> impl Iterator<Item = &Body> + '_ {
        self.bodies
            .values()
            .filter(move |b| b.is_massive() && self.dynamical_parent(b.id) == Some(id))
    }

    /// Root of the dominance tree (the Sun in the built-in catalog)
    pub fn primary(&self) -> Option<BodyId> {
        self.primary
    }

    pub fn global_position(&self, id: BodyId) -> Result<Vector3<f64>> {
        self.require(id).map(|b| b.position)
    }

    pub fn global_velocity(&self, id: BodyId) -> Result<Vector3<f64>> {
        self.require(id).map(|b| b.velocity)
    }

    /// Copy of this snapshot extrapolated `dt` seconds along two-body conics
    ///
    /// Each massive body follows its conic about its dynamical parent; a
    /// massless node keeps its offset from its representative.
    pub fn advanced(&self, dt: f64) -> Self {
        if dt == 0.0 {
            return self.clone();
        }

        let mut states: BTreeMap<BodyId, (Vector3<f64>, Vector3<f64>)> = BTreeMap::new();
        for &id in self.bodies.keys() {
            let mut visiting = BTreeSet::new();
            self.advance_body(id, dt, &mut states, &mut visiting);
        }

        let mut next = self.clone();
        next.sim_time = self.sim_time + dt;
        for (id, (position, velocity)) in states {
            if let Some(body) = next.bodies.get_mut(&id) {
                body.position = position;
                body.velocity = velocity;
            }
        }
        next
    }

    fn advance_body(
        &self,
        id: BodyId,
        dt: f64,
        states: &mut BTreeMap<BodyId, (Vector3<f64>, Vector3<f64>)>,
        visiting: &mut BTreeSet<BodyId>,
    ) -> (Vector3<f64>, Vector3<f64>) {
        if let Some(state) = states.get(&id) {
            return *state;
        }
        let Some(body) = self.bodies.get(&id) else {
            return (Vector3::zeros(), Vector3::zeros());
        };
        let drift = (body.position + body.velocity * dt, body.velocity);
        if !visiting.insert(id) {
            log::warn!("Cyclic ephemeris dependency at {}, drifting linearly", id);
            return drift;
        }

        let anchor = if body.is_massive() {
            self.dynamical_parent(id)
        } else {
            self.representative(id).filter(|&rep| rep != id)
        };

        let state = match anchor.and_then(|a| self.bodies.get(&a)) {
            Some(anchor_body) => {
                let (anchor_pos, anchor_vel) = self.advance_body(anchor_body.id, dt, states, visiting);
                let rel_pos = body.position - anchor_body.position;
                let rel_vel = body.velocity - anchor_body.velocity;
                if body.is_massive() {
                    let mu = anchor_body.gm + body.gm;
                    let (p, v) = kepler::propagate_universal(&rel_pos, &rel_vel, mu, dt);
                    (anchor_pos + p, anchor_vel + v)
                } else {
                    (anchor_pos + rel_pos, anchor_vel + rel_vel)
                }
            }
            None => drift,
        };

        states.insert(id, state);
        state
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_relative_eq;

    pub const EARTH: BodyId = BodyId(399);
    pub const MOON: BodyId = BodyId(301);
    pub const SUN: BodyId = BodyId(10);
    pub const SSB: BodyId = BodyId(0);
    pub const EMB: BodyId = BodyId(3);

    pub const GM_EARTH: f64 = 398_600.4;
    pub const GM_MOON: f64 = 4_902.800066;
    pub const GM_SUN: f64 = 1.327_124_400_18e11;

    /// Earth alone at the origin, unbounded SOI
    pub fn earth_only() -> EphemerisSnapshot {
        EphemerisSnapshot::from_bodies(
            0.0,
            [Body::new(EARTH, "Earth", GM_EARTH, 6378.1366).with_j2(1.082_626_68e-3)],
        )
    }

    /// Sun / Earth-Moon barycenter / Earth / Moon, with the Moon on +X of Earth
    pub fn sun_earth_moon() -> EphemerisSnapshot {
        let au = 149_598_023.0;
        let earth_pos = Vector3::new(au, 0.0, 0.0);
        let earth_vel = Vector3::new(0.0, (GM_SUN / au).sqrt(), 0.0);
        let moon_rel = Vector3::new(384_400.0, 0.0, 0.0);
        let moon_vel = Vector3::new(0.0, (GM_EARTH / 384_400.0).sqrt(), 0.0);

        EphemerisSnapshot::from_bodies(
            0.0,
            [
                Body::new(SSB, "Solar System Barycenter", 0.0, 0.0),
                Body::new(SUN, "Sun", GM_SUN, 695_700.0).with_parent(SSB),
                Body::new(EMB, "Earth Barycenter", 0.0, 0.0)
                    .with_parent(SSB)
                    .with_state(earth_pos, earth_vel),
                Body::new(EARTH, "Earth", GM_EARTH, 6378.1366)
                    .with_parent(EMB)
                    .with_j2(1.082_626_68e-3)
                    .with_state(earth_pos, earth_vel),
                Body::new(MOON, "Moon", GM_MOON, 1737.4)
                    .with_parent(EMB)
                    .with_state(earth_pos + moon_rel, earth_vel + moon_vel),
            ],
        )
    }

    #[test]
    fn test_dynamical_parents_skip_barycenters() {
        let snapshot = sun_earth_moon();
        assert_eq!(snapshot.primary(), Some(SUN));
        assert_eq!(snapshot.dynamical_parent(EARTH), Some(SUN));
        assert_eq!(snapshot.dynamical_parent(MOON), Some(EARTH));
        assert_eq!(snapshot.dynamical_parent(SUN), None);
        assert_eq!(snapshot.ancestors(MOON), vec![EMB, SSB]);

        let sats: Vec<BodyId> = snapshot.satellites_of(SUN).map(|b| b.id).collect();
        assert_eq!(sats, vec![EARTH]);
        let sats: Vec<BodyId> = snapshot.satellites_of(EARTH).map(|b| b.id).collect();
        assert_eq!(sats, vec![MOON]);
    }

    #[test]
    fn test_soi_radii_filled_from_distance() {
        let snapshot = sun_earth_moon();
        let earth_soi = snapshot.get(EARTH).unwrap().soi_radius.unwrap();
        // Earth's Laplace SOI is roughly 925 000 km
        assert!((earth_soi - 925_000.0).abs() < 10_000.0);
        assert!(snapshot.get(SUN).unwrap().soi_radius.is_none());
    }

    #[test]
    fn test_missing_body() {
        let snapshot = earth_only();
        assert_eq!(
            snapshot.require(BodyId(42)).unwrap_err(),
            EngineError::MissingBody(BodyId(42))
        );
    }

    #[test]
    fn test_advanced_keeps_moon_distance() {
        let snapshot = sun_earth_moon();
        let later = snapshot.advanced(86_400.0);
        assert_eq!(later.sim_time, 86_400.0);

        let earth = later.get(EARTH).unwrap();
        let moon = later.get(MOON).unwrap();
        assert_relative_eq!((moon.position - earth.position).norm(), 384_400.0, max_relative = 1e-3);

        // Barycenter stays glued to Earth (its heaviest child)
        let emb = later.get(EMB).unwrap();
        assert_relative_eq!(emb.position, earth.position, epsilon = 1e-6);
    }

    #[test]
    fn test_lineage_map_hierarchy() {
        let mut tree = BTreeMap::new();
        tree.insert(MOON, EARTH);
        tree.insert(EARTH, EMB);
        tree.insert(EMB, SSB);
        assert_eq!(tree.lineage(MOON), vec![MOON, EARTH, EMB, SSB]);
        assert!(tree.is_ancestor_or_self(EMB, MOON));
        assert!(!tree.is_ancestor_or_self(MOON, EARTH));
    }
}
