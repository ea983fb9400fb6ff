//! Orbit propagation
//!
//! Layered bottom-up:
//!
//! - `forces` / `atmosphere`: instantaneous acceleration on a vehicle
//! - `analyzer`: orbit classification and sizing hints
//! - `integrator`: RK4 stepping over a derivative closure
//! - `soi` / `maneuver`: frame switching and impulsive burns
//! - `stepper`: sample-grid driver combining the above
//! - `service`: request-level chunked runs, shared by workers and the
//!   synchronous fallback
//!
//! # Example
//!
//! ```ignore
//! use orbit_engine::propagation::service::{propagate_all, PropagationRequest};
//!
//! let request = PropagationRequest::new(vehicle_id, vehicle, 0.0, period, period / 179.0);
//! let trajectory = propagate_all(request, snapshot)?;
//! ```

pub mod analyzer;
pub mod atmosphere;
pub mod forces;
pub mod integrator;
pub mod maneuver;
pub mod service;
pub mod soi;
pub mod state;
pub mod stepper;

pub use service::{propagate_all, PropagationChunk, PropagationMode, PropagationRequest, PropagationRun, Termination};
pub use state::{
    Maneuver, ManeuverDeltaV, OrbitalState, PerturbationToggles, TrajectorySample, VehicleId, VehicleProperties,
    VehicleState,
};
