//! Orbit propagation and scheduling engine
//!
//! Predicts trajectories for many vehicles around a hierarchy of massive
//! bodies, off the caller's thread, with a per-vehicle trajectory cache and
//! SOI-aware segmenting for display.
//!
//! Data flows caller → [`scheduler::JobScheduler`] → [`cache::TrajectoryCache`]
//! → worker pool running [`propagation::PropagationRun`]s → chunks back to a
//! [`scheduler::JobObserver`].

pub mod bodies;
pub mod cache;
pub mod config;
pub mod error;
pub mod propagation;
pub mod scheduler;
pub mod transitions;

pub use bodies::{Body, BodyId, EphemerisSnapshot};
pub use config::EngineConfig;
pub use error::{EngineError, Result};
