//! Numerical integrators for orbit propagation
//!
//! Trait-based so the stepper can swap methods without touching the force
//! or SOI logic around it.
//!
//! # Available Integrators
//!
//! - **NativeRK4**: classic fixed-step Runge-Kutta 4 (default)

use crate::propagation::state::OrbitalState;
use nalgebra::Vector3;

/// Derivative function: state → (ṙ, v̇)
pub type Derivatives<'a> = dyn Fn(&OrbitalState) -> (Vector3<f64>, Vector3<f64>) + 'a;

/// Trait for numerical integrators
///
/// Implementations must be `Send + Sync` so one instance can be shared by
/// every pool worker.
pub trait Integrator: Send + Sync {
    /// Take a single integration step of `dt` seconds
    fn step(&self, state: &OrbitalState, dt: f64, derivatives: &Derivatives) -> OrbitalState;

    /// Integrator name
    fn name(&self) -> &'static str;

    /// Integrator order (for error estimation)
    fn order(&self) -> u8;

    /// Number of function evaluations per step
    fn stages(&self) -> usize;

    /// Advance by `duration` using `steps` equal substeps
    fn advance(
        &self,
        state: &OrbitalState,
        duration: f64,
        steps: usize,
        derivatives: &Derivatives,
    ) -> OrbitalState {
        let steps = steps.max(1);
        let dt = duration / steps as f64;
        let start = state.time;
        let mut current = *state;
        for i in 0..steps {
            current = self.step(&current, dt, derivatives);
            // Pin the clock to the grid so rounding does not accumulate
            current.time = start + dt * (i + 1) as f64;
        }
        current.time = start + duration;
        current
    }
}

/// Fixed-step Runge-Kutta 4
///
/// Stateless; step size control is the caller's job.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeRK4;

impl NativeRK4 {
    pub fn new() -> Self {
        Self
    }

    /// RK4 step
    fn rk4_step(&self, state: &OrbitalState, dt: f64, derivatives: &Derivatives) -> OrbitalState {
        let (v1, a1) = derivatives(state);

        let s2 = OrbitalState::new(
            state.position + v1 * (dt / 2.0),
            state.velocity + a1 * (dt / 2.0),
            state.time + dt / 2.0,
        );
        let (v2, a2) = derivatives(&s2);

        let s3 = OrbitalState::new(
            state.position + v2 * (dt / 2.0),
            state.velocity + a2 * (dt / 2.0),
            state.time + dt / 2.0,
        );
        let (v3, a3) = derivatives(&s3);

        let s4 = OrbitalState::new(
            state.position + v3 * dt,
            state.velocity + a3 * dt,
            state.time + dt,
        );
        let (v4, a4) = derivatives(&s4);

        let new_pos = state.position + (v1 + 2.0 * v2 + 2.0 * v3 + v4) * (dt / 6.0);
        let new_vel = state.velocity + (a1 + 2.0 * a2 + 2.0 * a3 + a4) * (dt / 6.0);

        OrbitalState::new(new_pos, new_vel, state.time + dt)
    }
}

impl Integrator for NativeRK4 {
    fn step(&self, state: &OrbitalState, dt: f64, derivatives: &Derivatives) -> OrbitalState {
        self.rk4_step(state, dt, derivatives)
    }

    fn name(&self) -> &'static str {
        "Native RK4"
    }

    fn order(&self) -> u8 {
        4
    }

    fn stages(&self) -> usize {
        4
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::TAU;

    const MU: f64 = 398_600.4;

    fn two_body(s: &OrbitalState) -> (Vector3<f64>, Vector3<f64>) {
        let r = s.position.norm();
        (s.velocity, -MU / (r * r * r) * s.position)
    }

    #[test]
    fn test_rk_circular_orbit() {
        let integrator = NativeRK4::new();

        let r = 6778.0;
        let v = (MU / r).sqrt();
        let state = OrbitalState::new(Vector3::new(r, 0.0, 0.0), Vector3::new(0.0, v, 0.0), 0.0);

        // Take one step
        let new_state = integrator.step(&state, 60.0, &two_body);

        // Radius should be approximately preserved (circular orbit)
        let new_r = new_state.position.norm();
        assert!((new_r - r).abs() / r < 1e-6);

        // Speed should be approximately preserved
        let new_v = new_state.velocity.norm();
        assert!((new_v - v).abs() / v < 1e-6);
        assert_eq!(new_state.time, 60.0);
    }

    #[test]
    fn test_energy_conserved_over_period() {
        let r: f64 = 7000.0;
        let v = (MU / r).sqrt();
        let period = TAU * (r.powi(3) / MU).sqrt();
        let state = OrbitalState::new(Vector3::new(r, 0.0, 0.0), Vector3::new(0.0, v, 0.0), 0.0);

        let end = NativeRK4.advance(&state, period, 720, &two_body);

        let e0 = state.specific_energy(MU);
        let e1 = end.specific_energy(MU);
        assert!(((e1 - e0) / e0).abs() < 1e-6, "relative energy error {}", (e1 - e0) / e0);
        assert!((end.position - state.position).norm() < 1.0);
        assert_eq!(end.time, period);
    }
}
