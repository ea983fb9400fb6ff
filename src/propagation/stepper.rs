//! Sample-by-sample integration driver
//!
//! Wraps an [`Integrator`] with everything that happens between raw RK
//! steps: substepping, maneuver execution, SOI re-centering, impact and
//! non-finite detection. Body positions are refreshed from the base
//! snapshot once per output sample and held fixed within the interval, so
//! the same inputs always produce the same samples.

use super::forces::{CompositeForce, ForceContext};
use super::integrator::{Integrator, NativeRK4};
use super::maneuver::apply_delta_v;
use super::soi::recenter;
use super::state::{Maneuver, OrbitalState, PerturbationToggles, TrajectorySample, VehicleProperties};
use crate::bodies::{BodyId, EphemerisSnapshot};
use crate::error::{EngineError, Result};
use std::collections::VecDeque;
use std::sync::Arc;

/// What one call to [`Stepper::next_sample`] produced
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepOutcome {
    /// Regular sample on the output grid
    Sample(TrajectorySample),

    /// The vehicle went below the dominant body's surface; last sample
    Impact(TrajectorySample),
}

impl StepOutcome {
    pub fn sample(&self) -> &TrajectorySample {
        match self {
            StepOutcome::Sample(s) | StepOutcome::Impact(s) => s,
        }
    }
}

/// Fixed-grid propagation state machine
pub struct Stepper {
    integrator: Box<dyn Integrator>,
    forces: CompositeForce,
    base: Arc<EphemerisSnapshot>,
    snapshot: EphemerisSnapshot,

    /// Absolute simulation time at elapsed time zero
    epoch: f64,
    properties: VehicleProperties,
    state: OrbitalState,
    dominant: BodyId,

    /// Pending burns, elapsed-time keyed and ordered
    maneuvers: VecDeque<Maneuver>,
    time_step: f64,
    substeps: usize,

    /// Grid origin and number of intervals taken so far
    grid_start: f64,
    intervals: usize,
    pending_flags: (bool, bool),
}

impl Stepper {
    /// Stepper starting from a body-relative state
    ///
    /// `epoch` is the absolute simulation time that `initial.time == 0`
    /// corresponds to; `initial.time` may be later (extension runs).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        base: Arc<EphemerisSnapshot>,
        epoch: f64,
        initial: OrbitalState,
        dominant: BodyId,
        properties: VehicleProperties,
        toggles: &PerturbationToggles,
        time_step: f64,
        substeps: usize,
    ) -> Result<Self> {
        if time_step <= 0.0 || !time_step.is_finite() {
            return Err(EngineError::InvalidRequest(format!("time step must be positive, got {}", time_step)));
        }
        if !initial.is_finite() {
            return Err(EngineError::InvalidRequest("initial state is not finite".into()));
        }
        base.require(dominant)?;

        let snapshot = base.advanced(epoch + initial.time - base.sim_time);
        Ok(Self {
            integrator: Box::new(NativeRK4::new()),
            forces: CompositeForce::from_toggles(toggles),
            base,
            snapshot,
            epoch,
            properties,
            state: initial,
            dominant,
            maneuvers: VecDeque::new(),
            time_step,
            substeps: substeps.max(1),
            grid_start: initial.time,
            intervals: 0,
            pending_flags: (false, false),
        })
    }

    /// Swap the integration method
    pub fn with_integrator(mut self, integrator: Box<dyn Integrator>) -> Self {
        self.integrator = integrator;
        self
    }

    /// Schedule burns (absolute simulation times)
    ///
    /// Burns due at or before the current time fire immediately, so they
    /// are reflected in the first sample.
    pub fn with_maneuvers<'m>(mut self, maneuvers: impl IntoIterator<Item = &'m Maneuver>) -> Self {
        let epoch = self.epoch;
        let mut pending: Vec<Maneuver> = maneuvers
            .into_iter()
            .map(|m| Maneuver {
                time: m.time - epoch,
                ..*m
            })
            .collect();
        pending.sort_by(|a, b| a.time.total_cmp(&b.time));
        self.maneuvers = pending.into();
        self.fire_due_maneuvers(self.state.time);
        self
    }

    pub fn state(&self) -> &OrbitalState {
        &self.state
    }

    pub fn dominant(&self) -> BodyId {
        self.dominant
    }

    /// Body states at the start of the current interval
    pub fn snapshot(&self) -> &EphemerisSnapshot {
        &self.snapshot
    }

    pub fn integrator_name(&self) -> &'static str {
        self.integrator.name()
    }

    /// Sample for the current state, consuming any pending SOI flags
    pub fn current_sample(&mut self) -> TrajectorySample {
        let (entered_soi, exited_soi) = std::mem::take(&mut self.pending_flags);
        TrajectorySample {
            entered_soi,
            exited_soi,
            ..TrajectorySample::new(&self.state, self.dominant)
        }
    }

    /// Integrate to the next grid point
    pub fn next_sample(&mut self) -> Result<StepOutcome> {
        let t_end = self.grid_start + (self.intervals + 1) as f64 * self.time_step;
        self.snapshot = self.base.advanced(self.epoch + self.state.time - self.base.sim_time);

        let mut cursor = self.state.time;
        loop {
            self.fire_due_maneuvers(cursor);
            if cursor >= t_end {
                break;
            }
            let segment_end = self.maneuvers.front().map_or(t_end, |m| m.time.min(t_end));
            if self.integrate_segment(cursor, segment_end)? {
                return Ok(StepOutcome::Impact(self.current_sample()));
            }
            cursor = segment_end;
        }

        self.intervals += 1;
        Ok(StepOutcome::Sample(self.current_sample()))
    }

    fn fire_due_maneuvers(&mut self, now: f64) {
        while let Some(maneuver) = self.maneuvers.front().copied() {
            if maneuver.time > now {
                break;
            }
            self.maneuvers.pop_front();
            log::debug!(
                "Executing maneuver {} at t={:.1}s (|dv| = {:.4} km/s)",
                maneuver.id,
                self.state.time,
                maneuver.delta_v.magnitude()
            );
            self.state = apply_delta_v(&self.state, &maneuver.delta_v);
        }
    }

    /// Substep from `from` to `to`; returns true on impact
    fn integrate_segment(&mut self, from: f64, to: f64) -> Result<bool> {
        let span = to - from;
        let steps = ((self.substeps as f64 * span / self.time_step).ceil() as usize).max(1);
        let dt = span / steps as f64;

        for i in 0..steps {
            let mut next = {
                let dominant = self.snapshot.require(self.dominant)?;
                let forces = &self.forces;
                let snapshot = &self.snapshot;
                let properties = self.properties;
                let derivatives = |s: &OrbitalState| {
                    let ctx = ForceContext::new(s.position, s.velocity, properties, dominant, snapshot);
                    (s.velocity, forces.total_acceleration(&ctx))
                };
                self.integrator.step(&self.state, dt, &derivatives)
            };
            next.time = if i + 1 == steps { to } else { from + dt * (i + 1) as f64 };

            if !next.is_finite() {
                log::error!("Non-finite state at t={:.3}s around {}", next.time, self.dominant);
                return Err(EngineError::NumericalFailure { time: next.time });
            }

            let moved = recenter(&self.snapshot, &next, self.dominant)?;
            self.state = moved.state;
            self.dominant = moved.dominant;
            self.pending_flags.0 |= moved.entered_soi;
            self.pending_flags.1 |= moved.exited_soi;

            let body = self.snapshot.require(self.dominant)?;
            if self.state.radius() < body.radius {
                log::debug!("Impact with {} at t={:.1}s", body.name, self.state.time);
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bodies::tests::{earth_only, EARTH, GM_EARTH};
    use crate::propagation::integrator::Derivatives;
    use crate::propagation::state::ManeuverDeltaV;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;
    use std::f64::consts::TAU;

    fn circular(r: f64) -> OrbitalState {
        OrbitalState::new(Vector3::new(r, 0.0, 0.0), Vector3::new(0.0, (GM_EARTH / r).sqrt(), 0.0), 0.0)
    }

    fn stepper(initial: OrbitalState, dt: f64) -> Stepper {
        Stepper::new(
            Arc::new(earth_only()),
            0.0,
            initial,
            EARTH,
            VehicleProperties::default(),
            &PerturbationToggles::none(),
            dt,
            4,
        )
        .unwrap()
    }

    #[test]
    fn test_samples_on_grid() {
        let mut s = stepper(circular(7000.0), 30.0);
        assert_eq!(s.current_sample().time, 0.0);
        for k in 1..=10 {
            let outcome = s.next_sample().unwrap();
            assert!(matches!(outcome, StepOutcome::Sample(_)));
            assert_eq!(outcome.sample().time, 30.0 * k as f64);
            assert_eq!(outcome.sample().dominant_body, EARTH);
        }
    }

    #[test]
    fn test_energy_over_one_period() {
        let r: f64 = 7000.0;
        let period = TAU * (r.powi(3) / GM_EARTH).sqrt();
        let mut s = stepper(circular(r), period / 180.0);
        let e0 = s.state().specific_energy(GM_EARTH);
        let mut last = s.current_sample();
        for _ in 0..180 {
            last = *s.next_sample().unwrap().sample();
        }
        let e1 = last.orbital_state().specific_energy(GM_EARTH);
        assert!(((e1 - e0) / e0).abs() < 1e-6);
        assert_relative_eq!(last.time, period, max_relative = 1e-12);
    }

    #[test]
    fn test_impact_terminates() {
        // Starts just above the surface falling straight down
        let initial = OrbitalState::new(Vector3::new(6400.0, 0.0, 0.0), Vector3::new(-2.0, 0.0, 0.0), 0.0);
        let mut s = stepper(initial, 10.0);
        let mut outcome = s.next_sample().unwrap();
        for _ in 0..10 {
            if matches!(outcome, StepOutcome::Impact(_)) {
                break;
            }
            outcome = s.next_sample().unwrap();
        }
        assert!(matches!(outcome, StepOutcome::Impact(_)));
        assert!(outcome.sample().position.norm() < 6378.1366);
    }

    #[test]
    fn test_maneuver_at_start_fires_before_first_sample() {
        let burn = Maneuver::new(1, 0.0, ManeuverDeltaV::prograde(0.5));
        let initial = circular(7000.0);
        let mut s = stepper(initial, 60.0).with_maneuvers([&burn]);
        let first = s.current_sample();
        assert_relative_eq!(first.velocity.norm(), initial.speed() + 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_maneuver_matches_coast() {
        let initial = circular(7000.0);
        let burn = Maneuver::new(1, 95.0, ManeuverDeltaV::default());

        let mut coast = stepper(initial, 60.0);
        let mut burned = stepper(initial, 60.0).with_maneuvers([&burn]);
        for _ in 0..20 {
            let a = *coast.next_sample().unwrap().sample();
            let b = *burned.next_sample().unwrap().sample();
            assert_eq!(a.time, b.time);
            assert!((a.position - b.position).norm() < 1e-3);
        }
    }

    /// Explicit Euler that blows up after a few steps
    struct Diverging;

    impl Integrator for Diverging {
        fn step(&self, state: &OrbitalState, dt: f64, derivatives: &Derivatives) -> OrbitalState {
            let (dr, dv) = derivatives(state);
            let scale = if state.time >= 20.0 { f64::INFINITY } else { 1.0 };
            OrbitalState::new(state.position + dr * dt * scale, state.velocity + dv * dt, state.time + dt)
        }

        fn name(&self) -> &'static str {
            "Diverging Euler"
        }

        fn order(&self) -> u8 {
            1
        }

        fn stages(&self) -> usize {
            1
        }
    }

    #[test]
    fn test_non_finite_state_is_numerical_failure() {
        let mut s = stepper(circular(7000.0), 10.0).with_integrator(Box::new(Diverging));
        assert_eq!(s.integrator_name(), "Diverging Euler");

        // Two clean samples before the integrator diverges
        assert!(matches!(s.next_sample().unwrap(), StepOutcome::Sample(_)));
        assert!(matches!(s.next_sample().unwrap(), StepOutcome::Sample(_)));
        match s.next_sample() {
            Err(EngineError::NumericalFailure { time }) => assert!(time > 20.0 && time <= 30.0),
            other => panic!("expected numerical failure, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_bad_step() {
        let result = Stepper::new(
            Arc::new(earth_only()),
            0.0,
            circular(7000.0),
            EARTH,
            VehicleProperties::default(),
            &PerturbationToggles::none(),
            0.0,
            4,
        );
        assert!(matches!(result, Err(EngineError::InvalidRequest(_))));
    }
}
