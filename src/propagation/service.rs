//! Propagation service
//!
//! Turns a [`PropagationRequest`] into a lazy, restartable sequence of
//! sample chunks. The same code runs inside pool workers and on the
//! calling thread when the scheduler falls back to synchronous work.

use super::state::{OrbitalState, PerturbationToggles, TrajectorySample, VehicleId, VehicleState};
use super::stepper::{StepOutcome, Stepper};
use crate::bodies::{BodyId, EphemerisSnapshot};
use crate::error::{EngineError, Result};
use crate::transitions::SoiTransition;
use std::sync::Arc;

/// How the run is seeded and which maneuvers it honours
#[derive(Debug, Clone, PartialEq)]
pub enum PropagationMode {
    /// From the vehicle's current state, coasting
    Fresh,

    /// Continue after `seed`, the last sample of earlier coverage
    Extension { seed: TrajectorySample },

    /// From the vehicle's current state, executing its maneuver plan
    ManeuverChained,
}

/// Everything needed to propagate one vehicle
#[derive(Debug, Clone, PartialEq)]
pub struct PropagationRequest {
    pub vehicle: VehicleId,

    /// Vehicle state at elapsed time zero, maneuver plan included
    pub initial: VehicleState,

    /// Absolute simulation time of elapsed time zero
    pub start_time: f64,

    /// Elapsed time the trajectory should reach (s)
    pub duration: f64,

    /// Output sample spacing (s)
    pub time_step: f64,

    /// RK4 substeps per output interval
    pub substeps: usize,

    pub perturbations: PerturbationToggles,
    pub mode: PropagationMode,

    /// Caller-supplied identity of the inputs, stored with cached results
    pub state_hash: u64,
}

impl PropagationRequest {
    pub fn new(vehicle: VehicleId, initial: VehicleState, start_time: f64, duration: f64, time_step: f64) -> Self {
        Self {
            vehicle,
            initial,
            start_time,
            duration,
            time_step,
            substeps: 4,
            perturbations: PerturbationToggles::default(),
            mode: PropagationMode::Fresh,
            state_hash: 0,
        }
    }

    pub fn with_mode(mut self, mode: PropagationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_perturbations(mut self, perturbations: PerturbationToggles) -> Self {
        self.perturbations = perturbations;
        self
    }

    pub fn with_substeps(mut self, substeps: usize) -> Self {
        self.substeps = substeps;
        self
    }

    pub fn with_state_hash(mut self, state_hash: u64) -> Self {
        self.state_hash = state_hash;
        self
    }

    /// Body the run starts relative to
    pub fn start_body(&self) -> BodyId {
        match &self.mode {
            PropagationMode::Extension { seed } => seed.dominant_body,
            _ => self.initial.dominant_body,
        }
    }

    /// Elapsed time of the first state the run integrates from
    pub fn start_elapsed(&self) -> f64 {
        match &self.mode {
            PropagationMode::Extension { seed } => seed.time,
            _ => 0.0,
        }
    }

    /// Number of samples this request produces
    ///
    /// Fresh and chained runs include the t = 0 sample; extensions only
    /// emit what lies after the seed.
    pub fn expected_samples(&self) -> usize {
        let intervals = |span: f64| (span / self.time_step).round().max(0.0) as usize;
        match &self.mode {
            PropagationMode::Extension { seed } => intervals(self.duration - seed.time),
            _ => intervals(self.duration) + 1,
        }
    }

    /// Reject malformed requests and unknown bodies before dispatch
    pub fn validate(&self, snapshot: &EphemerisSnapshot) -> Result<()> {
        if self.time_step <= 0.0 || !self.time_step.is_finite() {
            return Err(EngineError::InvalidRequest(format!(
                "time step must be positive, got {}",
                self.time_step
            )));
        }
        if self.duration < 0.0 || !self.duration.is_finite() {
            return Err(EngineError::InvalidRequest(format!(
                "duration must be non-negative, got {}",
                self.duration
            )));
        }
        snapshot.require(self.start_body())?;
        Ok(())
    }

    fn initial_state(&self) -> OrbitalState {
        match &self.mode {
            PropagationMode::Extension { seed } => seed.orbital_state(),
            _ => self.initial.orbital_state(),
        }
    }

    fn build_stepper(&self, snapshot: Arc<EphemerisSnapshot>) -> Result<Stepper> {
        let stepper = Stepper::new(
            snapshot,
            self.start_time,
            self.initial_state(),
            self.start_body(),
            self.initial.properties,
            &self.perturbations,
            self.time_step,
            self.substeps,
        )?;

        let from = self.start_time + self.start_elapsed();
        let plan = self.initial.maneuvers();
        Ok(match &self.mode {
            PropagationMode::Fresh => stepper,
            PropagationMode::ManeuverChained => stepper.with_maneuvers(plan.iter().filter(|m| m.time >= from)),
            PropagationMode::Extension { .. } => stepper.with_maneuvers(plan.iter().filter(|m| m.time > from)),
        })
    }
}

/// Why a run stopped
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Termination {
    /// Reached the requested duration
    Completed,

    /// Went below the surface of `body` at elapsed `time`
    Impact { body: BodyId, time: f64 },
}

/// One delivery of samples
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PropagationChunk {
    pub samples: Vec<TrajectorySample>,

    /// Body changes, indexed into the run's overall sample sequence
    pub transitions: Vec<SoiTransition>,

    pub is_complete: bool,

    /// Set on the final chunk
    pub termination: Option<Termination>,
}

impl PropagationChunk {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn last_time(&self) -> Option<f64> {
        self.samples.last().map(|s| s.time)
    }
}

/// Lazy chunked propagation
///
/// Yields `Ok` chunks until one has `is_complete` set, or a single `Err`
/// on numerical failure, then `None`.
pub struct PropagationRun {
    request: PropagationRequest,
    snapshot: Arc<EphemerisSnapshot>,
    chunk_size: usize,
    stepper: Stepper,
    total: usize,
    emitted: usize,
    last_body: BodyId,
    finished: bool,
}

impl PropagationRun {
    pub fn new(request: PropagationRequest, snapshot: Arc<EphemerisSnapshot>, chunk_size: usize) -> Result<Self> {
        request.validate(&snapshot)?;
        let stepper = request.build_stepper(snapshot.clone())?;
        let total = request.expected_samples();
        let last_body = request.start_body();
        Ok(Self {
            request,
            snapshot,
            chunk_size: chunk_size.max(1),
            stepper,
            total,
            emitted: 0,
            last_body,
            finished: false,
        })
    }

    pub fn request(&self) -> &PropagationRequest {
        &self.request
    }

    pub fn total_samples(&self) -> usize {
        self.total
    }

    pub fn emitted(&self) -> usize {
        self.emitted
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Rewind to the beginning; the next chunk starts from the first sample again
    pub fn restart(&mut self) -> Result<()> {
        self.stepper = self.request.build_stepper(self.snapshot.clone())?;
        self.emitted = 0;
        self.last_body = self.request.start_body();
        self.finished = false;
        Ok(())
    }

    fn includes_initial(&self) -> bool {
        !matches!(self.request.mode, PropagationMode::Extension { .. })
    }

    fn produce_chunk(&mut self) -> Result<PropagationChunk> {
        let mut chunk = PropagationChunk {
            samples: Vec::with_capacity(self.chunk_size.min(self.total - self.emitted)),
            ..Default::default()
        };

        if self.emitted == 0 && self.includes_initial() && self.total > 0 {
            chunk.samples.push(self.stepper.current_sample());
        }

        while chunk.samples.len() < self.chunk_size && self.emitted + chunk.samples.len() < self.total {
            match self.stepper.next_sample()? {
                StepOutcome::Sample(sample) => chunk.samples.push(sample),
                StepOutcome::Impact(sample) => {
                    chunk.samples.push(sample);
                    chunk.termination = Some(Termination::Impact {
                        body: sample.dominant_body,
                        time: sample.time,
                    });
                    break;
                }
            }
        }

        for (offset, sample) in chunk.samples.iter().enumerate() {
            if sample.dominant_body != self.last_body {
                chunk.transitions.push(SoiTransition {
                    index: self.emitted + offset,
                    time: sample.time,
                    from: self.last_body,
                    to: sample.dominant_body,
                });
                self.last_body = sample.dominant_body;
            }
        }

        self.emitted += chunk.samples.len();
        if chunk.termination.is_none() && self.emitted >= self.total {
            chunk.termination = Some(Termination::Completed);
        }
        chunk.is_complete = chunk.termination.is_some();
        Ok(chunk)
    }
}

impl Iterator for PropagationRun {
    type Item = Result<PropagationChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let result = self.produce_chunk();
        match &result {
            Ok(chunk) => self.finished = chunk.is_complete,
            Err(_) => self.finished = true,
        }
        Some(result)
    }
}

/// Run a request to completion as a single chunk
pub fn propagate_all(request: PropagationRequest, snapshot: Arc<EphemerisSnapshot>) -> Result<PropagationChunk> {
    let mut merged = PropagationChunk::default();
    for chunk in PropagationRun::new(request, snapshot, usize::MAX)? {
        let chunk = chunk?;
        merged.samples.extend(chunk.samples);
        merged.transitions.extend(chunk.transitions);
        merged.is_complete = chunk.is_complete;
        merged.termination = chunk.termination;
    }
    Ok(merged)
}
