//! Job scheduling for orbit updates
//!
//! The [`JobScheduler`] sits between callers asking for trajectories and
//! the worker pool computing them:
//!
//! 1. consult the [`TrajectoryCache`] (hit, extend, or miss)
//! 2. build a [`PropagationRequest`] sized by the orbit analyzer
//! 3. hand it to an idle worker, or run it on the calling thread when
//!    none is free
//! 4. forward streamed chunks to the [`JobObserver`] and write the final
//!    (or partial) trajectory back into the cache
//!
//! Nothing blocks on a worker. Callers drive progress with
//! [`JobScheduler::pump`], typically once per frame.
//!
//! Per vehicle a job moves `Idle → Dispatched → Streaming →
//! {Completed | Cancelled | Failed}`, and at most one job per vehicle is
//! ever active.

pub mod pending;
pub mod pool;
pub mod worker;

pub use worker::{JobId, WorkerCommand, WorkerEvent};

use crate::bodies::EphemerisSnapshot;
use crate::cache::{CacheEntry, CacheLookup, StalenessKey, TrajectoryCache};
use crate::config::{EngineConfig, PropagationConfig};
use crate::error::{EngineError, Result};
use crate::propagation::analyzer::{analyze, duration_hint, nominal_period, resolution_hint};
use crate::propagation::service::{PropagationChunk, PropagationMode, PropagationRequest, PropagationRun};
use crate::propagation::state::{PerturbationToggles, TrajectorySample, VehicleId, VehicleState};
use pending::Debouncer;
use pool::{PoolEvent, WorkerPool};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Lifecycle of the latest job for a vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobPhase {
    Idle,
    Dispatched,
    Streaming,
    Completed,
    Cancelled,
    Failed,
}

impl JobPhase {
    pub fn is_active(&self) -> bool {
        matches!(self, JobPhase::Dispatched | JobPhase::Streaming)
    }
}

/// Receives job progress, on the thread that calls into the scheduler
///
/// Every method has an empty default so observers only implement what
/// they use.
pub trait JobObserver: Send + Sync {
    /// A chunk of samples arrived (time-ordered within a job)
    fn on_chunk(&self, _vehicle: VehicleId, _job: JobId, _chunk: &PropagationChunk) {}

    /// The job finished and its trajectory is now cached
    fn on_complete(&self, _vehicle: VehicleId, _job: JobId, _entry: &CacheEntry) {}

    /// A queued update was served from the cache
    fn on_cache_hit(&self, _vehicle: VehicleId, _samples: &[TrajectorySample]) {}

    /// The job (or a queued update, `job == None`) failed
    fn on_failed(&self, _vehicle: VehicleId, _job: Option<JobId>, _error: &EngineError) {}

    /// The job was cancelled after producing `preserved` samples
    fn on_cancelled(&self, _vehicle: VehicleId, _job: JobId, _preserved: usize) {}
}

/// Observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl JobObserver for NoopObserver {}

/// Caller's request for a vehicle's predicted orbit
#[derive(Debug, Clone, PartialEq)]
pub struct OrbitUpdate {
    pub vehicle: VehicleId,
    pub state: VehicleState,

    /// Absolute simulation time at which `state` holds
    pub start_time: f64,

    /// Orbital periods to cover
    pub coverage: f64,

    pub samples_per_period: usize,
    pub perturbations: PerturbationToggles,
    pub state_hash: u64,
}

impl OrbitUpdate {
    /// Update using the configured default resolution and forces
    pub fn new(vehicle: VehicleId, state: VehicleState, start_time: f64, config: &PropagationConfig) -> Self {
        Self {
            vehicle,
            state,
            start_time,
            coverage: config.coverage_periods,
            samples_per_period: config.samples_per_period,
            perturbations: config.perturbations,
            state_hash: 0,
        }
    }

    pub fn with_coverage(mut self, coverage: f64) -> Self {
        self.coverage = coverage;
        self
    }

    pub fn with_samples_per_period(mut self, samples_per_period: usize) -> Self {
        self.samples_per_period = samples_per_period;
        self
    }

    pub fn with_perturbations(mut self, perturbations: PerturbationToggles) -> Self {
        self.perturbations = perturbations;
        self
    }

    pub fn with_state_hash(mut self, state_hash: u64) -> Self {
        self.state_hash = state_hash;
        self
    }

    fn staleness_key(&self) -> StalenessKey {
        StalenessKey {
            dominant_body: self.state.dominant_body,
            maneuver_stamp: self.state.maneuver_revision(),
            samples_per_period: self.samples_per_period,
            perturbations: self.perturbations,
        }
    }
}

/// What [`JobScheduler::update_orbit`] did
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// Served from cache; no job
    CacheHit { samples: Vec<TrajectorySample>, coverage: f64 },

    /// Handed to a worker; results arrive through `pump`
    Dispatched { job: JobId, extension: bool },

    /// No worker was free; ran to completion on the calling thread
    Completed { job: JobId, samples: usize },

    /// Waiting out the debounce window
    Queued,
}

/// Running counters, mostly for diagnostics and tests
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub jobs_started: usize,
    pub jobs_completed: usize,
    pub jobs_failed: usize,
    pub jobs_cancelled: usize,
    pub cache_hits: usize,
    pub extensions: usize,
    pub sync_fallbacks: usize,
    pub workers_replaced: usize,
    pub orphaned_events: usize,
    pub coalesced_requests: usize,
}

/// How a finished job's samples go back into the cache
struct JobContext {
    key: StalenessKey,
    period: f64,
    coverage: f64,

    /// Entry being extended
    base: Option<CacheEntry>,
}

struct Job {
    id: JobId,
    vehicle: VehicleId,
    worker: Option<usize>,
    request: PropagationRequest,
    samples: Vec<TrajectorySample>,
    started: Instant,
    context: JobContext,
}

impl Job {
    fn absorb(&mut self, chunk: &PropagationChunk) {
        self.samples.extend_from_slice(&chunk.samples);
    }
}

pub struct JobScheduler {
    config: EngineConfig,
    pool: WorkerPool,
    cache: Arc<TrajectoryCache>,
    observer: Arc<dyn JobObserver>,
    snapshot: Option<Arc<EphemerisSnapshot>>,
    jobs: HashMap<VehicleId, Job>,
    job_owners: HashMap<JobId, VehicleId>,
    phases: HashMap<VehicleId, JobPhase>,
    pending: Debouncer<OrbitUpdate>,
    next_job: u64,
    stats: SchedulerStats,
}

impl JobScheduler {
    pub fn new(config: EngineConfig, observer: Arc<dyn JobObserver>) -> Self {
        let pool = WorkerPool::new(config.scheduler.max_workers);
        let cache = Arc::new(TrajectoryCache::new(config.cache.clone()));
        let pending = Debouncer::new(Duration::from_millis(config.scheduler.debounce_ms));
        Self {
            config,
            pool,
            cache,
            observer,
            snapshot: None,
            jobs: HashMap::new(),
            job_owners: HashMap::new(),
            phases: HashMap::new(),
            pending,
            next_job: 0,
            stats: SchedulerStats::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Shared read access to the trajectory cache
    pub fn cache(&self) -> Arc<TrajectoryCache> {
        self.cache.clone()
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    /// Live workers
    pub fn pool_size(&self) -> usize {
        self.pool.size()
    }

    /// Configured worker count, `min(hardware threads, max_workers)`
    pub fn target_pool_size(&self) -> usize {
        self.pool.target_size()
    }

    pub fn snapshot(&self) -> Option<&Arc<EphemerisSnapshot>> {
        self.snapshot.as_ref()
    }

    /// Broadcast the ephemeris for the next batch of jobs
    ///
    /// Running jobs keep the snapshot they started with.
    pub fn set_snapshot(&mut self, snapshot: Arc<EphemerisSnapshot>) {
        self.pool.set_snapshot(snapshot.clone());
        self.snapshot = Some(snapshot);
    }

    pub fn job_phase(&self, vehicle: VehicleId) -> JobPhase {
        self.phases.get(&vehicle).copied().unwrap_or(JobPhase::Idle)
    }

    pub fn active_jobs(&self) -> usize {
        self.jobs.len()
    }

    /// Samples received so far by the vehicle's active job
    pub fn job_progress(&self, vehicle: VehicleId) -> Option<usize> {
        self.jobs.get(&vehicle).map(|job| job.samples.len())
    }

    /// No active jobs and nothing waiting on the debounce window
    pub fn is_idle(&self) -> bool {
        self.jobs.is_empty() && self.pending.is_empty()
    }

    /// Debounced [`update_orbit`](Self::update_orbit)
    pub fn request_update(&mut self, update: OrbitUpdate) -> UpdateOutcome {
        if self.pending.push(update.vehicle, update, Instant::now()) {
            self.stats.coalesced_requests += 1;
        }
        UpdateOutcome::Queued
    }

    /// Serve, extend or recompute a vehicle's trajectory right away
    ///
    /// Missing bodies and malformed requests are rejected here, before
    /// any job exists.
    pub fn update_orbit(&mut self, update: OrbitUpdate) -> Result<UpdateOutcome> {
        self.pending.cancel(update.vehicle);
        let snapshot = self.require_snapshot()?;
        let body = snapshot.require(update.state.dominant_body)?;

        if update.coverage <= 0.0 || !update.coverage.is_finite() || update.samples_per_period < 2 {
            return Err(EngineError::InvalidRequest(format!(
                "coverage {} with {} samples per period",
                update.coverage, update.samples_per_period
            )));
        }

        let prop = &self.config.propagation;
        let summary = analyze(&update.state.position, &update.state.velocity, body.gm);
        let period = nominal_period(&summary, prop);
        let max_coverage = prop.max_samples as f64 / update.samples_per_period as f64;
        let coverage = if update.coverage > max_coverage {
            log::debug!(
                "Clamping coverage for {} from {:.2} to {:.2} periods",
                update.vehicle,
                update.coverage,
                max_coverage
            );
            max_coverage
        } else {
            update.coverage
        };
        let key = update.staleness_key();

        match self.cache.lookup(update.vehicle, &key, coverage) {
            CacheLookup::Hit { samples, coverage } => {
                self.stats.cache_hits += 1;
                Ok(UpdateOutcome::CacheHit { samples, coverage })
            }
            CacheLookup::Extend { seed, entry } => {
                let period = entry.period.unwrap_or(period);
                let request = PropagationRequest {
                    vehicle: update.vehicle,
                    initial: update.state.clone(),
                    start_time: entry.start_time,
                    duration: period * coverage,
                    time_step: entry.time_step,
                    substeps: self.substeps_for(entry.time_step, period),
                    perturbations: update.perturbations,
                    mode: PropagationMode::Extension { seed },
                    state_hash: update.state_hash,
                };
                self.stats.extensions += 1;
                let context = JobContext {
                    key,
                    period,
                    coverage,
                    base: Some(entry),
                };
                self.dispatch(request, context)
            }
            CacheLookup::Miss => {
                let duration = duration_hint(&summary, coverage, prop);
                let time_step = resolution_hint(&summary, coverage, update.samples_per_period, prop);
                let mode = if update.state.maneuvers().is_empty() {
                    PropagationMode::Fresh
                } else {
                    PropagationMode::ManeuverChained
                };
                let request = PropagationRequest {
                    vehicle: update.vehicle,
                    initial: update.state.clone(),
                    start_time: update.start_time,
                    duration,
                    time_step,
                    substeps: self.substeps_for(time_step, period),
                    perturbations: update.perturbations,
                    mode,
                    state_hash: update.state_hash,
                };
                let context = JobContext {
                    key,
                    period,
                    coverage,
                    base: None,
                };
                self.dispatch(request, context)
            }
        }
    }

    /// Run an explicit request, bypassing the cache lookup
    ///
    /// The result is still cached, keyed by the request's vehicle state.
    pub fn start_job(&mut self, request: PropagationRequest) -> Result<UpdateOutcome> {
        let snapshot = self.require_snapshot()?;
        let body = snapshot.require(request.start_body())?;
        let summary = analyze(&request.initial.position, &request.initial.velocity, body.gm);
        let period = nominal_period(&summary, &self.config.propagation);
        let context = JobContext {
            key: StalenessKey {
                dominant_body: request.initial.dominant_body,
                maneuver_stamp: request.initial.maneuver_revision(),
                samples_per_period: self.config.propagation.samples_per_period,
                perturbations: request.perturbations,
            },
            period,
            coverage: request.duration / period,
            base: None,
        };
        self.dispatch(request, context)
    }

    /// Cancel the vehicle's active job
    ///
    /// Samples already delivered are kept; with `preserve_partial` they are
    /// cached as a partial entry. Returns the number of samples the job had
    /// produced, or `None` if nothing was running.
    pub fn cancel_job(&mut self, vehicle: VehicleId, preserve_partial: bool) -> Option<usize> {
        let mut job = self.jobs.remove(&vehicle)?;
        self.job_owners.remove(&job.id);

        if let Some(worker) = job.worker {
            let mut completed = false;
            let mut faulted = false;
            for event in self.pool.drain(worker) {
                match event {
                    PoolEvent::Event {
                        event: WorkerEvent::Chunk { job: id, chunk },
                        ..
                    } if id == job.id => {
                        completed |= chunk.is_complete;
                        job.absorb(&chunk);
                        self.observer.on_chunk(vehicle, id, &chunk);
                    }
                    PoolEvent::Event { .. } => {}
                    PoolEvent::Fault { .. } => faulted = true,
                }
            }

            if faulted {
                self.replace_worker(worker);
            } else {
                if !completed {
                    self.pool.send(worker, WorkerCommand::Cancel { job: job.id });
                }
                self.pool.release(worker);
            }

            if completed {
                let produced = job.samples.len();
                self.finish_job(job);
                return Some(produced);
            }
        }

        let produced = job.samples.len();
        let id = job.id;
        log::debug!("Cancelled {} for {} after {} samples", id, vehicle, produced);
        self.stats.jobs_cancelled += 1;
        self.phases.insert(vehicle, JobPhase::Cancelled);
        if preserve_partial {
            self.store_result(job, true);
        }
        self.observer.on_cancelled(vehicle, id, produced);
        Some(produced)
    }

    /// Test hook: make the worker running this vehicle's job panic
    pub fn inject_worker_fault(&mut self, vehicle: VehicleId) -> bool {
        match self.jobs.get(&vehicle).and_then(|job| job.worker) {
            Some(worker) => self.pool.send(worker, WorkerCommand::InjectFault),
            None => false,
        }
    }

    /// Dispatch due debounced requests and process worker events
    ///
    /// Returns the number of worker events handled.
    pub fn pump(&mut self) -> usize {
        for (vehicle, update) in self.pending.take_due(Instant::now()) {
            match self.update_orbit(update) {
                Ok(UpdateOutcome::CacheHit { samples, .. }) => self.observer.on_cache_hit(vehicle, &samples),
                Ok(_) => {}
                Err(error) => {
                    log::warn!("Queued update for {} rejected: {}", vehicle, error);
                    self.observer.on_failed(vehicle, None, &error);
                }
            }
        }

        let events = self.pool.poll();
        let handled = events.len();
        for event in events {
            match event {
                PoolEvent::Event { worker, event } => self.handle_event(worker, event),
                PoolEvent::Fault { worker } => self.handle_fault(worker),
            }
        }

        self.cache.purge_expired();
        handled
    }

    /// Pump until idle or `timeout` elapses; true if idle
    pub fn pump_until_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.pump();
            if self.is_idle() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// Cancel everything (keeping partial results) and stop the pool
    pub fn shutdown(&mut self) {
        let vehicles: Vec<VehicleId> = self.jobs.keys().copied().collect();
        for vehicle in vehicles {
            self.cancel_job(vehicle, true);
        }
        self.pool.shutdown();
    }

    fn require_snapshot(&self) -> Result<Arc<EphemerisSnapshot>> {
        self.snapshot
            .clone()
            .ok_or_else(|| EngineError::InvalidRequest("no ephemeris snapshot set".into()))
    }

    /// RK4 substeps per sample for a given spacing
    fn substeps_for(&self, time_step: f64, period: f64) -> usize {
        let prop = &self.config.propagation;
        let by_period = if period > 0.0 {
            (prop.min_steps_per_period as f64 * time_step / period).ceil() as usize
        } else {
            0
        };
        prop.substeps_per_sample.max(by_period).max(1)
    }

    fn dispatch(&mut self, request: PropagationRequest, context: JobContext) -> Result<UpdateOutcome> {
        let snapshot = self.require_snapshot()?;
        request.validate(&snapshot)?;

        let vehicle = request.vehicle;
        if self.jobs.contains_key(&vehicle) {
            self.cancel_job(vehicle, true);
        }

        let id = JobId(self.next_job);
        self.next_job += 1;
        self.stats.jobs_started += 1;
        self.phases.insert(vehicle, JobPhase::Dispatched);
        let extension = context.base.is_some();

        let job = Job {
            id,
            vehicle,
            worker: None,
            request,
            samples: Vec::new(),
            started: Instant::now(),
            context,
        };

        while let Some(worker) = self.pool.acquire() {
            let command = WorkerCommand::Run {
                job: id,
                request: job.request.clone(),
                chunk_size: self.config.scheduler.chunk_size,
            };
            if !self.pool.send(worker, command) {
                // Died since the last poll
                self.replace_worker(worker);
                continue;
            }
            log::debug!(
                "Dispatched {} for {} to worker {} ({} samples expected)",
                id,
                vehicle,
                worker,
                job.request.expected_samples()
            );
            self.job_owners.insert(id, vehicle);
            self.jobs.insert(vehicle, Job {
                worker: Some(worker),
                ..job
            });
            return Ok(UpdateOutcome::Dispatched { job: id, extension });
        }

        log::warn!("No idle worker, propagating {} for {} synchronously", id, vehicle);
        self.stats.sync_fallbacks += 1;
        self.run_synchronously(job, snapshot)
    }

    fn run_synchronously(&mut self, mut job: Job, snapshot: Arc<EphemerisSnapshot>) -> Result<UpdateOutcome> {
        let id = job.id;
        let vehicle = job.vehicle;
        let run = match PropagationRun::new(job.request.clone(), snapshot, self.config.scheduler.chunk_size) {
            Ok(run) => run,
            Err(error) => {
                self.fail_job(job, &error);
                return Err(error);
            }
        };

        for chunk in run {
            match chunk {
                Ok(chunk) => {
                    self.phases.insert(vehicle, JobPhase::Streaming);
                    job.absorb(&chunk);
                    self.observer.on_chunk(vehicle, id, &chunk);
                }
                Err(error) => {
                    self.fail_job(job, &error);
                    return Err(error);
                }
            }
        }

        let samples = job.samples.len();
        self.finish_job(job);
        Ok(UpdateOutcome::Completed { job: id, samples })
    }

    fn handle_event(&mut self, worker: usize, event: WorkerEvent) {
        match event {
            WorkerEvent::Chunk { job: id, chunk } => {
                let Some(job) = self.owned_job_mut(id) else {
                    self.orphan(id, worker);
                    return;
                };
                job.absorb(&chunk);
                let vehicle = job.vehicle;
                self.phases.insert(vehicle, JobPhase::Streaming);
                log::debug!("{} for {}: {} samples", id, vehicle, chunk.len());
                self.observer.on_chunk(vehicle, id, &chunk);

                if chunk.is_complete {
                    if let Some(job) = self.take_job(vehicle) {
                        self.pool.release(worker);
                        self.finish_job(job);
                    }
                }
            }
            WorkerEvent::Failed { job: id, error } => {
                let Some(vehicle) = self.owned_job_mut(id).map(|job| job.vehicle) else {
                    self.orphan(id, worker);
                    return;
                };
                if let Some(job) = self.take_job(vehicle) {
                    self.pool.release(worker);
                    self.fail_job(job, &error);
                }
            }
            WorkerEvent::Cancelled { job } => {
                log::debug!("Worker {} acknowledged cancel of {}", worker, job);
            }
        }
    }

    fn handle_fault(&mut self, worker: usize) {
        let bound = self
            .jobs
            .values()
            .find(|job| job.worker == Some(worker))
            .map(|job| job.vehicle);
        self.replace_worker(worker);

        if let Some(vehicle) = bound {
            if let Some(job) = self.take_job(vehicle) {
                self.fail_job(job, &EngineError::WorkerFault { worker });
            }
        }
    }

    fn replace_worker(&mut self, worker: usize) {
        self.pool.remove(worker);
        let spawned = self.pool.replenish();
        self.stats.workers_replaced += spawned;
        if spawned > 0 {
            log::info!("Replaced faulty worker {} ({} workers live)", worker, self.pool.size());
        }
    }

    fn owned_job_mut(&mut self, id: JobId) -> Option<&mut Job> {
        let vehicle = self.job_owners.get(&id)?;
        self.jobs.get_mut(vehicle).filter(|job| job.id == id)
    }

    fn take_job(&mut self, vehicle: VehicleId) -> Option<Job> {
        let job = self.jobs.remove(&vehicle)?;
        self.job_owners.remove(&job.id);
        Some(job)
    }

    fn orphan(&mut self, job: JobId, worker: usize) {
        self.stats.orphaned_events += 1;
        log::debug!("Dropping event for untracked {} from worker {}", job, worker);
    }

    fn finish_job(&mut self, job: Job) {
        let id = job.id;
        let vehicle = job.vehicle;
        let elapsed = job.started.elapsed();
        let produced = job.samples.len();

        self.stats.jobs_completed += 1;
        self.phases.insert(vehicle, JobPhase::Completed);
        log::info!(
            "{} for {} completed: {} samples in {:.1} ms",
            id,
            vehicle,
            produced,
            elapsed.as_secs_f64() * 1e3
        );

        if let Some(entry) = self.store_result(job, false) {
            self.observer.on_complete(vehicle, id, &entry);
        }
    }

    fn fail_job(&mut self, job: Job, error: &EngineError) {
        match error {
            EngineError::WorkerFault { .. } => {
                log::warn!("{} for {} lost to worker fault: {}", job.id, job.vehicle, error)
            }
            _ => log::error!("{} for {} failed: {}", job.id, job.vehicle, error),
        }
        self.job_owners.remove(&job.id);
        self.stats.jobs_failed += 1;
        self.phases.insert(job.vehicle, JobPhase::Failed);
        self.observer.on_failed(job.vehicle, Some(job.id), error);
    }

    /// Write a job's samples into the cache
    fn store_result(&self, job: Job, partial: bool) -> Option<CacheEntry> {
        let Job {
            vehicle,
            request,
            samples,
            context,
            ..
        } = job;

        let entry = match context.base {
            Some(mut base) => {
                base.extend_with(&samples, context.coverage);
                base.partial = partial;
                base.state_hash = request.state_hash;
                base
            }
            None if samples.is_empty() => return None,
            None => CacheEntry::new(samples, &context.key, request.start_time, request.time_step)
                .with_period(Some(context.period), context.coverage)
                .with_state_hash(request.state_hash)
                .partial(partial),
        };

        self.cache.set(vehicle, entry.clone());
        Some(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bodies::tests::{earth_only, EARTH, GM_EARTH};
    use crate::config::SchedulerConfig;
    use crate::propagation::state::{Maneuver, ManeuverDeltaV};
    use nalgebra::Vector3;

    fn leo() -> VehicleState {
        let r = 7000.0;
        VehicleState::new(Vector3::new(r, 0.0, 0.0), Vector3::new(0.0, (GM_EARTH / r).sqrt(), 0.0), EARTH)
    }

    fn scheduler(max_workers: usize) -> JobScheduler {
        let config = EngineConfig {
            scheduler: SchedulerConfig {
                max_workers,
                chunk_size: 32,
                debounce_ms: 20,
            },
            ..EngineConfig::default()
        };
        let mut scheduler = JobScheduler::new(config, Arc::new(NoopObserver));
        scheduler.set_snapshot(Arc::new(earth_only()));
        scheduler
    }

    fn update(vehicle: u64, state: VehicleState) -> OrbitUpdate {
        OrbitUpdate::new(VehicleId(vehicle), state, 0.0, &PropagationConfig::default())
            .with_perturbations(PerturbationToggles::none())
    }

    #[test]
    fn test_sync_fallback_without_workers() {
        let mut s = scheduler(0);
        assert_eq!(s.pool_size(), 0);
        let outcome = s.update_orbit(update(1, leo())).unwrap();
        assert_eq!(outcome, UpdateOutcome::Completed { job: JobId(0), samples: 180 });
        assert_eq!(s.job_phase(VehicleId(1)), JobPhase::Completed);
        assert_eq!(s.stats().sync_fallbacks, 1);

        let entry = s.cache().get(VehicleId(1)).unwrap();
        assert_eq!(entry.samples.len(), 180);
        assert!((entry.coverage - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cache_hit_after_completion() {
        let mut s = scheduler(0);
        s.update_orbit(update(1, leo())).unwrap();
        match s.update_orbit(update(1, leo()).with_coverage(0.5)).unwrap() {
            UpdateOutcome::CacheHit { samples, .. } => assert_eq!(samples.len(), 90),
            other => panic!("expected cache hit, got {:?}", other),
        }
        // Same coverage again is a hit too
        assert!(matches!(
            s.update_orbit(update(1, leo())).unwrap(),
            UpdateOutcome::CacheHit { .. }
        ));
        assert_eq!(s.stats().jobs_started, 1);
    }

    #[test]
    fn test_extension_grows_coverage() {
        let mut s = scheduler(0);
        s.update_orbit(update(1, leo())).unwrap();
        let before = s.cache().get(VehicleId(1)).unwrap();

        let outcome = s.update_orbit(update(1, leo()).with_coverage(2.0)).unwrap();
        assert!(matches!(outcome, UpdateOutcome::Completed { samples: 179, .. }));
        let after = s.cache().get(VehicleId(1)).unwrap();
        assert_eq!(after.samples.len(), 359);
        assert!(after.coverage > before.coverage);
        assert!((after.coverage - 2.0).abs() < 1e-9);
        assert_eq!(after.samples[..180], before.samples[..]);
        assert_eq!(s.stats().extensions, 1);
    }

    #[test]
    fn test_new_maneuver_invalidates_cache() {
        let mut s = scheduler(0);
        let mut vehicle = leo();
        s.update_orbit(update(1, vehicle.clone())).unwrap();

        vehicle.upsert_maneuver(Maneuver::new(1, 600.0, ManeuverDeltaV::prograde(0.05)));
        let outcome = s.update_orbit(update(1, vehicle)).unwrap();
        assert!(matches!(outcome, UpdateOutcome::Completed { .. }));
        assert_eq!(s.stats().jobs_started, 2);
    }

    #[test]
    fn test_missing_body_rejected_before_dispatch() {
        let mut s = scheduler(0);
        let mut vehicle = leo();
        vehicle.dominant_body = crate::bodies::BodyId(4242);
        let err = s.update_orbit(update(1, vehicle)).unwrap_err();
        assert_eq!(err, EngineError::MissingBody(crate::bodies::BodyId(4242)));
        assert_eq!(s.stats().jobs_started, 0);
        assert_eq!(s.job_phase(VehicleId(1)), JobPhase::Idle);
    }

    #[test]
    fn test_worker_job_completes_through_pump() {
        let mut s = scheduler(1);
        let outcome = s.update_orbit(update(7, leo())).unwrap();
        assert!(matches!(outcome, UpdateOutcome::Dispatched { extension: false, .. }));
        assert!(s.job_phase(VehicleId(7)).is_active());

        assert!(s.pump_until_idle(Duration::from_secs(30)));
        assert_eq!(s.job_phase(VehicleId(7)), JobPhase::Completed);
        assert_eq!(s.cache().get(VehicleId(7)).unwrap().samples.len(), 180);
    }
}
