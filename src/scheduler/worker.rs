//! Propagation worker threads
//!
//! Each worker owns one command channel in and one event channel out, and
//! shares nothing else with the scheduler. A worker whose thread dies
//! (panic or otherwise) drops its event sender, which the scheduler sees
//! as a disconnect.

use crate::bodies::EphemerisSnapshot;
use crate::error::EngineError;
use crate::propagation::service::{PropagationChunk, PropagationRequest, PropagationRun};
use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;

/// Job identifier, unique per scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub u64);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

#[derive(Debug)]
pub enum WorkerCommand {
    /// Replace the ephemeris used by subsequent runs
    SetSnapshot(Arc<EphemerisSnapshot>),

    Run {
        job: JobId,
        request: PropagationRequest,
        chunk_size: usize,
    },

    /// Stop `job` at the next chunk boundary
    Cancel { job: JobId },

    /// Test hook: panic the worker thread
    InjectFault,

    Stop,
}

#[derive(Debug)]
pub enum WorkerEvent {
    Chunk { job: JobId, chunk: PropagationChunk },
    Failed { job: JobId, error: EngineError },

    /// Acknowledges a [`WorkerCommand::Cancel`]
    Cancelled { job: JobId },
}

pub struct Worker {
    pub id: usize,
    sender: Sender<WorkerCommand>,
    receiver: Receiver<WorkerEvent>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Worker {
    pub fn spawn(id: usize, snapshot: Option<Arc<EphemerisSnapshot>>) -> std::io::Result<Self> {
        let (cmd_tx, cmd_rx) = mpsc::channel::<WorkerCommand>();
        let (event_tx, event_rx) = mpsc::channel::<WorkerEvent>();

        let handle = thread::Builder::new()
            .name(format!("propagation-worker-{}", id))
            .spawn(move || worker_loop(id, snapshot, cmd_rx, event_tx))?;

        Ok(Self {
            id,
            sender: cmd_tx,
            receiver: event_rx,
            handle: Some(handle),
        })
    }

    /// Send a command; false if the worker thread is gone
    pub fn send(&self, command: WorkerCommand) -> bool {
        self.sender.send(command).is_ok()
    }

    /// Next pending event without blocking
    pub fn try_recv(&self) -> Result<WorkerEvent, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Ask the thread to exit and wait for it
    pub fn shutdown(mut self) {
        let _ = self.sender.send(WorkerCommand::Stop);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("Worker {} exited by panic", self.id);
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        // Detach; the thread exits at its next command check
        let _ = self.sender.send(WorkerCommand::Stop);
    }
}

fn worker_loop(
    id: usize,
    mut snapshot: Option<Arc<EphemerisSnapshot>>,
    commands: Receiver<WorkerCommand>,
    events: Sender<WorkerEvent>,
) {
    log::debug!("Worker {} started", id);
    let mut deferred: VecDeque<WorkerCommand> = VecDeque::new();

    loop {
        let command = match deferred.pop_front() {
            Some(command) => command,
            None => match commands.recv() {
                Ok(command) => command,
                Err(_) => break,
            },
        };

        match command {
            WorkerCommand::SetSnapshot(next) => snapshot = Some(next),
            WorkerCommand::Run {
                job,
                request,
                chunk_size,
            } => {
                let flow = run_job(
                    id,
                    job,
                    request,
                    chunk_size,
                    &mut snapshot,
                    &commands,
                    &events,
                    &mut deferred,
                );
                if flow.is_break() {
                    break;
                }
            }
            WorkerCommand::Cancel { job } => {
                // Nothing running; acknowledge so the scheduler can drop it
                let _ = events.send(WorkerEvent::Cancelled { job });
            }
            WorkerCommand::InjectFault => panic!("injected fault in worker {}", id),
            WorkerCommand::Stop => break,
        }
    }

    log::debug!("Worker {} stopped", id);
}

#[allow(clippy::too_many_arguments)]
fn run_job(
    id: usize,
    job: JobId,
    request: PropagationRequest,
    chunk_size: usize,
    snapshot: &mut Option<Arc<EphemerisSnapshot>>,
    commands: &Receiver<WorkerCommand>,
    events: &Sender<WorkerEvent>,
    deferred: &mut VecDeque<WorkerCommand>,
) -> ControlFlow<()> {
    let Some(current) = snapshot.clone() else {
        let error = EngineError::InvalidRequest("worker has no ephemeris snapshot".into());
        return send(events, WorkerEvent::Failed { job, error });
    };

    let run = match PropagationRun::new(request, current, chunk_size) {
        Ok(run) => run,
        Err(error) => return send(events, WorkerEvent::Failed { job, error }),
    };

    for chunk in run {
        match chunk {
            Ok(chunk) => send(events, WorkerEvent::Chunk { job, chunk })?,
            Err(error) => return send(events, WorkerEvent::Failed { job, error }),
        }

        // Cooperative cancellation point
        loop {
            match commands.try_recv() {
                Ok(WorkerCommand::Cancel { job: target }) if target == job => {
                    log::debug!("Worker {} cancelling {}", id, job);
                    return send(events, WorkerEvent::Cancelled { job });
                }
                Ok(WorkerCommand::Cancel { job: stale }) => {
                    let _ = events.send(WorkerEvent::Cancelled { job: stale });
                }
                Ok(WorkerCommand::SetSnapshot(next)) => *snapshot = Some(next),
                Ok(WorkerCommand::InjectFault) => panic!("injected fault in worker {} during {}", id, job),
                Ok(WorkerCommand::Stop) | Err(TryRecvError::Disconnected) => return ControlFlow::Break(()),
                Ok(run @ WorkerCommand::Run { .. }) => deferred.push_back(run),
                Err(TryRecvError::Empty) => break,
            }
        }
    }

    ControlFlow::Continue(())
}

/// Deliver an event; break out if the scheduler is gone
fn send(events: &Sender<WorkerEvent>, event: WorkerEvent) -> ControlFlow<()> {
    match events.send(event) {
        Ok(()) => ControlFlow::Continue(()),
        Err(_) => ControlFlow::Break(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bodies::tests::{earth_only, EARTH, GM_EARTH};
    use crate::propagation::state::{PerturbationToggles, VehicleId, VehicleState};
    use nalgebra::Vector3;
    use std::time::Duration;

    fn request(duration: f64) -> PropagationRequest {
        let r = 7000.0;
        let vehicle = VehicleState::new(Vector3::new(r, 0.0, 0.0), Vector3::new(0.0, (GM_EARTH / r).sqrt(), 0.0), EARTH);
        PropagationRequest::new(VehicleId(1), vehicle, 0.0, duration, 30.0).with_perturbations(PerturbationToggles::none())
    }

    fn recv(worker: &Worker) -> WorkerEvent {
        for _ in 0..5000 {
            match worker.try_recv() {
                Ok(event) => return event,
                Err(TryRecvError::Empty) => thread::sleep(Duration::from_millis(1)),
                Err(TryRecvError::Disconnected) => panic!("worker disconnected"),
            }
        }
        panic!("no event from worker");
    }

    #[test]
    fn test_worker_streams_chunks() {
        let worker = Worker::spawn(0, Some(Arc::new(earth_only()))).unwrap();
        assert!(worker.send(WorkerCommand::Run {
            job: JobId(7),
            request: request(3000.0),
            chunk_size: 40,
        }));

        let mut total = 0;
        loop {
            match recv(&worker) {
                WorkerEvent::Chunk { job, chunk } => {
                    assert_eq!(job, JobId(7));
                    total += chunk.len();
                    if chunk.is_complete {
                        break;
                    }
                }
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(total, 101);
        worker.shutdown();
    }

    #[test]
    fn test_worker_without_snapshot_fails_job() {
        let worker = Worker::spawn(1, None).unwrap();
        worker.send(WorkerCommand::Run {
            job: JobId(1),
            request: request(300.0),
            chunk_size: 8,
        });
        assert!(matches!(recv(&worker), WorkerEvent::Failed { job: JobId(1), .. }));
        worker.shutdown();
    }

    #[test]
    fn test_fault_disconnects() {
        let worker = Worker::spawn(2, None).unwrap();
        worker.send(WorkerCommand::InjectFault);
        let mut disconnected = false;
        for _ in 0..5000 {
            match worker.try_recv() {
                Err(TryRecvError::Disconnected) => {
                    disconnected = true;
                    break;
                }
                _ => thread::sleep(Duration::from_millis(1)),
            }
        }
        assert!(disconnected);
    }
}
