//! Bounded worker pool

use super::worker::{Worker, WorkerCommand, WorkerEvent};
use crate::bodies::EphemerisSnapshot;
use std::collections::{BTreeMap, VecDeque};
use std::sync::mpsc::TryRecvError;
use std::sync::Arc;

/// Something observed on a worker's event channel
#[derive(Debug)]
pub enum PoolEvent {
    Event { worker: usize, event: WorkerEvent },

    /// The worker's channel disconnected; it is dead
    Fault { worker: usize },
}

pub struct WorkerPool {
    target_size: usize,
    workers: BTreeMap<usize, Worker>,
    idle: VecDeque<usize>,
    next_id: usize,
    snapshot: Option<Arc<EphemerisSnapshot>>,
}

impl WorkerPool {
    /// Pool of `min(available parallelism, max_workers)` threads
    pub fn new(max_workers: usize) -> Self {
        let hardware = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        let target_size = hardware.min(max_workers);
        let mut pool = Self {
            target_size,
            workers: BTreeMap::new(),
            idle: VecDeque::new(),
            next_id: 0,
            snapshot: None,
        };
        pool.replenish();
        log::info!("Started propagation pool with {} workers", pool.size());
        pool
    }

    /// Configured number of workers
    pub fn target_size(&self) -> usize {
        self.target_size
    }

    /// Live workers
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    pub fn idle_count(&self) -> usize {
        self.idle.len()
    }

    /// Broadcast a new ephemeris to every worker
    pub fn set_snapshot(&mut self, snapshot: Arc<EphemerisSnapshot>) {
        for worker in self.workers.values() {
            worker.send(WorkerCommand::SetSnapshot(snapshot.clone()));
        }
        self.snapshot = Some(snapshot);
    }

    /// Take an idle worker
    pub fn acquire(&mut self) -> Option<usize> {
        self.idle.pop_front()
    }

    /// Return a healthy worker to the idle set
    pub fn release(&mut self, worker: usize) {
        if self.workers.contains_key(&worker) && !self.idle.contains(&worker) {
            self.idle.push_back(worker);
        }
    }

    pub fn send(&self, worker: usize, command: WorkerCommand) -> bool {
        self.workers.get(&worker).is_some_and(|w| w.send(command))
    }

    /// Drop a faulty worker; it is never handed out again
    pub fn remove(&mut self, worker: usize) {
        self.idle.retain(|&id| id != worker);
        if self.workers.remove(&worker).is_some() {
            log::warn!("Removed faulty worker {}", worker);
        }
    }

    /// Spawn workers until the pool is back at its configured size
    pub fn replenish(&mut self) -> usize {
        let mut spawned = 0;
        while self.workers.len() < self.target_size {
            let id = self.next_id;
            self.next_id += 1;
            match Worker::spawn(id, self.snapshot.clone()) {
                Ok(worker) => {
                    self.workers.insert(id, worker);
                    self.idle.push_back(id);
                    spawned += 1;
                }
                Err(e) => {
                    log::error!("Failed to spawn propagation worker: {}", e);
                    break;
                }
            }
        }
        spawned
    }

    /// Everything currently waiting on the workers' channels
    pub fn poll(&self) -> Vec<PoolEvent> {
        let mut out = Vec::new();
        for &id in self.workers.keys() {
            self.drain_into(id, &mut out);
        }
        out
    }

    /// Pending events of one worker
    pub fn drain(&self, worker: usize) -> Vec<PoolEvent> {
        let mut out = Vec::new();
        self.drain_into(worker, &mut out);
        out
    }

    fn drain_into(&self, id: usize, out: &mut Vec<PoolEvent>) {
        let Some(worker) = self.workers.get(&id) else {
            return;
        };
        loop {
            match worker.try_recv() {
                Ok(event) => out.push(PoolEvent::Event { worker: id, event }),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    out.push(PoolEvent::Fault { worker: id });
                    break;
                }
            }
        }
    }

    /// Stop and join every worker
    pub fn shutdown(&mut self) {
        let count = self.workers.len();
        self.idle.clear();
        for (_, worker) in std::mem::take(&mut self.workers) {
            worker.shutdown();
        }
        if count > 0 {
            log::info!("Stopped {} propagation workers", count);
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_size_bounded() {
        let pool = WorkerPool::new(2);
        assert!(pool.size() >= 1 && pool.size() <= 2);
        assert_eq!(pool.size(), pool.target_size());
        assert_eq!(pool.idle_count(), pool.size());

        let empty = WorkerPool::new(0);
        assert_eq!(empty.size(), 0);
    }

    #[test]
    fn test_acquire_release_remove() {
        let mut pool = WorkerPool::new(1);
        let worker = pool.acquire().unwrap();
        assert!(pool.acquire().is_none());
        pool.release(worker);
        assert_eq!(pool.idle_count(), 1);

        let worker = pool.acquire().unwrap();
        pool.remove(worker);
        assert_eq!(pool.size(), 0);
        // A removed worker cannot be released back
        pool.release(worker);
        assert_eq!(pool.idle_count(), 0);

        assert_eq!(pool.replenish(), 1);
        assert_eq!(pool.size(), 1);
        assert_ne!(pool.acquire(), Some(worker));
    }
}
