//! Debounced update requests
//!
//! Requests for one vehicle that arrive within the window coalesce: the
//! latest payload wins and the deadline set by the first one stands, so a
//! steady stream of edits still dispatches once per window.

use crate::propagation::state::VehicleId;
use std::collections::HashMap;
use std::time::{Duration, Instant};

struct Pending<T> {
    payload: T,
    due: Instant,
    coalesced: usize,
}

pub struct Debouncer<T> {
    window: Duration,
    pending: HashMap<VehicleId, Pending<T>>,
}

impl<T> Debouncer<T> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: HashMap::new(),
        }
    }

    /// Queue `payload`, replacing any pending one for the vehicle
    ///
    /// Returns true if this merged into an existing request.
    pub fn push(&mut self, vehicle: VehicleId, payload: T, now: Instant) -> bool {
        match self.pending.get_mut(&vehicle) {
            Some(existing) => {
                existing.payload = payload;
                existing.coalesced += 1;
                true
            }
            None => {
                self.pending.insert(
                    vehicle,
                    Pending {
                        payload,
                        due: now + self.window,
                        coalesced: 0,
                    },
                );
                false
            }
        }
    }

    /// Remove and return every request whose window has closed
    pub fn take_due(&mut self, now: Instant) -> Vec<(VehicleId, T)> {
        let due: Vec<VehicleId> = self
            .pending
            .iter()
            .filter(|(_, p)| p.due <= now)
            .map(|(&vehicle, _)| vehicle)
            .collect();

        let mut out: Vec<(VehicleId, T)> = due
            .into_iter()
            .filter_map(|vehicle| {
                let pending = self.pending.remove(&vehicle)?;
                if pending.coalesced > 0 {
                    log::debug!("Coalesced {} update requests for {}", pending.coalesced + 1, vehicle);
                }
                Some((vehicle, pending.payload))
            })
            .collect();
        out.sort_by_key(|(vehicle, _)| *vehicle);
        out
    }

    pub fn cancel(&mut self, vehicle: VehicleId) -> Option<T> {
        self.pending.remove(&vehicle).map(|p| p.payload)
    }

    pub fn contains(&self, vehicle: VehicleId) -> bool {
        self.pending.contains_key(&vehicle)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coalesces_within_window() {
        let mut debouncer = Debouncer::new(Duration::from_millis(50));
        let t0 = Instant::now();
        assert!(!debouncer.push(VehicleId(1), "a", t0));
        assert!(debouncer.push(VehicleId(1), "b", t0 + Duration::from_millis(10)));
        assert!(debouncer.push(VehicleId(1), "c", t0 + Duration::from_millis(20)));

        assert!(debouncer.take_due(t0 + Duration::from_millis(40)).is_empty());
        let due = debouncer.take_due(t0 + Duration::from_millis(50));
        assert_eq!(due, vec![(VehicleId(1), "c")]);
        assert!(debouncer.is_empty());
    }

    #[test]
    fn test_vehicles_independent() {
        let mut debouncer = Debouncer::new(Duration::from_millis(50));
        let t0 = Instant::now();
        debouncer.push(VehicleId(2), 2, t0);
        debouncer.push(VehicleId(1), 1, t0 + Duration::from_millis(30));

        assert_eq!(debouncer.take_due(t0 + Duration::from_millis(60)), vec![(VehicleId(2), 2)]);
        assert!(debouncer.contains(VehicleId(1)));
        assert_eq!(debouncer.cancel(VehicleId(1)), Some(1));
    }
}
