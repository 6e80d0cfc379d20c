//! Explicit dirty-flag recompute primitives.
//!
//! This library provides the dependency tracking the pairing protocol runs
//! on. Key concepts:
//!
//! - **Dependency**: a change-notification cell. Computations subscribe to
//!   it with [`Dependency::depend`]; [`Dependency::changed`] marks every
//!   subscriber dirty.
//! - **Computation**: a unit of work that must re-run when something it read
//!   changed. Invalidating a computation drops all of its subscriptions; the
//!   re-run subscribes again to whatever it reads this time.
//! - **Value**: a cell holding data plus its own dependency. Writing an equal
//!   value is not a change.
//!
//! Re-running is up to the owner: [`Tracker::drain_dirty`] hands out dirty
//! computations in the order they became dirty, each at most once per
//! invalidation.
//!
//! # Invariants
//!
//! - A computation is queued at most once until it is drained
//! - Invalidation drops subscriptions, so one change invalidates a given
//!   computation exactly once
//! - Stopped computations are never queued again

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::trace;

/// Identifier of a dependency cell within one tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DependencyId(u64);

/// Identifier of a computation within one tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComputationId(u64);

impl std::fmt::Display for ComputationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "c{}", self.0)
    }
}

#[derive(Debug, Default)]
struct TrackerState {
    next_id: u64,
    subscribers: HashMap<DependencyId, BTreeSet<ComputationId>>,
    subscriptions: HashMap<ComputationId, BTreeSet<DependencyId>>,
    dirty_queue: VecDeque<ComputationId>,
    dirty: HashSet<ComputationId>,
    invalidations: HashMap<ComputationId, u64>,
    stopped: HashSet<ComputationId>,
}

impl TrackerState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn unsubscribe(&mut self, computation: ComputationId) {
        if let Some(deps) = self.subscriptions.remove(&computation) {
            for dep in deps {
                if let Some(subs) = self.subscribers.get_mut(&dep) {
                    subs.remove(&computation);
                    if subs.is_empty() {
                        self.subscribers.remove(&dep);
                    }
                }
            }
        }
    }

    /// Returns true if the computation was newly queued.
    fn invalidate(&mut self, computation: ComputationId) -> bool {
        self.unsubscribe(computation);
        if self.stopped.contains(&computation) || !self.dirty.insert(computation) {
            return false;
        }
        self.dirty_queue.push_back(computation);
        *self.invalidations.entry(computation).or_default() += 1;
        true
    }
}

/// Shared owner of dependencies and computations.
///
/// Cloning a tracker yields another handle to the same state.
#[derive(Debug, Clone, Default)]
pub struct Tracker {
    state: Arc<Mutex<TrackerState>>,
}

impl Tracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates a new dependency cell.
    pub fn dependency(&self) -> Dependency {
        let id = DependencyId(self.lock().next_id());
        Dependency {
            id,
            tracker: self.clone(),
        }
    }

    /// Creates a new computation. It starts clean; call
    /// [`Computation::invalidate`] to schedule a first run.
    pub fn computation(&self) -> Computation {
        let id = ComputationId(self.lock().next_id());
        Computation {
            id,
            tracker: self.clone(),
        }
    }

    /// Takes every dirty computation, oldest first.
    pub fn drain_dirty(&self) -> Vec<ComputationId> {
        let mut state = self.lock();
        let drained: Vec<ComputationId> = state.dirty_queue.drain(..).collect();
        for id in &drained {
            state.dirty.remove(id);
        }
        drained
    }

    /// True if any computation is waiting to re-run.
    pub fn has_dirty(&self) -> bool {
        !self.lock().dirty_queue.is_empty()
    }
}

/// A change-notification cell.
#[derive(Debug, Clone)]
pub struct Dependency {
    id: DependencyId,
    tracker: Tracker,
}

impl Dependency {
    pub fn id(&self) -> DependencyId {
        self.id
    }

    /// Subscribes `computation` to this cell until its next invalidation.
    pub fn depend(&self, computation: &Computation) {
        let mut state = self.tracker.lock();
        if state.stopped.contains(&computation.id) {
            return;
        }
        state
            .subscribers
            .entry(self.id)
            .or_default()
            .insert(computation.id);
        state
            .subscriptions
            .entry(computation.id)
            .or_default()
            .insert(self.id);
    }

    /// Marks every subscriber dirty. Returns how many were newly queued.
    pub fn changed(&self) -> usize {
        let mut state = self.tracker.lock();
        let subscribers = state.subscribers.remove(&self.id).unwrap_or_default();
        let mut queued = 0;
        for computation in subscribers {
            if state.invalidate(computation) {
                queued += 1;
            }
        }
        trace!(dependency = self.id.0, queued, "dependency changed");
        queued
    }

    /// True if any computation currently depends on this cell.
    pub fn has_dependents(&self) -> bool {
        self.tracker
            .lock()
            .subscribers
            .get(&self.id)
            .is_some_and(|subs| !subs.is_empty())
    }
}

/// A unit of work re-run by its owner whenever it is dirty.
#[derive(Debug, Clone)]
pub struct Computation {
    id: ComputationId,
    tracker: Tracker,
}

impl Computation {
    pub fn id(&self) -> ComputationId {
        self.id
    }

    /// Queues the computation for a re-run regardless of its dependencies.
    pub fn invalidate(&self) -> bool {
        self.tracker.lock().invalidate(self.id)
    }

    /// True if queued and not yet drained.
    pub fn is_dirty(&self) -> bool {
        self.tracker.lock().dirty.contains(&self.id)
    }

    /// How many times the computation has been queued so far.
    pub fn invalidation_count(&self) -> u64 {
        self.tracker
            .lock()
            .invalidations
            .get(&self.id)
            .copied()
            .unwrap_or(0)
    }

    /// Drops all subscriptions and never queues the computation again.
    pub fn stop(&self) {
        let mut state = self.tracker.lock();
        state.unsubscribe(self.id);
        state.stopped.insert(self.id);
        if state.dirty.remove(&self.id) {
            state.dirty_queue.retain(|id| *id != self.id);
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.tracker.lock().stopped.contains(&self.id)
    }
}

/// A reactive cell: data plus a dependency signalled on every real change.
#[derive(Debug, Clone)]
pub struct Value<T> {
    value: T,
    dep: Dependency,
}

impl<T: Clone + PartialEq> Value<T> {
    pub fn new(tracker: &Tracker, value: T) -> Self {
        Self {
            value,
            dep: tracker.dependency(),
        }
    }

    /// Reads the value, subscribing `computation` when given.
    pub fn get(&self, computation: Option<&Computation>) -> T {
        if let Some(computation) = computation {
            self.dep.depend(computation);
        }
        self.value.clone()
    }

    /// Reads the value without subscribing.
    pub fn peek(&self) -> &T {
        &self.value
    }

    /// Stores `value`. Returns true (and signals) only if it differs.
    pub fn set(&mut self, value: T) -> bool {
        if self.value == value {
            return false;
        }
        self.value = value;
        self.dep.changed();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_changed_invalidates_subscriber_once() {
        let tracker = Tracker::new();
        let dep = tracker.dependency();
        let comp = tracker.computation();

        dep.depend(&comp);
        assert!(dep.has_dependents());
        assert_eq!(dep.changed(), 1);
        assert_eq!(dep.changed(), 0); // subscription dropped by the first change
        assert!(!dep.has_dependents());

        assert_eq!(tracker.drain_dirty(), vec![comp.id()]);
        assert_eq!(comp.invalidation_count(), 1);
    }

    #[test]
    fn test_dirty_computation_queued_once() {
        let tracker = Tracker::new();
        let a = tracker.dependency();
        let b = tracker.dependency();
        let comp = tracker.computation();

        a.depend(&comp);
        b.depend(&comp);
        a.changed();
        assert!(comp.is_dirty());
        assert!(!comp.invalidate());

        assert_eq!(tracker.drain_dirty().len(), 1);
        assert!(!comp.is_dirty());
        assert!(!b.has_dependents());
    }

    #[test]
    fn test_drain_is_fifo() {
        let tracker = Tracker::new();
        let first = tracker.computation();
        let second = tracker.computation();

        second.invalidate();
        first.invalidate();

        assert_eq!(tracker.drain_dirty(), vec![second.id(), first.id()]);
        assert!(!tracker.has_dirty());
    }

    #[test]
    fn test_stopped_computation_never_queued() {
        let tracker = Tracker::new();
        let dep = tracker.dependency();
        let comp = tracker.computation();

        dep.depend(&comp);
        comp.invalidate();
        comp.stop();
        assert!(!tracker.has_dirty());

        dep.depend(&comp);
        assert_eq!(dep.changed(), 0);
        assert!(!comp.invalidate());
        assert!(comp.is_stopped());
    }

    #[test]
    fn test_value_set_equal_is_not_a_change() {
        let tracker = Tracker::new();
        let comp = tracker.computation();
        let mut ready = Value::new(&tracker, false);

        assert!(!ready.get(Some(&comp)));
        assert!(!ready.set(false));
        assert!(!comp.is_dirty());

        assert!(ready.set(true));
        assert!(comp.is_dirty());
        assert!(*ready.peek());
    }

    proptest! {
        #[test]
        fn prop_each_change_round_invalidates_at_most_once(
            rounds in proptest::collection::vec(1usize..5, 1..20),
        ) {
            let tracker = Tracker::new();
            let deps: Vec<Dependency> = (0..5).map(|_| tracker.dependency()).collect();
            let comp = tracker.computation();

            for changes in &rounds {
                for dep in &deps {
                    dep.depend(&comp);
                }
                for dep in deps.iter().take(*changes) {
                    dep.changed();
                }
                prop_assert_eq!(tracker.drain_dirty(), vec![comp.id()]);
            }
            prop_assert_eq!(comp.invalidation_count(), rounds.len() as u64);
        }
    }
}
