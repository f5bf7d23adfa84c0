//! Deduplication of identical in-flight runs
//!
//! The first caller for a key becomes the leader and computes; callers that
//! arrive while it runs block on a condition variable and receive a clone
//! of the leader's result. The key is released as soon as the leader
//! finishes, so later calls compute afresh; nothing is cached.
//!
//! If the leader unwinds before publishing, its guard publishes
//! `RunAborted` so waiters never hang.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use log::debug;

use crate::errors::{EngineError, EngineResult};

struct Slot<V> {
    result: Mutex<Option<EngineResult<V>>>,
    ready: Condvar,
}

impl<V: Clone> Slot<V> {
    fn new() -> Self {
        Self {
            result: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    fn publish(&self, result: EngineResult<V>) {
        *self.result.lock().unwrap_or_else(PoisonError::into_inner) = Some(result);
        self.ready.notify_all();
    }

    fn wait(&self) -> EngineResult<V> {
        let mut guard = self.result.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(result) = guard.as_ref() {
                return result.clone();
            }
            guard = self.ready.wait(guard).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Table of runs currently being computed
pub struct InFlightRuns<K, V> {
    slots: Mutex<HashMap<K, Arc<Slot<V>>>>,
}

impl<K, V> Default for InFlightRuns<K, V> {
    fn default() -> Self {
        Self { slots: Mutex::new(HashMap::new()) }
    }
}

impl<K, V> std::fmt::Debug for InFlightRuns<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let n = self.slots.lock().unwrap_or_else(PoisonError::into_inner).len();
        f.debug_struct("InFlightRuns").field("in_flight", &n).finish()
    }
}

impl<K, V> InFlightRuns<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, Arc<Slot<V>>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs currently being computed
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing is being computed
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `compute` for `key`, or join the run already in flight
    pub fn run<F>(&self, key: K, compute: F) -> EngineResult<V>
    where
        F: FnOnce() -> EngineResult<V>,
    {
        let (slot, leader) = {
            let mut slots = self.lock();
            match slots.get(&key) {
                Some(slot) => (Arc::clone(slot), false),
                None => {
                    let slot = Arc::new(Slot::new());
                    slots.insert(key.clone(), Arc::clone(&slot));
                    (slot, true)
                }
            }
        };

        if !leader {
            debug!("Joining in-flight run");
            return slot.wait();
        }

        let mut guard = LeaderGuard {
            runs: self,
            key,
            slot,
            finished: false,
        };
        let result = compute();
        guard.finish(result.clone());
        result
    }
}

struct LeaderGuard<'a, K: Eq + Hash + Clone, V: Clone> {
    runs: &'a InFlightRuns<K, V>,
    key: K,
    slot: Arc<Slot<V>>,
    finished: bool,
}

impl<K: Eq + Hash + Clone, V: Clone> LeaderGuard<'_, K, V> {
    fn finish(&mut self, result: EngineResult<V>) {
        self.runs.lock().remove(&self.key);
        self.slot.publish(result);
        self.finished = true;
    }
}

impl<K: Eq + Hash + Clone, V: Clone> Drop for LeaderGuard<'_, K, V> {
    fn drop(&mut self) {
        if !self.finished {
            self.finish(Err(EngineError::RunAborted("leader did not complete".into())));
        }
    }
}
