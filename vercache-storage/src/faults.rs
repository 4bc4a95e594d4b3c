//! Call counting and failure injection for the in-memory stores.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, PoisonError};

/// Operations of the volatile store contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VolatileOp {
    Get,
    Set,
    Delete,
    HSet,
    HGetAll,
}

/// Operations of the durable store contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DurableOp {
    Get,
    Set,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FaultMode {
    Once,
    Always,
}

/// Per-operation call counters plus a set of operations that should fail.
#[derive(Debug)]
pub struct FaultInjector<Op> {
    calls: Mutex<HashMap<Op, u64>>,
    faults: Mutex<HashMap<Op, FaultMode>>,
}

impl<Op> Default for FaultInjector<Op> {
    fn default() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
            faults: Mutex::new(HashMap::new()),
        }
    }
}

impl<Op: Copy + Eq + Hash> FaultInjector<Op> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every future call of `op` fail until healed.
    pub fn fail_always(&self, op: Op) {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(op, FaultMode::Always);
    }

    /// Make only the next call of `op` fail.
    pub fn fail_once(&self, op: Op) {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(op, FaultMode::Once);
    }

    pub fn heal(&self, op: Op) {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&op);
    }

    pub fn heal_all(&self) {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of calls of `op` that reached the store.
    pub fn calls(&self, op: Op) -> u64 {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&op)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> u64 {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .sum()
    }

    pub fn reset_calls(&self) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Record a call of `op` and report whether it should fail.
    pub(crate) fn enter(&self, op: Op) -> bool {
        *self
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(op)
            .or_insert(0) += 1;

        let mut faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
        match faults.get(&op).copied() {
            Some(FaultMode::Always) => true,
            Some(FaultMode::Once) => {
                faults.remove(&op);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_calls() {
        let injector = FaultInjector::new();
        assert!(!injector.enter(DurableOp::Get));
        assert!(!injector.enter(DurableOp::Get));
        assert!(!injector.enter(DurableOp::Set));
        assert_eq!(injector.calls(DurableOp::Get), 2);
        assert_eq!(injector.calls(DurableOp::Set), 1);
        assert_eq!(injector.calls(DurableOp::Delete), 0);
        assert_eq!(injector.total_calls(), 3);

        injector.reset_calls();
        assert_eq!(injector.total_calls(), 0);
    }

    #[test]
    fn test_fail_once_then_recovers() {
        let injector = FaultInjector::new();
        injector.fail_once(VolatileOp::Delete);
        assert!(injector.enter(VolatileOp::Delete));
        assert!(!injector.enter(VolatileOp::Delete));
    }

    #[test]
    fn test_fail_always_until_healed() {
        let injector = FaultInjector::new();
        injector.fail_always(VolatileOp::Set);
        assert!(injector.enter(VolatileOp::Set));
        assert!(injector.enter(VolatileOp::Set));
        assert!(!injector.enter(VolatileOp::Get));

        injector.heal(VolatileOp::Set);
        assert!(!injector.enter(VolatileOp::Set));
    }
}
