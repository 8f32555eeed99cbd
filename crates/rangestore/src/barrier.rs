//! Readers-writers barrier used for a range's `update_barrier` and `scan_barrier`.
//!
//! Grounded on spec.md §5 and §9's mapping of the source's hand-written
//! condition-variable barriers onto a readers-writers lock: the "reader"
//! side is the common case (many concurrent writers, or many concurrent
//! scanners) and is never blocked by another reader; the "writer"
//! (`activate`) side is used only for structural transitions — split,
//! shrink, relinquish, and compaction staging — and is mutually exclusive
//! with every reader and every other writer.
//!
//! `parking_lot::RwLock` already gives reader preference during normal
//! operation and writer exclusivity on `write()`, so this module is a thin,
//! domain-named wrapper rather than a hand-rolled condition variable.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A readers-writers barrier: many "normal operation" participants
/// (`enter`) run concurrently; `activate` blocks until every current
/// participant has finished, then excludes new ones until the guard drops.
#[derive(Default)]
pub struct Barrier {
    lock: RwLock<()>,
}

/// Held by a normal-operation participant (a writer under `update_barrier`,
/// a scanner under `scan_barrier`) for as long as it needs barrier protection.
pub type BarrierGuard<'a> = RwLockReadGuard<'a, ()>;

/// Held by a structural change (split/shrink/relinquish/compaction staging)
/// while it excludes all normal-operation participants.
pub type ActivationGuard<'a> = RwLockWriteGuard<'a, ()>;

impl Barrier {
    /// Creates a barrier with no participants and no active structural change.
    #[must_use]
    pub fn new() -> Self {
        Barrier {
            lock: RwLock::new(()),
        }
    }

    /// Enters as a normal-operation participant. Blocks only while a
    /// structural change is active; otherwise returns immediately, alongside
    /// any other concurrent participant.
    #[must_use]
    pub fn enter(&self) -> BarrierGuard<'_> {
        self.lock.read()
    }

    /// Activates the barrier for a structural change: blocks new and
    /// existing participants (via the underlying writer-exclusive lock)
    /// until the returned guard is dropped.
    #[must_use]
    pub fn activate(&self) -> ActivationGuard<'_> {
        self.lock.write()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn multiple_readers_proceed_concurrently() {
        let barrier = Arc::new(Barrier::new());
        let g1 = barrier.enter();
        let g2 = barrier.enter();
        drop(g1);
        drop(g2);
    }

    #[test]
    fn activation_excludes_a_later_reader_until_dropped() {
        let barrier = Arc::new(Barrier::new());
        let activation = barrier.activate();
        let barrier2 = Arc::clone(&barrier);
        let handle = thread::spawn(move || {
            let _reader = barrier2.enter();
        });
        thread::sleep(std::time::Duration::from_millis(20));
        drop(activation);
        handle.join().unwrap();
    }
}
