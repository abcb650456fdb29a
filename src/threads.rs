//! Thread/Program tracker: which program each host thread executed last.
//!
//! Grows for the lifetime of the process and never shrinks. Lookups run without locking;
//! appends require the registry's structure lock, which callers prove by passing its guard.

use crate::types::{ProgramId, ThreadId};
use parking_lot::MutexGuard;
use std::sync::atomic::{AtomicU32, Ordering};

struct ThreadSlot {
    thread: ThreadId,
    pid: AtomicU32,
}

pub struct ThreadTracker {
    slots: boxcar::Vec<ThreadSlot>,
}

impl ThreadTracker {
    pub fn new() -> Self {
        Self {
            slots: boxcar::Vec::new(),
        }
    }

    fn slot(&self, thread: ThreadId) -> Option<&ThreadSlot> {
        (0..self.slots.count())
            .filter_map(|i| self.slots.get(i))
            .find(|slot| slot.thread == thread)
    }

    /// Program last executed by `thread`.
    pub fn last_program(&self, thread: ThreadId) -> Option<ProgramId> {
        self.slot(thread)
            .and_then(|slot| ProgramId::new(slot.pid.load(Ordering::Acquire)))
    }

    /// Record that `thread` is now executing `pid`.
    pub fn record(&self, thread: ThreadId, pid: ProgramId, _structure: &MutexGuard<'_, ()>) {
        match self.slot(thread) {
            Some(slot) => slot.pid.store(pid.get(), Ordering::Release),
            None => {
                self.slots.push(ThreadSlot {
                    thread,
                    pid: AtomicU32::new(pid.get()),
                });
            }
        }
    }

    /// Number of threads ever seen.
    pub fn len(&self) -> usize {
        self.slots.count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ThreadTracker {
    fn default() -> Self {
        Self::new()
    }
}
