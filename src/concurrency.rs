//! Keyed critical sections for caller-defined regions.
//!
//! Each key (usually a call-site identity) owns one mutex, created on first use. Guards own
//! their mutex, so a section may outlive the borrow of [`CriticalSections`]. These locks have
//! no ordering relation with the registry's structure lock and must never be taken while it
//! is held.

use parking_lot::{ArcMutexGuard, Mutex, RawMutex};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

pub type SectionGuard = ArcMutexGuard<RawMutex, ()>;

#[derive(Default)]
pub struct CriticalSections {
    sections: Mutex<HashMap<u64, Arc<Mutex<()>>>>,
}

impl CriticalSections {
    pub fn new() -> Self {
        Self::default()
    }

    fn section(&self, key: u64) -> Arc<Mutex<()>> {
        self.sections
            .lock()
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Enter the section for `key`, blocking while another thread holds it.
    pub fn enter(&self, key: u64) -> SectionGuard {
        let section = self.section(key);
        trace!(key, "Entering critical section");
        section.lock_arc()
    }

    /// Enter the section for `key` if it is free.
    pub fn try_enter(&self, key: u64) -> Option<SectionGuard> {
        self.section(key).try_lock_arc()
    }

    /// Number of keys seen so far.
    pub fn len(&self) -> usize {
        self.sections.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
