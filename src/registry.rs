//! Chain registry: process-lifetime directory of program instances.
//!
//! A chain's position is its program id. Slot 0 is reserved and never stored, so the chain
//! of program `n` lives at storage index `n - 1`. Chains are only ever appended: ids stay
//! valid for later limbo lookups and readers never observe a removal.
//!
//! Structural mutation (new chains, library attachment, thread-map growth) is serialized by
//! one structure lock. Readers walk the chain vector without it.

use crate::chain::{ChainSummary, ContextChain};
use crate::context::SharedContext;
use crate::error::SyncError;
use crate::threads::ThreadTracker;
use crate::types::{ProgramId, ThreadId};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::sync::Arc;
use tracing::{debug, trace};

pub struct ContextRegistry {
    chains: boxcar::Vec<RwLock<ContextChain>>,
    threads: ThreadTracker,
    structure: Mutex<()>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self {
            chains: boxcar::Vec::new(),
            threads: ThreadTracker::new(),
            structure: Mutex::new(()),
        }
    }

    /// Registry size including the reserved slot 0.
    pub fn len(&self) -> usize {
        self.chains.count() + 1
    }

    /// Number of program chains.
    pub fn chain_count(&self) -> usize {
        self.chains.count()
    }

    pub fn is_empty(&self) -> bool {
        self.chain_count() == 0
    }

    pub fn threads(&self) -> &ThreadTracker {
        &self.threads
    }

    /// Take the structure lock.
    ///
    /// Must not be held while entering caller-defined critical sections.
    pub fn lock_structure(&self) -> MutexGuard<'_, ()> {
        self.structure.lock()
    }

    pub fn chain(&self, pid: ProgramId) -> Option<&RwLock<ContextChain>> {
        self.chains.get(pid.get() as usize - 1)
    }

    pub fn chain_or_error(&self, pid: ProgramId) -> Result<&RwLock<ContextChain>, SyncError> {
        self.chain(pid)
            .ok_or_else(|| SyncError::InvalidArgument(format!("unknown program id {}", pid)))
    }

    /// Chains in insertion order.
    pub fn chains(&self) -> impl Iterator<Item = &RwLock<ContextChain>> + '_ {
        (0..self.chains.count()).filter_map(move |i| self.chains.get(i))
    }

    /// Append a new chain and return its program id.
    pub(crate) fn create_chain(
        &self,
        structure: &MutexGuard<'_, ()>,
        master: SharedContext,
        main: SharedContext,
        thread: ThreadId,
        now: DateTime<Utc>,
    ) -> Result<ProgramId, SyncError> {
        let _ = structure;
        let raw = u32::try_from(self.chains.count() + 1)
            .ok()
            .and_then(ProgramId::new)
            .ok_or_else(|| SyncError::Runtime("program id space exhausted".to_string()))?;
        let index = self
            .chains
            .push(RwLock::new(ContextChain::new(raw, master, main, thread, now)));
        debug_assert_eq!(index + 1, raw.get() as usize);
        debug!(pid = %raw, thread = %thread, "Created context chain");
        Ok(raw)
    }

    /// Record `thread -> pid` in the thread map.
    pub fn record_thread(&self, thread: ThreadId, pid: ProgramId) {
        if self.threads.last_program(thread) == Some(pid) {
            return;
        }
        let guard = self.lock_structure();
        self.threads.record(thread, pid, &guard);
        trace!(thread = %thread, pid = %pid, "Thread now executes program");
    }

    /// Master context of a program.
    pub fn master(&self, pid: ProgramId) -> Result<SharedContext, SyncError> {
        Ok(self.chain_or_error(pid)?.read().master().clone())
    }

    /// Main context of a program, or the master while the main module is in limbo.
    pub fn main_or_master(&self, pid: ProgramId) -> Result<SharedContext, SyncError> {
        Ok(self.chain_or_error(pid)?.read().main_or_master().clone())
    }

    /// Resolve the super context of `ctx`.
    ///
    /// Fails while the super program's main module is in limbo instead of handing out its
    /// master as if it were live.
    pub fn super_context(&self, ctx: &SharedContext) -> Result<Option<SharedContext>, SyncError> {
        let Some(super_pid) = ctx.read().super_pid else {
            return Ok(None);
        };
        let chain = self.chain_or_error(super_pid)?.read();
        match chain.main() {
            Some(main) => Ok(Some(main.clone())),
            None => Err(SyncError::IllegalState(format!(
                "super context of program {} is in limbo",
                super_pid
            ))),
        }
    }

    /// Set the last error of `ctx` and propagate it.
    ///
    /// A library's error goes to its program's main context (the master while in limbo);
    /// any context's error also goes to its super context's program. Clearing an error
    /// never propagates.
    pub fn set_mql_error(&self, ctx: &SharedContext, code: i32) -> Result<(), SyncError> {
        let (is_library, pid, super_pid) = {
            let mut c = ctx.write();
            c.mql_error = code;
            (c.is_library(), c.pid, c.super_pid)
        };
        if code == 0 {
            return Ok(());
        }

        if is_library {
            if let Some(pid) = pid {
                let target = self.main_or_master(pid)?;
                if !Arc::ptr_eq(&target, ctx) {
                    target.write().mql_error = code;
                }
            }
        }
        if let Some(super_pid) = super_pid {
            let target = self.main_or_master(super_pid)?;
            target.write().mql_error = code;
        }
        Ok(())
    }

    /// Serializable view of every chain.
    pub fn snapshot(&self) -> Vec<ChainSummary> {
        self.chains().map(|chain| chain.read().summary()).collect()
    }
}

impl Default for ContextRegistry {
    fn default() -> Self {
        Self::new()
    }
}
