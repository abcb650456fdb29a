//! Context chain: every execution context belonging to one program instance.
//!
//! Slot layout follows the host convention: the master context first, then the main
//! module's context (absent while in limbo), then library contexts in attachment order.

use crate::context::SharedContext;
use crate::types::{Hwnd, Phase, ProgramId, ProgramType, ThreadId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub struct ContextChain {
    pid: ProgramId,
    master: SharedContext,
    main: Option<SharedContext>,
    libraries: Vec<SharedContext>,
    created_by: ThreadId,
    created_at: DateTime<Utc>,
}

impl ContextChain {
    pub fn new(
        pid: ProgramId,
        master: SharedContext,
        main: SharedContext,
        created_by: ThreadId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            pid,
            master,
            main: Some(main),
            libraries: Vec::new(),
            created_by,
            created_at,
        }
    }

    pub fn pid(&self) -> ProgramId {
        self.pid
    }

    /// Persistent backing state; valid for the whole process lifetime.
    pub fn master(&self) -> &SharedContext {
        &self.master
    }

    pub fn main(&self) -> Option<&SharedContext> {
        self.main.as_ref()
    }

    /// Main context, or the master while the main module is in limbo.
    pub fn main_or_master(&self) -> &SharedContext {
        self.main.as_ref().unwrap_or(&self.master)
    }

    pub fn is_in_limbo(&self) -> bool {
        self.main.is_none()
    }

    pub fn created_by(&self) -> ThreadId {
        self.created_by
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Drop the main slot; the master is kept.
    pub(crate) fn release_main(&mut self) -> Option<SharedContext> {
        self.main.take()
    }

    pub(crate) fn restore_main(&mut self, main: SharedContext) {
        self.main = Some(main);
    }

    pub fn libraries(&self) -> &[SharedContext] {
        &self.libraries
    }

    pub fn contains_library(&self, lib: &SharedContext) -> bool {
        self.libraries.iter().any(|l| Arc::ptr_eq(l, lib))
    }

    pub(crate) fn push_library(&mut self, lib: SharedContext) {
        if !self.contains_library(&lib) {
            self.libraries.push(lib);
        }
    }

    /// Detach libraries whose module is between init cycles.
    pub(crate) fn take_idle_libraries(&mut self) -> Vec<SharedContext> {
        let (idle, active): (Vec<_>, Vec<_>) = self
            .libraries
            .drain(..)
            .partition(|lib| lib.read().phase.is_idle());
        self.libraries = active;
        idle
    }

    /// Number of slots, master and main included.
    pub fn slot_count(&self) -> usize {
        2 + self.libraries.len()
    }

    pub fn summary(&self) -> ChainSummary {
        let master = self.master.read();
        ChainSummary {
            pid: self.pid,
            program_type: master.program_type,
            program_name: master.program_name.clone(),
            phase: master.phase,
            chart: master.chart,
            in_limbo: self.is_in_limbo(),
            libraries: self
                .libraries
                .iter()
                .map(|lib| lib.read().module_name.clone())
                .collect(),
            created_by: self.created_by,
            created_at: self.created_at,
        }
    }
}

/// Serializable view of a chain, for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSummary {
    pub pid: ProgramId,
    pub program_type: Option<ProgramType>,
    pub program_name: String,
    pub phase: Phase,
    pub chart: Hwnd,
    pub in_limbo: bool,
    pub libraries: Vec<String>,
    pub created_by: ThreadId,
    pub created_at: DateTime<Utc>,
}
