//! Context synchronizers.
//!
//! [`ContextSync`] is the single entry point the host drives at every lifecycle transition
//! of a program's modules. Main-module transitions live in [`main`], library transitions in
//! [`library`]. The registry and host are injected; nothing here is process-global.

mod library;
mod main;

pub use library::LibraryInit;
pub use main::MainInit;

use crate::compat::CompatTable;
use crate::config::SyncConfig;
use crate::context::{ProgramLogSettings, SharedContext};
use crate::error::SyncError;
use crate::host::HostEnvironment;
use crate::registry::ContextRegistry;
use crate::types::ProgramId;
use std::sync::Arc;

pub struct ContextSync {
    registry: Arc<ContextRegistry>,
    host: Arc<dyn HostEnvironment>,
    compat: CompatTable,
    program_logging: ProgramLogSettings,
}

impl ContextSync {
    pub fn new(registry: Arc<ContextRegistry>, host: Arc<dyn HostEnvironment>) -> Self {
        Self {
            registry,
            host,
            compat: CompatTable::builtin(),
            program_logging: ProgramLogSettings::default(),
        }
    }

    /// Synchronizer using the configured compatibility entries and program logging defaults.
    pub fn from_config(
        registry: Arc<ContextRegistry>,
        host: Arc<dyn HostEnvironment>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            registry,
            host,
            compat: CompatTable::with_entries(config.compat.iter().cloned()),
            program_logging: config.programs.clone(),
        }
    }

    pub fn with_compat(mut self, compat: CompatTable) -> Self {
        self.compat = compat;
        self
    }

    pub fn registry(&self) -> &Arc<ContextRegistry> {
        &self.registry
    }

    pub fn host(&self) -> &dyn HostEnvironment {
        self.host.as_ref()
    }

    pub fn compat(&self) -> &CompatTable {
        &self.compat
    }

    /// Copy the current contents of `ctx` into its program's master context.
    fn refresh_master(&self, pid: ProgramId, ctx: &SharedContext) -> Result<(), SyncError> {
        let master = self.registry.master(pid)?;
        if Arc::ptr_eq(&master, ctx) {
            return Ok(());
        }
        let snapshot = ctx.read().clone();
        *master.write() = snapshot;
        Ok(())
    }
}

/// Program id of `ctx`, or `IllegalState` naming the rejected `operation`.
fn require_pid(ctx: &SharedContext, operation: &str) -> Result<ProgramId, SyncError> {
    ctx.read().pid.ok_or_else(|| {
        SyncError::IllegalState(format!("{} before init: context has no program id", operation))
    })
}

fn require_non_empty(value: &str, what: &str) -> Result<(), SyncError> {
    if value.is_empty() {
        return Err(SyncError::InvalidArgument(format!("empty {}", what)));
    }
    Ok(())
}
