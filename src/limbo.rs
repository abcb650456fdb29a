//! Limbo scanner.
//!
//! Between the deinit and the next init of an init cycle the host destroys the indicator's
//! module memory and hands over a fresh context. Nothing the host provides links the two, so
//! continuity is recovered by matching stable attributes of each chain's master context.
//! This is a heuristic: a miss means "start a new program", never an error.

use crate::error::SyncError;
use crate::registry::ContextRegistry;
use crate::types::{Hwnd, ProgramId, ProgramType, ThreadId, UninitializeReason};
use tracing::{debug, trace};

/// Attributes a limbo master must match.
#[derive(Debug, Clone, Copy)]
pub struct LimboQuery<'a> {
    pub chart: Hwnd,
    pub program_name: &'a str,
    pub uninit_reason: UninitializeReason,
}

pub struct LimboScanner<'r> {
    registry: &'r ContextRegistry,
    ui_thread: ThreadId,
}

impl<'r> LimboScanner<'r> {
    pub fn new(registry: &'r ContextRegistry, ui_thread: ThreadId) -> Self {
        Self {
            registry,
            ui_thread,
        }
    }

    /// First chain in registry order whose indicator is in limbo and matches `query`.
    ///
    /// Chains orphaned by an earlier reload that started a new program still match, so an
    /// older chain on the same chart can win over a newer one.
    pub fn find(&self, query: &LimboQuery<'_>) -> Result<Option<ProgramId>, SyncError> {
        if query.program_name.is_empty() {
            return Err(SyncError::InvalidArgument(
                "limbo lookup without a program name".to_string(),
            ));
        }
        if query.chart == Hwnd::INVALID {
            return Err(SyncError::InvalidArgument(
                "limbo lookup with an invalid chart handle".to_string(),
            ));
        }

        for chain in self.registry.chains() {
            let chain = chain.read();
            if !chain.is_in_limbo() || chain.created_by() != self.ui_thread {
                continue;
            }
            let master = chain.master().read();
            let matched = master.chart == query.chart
                && master.program_type == Some(ProgramType::Indicator)
                && master.program_name == query.program_name
                && master.uninit_reason == query.uninit_reason
                && master.phase.is_idle();
            trace!(pid = %chain.pid(), matched, "Checked limbo candidate");
            if matched {
                debug!(
                    pid = %chain.pid(),
                    program = query.program_name,
                    chart = %query.chart,
                    "Found indicator in limbo"
                );
                return Ok(Some(chain.pid()));
            }
        }
        Ok(None)
    }
}
