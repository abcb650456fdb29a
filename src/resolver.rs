//! Init-reason resolver.
//!
//! The host only reports the reason of the preceding deinit, and the same reason covers
//! different situations depending on program type, super context, tester mode and host
//! build. The tables below map every documented combination to one [`InitializeReason`];
//! anything else is a [`ResolveAnomaly`].

use crate::compat::{CompatTable, HostQuirk};
use crate::context::TestFlags;
use crate::error::{ResolveAnomaly, SyncError};
use crate::host::HostEnvironment;
use crate::types::{InitializeReason, ProgramType, UninitializeReason};
use tracing::{debug, warn};

/// What is known about an earlier incarnation of the initializing program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorInstance<'a> {
    pub ticks: u64,
    pub symbol: &'a str,
}

/// Resolver inputs for one init call.
#[derive(Debug, Clone, Copy)]
pub struct InitSignals<'a> {
    pub program_type: ProgramType,
    pub program_name: &'a str,
    pub uninit_reason: UninitializeReason,
    /// Test flags of the super context, if the program was started by another program
    pub super_test: Option<TestFlags>,
    pub test: TestFlags,
    /// Limbo master of an indicator, or the surviving context of an expert
    pub prior: Option<PriorInstance<'a>>,
    pub symbol: &'a str,
}

pub struct InitReasonResolver<'a> {
    compat: &'a CompatTable,
    host: &'a dyn HostEnvironment,
}

impl<'a> InitReasonResolver<'a> {
    pub fn new(compat: &'a CompatTable, host: &'a dyn HostEnvironment) -> Self {
        Self { compat, host }
    }

    pub fn resolve(&self, signals: &InitSignals<'_>) -> Result<InitializeReason, SyncError> {
        let reason = match signals.program_type {
            ProgramType::Indicator => self.indicator(signals),
            ProgramType::Expert => self.expert(signals),
            ProgramType::Script => self.script(signals),
        }?;
        debug!(
            program = signals.program_name,
            uninit_reason = %signals.uninit_reason,
            init_reason = %reason,
            build = self.host.build(),
            "Resolved init reason"
        );
        Ok(reason)
    }

    fn quirk(&self, quirk: HostQuirk) -> bool {
        self.compat.is_active(quirk, self.host.build())
    }

    fn indicator(&self, s: &InitSignals<'_>) -> Result<InitializeReason, SyncError> {
        use UninitializeReason as UR;

        match s.uninit_reason {
            UR::Parameters => {
                if s.super_test.is_some() {
                    return Err(self.anomaly(s, "parameter change inside a super context"));
                }
                // Without a limbo master this is a new indicator's first parameter input.
                match s.prior {
                    Some(_) => Ok(InitializeReason::Parameters),
                    None => Ok(InitializeReason::User),
                }
            }
            UR::ChartChange => {
                if s.super_test.is_some() {
                    return Err(self.anomaly(s, "chart change inside a super context"));
                }
                symbol_or_timeframe_change(s)
            }
            UR::Undefined => match s.super_test {
                Some(_) => Ok(InitializeReason::Program),
                None => {
                    if self.quirk(HostQuirk::UndetectableInputDialog) || !self.host.is_ui_thread()
                    {
                        return Ok(InitializeReason::Template);
                    }
                    if self
                        .host
                        .input_dialog_open(ProgramType::Indicator, s.program_name)?
                    {
                        Ok(InitializeReason::User)
                    } else {
                        Ok(InitializeReason::Template)
                    }
                }
            },
            UR::Remove => {
                if self.after_unattended_test(s)
                    && !self.quirk(HostQuirk::AfterTestReportsChartClose)
                {
                    Ok(InitializeReason::ProgramAfterTest)
                } else {
                    Err(self.anomaly(s, "remove outside an unattended test's super context"))
                }
            }
            UR::ChartClose => {
                if self.after_unattended_test(s)
                    && self.quirk(HostQuirk::AfterTestReportsChartClose)
                {
                    Ok(InitializeReason::ProgramAfterTest)
                } else {
                    Err(self.anomaly(s, "chart close outside an unattended test's super context"))
                }
            }
            UR::Recompile => {
                if s.super_test.is_some() {
                    return Err(self.anomaly(s, "recompile inside a super context"));
                }
                Ok(InitializeReason::Recompile)
            }
            UR::Account | UR::Template | UR::InitFailed | UR::Close => {
                Err(self.anomaly(s, "never reported for indicators"))
            }
        }
    }

    fn expert(&self, s: &InitSignals<'_>) -> Result<InitializeReason, SyncError> {
        use UninitializeReason as UR;

        if s.super_test.is_some() {
            return Err(self.anomaly(s, "experts cannot be started by another program"));
        }
        let testing = s.test.testing;

        match s.uninit_reason {
            UR::Parameters if !testing => Ok(InitializeReason::Parameters),
            UR::ChartChange if !testing => symbol_or_timeframe_change(s),
            UR::Recompile if !testing => Ok(InitializeReason::Recompile),
            UR::Template if !testing && !self.quirk(HostQuirk::TemplateReportsChartClose) => {
                Ok(InitializeReason::Template)
            }
            UR::ChartClose if !testing && self.quirk(HostQuirk::TemplateReportsChartClose) => {
                Ok(InitializeReason::Template)
            }
            UR::Remove if !testing => Ok(InitializeReason::User),
            UR::Undefined if testing => {
                // The tester drives experts from its own thread.
                if self.host.is_ui_thread() {
                    Err(self.anomaly(s, "tester expert initialized on the UI thread"))
                } else {
                    Ok(InitializeReason::User)
                }
            }
            UR::Undefined => {
                if self
                    .host
                    .input_dialog_open(ProgramType::Expert, s.program_name)?
                {
                    Ok(InitializeReason::User)
                } else {
                    Ok(InitializeReason::Template)
                }
            }
            _ if testing => Err(self.anomaly(s, "not reported for experts in the tester")),
            _ => Err(self.anomaly(s, "not reported for experts")),
        }
    }

    fn script(&self, s: &InitSignals<'_>) -> Result<InitializeReason, SyncError> {
        match (s.uninit_reason, s.super_test) {
            (UninitializeReason::Undefined, None) => Ok(InitializeReason::User),
            (_, Some(_)) => Err(self.anomaly(s, "scripts cannot be started by another program")),
            _ => Err(self.anomaly(s, "scripts have no init cycles")),
        }
    }

    fn after_unattended_test(&self, s: &InitSignals<'_>) -> bool {
        s.super_test.map_or(false, |t| t.is_headless())
    }

    fn anomaly(&self, s: &InitSignals<'_>, detail: &str) -> SyncError {
        let anomaly = ResolveAnomaly {
            program_type: s.program_type,
            uninit_reason: s.uninit_reason,
            has_super: s.super_test.is_some(),
            testing: s.test.testing,
            visual_mode: s.test.visual_mode,
            build: self.host.build(),
            detail: detail.to_string(),
        };
        warn!(program = s.program_name, "{}", anomaly);
        SyncError::Anomaly(anomaly)
    }
}

fn symbol_or_timeframe_change(s: &InitSignals<'_>) -> Result<InitializeReason, SyncError> {
    let prior = s.prior.ok_or_else(|| {
        SyncError::Runtime(format!(
            "no previous instance of {} found during {}",
            s.program_name, s.uninit_reason
        ))
    })?;
    if prior.symbol == s.symbol {
        Ok(InitializeReason::TimeframeChange)
    } else {
        Ok(InitializeReason::SymbolChange)
    }
}
