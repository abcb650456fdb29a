//! Chart locator: which chart surface a program instance is bound to.
//!
//! Pure function of the host's UI state; nothing is cached.

use crate::context::{ExecutionContext, TestFlags};
use crate::error::SyncError;
use crate::host::{HostEnvironment, SurfaceInfo};
use crate::types::{Hwnd, ModuleType, Timeframe};
use tracing::debug;

/// Resolved chart binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartBinding {
    Surface { chart: Hwnd, chart_window: Hwnd },
    /// Tester without visual replay: no chart exists.
    Headless,
}

impl ChartBinding {
    pub fn chart(&self) -> Hwnd {
        match self {
            ChartBinding::Surface { chart, .. } => *chart,
            ChartBinding::Headless => Hwnd::NONE,
        }
    }

    pub fn chart_window(&self) -> Hwnd {
        match self {
            ChartBinding::Surface { chart_window, .. } => *chart_window,
            ChartBinding::Headless => Hwnd::NONE,
        }
    }
}

/// Inputs for one lookup.
#[derive(Debug, Clone, Copy)]
pub struct ChartRequest<'a> {
    /// Handle supplied by the host, `Hwnd::NONE` if unknown
    pub explicit: Hwnd,
    pub super_context: Option<&'a ExecutionContext>,
    pub module_type: ModuleType,
    pub test: TestFlags,
    pub symbol: &'a str,
    pub timeframe: Timeframe,
}

pub struct ChartLocator<'h> {
    host: &'h dyn HostEnvironment,
}

impl<'h> ChartLocator<'h> {
    pub fn new(host: &'h dyn HostEnvironment) -> Self {
        Self { host }
    }

    pub fn locate(&self, req: &ChartRequest<'_>) -> Result<ChartBinding, SyncError> {
        if req.explicit.is_set() {
            let chart_window = self
                .host
                .chart_surfaces()?
                .iter()
                .find(|s| s.chart == req.explicit)
                .map_or(Hwnd::NONE, |s| s.chart_window);
            return Ok(ChartBinding::Surface {
                chart: req.explicit,
                chart_window,
            });
        }

        if let Some(sec) = req.super_context {
            if !sec.chart.is_set() {
                return Ok(ChartBinding::Headless);
            }
            return Ok(ChartBinding::Surface {
                chart: sec.chart,
                chart_window: sec.chart_window,
            });
        }

        if req.test.is_headless() {
            return Ok(ChartBinding::Headless);
        }

        match req.module_type {
            ModuleType::Indicator => self.find_new_indicator_chart(),
            ModuleType::Script | ModuleType::Expert => {
                self.find_chart_by_title(req.symbol, req.timeframe)
            }
            ModuleType::Library => Err(SyncError::InvalidArgument(
                "libraries inherit the chart of their program".to_string(),
            )),
        }
    }

    /// The host assigns titles after creating a chart, so an indicator loading onto a new
    /// chart finds it as the most recently created untitled surface.
    fn find_new_indicator_chart(&self) -> Result<ChartBinding, SyncError> {
        if !self.host.is_ui_thread() {
            return Err(SyncError::IllegalState(format!(
                "indicator chart lookup off the UI thread (thread {})",
                self.host.current_thread()
            )));
        }
        let surfaces = self.host.chart_surfaces()?;
        let found = surfaces
            .iter()
            .filter(|s| s.title.is_empty())
            .max_by_key(|s| s.created_seq)
            .ok_or_else(|| {
                SyncError::Runtime(format!(
                    "no untitled chart among {} surfaces",
                    surfaces.len()
                ))
            })?;
        debug!(chart = %found.chart, "Indicator bound to newest untitled chart");
        Ok(binding(found))
    }

    fn find_chart_by_title(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<ChartBinding, SyncError> {
        let title = chart_title(symbol, timeframe);
        let offline = format!("{} (offline)", title);
        let surfaces = self.host.chart_surfaces()?;
        let found = surfaces
            .iter()
            .filter(|s| s.title == title || s.title == offline)
            .min_by_key(|s| s.order)
            .ok_or_else(|| SyncError::Runtime(format!("no chart titled \"{}\"", title)))?;
        debug!(chart = %found.chart, title = %title, "Bound to chart by title");
        Ok(binding(found))
    }
}

fn binding(surface: &SurfaceInfo) -> ChartBinding {
    ChartBinding::Surface {
        chart: surface.chart,
        chart_window: surface.chart_window,
    }
}

/// Title-bar text the host shows for a chart.
pub fn chart_title(symbol: &str, timeframe: Timeframe) -> String {
    format!("{},{}", symbol, timeframe.description())
}
