//! Services consumed from the embedding host.

use crate::error::HostError;
use crate::types::{Hwnd, ProgramType, ThreadId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One chart surface as reported by host window enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceInfo {
    /// Drawing surface a program binds to
    pub chart: Hwnd,
    /// Frame window hosting the surface
    pub chart_window: Hwnd,
    /// Title-bar text of the frame window, e.g. "EURUSD,H1"; empty until the host assigns it
    pub title: String,
    /// Native ordering identifier of the frame window
    pub order: u32,
    /// Creation sequence; higher means created more recently
    pub created_seq: u64,
}

/// Host thread identity, version, clock and UI enumeration.
///
/// Implementations must be callable from any host thread.
pub trait HostEnvironment: Send + Sync {
    /// Thread the caller is running on.
    fn current_thread(&self) -> ThreadId;

    /// The host's UI thread.
    fn ui_thread(&self) -> ThreadId;

    fn is_ui_thread(&self) -> bool {
        self.current_thread() == self.ui_thread()
    }

    /// Host build number.
    fn build(&self) -> u32;

    fn now(&self) -> DateTime<Utc>;

    /// Top-level chart surfaces, in enumeration order.
    fn chart_surfaces(&self) -> Result<Vec<SurfaceInfo>, HostError>;

    /// Whether the input-parameters dialog of the named program is currently open.
    fn input_dialog_open(
        &self,
        program_type: ProgramType,
        program_name: &str,
    ) -> Result<bool, HostError>;
}
