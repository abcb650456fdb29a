//! Host build compatibility table.
//!
//! Several host builds report the same uninit reason for different situations. Each known
//! deviation is a [`HostQuirk`] active over a build range; the resolver asks the table
//! instead of comparing build numbers inline. A newly observed build is a table entry.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// A known deviation in host reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HostQuirk {
    /// The input dialog of a freshly attached indicator cannot be probed: an undefined
    /// uninit reason outside a super context always means a template load.
    UndetectableInputDialog,
    /// After an unattended test, programmatically loaded indicators re-enter init with
    /// chart-close instead of remove.
    AfterTestReportsChartClose,
    /// Experts reloaded by a template report chart-close instead of template.
    TemplateReportsChartClose,
}

/// One table row: `quirk` is active for `first_build ..= last_build`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatEntry {
    pub quirk: HostQuirk,
    #[serde(default)]
    pub first_build: u32,
    /// Open-ended when absent
    #[serde(default)]
    pub last_build: Option<u32>,
}

impl CompatEntry {
    pub fn new(quirk: HostQuirk, first_build: u32, last_build: Option<u32>) -> Self {
        Self {
            quirk,
            first_build,
            last_build,
        }
    }

    pub fn covers(&self, build: u32) -> bool {
        build >= self.first_build && self.last_build.map_or(true, |last| build <= last)
    }

    pub fn validate(&self) -> Result<(), String> {
        match self.last_build {
            Some(last) if last < self.first_build => Err(format!(
                "{}: last_build {} precedes first_build {}",
                self.quirk, last, self.first_build
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompatTable {
    entries: Vec<CompatEntry>,
}

impl CompatTable {
    /// Table without any quirks.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Built-in knowledge of host builds.
    pub fn builtin() -> Self {
        Self {
            entries: vec![
                CompatEntry::new(HostQuirk::UndetectableInputDialog, 0, Some(653)),
                CompatEntry::new(HostQuirk::AfterTestReportsChartClose, 0, Some(1064)),
                CompatEntry::new(HostQuirk::TemplateReportsChartClose, 0, Some(509)),
            ],
        }
    }

    /// Built-in entries followed by `extra`.
    pub fn with_entries(extra: impl IntoIterator<Item = CompatEntry>) -> Self {
        let mut table = Self::builtin();
        table.entries.extend(extra);
        table
    }

    pub fn is_active(&self, quirk: HostQuirk, build: u32) -> bool {
        self.entries
            .iter()
            .any(|e| e.quirk == quirk && e.covers(build))
    }

    pub fn entries(&self) -> &[CompatEntry] {
        &self.entries
    }
}

impl Default for CompatTable {
    fn default() -> Self {
        Self::builtin()
    }
}
