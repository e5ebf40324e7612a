use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::view_model::{DriverView, StatusReport};
use crate::{ReplacementRule, RunList, SiteConfig, ValidationError};

/// Lifecycle of the driver's current (or last) run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunPhase {
    #[default]
    Idle,
    Running,
    Completed,
    Aborted,
    TimedOut,
}

impl RunPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunPhase::Completed | RunPhase::Aborted | RunPhase::TimedOut
        )
    }
}

/// Run progress as shared with page agents through the store.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatus {
    pub run_id: u64,
    pub active: bool,
    pub run_list: RunList,
    pub current_step: usize,
}

impl RunStatus {
    /// Original index of the site whose completion is awaited.
    pub fn expected_index(&self) -> Option<usize> {
        self.run_list.get(self.current_step).copied()
    }

    pub fn total(&self) -> usize {
        self.run_list.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StartError {
    #[error("no enabled sites to process")]
    NoEligibleSites,
    #[error("a run is already in progress")]
    AlreadyRunning,
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl StartError {
    /// True for rejections caused by the site configuration itself.
    pub fn is_validation(&self) -> bool {
        matches!(self, StartError::NoEligibleSites | StartError::Validation(_))
    }
}

/// Driver-side state. Only [`crate::update`] mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DriverState {
    pub(crate) phase: RunPhase,
    pub(crate) status: RunStatus,
    pub(crate) sites: Vec<SiteConfig>,
    pub(crate) url_rules: Vec<ReplacementRule>,
    pub(crate) last_report: Option<StatusReport>,
    dirty: bool,
}

impl DriverState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn status(&self) -> &RunStatus {
        &self.status
    }

    /// Site snapshot taken when the current run started.
    pub fn sites(&self) -> &[SiteConfig] {
        &self.sites
    }

    pub fn view(&self) -> DriverView {
        DriverView {
            phase: self.phase,
            run_id: self.status.run_id,
            active: self.status.active,
            step: self.status.current_step,
            total: self.status.total(),
            last_report: self.last_report.clone(),
            dirty: self.dirty,
        }
    }

    /// Returns whether anything changed since the last call and resets the flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn report(&mut self, report: StatusReport) -> StatusReport {
        self.last_report = Some(report.clone());
        self.mark_dirty();
        report
    }
}
