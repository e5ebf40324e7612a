use std::fmt;

use crate::{RunPhase, StartError};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DriverView {
    pub phase: RunPhase,
    pub run_id: u64,
    pub active: bool,
    pub step: usize,
    pub total: usize,
    pub last_report: Option<StatusReport>,
    pub dirty: bool,
}

/// User-facing progress and error messages of the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusReport {
    Opening { step: usize, total: usize },
    Copied {
        site_name: String,
        step: usize,
        total: usize,
    },
    Finished { total: usize },
    TimedOut { completed: usize, total: usize },
    Aborted { completed: usize, total: usize },
    Rejected(StartError),
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusReport::Opening { step, total } => {
                write!(f, "Opening site {step}/{total}...")
            }
            StatusReport::Copied {
                site_name,
                step,
                total,
            } => write!(f, "Copied: {site_name} ({step}/{total})"),
            StatusReport::Finished { total } => write!(f, "Done: processed {total} site(s)."),
            StatusReport::TimedOut { completed, total } => {
                write!(f, "Stopped: timed out after {completed}/{total} site(s).")
            }
            StatusReport::Aborted { completed, total } => {
                write!(f, "Aborted after {completed}/{total} site(s).")
            }
            StatusReport::Rejected(err) => write!(f, "Not started: {err}"),
        }
    }
}
