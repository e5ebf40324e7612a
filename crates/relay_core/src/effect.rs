use crate::view_model::StatusReport;
use crate::{RunStatus, SiteConfig};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEffect {
    /// Persist the run status together with the site snapshot of a new run.
    PublishRun {
        status: RunStatus,
        sites: Vec<SiteConfig>,
    },
    PublishStatus(RunStatus),
    /// Empty the result buffer, the record list and the external sink.
    ClearResults,
    /// Reset the site's redirect depth and open `url` in a new page context.
    /// `delayed` opens are spaced from the previous page closing.
    OpenSite {
        site_index: usize,
        url: String,
        delayed: bool,
    },
    ArmGuard { run_id: u64 },
    DisarmGuard,
    Report(StatusReport),
}
