use crate::{ReplacementRule, RunStatus, SiteCompleteNotice, SiteConfig};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverMsg {
    /// User asked to start a run. `previous` is the run status currently
    /// held by the shared store, if any.
    StartRequested {
        sites: Vec<SiteConfig>,
        url_rules: Vec<ReplacementRule>,
        previous: Option<RunStatus>,
    },
    /// A page agent published its completion notice.
    SiteCompleted(SiteCompleteNotice),
    /// The guard timer armed for `run_id` expired.
    GuardElapsed { run_id: u64 },
    /// Another context cleared the active flag of `run_id`.
    AbortRequested { run_id: u64 },
    NoOp,
}
