use std::sync::Arc;
use std::time::Duration;

use relay_core::{
    update, DriverEffect, DriverMsg, DriverState, ExtractionRecord, RunPhase, RunStatus, RuleList,
    SiteCompleteNotice, SiteRegistry, StartError, StatusReport,
};
use relay_logging::{relay_error, relay_info, relay_warn};
use serde::Serialize;
use tokio::time::{sleep, sleep_until, Instant};

use crate::browser::Navigator;
use crate::store::{keys, StateStore, StoreExt, Subscription};
use crate::ResultAggregator;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverSettings {
    /// A run that has not finished this long after it started is stopped.
    pub guard_timeout: Duration,
    /// Pause between one site completing and the next one opening.
    pub advance_delay: Duration,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            guard_timeout: Duration::from_secs(120),
            advance_delay: Duration::from_millis(200),
        }
    }
}

/// How a run ended and what it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub run_id: u64,
    pub phase: RunPhase,
    pub reports: Vec<StatusReport>,
    pub records: Vec<ExtractionRecord>,
    pub buffer: String,
}

/// Runs the sequential scrape: feeds store notifications and timer
/// expiries into [`relay_core::update`] and executes the effects it returns.
pub struct Driver {
    store: Arc<dyn StateStore>,
    navigator: Arc<dyn Navigator>,
    aggregator: Arc<ResultAggregator>,
    settings: DriverSettings,
    state: DriverState,
    guard: Option<(u64, Instant)>,
    completions: Option<Subscription>,
    status_changes: Option<Subscription>,
    reports: Vec<StatusReport>,
}

impl Driver {
    pub fn new(
        store: Arc<dyn StateStore>,
        navigator: Arc<dyn Navigator>,
        aggregator: Arc<ResultAggregator>,
        settings: DriverSettings,
    ) -> Self {
        Self {
            store,
            navigator,
            aggregator,
            settings,
            state: DriverState::new(),
            guard: None,
            completions: None,
            status_changes: None,
            reports: Vec::new(),
        }
    }

    pub fn state(&self) -> &DriverState {
        &self.state
    }

    pub fn reports(&self) -> &[StatusReport] {
        &self.reports
    }

    /// Starts a run over the enabled sites currently in the store and opens
    /// the first one.
    pub async fn start(&mut self) -> Result<(), StartError> {
        let sites = self
            .store
            .get_as::<SiteRegistry>(keys::SITES)
            .unwrap_or_default()
            .into_sites();
        let url_rules = self
            .store
            .get_as::<RuleList>(keys::URL_RULES)
            .unwrap_or_default();
        let previous = self.store.get_as::<RunStatus>(keys::RUN_STATUS);

        let was_running = self.state.phase() == RunPhase::Running;
        if !was_running {
            // Watch before the first page can report back.
            self.completions = Some(self.store.subscribe(keys::SITE_COMPLETE));
            self.status_changes = Some(self.store.subscribe(keys::RUN_STATUS));
        }

        self.dispatch(DriverMsg::StartRequested {
            sites,
            url_rules: url_rules.rules().to_vec(),
            previous,
        })
        .await;

        match self.state.view().last_report {
            Some(StatusReport::Rejected(err)) => {
                if !was_running {
                    self.unsubscribe();
                }
                Err(err)
            }
            _ => Ok(()),
        }
    }

    /// Processes events until the current run leaves the running phase.
    pub async fn wait(&mut self) -> RunPhase {
        while self.state.phase() == RunPhase::Running {
            match self.next_message().await {
                Some(msg) => self.dispatch(msg).await,
                None => {
                    relay_error!("State store closed while a run was in progress");
                    break;
                }
            }
        }
        self.unsubscribe();
        self.state.phase()
    }

    /// Starts a run and waits for it to end.
    pub async fn run(&mut self) -> Result<RunSummary, StartError> {
        let first_report = self.reports.len();
        self.start().await?;
        let phase = self.wait().await;
        Ok(RunSummary {
            run_id: self.state.status().run_id,
            phase,
            reports: self.reports[first_report..].to_vec(),
            records: self.aggregator.records(),
            buffer: self.aggregator.current_buffer(),
        })
    }

    async fn next_message(&mut self) -> Option<DriverMsg> {
        let run_id = self.state.status().run_id;
        let guard = self.guard;
        let (Some(completions), Some(status_changes)) =
            (self.completions.as_mut(), self.status_changes.as_mut())
        else {
            return None;
        };

        loop {
            tokio::select! {
                change = completions.recv() => {
                    let Some(value) = change?.value else { continue };
                    match serde_json::from_value::<SiteCompleteNotice>(value) {
                        Ok(notice) => return Some(DriverMsg::SiteCompleted(notice)),
                        Err(err) => relay_warn!("Ignoring malformed completion notice: {err}"),
                    }
                }
                change = status_changes.recv() => {
                    let Some(value) = change?.value else { continue };
                    if let Ok(status) = serde_json::from_value::<RunStatus>(value) {
                        if status.run_id == run_id && !status.active {
                            return Some(DriverMsg::AbortRequested { run_id });
                        }
                    }
                }
                expired = guard_expiry(guard) => {
                    return Some(DriverMsg::GuardElapsed { run_id: expired });
                }
            }
        }
    }

    async fn dispatch(&mut self, msg: DriverMsg) {
        let state = std::mem::take(&mut self.state);
        let (state, effects) = update(state, msg);
        self.state = state;
        for effect in effects {
            self.execute(effect).await;
        }
    }

    async fn execute(&mut self, effect: DriverEffect) {
        match effect {
            DriverEffect::PublishRun { status, sites } => {
                self.write(keys::RUN_SITES, &sites);
                self.write(keys::RUN_STATUS, &status);
            }
            DriverEffect::PublishStatus(status) => self.write(keys::RUN_STATUS, &status),
            DriverEffect::ClearResults => self.aggregator.clear(),
            DriverEffect::OpenSite {
                site_index,
                url,
                delayed,
            } => {
                if delayed {
                    sleep(self.settings.advance_delay).await;
                }
                self.write(&keys::redirect_depth(site_index), &0usize);
                self.write(keys::OPENING_INDEX, &site_index);
                relay_info!("Opening site #{} at {url}", site_index + 1);
                self.navigator.open(&url);
            }
            DriverEffect::ArmGuard { run_id } => {
                self.guard = Instant::now()
                    .checked_add(self.settings.guard_timeout)
                    .map(|deadline| (run_id, deadline));
                if self.guard.is_none() {
                    relay_warn!("Guard timeout too large; run {run_id} has no deadline");
                }
            }
            DriverEffect::DisarmGuard => self.guard = None,
            DriverEffect::Report(report) => {
                relay_info!("{report}");
                self.reports.push(report);
            }
        }
    }

    fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        if let Err(err) = self.store.set_as(key, value) {
            relay_error!("Failed to write {key}: {err}");
        }
    }

    fn unsubscribe(&mut self) {
        self.completions = None;
        self.status_changes = None;
    }
}

async fn guard_expiry(guard: Option<(u64, Instant)>) -> u64 {
    match guard {
        Some((run_id, deadline)) => {
            sleep_until(deadline).await;
            run_id
        }
        None => std::future::pending().await,
    }
}
