use std::sync::Arc;

use relay_core::{RuleList, RunStatus, SiteRegistry};
use relay_logging::relay_info;
use tokio::runtime::Handle;

use crate::agent::{AgentSettings, PageAgent};
use crate::browser::HttpBrowser;
use crate::driver::{Driver, DriverSettings};
use crate::fetch::{FetchSettings, PageFetcher, ReqwestFetcher};
use crate::store::{keys, StateStore, StoreError, StoreExt};
use crate::{ResultAggregator, ResultSink};

/// Everything tunable about a relay run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySettings {
    pub driver: DriverSettings,
    pub agent: AgentSettings,
    pub fetch: FetchSettings,
    /// Inserted between the rows of consecutive sites in the result buffer.
    pub row_delimiter: String,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            driver: DriverSettings::default(),
            agent: AgentSettings::default(),
            fetch: FetchSettings::default(),
            row_delimiter: "\t".to_string(),
        }
    }
}

/// Which of the two replacement rule lists an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    /// Rewrites site URLs before they are opened.
    Url,
    /// Rewrites extracted values before they are stored.
    Result,
}

impl RuleKind {
    pub fn key(self) -> &'static str {
        match self {
            RuleKind::Url => keys::URL_RULES,
            RuleKind::Result => keys::RESULT_RULES,
        }
    }
}

/// Wires the store, the result aggregator, the browser and the driver
/// together.
pub struct RelayEngine {
    store: Arc<dyn StateStore>,
    aggregator: Arc<ResultAggregator>,
    browser: HttpBrowser,
    settings: RelaySettings,
}

impl RelayEngine {
    /// Builds an engine that loads pages over HTTP. Page contexts are
    /// spawned on `runtime`.
    pub fn new(
        store: Arc<dyn StateStore>,
        sink: Arc<dyn ResultSink>,
        settings: RelaySettings,
        runtime: Handle,
    ) -> Self {
        let fetcher: Arc<dyn PageFetcher> = Arc::new(ReqwestFetcher::new(settings.fetch.clone()));
        Self::with_fetcher(store, sink, fetcher, settings, runtime)
    }

    pub fn with_fetcher(
        store: Arc<dyn StateStore>,
        sink: Arc<dyn ResultSink>,
        fetcher: Arc<dyn PageFetcher>,
        settings: RelaySettings,
        runtime: Handle,
    ) -> Self {
        let aggregator = Arc::new(ResultAggregator::new(
            store.clone(),
            sink,
            settings.row_delimiter.clone(),
        ));
        let agent = PageAgent::new(store.clone(), aggregator.clone(), settings.agent.clone());
        let browser = HttpBrowser::new(fetcher, agent, runtime);
        Self {
            store,
            aggregator,
            browser,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    pub fn aggregator(&self) -> &Arc<ResultAggregator> {
        &self.aggregator
    }

    pub fn browser(&self) -> &HttpBrowser {
        &self.browser
    }

    pub fn driver(&self) -> Driver {
        Driver::new(
            self.store.clone(),
            Arc::new(self.browser.clone()),
            self.aggregator.clone(),
            self.settings.driver.clone(),
        )
    }

    /// The stored registry, or the built-in example when none was saved.
    pub fn registry(&self) -> SiteRegistry {
        self.store.get_as(keys::SITES).unwrap_or_default()
    }

    pub fn save_registry(&self, registry: &SiteRegistry) -> Result<(), StoreError> {
        self.store.set_as(keys::SITES, registry)
    }

    pub fn rules(&self, kind: RuleKind) -> RuleList {
        self.store.get_as(kind.key()).unwrap_or_default()
    }

    pub fn save_rules(&self, kind: RuleKind, rules: &RuleList) -> Result<(), StoreError> {
        self.store.set_as(kind.key(), rules)
    }

    pub fn run_status(&self) -> Option<RunStatus> {
        self.store.get_as(keys::RUN_STATUS)
    }

    /// Clears the active flag of the current run. A driver watching the
    /// store stops on its own; returns false when nothing was running.
    pub fn abort(&self) -> Result<bool, StoreError> {
        let Some(mut status) = self.run_status().filter(|status| status.active) else {
            return Ok(false);
        };
        status.active = false;
        self.store.set_as(keys::RUN_STATUS, &status)?;
        relay_info!("Requested abort of run {}", status.run_id);
        Ok(true)
    }
}
