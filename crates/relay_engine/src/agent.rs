use std::sync::Arc;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use relay_core::{identify_site, ExtractionRecord, RuleList, RunStatus, SiteCompleteNotice, SiteConfig};
use relay_logging::{relay_debug, relay_error, relay_info, relay_warn};

use crate::browser::Navigator;
use crate::dom::{resolve_link, PageView, QueryResult};
use crate::poll::{collect_selectors, PollSettings};
use crate::store::{keys, StateStore, StoreExt};
use crate::ResultAggregator;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSettings {
    pub poll: PollSettings,
    /// Pause before a finished context is closed.
    pub close_delay: Duration,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            poll: PollSettings::default(),
            close_delay: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentOutcome {
    /// No run is active; the page was left alone.
    Inactive,
    /// The page belongs to no configured site.
    Unidentified,
    /// A redirect link was followed in a new context.
    Redirected {
        site_index: usize,
        depth: usize,
        target: String,
    },
    /// Values were extracted and the driver was notified.
    Published(ExtractionRecord),
}

/// Runs inside every loaded page: identifies the site, follows its redirect
/// chain one hop at a time, and extracts the output values on the last page.
pub struct PageAgent {
    store: Arc<dyn StateStore>,
    aggregator: Arc<ResultAggregator>,
    settings: AgentSettings,
}

impl PageAgent {
    pub fn new(
        store: Arc<dyn StateStore>,
        aggregator: Arc<ResultAggregator>,
        settings: AgentSettings,
    ) -> Self {
        Self {
            store,
            aggregator,
            settings,
        }
    }

    pub async fn run(&self, page: &dyn PageView, navigator: &dyn Navigator) -> AgentOutcome {
        let Some(status) = self
            .store
            .get_as::<RunStatus>(keys::RUN_STATUS)
            .filter(|status| status.active)
        else {
            relay_debug!("No active run; ignoring {}", page.url());
            return AgentOutcome::Inactive;
        };

        let sites: Vec<SiteConfig> = self
            .store
            .get_as(keys::RUN_SITES)
            .or_else(|| self.store.get_as(keys::SITES))
            .unwrap_or_default();
        let fallback = self.store.get_as::<usize>(keys::OPENING_INDEX);
        let Some(site_index) = identify_site(&sites, page.url(), fallback) else {
            relay_info!("{} matches no configured site", page.url());
            return AgentOutcome::Unidentified;
        };
        let site = &sites[site_index];

        if let Some(outcome) = self.follow_redirect(page, navigator, site_index, site).await {
            return outcome;
        }

        let rules: RuleList = self.store.get_as(keys::RESULT_RULES).unwrap_or_default();
        let values = collect_selectors(page, &site.enabled_selectors(), &self.settings.poll)
            .await
            .into_iter()
            .map(|value| rules.apply(&value.into_output(), site_index + 1))
            .collect();
        let record = ExtractionRecord {
            site_index,
            site_name: site.name.clone(),
            page_url: page.url().to_string(),
            values,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };

        self.aggregator.append_record(&record);
        let notice = SiteCompleteNotice::for_record(status.run_id, &record);
        if let Err(err) = self.store.set_as(keys::SITE_COMPLETE, &notice) {
            relay_error!("Failed to report completion of {}: {err}", site.name);
        }
        self.close().await;
        AgentOutcome::Published(record)
    }

    /// Takes the next redirect hop when the site still has one configured
    /// and the page offers a link for it. Returns `None` to extract here.
    async fn follow_redirect(
        &self,
        page: &dyn PageView,
        navigator: &dyn Navigator,
        site_index: usize,
        site: &SiteConfig,
    ) -> Option<AgentOutcome> {
        let depth_key = keys::redirect_depth(site_index);
        let depth: usize = self.store.get_as(&depth_key).unwrap_or(0);
        let selector = site.redirect_selectors.get(depth)?.trim();
        if selector.is_empty() {
            return None;
        }

        let element = match page.query(selector) {
            QueryResult::Match(element) if element.tag == "a" => element,
            QueryResult::Match(element) => {
                relay_info!("Redirect selector {selector:?} matched <{}>, not a link", element.tag);
                return None;
            }
            QueryResult::NoMatch => {
                relay_info!("Redirect selector {selector:?} not found on {}", page.url());
                return None;
            }
            QueryResult::InvalidSelector(message) => {
                relay_warn!("Redirect selector {selector:?} is invalid: {message}");
                return None;
            }
        };
        let Some(target) = element
            .href
            .as_deref()
            .and_then(|href| resolve_link(page.url(), href))
        else {
            relay_info!("Redirect link on {} has no usable href", page.url());
            return None;
        };

        let next_depth = depth + 1;
        if let Err(err) = self.store.set_as(&depth_key, &next_depth) {
            relay_error!("Failed to record redirect depth for {}: {err}", site.name);
        }
        relay_info!("Following redirect {next_depth} of {} to {target}", site.name);
        navigator.open(&target);
        self.close().await;
        Some(AgentOutcome::Redirected {
            site_index,
            depth: next_depth,
            target,
        })
    }

    async fn close(&self) {
        tokio::time::sleep(self.settings.close_delay).await;
    }
}
