use std::time::Duration;

use relay_core::SelectorValue;
use relay_logging::{relay_debug, relay_trace};
use tokio::time::{sleep, Instant};

use crate::dom::{PageView, QueryResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(250),
            timeout: Duration::from_secs(20),
        }
    }
}

/// Resolves `selectors` against `page`, re-checking every interval.
///
/// All values start as `NotFound`. Each round updates every slot, and
/// polling ends after the first round in which any selector matched or
/// once the timeout has passed. Element text is trimmed.
pub async fn collect_selectors(
    page: &dyn PageView,
    selectors: &[String],
    settings: &PollSettings,
) -> Vec<SelectorValue> {
    let mut values = vec![SelectorValue::NotFound; selectors.len()];
    if selectors.is_empty() {
        return values;
    }

    let started = Instant::now();
    let mut rounds = 0usize;
    loop {
        rounds += 1;
        relay_trace!("Polling round {rounds} on {}", page.url());
        if poll_round(page, selectors, &mut values) {
            relay_debug!("Selectors matched on {} after {rounds} round(s)", page.url());
            return values;
        }
        if started.elapsed() >= settings.timeout {
            relay_debug!("Selector polling timed out on {}", page.url());
            return values;
        }
        sleep(settings.interval).await;
    }
}

fn poll_round(page: &dyn PageView, selectors: &[String], values: &mut [SelectorValue]) -> bool {
    let mut positions = Vec::with_capacity(selectors.len());
    let mut queried = Vec::with_capacity(selectors.len());
    for (position, selector) in selectors.iter().enumerate() {
        let selector = selector.trim();
        if selector.is_empty() {
            values[position] = SelectorValue::BlankSelector;
        } else {
            positions.push(position);
            queried.push(selector.to_string());
        }
    }

    let mut any_match = false;
    for (position, result) in positions.into_iter().zip(page.query_all(&queried)) {
        values[position] = match result {
            QueryResult::Match(element) => {
                any_match = true;
                let text = element.text.trim();
                if text.is_empty() {
                    SelectorValue::EmptyText
                } else {
                    SelectorValue::Text(text.to_string())
                }
            }
            QueryResult::NoMatch => SelectorValue::NotFound,
            QueryResult::InvalidSelector(message) => {
                relay_debug!("Selector {:?} is invalid: {message}", selectors[position]);
                SelectorValue::SelectorError
            }
        };
    }
    any_match
}
