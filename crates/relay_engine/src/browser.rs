use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use relay_logging::{relay_debug, relay_warn};
use tokio::runtime::Handle;

use crate::agent::{AgentOutcome, PageAgent};
use crate::decode::decode_page;
use crate::dom::DomPage;
use crate::fetch::PageFetcher;

/// Opens URLs in fresh, independent browsing contexts.
pub trait Navigator: Send + Sync {
    /// Starts loading `url` in a new context and returns immediately.
    fn open(&self, url: &str);
}

/// Headless browser: each context fetches one page over HTTP, hands it to
/// a [`PageAgent`] and closes when the agent is done.
#[derive(Clone)]
pub struct HttpBrowser {
    inner: Arc<BrowserInner>,
}

struct BrowserInner {
    fetcher: Arc<dyn PageFetcher>,
    agent: PageAgent,
    runtime: Handle,
    live: AtomicUsize,
    opened: AtomicUsize,
}

impl HttpBrowser {
    pub fn new(fetcher: Arc<dyn PageFetcher>, agent: PageAgent, runtime: Handle) -> Self {
        Self {
            inner: Arc::new(BrowserInner {
                fetcher,
                agent,
                runtime,
                live: AtomicUsize::new(0),
                opened: AtomicUsize::new(0),
            }),
        }
    }

    /// Contexts opened through [`Navigator::open`] that have not closed yet.
    pub fn live_contexts(&self) -> usize {
        self.inner.live.load(Ordering::SeqCst)
    }

    pub fn opened_contexts(&self) -> usize {
        self.inner.opened.load(Ordering::SeqCst)
    }

    /// Loads `url` and runs the agent on it in the current task.
    ///
    /// A page that cannot be fetched or decoded becomes an empty document,
    /// so the agent still runs and reports its selectors as not found.
    pub async fn visit(&self, url: &str) -> AgentOutcome {
        let page = match self.inner.fetcher.fetch(url).await {
            Ok(fetched) => {
                let content_type = fetched.metadata.content_type.as_deref();
                match decode_page(&fetched.bytes, content_type) {
                    Ok(decoded) => {
                        relay_debug!(
                            "Loaded {} ({} bytes, {})",
                            fetched.metadata.final_url,
                            fetched.metadata.byte_len,
                            decoded.encoding_label
                        );
                        DomPage::new(fetched.metadata.final_url.clone(), decoded.html)
                    }
                    Err(err) => {
                        relay_warn!("Could not decode {url}: {err}");
                        DomPage::empty(fetched.metadata.final_url.clone())
                    }
                }
            }
            Err(err) => {
                relay_warn!("Could not load {url}: {err}");
                DomPage::empty(url)
            }
        };
        self.inner.agent.run(&page, self).await
    }
}

impl Navigator for HttpBrowser {
    fn open(&self, url: &str) {
        let browser = self.clone();
        let url = url.to_string();
        self.inner.opened.fetch_add(1, Ordering::SeqCst);
        let context = ContextGuard::enter(self.inner.clone());
        self.inner.runtime.spawn(async move {
            let _context = context;
            let outcome = browser.visit(&url).await;
            relay_debug!("Context for {url} closed: {outcome:?}");
        });
    }
}

struct ContextGuard {
    inner: Arc<BrowserInner>,
}

impl ContextGuard {
    fn enter(inner: Arc<BrowserInner>) -> Self {
        inner.live.fetch_add(1, Ordering::SeqCst);
        Self { inner }
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        self.inner.live.fetch_sub(1, Ordering::SeqCst);
    }
}
