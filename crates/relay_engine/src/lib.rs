//! Relay engine: shared store, page agents, headless browsing and the run
//! driver built on top of `relay_core`.
mod agent;
mod aggregate;
mod browser;
mod decode;
mod dom;
mod driver;
mod engine;
mod fetch;
mod persist;
mod poll;
mod sink;
mod store;
mod types;

pub use agent::{AgentOutcome, AgentSettings, PageAgent};
pub use aggregate::ResultAggregator;
pub use browser::{HttpBrowser, Navigator};
pub use decode::{decode_page, DecodeError, DecodedPage};
pub use dom::{resolve_link, DomPage, ElementSnapshot, PageView, QueryResult};
pub use driver::{Driver, DriverSettings, RunSummary};
pub use engine::{RelayEngine, RelaySettings, RuleKind};
pub use fetch::{FetchSettings, PageFetcher, ReqwestFetcher};
pub use persist::{ensure_parent_dir, write_atomically, PersistError};
pub use poll::{collect_selectors, PollSettings};
pub use sink::{FileSink, MemorySink, ResultSink, SinkError};
pub use store::{keys, Change, SharedStore, StateStore, StoreError, StoreExt, Subscription};
pub use types::{FailureKind, FetchError, FetchMetadata, FetchedPage};
