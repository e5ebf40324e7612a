//! Application configuration, read from an optional RON file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use relay_engine::{
    AgentSettings, DriverSettings, FetchSettings, PollSettings, RelaySettings,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// JSON file backing the shared state store.
    pub state_path: PathBuf,
    /// Text file mirroring the result buffer.
    pub results_path: PathBuf,
    pub log_file: Option<PathBuf>,
    pub row_delimiter: String,
    pub guard_timeout_secs: u64,
    pub advance_delay_ms: u64,
    pub poll_interval_ms: u64,
    pub poll_timeout_ms: u64,
    pub close_delay_ms: u64,
    pub fetch: FetchConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            state_path: PathBuf::from("./relay_state.json"),
            results_path: PathBuf::from("./relay_results.txt"),
            log_file: None,
            row_delimiter: "\t".to_string(),
            guard_timeout_secs: 120,
            advance_delay_ms: 200,
            poll_interval_ms: 250,
            poll_timeout_ms: 20_000,
            close_delay_ms: 100,
            fetch: FetchConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub redirect_limit: usize,
    pub max_bytes: u64,
    pub user_agent: Option<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        let defaults = FetchSettings::default();
        Self {
            connect_timeout_ms: defaults.connect_timeout.as_millis() as u64,
            request_timeout_ms: defaults.request_timeout.as_millis() as u64,
            redirect_limit: defaults.redirect_limit,
            max_bytes: defaults.max_bytes,
            user_agent: None,
        }
    }
}

impl AppConfig {
    /// Reads `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => {
                return Err(err).with_context(|| format!("reading config {}", path.display()))
            }
        };
        ron::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn relay_settings(&self) -> RelaySettings {
        let defaults = FetchSettings::default();
        RelaySettings {
            driver: DriverSettings {
                guard_timeout: Duration::from_secs(self.guard_timeout_secs),
                advance_delay: Duration::from_millis(self.advance_delay_ms),
            },
            agent: AgentSettings {
                poll: PollSettings {
                    interval: Duration::from_millis(self.poll_interval_ms),
                    timeout: Duration::from_millis(self.poll_timeout_ms),
                },
                close_delay: Duration::from_millis(self.close_delay_ms),
            },
            fetch: FetchSettings {
                connect_timeout: Duration::from_millis(self.fetch.connect_timeout_ms),
                request_timeout: Duration::from_millis(self.fetch.request_timeout_ms),
                redirect_limit: self.fetch.redirect_limit,
                max_bytes: self.fetch.max_bytes,
                user_agent: self.fetch.user_agent.clone().unwrap_or(defaults.user_agent),
                allowed_content_types: defaults.allowed_content_types,
            },
            row_delimiter: self.row_delimiter.clone(),
        }
    }
}
