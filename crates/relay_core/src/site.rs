use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// URL values that mean "not filled in yet".
const URL_PLACEHOLDERS: [&str; 2] = ["https://", "http://"];

/// One output selector of a site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorEntry {
    pub enabled: bool,
    pub selector: String,
}

impl SelectorEntry {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            enabled: true,
            selector: selector.into(),
        }
    }

    fn is_usable(&self) -> bool {
        self.enabled && !self.selector.trim().is_empty()
    }
}

/// Configuration of one target page.
///
/// Deserialization also accepts older documents: a single
/// `redirectSelector` string, plain-string selectors and a missing
/// `enabled` flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawSiteConfig")]
pub struct SiteConfig {
    pub name: String,
    pub url: String,
    pub enabled: bool,
    pub redirect_selectors: Vec<String>,
    pub selectors: Vec<SelectorEntry>,
}

impl SiteConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            enabled: true,
            redirect_selectors: Vec::new(),
            selectors: Vec::new(),
        }
    }

    pub fn with_redirect(mut self, selector: impl Into<String>) -> Self {
        self.redirect_selectors.push(selector.into());
        self
    }

    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selectors.push(SelectorEntry::new(selector));
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Selector strings of the enabled entries, in order. Blank ones are
    /// kept so extraction can report them.
    pub fn enabled_selectors(&self) -> Vec<String> {
        self.selectors
            .iter()
            .filter(|entry| entry.enabled)
            .map(|entry| entry.selector.clone())
            .collect()
    }

    /// Checks the conditions a site must meet before a run may include it.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let url = self.url.trim();
        if url.is_empty() || URL_PLACEHOLDERS.contains(&url) {
            return Err(ValidationError::InvalidUrl {
                site: self.name.clone(),
            });
        }
        if !self.selectors.iter().any(SelectorEntry::is_usable) {
            return Err(ValidationError::NoUsableSelector {
                site: self.name.clone(),
            });
        }
        if let Some(position) = self
            .redirect_selectors
            .iter()
            .position(|selector| selector.trim().is_empty())
        {
            return Err(ValidationError::BlankRedirect {
                site: self.name.clone(),
                level: position + 1,
            });
        }
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSiteConfig {
    #[serde(default)]
    name: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    enabled: Option<bool>,
    #[serde(default)]
    redirect_selectors: Option<Vec<String>>,
    #[serde(default)]
    redirect_selector: Option<String>,
    #[serde(default)]
    selectors: Vec<RawSelector>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSelector {
    Plain(String),
    Entry {
        #[serde(default)]
        enabled: Option<bool>,
        #[serde(default)]
        selector: Option<String>,
    },
}

impl From<RawSiteConfig> for SiteConfig {
    fn from(raw: RawSiteConfig) -> Self {
        let redirect_selectors = match raw.redirect_selector {
            Some(legacy) if !legacy.is_empty() => vec![legacy],
            _ => raw.redirect_selectors.unwrap_or_default(),
        };
        let selectors = raw
            .selectors
            .into_iter()
            .map(|selector| match selector {
                RawSelector::Plain(selector) => SelectorEntry::new(selector),
                RawSelector::Entry { enabled, selector } => SelectorEntry {
                    enabled: enabled.unwrap_or(true),
                    selector: selector.unwrap_or_default(),
                },
            })
            .collect();
        Self {
            name: raw.name,
            url: raw.url,
            enabled: raw.enabled.unwrap_or(true),
            redirect_selectors,
            selectors,
        }
    }
}
