use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::{SelectorEntry, SiteConfig};

/// Placeholder URL given to freshly added sites.
pub const NEW_SITE_URL: &str = "https://";

/// Ordered original indices of the sites taking part in one run.
pub type RunList = Vec<usize>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("no entry at position {index}")]
    OutOfRange { index: usize },
    #[error("the last site cannot be removed")]
    LastSite,
    #[error("the last selector of a site cannot be removed")]
    LastSelector,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("site \"{site}\" has an invalid URL")]
    InvalidUrl { site: String },
    #[error("site \"{site}\" has no enabled, non-empty selector")]
    NoUsableSelector { site: String },
    #[error("site \"{site}\" has an empty redirect selector at level {level}")]
    BlankRedirect { site: String, level: usize },
}

/// Indices of the enabled sites, in registry order.
pub fn run_list(sites: &[SiteConfig]) -> RunList {
    sites
        .iter()
        .enumerate()
        .filter(|(_, site)| site.enabled)
        .map(|(index, _)| index)
        .collect()
}

/// Validates every site of the run list; the first failure wins.
pub fn validate_run(sites: &[SiteConfig], run_list: &[usize]) -> Result<(), ValidationError> {
    run_list
        .iter()
        .filter_map(|index| sites.get(*index))
        .try_for_each(SiteConfig::validate)
}

/// Finds which configured site a loaded page belongs to.
///
/// A site matches when the page address contains the site's hostname or
/// starts with the site's URL; the first match in registry order wins.
/// Otherwise `fallback` (the index the driver last opened) is used when it
/// is in range.
pub fn identify_site(sites: &[SiteConfig], page_url: &str, fallback: Option<usize>) -> Option<usize> {
    let matched = sites.iter().position(|site| {
        let Ok(parsed) = Url::parse(&site.url) else {
            return false;
        };
        let host_match = parsed
            .host_str()
            .is_some_and(|host| !host.is_empty() && page_url.contains(host));
        host_match || page_url.starts_with(site.url.as_str())
    });
    matched.or_else(|| fallback.filter(|index| *index < sites.len()))
}

/// Display name for the site at `index` when its URL is `url`: the hostname,
/// suffixed with a counter when other sites share it.
pub fn unique_site_name(sites: &[SiteConfig], index: usize, url: &str) -> String {
    let Some(host) = host_of(url) else {
        return "Untitled".to_string();
    };
    let same_host = sites
        .iter()
        .enumerate()
        .filter(|(i, site)| *i != index && host_of(&site.url).as_deref() == Some(host.as_str()))
        .count();
    if same_host > 0 {
        format!("{host} ({})", same_host + 1)
    } else {
        host
    }
}

fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(ToOwned::to_owned))
        .filter(|host| !host.is_empty())
}

/// The ordered site list both the driver and the page agents read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteRegistry {
    sites: Vec<SiteConfig>,
}

impl Default for SiteRegistry {
    fn default() -> Self {
        Self {
            sites: vec![SiteConfig::new("example.com", "https://example.com/")
                .with_selector("body > div > h1")],
        }
    }
}

impl SiteRegistry {
    pub fn new(sites: Vec<SiteConfig>) -> Self {
        Self { sites }
    }

    pub fn sites(&self) -> &[SiteConfig] {
        &self.sites
    }

    pub fn into_sites(self) -> Vec<SiteConfig> {
        self.sites
    }

    pub fn get(&self, index: usize) -> Option<&SiteConfig> {
        self.sites.get(index)
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn run_list(&self) -> RunList {
        run_list(&self.sites)
    }

    /// Appends an enabled site with one blank selector and returns its index.
    pub fn add_site(&mut self, url: &str) -> usize {
        let index = self.sites.len();
        let name = unique_site_name(&self.sites, index, url);
        let mut site = SiteConfig::new(name, url);
        site.selectors.push(SelectorEntry::new(""));
        self.sites.push(site);
        index
    }

    pub fn remove_site(&mut self, index: usize) -> Result<SiteConfig, RegistryError> {
        self.check(index)?;
        if self.sites.len() == 1 {
            return Err(RegistryError::LastSite);
        }
        Ok(self.sites.remove(index))
    }

    /// Changes the URL and re-derives the display name from it.
    pub fn set_url(&mut self, index: usize, url: &str) -> Result<(), RegistryError> {
        self.check(index)?;
        let name = unique_site_name(&self.sites, index, url);
        let site = &mut self.sites[index];
        site.url = url.to_string();
        site.name = name;
        Ok(())
    }

    pub fn set_enabled(&mut self, index: usize, enabled: bool) -> Result<(), RegistryError> {
        self.site_mut(index)?.enabled = enabled;
        Ok(())
    }

    pub fn add_redirect(&mut self, index: usize, selector: &str) -> Result<usize, RegistryError> {
        let site = self.site_mut(index)?;
        site.redirect_selectors.push(selector.to_string());
        Ok(site.redirect_selectors.len() - 1)
    }

    pub fn set_redirect(
        &mut self,
        index: usize,
        level: usize,
        selector: &str,
    ) -> Result<(), RegistryError> {
        let slot = self
            .site_mut(index)?
            .redirect_selectors
            .get_mut(level)
            .ok_or(RegistryError::OutOfRange { index: level })?;
        *slot = selector.to_string();
        Ok(())
    }

    pub fn remove_redirect(&mut self, index: usize, level: usize) -> Result<String, RegistryError> {
        let site = self.site_mut(index)?;
        if level >= site.redirect_selectors.len() {
            return Err(RegistryError::OutOfRange { index: level });
        }
        Ok(site.redirect_selectors.remove(level))
    }

    pub fn add_selector(&mut self, index: usize, selector: &str) -> Result<usize, RegistryError> {
        let site = self.site_mut(index)?;
        site.selectors.push(SelectorEntry::new(selector));
        Ok(site.selectors.len() - 1)
    }

    pub fn set_selector(
        &mut self,
        index: usize,
        position: usize,
        selector: &str,
    ) -> Result<(), RegistryError> {
        self.selector_mut(index, position)?.selector = selector.to_string();
        Ok(())
    }

    pub fn set_selector_enabled(
        &mut self,
        index: usize,
        position: usize,
        enabled: bool,
    ) -> Result<(), RegistryError> {
        self.selector_mut(index, position)?.enabled = enabled;
        Ok(())
    }

    pub fn remove_selector(
        &mut self,
        index: usize,
        position: usize,
    ) -> Result<SelectorEntry, RegistryError> {
        let site = self.site_mut(index)?;
        if position >= site.selectors.len() {
            return Err(RegistryError::OutOfRange { index: position });
        }
        if site.selectors.len() == 1 {
            return Err(RegistryError::LastSelector);
        }
        Ok(site.selectors.remove(position))
    }

    /// Moves the site at `from` so it ends up at position `to`.
    pub fn move_site(&mut self, from: usize, to: usize) -> Result<(), RegistryError> {
        self.check(from)?;
        self.check(to)?;
        let site = self.sites.remove(from);
        self.sites.insert(to, site);
        Ok(())
    }

    fn check(&self, index: usize) -> Result<(), RegistryError> {
        if index < self.sites.len() {
            Ok(())
        } else {
            Err(RegistryError::OutOfRange { index })
        }
    }

    fn site_mut(&mut self, index: usize) -> Result<&mut SiteConfig, RegistryError> {
        self.sites
            .get_mut(index)
            .ok_or(RegistryError::OutOfRange { index })
    }

    fn selector_mut(
        &mut self,
        index: usize,
        position: usize,
    ) -> Result<&mut SelectorEntry, RegistryError> {
        self.site_mut(index)?
            .selectors
            .get_mut(position)
            .ok_or(RegistryError::OutOfRange { index: position })
    }
}
