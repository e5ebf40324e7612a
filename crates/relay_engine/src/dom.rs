use scraper::{Html, Selector};
use url::Url;

/// The parts of a matched element the page agent looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementSnapshot {
    /// Lower-case tag name.
    pub tag: String,
    /// Concatenated text of the element and its descendants, untrimmed.
    pub text: String,
    pub href: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryResult {
    Match(ElementSnapshot),
    NoMatch,
    InvalidSelector(String),
}

/// A loaded document that can be queried with CSS selectors.
pub trait PageView: Send + Sync {
    fn url(&self) -> &str;

    /// First element matching `selector`, in document order.
    fn query(&self, selector: &str) -> QueryResult;

    fn query_all(&self, selectors: &[String]) -> Vec<QueryResult> {
        selectors.iter().map(|selector| self.query(selector)).collect()
    }
}

/// Static HTML page. The markup is parsed on every query so the page stays
/// `Send` and can be shared with async tasks.
#[derive(Debug, Clone)]
pub struct DomPage {
    url: String,
    html: String,
}

impl DomPage {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
        }
    }

    /// A page that failed to load: every query comes back empty.
    pub fn empty(url: impl Into<String>) -> Self {
        Self::new(url, "")
    }
}

impl PageView for DomPage {
    fn url(&self) -> &str {
        &self.url
    }

    fn query(&self, selector: &str) -> QueryResult {
        query_document(&Html::parse_document(&self.html), selector)
    }

    fn query_all(&self, selectors: &[String]) -> Vec<QueryResult> {
        let document = Html::parse_document(&self.html);
        selectors
            .iter()
            .map(|selector| query_document(&document, selector))
            .collect()
    }
}

fn query_document(document: &Html, selector: &str) -> QueryResult {
    let parsed = match Selector::parse(selector) {
        Ok(parsed) => parsed,
        Err(err) => return QueryResult::InvalidSelector(err.to_string()),
    };
    match document.select(&parsed).next() {
        Some(element) => QueryResult::Match(ElementSnapshot {
            tag: element.value().name().to_ascii_lowercase(),
            text: element.text().collect(),
            href: element.value().attr("href").map(ToOwned::to_owned),
        }),
        None => QueryResult::NoMatch,
    }
}

/// Resolves a link target against the page it appears on. Empty,
/// fragment-only and `javascript:` links resolve to nothing.
pub fn resolve_link(page_url: &str, href: &str) -> Option<String> {
    let trimmed = href.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with('#') || lower.starts_with("javascript:") {
        return None;
    }
    if let Ok(url) = Url::parse(trimmed) {
        return Some(url.to_string());
    }
    Url::parse(page_url)
        .ok()
        .and_then(|base| base.join(trimmed).ok())
        .map(|url| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><body>
        <h1>  Title  </h1>
        <p class="empty">   </p>
        <a id="next" href="/page/2">Next <b>page</b></a>
    </body></html>"#;

    #[test]
    fn query_returns_first_match_with_text_and_href() {
        let page = DomPage::new("https://example.com/page/1", PAGE);
        match page.query("#next") {
            QueryResult::Match(element) => {
                assert_eq!(element.tag, "a");
                assert_eq!(element.text, "Next page");
                assert_eq!(element.href.as_deref(), Some("/page/2"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn query_distinguishes_missing_and_invalid() {
        let page = DomPage::new("https://example.com/", PAGE);
        assert_eq!(page.query(".absent"), QueryResult::NoMatch);
        assert!(matches!(page.query("h1[["), QueryResult::InvalidSelector(_)));
    }

    #[test]
    fn empty_page_matches_nothing() {
        let page = DomPage::empty("https://example.com/");
        assert_eq!(page.query("h1"), QueryResult::NoMatch);
    }

    #[test]
    fn links_resolve_against_page() {
        assert_eq!(
            resolve_link("https://example.com/a/b", "../c").as_deref(),
            Some("https://example.com/c")
        );
        assert_eq!(
            resolve_link("https://example.com/a", "https://other.org/x").as_deref(),
            Some("https://other.org/x")
        );
        assert_eq!(
            resolve_link("https://example.com/a", "?page=2").as_deref(),
            Some("https://example.com/a?page=2")
        );
        assert_eq!(resolve_link("https://example.com/a", "#top"), None);
        assert_eq!(resolve_link("https://example.com/a", "javascript:void(0)"), None);
        assert_eq!(resolve_link("https://example.com/a", "  "), None);
    }
}
