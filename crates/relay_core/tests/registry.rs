use pretty_assertions::assert_eq;
use relay_core::{
    identify_site, run_list, validate_run, RegistryError, SelectorEntry, SiteConfig,
    SiteRegistry, ValidationError,
};

fn site(name: &str, url: &str) -> SiteConfig {
    SiteConfig::new(name, url).with_selector("h1")
}

#[test]
fn run_list_is_enabled_indices_in_order() {
    let sites = vec![
        site("a", "https://a.example.com/"),
        site("b", "https://b.example.com/").disabled(),
        site("c", "https://c.example.com/"),
        site("d", "https://d.example.com/"),
    ];
    assert_eq!(run_list(&sites), vec![0, 2, 3]);

    let none: Vec<SiteConfig> = sites.into_iter().map(SiteConfig::disabled).collect();
    assert!(run_list(&none).is_empty());
}

#[test]
fn validation_rejects_placeholder_urls() {
    let sites = vec![site("blank", "https://")];
    assert_eq!(
        validate_run(&sites, &[0]),
        Err(ValidationError::InvalidUrl {
            site: "blank".to_string()
        })
    );
    let sites = vec![site("empty", "  ")];
    assert!(matches!(
        validate_run(&sites, &[0]),
        Err(ValidationError::InvalidUrl { .. })
    ));
}

#[test]
fn validation_requires_an_enabled_non_blank_selector() {
    let mut config = SiteConfig::new("s", "https://s.example.com/");
    config.selectors = vec![
        SelectorEntry {
            enabled: false,
            selector: "h1".to_string(),
        },
        SelectorEntry::new("   "),
    ];
    assert_eq!(
        validate_run(&[config.clone()], &[0]),
        Err(ValidationError::NoUsableSelector {
            site: "s".to_string()
        })
    );

    config.selectors.push(SelectorEntry::new(".price"));
    assert_eq!(validate_run(&[config], &[0]), Ok(()));
}

#[test]
fn validation_rejects_blank_redirect_entries() {
    let config = site("r", "https://r.example.com/")
        .with_redirect("a.next")
        .with_redirect(" ");
    assert_eq!(
        validate_run(&[config], &[0]),
        Err(ValidationError::BlankRedirect {
            site: "r".to_string(),
            level: 2
        })
    );
}

#[test]
fn validation_ignores_sites_outside_the_run_list() {
    let sites = vec![site("ok", "https://ok.example.com/"), site("bad", "https://")];
    assert_eq!(validate_run(&sites, &[0]), Ok(()));
}

#[test]
fn identification_prefers_first_hostname_match() {
    let sites = vec![
        site("shop", "https://shop.example.com/items"),
        site("news", "https://news.example.org/"),
        site("shop-2", "https://shop.example.com/other"),
    ];
    assert_eq!(
        identify_site(&sites, "https://news.example.org/today", None),
        Some(1)
    );
    assert_eq!(
        identify_site(&sites, "https://shop.example.com/other?page=2", None),
        Some(0)
    );
}

#[test]
fn identification_falls_back_to_opening_index() {
    let sites = vec![
        site("a", "https://a.example.com/"),
        site("b", "https://b.example.com/"),
    ];
    assert_eq!(identify_site(&sites, "https://cdn.elsewhere.net/x", Some(1)), Some(1));
    assert_eq!(identify_site(&sites, "https://cdn.elsewhere.net/x", Some(9)), None);
    assert_eq!(identify_site(&sites, "https://cdn.elsewhere.net/x", None), None);
}

#[test]
fn identification_skips_unparsable_site_urls() {
    let sites = vec![site("draft", "https://"), site("real", "https://real.example.com/")];
    assert_eq!(
        identify_site(&sites, "https://real.example.com/page", None),
        Some(1)
    );
}

#[test]
fn default_registry_has_example_site() {
    let registry = SiteRegistry::default();
    assert_eq!(registry.len(), 1);
    let first = registry.get(0).unwrap();
    assert_eq!(first.url, "https://example.com/");
    assert_eq!(first.enabled_selectors(), vec!["body > div > h1".to_string()]);
}

#[test]
fn added_sites_get_unique_names() {
    let mut registry = SiteRegistry::default();
    let second = registry.add_site("https://example.com/other");
    assert_eq!(registry.get(second).unwrap().name, "example.com (2)");
    assert_eq!(registry.get(second).unwrap().selectors, vec![SelectorEntry::new("")]);

    let third = registry.add_site("not a url");
    assert_eq!(registry.get(third).unwrap().name, "Untitled");

    registry.set_url(third, "https://prices.example.net/").unwrap();
    assert_eq!(registry.get(third).unwrap().name, "prices.example.net");
}

#[test]
fn last_site_and_last_selector_are_protected() {
    let mut registry = SiteRegistry::default();
    assert_eq!(registry.remove_site(0), Err(RegistryError::LastSite));
    assert_eq!(registry.remove_selector(0, 0), Err(RegistryError::LastSelector));
    assert_eq!(
        registry.remove_site(3),
        Err(RegistryError::OutOfRange { index: 3 })
    );

    registry.add_selector(0, ".sub").unwrap();
    let removed = registry.remove_selector(0, 0).unwrap();
    assert_eq!(removed.selector, "body > div > h1");
}

#[test]
fn redirects_and_selectors_can_be_edited() {
    let mut registry = SiteRegistry::default();
    let level = registry.add_redirect(0, "a.first").unwrap();
    registry.set_redirect(0, level, "a.next").unwrap();
    registry.add_redirect(0, "a.deeper").unwrap();
    assert_eq!(registry.remove_redirect(0, 1).unwrap(), "a.deeper");
    assert_eq!(registry.get(0).unwrap().redirect_selectors, vec!["a.next"]);

    registry.set_selector(0, 0, "#total").unwrap();
    registry.set_selector_enabled(0, 0, false).unwrap();
    assert!(registry.get(0).unwrap().enabled_selectors().is_empty());
    assert!(registry.set_selector(0, 4, "x").is_err());
}

#[test]
fn sites_can_be_reordered() {
    let mut registry = SiteRegistry::new(vec![
        site("a", "https://a.example.com/"),
        site("b", "https://b.example.com/"),
        site("c", "https://c.example.com/"),
    ]);
    registry.move_site(2, 0).unwrap();
    let names: Vec<_> = registry.sites().iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["c", "a", "b"]);

    registry.set_enabled(1, false).unwrap();
    assert_eq!(registry.run_list(), vec![0, 2]);
}

#[test]
fn legacy_site_documents_are_migrated() {
    let json = r#"[
        {"name":"old","url":"https://old.example.com/","redirectSelector":"a.go",
         "selectors":["h1", ".price"]},
        {"name":"new","url":"https://new.example.com/","enabled":false,"collapsed":true,
         "redirectSelectors":["a.one"],"selectors":[{"enabled":false,"selector":"p"},{"enabled":true}]}
    ]"#;
    let registry: SiteRegistry = serde_json::from_str(json).unwrap();
    let old = registry.get(0).unwrap();
    assert!(old.enabled);
    assert_eq!(old.redirect_selectors, vec!["a.go"]);
    assert_eq!(
        old.selectors,
        vec![SelectorEntry::new("h1"), SelectorEntry::new(".price")]
    );

    let new = registry.get(1).unwrap();
    assert!(!new.enabled);
    assert_eq!(new.redirect_selectors, vec!["a.one"]);
    assert_eq!(new.selectors[1], SelectorEntry::new(""));
    assert!(!new.selectors[0].enabled);
}
