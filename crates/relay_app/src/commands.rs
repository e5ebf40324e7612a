use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use relay_core::{
    format_site_numbers, parse_site_numbers, ReplacementRule, RuleList, RunPhase, SiteRegistry,
    StatusReport,
};
use relay_engine::{keys, RelayEngine, RuleKind, SharedStore};
use relay_logging::relay_warn;

use crate::cli::{Command, RulesAction, SitesAction};

/// How often a running `relay run` re-reads the run status from disk so a
/// `relay abort` issued from another shell is noticed.
const ABORT_POLL_INTERVAL: Duration = Duration::from_millis(500);

pub async fn execute(
    command: Command,
    engine: &RelayEngine,
    store: &Arc<SharedStore>,
    out: &mut dyn Write,
) -> Result<()> {
    match command {
        Command::Run => run(engine, store, out).await,
        Command::Status => status(engine, out),
        Command::Abort => abort(engine, out),
        Command::Results { json } => results(engine, json, out),
        Command::Sites { action } => sites(engine, action, out),
        Command::Rules { action } => rules(engine, action, out),
    }
}

async fn run(engine: &RelayEngine, store: &Arc<SharedStore>, out: &mut dyn Write) -> Result<()> {
    let watcher = {
        let store = store.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(ABORT_POLL_INTERVAL);
            loop {
                ticker.tick().await;
                if let Err(err) = store.refresh(keys::RUN_STATUS) {
                    relay_warn!("Could not re-read run status: {err}");
                }
            }
        })
    };
    let outcome = engine.driver().run().await;
    watcher.abort();

    let summary = match outcome {
        Ok(summary) => summary,
        Err(err) => {
            writeln!(out, "{}", StatusReport::Rejected(err.clone()))?;
            return Err(err).context("run was not started");
        }
    };
    writeln!(out, "{}", summary.buffer)?;
    if summary.phase == RunPhase::TimedOut {
        bail!("run {} timed out", summary.run_id);
    }
    Ok(())
}

fn status(engine: &RelayEngine, out: &mut dyn Write) -> Result<()> {
    let Some(status) = engine.run_status() else {
        writeln!(out, "No run recorded.")?;
        return Ok(());
    };
    let sites = status
        .run_list
        .iter()
        .map(|index| (index + 1).to_string())
        .collect::<Vec<_>>()
        .join(", ");
    writeln!(
        out,
        "Run {}: {}, {}/{} site(s) done (sites {sites})",
        status.run_id,
        if status.active { "running" } else { "stopped" },
        status.current_step,
        status.total()
    )?;
    Ok(())
}

fn abort(engine: &RelayEngine, out: &mut dyn Write) -> Result<()> {
    if engine.abort().context("writing run status")? {
        writeln!(out, "Abort requested.")?;
    } else {
        writeln!(out, "No active run.")?;
    }
    Ok(())
}

fn results(engine: &RelayEngine, json: bool, out: &mut dyn Write) -> Result<()> {
    if json {
        let records = engine.aggregator().records();
        writeln!(out, "{}", serde_json::to_string_pretty(&records)?)?;
    } else {
        writeln!(out, "{}", engine.aggregator().current_buffer())?;
    }
    Ok(())
}

fn sites(engine: &RelayEngine, action: SitesAction, out: &mut dyn Write) -> Result<()> {
    let mut registry = engine.registry();
    let message = match action {
        SitesAction::List => return print_sites(&registry, out),
        SitesAction::Add { url } => {
            let index = registry.add_site(&url);
            format!("Added site #{}.", index + 1)
        }
        SitesAction::Remove { site } => {
            let removed = registry.remove_site(position(site)?)?;
            format!("Removed site {}.", removed.name)
        }
        SitesAction::Url { site, url } => {
            let index = position(site)?;
            registry.set_url(index, &url)?;
            format!("Site #{site} is now {}.", registry.sites()[index].name)
        }
        SitesAction::Enable { site } => {
            registry.set_enabled(position(site)?, true)?;
            format!("Enabled site #{site}.")
        }
        SitesAction::Disable { site } => {
            registry.set_enabled(position(site)?, false)?;
            format!("Disabled site #{site}.")
        }
        SitesAction::Move { from, to } => {
            registry.move_site(position(from)?, position(to)?)?;
            format!("Moved site #{from} to #{to}.")
        }
        SitesAction::RedirectAdd { site, selector } => {
            let level = registry.add_redirect(position(site)?, &selector)?;
            format!("Added redirect level {} to site #{site}.", level + 1)
        }
        SitesAction::RedirectRemove { site, level } => {
            registry.remove_redirect(position(site)?, position(level)?)?;
            format!("Removed redirect level {level} of site #{site}.")
        }
        SitesAction::SelectorAdd { site, selector } => {
            let added = registry.add_selector(position(site)?, &selector)?;
            format!("Added selector {} to site #{site}.", added + 1)
        }
        SitesAction::SelectorRemove { site, position: number } => {
            registry.remove_selector(position(site)?, position(number)?)?;
            format!("Removed selector {number} of site #{site}.")
        }
        SitesAction::SelectorToggle { site, position: number } => {
            let (index, slot) = (position(site)?, position(number)?);
            let enabled = registry
                .get(index)
                .and_then(|config| config.selectors.get(slot))
                .map(|entry| entry.enabled)
                .with_context(|| format!("site #{site} has no selector {number}"))?;
            registry.set_selector_enabled(index, slot, !enabled)?;
            let state = if enabled { "Disabled" } else { "Enabled" };
            format!("{state} selector {number} of site #{site}.")
        }
    };
    engine.save_registry(&registry).context("saving sites")?;
    writeln!(out, "{message}")?;
    Ok(())
}

fn print_sites(registry: &SiteRegistry, out: &mut dyn Write) -> Result<()> {
    for (index, site) in registry.sites().iter().enumerate() {
        writeln!(
            out,
            "#{} [{}] {}  {}",
            index + 1,
            mark(site.enabled),
            site.name,
            site.url
        )?;
        for (level, selector) in site.redirect_selectors.iter().enumerate() {
            writeln!(out, "    redirect {}: {selector}", level + 1)?;
        }
        for (slot, entry) in site.selectors.iter().enumerate() {
            writeln!(
                out,
                "    selector {} [{}]: {}",
                slot + 1,
                mark(entry.enabled),
                entry.selector
            )?;
        }
        if site.enabled {
            if let Err(err) = site.validate() {
                writeln!(out, "    ! {err}")?;
            }
        }
    }
    Ok(())
}

fn rules(engine: &RelayEngine, action: RulesAction, out: &mut dyn Write) -> Result<()> {
    let (kind, list, message) = match action {
        RulesAction::List { kind } => return print_rules(&engine.rules(kind.into()), out),
        RulesAction::Add {
            kind,
            find,
            replace,
            sites,
        } => {
            let kind = RuleKind::from(kind);
            let mut list = engine.rules(kind);
            let mut rule = ReplacementRule::new(find, replace);
            if let Some(sites) = sites {
                rule.scope_sites = parse_site_numbers(&sites);
            }
            let index = list.push(rule);
            if let Some(problem) = list.check(index) {
                writeln!(out, "warning: {problem}; it will be skipped")?;
            }
            (kind, list, format!("Added rule #{}.", index + 1))
        }
        RulesAction::Remove { kind, rule } => {
            let kind = RuleKind::from(kind);
            let mut list = engine.rules(kind);
            list.remove(position(rule)?)?;
            (kind, list, format!("Removed rule #{rule}."))
        }
        RulesAction::Toggle { kind, rule } => {
            let kind = RuleKind::from(kind);
            let mut list = engine.rules(kind);
            let index = position(rule)?;
            let enabled = list
                .rules()
                .get(index)
                .map(|existing| existing.enabled)
                .with_context(|| format!("no rule #{rule}"))?;
            list.set_enabled(index, !enabled)?;
            let state = if enabled { "Disabled" } else { "Enabled" };
            (kind, list, format!("{state} rule #{rule}."))
        }
    };
    engine.save_rules(kind, &list).context("saving rules")?;
    writeln!(out, "{message}")?;
    Ok(())
}

fn print_rules(list: &RuleList, out: &mut dyn Write) -> Result<()> {
    if list.is_empty() {
        writeln!(out, "No rules.")?;
        return Ok(());
    }
    for (index, rule) in list.rules().iter().enumerate() {
        let scope = if rule.scope_sites.is_empty() {
            "all sites".to_string()
        } else {
            format!("sites {}", format_site_numbers(&rule.scope_sites))
        };
        writeln!(
            out,
            "#{} [{}] /{}/ -> {:?} ({scope})",
            index + 1,
            mark(rule.enabled),
            rule.find,
            rule.replace
        )?;
        if let Some(problem) = list.check(index) {
            writeln!(out, "    ! {problem}")?;
        }
    }
    Ok(())
}

/// Converts a 1-based number from the command line to an index.
fn position(number: usize) -> Result<usize> {
    number.checked_sub(1).context("numbers start at 1")
}

fn mark(enabled: bool) -> char {
    if enabled {
        'x'
    } else {
        ' '
    }
}
