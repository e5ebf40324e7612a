use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use relay_engine::RuleKind;

#[derive(Debug, Parser)]
#[command(
    name = "relay",
    version,
    about = "Visit configured sites one after another and collect values from each page",
    after_help = "Sites, selectors and rules are numbered from 1, as shown by the list commands."
)]
pub struct Cli {
    /// RON configuration file
    #[arg(long, global = true, default_value = "relay.ron")]
    pub config: PathBuf,

    /// Log at debug level
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Also write the log to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run over all enabled sites and wait until the run ends
    Run,
    /// Show the state of the current or last run
    Status,
    /// Stop the running run after its current site
    Abort,
    /// Print the collected results
    Results {
        /// Print the per-site records as JSON instead of the text buffer
        #[arg(long)]
        json: bool,
    },
    /// Inspect and edit the site list
    Sites {
        #[command(subcommand)]
        action: SitesAction,
    },
    /// Inspect and edit the replacement rules
    Rules {
        #[command(subcommand)]
        action: RulesAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum SitesAction {
    List,
    /// Append a site
    Add { url: String },
    Remove { site: usize },
    /// Change the URL (and the derived name) of a site
    Url { site: usize, url: String },
    Enable { site: usize },
    Disable { site: usize },
    /// Move a site to another position
    Move { from: usize, to: usize },
    /// Append a redirect selector level
    RedirectAdd { site: usize, selector: String },
    RedirectRemove { site: usize, level: usize },
    /// Append an output selector
    SelectorAdd { site: usize, selector: String },
    SelectorRemove { site: usize, position: usize },
    /// Enable or disable an output selector
    SelectorToggle { site: usize, position: usize },
}

#[derive(Debug, Subcommand)]
pub enum RulesAction {
    List {
        #[arg(long, value_enum)]
        kind: RuleKindArg,
    },
    /// Append a find/replace rule
    Add {
        #[arg(long, value_enum)]
        kind: RuleKindArg,
        /// Regular expression to search for
        find: String,
        /// Replacement text; `$1`, `$&` and `$<name>` refer to the match
        #[arg(default_value = "")]
        replace: String,
        /// Limit the rule to these site numbers, e.g. "2-4, 7"
        #[arg(long)]
        sites: Option<String>,
    },
    Remove {
        #[arg(long, value_enum)]
        kind: RuleKindArg,
        rule: usize,
    },
    /// Enable or disable a rule
    Toggle {
        #[arg(long, value_enum)]
        kind: RuleKindArg,
        rule: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RuleKindArg {
    /// Rules rewriting site URLs before navigation
    Url,
    /// Rules rewriting extracted values
    Result,
}

impl From<RuleKindArg> for RuleKind {
    fn from(kind: RuleKindArg) -> Self {
        match kind {
            RuleKindArg::Url => RuleKind::Url,
            RuleKindArg::Result => RuleKind::Result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_nested_site_command() {
        let cli = Cli::try_parse_from(["relay", "sites", "selector-toggle", "2", "1"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Sites {
                action: SitesAction::SelectorToggle {
                    site: 2,
                    position: 1
                }
            }
        ));
        assert_eq!(cli.config, PathBuf::from("relay.ron"));
    }

    #[test]
    fn parses_scoped_rule() {
        let cli = Cli::try_parse_from([
            "relay", "rules", "add", "--kind", "result", r"(\d+) EUR", "$1", "--sites", "1-2",
            "--verbose",
        ])
        .unwrap();
        assert!(cli.verbose);
        let Command::Rules {
            action:
                RulesAction::Add {
                    kind,
                    find,
                    replace,
                    sites,
                },
        } = cli.command
        else {
            panic!("expected rules add");
        };
        assert_eq!(kind, RuleKindArg::Result);
        assert_eq!(find, r"(\d+) EUR");
        assert_eq!(replace, "$1");
        assert_eq!(sites.as_deref(), Some("1-2"));
    }
}
