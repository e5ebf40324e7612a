//! Relay core: pure run state machine, site registry and rule engine.
mod effect;
mod extraction;
mod msg;
mod registry;
mod rules;
mod site;
mod state;
mod update;
mod view_model;

pub use effect::DriverEffect;
pub use extraction::{
    ExtractionRecord, SelectorValue, SiteCompleteNotice, BLANK_SELECTOR, EMPTY_TEXT, NOT_FOUND,
    SELECTOR_ERROR,
};
pub use msg::DriverMsg;
pub use registry::{
    identify_site, run_list, unique_site_name, validate_run, RegistryError, RunList,
    SiteRegistry, ValidationError, NEW_SITE_URL,
};
pub use rules::{
    apply_rules, format_site_numbers, parse_site_numbers, ReplacementRule, RuleCompileError,
    RuleList,
};
pub use site::{SelectorEntry, SiteConfig};
pub use state::{DriverState, RunPhase, RunStatus, StartError};
pub use update::update;
pub use view_model::{DriverView, StatusReport};
