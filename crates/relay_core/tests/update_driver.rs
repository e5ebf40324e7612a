use std::sync::Once;

use pretty_assertions::assert_eq;
use relay_core::{
    update, DriverEffect, DriverMsg, DriverState, ReplacementRule, RunPhase, RunStatus,
    SiteCompleteNotice, SiteConfig, StartError, StatusReport, ValidationError,
};

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(relay_logging::initialize_for_tests);
}

fn sites() -> Vec<SiteConfig> {
    vec![
        SiteConfig::new("alpha", "https://alpha.example.com/item/1").with_selector("h1"),
        SiteConfig::new("beta", "https://beta.example.com/").with_selector(".price").disabled(),
        SiteConfig::new("gamma", "https://gamma.example.com/").with_selector("#total"),
    ]
}

fn start(state: DriverState, sites: Vec<SiteConfig>) -> (DriverState, Vec<DriverEffect>) {
    update(
        state,
        DriverMsg::StartRequested {
            sites,
            url_rules: Vec::new(),
            previous: None,
        },
    )
}

fn notice(run_id: u64, index: usize, name: &str) -> DriverMsg {
    DriverMsg::SiteCompleted(SiteCompleteNotice {
        run_id,
        index,
        site_name: name.to_string(),
        url: format!("https://{name}.example.com/"),
        timestamp: "2026-01-01T00:00:00Z".to_string(),
        values: vec!["v".to_string()],
    })
}

fn opened(effects: &[DriverEffect]) -> Vec<(usize, String)> {
    effects
        .iter()
        .filter_map(|effect| match effect {
            DriverEffect::OpenSite {
                site_index, url, ..
            } => Some((*site_index, url.clone())),
            _ => None,
        })
        .collect()
}

#[test]
fn start_publishes_run_and_opens_first_enabled_site() {
    init_logging();
    let (mut state, effects) = start(DriverState::new(), sites());

    let expected_status = RunStatus {
        run_id: 1,
        active: true,
        run_list: vec![0, 2],
        current_step: 0,
    };
    assert_eq!(
        effects,
        vec![
            DriverEffect::PublishRun {
                status: expected_status.clone(),
                sites: sites(),
            },
            DriverEffect::ClearResults,
            DriverEffect::OpenSite {
                site_index: 0,
                url: "https://alpha.example.com/item/1".to_string(),
                delayed: false,
            },
            DriverEffect::ArmGuard { run_id: 1 },
            DriverEffect::Report(StatusReport::Opening { step: 1, total: 2 }),
        ]
    );
    assert_eq!(state.phase(), RunPhase::Running);
    assert_eq!(state.status(), &expected_status);
    assert!(state.consume_dirty());
    assert!(!state.consume_dirty());
}

#[test]
fn start_without_enabled_sites_is_a_validation_failure() {
    init_logging();
    let all_disabled: Vec<_> = sites().into_iter().map(SiteConfig::disabled).collect();
    let (state, effects) = start(DriverState::new(), all_disabled);

    assert_eq!(state.phase(), RunPhase::Idle);
    assert_eq!(
        effects,
        vec![DriverEffect::Report(StatusReport::Rejected(
            StartError::NoEligibleSites
        ))]
    );
    assert!(StartError::NoEligibleSites.is_validation());
    assert!(opened(&effects).is_empty());
}

#[test]
fn start_rejects_invalid_site_before_navigation() {
    init_logging();
    let mut bad = sites();
    bad[2].url = "https://".to_string();
    let (state, effects) = start(DriverState::new(), bad);

    assert_eq!(state.phase(), RunPhase::Idle);
    assert!(opened(&effects).is_empty());
    assert_eq!(
        state.view().last_report,
        Some(StatusReport::Rejected(StartError::Validation(
            ValidationError::InvalidUrl {
                site: "gamma".to_string()
            }
        )))
    );
}

#[test]
fn start_is_rejected_while_a_run_is_active() {
    init_logging();
    let (state, _) = start(DriverState::new(), sites());
    let (state, effects) = start(state, sites());
    assert_eq!(
        effects,
        vec![DriverEffect::Report(StatusReport::Rejected(
            StartError::AlreadyRunning
        ))]
    );
    assert_eq!(state.status().run_id, 1);
    assert_eq!(state.phase(), RunPhase::Running);

    // Active flag persisted by another driver context also blocks the start.
    let (fresh, effects) = update(
        DriverState::new(),
        DriverMsg::StartRequested {
            sites: sites(),
            url_rules: Vec::new(),
            previous: Some(RunStatus {
                run_id: 7,
                active: true,
                run_list: vec![0],
                current_step: 0,
            }),
        },
    );
    assert_eq!(fresh.phase(), RunPhase::Idle);
    assert_eq!(
        effects,
        vec![DriverEffect::Report(StatusReport::Rejected(
            StartError::AlreadyRunning
        ))]
    );
}

#[test]
fn run_ids_continue_from_persisted_status() {
    init_logging();
    let (state, _) = update(
        DriverState::new(),
        DriverMsg::StartRequested {
            sites: sites(),
            url_rules: Vec::new(),
            previous: Some(RunStatus {
                run_id: 7,
                active: false,
                run_list: vec![0],
                current_step: 1,
            }),
        },
    );
    assert_eq!(state.status().run_id, 8);
}

#[test]
fn url_rules_are_scoped_by_registry_position() {
    init_logging();
    let rules = vec![
        ReplacementRule::new(r"/item/(\d+)", "/item/$1?lang=en").scoped([1]),
        ReplacementRule::new("gamma", "delta").scoped([2]),
    ];
    let (state, effects) = update(
        DriverState::new(),
        DriverMsg::StartRequested {
            sites: sites(),
            url_rules: rules,
            previous: None,
        },
    );
    assert_eq!(
        opened(&effects),
        vec![(0, "https://alpha.example.com/item/1?lang=en".to_string())]
    );

    // gamma is registry position 3, run-list position 2: the rule scoped to 2 must not fire.
    let (_, effects) = update(state, notice(1, 0, "alpha"));
    assert_eq!(
        opened(&effects),
        vec![(2, "https://gamma.example.com/".to_string())]
    );
}

#[test]
fn matching_notices_advance_until_completed() {
    init_logging();
    let (state, _) = start(DriverState::new(), sites());

    let (state, effects) = update(state, notice(1, 0, "alpha"));
    assert_eq!(
        effects,
        vec![
            DriverEffect::Report(StatusReport::Copied {
                site_name: "alpha".to_string(),
                step: 1,
                total: 2
            }),
            DriverEffect::PublishStatus(RunStatus {
                run_id: 1,
                active: true,
                run_list: vec![0, 2],
                current_step: 1,
            }),
            DriverEffect::OpenSite {
                site_index: 2,
                url: "https://gamma.example.com/".to_string(),
                delayed: true,
            },
        ]
    );

    let (state, effects) = update(state, notice(1, 2, "gamma"));
    assert_eq!(state.phase(), RunPhase::Completed);
    assert!(!state.status().active);
    assert_eq!(
        effects,
        vec![
            DriverEffect::Report(StatusReport::Copied {
                site_name: "gamma".to_string(),
                step: 2,
                total: 2
            }),
            DriverEffect::PublishStatus(RunStatus {
                run_id: 1,
                active: false,
                run_list: vec![0, 2],
                current_step: 2,
            }),
            DriverEffect::DisarmGuard,
            DriverEffect::Report(StatusReport::Finished { total: 2 }),
        ]
    );
}

#[test]
fn duplicate_and_out_of_order_notices_are_ignored() {
    init_logging();
    let (state, _) = start(DriverState::new(), sites());

    // Out of order: gamma before alpha.
    let (state, effects) = update(state, notice(1, 2, "gamma"));
    assert!(effects.is_empty());
    assert_eq!(state.status().current_step, 0);

    let (state, _) = update(state, notice(1, 0, "alpha"));
    assert_eq!(state.status().current_step, 1);

    // Duplicate delivery of alpha.
    let (state, effects) = update(state, notice(1, 0, "alpha"));
    assert!(effects.is_empty());
    assert_eq!(state.status().current_step, 1);

    // A notice from an older run with the expected index.
    let (state, effects) = update(state, notice(0, 2, "gamma"));
    assert!(effects.is_empty());
    assert_eq!(state.status().current_step, 1);
    assert_eq!(state.phase(), RunPhase::Running);
}

#[test]
fn guard_timeout_stops_the_run_at_any_step() {
    init_logging();
    let (state, _) = start(DriverState::new(), sites());
    let (state, _) = update(state, notice(1, 0, "alpha"));

    let (state, effects) = update(state, DriverMsg::GuardElapsed { run_id: 1 });
    assert_eq!(state.phase(), RunPhase::TimedOut);
    assert!(!state.status().active);
    assert_eq!(
        effects,
        vec![
            DriverEffect::PublishStatus(RunStatus {
                run_id: 1,
                active: false,
                run_list: vec![0, 2],
                current_step: 1,
            }),
            DriverEffect::DisarmGuard,
            DriverEffect::Report(StatusReport::TimedOut {
                completed: 1,
                total: 2
            }),
        ]
    );

    // Late notices after the timeout change nothing.
    let (state, effects) = update(state, notice(1, 2, "gamma"));
    assert!(effects.is_empty());
    assert_eq!(state.phase(), RunPhase::TimedOut);
}

#[test]
fn stale_guard_from_previous_run_is_ignored() {
    init_logging();
    let (state, _) = start(DriverState::new(), sites());
    let (state, _) = update(state, notice(1, 0, "alpha"));
    let (state, _) = update(state, notice(1, 2, "gamma"));
    let (state, _) = start(state, sites());
    assert_eq!(state.status().run_id, 2);

    let (state, effects) = update(state, DriverMsg::GuardElapsed { run_id: 1 });
    assert!(effects.is_empty());
    assert_eq!(state.phase(), RunPhase::Running);
}

#[test]
fn abort_keeps_progress_and_allows_a_new_run() {
    init_logging();
    let (state, _) = start(DriverState::new(), sites());
    let (state, effects) = update(state, DriverMsg::AbortRequested { run_id: 1 });
    assert_eq!(state.phase(), RunPhase::Aborted);
    assert!(effects.contains(&DriverEffect::Report(StatusReport::Aborted {
        completed: 0,
        total: 2
    })));

    let (state, effects) = start(state, sites());
    assert_eq!(state.phase(), RunPhase::Running);
    assert_eq!(opened(&effects).len(), 1);
}

#[test]
fn status_reports_render_for_the_user() {
    assert_eq!(
        StatusReport::Copied {
            site_name: "alpha".to_string(),
            step: 1,
            total: 3
        }
        .to_string(),
        "Copied: alpha (1/3)"
    );
    assert_eq!(
        StatusReport::Rejected(StartError::AlreadyRunning).to_string(),
        "Not started: a run is already in progress"
    );
}
