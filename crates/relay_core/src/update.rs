use relay_logging::{relay_debug, relay_info, relay_warn};

use crate::registry::{run_list, validate_run};
use crate::view_model::StatusReport;
use crate::{
    apply_rules, DriverEffect, DriverMsg, DriverState, ReplacementRule, RunPhase, RunStatus,
    SiteCompleteNotice, SiteConfig, StartError,
};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: DriverState, msg: DriverMsg) -> (DriverState, Vec<DriverEffect>) {
    let effects = match msg {
        DriverMsg::StartRequested {
            sites,
            url_rules,
            previous,
        } => match start_run(&mut state, sites, url_rules, previous.as_ref()) {
            Ok(effects) => effects,
            Err(err) => {
                relay_warn!("Run rejected: {err}");
                vec![DriverEffect::Report(
                    state.report(StatusReport::Rejected(err)),
                )]
            }
        },
        DriverMsg::SiteCompleted(notice) => site_completed(&mut state, notice),
        DriverMsg::GuardElapsed { run_id } => {
            if is_current_run(&state, run_id) {
                relay_warn!(
                    "Run {run_id} timed out at step {}/{}",
                    state.status.current_step,
                    state.status.total()
                );
                stop_run(&mut state, RunPhase::TimedOut)
            } else {
                Vec::new()
            }
        }
        DriverMsg::AbortRequested { run_id } => {
            if is_current_run(&state, run_id) {
                relay_info!("Run {run_id} aborted");
                stop_run(&mut state, RunPhase::Aborted)
            } else {
                Vec::new()
            }
        }
        DriverMsg::NoOp => Vec::new(),
    };

    (state, effects)
}

fn start_run(
    state: &mut DriverState,
    sites: Vec<SiteConfig>,
    url_rules: Vec<ReplacementRule>,
    previous: Option<&RunStatus>,
) -> Result<Vec<DriverEffect>, StartError> {
    let run_list = run_list(&sites);
    let Some(&first) = run_list.first() else {
        return Err(StartError::NoEligibleSites);
    };
    if state.phase == RunPhase::Running || previous.is_some_and(|status| status.active) {
        return Err(StartError::AlreadyRunning);
    }
    validate_run(&sites, &run_list)?;

    let run_id = state.status.run_id.max(previous.map_or(0, |status| status.run_id)) + 1;
    let status = RunStatus {
        run_id,
        active: true,
        run_list,
        current_step: 0,
    };
    let total = status.total();
    relay_info!("Starting run {run_id} over {total} site(s)");

    state.phase = RunPhase::Running;
    state.status = status.clone();
    state.sites = sites.clone();
    state.url_rules = url_rules;
    let url = site_url(state, first);

    Ok(vec![
        DriverEffect::PublishRun { status, sites },
        DriverEffect::ClearResults,
        DriverEffect::OpenSite {
            site_index: first,
            url,
            delayed: false,
        },
        DriverEffect::ArmGuard { run_id },
        DriverEffect::Report(state.report(StatusReport::Opening { step: 1, total })),
    ])
}

fn site_completed(state: &mut DriverState, notice: SiteCompleteNotice) -> Vec<DriverEffect> {
    if state.phase != RunPhase::Running || notice.run_id != state.status.run_id {
        relay_debug!(
            "Ignoring completion of site {} from run {} (current run {}, {:?})",
            notice.index,
            notice.run_id,
            state.status.run_id,
            state.phase
        );
        return Vec::new();
    }
    if state.status.expected_index() != Some(notice.index) {
        relay_debug!(
            "Ignoring completion of site {}; waiting for {:?}",
            notice.index,
            state.status.expected_index()
        );
        return Vec::new();
    }

    state.status.current_step += 1;
    let step = state.status.current_step;
    let total = state.status.total();
    let mut effects = vec![DriverEffect::Report(state.report(StatusReport::Copied {
        site_name: notice.site_name,
        step,
        total,
    }))];

    match state.status.expected_index() {
        Some(next) => {
            let url = site_url(state, next);
            effects.push(DriverEffect::PublishStatus(state.status.clone()));
            effects.push(DriverEffect::OpenSite {
                site_index: next,
                url,
                delayed: true,
            });
        }
        None => {
            relay_info!("Run {} completed: {total} site(s)", state.status.run_id);
            state.phase = RunPhase::Completed;
            state.status.active = false;
            effects.push(DriverEffect::PublishStatus(state.status.clone()));
            effects.push(DriverEffect::DisarmGuard);
            effects.push(DriverEffect::Report(
                state.report(StatusReport::Finished { total }),
            ));
        }
    }
    effects
}

fn stop_run(state: &mut DriverState, phase: RunPhase) -> Vec<DriverEffect> {
    state.phase = phase;
    state.status.active = false;
    let completed = state.status.current_step;
    let total = state.status.total();
    let report = match phase {
        RunPhase::TimedOut => StatusReport::TimedOut { completed, total },
        _ => StatusReport::Aborted { completed, total },
    };
    vec![
        DriverEffect::PublishStatus(state.status.clone()),
        DriverEffect::DisarmGuard,
        DriverEffect::Report(state.report(report)),
    ]
}

fn is_current_run(state: &DriverState, run_id: u64) -> bool {
    state.phase == RunPhase::Running && state.status.run_id == run_id
}

/// URL to open for the site at `index`, rewritten by the URL rules scoped to
/// its 1-based registry position.
fn site_url(state: &DriverState, index: usize) -> String {
    state
        .sites
        .get(index)
        .map(|site| apply_rules(&site.url, index + 1, &state.url_rules))
        .unwrap_or_default()
}
