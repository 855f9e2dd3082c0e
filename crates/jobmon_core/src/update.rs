use crate::{AppState, Effect, JobStatus, Msg, RunSpec};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: AppState, msg: Msg) -> (AppState, Vec<Effect>) {
    let effects = match msg {
        Msg::RunRequested { spec } => {
            let Some(spec) = normalize_spec(spec) else {
                state.set_notice("Select a playbook and at least one host before running");
                return (state, Vec::new());
            };
            let card_id = state.add_card(spec.playbook.clone(), spec.hosts.clone());
            vec![Effect::SubmitRun { card_id, spec }]
        }
        Msg::RunAccepted { card_id, job_id } => {
            if state.is_tracking(&job_id) {
                // The job is already on the board; its existing card keeps the only loop.
                state.remove_card(card_id);
                state.set_notice(format!("Job {job_id} is already being monitored"));
                Vec::new()
            } else if state.accept(card_id, job_id.clone()) {
                vec![Effect::StartPolling { job_id }]
            } else {
                // Card was dismissed while the submit was in flight.
                Vec::new()
            }
        }
        Msg::RunRejected { card_id, error } => {
            state.reject(card_id, error);
            Vec::new()
        }
        Msg::WatchRequested { job_id, label } => {
            let job_id = job_id.trim().to_string();
            if job_id.is_empty() || state.is_tracking(&job_id) {
                return (state, Vec::new());
            }
            let playbook = label.unwrap_or_else(|| job_id.clone());
            state.add_running_card(job_id.clone(), playbook, Vec::new());
            vec![Effect::StartPolling { job_id }]
        }
        Msg::WatchRejected { job_id, reason } => {
            state.set_notice(format!("Not monitoring {job_id}: {reason}"));
            // No loop will report for this card, so it ends here.
            state.with_live_card(&job_id, |card| {
                card.set_error(reason);
                card.set_phase(JobStatus::Failed);
            });
            Vec::new()
        }
        Msg::OutputUpdated { job_id, text } => {
            state.with_live_card(&job_id, |card| card.set_output(text));
            Vec::new()
        }
        Msg::ProgressUpdated { job_id, percent } => {
            state.with_live_card(&job_id, |card| card.set_progress(percent));
            Vec::new()
        }
        Msg::StatusUpdated { job_id, status } => {
            state.with_live_card(&job_id, |card| card.set_phase(status));
            Vec::new()
        }
        Msg::PollErrored { job_id, message } => {
            state.with_live_card(&job_id, |card| card.set_error(message));
            Vec::new()
        }
        Msg::JobTerminal { job_id, status } => {
            // A terminal message carrying `Running` would break the absorbing
            // state; treat it as a failure instead.
            let status = if status.is_terminal() {
                status
            } else {
                JobStatus::Failed
            };
            state.with_live_card(&job_id, |card| card.set_phase(status));
            Vec::new()
        }
        Msg::CancelClicked { card_id } => match state.live_job_id(card_id) {
            Some(job_id) => {
                state.with_live_card(&job_id, |card| card.set_cancel_pending(true));
                vec![Effect::CancelJob { job_id }]
            }
            None => Vec::new(),
        },
        Msg::CancelConfirmed { job_id } => {
            state.with_live_card(&job_id, |card| card.set_phase(JobStatus::Cancelled));
            Vec::new()
        }
        Msg::CancelFailed { job_id, error } => {
            state.with_live_card(&job_id, |card| {
                card.set_cancel_pending(false);
                card.set_error(error);
            });
            Vec::new()
        }
        Msg::DismissClicked { card_id } => match state.remove_card(card_id) {
            Some((Some(job_id), phase)) if !phase.is_terminal() => {
                vec![Effect::StopPolling { job_id }]
            }
            _ => Vec::new(),
        },
        Msg::RestoreRunningJobs(snapshots) => {
            let mut effects = Vec::with_capacity(snapshots.len());
            for snapshot in snapshots {
                if snapshot.job_id.trim().is_empty() || state.is_tracking(&snapshot.job_id) {
                    continue;
                }
                state.add_running_card(
                    snapshot.job_id.clone(),
                    snapshot.playbook,
                    snapshot.hosts,
                );
                effects.push(Effect::StartPolling {
                    job_id: snapshot.job_id,
                });
            }
            effects
        }
        Msg::Tick | Msg::NoOp => Vec::new(),
    };

    (state, effects)
}

/// Trims the playbook, trims and de-duplicates hosts (first occurrence wins).
/// Returns `None` when there is nothing runnable.
fn normalize_spec(spec: RunSpec) -> Option<RunSpec> {
    let playbook = spec.playbook.trim().to_string();
    let mut hosts: Vec<String> = Vec::with_capacity(spec.hosts.len());
    for host in spec.hosts.iter().map(|h| h.trim()).filter(|h| !h.is_empty()) {
        if !hosts.iter().any(|seen| seen == host) {
            hosts.push(host.to_string());
        }
    }
    if playbook.is_empty() || hosts.is_empty() {
        return None;
    }
    Some(RunSpec {
        playbook,
        hosts,
        extra_vars: spec.extra_vars,
    })
}
