use jobmon_core::{update, AppState, Effect, JobStatus, Msg, RunningJobSnapshot};
use pretty_assertions::assert_eq;

fn init_logging() {
    jobmon_logging::initialize_for_tests();
}

#[test]
fn running_jobs_can_be_restored_for_resume() {
    init_logging();
    let (state, _) = update(
        AppState::new(),
        Msg::WatchRequested {
            job_id: "job-1".to_string(),
            label: Some("site.yml".to_string()),
        },
    );
    let (state, _) = update(
        state,
        Msg::WatchRequested {
            job_id: "job-2".to_string(),
            label: Some("baseline.yml".to_string()),
        },
    );
    let (state, _) = update(
        state,
        Msg::JobTerminal {
            job_id: "job-2".to_string(),
            status: JobStatus::Completed,
        },
    );

    let snapshots = state.running_jobs();
    assert_eq!(
        snapshots,
        vec![RunningJobSnapshot {
            job_id: "job-1".to_string(),
            playbook: "site.yml".to_string(),
            hosts: Vec::new(),
        }]
    );

    let (restored, effects) = update(AppState::new(), Msg::RestoreRunningJobs(snapshots));
    assert_eq!(
        effects,
        vec![Effect::StartPolling {
            job_id: "job-1".to_string()
        }]
    );
    assert_eq!(restored.running_jobs(), state.running_jobs());
}

#[test]
fn submitting_cards_are_not_persisted() {
    let (state, _) = update(
        AppState::new(),
        Msg::RunRequested {
            spec: jobmon_core::RunSpec {
                playbook: "site.yml".to_string(),
                hosts: vec!["web1".to_string()],
                extra_vars: Default::default(),
            },
        },
    );
    assert!(state.running_jobs().is_empty());
    assert!(!state.is_settled());
}
