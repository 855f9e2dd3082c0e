use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use jobmon_core::{update, AppState, CardId, Msg, RunSpec, RunningJobSnapshot};
use jobmon_logging::{jobmon_info, jobmon_warn};

use super::effects::EffectRunner;
use super::logging;
use super::persistence::{load_running_jobs, save_running_jobs};
use super::render::{self, Renderer};
use crate::cli::{extra_vars, Cli, Command};

const TICK_INTERVAL: Duration = Duration::from_millis(250);

/// Runs one CLI invocation to completion.
///
/// Returns `true` when every monitored job completed successfully.
pub fn run_app(cli: Cli) -> anyhow::Result<bool> {
    logging::initialize(cli.log.into(), &cli.state_dir);

    let client = cli.client_settings()?;
    let poll = cli.poll_settings()?;
    jobmon_info!(
        "jobmon starting base_url={} state_dir={:?}",
        client.base_url,
        cli.state_dir
    );

    let (msg_tx, msg_rx) = mpsc::channel::<Msg>();
    let runner = EffectRunner::new(client, poll, msg_tx)?;

    let persisted = load_running_jobs(&cli.state_dir);
    let mut session = Session::new(runner, cli.state_dir.clone());

    match cli.command {
        Command::Run {
            playbook,
            hosts,
            vars,
        } => {
            session.carried = persisted;
            session.dispatch(Msg::RunRequested {
                spec: RunSpec {
                    playbook,
                    hosts,
                    extra_vars: extra_vars(&vars),
                },
            });
        }
        Command::Watch { job_ids } => {
            session.carried = persisted;
            for job_id in job_ids {
                let label = session.label_for(&job_id);
                session.dispatch(Msg::WatchRequested { job_id, label });
            }
        }
        Command::Cancel { job_id } => {
            session.carried = persisted;
            session.cancel_only = true;
            let label = session.label_for(&job_id);
            session.dispatch(Msg::WatchRequested {
                job_id: job_id.clone(),
                label,
            });
            match session.card_for(&job_id) {
                Some(card_id) => session.dispatch(Msg::CancelClicked { card_id }),
                None => anyhow::bail!("job id {job_id:?} cannot be cancelled"),
            }
        }
        Command::Resume => {
            if persisted.is_empty() {
                println!("No running jobs to resume in {:?}", cli.state_dir);
                return Ok(true);
            }
            session.dispatch(Msg::RestoreRunningJobs(persisted));
        }
    }

    session.run(&msg_rx);
    Ok(session.succeeded())
}

struct Session {
    state: AppState,
    runner: EffectRunner,
    renderer: Renderer,
    state_dir: PathBuf,
    /// Running jobs from an earlier invocation that this one does not track.
    carried: Vec<RunningJobSnapshot>,
    last_saved: Option<Vec<RunningJobSnapshot>>,
    cancel_only: bool,
    cancel_failed: bool,
    pending: VecDeque<Msg>,
}

impl Session {
    fn new(runner: EffectRunner, state_dir: PathBuf) -> Self {
        Self {
            state: AppState::new(),
            runner,
            renderer: Renderer::new(),
            state_dir,
            carried: Vec::new(),
            last_saved: None,
            cancel_only: false,
            cancel_failed: false,
            pending: VecDeque::new(),
        }
    }

    fn dispatch(&mut self, msg: Msg) {
        self.pending.push_back(msg);
        self.drain();
    }

    fn drain(&mut self) {
        while let Some(msg) = self.pending.pop_front() {
            if self.cancel_only && matches!(msg, Msg::CancelFailed { .. }) {
                self.cancel_failed = true;
            }
            let (next, effects) = update(std::mem::take(&mut self.state), msg);
            self.state = next;
            self.runner.enqueue(effects);
        }
        if self.state.consume_dirty() {
            let view = self.state.view();
            for line in self.renderer.render(&view) {
                println!("{line}");
            }
            self.persist();
        }
    }

    fn run(&mut self, msg_rx: &mpsc::Receiver<Msg>) {
        while !self.finished() {
            match msg_rx.recv_timeout(TICK_INTERVAL) {
                Ok(msg) => self.pending.push_back(msg),
                Err(mpsc::RecvTimeoutError::Timeout) => self.pending.push_back(Msg::Tick),
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    jobmon_warn!("Engine event channel closed");
                    break;
                }
            }
            self.drain();
        }

        for line in render::summary(&self.state.view()) {
            println!("{line}");
        }
    }

    /// Done when no card waits on the server, or a cancel-only run was refused.
    fn finished(&self) -> bool {
        self.state.is_settled() || self.cancel_failed
    }

    fn succeeded(&self) -> bool {
        if self.cancel_only {
            return !self.cancel_failed && self.state.is_settled();
        }
        self.state.card_count() > 0 && self.state.all_completed()
    }

    /// Writes tracked running jobs plus untouched carried ones, skipping
    /// writes when nothing changed.
    fn persist(&mut self) {
        let tracked: HashSet<String> = self
            .state
            .view()
            .jobs
            .into_iter()
            .filter_map(|card| card.job_id)
            .collect();
        let mut running: Vec<RunningJobSnapshot> = self
            .carried
            .iter()
            .filter(|job| !tracked.contains(&job.job_id))
            .cloned()
            .collect();
        running.extend(self.state.running_jobs());

        if self.last_saved.as_ref() != Some(&running) {
            save_running_jobs(&self.state_dir, &running);
            self.last_saved = Some(running);
        }
    }

    /// Playbook name for a job known from an earlier invocation.
    fn label_for(&self, job_id: &str) -> Option<String> {
        self.carried
            .iter()
            .find(|job| job.job_id == job_id)
            .map(|job| job.playbook.clone())
    }

    fn card_for(&self, job_id: &str) -> Option<CardId> {
        self.state
            .view()
            .jobs
            .into_iter()
            .find(|card| card.job_id.as_deref() == Some(job_id))
            .map(|card| card.card_id)
    }
}
