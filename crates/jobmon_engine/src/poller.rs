use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use jobmon_logging::{jobmon_debug, jobmon_info, jobmon_warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backoff::Backoff;
use crate::client::{is_dot_segment, StatusClient};
use crate::settings::{PollSettings, RetryPolicy};
use crate::sink::PollSink;
use crate::{ClientError, ErrorCategory, JobId, JobStatus, PollOutcome, StatusReport};

type Registry = Arc<Mutex<HashMap<JobId, CancellationToken>>>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StartError {
    #[error("job id must not be empty, \".\" or \"..\"")]
    InvalidJobId,
    #[error("job {0} is already being polled")]
    AlreadyPolling(JobId),
}

/// Starts and tracks one status poll loop per job id.
#[derive(Clone)]
pub struct Poller {
    client: Arc<dyn StatusClient>,
    settings: PollSettings,
    active: Registry,
}

impl Poller {
    pub fn new(client: Arc<dyn StatusClient>, settings: PollSettings) -> Self {
        Self {
            client,
            settings,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn settings(&self) -> &PollSettings {
        &self.settings
    }

    /// Spawns the poll loop for `job_id` onto the current Tokio runtime.
    ///
    /// Must be called from within a runtime context.
    pub fn start_polling(
        &self,
        job_id: impl Into<JobId>,
        sink: Arc<dyn PollSink>,
    ) -> Result<PollHandle, StartError> {
        let job_id = job_id.into();
        if job_id.trim().is_empty() || is_dot_segment(&job_id) {
            return Err(StartError::InvalidJobId);
        }

        let token = CancellationToken::new();
        {
            let mut active = lock(&self.active);
            if active.contains_key(&job_id) {
                return Err(StartError::AlreadyPolling(job_id));
            }
            active.insert(job_id.clone(), token.clone());
        }
        let guard = ActiveGuard {
            registry: self.active.clone(),
            job_id: job_id.clone(),
        };

        jobmon_info!("Start polling job_id={}", job_id);
        let client = self.client.clone();
        let settings = self.settings.clone();
        let loop_token = token.clone();
        let loop_job_id = job_id.clone();
        let task = tokio::spawn(async move {
            let _guard = guard;
            run_poll_loop(
                client.as_ref(),
                &loop_job_id,
                sink.as_ref(),
                &settings,
                &loop_token,
            )
            .await
        });

        Ok(PollHandle {
            job_id,
            token,
            task,
        })
    }

    /// Cancels the loop for `job_id`. Returns false when no loop was active.
    pub fn stop(&self, job_id: &str) -> bool {
        match lock(&self.active).get(job_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_polling(&self, job_id: &str) -> bool {
        lock(&self.active).contains_key(job_id)
    }

    pub fn active_jobs(&self) -> Vec<JobId> {
        let mut jobs: Vec<_> = lock(&self.active).keys().cloned().collect();
        jobs.sort();
        jobs
    }
}

pub struct PollHandle {
    job_id: JobId,
    token: CancellationToken,
    task: JoinHandle<PollOutcome>,
}

impl PollHandle {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Stops polling without waiting. No further sink callbacks are made.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn wait(self) -> PollOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(err) => {
                jobmon_warn!("Poll task for job_id={} ended abnormally: {}", self.job_id, err);
                PollOutcome::Aborted
            }
        }
    }
}

/// Releases the registry slot when the loop ends, however it ends.
struct ActiveGuard {
    registry: Registry,
    job_id: JobId,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        lock(&self.registry).remove(&self.job_id);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct PollState {
    backoff: Backoff,
    output: Option<String>,
    terminal: bool,
}

impl PollState {
    fn new(settings: &PollSettings) -> Self {
        Self {
            backoff: settings.backoff(),
            output: None,
            terminal: false,
        }
    }

    fn apply(&mut self, report: StatusReport, sink: &dyn PollSink) {
        if let Some(output) = report.output {
            if self.output.as_deref() != Some(output.as_str()) {
                sink.on_output(&output);
                self.output = Some(output);
            }
        }
        if let Some(percent) = report.progress {
            sink.on_progress(percent);
        }
        sink.on_status(report.status);
        if report.status.is_terminal() {
            self.terminal = true;
            sink.on_terminal(report.status);
        }
    }
}

enum Attempt {
    Report(StatusReport),
    Failed(ClientError),
    Aborted,
}

/// Polls `job_id` until it reaches a terminal status, a query fails for
/// good, or `cancel` fires.
pub async fn run_poll_loop(
    client: &dyn StatusClient,
    job_id: &str,
    sink: &dyn PollSink,
    settings: &PollSettings,
    cancel: &CancellationToken,
) -> PollOutcome {
    let mut state = PollState::new(settings);

    loop {
        match fetch_with_retry(client, job_id, &settings.retry, cancel).await {
            Attempt::Report(report) => {
                jobmon_debug!(
                    "Polled job_id={} status={} progress={:?}",
                    job_id,
                    report.status,
                    report.progress
                );
                let status = report.status;
                state.apply(report, sink);
                if state.terminal {
                    jobmon_info!("Job job_id={} reached terminal status={}", job_id, status);
                    return PollOutcome::Terminal(status);
                }
            }
            Attempt::Failed(err) => {
                jobmon_warn!("Polling job_id={} failed: {}", job_id, err);
                sink.on_error(&err.to_string());
                sink.on_terminal(JobStatus::Failed);
                return PollOutcome::Terminal(JobStatus::Failed);
            }
            Attempt::Aborted => return aborted(job_id),
        }

        let interval = state.backoff.advance();
        jobmon_debug!("Next poll for job_id={} in {:?}", job_id, interval);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return aborted(job_id),
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

async fn fetch_with_retry(
    client: &dyn StatusClient,
    job_id: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Attempt {
    let mut retries_left = policy.max_retries;
    let mut delay = policy.backoff();

    loop {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Attempt::Aborted,
            result = client.fetch_status(job_id) => result,
        };

        match result {
            Ok(report) => return Attempt::Report(report),
            Err(err) if err.kind.category() == ErrorCategory::Transport && retries_left > 0 => {
                retries_left -= 1;
                let wait = delay.current();
                delay.advance();
                jobmon_warn!(
                    "Status query for job_id={} failed ({}); retrying in {:?}, {} retries left",
                    job_id,
                    err,
                    wait,
                    retries_left
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Attempt::Aborted,
                    _ = tokio::time::sleep(wait) => {}
                }
            }
            Err(err) => return Attempt::Failed(err),
        }
    }
}

fn aborted(job_id: &str) -> PollOutcome {
    jobmon_info!("Polling cancelled for job_id={}", job_id);
    PollOutcome::Aborted
}
