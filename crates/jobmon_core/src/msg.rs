use crate::{CardId, JobId, JobStatus, RunSpec, RunningJobSnapshot};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// User asked to run a playbook on a set of hosts.
    RunRequested { spec: RunSpec },
    /// Server accepted the run and assigned a job id.
    RunAccepted { card_id: CardId, job_id: JobId },
    /// Server (or transport) refused the run.
    RunRejected { card_id: CardId, error: String },
    /// User asked to monitor a job that was started elsewhere.
    WatchRequested { job_id: JobId, label: Option<String> },
    /// Engine refused to start a poll loop for the job.
    WatchRejected { job_id: JobId, reason: String },
    OutputUpdated { job_id: JobId, text: String },
    ProgressUpdated { job_id: JobId, percent: u8 },
    StatusUpdated { job_id: JobId, status: JobStatus },
    PollErrored { job_id: JobId, message: String },
    JobTerminal { job_id: JobId, status: JobStatus },
    CancelClicked { card_id: CardId },
    CancelConfirmed { job_id: JobId },
    CancelFailed { job_id: JobId, error: String },
    /// User removed the card from the board.
    DismissClicked { card_id: CardId },
    /// Restore jobs that were still running when the previous session ended.
    RestoreRunningJobs(Vec<RunningJobSnapshot>),
    /// Render tick.
    Tick,
    NoOp,
}
