use crate::{CardId, CardPhase, JobId};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppViewModel {
    pub jobs: Vec<JobCardView>,
    pub running_count: usize,
    pub notice: Option<String>,
    pub dirty: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobCardView {
    pub card_id: CardId,
    pub playbook: String,
    pub job_id: Option<JobId>,
    pub hosts: Vec<String>,
    pub phase: CardPhase,
    pub status_label: &'static str,
    /// Progress bar value; terminal cards show a full bar.
    pub progress: u8,
    pub output: String,
    /// Per-host slices of `output`, only for cards with more than one host.
    pub host_outputs: Vec<HostOutput>,
    pub error: Option<String>,
    pub cancel_pending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostOutput {
    pub host: String,
    pub output: String,
}
