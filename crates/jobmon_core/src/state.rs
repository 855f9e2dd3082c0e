use std::collections::BTreeMap;

use crate::output::host_sections;
use crate::view_model::{AppViewModel, JobCardView};

pub type CardId = u64;
pub type JobId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Running)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CardPhase {
    #[default]
    Submitting,
    Running,
    Completed,
    Failed,
    Cancelled,
    Rejected,
}

impl CardPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CardPhase::Completed | CardPhase::Failed | CardPhase::Cancelled | CardPhase::Rejected
        )
    }

    fn from_status(status: JobStatus) -> Self {
        match status {
            JobStatus::Running => CardPhase::Running,
            JobStatus::Completed => CardPhase::Completed,
            JobStatus::Failed => CardPhase::Failed,
            JobStatus::Cancelled => CardPhase::Cancelled,
        }
    }
}

/// What the user asked to run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunSpec {
    pub playbook: String,
    pub hosts: Vec<String>,
    pub extra_vars: BTreeMap<String, String>,
}

/// Minimal record needed to resume monitoring after a restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningJobSnapshot {
    pub job_id: JobId,
    pub playbook: String,
    pub hosts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct JobCard {
    playbook: String,
    hosts: Vec<String>,
    job_id: Option<JobId>,
    phase: CardPhase,
    progress: Option<u8>,
    output: String,
    error: Option<String>,
    cancel_pending: bool,
}

impl JobCard {
    fn new(playbook: String, hosts: Vec<String>) -> Self {
        Self {
            playbook,
            hosts,
            job_id: None,
            phase: CardPhase::Submitting,
            progress: None,
            output: String::new(),
            error: None,
            cancel_pending: false,
        }
    }
}

/// Single owner of all job cards. Only [`crate::update`] mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppState {
    cards: BTreeMap<CardId, JobCard>,
    next_card_id: CardId,
    notice: Option<String>,
    dirty: bool,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> AppViewModel {
        let jobs: Vec<JobCardView> = self
            .cards
            .iter()
            .map(|(card_id, card)| JobCardView {
                card_id: *card_id,
                playbook: card.playbook.clone(),
                job_id: card.job_id.clone(),
                hosts: card.hosts.clone(),
                phase: card.phase,
                status_label: status_label(card),
                progress: if card.phase.is_terminal() {
                    100
                } else {
                    card.progress.unwrap_or(0)
                },
                output: card.output.clone(),
                host_outputs: if card.hosts.len() > 1 {
                    host_sections(&card.output, &card.hosts)
                } else {
                    Vec::new()
                },
                error: card.error.clone(),
                cancel_pending: card.cancel_pending,
            })
            .collect();
        let running_count = jobs.iter().filter(|j| !j.phase.is_terminal()).count();

        AppViewModel {
            jobs,
            running_count,
            notice: self.notice.clone(),
            dirty: self.dirty,
        }
    }

    /// Returns and clears the dirty flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// Jobs the server is still running, for persistence.
    pub fn running_jobs(&self) -> Vec<RunningJobSnapshot> {
        self.cards
            .values()
            .filter(|card| card.phase == CardPhase::Running)
            .filter_map(|card| {
                card.job_id.as_ref().map(|job_id| RunningJobSnapshot {
                    job_id: job_id.clone(),
                    playbook: card.playbook.clone(),
                    hosts: card.hosts.clone(),
                })
            })
            .collect()
    }

    /// True when no card is waiting on the server.
    pub fn is_settled(&self) -> bool {
        self.cards.values().all(|card| card.phase.is_terminal())
    }

    /// True when every card finished with `Completed`.
    pub fn all_completed(&self) -> bool {
        self.cards
            .values()
            .all(|card| card.phase == CardPhase::Completed)
    }

    pub fn card_count(&self) -> usize {
        self.cards.len()
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn set_notice(&mut self, notice: impl Into<String>) {
        self.notice = Some(notice.into());
        self.mark_dirty();
    }

    pub(crate) fn add_card(&mut self, playbook: String, hosts: Vec<String>) -> CardId {
        self.next_card_id += 1;
        let card_id = self.next_card_id;
        self.cards.insert(card_id, JobCard::new(playbook, hosts));
        self.mark_dirty();
        card_id
    }

    pub(crate) fn add_running_card(
        &mut self,
        job_id: JobId,
        playbook: String,
        hosts: Vec<String>,
    ) -> CardId {
        let card_id = self.add_card(playbook, hosts);
        if let Some(card) = self.cards.get_mut(&card_id) {
            card.job_id = Some(job_id);
            card.phase = CardPhase::Running;
        }
        card_id
    }

    pub(crate) fn remove_card(&mut self, card_id: CardId) -> Option<(Option<JobId>, CardPhase)> {
        let card = self.cards.remove(&card_id)?;
        self.mark_dirty();
        Some((card.job_id, card.phase))
    }

    /// True when a non-terminal card already tracks `job_id`.
    pub(crate) fn is_tracking(&self, job_id: &str) -> bool {
        self.live_card_id(job_id).is_some()
    }

    pub(crate) fn accept(&mut self, card_id: CardId, job_id: JobId) -> bool {
        let Some(card) = self.cards.get_mut(&card_id) else {
            return false;
        };
        if card.phase != CardPhase::Submitting {
            return false;
        }
        card.job_id = Some(job_id);
        card.phase = CardPhase::Running;
        self.mark_dirty();
        true
    }

    pub(crate) fn reject(&mut self, card_id: CardId, error: String) {
        if let Some(card) = self.cards.get_mut(&card_id) {
            if card.phase == CardPhase::Submitting {
                card.phase = CardPhase::Rejected;
                card.error = Some(error);
                self.mark_dirty();
            }
        }
    }

    /// Applies `apply` to the live card for `job_id`. Terminal cards absorb
    /// everything, so late updates are dropped here.
    pub(crate) fn with_live_card(&mut self, job_id: &str, apply: impl FnOnce(&mut LiveCard<'_>)) {
        let Some(card_id) = self.live_card_id(job_id) else {
            return;
        };
        if let Some(card) = self.cards.get_mut(&card_id) {
            apply(&mut LiveCard { card });
            self.dirty = true;
        }
    }

    pub(crate) fn live_job_id(&self, card_id: CardId) -> Option<JobId> {
        self.cards
            .get(&card_id)
            .filter(|card| card.phase == CardPhase::Running)
            .and_then(|card| card.job_id.clone())
    }

    fn live_card_id(&self, job_id: &str) -> Option<CardId> {
        self.cards
            .iter()
            .find(|(_, card)| !card.phase.is_terminal() && card.job_id.as_deref() == Some(job_id))
            .map(|(card_id, _)| *card_id)
    }
}

/// Mutable access to a card that has not reached a terminal phase.
pub(crate) struct LiveCard<'a> {
    card: &'a mut JobCard,
}

impl LiveCard<'_> {
    pub(crate) fn set_output(&mut self, text: String) {
        self.card.output = text;
    }

    pub(crate) fn set_progress(&mut self, percent: u8) {
        self.card.progress = Some(percent.min(100));
    }

    pub(crate) fn set_phase(&mut self, status: JobStatus) {
        self.card.phase = CardPhase::from_status(status);
        if status.is_terminal() {
            self.card.cancel_pending = false;
        }
    }

    pub(crate) fn set_error(&mut self, message: String) {
        self.card.error = Some(message);
    }

    pub(crate) fn set_cancel_pending(&mut self, pending: bool) {
        self.card.cancel_pending = pending;
    }
}

fn status_label(card: &JobCard) -> &'static str {
    match card.phase {
        CardPhase::Submitting => "Submitting...",
        CardPhase::Running if card.cancel_pending => "Cancelling...",
        CardPhase::Running => "Running...",
        CardPhase::Completed => "Completed",
        CardPhase::Failed => "Failed",
        CardPhase::Cancelled => "Cancelled",
        CardPhase::Rejected => "Rejected",
    }
}
