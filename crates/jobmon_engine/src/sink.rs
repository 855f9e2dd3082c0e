use std::sync::mpsc;
use std::sync::Arc;

use jobmon_logging::{jobmon_info, jobmon_warn};

use crate::{EngineEvent, JobId, JobStatus, PollEvent, PollUpdate};

/// Receives updates for a single job while it is being polled.
///
/// Implementations must not panic; the poll loop does not guard against it.
pub trait PollSink: Send + Sync {
    fn on_output(&self, text: &str);
    fn on_progress(&self, percent: u8);
    fn on_status(&self, status: JobStatus);
    fn on_error(&self, message: &str);
    fn on_terminal(&self, status: JobStatus);
}

/// Fans every callback out to its members, in insertion order.
#[derive(Default, Clone)]
pub struct SinkChain {
    sinks: Vec<Arc<dyn PollSink>>,
}

impl SinkChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn PollSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn push(&mut self, sink: Arc<dyn PollSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl PollSink for SinkChain {
    fn on_output(&self, text: &str) {
        self.sinks.iter().for_each(|sink| sink.on_output(text));
    }

    fn on_progress(&self, percent: u8) {
        self.sinks.iter().for_each(|sink| sink.on_progress(percent));
    }

    fn on_status(&self, status: JobStatus) {
        self.sinks.iter().for_each(|sink| sink.on_status(status));
    }

    fn on_error(&self, message: &str) {
        self.sinks.iter().for_each(|sink| sink.on_error(message));
    }

    fn on_terminal(&self, status: JobStatus) {
        self.sinks.iter().for_each(|sink| sink.on_terminal(status));
    }
}

/// Forwards callbacks, tagged with the job id, over the engine event channel.
pub struct ChannelSink {
    job_id: JobId,
    tx: mpsc::Sender<EngineEvent>,
}

impl ChannelSink {
    pub fn new(job_id: impl Into<JobId>, tx: mpsc::Sender<EngineEvent>) -> Self {
        Self {
            job_id: job_id.into(),
            tx,
        }
    }

    fn send(&self, update: PollUpdate) {
        // A closed receiver means nobody is displaying this job any more.
        let _ = self.tx.send(EngineEvent::Poll(PollEvent {
            job_id: self.job_id.clone(),
            update,
        }));
    }
}

impl PollSink for ChannelSink {
    fn on_output(&self, text: &str) {
        self.send(PollUpdate::Output(text.to_string()));
    }

    fn on_progress(&self, percent: u8) {
        self.send(PollUpdate::Progress(percent));
    }

    fn on_status(&self, status: JobStatus) {
        self.send(PollUpdate::Status(status));
    }

    fn on_error(&self, message: &str) {
        self.send(PollUpdate::Error(message.to_string()));
    }

    fn on_terminal(&self, status: JobStatus) {
        self.send(PollUpdate::Terminal(status));
    }
}

/// Writes poll updates to the log.
pub struct LogSink {
    job_id: JobId,
}

impl LogSink {
    pub fn new(job_id: impl Into<JobId>) -> Self {
        Self {
            job_id: job_id.into(),
        }
    }
}

impl PollSink for LogSink {
    fn on_output(&self, text: &str) {
        jobmon_info!("job {} output_len={}", self.job_id, text.len());
    }

    fn on_progress(&self, percent: u8) {
        jobmon_info!("job {} progress={}%", self.job_id, percent);
    }

    fn on_status(&self, status: JobStatus) {
        jobmon_info!("job {} status={}", self.job_id, status);
    }

    fn on_error(&self, message: &str) {
        jobmon_warn!("job {} error: {}", self.job_id, message);
    }

    fn on_terminal(&self, status: JobStatus) {
        jobmon_info!("job {} finished with status={}", self.job_id, status);
    }
}
