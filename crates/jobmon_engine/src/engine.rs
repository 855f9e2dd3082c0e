use std::sync::{mpsc, Arc, Mutex, PoisonError};
use std::thread;

use jobmon_logging::{jobmon_error, jobmon_info, jobmon_warn};
use tokio::runtime::Runtime;

use crate::client::ReqwestJobClient;
use crate::poller::Poller;
use crate::settings::{ClientSettings, PollSettings};
use crate::sink::{ChannelSink, LogSink, PollSink, SinkChain};
use crate::{ClientError, EngineEvent, JobId, RunRequest};

enum EngineCommand {
    Submit { card_id: u64, request: RunRequest },
    Watch { job_id: JobId },
    StopWatching { job_id: JobId },
    Cancel { job_id: JobId },
}

/// Handle to the background IO thread.
///
/// Commands are queued without blocking and started in the order they were
/// sent; results come back as [`EngineEvent`]s through
/// [`EngineHandle::try_recv`].
pub struct EngineHandle {
    cmd_tx: mpsc::Sender<EngineCommand>,
    event_rx: Mutex<mpsc::Receiver<EngineEvent>>,
}

struct Services {
    client: Arc<ReqwestJobClient>,
    poller: Poller,
}

impl EngineHandle {
    pub fn new(client: ClientSettings, poll: PollSettings) -> Result<Self, ClientError> {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        let client = Arc::new(ReqwestJobClient::new(client)?);
        let poller = Poller::new(client.clone(), poll);
        let services = Arc::new(Services { client, poller });

        thread::spawn(move || {
            let runtime = Runtime::new().expect("tokio runtime");
            let _enter = runtime.enter();
            while let Ok(command) = cmd_rx.recv() {
                dispatch(&runtime, &services, command, &event_tx);
            }
            jobmon_info!("Engine command channel closed; shutting down");
        });

        Ok(Self {
            cmd_tx,
            event_rx: Mutex::new(event_rx),
        })
    }

    pub fn submit(&self, card_id: u64, request: RunRequest) {
        let _ = self.cmd_tx.send(EngineCommand::Submit { card_id, request });
    }

    pub fn watch(&self, job_id: impl Into<JobId>) {
        let _ = self.cmd_tx.send(EngineCommand::Watch {
            job_id: job_id.into(),
        });
    }

    pub fn stop_watching(&self, job_id: impl Into<JobId>) {
        let _ = self.cmd_tx.send(EngineCommand::StopWatching {
            job_id: job_id.into(),
        });
    }

    pub fn cancel(&self, job_id: impl Into<JobId>) {
        let _ = self.cmd_tx.send(EngineCommand::Cancel {
            job_id: job_id.into(),
        });
    }

    pub fn try_recv(&self) -> Option<EngineEvent> {
        self.event_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_recv()
            .ok()
    }
}

/// Starts and stops poll loops on the command thread, so a `StopWatching`
/// always sees the loop registered by an earlier `Watch`. Network calls run
/// as tasks.
fn dispatch(
    runtime: &Runtime,
    services: &Arc<Services>,
    command: EngineCommand,
    event_tx: &mpsc::Sender<EngineEvent>,
) {
    match command {
        EngineCommand::Submit { card_id, request } => {
            let services = services.clone();
            let event_tx = event_tx.clone();
            runtime.spawn(async move {
                submit_run(&services, card_id, request, event_tx).await;
            });
        }
        EngineCommand::Watch { job_id } => start_watch(runtime, services, job_id, event_tx),
        EngineCommand::StopWatching { job_id } => {
            if !services.poller.stop(&job_id) {
                jobmon_info!("StopWatching for job_id={} with no active poll", job_id);
            }
        }
        EngineCommand::Cancel { job_id } => {
            let services = services.clone();
            let event_tx = event_tx.clone();
            runtime.spawn(async move {
                cancel_job(&services, job_id, event_tx).await;
            });
        }
    }
}

async fn submit_run(
    services: &Services,
    card_id: u64,
    request: RunRequest,
    event_tx: mpsc::Sender<EngineEvent>,
) {
    let result = services.client.submit(&request).await;
    match &result {
        Ok(job_id) => jobmon_info!(
            "Submitted playbook={} hosts={} job_id={}",
            request.playbook,
            request.hosts.len(),
            job_id
        ),
        Err(err) => jobmon_error!("Submit of playbook={} failed: {}", request.playbook, err),
    }
    let _ = event_tx.send(EngineEvent::Submitted { card_id, result });
}

fn start_watch(
    runtime: &Runtime,
    services: &Services,
    job_id: JobId,
    event_tx: &mpsc::Sender<EngineEvent>,
) {
    let sink: Arc<dyn PollSink> = Arc::new(
        SinkChain::new()
            .with(Arc::new(LogSink::new(job_id.clone())))
            .with(Arc::new(ChannelSink::new(job_id.clone(), event_tx.clone()))),
    );
    match services.poller.start_polling(job_id.clone(), sink) {
        Ok(handle) => {
            let event_tx = event_tx.clone();
            runtime.spawn(async move {
                let outcome = handle.wait().await;
                let _ = event_tx.send(EngineEvent::PollFinished { job_id, outcome });
            });
        }
        Err(err) => {
            jobmon_warn!("Not watching job_id={}: {}", job_id, err);
            let _ = event_tx.send(EngineEvent::WatchRejected {
                job_id,
                reason: err.to_string(),
            });
        }
    }
}

async fn cancel_job(services: &Services, job_id: JobId, event_tx: mpsc::Sender<EngineEvent>) {
    let result = services.client.cancel(&job_id).await;
    match &result {
        Ok(()) => {
            jobmon_info!("Cancelled job_id={}", job_id);
            services.poller.stop(&job_id);
        }
        Err(err) => jobmon_warn!("Cancel of job_id={} failed: {}", job_id, err),
    }
    let _ = event_tx.send(EngineEvent::CancelCompleted { job_id, result });
}
