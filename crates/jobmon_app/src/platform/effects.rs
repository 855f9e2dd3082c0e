use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use jobmon_core::{Effect, JobStatus, Msg};
use jobmon_engine::{
    ClientSettings, EngineEvent, EngineHandle, PollOutcome, PollSettings, PollUpdate, RunRequest,
};
use jobmon_logging::{jobmon_debug, jobmon_info, jobmon_warn};

/// Turns core effects into engine commands and engine events back into
/// core messages.
pub struct EffectRunner {
    engine: Arc<EngineHandle>,
}

impl EffectRunner {
    pub fn new(
        client: ClientSettings,
        poll: PollSettings,
        msg_tx: mpsc::Sender<Msg>,
    ) -> anyhow::Result<Self> {
        let engine = Arc::new(EngineHandle::new(client, poll)?);
        let runner = Self { engine };
        runner.spawn_event_loop(msg_tx);
        Ok(runner)
    }

    pub fn enqueue(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::SubmitRun { card_id, spec } => {
                    jobmon_info!(
                        "SubmitRun card_id={} playbook={} hosts={}",
                        card_id,
                        spec.playbook,
                        spec.hosts.join(",")
                    );
                    self.engine.submit(
                        card_id,
                        RunRequest {
                            playbook: spec.playbook,
                            hosts: spec.hosts,
                            extra_vars: spec.extra_vars,
                        },
                    );
                }
                Effect::StartPolling { job_id } => self.engine.watch(job_id),
                Effect::StopPolling { job_id } => self.engine.stop_watching(job_id),
                Effect::CancelJob { job_id } => {
                    jobmon_info!("CancelJob job_id={}", job_id);
                    self.engine.cancel(job_id);
                }
            }
        }
    }

    fn spawn_event_loop(&self, msg_tx: mpsc::Sender<Msg>) {
        let engine = self.engine.clone();
        thread::spawn(move || loop {
            if let Some(event) = engine.try_recv() {
                if let Some(msg) = map_event(event) {
                    if msg_tx.send(msg).is_err() {
                        break;
                    }
                }
            } else {
                thread::sleep(Duration::from_millis(20));
            }
        });
    }
}

fn map_event(event: EngineEvent) -> Option<Msg> {
    let msg = match event {
        EngineEvent::Submitted { card_id, result } => match result {
            Ok(job_id) => Msg::RunAccepted { card_id, job_id },
            Err(err) => Msg::RunRejected {
                card_id,
                error: err.to_string(),
            },
        },
        EngineEvent::Poll(event) => {
            let job_id = event.job_id;
            match event.update {
                PollUpdate::Output(text) => Msg::OutputUpdated { job_id, text },
                PollUpdate::Progress(percent) => Msg::ProgressUpdated { job_id, percent },
                PollUpdate::Status(status) => Msg::StatusUpdated {
                    job_id,
                    status: map_status(status),
                },
                PollUpdate::Error(message) => Msg::PollErrored { job_id, message },
                PollUpdate::Terminal(status) => Msg::JobTerminal {
                    job_id,
                    status: map_status(status),
                },
            }
        }
        EngineEvent::WatchRejected { job_id, reason } => Msg::WatchRejected { job_id, reason },
        EngineEvent::CancelCompleted { job_id, result } => match result {
            Ok(()) => Msg::CancelConfirmed { job_id },
            Err(err) => {
                jobmon_warn!("Cancel of job {} failed: {}", job_id, err);
                Msg::CancelFailed {
                    job_id,
                    error: err.to_string(),
                }
            }
        },
        EngineEvent::PollFinished { job_id, outcome } => {
            match outcome {
                PollOutcome::Terminal(status) => {
                    jobmon_debug!("Poll loop for job {} ended with {}", job_id, status)
                }
                PollOutcome::Aborted => jobmon_debug!("Poll loop for job {} aborted", job_id),
            }
            return None;
        }
    };
    Some(msg)
}

fn map_status(status: jobmon_engine::JobStatus) -> JobStatus {
    match status {
        jobmon_engine::JobStatus::Running => JobStatus::Running,
        jobmon_engine::JobStatus::Completed => JobStatus::Completed,
        jobmon_engine::JobStatus::Failed => JobStatus::Failed,
        jobmon_engine::JobStatus::Cancelled => JobStatus::Cancelled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobmon_engine::{ClientError, FailureKind, PollEvent};

    fn poll(update: PollUpdate) -> EngineEvent {
        EngineEvent::Poll(PollEvent {
            job_id: "job-1".to_string(),
            update,
        })
    }

    #[test]
    fn poll_updates_become_card_messages() {
        assert_eq!(
            map_event(poll(PollUpdate::Progress(40))),
            Some(Msg::ProgressUpdated {
                job_id: "job-1".to_string(),
                percent: 40
            })
        );
        assert_eq!(
            map_event(poll(PollUpdate::Terminal(jobmon_engine::JobStatus::Cancelled))),
            Some(Msg::JobTerminal {
                job_id: "job-1".to_string(),
                status: JobStatus::Cancelled
            })
        );
    }

    #[test]
    fn submit_failure_becomes_rejection_with_reason() {
        let event = EngineEvent::Submitted {
            card_id: 3,
            result: Err(ClientError::new(
                FailureKind::Rejected,
                "playbook not found",
            )),
        };
        match map_event(event) {
            Some(Msg::RunRejected { card_id, error }) => {
                assert_eq!(card_id, 3);
                assert!(error.contains("playbook not found"), "{error}");
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn cancel_results_map_to_confirm_or_failure() {
        let ok = EngineEvent::CancelCompleted {
            job_id: "job-1".to_string(),
            result: Ok(()),
        };
        assert_eq!(
            map_event(ok),
            Some(Msg::CancelConfirmed {
                job_id: "job-1".to_string()
            })
        );

        let failed = EngineEvent::CancelCompleted {
            job_id: "job-1".to_string(),
            result: Err(ClientError::new(FailureKind::HttpStatus(409), "conflict")),
        };
        assert!(matches!(map_event(failed), Some(Msg::CancelFailed { .. })));
    }

    #[test]
    fn finished_poll_loops_produce_no_message() {
        let event = EngineEvent::PollFinished {
            job_id: "job-1".to_string(),
            outcome: PollOutcome::Aborted,
        };
        assert_eq!(map_event(event), None);
    }
}
