#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    SubmitRun {
        card_id: crate::CardId,
        spec: crate::RunSpec,
    },
    StartPolling {
        job_id: crate::JobId,
    },
    StopPolling {
        job_id: crate::JobId,
    },
    CancelJob {
        job_id: crate::JobId,
    },
}
