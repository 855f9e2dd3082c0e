//! Jobmon engine: job API client, status poll loops and effect execution.
mod backoff;
mod client;
mod engine;
mod persist;
mod poller;
mod settings;
mod sink;
mod types;

pub use backoff::Backoff;
pub use client::{parse_status_body, ReqwestJobClient, StatusClient};
pub use engine::EngineHandle;
pub use persist::{ensure_state_dir, AtomicFileWriter, PersistError};
pub use poller::{run_poll_loop, PollHandle, Poller, StartError};
pub use settings::{ClientSettings, PollSettings, RetryPolicy, DEFAULT_BASE_URL};
pub use sink::{ChannelSink, LogSink, PollSink, SinkChain};
pub use types::{
    ClientError, EngineEvent, ErrorCategory, FailureKind, JobId, JobStatus, PollEvent,
    PollOutcome, PollUpdate, RunRequest, StatusReport, UnknownStatus,
};
