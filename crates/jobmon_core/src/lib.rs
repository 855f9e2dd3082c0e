//! Jobmon core: pure job-board state machine and view-model helpers.
mod effect;
mod msg;
mod output;
mod state;
mod update;
mod view_model;

pub use effect::Effect;
pub use msg::Msg;
pub use output::filter_host_output;
pub use state::{AppState, CardId, CardPhase, JobId, JobStatus, RunSpec, RunningJobSnapshot};
pub use update::update;
pub use view_model::{AppViewModel, HostOutput, JobCardView};
