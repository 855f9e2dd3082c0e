mod app;
mod effects;
pub(crate) mod logging;
mod persistence;
mod render;

pub use app::run_app;
