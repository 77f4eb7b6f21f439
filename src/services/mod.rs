//! Profile lifecycle services

pub mod orchestrator;
pub mod runner;
pub mod status;

pub use orchestrator::RelayOrchestrator;
pub use runner::{ProfileRunner, RunnerRegistry};
pub use status::{ProfileStatusStore, StatusSink, SuccessReport};
