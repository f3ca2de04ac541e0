pub mod app;
pub mod config;
pub mod repository;
pub mod service;

pub use app::run;
pub use config::Config;
pub use service::{OperationError, Orchestrator, RunReport, StopReason, Tier};
