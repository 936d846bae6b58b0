//! DAG Scheduler (spec §4.6), Trigger Dispatcher (spec §4.7), and the
//! `Engine` façade that ties the Node Registry, Workflow Store, and Run
//! Archive together into `run`/`dispatch`/`evaluate_event_triggers`.

pub mod config;
mod engine;
mod error;
mod scheduler;

pub use config::EngineConfig;
pub use engine::{Engine, RunReport, TriggerMatch};
pub use error::EngineError;
