//! Cluster orchestration
//!
//! Sequences the start-up of the whole cluster on top of the container
//! registry and the readiness probes.

pub mod orchestrator;

pub use orchestrator::{Orchestrator, Phase, StartRequest};
