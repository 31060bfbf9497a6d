//! Codex Factory - a local Codex test cluster on Docker
//!
//! Codex Factory stands up and tears down a small cluster on one Docker
//! daemon:
//!
//! - One network shared by every node
//! - A blockchain node with the marketplace contracts deployed
//! - A client storage node that bootstraps the mesh
//! - Up to four host (storage provider) nodes
//!
//! Each component is started and polled until it serves before the next one
//! starts; a failed start stops everything the session started.

pub mod cluster;
pub mod config;
pub mod container;
pub mod error;
pub mod readiness;
pub mod version;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{FactoryError, Result};
