//! Readiness checks
//!
//! A container that runs is not necessarily serving. These probes poll the
//! node APIs until each component answers, retrying transient connection
//! failures within a fixed bound.

pub mod api;
pub mod classify;
pub mod poller;
pub mod probes;

pub use api::{DebugInfo, HttpNodeApi, NodeApi, PeerTable, EXPECTED_CHAIN_ID};
pub use classify::is_transient;
pub use poller::{poll_until_ready, Probe};
pub use probes::{wait_for_blockchain, wait_for_client, wait_for_hosts};
