//! Container management module
//!
//! This module maps cluster roles onto Docker containers: deriving each
//! role's container spec, reconciling it against the daemon and tracking
//! what this session started.

pub mod daemon;
pub mod registry;
pub mod role;
pub mod spec;

pub use daemon::{BollardDaemon, ContainerState, ContainerSummary, DockerDaemon, LogStream};
pub use registry::{ContainerHandle, ContainerLogs, ContainerRegistry, RunningSet};
pub use role::{ClusterStatus, ContainerRole, ContainerStatus};
pub use spec::{ContainerSpec, PortSpec, Protocol};
