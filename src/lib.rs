//! Chainfleet - launch and monitor a local fleet of blockchain client containers
//!
//! The crate drives a container runtime to bring up a declared set of chain
//! client nodes, and combines runtime telemetry with per-node JSON-RPC
//! queries to report the health of the fleet.

pub mod config;
pub mod error;
pub mod monitoring;
pub mod orchestration;
pub mod rpc;
pub mod runtime;
pub mod types;

pub use config::{FleetFile, NodeEntry, Settings};
pub use error::{FleetError, Result};
pub use monitoring::{Monitor, Snapshot, SnapshotRenderer};
pub use orchestration::{FleetControl, LaunchReport, Launcher, ProgressObserver};
pub use rpc::{Endpoint, RpcClientPool};
pub use runtime::ContainerRuntime;
pub use types::{ClientKind, Network, Node, NodeRole, NodeStatus};

// Re-export anyhow for compatibility
pub use anyhow;
