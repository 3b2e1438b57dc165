//! Monitoring loop.
//!
//! A [`Snapshot`] is taken by re-discovering the fleet's containers and, for
//! every one that is up, merging runtime stats with RPC readings. Any field
//! that cannot be obtained falls back to its default for that row only.

use crate::error::{FleetError, Result};
use crate::rpc::{Endpoint, RpcClientPool, wei_to_eth};
use crate::runtime::ContainerRuntime;
use crate::types::{ContainerRecord, Network};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub mod health;
pub mod tracing_setup;

pub use health::{FleetSummary, NodeHealth, NodeRow, derive_status, summary};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq)]
pub struct FleetTable {
    pub taken_at: DateTime<Utc>,
    pub rows: Vec<NodeRow>,
    pub summary: FleetSummary,
}

/// Result of one monitoring pass.
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    /// The runtime reported no container carrying the fleet prefix.
    NoContainers { taken_at: DateTime<Utc> },
    Table(FleetTable),
}

impl Snapshot {
    pub fn taken_at(&self) -> DateTime<Utc> {
        match self {
            Snapshot::NoContainers { taken_at } => *taken_at,
            Snapshot::Table(table) => table.taken_at,
        }
    }

    pub fn rows(&self) -> &[NodeRow] {
        match self {
            Snapshot::NoContainers { .. } => &[],
            Snapshot::Table(table) => &table.rows,
        }
    }
}

pub trait SnapshotRenderer: Send + Sync {
    fn render(&self, snapshot: &Snapshot);
}

pub struct Monitor {
    runtime: Arc<dyn ContainerRuntime>,
    rpc: Arc<RpcClientPool>,
    network: Arc<Network>,
    rpc_host: String,
    default_rpc_port: u16,
}

impl Monitor {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, rpc: Arc<RpcClientPool>, network: Arc<Network>) -> Self {
        Self {
            runtime,
            rpc,
            network,
            rpc_host: "localhost".to_string(),
            default_rpc_port: crate::config::DEFAULT_RPC_PORT,
        }
    }

    /// Host the nodes' RPC ports are published on.
    pub fn with_rpc_host(mut self, host: impl Into<String>) -> Self {
        self.rpc_host = host.into();
        self
    }

    /// Port used for containers that match the prefix but are not declared.
    pub fn with_default_rpc_port(mut self, port: u16) -> Self {
        self.default_rpc_port = port;
        self
    }

    pub async fn snapshot(&self, cancel: &CancellationToken) -> Result<Snapshot> {
        let mut containers =
            until_cancelled(cancel, self.runtime.list_containers(&self.network.container_prefix)).await??;
        // Genesis init runs are one-shot and never serve RPC.
        containers.retain(|c| !self.network.is_init_container(&c.name));
        let taken_at = Utc::now();

        if containers.is_empty() {
            debug!(prefix = %self.network.container_prefix, "No fleet containers found");
            return Ok(Snapshot::NoContainers { taken_at });
        }

        let rows = join_all(containers.iter().map(|c| self.node_row(c, cancel)))
            .await
            .into_iter()
            .collect::<Result<Vec<_>>>()?;

        let summary = summary(&rows);
        Ok(Snapshot::Table(FleetTable {
            taken_at,
            rows,
            summary,
        }))
    }

    pub async fn run_once(&self, renderer: &dyn SnapshotRenderer, cancel: &CancellationToken) -> Result<Snapshot> {
        let snapshot = self.snapshot(cancel).await?;
        renderer.render(&snapshot);
        Ok(snapshot)
    }

    /// Render a snapshot every `interval`, starting immediately, until
    /// cancelled. Errors of a single tick are logged and the loop goes on.
    pub async fn watch(
        &self,
        interval: Duration,
        renderer: &dyn SnapshotRenderer,
        cancel: &CancellationToken,
    ) -> Result<()> {
        info!(interval = ?interval, "Starting continuous monitoring");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Monitoring stopped");
                    return Err(FleetError::Cancelled);
                }
                _ = ticker.tick() => {}
            }

            match self.snapshot(cancel).await {
                Ok(snapshot) => renderer.render(&snapshot),
                Err(FleetError::Cancelled) => {
                    info!("Monitoring stopped");
                    return Err(FleetError::Cancelled);
                }
                Err(e) => warn!(error = %e, "Snapshot failed"),
            }
        }
    }

    async fn node_row(&self, container: &ContainerRecord, cancel: &CancellationToken) -> Result<NodeRow> {
        let name = self
            .network
            .node_name_of(&container.name)
            .unwrap_or(&container.name)
            .to_string();
        let declared = self.network.node(&name);
        let rpc_port = declared.map(|n| n.rpc_port).unwrap_or(self.default_rpc_port);
        let address = declared.and_then(|n| n.address.as_deref());
        let endpoint = Endpoint::http(&self.rpc_host, rpc_port);

        let mut row = NodeRow::new(name, NodeHealth::Offline, container.short_id());
        if !container.is_up() {
            // A restarted node must be probed again. Undeclared containers
            // only borrow the default port.
            if declared.is_some() {
                self.rpc.disconnect(&endpoint).await;
            }
            return Ok(row);
        }
        row.status = NodeHealth::Starting;

        match until_cancelled(cancel, self.runtime.stats(&container.id)).await? {
            Ok(stats) => {
                row.cpu_percent = stats.cpu_percent;
                row.memory_used = stats.memory_used;
            }
            Err(e) => debug!(node = %row.node, error = %e, "Stats unavailable"),
        }

        if let Err(e) = until_cancelled(cancel, self.rpc.connect(&endpoint)).await? {
            debug!(node = %row.node, %endpoint, error = %e, "RPC not reachable yet");
            return Ok(row);
        }

        let balance = async {
            match address {
                Some(address) => self.rpc.balance(&endpoint, address).await.map(Some),
                None => Ok(None),
            }
        };
        let (block, peers, pending, balance) = until_cancelled(cancel, async {
            tokio::join!(
                self.rpc.latest_block_number(&endpoint),
                self.rpc.peer_count(&endpoint),
                self.rpc.pending_transaction_count(&endpoint),
                balance,
            )
        })
        .await?;

        row.block_height = block.ok();
        row.peers = peers.unwrap_or(0);
        row.pending_transactions = pending.unwrap_or(0);
        row.balance_eth = balance.ok().flatten().map(wei_to_eth);
        row.status = derive_status(row.block_height, row.peers);
        Ok(row)
    }
}

async fn until_cancelled<F: Future>(cancel: &CancellationToken, future: F) -> Result<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(FleetError::Cancelled),
        output = future => Ok(output),
    }
}
