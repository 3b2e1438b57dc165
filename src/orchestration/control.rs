//! Fleet control: tear-down, simulated outages and log access.

use crate::error::{FleetError, Result};
use crate::runtime::ContainerRuntime;
use crate::types::{ContainerRecord, Network};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub const DEFAULT_DOWNTIME: Duration = Duration::from_secs(40);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub removed: usize,
    pub failed: usize,
    pub network_removed: bool,
}

pub struct FleetControl {
    runtime: Arc<dyn ContainerRuntime>,
}

impl FleetControl {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    /// Stop and remove every container of the fleet, then the network.
    /// Individual failures are counted and the sweep continues.
    pub async fn down(&self, network: &Network) -> Result<TeardownReport> {
        info!(network = %network.name, "Tearing down fleet");
        let containers = self.runtime.list_containers(&network.container_prefix).await?;
        let mut report = TeardownReport::default();

        for container in containers {
            if container.is_up() {
                if let Err(e) = self.runtime.stop_container(&container.id).await {
                    warn!(container = %container.name, error = %e, "Failed to stop container");
                }
            }
            match self.runtime.remove_container(&container.id).await {
                Ok(()) => {
                    info!(container = %container.name, "Removed container");
                    report.removed += 1;
                }
                Err(e) => {
                    warn!(container = %container.name, error = %e, "Failed to remove container");
                    report.failed += 1;
                }
            }
        }

        match self.runtime.remove_network(&network.name).await {
            Ok(()) => report.network_removed = true,
            Err(e) => warn!(network = %network.name, error = %e, "Failed to remove network"),
        }
        Ok(report)
    }

    /// Stop a node, keep it down for `downtime`, then start it again. The
    /// node is restarted even when the wait is cancelled.
    pub async fn outage(
        &self,
        network: &Network,
        node: &str,
        downtime: Duration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let container = self.resolve(network, node).await?;
        info!(node, downtime = ?downtime, "Simulating outage");

        self.runtime.stop_container(&container.id).await?;
        let cancelled = tokio::select! {
            _ = cancel.cancelled() => true,
            _ = tokio::time::sleep(downtime) => false,
        };
        self.runtime.start_container(&container.id).await?;
        info!(node, "Node back online");

        if cancelled {
            return Err(FleetError::Cancelled);
        }
        Ok(())
    }

    pub async fn logs(&self, network: &Network, node: &str, tail: usize) -> Result<Vec<String>> {
        let container = self.resolve(network, node).await?;
        Ok(self.runtime.logs(&container.id, tail).await?)
    }

    /// Find the container backing a declared node.
    pub async fn resolve(&self, network: &Network, node: &str) -> Result<ContainerRecord> {
        let not_found = || FleetError::NodeNotFound {
            name: node.to_string(),
        };
        if network.node(node).is_none() {
            return Err(not_found());
        }

        let name = network.container_name(node);
        self.runtime
            .list_containers(&name)
            .await?
            .into_iter()
            .find(|c| c.name == name)
            .ok_or_else(not_found)
    }
}
