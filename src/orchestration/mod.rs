//! Launch sequencer.
//!
//! Brings a declared [`Network`] up node by node in declaration order. A node
//! that fails is recorded and skipped; the sequencer only gives up when no
//! node at all could be started.

use crate::error::{FleetError, LaunchError, NodeLaunchError, Result};
use crate::runtime::ContainerRuntime;
use crate::types::{Network, NetworkStatus, Node, NodeStatus, short_id};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub mod control;
pub mod spec;

pub use control::{FleetControl, TeardownReport};

pub const DEFAULT_STAGGER: Duration = Duration::from_secs(2);

/// Receives one event per attempted node, then the final report.
pub trait ProgressObserver: Send + Sync {
    fn update(&self, index: usize, message: &str);

    fn finish(&self, _report: &LaunchReport) {}
}

/// Observer that discards everything.
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn update(&self, _index: usize, _message: &str) {}
}

#[derive(Debug)]
pub enum NodeOutcome {
    Launched { node: String, container_id: String },
    Failed { node: String, error: NodeLaunchError },
}

impl NodeOutcome {
    pub fn node(&self) -> &str {
        match self {
            NodeOutcome::Launched { node, .. } | NodeOutcome::Failed { node, .. } => node,
        }
    }

    pub fn is_launched(&self) -> bool {
        matches!(self, NodeOutcome::Launched { .. })
    }
}

#[derive(Debug)]
pub struct LaunchReport {
    pub succeeded: usize,
    pub total: usize,
    pub outcomes: Vec<NodeOutcome>,
}

impl LaunchReport {
    /// Strict view of the report: anything short of every node is an error.
    pub fn check(&self) -> std::result::Result<(), LaunchError> {
        if self.succeeded == self.total {
            Ok(())
        } else if self.succeeded == 0 {
            Err(LaunchError::Total {
                total: self.total,
                source: None,
            })
        } else {
            Err(LaunchError::Partial {
                succeeded: self.succeeded,
                total: self.total,
            })
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &NodeLaunchError)> {
        self.outcomes.iter().filter_map(|o| match o {
            NodeOutcome::Failed { node, error } => Some((node.as_str(), error)),
            NodeOutcome::Launched { .. } => None,
        })
    }
}

pub struct Launcher {
    runtime: Arc<dyn ContainerRuntime>,
    stagger: Duration,
}

impl Launcher {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            runtime,
            stagger: DEFAULT_STAGGER,
        }
    }

    /// Delay between two consecutive nodes.
    pub fn with_stagger(mut self, stagger: Duration) -> Self {
        self.stagger = stagger;
        self
    }

    pub async fn launch(
        &self,
        network: &mut Network,
        progress: &dyn ProgressObserver,
        cancel: &CancellationToken,
    ) -> Result<LaunchReport> {
        info!(network = %network.name, nodes = network.nodes().len(), "Launching fleet");
        network.status = NetworkStatus::Initializing;

        self.runtime.create_network(&network.name).await?;

        let total = network.nodes().len();
        let mut outcomes = Vec::with_capacity(total);

        for index in 0..total {
            if cancel.is_cancelled() {
                warn!(network = %network.name, "Launch cancelled");
                return Err(FleetError::Cancelled);
            }

            let node = &network.nodes()[index];
            let name = node.name.clone();
            let (status, result) = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!(node = %name, "Launch cancelled while node was starting");
                    return Err(FleetError::Cancelled);
                }
                outcome = self.bring_up(network, node) => outcome,
            };
            network.nodes_mut()[index].set_status(status);

            let outcome = match result {
                Ok(container_id) => {
                    let message = format!("{} started ({})", name, short_id(&container_id));
                    info!(node = %name, container_id = %short_id(&container_id), "Node launched");
                    progress.update(index + 1, &message);
                    NodeOutcome::Launched {
                        node: name,
                        container_id,
                    }
                }
                Err(error) => {
                    let message = format!("{} failed: {}", name, error);
                    warn!(node = %name, error = %error, "Node failed to launch");
                    progress.update(index + 1, &message);
                    NodeOutcome::Failed { node: name, error }
                }
            };
            outcomes.push(outcome);

            if index + 1 < total && !self.stagger.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        warn!(network = %network.name, "Launch cancelled");
                        return Err(FleetError::Cancelled);
                    }
                    _ = tokio::time::sleep(self.stagger) => {}
                }
            }
        }

        let succeeded = outcomes.iter().filter(|o| o.is_launched()).count();
        network.status = if succeeded == total {
            NetworkStatus::Running
        } else if succeeded == 0 {
            NetworkStatus::Stopped
        } else {
            NetworkStatus::Degraded
        };

        let report = LaunchReport {
            succeeded,
            total,
            outcomes,
        };
        progress.finish(&report);
        info!(network = %network.name, succeeded, total, "Launch finished");

        if succeeded == 0 {
            let source = report.outcomes.into_iter().find_map(|o| match o {
                NodeOutcome::Failed { error, .. } => Some(Box::new(error)),
                NodeOutcome::Launched { .. } => None,
            });
            return Err(LaunchError::Total { total, source }.into());
        }
        Ok(report)
    }

    /// Runs both phases for one node and returns the status it ends in.
    async fn bring_up(
        &self,
        network: &Network,
        node: &Node,
    ) -> (NodeStatus, std::result::Result<String, NodeLaunchError>) {
        let runtime_error = |source| NodeLaunchError::Runtime {
            node: node.name.clone(),
            source,
        };

        if let Err(e) = prepare_volumes(node).await {
            return (NodeStatus::Pending, Err(e));
        }

        if node.client.requires_genesis_init() {
            if let Err(e) = self.initialize(network, node).await {
                return (NodeStatus::Pending, Err(e));
            }
        }

        let container_id = match self.runtime.create_container(&spec::node_spec(network, node)).await {
            Ok(id) => id,
            Err(e) => return (NodeStatus::Pending, Err(runtime_error(e))),
        };
        debug!(node = %node.name, container_id = %short_id(&container_id), "Container created");

        match self.runtime.start_container(&container_id).await {
            Ok(()) => (
                NodeStatus::Running {
                    container_id: container_id.clone(),
                },
                Ok(container_id),
            ),
            Err(e) => (NodeStatus::Failed { container_id }, Err(runtime_error(e))),
        }
    }

    async fn initialize(&self, network: &Network, node: &Node) -> std::result::Result<(), NodeLaunchError> {
        let missing = || NodeLaunchError::MissingGenesis {
            node: node.name.clone(),
        };
        let genesis = node.genesis.as_deref().ok_or_else(missing)?;
        if !tokio::fs::try_exists(genesis).await.unwrap_or(false) {
            return Err(missing());
        }

        debug!(node = %node.name, genesis = %genesis.display(), "Initializing data directory");
        let code = self
            .runtime
            .run_to_completion(&spec::init_spec(network, node, genesis))
            .await
            .map_err(|source| NodeLaunchError::Runtime {
                node: node.name.clone(),
                source,
            })?;

        if code != 0 {
            return Err(NodeLaunchError::InitExit {
                node: node.name.clone(),
                code,
            });
        }
        Ok(())
    }
}

async fn prepare_volumes(node: &Node) -> std::result::Result<(), NodeLaunchError> {
    for dir in [&node.volumes.data_dir, &node.volumes.keystore_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| NodeLaunchError::Prepare {
                node: node.name.clone(),
                source,
            })?;
    }
    Ok(())
}
