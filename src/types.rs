//! In-memory model of a declared fleet: the network and its nodes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeRole {
    Validator,
    Peer,
}

/// Supported chain client implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClientKind {
    Geth,
    Nethermind,
}

impl ClientKind {
    pub fn default_image(self) -> &'static str {
        match self {
            ClientKind::Geth => "ethereum/client-go:v1.13.15",
            ClientKind::Nethermind => "nethermind/nethermind:latest",
        }
    }

    /// Whether the data directory must be seeded from the genesis artifact
    /// by a one-shot init run before the node itself can start.
    pub fn requires_genesis_init(self) -> bool {
        matches!(self, ClientKind::Geth)
    }
}

impl fmt::Display for ClientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientKind::Geth => f.write_str("Geth"),
            ClientKind::Nethermind => f.write_str("Nethermind"),
        }
    }
}

/// Lifecycle status of a node. Every variant past `Pending` carries the
/// container id, so a node has a container id exactly when it is not pending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeStatus {
    Pending,
    Starting { container_id: String },
    Running { container_id: String },
    Offline { container_id: String },
    Failed { container_id: String },
}

impl NodeStatus {
    pub fn container_id(&self) -> Option<&str> {
        match self {
            NodeStatus::Pending => None,
            NodeStatus::Starting { container_id }
            | NodeStatus::Running { container_id }
            | NodeStatus::Offline { container_id }
            | NodeStatus::Failed { container_id } => Some(container_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    Initializing,
    Running,
    Degraded,
    Stopped,
}

/// Host-side directories mounted into a node's containers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeVolumes {
    pub data_dir: PathBuf,
    pub keystore_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub role: NodeRole,
    pub client: ClientKind,
    pub p2p_port: u16,
    pub rpc_port: u16,
    pub address: Option<String>,
    pub image: String,
    pub volumes: NodeVolumes,
    pub genesis: Option<PathBuf>,
    pub extra_args: Vec<String>,
    status: NodeStatus,
}

impl Node {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        role: NodeRole,
        client: ClientKind,
        p2p_port: u16,
        rpc_port: u16,
        address: Option<String>,
        volumes: NodeVolumes,
        genesis: Option<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            role,
            client,
            p2p_port,
            rpc_port,
            address,
            image: client.default_image().to_string(),
            volumes,
            genesis,
            extra_args: Vec::new(),
            status: NodeStatus::Pending,
        }
    }

    pub fn status(&self) -> &NodeStatus {
        &self.status
    }

    pub fn container_id(&self) -> Option<&str> {
        self.status.container_id()
    }

    pub fn set_status(&mut self, status: NodeStatus) {
        self.status = status;
    }

    pub fn is_validator(&self) -> bool {
        self.role == NodeRole::Validator
    }
}

const INIT_SUFFIX: &str = "-init";

/// The declared network. Node order is launch order.
#[derive(Debug, Clone)]
pub struct Network {
    pub name: String,
    pub chain_id: u64,
    pub container_prefix: String,
    nodes: Vec<Node>,
    pub status: NetworkStatus,
}

impl Network {
    pub fn new(name: impl Into<String>, chain_id: u64, container_prefix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            chain_id,
            container_prefix: container_prefix.into(),
            nodes: Vec::new(),
            status: NetworkStatus::Initializing,
        }
    }

    /// Appends a node, returning it back if the name is already taken.
    pub fn add_node(&mut self, node: Node) -> std::result::Result<(), Node> {
        if self.node(&node.name).is_some() {
            return Err(node);
        }
        self.nodes.push(node);
        Ok(())
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn nodes_mut(&mut self) -> &mut [Node] {
        &mut self.nodes
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn container_name(&self, node: &str) -> String {
        format!("{}{}", self.container_prefix, node)
    }

    /// Name of the one-shot container that seeds `node`'s data directory.
    pub fn init_container_name(&self, node: &str) -> String {
        format!("{}{}", self.container_name(node), INIT_SUFFIX)
    }

    /// Whether `container_name` is the init container of a declared node.
    pub fn is_init_container(&self, container_name: &str) -> bool {
        self.node_name_of(container_name)
            .and_then(|name| name.strip_suffix(INIT_SUFFIX))
            .is_some_and(|node| self.node(node).is_some())
    }

    /// Node name encoded in a container name, if it follows the fleet's convention.
    pub fn node_name_of<'a>(&self, container_name: &'a str) -> Option<&'a str> {
        container_name
            .trim_start_matches('/')
            .strip_prefix(self.container_prefix.as_str())
            .filter(|name| !name.is_empty())
    }
}

/// Container as reported by the runtime at the time of a poll.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContainerRecord {
    pub id: String,
    pub name: String,
    pub image: String,
    pub status: String,
    pub ports: Vec<String>,
    pub networks: Vec<String>,
}

impl ContainerRecord {
    /// Docker reports `Up 3 minutes` from `ps` and `running` from inspect.
    /// Paused containers show as `Up 3 minutes (Paused)` and do not count.
    pub fn is_up(&self) -> bool {
        let listed_up = self.status.starts_with("Up") && !self.status.ends_with("(Paused)");
        listed_up || self.status.eq_ignore_ascii_case("running")
    }

    pub fn short_id(&self) -> &str {
        short_id(&self.id)
    }
}

pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(12) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}
