use crate::error::{ConfigError, FleetError, Result};
use crate::types::{ClientKind, Network, Node, NodeRole, NodeVolumes};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_FLEETFILE: &str = "Fleetfile.toml";
pub const DEFAULT_NETWORK: &str = "chainfleet-network";
pub const DEFAULT_PREFIX: &str = "chainfleet-";
pub const DEFAULT_RPC_PORT: u16 = 8545;

/// Declarative description of a fleet, stored as `Fleetfile.toml`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct FleetFile {
    pub network: String,
    pub chain_id: u64,
    #[serde(default = "default_prefix")]
    pub container_prefix: String,
    pub nodes: Vec<NodeEntry>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct NodeEntry {
    pub name: String,
    pub role: NodeRole,
    pub client: ClientKind,
    pub p2p_port: u16,
    pub rpc_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Relative paths resolve against the base directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genesis: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<String>,
}

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

impl FleetFile {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => FleetError::Config(ConfigError::FleetfileNotFound {
                path: path.display().to_string(),
            }),
            _ => FleetError::Io(e),
        })?;

        let fleet = Self::parse(&content)?;
        debug!(path = %path.display(), nodes = fleet.nodes.len(), "Loaded Fleetfile");
        Ok(fleet)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let fleet: FleetFile = toml::from_str(content).map_err(|e| ConfigError::InvalidFormat {
            reason: e.to_string(),
        })?;
        fleet.validate()?;
        Ok(fleet)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.validate()?;

        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidFormat {
            reason: e.to_string(),
        })?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| -> Result<()> { Err(ConfigError::Validation { reason }.into()) };

        if self.network.is_empty() || self.network.contains(char::is_whitespace) {
            return invalid(format!("network name '{}' must be non-empty without spaces", self.network));
        }
        if self.chain_id == 0 {
            return invalid("chain_id must be non-zero".to_string());
        }
        if self.nodes.is_empty() {
            return invalid("at least one node must be declared".to_string());
        }

        let mut names = HashSet::new();
        let mut ports = HashSet::new();
        for node in &self.nodes {
            if !is_valid_node_name(&node.name) {
                return invalid(format!(
                    "node name '{}' must be lowercase alphanumeric or '-'",
                    node.name
                ));
            }
            if !names.insert(node.name.as_str()) {
                return invalid(format!("duplicate node name '{}'", node.name));
            }
            for port in [node.p2p_port, node.rpc_port] {
                if port == 0 {
                    return invalid(format!("node '{}' uses port 0", node.name));
                }
                if !ports.insert(port) {
                    return invalid(format!("port {} is assigned more than once", port));
                }
            }
            if node.role == NodeRole::Validator && node.address.is_none() {
                return invalid(format!("validator '{}' needs an address", node.name));
            }
            if let Some(address) = &node.address {
                if !is_valid_address(address) {
                    return invalid(format!("node '{}' has malformed address {}", node.name, address));
                }
            }
            if node.client.requires_genesis_init() && node.genesis.is_none() {
                return invalid(format!(
                    "{} node '{}' needs a genesis artifact",
                    node.client, node.name
                ));
            }
        }

        Ok(())
    }

    /// Build the in-memory registry, resolving volume and genesis paths
    /// under `base_dir`.
    pub fn to_network(&self, base_dir: &Path) -> Network {
        let mut network = Network::new(&self.network, self.chain_id, &self.container_prefix);
        for entry in &self.nodes {
            let node_dir = base_dir.join("nodes").join(&entry.name);
            let volumes = NodeVolumes {
                data_dir: node_dir.join("data"),
                keystore_dir: node_dir.join("keystore"),
            };
            let genesis = entry.genesis.as_ref().map(|g| {
                if g.is_absolute() { g.clone() } else { base_dir.join(g) }
            });

            let mut node = Node::new(
                &entry.name,
                entry.role,
                entry.client,
                entry.p2p_port,
                entry.rpc_port,
                entry.address.clone(),
                volumes,
                genesis,
            );
            if let Some(image) = &entry.image {
                node.image = image.clone();
            }
            node.extra_args = entry.extra_args.clone();

            // Names were validated unique.
            let _ = network.add_node(node);
        }
        network
    }

    /// Five-node development fleet: three validators and two peers across
    /// both supported clients.
    pub fn example() -> Self {
        let node = |name: &str, role, client, offset: u16, address: Option<&str>| NodeEntry {
            name: name.to_string(),
            role,
            client,
            p2p_port: 30303 + offset,
            rpc_port: DEFAULT_RPC_PORT + offset,
            address: address.map(str::to_string),
            genesis: Some(PathBuf::from(match client {
                ClientKind::Geth => "genesis/genesis.json",
                ClientKind::Nethermind => "genesis/chainspec.json",
            })),
            image: None,
            extra_args: Vec::new(),
        };

        Self {
            network: DEFAULT_NETWORK.to_string(),
            chain_id: 1337,
            container_prefix: DEFAULT_PREFIX.to_string(),
            nodes: vec![
                node("alice", NodeRole::Validator, ClientKind::Geth, 0, Some("0x810685236b82e07D6Cda714A107Ecfa471B76bFD")),
                node("bob", NodeRole::Validator, ClientKind::Geth, 1, Some("0xD7dd76b76CFeE812b06ACb5A50d8870fDf427b3d")),
                node("cassandra", NodeRole::Validator, ClientKind::Nethermind, 2, Some("0x3bB5Ad0ab4F1a2cDd0e1F4a0d6Ed6b9b5A1c7E21")),
                node("driss", NodeRole::Peer, ClientKind::Geth, 3, None),
                node("elena", NodeRole::Peer, ClientKind::Nethermind, 4, None),
            ],
        }
    }
}

fn is_valid_node_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('-')
        && name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

fn is_valid_address(address: &str) -> bool {
    address
        .strip_prefix("0x")
        .is_some_and(|hex| hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    /// Drive the `docker` binary
    Cli,
    /// Talk to the Docker Engine HTTP API
    Api,
}

#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub backend: Backend,
    pub docker_host: String,
    pub docker_binary: String,
    pub command_timeout: Duration,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            backend: Backend::Cli,
            docker_host: "http://localhost:2375".to_string(),
            docker_binary: "docker".to_string(),
            command_timeout: Duration::from_secs(60),
        }
    }
}

/// Process-level settings, independent of any particular fleet.
#[derive(Debug, Clone)]
pub struct Settings {
    pub base_dir: PathBuf,
    pub fleetfile_path: PathBuf,
    pub runtime: RuntimeSettings,
    pub rpc_host: String,
    pub rpc_timeout: Duration,
    pub launch_stagger: Duration,
    pub monitor_interval: Duration,
    pub verbose: bool,
}

impl Settings {
    /// Defaults rooted at `~/.chainfleet`.
    pub fn load() -> Result<Self> {
        let base_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".chainfleet");

        Ok(Self::with_base_dir(base_dir))
    }

    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        let fleetfile_path = base_dir.join(DEFAULT_FLEETFILE);
        Self {
            base_dir,
            fleetfile_path,
            runtime: RuntimeSettings::default(),
            rpc_host: "localhost".to_string(),
            rpc_timeout: Duration::from_secs(5),
            launch_stagger: Duration::from_secs(2),
            monitor_interval: Duration::from_secs(5),
            verbose: false,
        }
    }

    pub fn load_fleetfile(&self) -> Result<FleetFile> {
        FleetFile::load(&self.fleetfile_path)
    }

    /// Writes the example fleet unless a Fleetfile already exists.
    pub fn init_fleetfile(&self) -> Result<bool> {
        if self.fleetfile_path.exists() {
            return Ok(false);
        }
        if let Some(parent) = self.fleetfile_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        FleetFile::example().save(&self.fleetfile_path)?;
        info!(path = %self.fleetfile_path.display(), "Wrote example Fleetfile");
        Ok(true)
    }
}
