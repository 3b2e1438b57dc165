//! Container definitions for each client kind.

use crate::runtime::{ContainerSpec, PortBinding, VolumeMount};
use crate::types::{ClientKind, Network, Node};
use std::path::Path;

pub const LABEL_NETWORK: &str = "chainfleet.network";
pub const LABEL_NODE: &str = "chainfleet.node";

const DATA_MOUNT: &str = "/data";
const KEYSTORE_MOUNT: &str = "/keystore";
const GETH_GENESIS_MOUNT: &str = "/genesis/genesis.json";
const NETHERMIND_CHAINSPEC_MOUNT: &str = "/genesis/chainspec.json";

fn labels(network: &Network, node: &Node) -> Vec<(String, String)> {
    vec![
        (LABEL_NETWORK.to_string(), network.name.clone()),
        (LABEL_NODE.to_string(), node.name.clone()),
    ]
}

fn data_volumes(node: &Node) -> Vec<VolumeMount> {
    vec![
        VolumeMount::bind(&node.volumes.data_dir, DATA_MOUNT),
        VolumeMount::bind(&node.volumes.keystore_dir, KEYSTORE_MOUNT),
    ]
}

fn args<const N: usize>(parts: [&str; N]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// One-shot container seeding the node's data directory from the genesis
/// artifact.
pub fn init_spec(network: &Network, node: &Node, genesis: &Path) -> ContainerSpec {
    let mut volumes = data_volumes(node);
    volumes.push(VolumeMount::bind(genesis, GETH_GENESIS_MOUNT).read_only());

    ContainerSpec {
        name: network.init_container_name(&node.name),
        image: node.image.clone(),
        command: args(["init", "--datadir", DATA_MOUNT, GETH_GENESIS_MOUNT]),
        volumes,
        labels: labels(network, node),
        ..Default::default()
    }
}

/// Long-running container for the node.
pub fn node_spec(network: &Network, node: &Node) -> ContainerSpec {
    let mut volumes = data_volumes(node);
    let mut command = match node.client {
        ClientKind::Geth => geth_command(network, node),
        ClientKind::Nethermind => nethermind_command(node),
    };

    if node.client == ClientKind::Nethermind {
        if let Some(chainspec) = &node.genesis {
            volumes.push(VolumeMount::bind(chainspec, NETHERMIND_CHAINSPEC_MOUNT).read_only());
            command.extend(args(["--Init.ChainSpecPath", NETHERMIND_CHAINSPEC_MOUNT]));
        } else {
            command.extend(args(["--config", "mainnet"]));
        }
    }
    command.extend(node.extra_args.iter().cloned());

    ContainerSpec {
        name: network.container_name(&node.name),
        image: node.image.clone(),
        command,
        ports: vec![
            PortBinding::tcp(node.rpc_port, node.rpc_port),
            PortBinding::tcp(node.p2p_port, node.p2p_port),
        ],
        volumes,
        labels: labels(network, node),
        network: Some(network.name.clone()),
        ..Default::default()
    }
}

fn geth_command(network: &Network, node: &Node) -> Vec<String> {
    let chain_id = network.chain_id.to_string();
    let p2p = node.p2p_port.to_string();
    let rpc = node.rpc_port.to_string();

    let mut command = args([
        "--datadir", DATA_MOUNT,
        "--networkid", &chain_id,
        "--port", &p2p,
        "--http",
        "--http.addr", "0.0.0.0",
        "--http.port", &rpc,
        "--http.api", "eth,net,web3,txpool",
        "--http.corsdomain", "*",
        "--nodiscover",
        "--maxpeers", "25",
        "--syncmode", "full",
    ]);

    if node.is_validator() {
        if let Some(address) = &node.address {
            command.extend(args([
                "--mine",
                "--miner.etherbase", address,
                "--miner.gasprice", "1000000000",
                "--allow-insecure-unlock",
                "--unlock", address,
                "--password", "/dev/null",
            ]));
        }
    }
    command
}

fn nethermind_command(node: &Node) -> Vec<String> {
    let p2p = node.p2p_port.to_string();
    let rpc = node.rpc_port.to_string();

    args([
        "--datadir", DATA_MOUNT,
        "--JsonRpc.Enabled", "true",
        "--JsonRpc.Host", "0.0.0.0",
        "--JsonRpc.Port", &rpc,
        "--Network.DiscoveryPort", &p2p,
        "--Network.P2PPort", &p2p,
    ])
}
