use chainfleet::config::{DEFAULT_FLEETFILE, FleetFile, Settings};
use chainfleet::error::{ConfigError, FleetError};
use chainfleet::types::{ClientKind, NodeRole};
use pretty_assertions::assert_eq;
use std::path::Path;
use tempfile::TempDir;
use test_case::test_case;

const FLEETFILE: &str = r#"
network = "devnet"
chain_id = 1337

[[nodes]]
name = "alice"
role = "validator"
client = "geth"
p2p_port = 30303
rpc_port = 8545
address = "0x810685236b82e07D6Cda714A107Ecfa471B76bFD"
genesis = "genesis/genesis.json"

[[nodes]]
name = "elena"
role = "peer"
client = "nethermind"
p2p_port = 30307
rpc_port = 8549
extra_args = ["--log", "INFO"]
"#;

fn validation_reason(result: Result<FleetFile, FleetError>) -> String {
    match result {
        Err(FleetError::Config(ConfigError::Validation { reason })) => reason,
        Err(other) => panic!("expected a validation error, got {other}"),
        Ok(_) => panic!("expected a validation error"),
    }
}

#[test]
fn test_parse_fleetfile() {
    let fleet = FleetFile::parse(FLEETFILE).unwrap();

    assert_eq!(fleet.network, "devnet");
    assert_eq!(fleet.chain_id, 1337);
    assert_eq!(fleet.container_prefix, "chainfleet-");
    assert_eq!(fleet.nodes.len(), 2);
    assert_eq!(fleet.nodes[0].role, NodeRole::Validator);
    assert_eq!(fleet.nodes[1].client, ClientKind::Nethermind);
    assert_eq!(fleet.nodes[1].extra_args, vec!["--log", "INFO"]);
}

#[test]
fn test_example_fleet_is_valid() {
    let fleet = FleetFile::example();
    assert!(fleet.validate().is_ok());

    let names: Vec<&str> = fleet.nodes.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names, vec!["alice", "bob", "cassandra", "driss", "elena"]);
    let validators = fleet.nodes.iter().filter(|n| n.role == NodeRole::Validator).count();
    assert_eq!(validators, 3);
}

#[test]
fn test_save_and_load() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join(DEFAULT_FLEETFILE);

    FleetFile::example().save(&path).unwrap();
    let loaded = FleetFile::load(&path).unwrap();

    assert_eq!(loaded.nodes.len(), 5);
    assert_eq!(loaded.nodes[2].name, "cassandra");
}

#[test]
fn test_missing_fleetfile() {
    let temp_dir = TempDir::new().unwrap();
    let err = FleetFile::load(temp_dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, FleetError::Config(ConfigError::FleetfileNotFound { .. })));
}

#[test]
fn test_invalid_toml() {
    let err = FleetFile::parse("network = [").unwrap_err();
    assert!(matches!(err, FleetError::Config(ConfigError::InvalidFormat { .. })));
}

#[test]
fn test_duplicate_names_rejected() {
    let content = FLEETFILE.replace("name = \"elena\"", "name = \"alice\"");
    let reason = validation_reason(FleetFile::parse(&content));
    assert!(reason.contains("duplicate node name 'alice'"), "{reason}");
}

#[test]
fn test_duplicate_ports_rejected() {
    let content = FLEETFILE.replace("rpc_port = 8549", "rpc_port = 8545");
    let reason = validation_reason(FleetFile::parse(&content));
    assert!(reason.contains("port 8545"), "{reason}");
}

#[test]
fn test_p2p_and_rpc_ports_share_one_space() {
    let content = FLEETFILE.replace("rpc_port = 8549", "rpc_port = 30303");
    validation_reason(FleetFile::parse(&content));
}

#[test_case("Alice" ; "uppercase")]
#[test_case("al ice" ; "space")]
#[test_case("-alice" ; "leading dash")]
#[test_case("" ; "empty")]
fn test_bad_node_names_rejected(name: &str) {
    let content = FLEETFILE.replace("name = \"alice\"", &format!("name = \"{}\"", name));
    validation_reason(FleetFile::parse(&content));
}

#[test]
fn test_validator_needs_address() {
    let content = FLEETFILE.replace("address = \"0x810685236b82e07D6Cda714A107Ecfa471B76bFD\"\n", "");
    let reason = validation_reason(FleetFile::parse(&content));
    assert!(reason.contains("needs an address"), "{reason}");
}

#[test]
fn test_malformed_address_rejected() {
    let content = FLEETFILE.replace("0x810685236b82e07D6Cda714A107Ecfa471B76bFD", "0x1234");
    validation_reason(FleetFile::parse(&content));
}

#[test]
fn test_geth_needs_genesis() {
    let content = FLEETFILE.replace("genesis = \"genesis/genesis.json\"\n", "");
    let reason = validation_reason(FleetFile::parse(&content));
    assert!(reason.contains("genesis"), "{reason}");
}

#[test]
fn test_chain_id_must_be_non_zero() {
    let content = FLEETFILE.replace("chain_id = 1337", "chain_id = 0");
    validation_reason(FleetFile::parse(&content));
}

#[test]
fn test_no_nodes_rejected() {
    let reason = validation_reason(FleetFile::parse("network = \"devnet\"\nchain_id = 1\nnodes = []\n"));
    assert!(reason.contains("at least one node"), "{reason}");
}

#[test]
fn test_to_network_resolves_paths() {
    let fleet = FleetFile::parse(FLEETFILE).unwrap();
    let network = fleet.to_network(Path::new("/srv/fleet"));

    assert_eq!(network.name, "devnet");
    assert_eq!(network.container_name("alice"), "chainfleet-alice");

    let alice = network.node("alice").unwrap();
    assert_eq!(alice.volumes.data_dir, Path::new("/srv/fleet/nodes/alice/data"));
    assert_eq!(alice.volumes.keystore_dir, Path::new("/srv/fleet/nodes/alice/keystore"));
    assert_eq!(alice.genesis.as_deref(), Some(Path::new("/srv/fleet/genesis/genesis.json")));
    assert_eq!(alice.image, "ethereum/client-go:v1.13.15");

    let elena = network.node("elena").unwrap();
    assert_eq!(elena.genesis, None);
    assert_eq!(elena.image, "nethermind/nethermind:latest");
    assert_eq!(elena.extra_args, vec!["--log", "INFO"]);
}

#[test]
fn test_image_override() {
    let content = FLEETFILE.replace(
        "client = \"nethermind\"",
        "client = \"nethermind\"\nimage = \"nethermind/nethermind:1.25.4\"",
    );
    let network = FleetFile::parse(&content).unwrap().to_network(Path::new("/srv"));
    assert_eq!(network.node("elena").unwrap().image, "nethermind/nethermind:1.25.4");
}

#[test]
fn test_init_fleetfile_writes_once() {
    let temp_dir = TempDir::new().unwrap();
    let settings = Settings::with_base_dir(temp_dir.path().join("home"));

    assert!(settings.init_fleetfile().unwrap());
    assert!(!settings.init_fleetfile().unwrap());
    assert_eq!(settings.load_fleetfile().unwrap().nodes.len(), 5);
}

#[test]
fn test_settings_defaults() {
    let settings = Settings::with_base_dir("/tmp/chainfleet".into());

    assert_eq!(settings.fleetfile_path, Path::new("/tmp/chainfleet/Fleetfile.toml"));
    assert_eq!(settings.rpc_host, "localhost");
    assert_eq!(settings.rpc_timeout.as_secs(), 5);
    assert_eq!(settings.launch_stagger.as_secs(), 2);
    assert_eq!(settings.runtime.docker_host, "http://localhost:2375");
}
