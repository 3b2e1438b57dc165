#![allow(dead_code)]

use async_trait::async_trait;
use chainfleet::error::{ConnectionError, Operation, RuntimeCause, RuntimeError};
use chainfleet::rpc::{Dialer, Endpoint, RpcTransport};
use chainfleet::runtime::{ContainerRuntime, ContainerSpec, ContainerStats, RuntimeResult};
use chainfleet::types::{ClientKind, ContainerRecord, Network, Node, NodeRole, NodeVolumes};
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

pub const PREFIX: &str = "chainfleet-";
pub const NETWORK: &str = "chainfleet-network";

fn api_failure(operation: Operation, message: &str) -> RuntimeError {
    RuntimeError::new(
        operation,
        RuntimeCause::Api {
            status: 500,
            message: message.to_string(),
        },
    )
}

#[derive(Debug, Clone)]
struct FakeContainer {
    id: String,
    name: String,
    image: String,
    running: bool,
}

#[derive(Default)]
struct FakeState {
    networks: HashSet<String>,
    containers: Vec<FakeContainer>,
    next_id: usize,
    created: Vec<String>,
    init_runs: Vec<String>,
    fail_network: bool,
    fail_list: bool,
    fail_create: HashSet<String>,
    fail_start: HashSet<String>,
    fail_stats: HashSet<String>,
    fail_remove: HashSet<String>,
    create_delay: Option<Duration>,
    init_exit: HashMap<String, i64>,
    stats: HashMap<String, ContainerStats>,
    logs: HashMap<String, Vec<String>>,
}

/// In-memory container runtime. Failures are injected by container name.
#[derive(Default)]
pub struct FakeRuntime {
    state: Mutex<FakeState>,
}

impl FakeRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_network(&self) {
        self.state.lock().unwrap().fail_network = true;
    }

    pub fn fail_list(&self) {
        self.state.lock().unwrap().fail_list = true;
    }

    pub fn fail_create(&self, name: &str) {
        self.state.lock().unwrap().fail_create.insert(name.to_string());
    }

    pub fn fail_start(&self, name: &str) {
        self.state.lock().unwrap().fail_start.insert(name.to_string());
    }

    pub fn fail_stats(&self, name: &str) {
        self.state.lock().unwrap().fail_stats.insert(name.to_string());
    }

    /// Every create takes `delay` before it is applied.
    pub fn delay_create(&self, delay: Duration) {
        self.state.lock().unwrap().create_delay = Some(delay);
    }

    pub fn fail_remove(&self, name: &str) {
        self.state.lock().unwrap().fail_remove.insert(name.to_string());
    }

    pub fn set_init_exit(&self, name: &str, code: i64) {
        self.state.lock().unwrap().init_exit.insert(name.to_string(), code);
    }

    pub fn set_stats(&self, name: &str, stats: ContainerStats) {
        self.state.lock().unwrap().stats.insert(name.to_string(), stats);
    }

    pub fn set_logs(&self, name: &str, lines: &[&str]) {
        self.state
            .lock()
            .unwrap()
            .logs
            .insert(name.to_string(), lines.iter().map(|s| s.to_string()).collect());
    }

    /// Adds a container directly, as if launched earlier. Returns its id.
    pub fn add_container(&self, name: &str, running: bool) -> String {
        let mut state = self.state.lock().unwrap();
        let id = next_id(&mut state);
        state.containers.push(FakeContainer {
            id: id.clone(),
            name: name.to_string(),
            image: "fake/image:latest".to_string(),
            running,
        });
        id
    }

    pub fn set_running(&self, name: &str, running: bool) {
        let mut state = self.state.lock().unwrap();
        if let Some(c) = state.containers.iter_mut().find(|c| c.name == name) {
            c.running = running;
        }
    }

    pub fn created(&self) -> Vec<String> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn init_runs(&self) -> Vec<String> {
        self.state.lock().unwrap().init_runs.clone()
    }

    pub fn container_names(&self) -> Vec<String> {
        self.state.lock().unwrap().containers.iter().map(|c| c.name.clone()).collect()
    }

    pub fn has_network(&self, name: &str) -> bool {
        self.state.lock().unwrap().networks.contains(name)
    }

    pub fn is_up(&self, name: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .containers
            .iter()
            .any(|c| c.name == name && c.running)
    }

    fn name_of(&self, id: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .containers
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.name.clone())
    }
}

fn next_id(state: &mut FakeState) -> String {
    state.next_id += 1;
    format!("{:012x}{}", state.next_id, "e".repeat(52))
}

fn record(container: &FakeContainer) -> ContainerRecord {
    ContainerRecord {
        id: container.id.clone(),
        name: container.name.clone(),
        image: container.image.clone(),
        status: if container.running {
            "Up 2 minutes".to_string()
        } else {
            "Exited (0) 5 seconds ago".to_string()
        },
        ports: Vec::new(),
        networks: vec![NETWORK.to_string()],
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn create_network(&self, name: &str) -> RuntimeResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_network {
            return Err(api_failure(Operation::CreateNetwork, "network driver unavailable"));
        }
        state.networks.insert(name.to_string());
        Ok(())
    }

    async fn remove_network(&self, name: &str) -> RuntimeResult<()> {
        self.state.lock().unwrap().networks.remove(name);
        Ok(())
    }

    async fn connect_to_network(&self, _id: &str, _network: &str) -> RuntimeResult<()> {
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> RuntimeResult<String> {
        let delay = self.state.lock().unwrap().create_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock().unwrap();
        state.created.push(spec.name.clone());
        if state.fail_create.contains(&spec.name) {
            return Err(api_failure(Operation::CreateContainer, "image not found"));
        }
        if state.containers.iter().any(|c| c.name == spec.name) {
            return Err(RuntimeError::new(
                Operation::CreateContainer,
                RuntimeCause::Api {
                    status: 409,
                    message: format!("name {} already in use", spec.name),
                },
            ));
        }
        let id = next_id(&mut state);
        state.containers.push(FakeContainer {
            id: id.clone(),
            name: spec.name.clone(),
            image: spec.image.clone(),
            running: false,
        });
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> RuntimeResult<()> {
        let mut state = self.state.lock().unwrap();
        let FakeState {
            containers,
            fail_start,
            ..
        } = &mut *state;
        let container = containers
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| api_failure(Operation::StartContainer, "no such container"))?;
        if fail_start.contains(&container.name) {
            return Err(api_failure(Operation::StartContainer, "port already allocated"));
        }
        container.running = true;
        Ok(())
    }

    async fn stop_container(&self, id: &str) -> RuntimeResult<()> {
        let mut state = self.state.lock().unwrap();
        let container = state
            .containers
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| api_failure(Operation::StopContainer, "no such container"))?;
        container.running = false;
        Ok(())
    }

    async fn restart_container(&self, id: &str) -> RuntimeResult<()> {
        self.stop_container(id).await?;
        self.start_container(id).await
    }

    async fn remove_container(&self, id: &str) -> RuntimeResult<()> {
        let mut state = self.state.lock().unwrap();
        let blocked = state
            .containers
            .iter()
            .any(|c| c.id == id && state.fail_remove.contains(&c.name));
        if blocked {
            return Err(api_failure(Operation::RemoveContainer, "removal already in progress"));
        }
        let before = state.containers.len();
        state.containers.retain(|c| c.id != id);
        if state.containers.len() == before {
            return Err(api_failure(Operation::RemoveContainer, "no such container"));
        }
        Ok(())
    }

    async fn run_to_completion(&self, spec: &ContainerSpec) -> RuntimeResult<i64> {
        let mut state = self.state.lock().unwrap();
        state.init_runs.push(spec.name.clone());
        Ok(state.init_exit.get(&spec.name).copied().unwrap_or(0))
    }

    async fn is_running(&self, id: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .containers
            .iter()
            .any(|c| c.id == id && c.running)
    }

    async fn stats(&self, id: &str) -> RuntimeResult<ContainerStats> {
        let name = self
            .name_of(id)
            .ok_or_else(|| api_failure(Operation::Stats, "no such container"))?;
        let state = self.state.lock().unwrap();
        if state.fail_stats.contains(&name) {
            return Err(api_failure(Operation::Stats, "cgroup unavailable"));
        }
        Ok(state.stats.get(&name).copied().unwrap_or_default())
    }

    async fn logs(&self, id: &str, tail: usize) -> RuntimeResult<Vec<String>> {
        let name = self
            .name_of(id)
            .ok_or_else(|| api_failure(Operation::Logs, "no such container"))?;
        let lines = self.state.lock().unwrap().logs.get(&name).cloned().unwrap_or_default();
        let skip = lines.len().saturating_sub(tail);
        Ok(lines.into_iter().skip(skip).collect())
    }

    async fn inspect(&self, id: &str) -> RuntimeResult<ContainerRecord> {
        self.state
            .lock()
            .unwrap()
            .containers
            .iter()
            .find(|c| c.id == id)
            .map(record)
            .ok_or_else(|| api_failure(Operation::Inspect, "no such container"))
    }

    async fn list_containers(&self, prefix: &str) -> RuntimeResult<Vec<ContainerRecord>> {
        let state = self.state.lock().unwrap();
        if state.fail_list {
            return Err(api_failure(Operation::ListContainers, "daemon unavailable"));
        }
        Ok(state
            .containers
            .iter()
            .filter(|c| c.name.starts_with(prefix))
            .map(record)
            .collect())
    }

    async fn version(&self) -> RuntimeResult<String> {
        Ok("24.0.7-fake".to_string())
    }
}

/// Chain state served by a [`FakeTransport`].
#[derive(Debug, Clone)]
pub struct FakeChain {
    pub chain_id: u64,
    pub block: u64,
    pub peers: u32,
    pub pending: Option<u64>,
    pub balance: u128,
    /// Methods answered with a JSON-RPC error.
    pub failing: Vec<&'static str>,
}

impl Default for FakeChain {
    fn default() -> Self {
        Self {
            chain_id: 1337,
            block: 42,
            peers: 2,
            pending: Some(1),
            balance: 2_000_000_000_000_000_000,
            failing: Vec::new(),
        }
    }
}

pub struct FakeTransport {
    endpoint: Endpoint,
    chain: Option<FakeChain>,
    calls: Arc<AtomicUsize>,
}

fn hex(value: impl std::fmt::LowerHex) -> Value {
    json!(format!("0x{:x}", value))
}

#[async_trait]
impl RpcTransport for FakeTransport {
    async fn call(&self, method: &str, _params: Value) -> Result<Value, ConnectionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let refused = |message: &str| ConnectionError::Rpc {
            endpoint: self.endpoint.to_string(),
            method: method.to_string(),
            code: -32603,
            message: message.to_string(),
        };

        let chain = self.chain.as_ref().ok_or_else(|| refused("connection refused"))?;
        if chain.failing.iter().any(|m| *m == method) {
            return Err(refused("method failed"));
        }
        Ok(match method {
            "eth_chainId" => hex(chain.chain_id),
            "eth_blockNumber" => hex(chain.block),
            "net_peerCount" => hex(chain.peers),
            "eth_getBlockTransactionCountByNumber" => chain.pending.map(hex).unwrap_or(Value::Null),
            "eth_getBalance" => hex(chain.balance),
            _ => Value::Null,
        })
    }

    async fn close(&self) {}
}

/// Dialer serving [`FakeChain`]s by port. Unknown ports refuse the probe.
#[derive(Default)]
pub struct FakeDialer {
    chains: Mutex<HashMap<u16, FakeChain>>,
    calls: Arc<AtomicUsize>,
    dials: AtomicUsize,
}

impl FakeDialer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve(&self, rpc_port: u16, chain: FakeChain) {
        self.chains.lock().unwrap().insert(rpc_port, chain);
    }

    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Dialer for FakeDialer {
    async fn dial(&self, endpoint: &Endpoint) -> Result<Arc<dyn RpcTransport>, ConnectionError> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        let port = endpoint
            .as_str()
            .rsplit(':')
            .next()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(0);
        let chain = self.chains.lock().unwrap().get(&port).cloned();
        Ok(Arc::new(FakeTransport {
            endpoint: endpoint.clone(),
            chain,
            calls: Arc::clone(&self.calls),
        }))
    }
}

/// Declared node with volumes below `base`.
pub fn node(base: &Path, name: &str, role: NodeRole, client: ClientKind, offset: u16) -> Node {
    let dir = base.join("nodes").join(name);
    let genesis = match client {
        ClientKind::Geth => Some(base.join("genesis.json")),
        ClientKind::Nethermind => None,
    };
    Node::new(
        name,
        role,
        client,
        30303 + offset,
        8545 + offset,
        match role {
            NodeRole::Validator => Some(format!("0x{:040x}", offset + 1)),
            NodeRole::Peer => None,
        },
        NodeVolumes {
            data_dir: dir.join("data"),
            keystore_dir: dir.join("keystore"),
        },
        genesis,
    )
}

/// The five-node fleet: alice, bob and driss on Geth, cassandra and elena on Nethermind.
pub fn five_node_network(base: &Path) -> Network {
    let mut network = Network::new(NETWORK, 1337, PREFIX);
    let nodes = [
        ("alice", NodeRole::Validator, ClientKind::Geth),
        ("bob", NodeRole::Validator, ClientKind::Geth),
        ("cassandra", NodeRole::Validator, ClientKind::Nethermind),
        ("driss", NodeRole::Peer, ClientKind::Geth),
        ("elena", NodeRole::Peer, ClientKind::Nethermind),
    ];
    for (offset, (name, role, client)) in nodes.into_iter().enumerate() {
        network
            .add_node(node(base, name, role, client, offset as u16))
            .unwrap();
    }
    network
}

/// Nethermind-only fleet of `count` peers, which need no genesis init.
pub fn peer_network(base: &Path, count: usize) -> Network {
    let mut network = Network::new(NETWORK, 1337, PREFIX);
    for i in 0..count {
        let name = format!("peer{}", i);
        network
            .add_node(node(base, &name, NodeRole::Peer, ClientKind::Nethermind, i as u16))
            .unwrap();
    }
    network
}

pub fn write_genesis(base: &Path) {
    std::fs::create_dir_all(base).unwrap();
    std::fs::write(base.join("genesis.json"), r#"{"config":{"chainId":1337}}"#).unwrap();
}

type Handler = Arc<dyn Fn(&str, &str) -> (u16, Vec<u8>) + Send + Sync>;

/// Minimal HTTP server standing in for the Docker daemon. The handler gets
/// the method and request target and returns status and body.
pub struct FakeDaemon {
    pub url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl FakeDaemon {
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&str, &str) -> (u16, Vec<u8>) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handler: Handler = Arc::new(handler);

        let log = Arc::clone(&requests);
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let handler = Arc::clone(&handler);
                let log = Arc::clone(&log);
                tokio::spawn(async move {
                    let Some((method, target)) = read_request(&mut socket).await else {
                        return;
                    };
                    log.lock().unwrap().push(format!("{} {}", method, target));
                    let (status, body) = handler(&method, &target);
                    let head = format!(
                        "HTTP/1.1 {} OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        status,
                        body.len()
                    );
                    let _ = socket.write_all(head.as_bytes()).await;
                    let _ = socket.write_all(&body).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        Self { url, requests }
    }

    /// `"METHOD /path?query"` of every request received so far.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> Option<(String, String)> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buffer.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buffer[..header_end]).into_owned();
    let content_length = head
        .lines()
        .find_map(|l| {
            let (name, value) = l.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);
    while buffer.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
    }

    let mut parts = head.lines().next()?.split_whitespace();
    Some((parts.next()?.to_string(), parts.next()?.to_string()))
}

pub fn json_body(value: Value) -> Vec<u8> {
    value.to_string().into_bytes()
}
