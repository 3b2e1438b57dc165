use super::models::{
    ApiListEntry, ApiStats, ErrorResponse, IdResponse, InspectResponse, VersionResponse, WaitResponse,
};
use super::stats::{ContainerStats, CpuSample, cpu_percent};
use super::{ContainerRuntime, ContainerSpec, RuntimeResult, STOP_GRACE, clean_lines, parse_error};
use crate::error::{Operation, RuntimeCause, RuntimeError};
use crate::types::ContainerRecord;
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

const API_VERSION: &str = "v1.43";

/// Docker Engine REST API backend.
pub struct DockerApi {
    client: Client,
    base_url: String,
    /// Last CPU counters seen per container, for daemons that do not
    /// return `precpu_stats`.
    cpu_samples: RwLock<HashMap<String, CpuSample>>,
}

impl DockerApi {
    pub fn new(docker_host: &str, timeout: Duration) -> RuntimeResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RuntimeError::new(Operation::Version, e))?;

        let host = docker_host.trim_end_matches('/');
        let host = match host.strip_prefix("tcp://") {
            Some(rest) => format!("http://{}", rest),
            None => host.to_string(),
        };

        Ok(Self {
            client,
            base_url: format!("{}/{}", host, API_VERSION),
            cpu_samples: RwLock::new(HashMap::new()),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, format!("{}{}", self.base_url, path))
    }

    async fn send(&self, operation: Operation, request: RequestBuilder) -> RuntimeResult<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| RuntimeError::new(operation, e))?;

        if response.status().is_success() {
            return Ok(response);
        }
        Err(api_error(operation, response).await)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        operation: Operation,
        request: RequestBuilder,
    ) -> RuntimeResult<T> {
        let response = self.send(operation, request).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| RuntimeError::new(operation, e))
    }

    async fn network_exists(&self, name: &str) -> RuntimeResult<bool> {
        let response = self
            .request(Method::GET, &format!("/networks/{}", name))
            .send()
            .await
            .map_err(|e| RuntimeError::new(Operation::CreateNetwork, e))?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(api_error(Operation::CreateNetwork, response).await),
        }
    }

    async fn wait_container(&self, id: &str) -> RuntimeResult<i64> {
        let wait: WaitResponse = self
            .send_json(
                Operation::WaitContainer,
                self.request(Method::POST, &format!("/containers/{}/wait", id))
                    // Init runs can outlast the per-request timeout.
                    .timeout(Duration::from_secs(600)),
            )
            .await?;
        Ok(wait.status_code)
    }
}

async fn api_error(operation: Operation, response: Response) -> RuntimeError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|e| e.message)
        .unwrap_or(body);
    RuntimeError::new(operation, RuntimeCause::Api { status, message })
}

/// Request body for `POST /containers/create`.
pub fn create_body(spec: &ContainerSpec) -> Value {
    let mut exposed = serde_json::Map::new();
    let mut bindings = serde_json::Map::new();
    for port in &spec.ports {
        let key = format!("{}/{}", port.container, port.protocol);
        exposed.insert(key.clone(), json!({}));
        bindings.insert(key, json!([{ "HostPort": port.host.to_string() }]));
    }

    let env: Vec<String> = spec.env.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    let labels: serde_json::Map<String, Value> = spec
        .labels
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    let binds: Vec<String> = spec.volumes.iter().map(|v| v.to_bind()).collect();

    let mut body = json!({
        "Image": spec.image,
        "Cmd": spec.command,
        "Env": env,
        "Labels": labels,
        "ExposedPorts": exposed,
        "HostConfig": {
            "Binds": binds,
            "PortBindings": bindings,
        },
    });
    if let Some(entrypoint) = &spec.entrypoint {
        body["Entrypoint"] = json!(entrypoint);
    }
    if let Some(network) = &spec.network {
        body["HostConfig"]["NetworkMode"] = json!(network);
    }
    body
}

/// Splits a non-TTY log stream into its payload. Each frame is an 8-byte
/// header (stream kind, three zero bytes, big-endian length) followed by
/// the payload; streams without the header are passed through unchanged.
pub fn demux_logs(raw: &[u8]) -> String {
    let framed = raw.len() >= 8 && matches!(raw[0], 0..=2) && raw[1..4] == [0, 0, 0];
    if !framed {
        return String::from_utf8_lossy(raw).into_owned();
    }

    let mut out = Vec::with_capacity(raw.len());
    let mut rest = raw;
    while rest.len() >= 8 {
        let len = u32::from_be_bytes([rest[4], rest[5], rest[6], rest[7]]) as usize;
        let end = (8 + len).min(rest.len());
        out.extend_from_slice(&rest[8..end]);
        rest = &rest[end..];
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[async_trait]
impl ContainerRuntime for DockerApi {
    async fn create_network(&self, name: &str) -> RuntimeResult<()> {
        if self.network_exists(name).await? {
            debug!(network = %name, "Network already exists");
            return Ok(());
        }

        let response = self
            .request(Method::POST, "/networks/create")
            .json(&json!({ "Name": name, "CheckDuplicate": true }))
            .send()
            .await
            .map_err(|e| RuntimeError::new(Operation::CreateNetwork, e))?;

        match response.status() {
            status if status.is_success() => {
                info!(network = %name, "Created network");
                Ok(())
            }
            // Lost a race with another creator.
            StatusCode::CONFLICT => Ok(()),
            _ => Err(api_error(Operation::CreateNetwork, response).await),
        }
    }

    async fn remove_network(&self, name: &str) -> RuntimeResult<()> {
        self.send(
            Operation::RemoveNetwork,
            self.request(Method::DELETE, &format!("/networks/{}", name)),
        )
        .await?;
        Ok(())
    }

    async fn connect_to_network(&self, id: &str, network: &str) -> RuntimeResult<()> {
        self.send(
            Operation::ConnectToNetwork,
            self.request(Method::POST, &format!("/networks/{}/connect", network))
                .json(&json!({ "Container": id })),
        )
        .await?;
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> RuntimeResult<String> {
        let created: IdResponse = self
            .send_json(
                Operation::CreateContainer,
                self.request(Method::POST, "/containers/create")
                    .query(&[("name", spec.name.as_str())])
                    .json(&create_body(spec)),
            )
            .await?;
        debug!(name = %spec.name, container_id = %created.id, "Created container");
        Ok(created.id)
    }

    async fn start_container(&self, id: &str) -> RuntimeResult<()> {
        let response = self
            .request(Method::POST, &format!("/containers/{}/start", id))
            .send()
            .await
            .map_err(|e| RuntimeError::new(Operation::StartContainer, e))?;

        // 304: already started
        if response.status().is_success() || response.status() == StatusCode::NOT_MODIFIED {
            return Ok(());
        }
        Err(api_error(Operation::StartContainer, response).await)
    }

    async fn stop_container(&self, id: &str) -> RuntimeResult<()> {
        let response = self
            .request(Method::POST, &format!("/containers/{}/stop", id))
            .query(&[("t", STOP_GRACE.as_secs())])
            .timeout(STOP_GRACE + Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| RuntimeError::new(Operation::StopContainer, e))?;

        if response.status().is_success() || response.status() == StatusCode::NOT_MODIFIED {
            return Ok(());
        }
        Err(api_error(Operation::StopContainer, response).await)
    }

    async fn restart_container(&self, id: &str) -> RuntimeResult<()> {
        self.send(
            Operation::RestartContainer,
            self.request(Method::POST, &format!("/containers/{}/restart", id))
                .query(&[("t", STOP_GRACE.as_secs())])
                .timeout(STOP_GRACE + Duration::from_secs(10)),
        )
        .await?;
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> RuntimeResult<()> {
        self.send(
            Operation::RemoveContainer,
            self.request(Method::DELETE, &format!("/containers/{}", id))
                .query(&[("force", "true")]),
        )
        .await?;
        self.cpu_samples.write().await.remove(id);
        Ok(())
    }

    async fn run_to_completion(&self, spec: &ContainerSpec) -> RuntimeResult<i64> {
        let id = self.create_container(spec).await?;
        let result = async {
            self.start_container(&id).await?;
            self.wait_container(&id).await
        }
        .await;

        if let Err(e) = self.remove_container(&id).await {
            debug!(container_id = %id, error = %e, "Could not remove one-shot container");
        }
        result
    }

    async fn is_running(&self, id: &str) -> bool {
        match self
            .send_json::<InspectResponse>(
                Operation::Inspect,
                self.request(Method::GET, &format!("/containers/{}/json", id)),
            )
            .await
        {
            Ok(inspect) => inspect.state.running,
            Err(_) => false,
        }
    }

    async fn stats(&self, id: &str) -> RuntimeResult<ContainerStats> {
        let stats: ApiStats = self
            .send_json(
                Operation::Stats,
                self.request(Method::GET, &format!("/containers/{}/stats", id))
                    .query(&[("stream", "false")]),
            )
            .await?;

        let current = stats
            .cpu_stats
            .sample()
            .ok_or_else(|| parse_error(Operation::Stats, "cpu_stats without system usage"))?;

        let cached = self.cpu_samples.write().await.insert(id.to_string(), current);
        let prior = stats.precpu_stats.as_ref().and_then(|p| p.sample()).or(cached);

        let (net_rx, net_tx) = stats
            .networks
            .unwrap_or_default()
            .values()
            .fold((0, 0), |(rx, tx), n| (rx + n.rx_bytes, tx + n.tx_bytes));

        Ok(ContainerStats {
            cpu_percent: cpu_percent(prior, current),
            memory_used: stats.memory_stats.usage,
            memory_limit: stats.memory_stats.limit,
            net_rx,
            net_tx,
        })
    }

    async fn logs(&self, id: &str, tail: usize) -> RuntimeResult<Vec<String>> {
        let response = self
            .send(
                Operation::Logs,
                self.request(Method::GET, &format!("/containers/{}/logs", id)).query(&[
                    ("stdout", "true".to_string()),
                    ("stderr", "true".to_string()),
                    ("tail", tail.to_string()),
                ]),
            )
            .await?;
        let raw = response
            .bytes()
            .await
            .map_err(|e| RuntimeError::new(Operation::Logs, e))?;
        Ok(clean_lines(&demux_logs(&raw)))
    }

    async fn inspect(&self, id: &str) -> RuntimeResult<ContainerRecord> {
        let inspect: InspectResponse = self
            .send_json(
                Operation::Inspect,
                self.request(Method::GET, &format!("/containers/{}/json", id)),
            )
            .await?;
        Ok(inspect.into())
    }

    async fn list_containers(&self, prefix: &str) -> RuntimeResult<Vec<ContainerRecord>> {
        let filters = json!({ "name": [prefix] }).to_string();
        let entries: Vec<ApiListEntry> = self
            .send_json(
                Operation::ListContainers,
                self.request(Method::GET, "/containers/json")
                    .query(&[("all", "true"), ("filters", filters.as_str())]),
            )
            .await?;

        // The daemon's name filter is a substring match.
        Ok(entries
            .into_iter()
            .map(ContainerRecord::from)
            .filter(|record| record.name.starts_with(prefix))
            .collect())
    }

    async fn version(&self) -> RuntimeResult<String> {
        let version: VersionResponse = self
            .send_json(Operation::Version, self.request(Method::GET, "/version"))
            .await?;
        Ok(version.version)
    }
}
