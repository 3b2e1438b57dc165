//! Wire models for Docker's JSON output. `docker inspect` and `docker ps`
//! in `--format '{{json .}}'` mode emit the same documents the Engine API
//! returns, so both backends decode through these types.

use super::stats::CpuSample;
use crate::types::ContainerRecord;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InspectResponse {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub state: InspectState,
    pub config: InspectConfig,
    #[serde(default)]
    pub network_settings: InspectNetworkSettings,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InspectState {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub running: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InspectConfig {
    #[serde(default)]
    pub image: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InspectNetworkSettings {
    #[serde(default)]
    pub ports: Option<BTreeMap<String, Option<Vec<HostPort>>>>,
    #[serde(default)]
    pub networks: Option<BTreeMap<String, serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostPort {
    #[serde(default)]
    pub host_ip: String,
    #[serde(default)]
    pub host_port: String,
}

impl From<InspectResponse> for ContainerRecord {
    fn from(inspect: InspectResponse) -> Self {
        let mut ports = Vec::new();
        for (container_port, bindings) in inspect.network_settings.ports.unwrap_or_default() {
            match bindings {
                Some(bindings) if !bindings.is_empty() => {
                    for binding in bindings {
                        ports.push(format!("{}:{}->{}", binding.host_ip, binding.host_port, container_port));
                    }
                }
                _ => ports.push(container_port),
            }
        }

        ContainerRecord {
            id: inspect.id,
            name: inspect.name.trim_start_matches('/').to_string(),
            image: inspect.config.image,
            status: inspect.state.status,
            ports,
            networks: inspect.network_settings.networks.unwrap_or_default().into_keys().collect(),
        }
    }
}

/// One entry of `GET /containers/json`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ApiListEntry {
    pub id: String,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub ports: Vec<ApiPort>,
    #[serde(default)]
    pub network_settings: Option<ApiListNetworks>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ApiPort {
    #[serde(rename = "IP", default)]
    pub ip: Option<String>,
    pub private_port: u16,
    #[serde(default)]
    pub public_port: Option<u16>,
    #[serde(rename = "Type", default)]
    pub kind: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ApiListNetworks {
    #[serde(default)]
    pub networks: BTreeMap<String, serde_json::Value>,
}

impl From<ApiListEntry> for ContainerRecord {
    fn from(entry: ApiListEntry) -> Self {
        let ports = entry
            .ports
            .iter()
            .map(|p| match p.public_port {
                Some(public) => format!(
                    "{}:{}->{}/{}",
                    p.ip.as_deref().unwrap_or("0.0.0.0"),
                    public,
                    p.private_port,
                    p.kind
                ),
                None => format!("{}/{}", p.private_port, p.kind),
            })
            .collect();

        ContainerRecord {
            id: entry.id,
            name: entry
                .names
                .first()
                .map(|n| n.trim_start_matches('/').to_string())
                .unwrap_or_default(),
            image: entry.image,
            status: entry.status,
            ports,
            networks: entry
                .network_settings
                .map(|n| n.networks.into_keys().collect())
                .unwrap_or_default(),
        }
    }
}

/// One line of `docker ps --format '{{json .}}'`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CliPsLine {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(default)]
    pub names: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub ports: String,
    #[serde(default)]
    pub networks: String,
}

fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

impl From<CliPsLine> for ContainerRecord {
    fn from(line: CliPsLine) -> Self {
        ContainerRecord {
            id: line.id,
            name: split_list(&line.names).into_iter().next().unwrap_or_default(),
            image: line.image,
            status: line.status,
            ports: split_list(&line.ports),
            networks: split_list(&line.networks),
        }
    }
}

/// One line of `docker stats --no-stream --format '{{json .}}'`.
#[derive(Debug, Deserialize)]
pub struct CliStatsLine {
    #[serde(rename = "CPUPerc", default)]
    pub cpu_perc: String,
    #[serde(rename = "MemUsage", default)]
    pub mem_usage: String,
    #[serde(rename = "NetIO", default)]
    pub net_io: String,
}

/// `GET /containers/{id}/stats?stream=false`
#[derive(Debug, Deserialize)]
pub struct ApiStats {
    pub cpu_stats: ApiCpuStats,
    #[serde(default)]
    pub precpu_stats: Option<ApiCpuStats>,
    #[serde(default)]
    pub memory_stats: ApiMemoryStats,
    #[serde(default)]
    pub networks: Option<HashMap<String, ApiNetworkStats>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiCpuStats {
    #[serde(default)]
    pub cpu_usage: ApiCpuUsage,
    #[serde(default)]
    pub system_cpu_usage: Option<u64>,
    #[serde(default)]
    pub online_cpus: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiCpuUsage {
    #[serde(default)]
    pub total_usage: u64,
    #[serde(default)]
    pub percpu_usage: Option<Vec<u64>>,
}

impl ApiCpuStats {
    /// `None` when the daemon has not collected a system reading yet, which
    /// is how the first `precpu_stats` of a container arrives.
    pub fn sample(&self) -> Option<CpuSample> {
        let system_usage = self.system_cpu_usage.filter(|&s| s > 0)?;
        let online_cpus = self
            .online_cpus
            .filter(|&n| n > 0)
            .or_else(|| self.cpu_usage.percpu_usage.as_ref().map(|p| p.len() as u32))
            .unwrap_or(1);
        Some(CpuSample {
            total_usage: self.cpu_usage.total_usage,
            system_usage,
            online_cpus,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiMemoryStats {
    #[serde(default)]
    pub usage: u64,
    #[serde(default)]
    pub limit: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiNetworkStats {
    #[serde(default)]
    pub rx_bytes: u64,
    #[serde(default)]
    pub tx_bytes: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IdResponse {
    pub id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WaitResponse {
    pub status_code: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VersionResponse {
    pub version: String,
}

#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
}
