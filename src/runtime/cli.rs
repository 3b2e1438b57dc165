use super::models::{CliPsLine, CliStatsLine, InspectResponse};
use super::stats::{ContainerStats, parse_pair, parse_percent};
use super::{ContainerRuntime, ContainerSpec, RuntimeResult, STOP_GRACE, clean_lines, parse_error};
use crate::error::{Operation, RuntimeCause, RuntimeError};
use crate::types::ContainerRecord;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

/// Backend driving the `docker` binary.
pub struct DockerCli {
    binary: String,
    timeout: Duration,
}

struct Output {
    stdout: String,
    stderr: String,
}

impl DockerCli {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    async fn run(&self, operation: Operation, args: &[String]) -> RuntimeResult<Output> {
        self.run_with_timeout(operation, args, self.timeout).await
    }

    async fn run_with_timeout(
        &self,
        operation: Operation,
        args: &[String],
        timeout: Duration,
    ) -> RuntimeResult<Output> {
        debug!(%operation, "{} {}", self.binary, args.join(" "));

        let child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(timeout, child)
            .await
            .map_err(|_| RuntimeError::new(operation, RuntimeCause::Timeout(timeout)))?
            .map_err(|e| RuntimeError::new(operation, e))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() {
            return Err(RuntimeError::new(
                operation,
                RuntimeCause::Command {
                    code: output.status.code(),
                    stderr: stderr.trim().to_string(),
                },
            ));
        }

        Ok(Output { stdout, stderr })
    }

    async fn network_exists(&self, name: &str) -> RuntimeResult<bool> {
        let output = self
            .run(
                Operation::CreateNetwork,
                &args(["network", "ls", "--quiet", "--filter", &format!("name=^{}$", name)]),
            )
            .await?;
        Ok(!output.stdout.trim().is_empty())
    }
}

fn args<const N: usize>(parts: [&str; N]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// Arguments for `docker create`.
pub fn create_args(spec: &ContainerSpec) -> Vec<String> {
    let mut out = args(["create", "--name", &spec.name]);

    for port in &spec.ports {
        out.push("-p".to_string());
        out.push(format!("{}:{}/{}", port.host, port.container, port.protocol));
    }
    for volume in &spec.volumes {
        out.push("-v".to_string());
        out.push(volume.to_bind());
    }
    for (key, value) in &spec.env {
        out.push("-e".to_string());
        out.push(format!("{}={}", key, value));
    }
    for (key, value) in &spec.labels {
        out.push("--label".to_string());
        out.push(format!("{}={}", key, value));
    }
    if let Some(network) = &spec.network {
        out.push("--network".to_string());
        out.push(network.clone());
    }
    // docker takes a single entrypoint binary; remaining parts go before the command.
    let mut command = spec.command.clone();
    if let Some(entrypoint) = &spec.entrypoint {
        if let Some((binary, rest)) = entrypoint.split_first() {
            out.push("--entrypoint".to_string());
            out.push(binary.clone());
            command = rest.iter().cloned().chain(command).collect();
        }
    }

    out.push(spec.image.clone());
    out.extend(command);
    out
}

/// Interleaves `docker logs --timestamps` stdout and stderr back into write
/// order and strips the timestamps. Lines without one sort first.
pub(crate) fn merge_streams(stdout: &str, stderr: &str) -> Vec<String> {
    let mut entries: Vec<(Option<DateTime<FixedOffset>>, String)> = clean_lines(stdout)
        .into_iter()
        .chain(clean_lines(stderr))
        .map(|line| split_timestamp(&line))
        .filter(|(_, message)| !message.trim().is_empty())
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries.into_iter().map(|(_, message)| message).collect()
}

fn split_timestamp(line: &str) -> (Option<DateTime<FixedOffset>>, String) {
    let (stamp, message) = line.split_once(' ').unwrap_or((line, ""));
    match DateTime::parse_from_rfc3339(stamp) {
        Ok(at) => (Some(at), message.to_string()),
        Err(_) => (None, line.to_string()),
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn create_network(&self, name: &str) -> RuntimeResult<()> {
        if self.network_exists(name).await? {
            debug!(network = %name, "Network already exists");
            return Ok(());
        }

        match self.run(Operation::CreateNetwork, &args(["network", "create", name])).await {
            Ok(_) => {
                info!(network = %name, "Created network");
                Ok(())
            }
            Err(RuntimeError {
                cause: RuntimeCause::Command { ref stderr, .. },
                ..
            }) if stderr.contains("already exists") => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn remove_network(&self, name: &str) -> RuntimeResult<()> {
        self.run(Operation::RemoveNetwork, &args(["network", "rm", name])).await?;
        Ok(())
    }

    async fn connect_to_network(&self, id: &str, network: &str) -> RuntimeResult<()> {
        self.run(Operation::ConnectToNetwork, &args(["network", "connect", network, id]))
            .await?;
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> RuntimeResult<String> {
        let output = self.run(Operation::CreateContainer, &create_args(spec)).await?;
        let id = output.stdout.trim().to_string();
        if id.is_empty() {
            return Err(parse_error(Operation::CreateContainer, "docker create printed no id"));
        }
        debug!(name = %spec.name, container_id = %id, "Created container");
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> RuntimeResult<()> {
        self.run(Operation::StartContainer, &args(["start", id])).await?;
        Ok(())
    }

    async fn stop_container(&self, id: &str) -> RuntimeResult<()> {
        let grace = STOP_GRACE.as_secs().to_string();
        self.run_with_timeout(
            Operation::StopContainer,
            &args(["stop", "--time", &grace, id]),
            STOP_GRACE + self.timeout,
        )
        .await?;
        Ok(())
    }

    async fn restart_container(&self, id: &str) -> RuntimeResult<()> {
        let grace = STOP_GRACE.as_secs().to_string();
        self.run_with_timeout(
            Operation::RestartContainer,
            &args(["restart", "--time", &grace, id]),
            STOP_GRACE + self.timeout,
        )
        .await?;
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> RuntimeResult<()> {
        self.run(Operation::RemoveContainer, &args(["rm", "--force", id])).await?;
        Ok(())
    }

    async fn run_to_completion(&self, spec: &ContainerSpec) -> RuntimeResult<i64> {
        let id = self.create_container(spec).await?;
        let result = async {
            self.start_container(&id).await?;
            // Initialization can take longer than a regular command.
            let output = self
                .run_with_timeout(Operation::WaitContainer, &args(["wait", &id]), self.timeout * 10)
                .await?;
            output
                .stdout
                .trim()
                .parse::<i64>()
                .map_err(|_| parse_error(Operation::WaitContainer, output.stdout.trim().to_string()))
        }
        .await;

        if let Err(e) = self.remove_container(&id).await {
            debug!(container_id = %id, error = %e, "Could not remove one-shot container");
        }
        result
    }

    async fn is_running(&self, id: &str) -> bool {
        match self
            .run(Operation::Inspect, &args(["inspect", "--format", "{{.State.Running}}", id]))
            .await
        {
            Ok(output) => output.stdout.trim() == "true",
            Err(_) => false,
        }
    }

    async fn stats(&self, id: &str) -> RuntimeResult<ContainerStats> {
        let output = self
            .run(
                Operation::Stats,
                &args(["stats", "--no-stream", "--format", "{{json .}}", id]),
            )
            .await?;
        let line: CliStatsLine = serde_json::from_str(output.stdout.trim())
            .map_err(|e| RuntimeError::new(Operation::Stats, e))?;

        // The CLI samples twice itself and prints the ready-made percentage.
        let cpu_percent = parse_percent(&line.cpu_perc).unwrap_or(0.0);
        let (memory_used, memory_limit) = parse_pair(&line.mem_usage)
            .ok_or_else(|| parse_error(Operation::Stats, format!("MemUsage `{}`", line.mem_usage)))?;
        let (net_rx, net_tx) = parse_pair(&line.net_io).unwrap_or((0, 0));

        Ok(ContainerStats {
            cpu_percent,
            memory_used,
            memory_limit,
            net_rx,
            net_tx,
        })
    }

    async fn logs(&self, id: &str, tail: usize) -> RuntimeResult<Vec<String>> {
        let tail = tail.to_string();
        let output = self
            .run(Operation::Logs, &args(["logs", "--timestamps", "--tail", &tail, id]))
            .await?;
        Ok(merge_streams(&output.stdout, &output.stderr))
    }

    async fn inspect(&self, id: &str) -> RuntimeResult<ContainerRecord> {
        let output = self
            .run(Operation::Inspect, &args(["inspect", "--type", "container", "--format", "{{json .}}", id]))
            .await?;
        let inspect: InspectResponse = serde_json::from_str(output.stdout.trim())
            .map_err(|e| RuntimeError::new(Operation::Inspect, e))?;
        Ok(inspect.into())
    }

    async fn list_containers(&self, prefix: &str) -> RuntimeResult<Vec<ContainerRecord>> {
        let filter = format!("name={}", prefix);
        let output = self
            .run(
                Operation::ListContainers,
                &args(["ps", "--all", "--no-trunc", "--filter", &filter, "--format", "{{json .}}"]),
            )
            .await?;

        let mut records = Vec::new();
        for line in output.stdout.lines().filter(|l| !l.trim().is_empty()) {
            let entry: CliPsLine =
                serde_json::from_str(line).map_err(|e| RuntimeError::new(Operation::ListContainers, e))?;
            let record = ContainerRecord::from(entry);
            if record.name.starts_with(prefix) {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn version(&self) -> RuntimeResult<String> {
        let output = self
            .run(Operation::Version, &args(["version", "--format", "{{.Server.Version}}"]))
            .await?;
        Ok(output.stdout.trim().to_string())
    }
}
