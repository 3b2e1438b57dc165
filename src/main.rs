mod cli;

use anyhow::{Context, Result, bail};
use chainfleet::monitoring::tracing_setup::TracingConfig;
use chainfleet::rpc::HttpDialer;
use chainfleet::{
    ContainerRuntime, FleetControl, FleetError, FleetFile, Launcher, Monitor, RpcClientPool, Settings, Snapshot, runtime,
};
use clap::Parser;
use cli::console::{ConsoleProgress, ConsoleRenderer, network_status_label};
use cli::{Cli, Commands};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let tracing = TracingConfig {
        json: cli.json_logs,
        log_file: cli.log_file.clone(),
        ..TracingConfig::verbose(cli.verbose)
    };
    let _log_guard = tracing.init()?;

    let mut settings = match &cli.base_dir {
        Some(base_dir) => Settings::with_base_dir(base_dir.clone()),
        None => Settings::load()?,
    };
    if let Some(config) = &cli.config {
        settings.fleetfile_path = config.clone();
    }
    settings.runtime.backend = cli.backend;
    if let Some(host) = &cli.docker_host {
        settings.runtime.docker_host = host.clone();
    }
    if let Some(host) = &cli.rpc_host {
        settings.rpc_host = host.clone();
    }
    settings.verbose = cli.verbose;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
            on_signal.cancel();
        }
    });

    match cli.command {
        Commands::Init { force } => {
            let written = if force {
                if let Some(parent) = settings.fleetfile_path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                FleetFile::example().save(&settings.fleetfile_path)?;
                true
            } else {
                settings.init_fleetfile()?
            };

            if written {
                println!("📝 Wrote {}", settings.fleetfile_path.display());
            } else {
                println!(
                    "Fleetfile already exists at {} (use --force to overwrite)",
                    settings.fleetfile_path.display()
                );
            }
        }

        Commands::Check => {
            let fleetfile = load_fleetfile(&settings)?;
            let network = fleetfile.to_network(&settings.base_dir);
            println!(
                "✅ Fleetfile {} is valid: {} nodes on {} (chain id {})",
                settings.fleetfile_path.display(),
                network.nodes().len(),
                network.name,
                network.chain_id
            );
            for node in network.nodes() {
                let genesis = match &node.genesis {
                    Some(path) if path.exists() => format!("genesis {}", path.display()),
                    Some(path) => format!("genesis {} (missing)", path.display()),
                    None => "no genesis".to_string(),
                };
                println!(
                    "  • {:<12} {:<10} {:<9} p2p {:<6} rpc {:<6} {}",
                    node.name,
                    node.client.to_string(),
                    format!("{:?}", node.role).to_lowercase(),
                    node.p2p_port,
                    node.rpc_port,
                    genesis
                );
            }

            let runtime = runtime::connect(&settings.runtime)?;
            let version = runtime
                .version()
                .await
                .context("container runtime is not reachable")?;
            println!("🐳 Container runtime {} ({:?} backend)", version, settings.runtime.backend);
        }

        Commands::Launch { stagger, strict } => {
            let fleetfile = load_fleetfile(&settings)?;
            let mut network = fleetfile.to_network(&settings.base_dir);
            let runtime = runtime::connect(&settings.runtime)?;

            let progress = ConsoleProgress {
                total: network.nodes().len(),
            };
            settings.launch_stagger = Duration::from_secs(stagger);
            let launcher = Launcher::new(runtime).with_stagger(settings.launch_stagger);
            let report = launcher.launch(&mut network, &progress, &cancel).await?;

            println!("Network {} is {}", network.name, network_status_label(network.status));
            for (node, error) in report.failures() {
                warn!(node, error = %error, "Node did not launch");
            }
            if strict {
                report.check()?;
            }
            println!("💡 Use 'chainfleet infos' to monitor the network");
        }

        Commands::Infos { watch, interval } => {
            let fleetfile = load_fleetfile(&settings)?;
            let network = Arc::new(fleetfile.to_network(&settings.base_dir));
            let runtime = runtime::connect(&settings.runtime)?;
            let dialer = HttpDialer::new(settings.rpc_timeout).context("building RPC client")?;
            let pool = Arc::new(RpcClientPool::new(Arc::new(dialer)));

            let monitor = Monitor::new(runtime, pool.clone(), network).with_rpc_host(settings.rpc_host.clone());
            let renderer = ConsoleRenderer { clear: watch };

            if watch {
                settings.monitor_interval = Duration::from_secs(interval.max(1));
                match monitor.watch(settings.monitor_interval, &renderer, &cancel).await {
                    Ok(()) | Err(FleetError::Cancelled) => {}
                    Err(e) => return Err(e.into()),
                }
            } else if let Snapshot::NoContainers { .. } = monitor.run_once(&renderer, &cancel).await? {
                pool.disconnect_all().await;
                bail!("no fleet containers found");
            }
            pool.disconnect_all().await;
        }

        Commands::Logs { node, tail } => {
            let fleetfile = load_fleetfile(&settings)?;
            let network = fleetfile.to_network(&settings.base_dir);
            let control = FleetControl::new(runtime::connect(&settings.runtime)?);

            for line in control.logs(&network, &node, tail).await? {
                println!("{}", line);
            }
        }

        Commands::Outage { node, downtime } => {
            let fleetfile = load_fleetfile(&settings)?;
            let network = fleetfile.to_network(&settings.base_dir);
            let control = FleetControl::new(runtime::connect(&settings.runtime)?);

            let downtime = Duration::from_secs(downtime);
            println!("🔌 Taking {} offline for {}s", node, downtime.as_secs());
            control.outage(&network, &node, downtime, &cancel).await?;
            println!("✅ {} is back online", node);
        }

        Commands::Down => {
            let fleetfile = load_fleetfile(&settings)?;
            let network = fleetfile.to_network(&settings.base_dir);
            let control = FleetControl::new(runtime::connect(&settings.runtime)?);

            let report = control.down(&network).await?;
            println!(
                "🛑 Removed {} containers ({} failed), network {}",
                report.removed,
                report.failed,
                if report.network_removed { "removed" } else { "kept" }
            );
            if report.failed > 0 {
                bail!("{} containers could not be removed", report.failed);
            }
        }
    }

    Ok(())
}

fn load_fleetfile(settings: &Settings) -> Result<FleetFile> {
    settings
        .load_fleetfile()
        .with_context(|| format!("loading {}", settings.fleetfile_path.display()))
}
