use chainfleet::config::Backend;
use chainfleet::monitoring::DEFAULT_INTERVAL;
use chainfleet::orchestration::DEFAULT_STAGGER;
use chainfleet::orchestration::control::DEFAULT_DOWNTIME;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod console;

#[derive(Parser)]
#[command(name = "chainfleet")]
#[command(about = "Launch and monitor a local fleet of blockchain client containers")]
#[command(version, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Fleetfile path [default: <base-dir>/Fleetfile.toml]
    #[arg(short, long, global = true, env = "CHAINFLEET_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding node volumes [default: ~/.chainfleet]
    #[arg(long, global = true, env = "CHAINFLEET_HOME")]
    pub base_dir: Option<PathBuf>,

    /// Container runtime backend
    #[arg(long, global = true, value_enum, default_value_t = Backend::Cli, env = "CHAINFLEET_BACKEND")]
    pub backend: Backend,

    /// Docker Engine API address, used by the api backend
    #[arg(long, global = true, env = "CHAINFLEET_DOCKER_HOST")]
    pub docker_host: Option<String>,

    /// Host the nodes' RPC ports are published on
    #[arg(long, global = true, env = "CHAINFLEET_RPC_HOST")]
    pub rpc_host: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true, env = "CHAINFLEET_JSON_LOGS")]
    pub json_logs: bool,

    /// Also write logs to this file (rotated daily)
    #[arg(long, global = true, env = "CHAINFLEET_LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write an example Fleetfile
    Init {
        /// Overwrite an existing Fleetfile
        #[arg(short, long)]
        force: bool,
    },

    /// Validate the Fleetfile and check the container runtime
    Check,

    /// Launch every node of the fleet
    Launch {
        /// Seconds to wait between two nodes
        #[arg(long, default_value_t = DEFAULT_STAGGER.as_secs())]
        stagger: u64,

        /// Fail unless every node launched
        #[arg(long)]
        strict: bool,
    },

    /// Show the state of the fleet
    Infos {
        /// Refresh continuously until interrupted
        #[arg(short, long)]
        watch: bool,

        /// Refresh interval in seconds
        #[arg(short, long, default_value_t = DEFAULT_INTERVAL.as_secs())]
        interval: u64,
    },

    /// Show the logs of a node
    Logs {
        /// Node name
        node: String,

        /// Number of lines to show
        #[arg(short = 'n', long, default_value_t = 100)]
        tail: usize,
    },

    /// Stop a node for a while, then start it again
    Outage {
        /// Node name
        node: String,

        /// Seconds the node stays down
        #[arg(short, long, default_value_t = DEFAULT_DOWNTIME.as_secs())]
        downtime: u64,
    },

    /// Stop and remove every container of the fleet and its network
    Down,
}
