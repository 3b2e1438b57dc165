use std::fmt;
use thiserror::Error;

/// Chainfleet error types
#[derive(Error, Debug)]
pub enum FleetError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Container runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("RPC connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    NotConnected(#[from] NotConnectedError),

    #[error("Launch error: {0}")]
    Launch(#[from] LaunchError),

    #[error("Node not found: {name}")]
    NodeNotFound { name: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML deserialization error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Generic error: {0}")]
    Other(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Fleetfile not found at path: {path}")]
    FleetfileNotFound { path: String },

    #[error("Invalid Fleetfile format: {reason}")]
    InvalidFormat { reason: String },

    #[error("Validation failed: {reason}")]
    Validation { reason: String },
}

/// Container runtime capability that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreateNetwork,
    RemoveNetwork,
    ConnectToNetwork,
    CreateContainer,
    StartContainer,
    StopContainer,
    RestartContainer,
    RemoveContainer,
    WaitContainer,
    Stats,
    Logs,
    Inspect,
    ListContainers,
    Version,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::CreateNetwork => "create network",
            Operation::RemoveNetwork => "remove network",
            Operation::ConnectToNetwork => "connect to network",
            Operation::CreateContainer => "create container",
            Operation::StartContainer => "start container",
            Operation::StopContainer => "stop container",
            Operation::RestartContainer => "restart container",
            Operation::RemoveContainer => "remove container",
            Operation::WaitContainer => "wait container",
            Operation::Stats => "stats",
            Operation::Logs => "logs",
            Operation::Inspect => "inspect",
            Operation::ListContainers => "list containers",
            Operation::Version => "version",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
#[error("{operation} failed: {cause}")]
pub struct RuntimeError {
    pub operation: Operation,
    #[source]
    pub cause: RuntimeCause,
}

impl RuntimeError {
    pub fn new(operation: Operation, cause: impl Into<RuntimeCause>) -> Self {
        Self {
            operation,
            cause: cause.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum RuntimeCause {
    #[error("HTTP transport: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("daemon returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("docker exited with {code:?}: {stderr}")]
    Command { code: Option<i32>, stderr: String },

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("unexpected output: {0}")]
    Parse(String),
}

#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("transport to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} answered {method} with error {code}: {message}")]
    Rpc {
        endpoint: String,
        method: String,
        code: i64,
        message: String,
    },

    #[error("{endpoint} returned a malformed {method} response: {reason}")]
    Malformed {
        endpoint: String,
        method: String,
        reason: String,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("no RPC connection to {endpoint}")]
pub struct NotConnectedError {
    pub endpoint: String,
}

/// Failure of an RPC read.
#[derive(Error, Debug)]
pub enum RpcError {
    #[error(transparent)]
    NotConnected(#[from] NotConnectedError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

impl From<RpcError> for FleetError {
    fn from(error: RpcError) -> Self {
        match error {
            RpcError::NotConnected(e) => FleetError::NotConnected(e),
            RpcError::Connection(e) => FleetError::Connection(e),
        }
    }
}

/// Error raised by the launch sequencer for a single node.
#[derive(Error, Debug)]
pub enum NodeLaunchError {
    #[error("preparing volumes for {node}: {source}")]
    Prepare {
        node: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{node} requires a genesis artifact but none is available")]
    MissingGenesis { node: String },

    #[error("genesis initialization of {node} exited with code {code}")]
    InitExit { node: String, code: i64 },

    #[error("{node}: {source}")]
    Runtime {
        node: String,
        #[source]
        source: RuntimeError,
    },
}

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("only {succeeded}/{total} nodes launched")]
    Partial { succeeded: usize, total: usize },

    #[error("no node of {total} launched")]
    Total {
        total: usize,
        #[source]
        source: Option<Box<NodeLaunchError>>,
    },
}

/// Convenience type alias for chainfleet results
pub type Result<T, E = FleetError> = std::result::Result<T, E>;
