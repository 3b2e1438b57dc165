use crate::error::ConnectionError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::trace;

/// Address of a node's JSON-RPC server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint(String);

impl Endpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn http(host: &str, port: u16) -> Self {
        Self(format!("http://{}:{}", host, port))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An open channel to one node over which JSON-RPC calls are made.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// Returns the `result` member of the response.
    async fn call(&self, method: &str, params: Value) -> Result<Value, ConnectionError>;

    /// Release any resources held for the endpoint.
    async fn close(&self);
}

/// Opens transports. Dialing alone does not prove the node is alive.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, endpoint: &Endpoint) -> Result<Arc<dyn RpcTransport>, ConnectionError>;
}

/// JSON-RPC 2.0 over HTTP.
pub struct HttpTransport {
    client: Client,
    endpoint: Endpoint,
    next_id: AtomicU64,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

impl HttpTransport {
    pub fn new(client: Client, endpoint: Endpoint) -> Self {
        Self {
            client,
            endpoint,
            next_id: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn call(&self, method: &str, params: Value) -> Result<Value, ConnectionError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        trace!(endpoint = %self.endpoint, %method, id, "RPC call");

        let transport_error = |source| ConnectionError::Transport {
            endpoint: self.endpoint.to_string(),
            source,
        };

        let response: RpcResponse = self
            .client
            .post(self.endpoint.as_str())
            .json(&json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": method,
                "params": params,
            }))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(transport_error)?
            .json()
            .await
            .map_err(transport_error)?;

        if let Some(error) = response.error {
            return Err(ConnectionError::Rpc {
                endpoint: self.endpoint.to_string(),
                method: method.to_string(),
                code: error.code,
                message: error.message,
            });
        }
        Ok(response.result.unwrap_or(Value::Null))
    }

    async fn close(&self) {}
}

/// Dials [`HttpTransport`]s sharing one connection-pooled client.
pub struct HttpDialer {
    client: Client,
}

impl HttpDialer {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Dialer for HttpDialer {
    async fn dial(&self, endpoint: &Endpoint) -> Result<Arc<dyn RpcTransport>, ConnectionError> {
        Ok(Arc::new(HttpTransport::new(self.client.clone(), endpoint.clone())))
    }
}
