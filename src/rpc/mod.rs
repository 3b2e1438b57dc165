//! Chain RPC client pool.
//!
//! One [`RpcConnection`] per endpoint, created on first [`RpcClientPool::connect`]
//! and kept until [`RpcClientPool::disconnect`]. The map is guarded by a single
//! reader/writer lock which is never held across network I/O: reads clone the
//! transport handle and release the lock before calling out.

use crate::error::{ConnectionError, NotConnectedError, RpcError};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub mod transport;
pub mod types;

pub use transport::{Dialer, Endpoint, HttpDialer, HttpTransport, RpcTransport};
pub use types::{Transaction, TransactionReceipt, parse_quantity, wei_to_eth};

type RpcResult<T> = std::result::Result<T, RpcError>;

/// A probed, live connection to one node.
#[derive(Clone)]
pub struct RpcConnection {
    pub endpoint: Endpoint,
    pub transport: Arc<dyn RpcTransport>,
    pub established: DateTime<Utc>,
    pub chain_id: u64,
}

pub struct RpcClientPool {
    dialer: Arc<dyn Dialer>,
    connections: RwLock<HashMap<Endpoint, RpcConnection>>,
}

impl RpcClientPool {
    pub fn new(dialer: Arc<dyn Dialer>) -> Self {
        Self {
            dialer,
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Dial and probe `endpoint` with `eth_chainId`. Does nothing when a
    /// connection already exists. Nothing is stored if the probe fails.
    pub async fn connect(&self, endpoint: &Endpoint) -> Result<(), ConnectionError> {
        if self.connections.read().await.contains_key(endpoint) {
            return Ok(());
        }

        let transport = self.dialer.dial(endpoint).await?;
        let chain_id = match probe(transport.as_ref(), endpoint).await {
            Ok(chain_id) => chain_id,
            Err(e) => {
                debug!(%endpoint, error = %e, "Probe failed");
                transport.close().await;
                return Err(e);
            }
        };

        let mut connections = self.connections.write().await;
        if connections.contains_key(endpoint) {
            drop(connections);
            // Lost a race with a concurrent connect; keep the first one.
            transport.close().await;
            return Ok(());
        }

        connections.insert(
            endpoint.clone(),
            RpcConnection {
                endpoint: endpoint.clone(),
                transport,
                established: Utc::now(),
                chain_id,
            },
        );
        info!(%endpoint, chain_id, "Connected to node RPC");
        Ok(())
    }

    /// Close and forget the connection. No-op when absent.
    pub async fn disconnect(&self, endpoint: &Endpoint) {
        let removed = self.connections.write().await.remove(endpoint);
        if let Some(connection) = removed {
            connection.transport.close().await;
            debug!(%endpoint, "Disconnected");
        }
    }

    pub async fn disconnect_all(&self) {
        let drained: Vec<RpcConnection> = self.connections.write().await.drain().map(|(_, c)| c).collect();
        for connection in drained {
            connection.transport.close().await;
        }
    }

    pub async fn is_connected(&self, endpoint: &Endpoint) -> bool {
        self.connections.read().await.contains_key(endpoint)
    }

    pub async fn endpoints(&self) -> Vec<Endpoint> {
        let mut endpoints: Vec<Endpoint> = self.connections.read().await.keys().cloned().collect();
        endpoints.sort();
        endpoints
    }

    pub async fn connection(&self, endpoint: &Endpoint) -> Option<RpcConnection> {
        self.connections.read().await.get(endpoint).cloned()
    }

    /// Chain id reported when the connection was established.
    pub async fn chain_id(&self, endpoint: &Endpoint) -> RpcResult<u64> {
        self.connections
            .read()
            .await
            .get(endpoint)
            .map(|c| c.chain_id)
            .ok_or_else(|| not_connected(endpoint).into())
    }

    pub async fn latest_block_number(&self, endpoint: &Endpoint) -> RpcResult<u64> {
        let method = "eth_blockNumber";
        let value = self.call(endpoint, method, json!([])).await?;
        Ok(narrow_quantity(endpoint, method, &value)?)
    }

    pub async fn peer_count(&self, endpoint: &Endpoint) -> RpcResult<u32> {
        let method = "net_peerCount";
        let value = self.call(endpoint, method, json!([])).await?;
        Ok(narrow_quantity(endpoint, method, &value)?)
    }

    /// Transactions in the pending block. Clients without a pending block
    /// answer `null`, which counts as zero.
    pub async fn pending_transaction_count(&self, endpoint: &Endpoint) -> RpcResult<u64> {
        let method = "eth_getBlockTransactionCountByNumber";
        let value = self.call(endpoint, method, json!(["pending"])).await?;
        if value.is_null() {
            return Ok(0);
        }
        Ok(narrow_quantity(endpoint, method, &value)?)
    }

    /// Balance at the latest block, in wei.
    pub async fn balance(&self, endpoint: &Endpoint, address: &str) -> RpcResult<u128> {
        let method = "eth_getBalance";
        let value = self.call(endpoint, method, json!([address, "latest"])).await?;
        Ok(quantity(endpoint, method, &value)?)
    }

    pub async fn nonce(&self, endpoint: &Endpoint, address: &str) -> RpcResult<u64> {
        let method = "eth_getTransactionCount";
        let value = self.call(endpoint, method, json!([address, "latest"])).await?;
        Ok(narrow_quantity(endpoint, method, &value)?)
    }

    pub async fn transaction(&self, endpoint: &Endpoint, hash: &str) -> RpcResult<Option<Transaction>> {
        let method = "eth_getTransactionByHash";
        let value = self.call(endpoint, method, json!([hash])).await?;
        Ok(optional(endpoint, method, value)?)
    }

    pub async fn receipt(&self, endpoint: &Endpoint, hash: &str) -> RpcResult<Option<TransactionReceipt>> {
        let method = "eth_getTransactionReceipt";
        let value = self.call(endpoint, method, json!([hash])).await?;
        Ok(optional(endpoint, method, value)?)
    }

    async fn call(&self, endpoint: &Endpoint, method: &str, params: Value) -> RpcResult<Value> {
        let transport = self
            .connections
            .read()
            .await
            .get(endpoint)
            .map(|c| Arc::clone(&c.transport))
            .ok_or_else(|| not_connected(endpoint))?;

        transport.call(method, params).await.map_err(|e| {
            warn!(%endpoint, %method, error = %e, "RPC call failed");
            RpcError::from(e)
        })
    }
}

async fn probe(transport: &dyn RpcTransport, endpoint: &Endpoint) -> Result<u64, ConnectionError> {
    let method = "eth_chainId";
    let value = transport.call(method, json!([])).await?;
    Ok(narrow_quantity(endpoint, method, &value)?)
}

fn not_connected(endpoint: &Endpoint) -> NotConnectedError {
    NotConnectedError {
        endpoint: endpoint.to_string(),
    }
}

fn malformed(endpoint: &Endpoint, method: &str, reason: impl Into<String>) -> ConnectionError {
    ConnectionError::Malformed {
        endpoint: endpoint.to_string(),
        method: method.to_string(),
        reason: reason.into(),
    }
}

fn quantity(endpoint: &Endpoint, method: &str, value: &Value) -> Result<u128, ConnectionError> {
    value
        .as_str()
        .and_then(parse_quantity)
        .ok_or_else(|| malformed(endpoint, method, format!("expected hex quantity, got {}", value)))
}

/// A quantity that must fit `T`; wider values are malformed, not truncated.
fn narrow_quantity<T: TryFrom<u128>>(endpoint: &Endpoint, method: &str, value: &Value) -> Result<T, ConnectionError> {
    let wide = quantity(endpoint, method, value)?;
    T::try_from(wide).map_err(|_| malformed(endpoint, method, format!("quantity {:#x} out of range", wide)))
}

fn optional<T: DeserializeOwned>(endpoint: &Endpoint, method: &str, value: Value) -> Result<Option<T>, ConnectionError> {
    if value.is_null() {
        return Ok(None);
    }
    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| malformed(endpoint, method, e.to_string()))
}
