use serde::Serialize;
use std::fmt;

/// Health of one node as seen by a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NodeHealth {
    Online,
    Syncing,
    Starting,
    Offline,
}

impl fmt::Display for NodeHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            NodeHealth::Online => "Online",
            NodeHealth::Syncing => "Syncing",
            NodeHealth::Starting => "Starting",
            NodeHealth::Offline => "Offline",
        };
        f.write_str(label)
    }
}

/// Status of a container that is up and answered RPC: connected peers mean
/// it participates in the network, a known block height means it is at
/// least following the chain.
pub fn derive_status(block_height: Option<u64>, peers: u32) -> NodeHealth {
    if peers > 0 {
        NodeHealth::Online
    } else if block_height.is_some() {
        NodeHealth::Syncing
    } else {
        NodeHealth::Starting
    }
}

/// One line of the monitoring table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeRow {
    pub node: String,
    pub status: NodeHealth,
    pub block_height: Option<u64>,
    pub peers: u32,
    pub pending_transactions: u64,
    pub cpu_percent: f64,
    pub memory_used: u64,
    pub balance_eth: Option<f64>,
    pub container_id: String,
}

impl NodeRow {
    /// Row with every measured field at its default.
    pub fn new(node: impl Into<String>, status: NodeHealth, container_id: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            status,
            block_height: None,
            peers: 0,
            pending_transactions: 0,
            cpu_percent: 0.0,
            memory_used: 0,
            balance_eth: None,
            container_id: container_id.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FleetSummary {
    pub total: usize,
    pub running: usize,
    pub offline: usize,
}

pub fn summary(rows: &[NodeRow]) -> FleetSummary {
    let offline = rows.iter().filter(|r| r.status == NodeHealth::Offline).count();
    FleetSummary {
        total: rows.len(),
        running: rows.len() - offline,
        offline,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Some(120), 2, NodeHealth::Online)]
    #[test_case(None, 1, NodeHealth::Online)]
    #[test_case(Some(0), 0, NodeHealth::Syncing)]
    #[test_case(None, 0, NodeHealth::Starting)]
    fn test_derive_status(height: Option<u64>, peers: u32, expected: NodeHealth) {
        assert_eq!(derive_status(height, peers), expected);
    }

    #[test]
    fn test_summary_counts_offline() {
        let rows = vec![
            NodeRow::new("alice", NodeHealth::Online, "a"),
            NodeRow::new("bob", NodeHealth::Offline, "b"),
            NodeRow::new("cassandra", NodeHealth::Starting, "c"),
        ];
        assert_eq!(
            summary(&rows),
            FleetSummary {
                total: 3,
                running: 2,
                offline: 1
            }
        );
    }
}
