use chainfleet::monitoring::{NodeHealth, NodeRow, Snapshot, SnapshotRenderer};
use chainfleet::orchestration::{LaunchReport, ProgressObserver};
use chainfleet::types::NetworkStatus;

/// Prints snapshots as a table on stdout.
pub struct ConsoleRenderer {
    /// Clear the terminal before each table.
    pub clear: bool,
}

fn status_label(status: NodeHealth) -> String {
    match status {
        NodeHealth::Online => "🟢 Online".to_string(),
        NodeHealth::Syncing => "🟡 Syncing".to_string(),
        NodeHealth::Starting => "🟠 Starting".to_string(),
        NodeHealth::Offline => "🔴 Offline".to_string(),
    }
}

fn format_memory(bytes: u64) -> String {
    const MIB: f64 = 1024.0 * 1024.0;
    if bytes == 0 {
        return "-".to_string();
    }
    let mib = bytes as f64 / MIB;
    if mib >= 1024.0 {
        format!("{:.2} GiB", mib / 1024.0)
    } else {
        format!("{:.1} MiB", mib)
    }
}

fn print_row(row: &NodeRow) {
    let block = row
        .block_height
        .map(|b| b.to_string())
        .unwrap_or_else(|| "-".to_string());
    let balance = row
        .balance_eth
        .map(|b| format!("{:.4}", b))
        .unwrap_or_else(|| "-".to_string());

    println!(
        "{:<12} {:<14} {:>10} {:>6} {:>8} {:>8.1}% {:>12} {:>14} {:<12}",
        row.node,
        status_label(row.status),
        block,
        row.peers,
        row.pending_transactions,
        row.cpu_percent,
        format_memory(row.memory_used),
        balance,
        row.container_id,
    );
}

impl SnapshotRenderer for ConsoleRenderer {
    fn render(&self, snapshot: &Snapshot) {
        if self.clear {
            print!("\x1B[2J\x1B[H");
        }

        let table = match snapshot {
            Snapshot::NoContainers { taken_at } => {
                println!("No fleet containers found ({})", taken_at.format("%H:%M:%S"));
                println!("💡 Run 'chainfleet launch' to start the network");
                return;
            }
            Snapshot::Table(table) => table,
        };

        println!("📊 Fleet status at {}", table.taken_at.format("%Y-%m-%d %H:%M:%S UTC"));
        println!(
            "{:<12} {:<14} {:>10} {:>6} {:>8} {:>9} {:>12} {:>14} {:<12}",
            "NODE", "STATUS", "BLOCK", "PEERS", "PENDING", "CPU", "MEMORY", "BALANCE (ETH)", "CONTAINER"
        );
        println!("{}", "─".repeat(106));
        for row in &table.rows {
            print_row(row);
        }
        println!("{}", "─".repeat(106));
        println!(
            "Nodes: {} total, {} running, {} offline",
            table.summary.total, table.summary.running, table.summary.offline
        );
    }
}

/// Prints one line per node as the launch proceeds.
pub struct ConsoleProgress {
    pub total: usize,
}

impl ProgressObserver for ConsoleProgress {
    fn update(&self, index: usize, message: &str) {
        println!("[{}/{}] {}", index, self.total, message);
    }

    fn finish(&self, report: &LaunchReport) {
        if report.succeeded == report.total {
            println!("✅ All {} nodes launched", report.total);
        } else {
            println!("⚠️  {}/{} nodes launched", report.succeeded, report.total);
        }
    }
}

pub fn network_status_label(status: NetworkStatus) -> &'static str {
    match status {
        NetworkStatus::Initializing => "initializing",
        NetworkStatus::Running => "running",
        NetworkStatus::Degraded => "degraded",
        NetworkStatus::Stopped => "stopped",
    }
}
