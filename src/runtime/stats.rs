use serde::{Deserialize, Serialize};

/// Resource usage of one container at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ContainerStats {
    pub cpu_percent: f64,
    pub memory_used: u64,
    pub memory_limit: u64,
    pub net_rx: u64,
    pub net_tx: u64,
}

/// Raw cumulative CPU counters, in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpuSample {
    pub total_usage: u64,
    pub system_usage: u64,
    pub online_cpus: u32,
}

/// CPU utilisation between two samples, scaled by the number of cores the
/// way `docker stats` does. The first observation has nothing to compare
/// against and reports 0.
pub fn cpu_percent(prior: Option<CpuSample>, current: CpuSample) -> f64 {
    let Some(prior) = prior else {
        return 0.0;
    };

    let cpu_delta = current.total_usage as f64 - prior.total_usage as f64;
    let system_delta = current.system_usage as f64 - prior.system_usage as f64;
    if cpu_delta <= 0.0 || system_delta <= 0.0 {
        return 0.0;
    }

    let cpus = current.online_cpus.max(1) as f64;
    cpu_delta / system_delta * cpus * 100.0
}

/// Parses sizes as printed by the docker CLI: `128MiB`, `1.5GiB`, `12.3kB`, `0B`.
pub fn parse_size(text: &str) -> Option<u64> {
    let text = text.trim();
    let split = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(text.len());
    let (number, unit) = text.split_at(split);
    let value: f64 = number.parse().ok()?;

    let multiplier: f64 = match unit.trim() {
        "" | "B" => 1.0,
        "kB" | "KB" => 1e3,
        "MB" => 1e6,
        "GB" => 1e9,
        "TB" => 1e12,
        "KiB" => 1024.0,
        "MiB" => 1024.0 * 1024.0,
        "GiB" => 1024.0 * 1024.0 * 1024.0,
        "TiB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        _ => return None,
    };

    Some((value * multiplier).round() as u64)
}

/// `"1.23%"` → `1.23`
pub fn parse_percent(text: &str) -> Option<f64> {
    text.trim().trim_end_matches('%').trim().parse().ok()
}

/// Splits the CLI's `"used / limit"` pair format.
pub fn parse_pair(text: &str) -> Option<(u64, u64)> {
    let (left, right) = text.split_once('/')?;
    Some((parse_size(left)?, parse_size(right)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("0B", Some(0))]
    #[test_case("512B", Some(512))]
    #[test_case("12.5kB", Some(12_500))]
    #[test_case("128MiB", Some(134_217_728))]
    #[test_case("1.5GiB", Some(1_610_612_736))]
    #[test_case("3MB", Some(3_000_000))]
    #[test_case("lots", None)]
    #[test_case("12 parsecs", None)]
    fn test_parse_size(input: &str, expected: Option<u64>) {
        assert_eq!(parse_size(input), expected);
    }

    #[test]
    fn test_parse_pair() {
        assert_eq!(parse_pair("1kB / 2kB"), Some((1000, 2000)));
        assert_eq!(parse_pair("1kB"), None);
    }

    #[test]
    fn test_parse_percent() {
        assert_eq!(parse_percent("45.50%"), Some(45.5));
        assert_eq!(parse_percent("--"), None);
    }

    #[test]
    fn test_cpu_delta_against_negative_or_zero_system_delta() {
        let prior = CpuSample { total_usage: 10, system_usage: 100, online_cpus: 2 };
        let current = CpuSample { total_usage: 20, system_usage: 100, online_cpus: 2 };
        assert_eq!(cpu_percent(Some(prior), current), 0.0);
    }
}
