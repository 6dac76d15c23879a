//! CPU utilization from /proc/stat deltas.

use anyhow::{Context, Result};
use std::fs;

/// Aggregate CPU time counters from the `cpu ` line of /proc/stat
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTimes {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
}

impl CpuTimes {
    pub fn total(&self) -> u64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
    }

    fn idle_all(&self) -> u64 {
        self.idle + self.iowait
    }
}

/// Utilization is a rate, so the collector keeps the previous counters.
pub struct CpuCollector {
    stat_path: String,
    prev: Option<CpuTimes>,
}

impl CpuCollector {
    pub fn new() -> Self {
        Self::with_path("/proc/stat")
    }

    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            stat_path: path.into(),
            prev: None,
        }
    }

    /// Busy percentage since the previous call; 0 on the first call.
    pub fn collect(&mut self) -> Result<f64> {
        let content = fs::read_to_string(&self.stat_path)
            .with_context(|| format!("Failed to read {}", self.stat_path))?;
        let times = parse_stat(&content)
            .with_context(|| format!("No aggregate cpu line in {}", self.stat_path))?;

        let utilization = self
            .prev
            .map(|prev| utilization_between(&prev, &times))
            .unwrap_or(0.0);
        self.prev = Some(times);
        Ok(utilization)
    }
}

impl Default for CpuCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse the aggregate `cpu ` line; per-core lines are ignored.
pub fn parse_stat(content: &str) -> Option<CpuTimes> {
    let line = content.lines().find(|l| l.starts_with("cpu "))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        // Unparseable counters read as 0 so later fields keep their column
        .map(|s| s.parse().unwrap_or(0))
        .collect();
    let at = |i: usize| fields.get(i).copied().unwrap_or(0);

    Some(CpuTimes {
        user: at(0),
        nice: at(1),
        system: at(2),
        idle: at(3),
        iowait: at(4),
        irq: at(5),
        softirq: at(6),
        steal: at(7),
    })
}

pub fn utilization_between(prev: &CpuTimes, curr: &CpuTimes) -> f64 {
    let total_delta = curr.total().saturating_sub(prev.total());
    if total_delta == 0 {
        return 0.0;
    }
    let idle_delta = curr.idle_all().saturating_sub(prev.idle_all());
    100.0 * (1.0 - idle_delta as f64 / total_delta as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    const STAT_A: &str = "cpu  100 0 100 700 100 0 0 0 0 0\ncpu0 50 0 50 350 50 0 0 0 0 0\nctxt 1234\n";
    const STAT_B: &str = "cpu  200 0 200 1200 200 0 0 0 0 0\ncpu0 100 0 100 600 100 0 0 0 0 0\nctxt 2345\n";

    #[test]
    fn parses_aggregate_line() {
        let times = parse_stat(STAT_A).unwrap();
        assert_eq!(times.user, 100);
        assert_eq!(times.idle, 700);
        assert_eq!(times.total(), 1000);
    }

    #[test]
    fn garbled_field_keeps_column_positions() {
        let times = parse_stat("cpu  100 x 100 700 100 5 6 7 0 0\n").unwrap();
        assert_eq!(times.user, 100);
        assert_eq!(times.nice, 0);
        assert_eq!(times.system, 100);
        assert_eq!(times.idle, 700);
        assert_eq!(times.iowait, 100);
        assert_eq!(times.steal, 7);
    }

    #[test]
    fn missing_aggregate_line_is_none() {
        assert!(parse_stat("cpu0 1 2 3 4\nintr 5\n").is_none());
    }

    #[test]
    fn utilization_excludes_idle_and_iowait() {
        let a = parse_stat(STAT_A).unwrap();
        let b = parse_stat(STAT_B).unwrap();
        // total +800, idle+iowait +600
        assert!((utilization_between(&a, &b) - 25.0).abs() < 1e-9);
        assert_eq!(utilization_between(&a, &a), 0.0);
    }

    #[test]
    fn collector_reports_delta_after_first_read() {
        let file = NamedTempFile::new().unwrap();
        fs::write(file.path(), STAT_A).unwrap();
        let mut collector = CpuCollector::with_path(file.path().to_string_lossy());
        assert_eq!(collector.collect().unwrap(), 0.0);

        fs::write(file.path(), STAT_B).unwrap();
        assert!((collector.collect().unwrap() - 25.0).abs() < 1e-9);
    }
}
