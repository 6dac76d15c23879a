//! Memory utilization from /proc/meminfo.

use anyhow::{bail, Context, Result};
use std::fs;

/// The /proc/meminfo fields needed to compute used memory, in bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemInfo {
    pub total: u64,
    pub free: u64,
    pub buffers: u64,
    pub cached: u64,
}

impl MemInfo {
    /// Used memory excluding buffers and page cache
    pub fn used(&self) -> u64 {
        self.total
            .saturating_sub(self.free + self.buffers + self.cached)
    }

    pub fn used_percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        100.0 * self.used() as f64 / self.total as f64
    }
}

pub struct MemoryCollector {
    meminfo_path: String,
}

impl MemoryCollector {
    pub fn new() -> Self {
        Self::with_path("/proc/meminfo")
    }

    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            meminfo_path: path.into(),
        }
    }

    /// Current used memory percentage
    pub fn collect(&mut self) -> Result<f64> {
        let content = fs::read_to_string(&self.meminfo_path)
            .with_context(|| format!("Failed to read {}", self.meminfo_path))?;
        let info = parse_meminfo(&content);
        if info.total == 0 {
            bail!("MemTotal missing from {}", self.meminfo_path);
        }
        Ok(info.used_percent())
    }
}

impl Default for MemoryCollector {
    fn default() -> Self {
        Self::new()
    }
}

pub fn parse_meminfo(content: &str) -> MemInfo {
    let mut info = MemInfo::default();
    for line in content.lines() {
        let mut parts = line.split_whitespace();
        let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
            continue;
        };
        // Values are reported in kB
        let bytes = value.parse::<u64>().unwrap_or(0) * 1024;
        match key {
            "MemTotal:" => info.total = bytes,
            "MemFree:" => info.free = bytes,
            "Buffers:" => info.buffers = bytes,
            "Cached:" => info.cached = bytes,
            _ => {}
        }
    }
    info
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    const MEMINFO: &str = "MemTotal:       1000 kB\nMemFree:         200 kB\nMemAvailable:    600 kB\nBuffers:         100 kB\nCached:          100 kB\nSwapTotal:         0 kB\n";

    #[test]
    fn parses_fields_in_bytes() {
        let info = parse_meminfo(MEMINFO);
        assert_eq!(info.total, 1000 * 1024);
        assert_eq!(info.free, 200 * 1024);
        assert_eq!(info.used(), 600 * 1024);
        assert!((info.used_percent() - 60.0).abs() < 1e-9);
    }

    #[test]
    fn empty_meminfo_is_zero_percent() {
        assert_eq!(parse_meminfo("").used_percent(), 0.0);
    }

    #[test]
    fn collector_rejects_missing_total() {
        let file = NamedTempFile::new().unwrap();
        fs::write(file.path(), "MemFree: 10 kB\n").unwrap();
        let mut collector = MemoryCollector::with_path(file.path().to_string_lossy());
        assert!(collector.collect().is_err());

        fs::write(file.path(), MEMINFO).unwrap();
        assert!((collector.collect().unwrap() - 60.0).abs() < 1e-9);
    }
}
