//! Snapshot export of the metric histories to CSV or JSON files.

use crate::history::{MetricsSnapshot, SystemMetrics};
use chrono::{DateTime, Local, SecondsFormat};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const CSV_HEADER: &str = "Timestamp,CPU Usage (%),Memory Usage (%)";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("unsupported export format: {0} (expected csv or json)")]
    UnsupportedFormat(String),

    #[error("failed to create export directory {}: {source}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("failed to write export file {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to serialize metrics: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Output format of an export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(ExportError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Export file name for a given moment, e.g. `metrics_2024-05-01_13-45-10.csv`
pub fn export_filename(format: ExportFormat, at: DateTime<Local>) -> String {
    format!(
        "metrics_{}.{}",
        at.format("%Y-%m-%d_%H-%M-%S"),
        format.extension()
    )
}

/// Write the current contents of `metrics` into a new file under `dir`.
///
/// The directory is created if missing. Returns the path of the fully
/// written file; on error no file is left at that path.
pub fn export(metrics: &SystemMetrics, format: ExportFormat, dir: &Path) -> Result<PathBuf, ExportError> {
    export_snapshot(&metrics.snapshot(), format, dir, Local::now())
}

pub(crate) fn export_snapshot(
    snapshot: &MetricsSnapshot,
    format: ExportFormat,
    dir: &Path,
    at: DateTime<Local>,
) -> Result<PathBuf, ExportError> {
    fs::create_dir_all(dir).map_err(|source| ExportError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let path = dir.join(export_filename(format, at));
    let body = match format {
        ExportFormat::Csv => render_csv(snapshot),
        ExportFormat::Json => render_json(snapshot)?,
    };
    write_atomically(&path, body.as_bytes())?;

    info!(
        path = %path.display(),
        format = %format,
        cpu_points = snapshot.cpu_usage.len(),
        memory_points = snapshot.memory_usage.len(),
        "Exported metrics"
    );
    Ok(path)
}

/// One row per aligned index; timestamps come from the CPU history.
pub fn render_csv(snapshot: &MetricsSnapshot) -> String {
    let rows = snapshot.aligned_len();
    if snapshot.cpu_usage.len() != snapshot.memory_usage.len() {
        warn!(
            cpu_points = snapshot.cpu_usage.len(),
            memory_points = snapshot.memory_usage.len(),
            rows,
            "History lengths differ, CSV export truncated to the shorter one"
        );
    }

    let mut out = String::with_capacity(CSV_HEADER.len() + 1 + rows * 48);
    out.push_str(CSV_HEADER);
    out.push('\n');
    for (cpu, mem) in snapshot.cpu_usage.iter().zip(&snapshot.memory_usage) {
        out.push_str(&format!(
            "{},{:.2},{:.2}\n",
            cpu.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            cpu.value,
            mem.value
        ));
    }
    out
}

/// Both full histories as 2-space indented JSON
pub fn render_json(snapshot: &MetricsSnapshot) -> Result<String, ExportError> {
    let mut json = serde_json::to_string_pretty(snapshot)?;
    json.push('\n');
    Ok(json)
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), ExportError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));

    let result = (|| -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        writer.write_all(bytes)?;
        writer.into_inner().map_err(|e| e.into_error())?.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if let Err(source) = result {
        if let Err(e) = fs::remove_file(&tmp) {
            debug!(path = %tmp.display(), error = %e, "No temporary export file to clean up");
        }
        return Err(ExportError::Write {
            path: path.to_path_buf(),
            source,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MetricPoint;
    use chrono::{Duration, TimeZone, Utc};
    use tempfile::TempDir;

    fn points(values: &[f64]) -> Vec<MetricPoint> {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, v)| MetricPoint {
                timestamp: start + Duration::seconds(5 * i as i64),
                value: *v,
            })
            .collect()
    }

    fn fixed_moment() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 1, 13, 45, 10).unwrap()
    }

    fn files_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn parses_known_formats_only() {
        assert_eq!("csv".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!("json".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        match "xml".parse::<ExportFormat>() {
            Err(ExportError::UnsupportedFormat(name)) => assert_eq!(name, "xml"),
            other => panic!("unexpected result: {:?}", other),
        }
        assert!("CSV".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn filename_uses_local_timestamp() {
        assert_eq!(
            export_filename(ExportFormat::Csv, fixed_moment()),
            "metrics_2024-05-01_13-45-10.csv"
        );
        assert_eq!(
            export_filename(ExportFormat::Json, fixed_moment()),
            "metrics_2024-05-01_13-45-10.json"
        );
    }

    #[test]
    fn csv_rows_match_source_values() {
        let snapshot = MetricsSnapshot {
            cpu_usage: points(&[12.346, 50.0, 99.999]),
            memory_usage: points(&[40.0, 41.5, 42.004]),
        };
        let dir = TempDir::new().unwrap();
        let path = export_snapshot(&snapshot, ExportFormat::Csv, dir.path(), fixed_moment()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some(CSV_HEADER));

        let rows: Vec<Vec<&str>> = lines.map(|l| l.split(',').collect()).collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], vec!["2024-05-01T12:00:00Z", "12.35", "40.00"]);
        assert_eq!(rows[2], vec!["2024-05-01T12:00:10Z", "100.00", "42.00"]);
        for (row, (cpu, mem)) in rows.iter().zip(snapshot.cpu_usage.iter().zip(&snapshot.memory_usage)) {
            let cpu_val: f64 = row[1].parse().unwrap();
            let mem_val: f64 = row[2].parse().unwrap();
            assert!((cpu_val - cpu.value).abs() <= 0.005 + f64::EPSILON);
            assert!((mem_val - mem.value).abs() <= 0.005 + f64::EPSILON);
        }
    }

    #[test]
    fn csv_truncates_to_shorter_history() {
        let snapshot = MetricsSnapshot {
            cpu_usage: points(&[1.0, 2.0, 3.0, 4.0, 5.0]),
            memory_usage: points(&[10.0, 20.0, 30.0]),
        };
        let csv = render_csv(&snapshot);
        let rows: Vec<&str> = csv.lines().skip(1).collect();
        assert_eq!(rows.len(), 3);
        for (row, cpu) in rows.iter().zip(&snapshot.cpu_usage) {
            let ts = cpu.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true);
            assert!(row.starts_with(&ts), "row {} should start with {}", row, ts);
        }
    }

    #[test]
    fn csv_with_empty_history_has_only_header() {
        let csv = render_csv(&MetricsSnapshot::default());
        assert_eq!(csv, format!("{}\n", CSV_HEADER));
    }

    #[test]
    fn json_round_trip_keeps_full_histories() {
        let snapshot = MetricsSnapshot {
            cpu_usage: points(&[1.5, 2.25, 3.125, 4.0]),
            memory_usage: points(&[60.0, 61.0]),
        };
        let dir = TempDir::new().unwrap();
        let path = export_snapshot(&snapshot, ExportFormat::Json, dir.path(), fixed_moment()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("{\n  \"cpu_usage\": ["));
        let parsed: MetricsSnapshot = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed, snapshot);
    }

    #[test]
    fn json_keeps_non_finite_values() {
        let snapshot = MetricsSnapshot {
            cpu_usage: points(&[f64::NAN, 12.5]),
            memory_usage: points(&[f64::INFINITY, f64::NEG_INFINITY]),
        };
        let dir = TempDir::new().unwrap();
        let path = export_snapshot(&snapshot, ExportFormat::Json, dir.path(), fixed_moment()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(!content.contains("null"));
        let parsed: MetricsSnapshot = serde_json::from_str(&content).unwrap();
        assert!(parsed.cpu_usage[0].value.is_nan());
        assert_eq!(parsed.cpu_usage[0].timestamp, snapshot.cpu_usage[0].timestamp);
        assert_eq!(parsed.cpu_usage[1], snapshot.cpu_usage[1]);
        assert_eq!(parsed.memory_usage, snapshot.memory_usage);
    }

    #[test]
    fn export_creates_nested_directory() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("a").join("b");
        let metrics = SystemMetrics::with_capacity(4);
        metrics.cpu_usage.add(10.0);
        metrics.memory_usage.add(20.0);

        let path = export(&metrics, ExportFormat::Csv, &target).unwrap();
        assert!(path.starts_with(&target));
        assert!(path.is_file());
        assert_eq!(files_in(&target).len(), 1);
    }

    #[test]
    fn unsupported_format_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let metrics = SystemMetrics::new();
        let result = "xml"
            .parse::<ExportFormat>()
            .and_then(|format| export(&metrics, format, dir.path()));
        assert!(matches!(result, Err(ExportError::UnsupportedFormat(_))));
        assert!(files_in(dir.path()).is_empty());
    }

    #[test]
    fn directory_creation_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not_a_dir");
        fs::write(&blocker, b"x").unwrap();

        let err = export(&SystemMetrics::new(), ExportFormat::Json, &blocker.join("out")).unwrap_err();
        assert!(matches!(err, ExportError::CreateDir { .. }));
        assert!(err.to_string().contains("export directory"));
    }

    #[test]
    fn write_failure_is_reported_and_cleaned_up() {
        let dir = TempDir::new().unwrap();
        let name = export_filename(ExportFormat::Csv, fixed_moment());
        // A directory squatting on the target name makes the final rename fail
        fs::create_dir(dir.path().join(&name)).unwrap();
        let snapshot = MetricsSnapshot {
            cpu_usage: points(&[1.0]),
            memory_usage: points(&[2.0]),
        };

        let err = export_snapshot(&snapshot, ExportFormat::Csv, dir.path(), fixed_moment()).unwrap_err();
        match err {
            ExportError::Write { path, .. } => assert_eq!(path, dir.path().join(&name)),
            other => panic!("expected a write error, got {other:?}"),
        }
        assert_eq!(files_in(dir.path()), vec![name.clone()]);
        assert!(dir.path().join(&name).is_dir());
    }

    #[test]
    fn no_temporary_files_are_left_behind() {
        let dir = TempDir::new().unwrap();
        let snapshot = MetricsSnapshot {
            cpu_usage: points(&[1.0]),
            memory_usage: points(&[2.0]),
        };
        export_snapshot(&snapshot, ExportFormat::Csv, dir.path(), fixed_moment()).unwrap();
        assert_eq!(files_in(dir.path()), vec!["metrics_2024-05-01_13-45-10.csv"]);
    }
}
