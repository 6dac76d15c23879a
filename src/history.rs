//! Bounded, time-ordered metric history shared between the sampler and readers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Points retained per history (60 samples x 5s = 5 minutes)
pub const DEFAULT_CAPACITY: usize = 60;

/// A single sample of one metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub timestamp: DateTime<Utc>,
    #[serde(with = "sample_value")]
    pub value: f64,
}

/// Values are stored unvalidated, and JSON has no literal for NaN or the
/// infinities, so those travel as the strings `"NaN"`, `"inf"` and `"-inf"`.
mod sample_value {
    use serde::de::{self, Deserializer, Unexpected, Visitor};
    use serde::Serializer;
    use std::fmt;

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_str("NaN")
        } else if value.is_infinite() {
            serializer.serialize_str(if *value > 0.0 { "inf" } else { "-inf" })
        } else {
            serializer.serialize_f64(*value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        deserializer.deserialize_any(SampleValueVisitor)
    }

    struct SampleValueVisitor;

    impl Visitor<'_> for SampleValueVisitor {
        type Value = f64;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a number or one of \"NaN\", \"inf\", \"-inf\"")
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<f64, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<f64, E> {
            Ok(v as f64)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<f64, E> {
            Ok(v as f64)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<f64, E> {
            match v {
                "NaN" => Ok(f64::NAN),
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                other => Err(E::invalid_value(Unexpected::Str(other), &self)),
            }
        }
    }
}

/// Fixed-capacity window of recent samples for one metric, oldest first.
///
/// A single writer appends with [`MetricHistory::add`]; any number of readers
/// may take [`MetricHistory::snapshot`] copies concurrently. When full, the
/// oldest point is evicted before the new one is appended.
#[derive(Debug)]
pub struct MetricHistory {
    capacity: usize,
    points: RwLock<VecDeque<MetricPoint>>,
}

impl MetricHistory {
    /// Create an empty history. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            points: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Record `value` stamped with the current wall-clock time
    pub fn add(&self, value: f64) {
        self.push(MetricPoint {
            timestamp: Utc::now(),
            value,
        });
    }

    fn push(&self, point: MetricPoint) {
        let mut points = self.write();
        if points.len() >= self.capacity {
            points.pop_front();
        }
        points.push_back(point);
    }

    /// Independent copy of the current points, oldest first
    pub fn snapshot(&self) -> Vec<MetricPoint> {
        self.read().iter().copied().collect()
    }

    /// Most recent point, if any
    pub fn latest(&self) -> Option<MetricPoint> {
        self.read().back().copied()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // A panic while holding the lock cannot leave a half-written point behind
    // (push/pop on VecDeque of Copy values), so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, VecDeque<MetricPoint>> {
        match self.points.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, VecDeque<MetricPoint>> {
        match self.points.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for MetricHistory {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// The two tracked metric streams. Each history has its own lock, so a
/// CPU update never blocks a reader of the memory history.
#[derive(Debug, Default)]
pub struct SystemMetrics {
    pub cpu_usage: MetricHistory,
    pub memory_usage: MetricHistory,
}

impl SystemMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cpu_usage: MetricHistory::new(capacity),
            memory_usage: MetricHistory::new(capacity),
        }
    }

    /// Copy both histories. Each history is copied atomically; the pair is
    /// not, so the two vectors may differ in length by an in-flight tick.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cpu_usage: self.cpu_usage.snapshot(),
            memory_usage: self.memory_usage.snapshot(),
        }
    }
}

/// Owned copy of [`SystemMetrics`]; this is the shape written to JSON exports.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub cpu_usage: Vec<MetricPoint>,
    pub memory_usage: Vec<MetricPoint>,
}

impl MetricsSnapshot {
    /// Number of rows that can be aligned across both histories
    pub fn aligned_len(&self) -> usize {
        self.cpu_usage.len().min(self.memory_usage.len())
    }
}
