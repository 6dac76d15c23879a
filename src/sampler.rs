//! Periodic driver that feeds instantaneous readings into the histories.

use crate::history::SystemMetrics;
use crate::metrics::{CpuCollector, MemoryCollector};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

/// One pair of readings taken at the same tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub cpu_percent: f64,
    pub memory_percent: f64,
}

/// Source of CPU/memory readings for the sampler
pub trait MetricSource: Send {
    fn sample(&mut self) -> Result<Reading>;
}

/// Readings from procfs
#[derive(Default)]
pub struct ProcSource {
    cpu: CpuCollector,
    memory: MemoryCollector,
}

impl ProcSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetricSource for ProcSource {
    fn sample(&mut self) -> Result<Reading> {
        Ok(Reading {
            cpu_percent: self.cpu.collect()?,
            memory_percent: self.memory.collect()?,
        })
    }
}

/// Sole writer of a [`SystemMetrics`]
pub struct Sampler<S> {
    source: S,
    interval: Duration,
}

impl<S: MetricSource> Sampler<S> {
    pub fn new(source: S, interval: Duration) -> Self {
        Self { source, interval }
    }

    /// Sample once and append to both histories. A failed reading appends
    /// nothing, so the two histories stay in lockstep.
    pub fn tick(&mut self, metrics: &SystemMetrics) -> Result<Reading> {
        let reading = self.source.sample()?;
        metrics.cpu_usage.add(reading.cpu_percent);
        metrics.memory_usage.add(reading.memory_percent);
        Ok(reading)
    }

    /// Tick until `shutdown` flips to `true` (or its sender is dropped).
    /// Returns the number of ticks recorded.
    pub async fn run(mut self, metrics: Arc<SystemMetrics>, mut shutdown: watch::Receiver<bool>) -> u64 {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut recorded = 0u64;

        info!(interval_secs = self.interval.as_secs_f64(), "Sampler started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.tick(&metrics) {
                        Ok(reading) => {
                            recorded += 1;
                            debug!(
                                cpu = reading.cpu_percent,
                                memory = reading.memory_percent,
                                "Recorded sample"
                            );
                        }
                        Err(e) => warn!(error = %e, "Sampling failed, skipping tick"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!(ticks = recorded, "Sampler stopped");
        recorded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::collections::VecDeque;

    /// Replays scripted readings; `None` entries fail.
    struct Scripted(VecDeque<Option<Reading>>);

    impl Scripted {
        fn new(readings: Vec<Option<(f64, f64)>>) -> Self {
            Self(
                readings
                    .into_iter()
                    .map(|r| r.map(|(cpu_percent, memory_percent)| Reading { cpu_percent, memory_percent }))
                    .collect(),
            )
        }
    }

    impl MetricSource for Scripted {
        fn sample(&mut self) -> Result<Reading> {
            match self.0.pop_front() {
                Some(Some(reading)) => Ok(reading),
                Some(None) => Err(anyhow!("sensor unavailable")),
                None => Ok(Reading { cpu_percent: 0.0, memory_percent: 0.0 }),
            }
        }
    }

    fn values(metrics: &SystemMetrics) -> (Vec<f64>, Vec<f64>) {
        let snap = metrics.snapshot();
        (
            snap.cpu_usage.iter().map(|p| p.value).collect(),
            snap.memory_usage.iter().map(|p| p.value).collect(),
        )
    }

    #[test]
    fn tick_appends_to_both_histories() {
        let metrics = SystemMetrics::with_capacity(3);
        let mut sampler = Sampler::new(
            Scripted::new(vec![Some((10.0, 50.0)), Some((f64::NAN, -1.0))]),
            Duration::from_secs(5),
        );
        sampler.tick(&metrics).unwrap();
        sampler.tick(&metrics).unwrap();

        let (cpu, mem) = values(&metrics);
        assert_eq!(cpu[0], 10.0);
        assert!(cpu[1].is_nan());
        assert_eq!(mem, vec![50.0, -1.0]);
    }

    #[test]
    fn failed_reading_appends_nothing() {
        let metrics = SystemMetrics::with_capacity(3);
        let mut sampler = Sampler::new(Scripted::new(vec![None]), Duration::from_secs(5));
        assert!(sampler.tick(&metrics).is_err());
        assert!(metrics.cpu_usage.is_empty());
        assert!(metrics.memory_usage.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn run_samples_each_interval_until_shutdown() {
        let metrics = Arc::new(SystemMetrics::with_capacity(60));
        let (tx, rx) = watch::channel(false);
        let sampler = Sampler::new(
            Scripted::new(vec![Some((1.0, 11.0)), None, Some((2.0, 12.0)), Some((3.0, 13.0))]),
            Duration::from_secs(5),
        );
        let handle = tokio::spawn(sampler.run(Arc::clone(&metrics), rx));

        // Ticks fire at t=0, 5, 10, 15
        time::sleep(Duration::from_millis(15_500)).await;
        tx.send(true).unwrap();
        let ticks = handle.await.unwrap();

        assert_eq!(ticks, 3);
        let (cpu, mem) = values(&metrics);
        assert_eq!(cpu, vec![1.0, 2.0, 3.0]);
        assert_eq!(mem, vec![11.0, 12.0, 13.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_when_sender_dropped() {
        let metrics = Arc::new(SystemMetrics::new());
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(
            Sampler::new(Scripted::new(vec![]), Duration::from_secs(1)).run(Arc::clone(&metrics), rx),
        );
        time::sleep(Duration::from_millis(500)).await;
        drop(tx);
        assert_eq!(handle.await.unwrap(), 1);
    }
}
