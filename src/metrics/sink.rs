//! Destinations for flushed metrics

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

/// Aggregated metrics for one report interval
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsReport {
    /// Counters sorted by name
    pub counters: Vec<(&'static str, u64)>,
    /// Histograms sorted by name, value -> occurrences
    pub histograms: Vec<(&'static str, BTreeMap<u64, u64>)>,
}

impl MetricsReport {
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty() && self.histograms.is_empty()
    }

    pub fn counter(&self, name: &str) -> Option<u64> {
        self.counters
            .iter()
            .find(|(title, _)| *title == name)
            .map(|(_, count)| *count)
    }

    pub fn histogram(&self, name: &str) -> Option<&BTreeMap<u64, u64>> {
        self.histograms
            .iter()
            .find(|(title, _)| *title == name)
            .map(|(_, points)| points)
    }
}

/// Receives a report each time the aggregator flushes
pub trait MetricsSink: Send {
    fn emit(&mut self, report: &MetricsReport);
}

/// Writes each histogram and counter as its own `warn` record
#[derive(Debug, Default)]
pub struct TracingSink;

impl MetricsSink for TracingSink {
    fn emit(&mut self, report: &MetricsReport) {
        for (title, points) in &report.histograms {
            warn!(title, points = ?points, "metrics histogram");
        }
        for (title, count) in &report.counters {
            warn!(title, count, "metrics counter");
        }
    }
}

/// Keeps every report in memory; clones share the same buffer
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    reports: Arc<Mutex<Vec<MetricsReport>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<MetricsReport> {
        self.reports.lock().clone()
    }

    /// Sum of a counter across all reports so far
    pub fn counter_total(&self, name: &str) -> u64 {
        self.reports
            .lock()
            .iter()
            .filter_map(|r| r.counter(name))
            .sum()
    }
}

impl MetricsSink for MemorySink {
    fn emit(&mut self, report: &MetricsReport) {
        self.reports.lock().push(report.clone());
    }
}
