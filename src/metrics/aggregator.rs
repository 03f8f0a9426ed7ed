//! Time-gated counter and histogram aggregation

use std::collections::{BTreeMap, HashMap};

use super::sink::{MetricsReport, MetricsSink};
use crate::util::time::SharedClock;

/// Accumulates counters and value histograms and hands them to a sink at
/// most once per report interval.
///
/// Recording never waits on the sink: a flush only happens inline when the
/// interval has passed, and otherwise the call is a map update.
pub struct MetricsAggregator {
    counters: HashMap<&'static str, u64>,
    histograms: HashMap<&'static str, BTreeMap<u64, u64>>,
    report_interval_ms: u64,
    last_flush_ms: u64,
    flushes: u64,
    clock: SharedClock,
    sink: Box<dyn MetricsSink>,
}

impl MetricsAggregator {
    pub fn new(report_interval_ms: u64, clock: SharedClock, sink: Box<dyn MetricsSink>) -> Self {
        let last_flush_ms = clock.now_ms();
        Self {
            counters: HashMap::new(),
            histograms: HashMap::new(),
            report_interval_ms,
            last_flush_ms,
            flushes: 0,
            clock,
            sink,
        }
    }

    /// Increment a named counter
    pub fn count(&mut self, name: &'static str) {
        *self.counters.entry(name).or_insert(0) += 1;
        self.maybe_flush();
    }

    /// Record one occurrence of `value` in a named histogram
    pub fn write(&mut self, name: &'static str, value: u64) {
        *self
            .histograms
            .entry(name)
            .or_default()
            .entry(value)
            .or_insert(0) += 1;
        self.maybe_flush();
    }

    /// Flush if the report interval has elapsed. Returns whether it flushed.
    pub fn maybe_flush(&mut self) -> bool {
        let now = self.clock.now_ms();
        if now.saturating_sub(self.last_flush_ms) < self.report_interval_ms {
            return false;
        }
        self.flush_at(now);
        true
    }

    /// Flush regardless of the interval (shutdown)
    pub fn flush(&mut self) {
        let now = self.clock.now_ms();
        self.flush_at(now);
    }

    /// Number of reports emitted so far
    pub fn flushes(&self) -> u64 {
        self.flushes
    }

    pub fn pending_counter(&self, name: &str) -> Option<u64> {
        self.counters.get(name).copied()
    }

    fn flush_at(&mut self, now: u64) {
        self.last_flush_ms = now;

        let mut counters: Vec<_> = self.counters.drain().collect();
        counters.sort_unstable_by_key(|(name, _)| *name);
        let mut histograms: Vec<_> = self.histograms.drain().collect();
        histograms.sort_unstable_by_key(|(name, _)| *name);

        let report = MetricsReport {
            counters,
            histograms,
        };
        if report.is_empty() {
            return;
        }

        self.flushes += 1;
        self.sink.emit(&report);
    }
}
