//! Fixed frame-rate wake time computation and drift tracking

use crate::metrics::MetricsAggregator;

/// How far an observed wake interval strayed from the frame period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drift {
    OnTime,
    Overrun,
    Underrun,
}

impl Drift {
    pub fn classify(interval_ms: u64, rate_ms: f64) -> Self {
        let interval = interval_ms as f64;
        if interval > rate_ms + 1.0 {
            Drift::Overrun
        } else if interval < (rate_ms - 1.0).floor() {
            Drift::Underrun
        } else {
            Drift::OnTime
        }
    }

    pub fn metric_name(self) -> &'static str {
        match self {
            Drift::OnTime => "tickOnTime",
            Drift::Overrun => "tickIntervalOverrun",
            Drift::Underrun => "tickIntervalUnderrun",
        }
    }
}

/// Wake schedule for one match.
///
/// Targets accumulate the fractional frame period so the average rate holds
/// even though each wake key is floored to a whole millisecond.
#[derive(Debug, Clone)]
pub struct Cadence {
    rate_ms: f64,
    next_target: f64,
    previous_wake: Option<u64>,
}

impl Cadence {
    pub fn new(rate_ms: f64, now_ms: u64) -> Self {
        Self {
            rate_ms,
            next_target: now_ms as f64 + rate_ms,
            previous_wake: None,
        }
    }

    /// Record how late or early this wake was and return the next wake key
    pub fn next_wake(&mut self, now_ms: u64, metrics: &mut MetricsAggregator) -> u64 {
        if let Some(previous) = self.previous_wake {
            let interval = now_ms.saturating_sub(previous);
            metrics.write("tickInterval", interval);
            metrics.count(Drift::classify(interval, self.rate_ms).metric_name());
        }

        let wake = self.next_target.floor() as u64;
        self.next_target += self.rate_ms;
        self.previous_wake = Some(now_ms);
        wake
    }
}
