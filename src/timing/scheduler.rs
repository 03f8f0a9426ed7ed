//! Cooperative single-threaded timer multiplexer
//!
//! Every running match shares one scheduler instead of holding a timer of its
//! own. Tasks are keyed by the absolute millisecond they want to run at; a
//! poll drains every due millisecond in ascending order, and a task asks to
//! run again by returning its next wake time.

use std::collections::BTreeMap;

use tracing::trace;

use crate::util::time::Clock;

/// Default wall-clock budget for one poll
pub const DEFAULT_POLL_BUDGET_MS: u64 = 2;

/// What a single poll did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    /// Tasks executed
    pub executed: usize,
    /// The poll stopped early because it ran past its budget
    pub budget_exhausted: bool,
}

pub struct Scheduler<K> {
    entries: BTreeMap<u64, Vec<K>>,
    /// Every millisecond before this has been drained
    last_processed: u64,
    budget_ms: u64,
}

impl<K> Scheduler<K> {
    pub fn new(start_ms: u64, budget_ms: u64) -> Self {
        Self {
            entries: BTreeMap::new(),
            last_processed: start_ms,
            budget_ms,
        }
    }

    /// Register `task` to run at `when_ms`. Times already in the past are run
    /// on the next poll.
    pub fn add(&mut self, task: K, when_ms: u64) {
        self.entries.entry(when_ms).or_default().push(task);
    }

    /// Total tasks waiting
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_time(&self, when_ms: u64) -> bool {
        self.entries.contains_key(&when_ms)
    }

    /// Earliest registered wake time
    pub fn next_due(&self) -> Option<u64> {
        self.entries.keys().next().copied()
    }

    pub fn last_processed(&self) -> u64 {
        self.last_processed
    }

    /// Run every task whose time is before the poll's start, oldest first.
    ///
    /// `run` returns the task's next wake time, if any. Re-registrations are
    /// applied once the drain pass is over, so no task runs twice per poll.
    /// The pass stops when the wall clock moves more than the budget past the
    /// poll's start; the remaining entries wait for the next poll.
    pub fn poll<F>(&mut self, clock: &dyn Clock, mut run: F) -> PollReport
    where
        F: FnMut(&K) -> Option<u64>,
    {
        let start = clock.now_ms();
        let mut report = PollReport::default();
        let mut rescheduled = Vec::new();

        loop {
            if clock.now_ms().saturating_sub(start) > self.budget_ms {
                report.budget_exhausted = true;
                break;
            }

            let Some(entry) = self.entries.first_entry() else {
                break;
            };
            let when = *entry.key();
            if when >= start {
                break;
            }

            for task in entry.remove() {
                report.executed += 1;
                if let Some(next) = run(&task) {
                    rescheduled.push((task, next));
                }
            }
            self.last_processed = self.last_processed.max(when + 1);
        }

        if !report.budget_exhausted {
            self.last_processed = self.last_processed.max(start);
        }

        for (task, next) in rescheduled {
            self.add(task, next);
        }

        if report.executed > 0 {
            trace!(
                executed = report.executed,
                budget_exhausted = report.budget_exhausted,
                pending = self.entries.len(),
                "Scheduler poll"
            );
        }

        report
    }
}
