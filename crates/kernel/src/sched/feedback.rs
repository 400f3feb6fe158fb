//! Scheduling-statistics feedback.
//!
//! Counts how often each task wins a scheduling decision and periodically
//! reports every task's share of the context switches. The counters are
//! zeroed after every report, so each report covers the most recent
//! interval only. Purely diagnostic: nothing here feeds back into the
//! selection itself.

use super::policy::Policy;
use super::task::{Pid, Task};
use crate::platform::Tick;
use alloc::collections::BTreeMap;

/// Occurrence statistics of the scheduling decisions.
pub struct Feedback {
    policy: Policy,
    interval: Tick,
    next_report: Tick,
    total: u64,
    occurrences: BTreeMap<Pid, u64>,
}

impl Feedback {
    pub(super) fn new(policy: Policy, interval: Tick) -> Self {
        Self {
            policy,
            interval,
            // the first report is due one full interval after enabling
            next_report: interval,
            total: 0,
            occurrences: BTreeMap::new(),
        }
    }

    /// How often the given task was scheduled in the current reporting
    /// interval.
    pub fn occurrences(&self, pid: Pid) -> u64 {
        self.occurrences.get(&pid).copied().unwrap_or(0)
    }

    /// Total number of scheduling decisions in the current reporting
    /// interval.
    pub fn total(&self) -> u64 {
        self.total
    }

    pub(super) fn task_scheduled(&mut self, pid: Pid) {
        *self.occurrences.entry(pid).or_insert(0) += 1;
        self.total += 1;
    }

    pub(super) fn task_removed(&mut self, pid: Pid) {
        if let Some(occur) = self.occurrences.remove(&pid) {
            self.total -= occur;
        }
    }

    /// Emit the report once the interval has elapsed.
    ///
    /// The counters restart from zero afterwards, so the next report covers
    /// only the decisions made since this one.
    pub(super) fn report(&mut self, now: Tick, tasks: &[Task]) {
        if now < self.next_report {
            return;
        }
        self.next_report = now + self.interval;

        if self.total == 0 {
            return;
        }

        log::info!("scheduling statistics ({})", self.policy.name());
        for task in tasks {
            let share = self.occurrences(task.pid) as f64 * 100.0 / self.total as f64;
            log::info!("[{:3}] | {:<18} | -> TCPU: {:.2}%", task.pid, task.name, share);
        }

        self.total = 0;
        self.occurrences.clear();
    }
}
