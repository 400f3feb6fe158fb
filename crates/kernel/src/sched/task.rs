//! Task descriptors, as the scheduler sees them.

use super::prio::Priority;
use crate::platform::Tick;
use alloc::string::String;

/// Process identifier.
pub type Pid = u32;

/// The lifecycle state of a task.
///
/// The scheduler only ever *reads* the state to filter candidates; the
/// transitions happen in the process-management layers (fork, wait queues,
/// exit).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Eligible for selection.
    Running,
    /// Waiting for an event; invisible to every policy.
    Blocked,
    /// Stopped by a signal.
    Stopped,
    /// Exited, still on the queue until reaped.
    Zombie,
}

/// Scheduler-specific accounting of a task.
#[derive(Debug, Clone)]
pub struct SchedEntity {
    /// Static priority.
    pub prio: Priority,
    /// Tick at which the last slice of this task started.
    pub exec_start: Tick,
    /// Length of the last slice (weighted for aperiodic tasks).
    pub exec_runtime: Tick,
    /// Total unweighted execution time.
    pub sum_exec_runtime: Tick,
    /// Weighted accumulated execution time; the fair-policy key.
    pub vruntime: Tick,
    /// Whether this task declared itself periodic.
    pub is_periodic: bool,
    /// A periodic task whose worst-case execution time is still being
    /// measured; it is scheduled as if it were aperiodic.
    pub is_under_analysis: bool,
    /// Activation period, in ticks.
    pub period: Tick,
    /// Absolute deadline of the current activation.
    pub deadline: Tick,
    /// Tick at which the next period begins.
    pub next_period: Tick,
    /// Measured worst-case execution time.
    pub wcet: Tick,
    /// Set once the task finished its job for the current period.
    pub executed: bool,
}

impl SchedEntity {
    fn new(prio: Priority) -> Self {
        Self {
            prio,
            exec_start: 0,
            exec_runtime: 0,
            sum_exec_runtime: 0,
            vruntime: 0,
            is_periodic: false,
            is_under_analysis: false,
            period: 0,
            deadline: 0,
            next_period: 0,
            wcet: 0,
            executed: false,
        }
    }
}

/// A single schedulable task.
#[derive(Debug, Clone)]
pub struct Task {
    /// Process identifier.
    pub pid: Pid,
    /// Human-readable name, for diagnostics only.
    pub name: String,
    /// Current lifecycle state.
    pub state: TaskState,
    /// Scheduling accounting.
    pub se: SchedEntity,
}

impl Task {
    /// Create an aperiodic task with the given static priority.
    pub fn new(pid: Pid, name: impl Into<String>, prio: Priority) -> Self {
        Self {
            pid,
            name: name.into(),
            state: TaskState::Running,
            se: SchedEntity::new(prio),
        }
    }

    /// Create a periodic task.
    ///
    /// The first activation starts immediately: the deadline and the next
    /// period are one full period away from `now`. The task starts out
    /// under analysis, so it is scheduled aperiodically until its
    /// worst-case execution time has been observed.
    pub fn new_periodic(pid: Pid, name: impl Into<String>, now: Tick, period: Tick) -> Self {
        let mut task = Self::new(pid, name, Priority::DEFAULT);
        task.se.is_periodic = true;
        task.se.is_under_analysis = true;
        task.se.period = period;
        task.se.deadline = now + period;
        task.se.next_period = now + period;
        task
    }

    /// Whether the periodic policies treat this task as periodic.
    ///
    /// A periodic task still under analysis runs with the aperiodic crowd so
    /// its worst-case execution time can be measured.
    pub fn is_periodic_task(&self) -> bool {
        self.se.is_periodic && !self.se.is_under_analysis
    }

    /// Finish the analysis phase, recording the measured worst case.
    pub fn finish_analysis(&mut self) {
        self.se.is_under_analysis = false;
        self.se.wcet = self.se.wcet.max(self.se.exec_runtime);
    }
}
