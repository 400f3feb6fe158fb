//! The runqueue: every task known to the scheduler, in insertion order.

use super::feedback::Feedback;
use super::policy::{DeadlineMissAction, Policy};
use super::task::{Pid, Task, TaskState};
use crate::platform::Tick;
use alloc::vec::Vec;

/// The set of all tasks plus the currently running one.
///
/// The queue holds every task regardless of its state; the policies skip
/// what is not runnable. Insertion order is preserved and is what makes the
/// priority and fair tie-breaks deterministic.
pub struct RunQueue {
    pub(super) tasks: Vec<Task>,
    pub(super) curr: usize,
    pub(super) policy: Policy,
    pub(super) miss_action: DeadlineMissAction,
    pub(super) feedback: Option<Feedback>,
}

impl RunQueue {
    /// Create an empty runqueue driven by the given policy.
    pub fn new(policy: Policy) -> Self {
        Self {
            tasks: Vec::new(),
            curr: 0,
            policy,
            miss_action: DeadlineMissAction::default(),
            feedback: None,
        }
    }

    /// What happens to a periodic task that blew its deadline.
    pub fn set_deadline_miss_action(&mut self, action: DeadlineMissAction) {
        self.miss_action = action;
    }

    /// Start collecting scheduling statistics, reported every `interval`
    /// ticks.
    pub fn enable_feedback(&mut self, interval: Tick) {
        self.feedback = Some(Feedback::new(self.policy, interval));
    }

    /// The policy driving this runqueue.
    pub fn policy(&self) -> Policy {
        self.policy
    }

    /// Add a task to the queue.
    ///
    /// This is the `NEW -> RUNNING` edge: whatever the task was before, it
    /// enters the queue runnable. The first task ever enqueued becomes the
    /// current task.
    pub fn enqueue(&mut self, mut task: Task) {
        task.state = TaskState::Running;
        self.tasks.push(task);
    }

    /// Remove a zombie from the queue, returning its descriptor.
    ///
    /// Returns `None` if the pid is unknown, the task has not exited yet, or
    /// it is (impossibly) still the current task.
    pub fn reap(&mut self, pid: Pid) -> Option<Task> {
        let index = self.tasks.iter().position(|task| task.pid == pid)?;
        if self.tasks[index].state != TaskState::Zombie || index == self.curr {
            return None;
        }

        if index < self.curr {
            self.curr -= 1;
        }
        if let Some(feedback) = self.feedback.as_mut() {
            feedback.task_removed(pid);
        }

        Some(self.tasks.remove(index))
    }

    /// The currently running task.
    pub fn curr(&self) -> Option<&Task> {
        self.tasks.get(self.curr)
    }

    /// Look up a task by pid.
    pub fn get(&self, pid: Pid) -> Option<&Task> {
        self.tasks.iter().find(|task| task.pid == pid)
    }

    /// Look up a task by pid, mutably.
    pub fn get_mut(&mut self, pid: Pid) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|task| task.pid == pid)
    }

    /// Number of tasks on the queue, in any state.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the queue holds no tasks at all.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Iterate over all tasks in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }
}
