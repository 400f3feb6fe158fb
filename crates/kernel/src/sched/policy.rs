//! Task selection policies.
//!
//! Exactly one policy drives a runqueue, chosen when the runqueue is built.
//! Every policy scans the queue linearly and only ever considers tasks in
//! the `Running` state; the periodic policies govern the periodic subset and
//! fall back to round-robin for the aperiodic rest, which therefore runs in
//! the slack.

use super::prio::{scale_runtime, NICE_0_WEIGHT};
use super::runqueue::RunQueue;
use super::task::{Pid, TaskState};
use crate::platform::Tick;

/// The available scheduling policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Time-sharing: rotate through the runnable tasks.
    RoundRobin,
    /// Smallest static priority first, first-come first-served on ties.
    Priority,
    /// Fair scheduling: smallest virtual runtime first.
    Fair,
    /// Earliest deadline first, with period rollover.
    Edf,
    /// Like [`Edf`](Policy::Edf), keyed on the next period instead of the
    /// deadline.
    RateMonotonic,
    /// Earliest absolute deadline, without period bookkeeping.
    Aedf,
}

impl Policy {
    /// Short name used in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Policy::RoundRobin => "RR",
            Policy::Priority => "PRIO",
            Policy::Fair => "CFS",
            Policy::Edf => "EDF",
            Policy::RateMonotonic => "RM",
            Policy::Aedf => "AEDF",
        }
    }
}

/// What to do with a periodic task that blew its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeadlineMissAction {
    /// Log a warning but keep the task eligible (the default).
    #[default]
    WarnAndRun,
    /// Drop the task from consideration until its next period.
    Skip,
}

impl RunQueue {
    /// Select the next task to run and account the outgoing one.
    ///
    /// `now` is the current value of the platform tick counter. The
    /// returned task is guaranteed to be in the `Running` state.
    ///
    /// # Panics
    ///
    /// Panics when no runnable task exists. The idle task is always
    /// runnable, so hitting this means the runqueue is corrupted.
    pub fn pick_next(&mut self, now: Tick) -> Pid {
        self.update_curr(now);

        let next = match self.policy {
            Policy::RoundRobin => self.select_rr(false),
            Policy::Priority => self.select_priority(false),
            Policy::Fair => self.select_fair(false),
            Policy::Edf => self.select_edf(now),
            Policy::RateMonotonic => self.select_rm(now),
            Policy::Aedf => self.select_aedf(now),
        };

        let next = next.expect("no runnable task on the runqueue");

        self.curr = next;
        let task = &mut self.tasks[next];
        task.se.exec_start = now;
        let pid = task.pid;

        if let Some(mut feedback) = self.feedback.take() {
            feedback.task_scheduled(pid);
            feedback.report(now, &self.tasks);
            self.feedback = Some(feedback);
        }

        pid
    }

    /// Update the accounting of the outgoing task.
    fn update_curr(&mut self, now: Tick) {
        let Some(task) = self.tasks.get_mut(self.curr) else {
            return;
        };

        let se = &mut task.se;
        se.exec_runtime = now.saturating_sub(se.exec_start);
        se.sum_exec_runtime += se.exec_runtime;

        if se.is_under_analysis {
            // the slice feeds the worst-case measurement; pessimistic, since
            // the task may have been preempted mid-job
            se.wcet = se.wcet.max(se.exec_runtime);
        }

        if !se.is_periodic {
            let weight = se.prio.weight();
            if weight != NICE_0_WEIGHT {
                se.exec_runtime = scale_runtime(se.exec_runtime, weight);
            }
            se.vruntime += se.exec_runtime;
        }
    }

    fn eligible(&self, index: usize, skip_periodic: bool) -> bool {
        let task = &self.tasks[index];
        task.state == TaskState::Running && !(skip_periodic && task.is_periodic_task())
    }

    /// Round-robin: the first eligible task after the current one.
    fn select_rr(&self, skip_periodic: bool) -> Option<usize> {
        let len = self.tasks.len();
        if len == 0 {
            return None;
        }

        for offset in 1..len {
            let index = (self.curr + offset) % len;
            if self.eligible(index, skip_periodic) {
                return Some(index);
            }
        }

        // nobody else wants the CPU; keep the current task if it still runs
        (self.curr < len && self.eligible(self.curr, skip_periodic)).then_some(self.curr)
    }

    /// Static priority: the eligible task with the smallest priority value.
    fn select_priority(&self, skip_periodic: bool) -> Option<usize> {
        let mut best: Option<usize> = None;

        for index in 0..self.tasks.len() {
            if !self.eligible(index, skip_periodic) {
                continue;
            }
            // strictly-less keeps the first-encountered task on ties, and
            // the candidate seeding the comparison is itself eligible
            let better = match best {
                None => true,
                Some(best) => self.tasks[index].se.prio < self.tasks[best].se.prio,
            };
            if better {
                best = Some(index);
            }
        }

        best
    }

    /// Fair: the eligible task with the smallest virtual runtime.
    fn select_fair(&self, skip_periodic: bool) -> Option<usize> {
        let mut best: Option<usize> = None;

        for index in 0..self.tasks.len() {
            if !self.eligible(index, skip_periodic) {
                continue;
            }
            let better = match best {
                None => true,
                Some(best) => self.tasks[index].se.vruntime < self.tasks[best].se.vruntime,
            };
            if better {
                best = Some(index);
            }
        }

        best
    }

    /// Earliest absolute deadline, without period bookkeeping.
    fn select_aedf(&self, now: Tick) -> Option<usize> {
        let mut best: Option<usize> = None;

        for index in 0..self.tasks.len() {
            let task = &self.tasks[index];
            if task.state != TaskState::Running || !task.is_periodic_task() {
                continue;
            }

            if task.se.deadline < now {
                log::warn!(
                    "task {} ('{}') passed its deadline ({} < {})",
                    task.pid,
                    task.name,
                    task.se.deadline,
                    now
                );
                if self.miss_action == DeadlineMissAction::Skip {
                    continue;
                }
            }

            let better = match best {
                None => true,
                Some(best) => task.se.deadline < self.tasks[best].se.deadline,
            };
            if better {
                best = Some(index);
            }
        }

        // no periodic work pending: the aperiodic tasks run in the slack
        best.or_else(|| self.select_rr(false))
    }

    /// Earliest deadline first, reactivating tasks whose period restarted.
    fn select_edf(&mut self, now: Tick) -> Option<usize> {
        let mut best: Option<usize> = None;

        for index in 0..self.tasks.len() {
            if self.tasks[index].state != TaskState::Running
                || !self.tasks[index].is_periodic_task()
            {
                continue;
            }

            self.try_period_rollover(index, now);

            let se = &self.tasks[index].se;
            if se.executed {
                // finished its job for the current period
                continue;
            }

            let better = match best {
                None => true,
                Some(best) => se.deadline < self.tasks[best].se.deadline,
            };
            if better {
                best = Some(index);
            }
        }

        best.or_else(|| self.select_rr(false))
    }

    /// Rate-monotonic: like EDF, keyed on the next period.
    fn select_rm(&mut self, now: Tick) -> Option<usize> {
        let mut best: Option<usize> = None;

        for index in 0..self.tasks.len() {
            if self.tasks[index].state != TaskState::Running
                || !self.tasks[index].is_periodic_task()
            {
                continue;
            }

            self.try_period_rollover(index, now);

            let se = &self.tasks[index].se;
            if se.executed {
                continue;
            }

            let better = match best {
                None => true,
                Some(best) => se.next_period < self.tasks[best].se.next_period,
            };
            if better {
                best = Some(index);
            }
        }

        best.or_else(|| self.select_rr(false))
    }

    /// Make an executed periodic task runnable again once its period rolls
    /// over, propagating its deadline and next period.
    fn try_period_rollover(&mut self, index: usize, now: Tick) {
        let task = &mut self.tasks[index];
        let se = &mut task.se;

        if se.executed && se.next_period <= now {
            se.executed = false;
            se.deadline += se.period;
            se.next_period += se.period;
            log::debug!(
                "[{}] activating task '{}' [period {}], deadline {}, next period {}, wcet {}",
                now,
                task.name,
                se.period,
                se.deadline,
                se.next_period,
                se.wcet
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::prio::Priority;
    use crate::sched::task::Task;

    fn aperiodic(pid: Pid, name: &str, prio: u16) -> Task {
        Task::new(pid, name, Priority::new(prio))
    }

    fn periodic(pid: Pid, name: &str, now: Tick, period: Tick) -> Task {
        let mut task = Task::new_periodic(pid, name, now, period);
        task.finish_analysis();
        task
    }

    fn rq(policy: Policy, tasks: Vec<Task>) -> RunQueue {
        let mut rq = RunQueue::new(policy);
        for task in tasks {
            rq.enqueue(task);
        }
        rq
    }

    #[test]
    fn round_robin_rotates() {
        let mut rq = rq(
            Policy::RoundRobin,
            vec![
                aperiodic(1, "a", 120),
                aperiodic(2, "b", 120),
                aperiodic(3, "c", 120),
            ],
        );

        assert_eq!(rq.pick_next(10), 2);
        assert_eq!(rq.pick_next(20), 3);
        assert_eq!(rq.pick_next(30), 1);
    }

    #[test]
    fn round_robin_skips_blocked_tasks() {
        let mut rq = rq(
            Policy::RoundRobin,
            vec![
                aperiodic(1, "a", 120),
                aperiodic(2, "b", 120),
                aperiodic(3, "c", 120),
            ],
        );
        rq.get_mut(2).unwrap().state = TaskState::Blocked;

        assert_eq!(rq.pick_next(10), 3);
        assert_eq!(rq.pick_next(20), 1);
    }

    #[test]
    fn round_robin_keeps_curr_when_alone() {
        let mut rq = rq(Policy::RoundRobin, vec![aperiodic(1, "idle", 139)]);
        assert_eq!(rq.pick_next(10), 1);
        assert_eq!(rq.pick_next(20), 1);
    }

    #[test]
    fn round_robin_never_starves() {
        let mut rq = rq(
            Policy::RoundRobin,
            (1..=4).map(|pid| aperiodic(pid, "t", 120)).collect(),
        );

        let mut last_seen = [0usize; 5];
        for round in 1..=12 {
            let pid = rq.pick_next(round as Tick * 10) as usize;
            if last_seen[pid] != 0 {
                assert!(round - last_seen[pid] <= 4, "task {} starved", pid);
            }
            last_seen[pid] = round;
        }
    }

    #[test]
    #[should_panic(expected = "no runnable task")]
    fn picking_from_a_dead_queue_panics() {
        let mut rq = rq(Policy::RoundRobin, vec![aperiodic(1, "a", 120)]);
        rq.get_mut(1).unwrap().state = TaskState::Blocked;
        rq.pick_next(10);
    }

    #[test]
    fn priority_selection_is_stable_on_ties() {
        // the classic pitfall: picking the head with a strict-less compare
        // must still return the first of the tied minimum tasks
        let mut rq = rq(
            Policy::Priority,
            vec![
                aperiodic(1, "init", 120),
                aperiodic(2, "shell", 120),
                aperiodic(3, "echo", 122),
                aperiodic(4, "ps", 128),
            ],
        );

        assert_eq!(rq.pick_next(10), 1);
    }

    #[test]
    fn priority_picks_the_minimum_runnable() {
        let mut rq = rq(
            Policy::Priority,
            vec![
                aperiodic(1, "a", 130),
                aperiodic(2, "b", 110),
                aperiodic(3, "c", 125),
            ],
        );
        assert_eq!(rq.pick_next(10), 2);

        // with b blocked the minimum moves
        rq.get_mut(2).unwrap().state = TaskState::Blocked;
        let min_prio = rq
            .iter()
            .filter(|task| task.state == TaskState::Running)
            .map(|task| task.se.prio)
            .min()
            .unwrap();
        let picked = rq.pick_next(20);
        assert_eq!(rq.get(picked).unwrap().se.prio, min_prio);
    }

    #[test]
    fn fair_picks_the_smallest_vruntime() {
        let mut rq = rq(
            Policy::Fair,
            vec![
                aperiodic(1, "a", 120),
                aperiodic(2, "b", 120),
                aperiodic(3, "c", 120),
            ],
        );
        rq.get_mut(1).unwrap().se.vruntime = 30;
        rq.get_mut(2).unwrap().se.vruntime = 10;
        rq.get_mut(3).unwrap().se.vruntime = 20;

        // accounting runs with a zero-length slice, so the vruntimes stand
        assert_eq!(rq.pick_next(0), 2);
    }

    #[test]
    fn fair_shares_the_cpu_between_equal_weights() {
        let mut rq = rq(
            Policy::Fair,
            vec![
                aperiodic(1, "a", 120),
                aperiodic(2, "b", 120),
                aperiodic(3, "c", 120),
            ],
        );

        const SLICE: Tick = 10;
        for round in 1..=30 {
            rq.pick_next(round * SLICE);
        }

        let runtimes: Vec<Tick> = rq.iter().map(|task| task.se.sum_exec_runtime).collect();
        let spread = runtimes.iter().max().unwrap() - runtimes.iter().min().unwrap();
        assert!(spread <= SLICE, "unfair spread {}", spread);
    }

    #[test]
    fn fair_inflates_vruntime_of_nice_tasks() {
        let mut rq = rq(
            Policy::Fair,
            vec![aperiodic(1, "nice", 139), aperiodic(2, "normal", 120)],
        );

        // pid 1 is current and runs its first slice of 15 ticks
        rq.pick_next(0);
        let _ = rq.pick_next(15);

        let nice = rq.get(1).unwrap();
        // weight 15 inflates the 15-tick slice to a full nice-0 quantum
        assert_eq!(nice.se.vruntime, 1024);
        assert_eq!(nice.se.sum_exec_runtime, 15);
    }

    #[test]
    fn edf_reactivates_a_task_whose_period_rolled_over() {
        let mut sensor = periodic(2, "sensor", 0, 100);
        sensor.se.executed = true;

        let mut rq = rq(Policy::Edf, vec![aperiodic(1, "idle", 139), sensor]);

        assert_eq!(rq.pick_next(100), 2);
        let sensor = rq.get(2).unwrap();
        assert!(!sensor.se.executed);
        assert_eq!(sensor.se.deadline, 200);
        assert_eq!(sensor.se.next_period, 200);
    }

    #[test]
    fn edf_prefers_the_earliest_deadline() {
        let mut rq = rq(
            Policy::Edf,
            vec![
                aperiodic(1, "idle", 139),
                periodic(2, "slow", 0, 200),
                periodic(3, "fast", 0, 50),
            ],
        );

        assert_eq!(rq.pick_next(10), 3);
    }

    #[test]
    fn edf_skips_tasks_that_already_executed() {
        let mut done = periodic(2, "done", 0, 100);
        done.se.executed = true;

        let mut rq = rq(
            Policy::Edf,
            vec![aperiodic(1, "idle", 139), done, periodic(3, "due", 0, 150)],
        );

        // pid 2 has the earlier deadline but already ran this period
        assert_eq!(rq.pick_next(10), 3);
    }

    #[test]
    fn edf_falls_back_to_round_robin() {
        let mut rq = rq(
            Policy::Edf,
            vec![aperiodic(1, "a", 120), aperiodic(2, "b", 120)],
        );
        assert_eq!(rq.pick_next(10), 2);
        assert_eq!(rq.pick_next(20), 1);
    }

    #[test]
    fn edf_schedules_under_analysis_tasks_aperiodically() {
        let mut rq = rq(
            Policy::Edf,
            vec![
                aperiodic(1, "idle", 139),
                Task::new_periodic(2, "fresh", 0, 100),
            ],
        );

        // still under analysis: no periodic candidate, round-robin runs it
        assert_eq!(rq.pick_next(10), 2);
        assert_eq!(rq.pick_next(20), 1);
    }

    #[test]
    fn edf_meets_every_deadline_of_a_feasible_set() {
        let mut rq = rq(
            Policy::Edf,
            vec![
                aperiodic(1, "idle", 139),
                periodic(2, "short", 0, 4),
                periodic(3, "long", 0, 5),
            ],
        );

        let cost = |pid: Pid| match pid {
            2 => 1,
            3 => 2,
            _ => 0,
        };

        let mut now: Tick = 0;
        while now < 200 {
            // waitperiod wakeups: a finished job sleeps until its period
            for pid in [2, 3] {
                let task = rq.get_mut(pid).unwrap();
                if task.state == TaskState::Blocked && task.se.next_period <= now {
                    task.state = TaskState::Running;
                }
            }

            let pid = rq.pick_next(now);
            if pid == 1 {
                now += 1;
                continue;
            }

            // run the job to completion and put it to sleep
            now += cost(pid);
            let task = rq.get_mut(pid).unwrap();
            assert!(
                now <= task.se.deadline,
                "task {} missed its deadline at {}",
                pid,
                now
            );
            task.se.executed = true;
            task.state = TaskState::Blocked;
        }
    }

    #[test]
    fn rate_monotonic_keys_on_the_next_period() {
        let mut short = periodic(2, "short", 0, 50);
        let mut long = periodic(3, "long", 0, 200);
        // deadlines would order them the other way around
        short.se.deadline = 300;
        long.se.deadline = 100;

        let mut rq = rq(
            Policy::RateMonotonic,
            vec![aperiodic(1, "idle", 139), short, long],
        );

        assert_eq!(rq.pick_next(10), 2);
    }

    #[test]
    fn rate_monotonic_rolls_periods_over() {
        let mut sensor = periodic(2, "sensor", 0, 60);
        sensor.se.executed = true;

        let mut rq = rq(Policy::RateMonotonic, vec![aperiodic(1, "idle", 139), sensor]);

        assert_eq!(rq.pick_next(60), 2);
        let sensor = rq.get(2).unwrap();
        assert_eq!(sensor.se.next_period, 120);
        assert_eq!(sensor.se.deadline, 120);
    }

    #[test]
    fn aedf_runs_a_missed_task_by_default() {
        let mut rq = rq(
            Policy::Aedf,
            vec![aperiodic(1, "idle", 139), periodic(2, "late", 0, 50)],
        );

        // deadline 50 is long gone, but the task still runs
        assert_eq!(rq.pick_next(100), 2);
    }

    #[test]
    fn aedf_can_skip_missed_tasks() {
        let mut rq = rq(
            Policy::Aedf,
            vec![
                aperiodic(1, "idle", 139),
                periodic(2, "late", 0, 50),
                periodic(3, "ok", 0, 500),
            ],
        );
        rq.set_deadline_miss_action(DeadlineMissAction::Skip);

        // pid 2 blew its deadline and is skipped in favour of pid 3
        assert_eq!(rq.pick_next(100), 3);
    }

    #[test]
    fn aedf_falls_back_to_round_robin() {
        let mut rq = rq(
            Policy::Aedf,
            vec![aperiodic(1, "idle", 139), aperiodic(2, "worker", 120)],
        );
        assert_eq!(rq.pick_next(10), 2);
    }

    #[test]
    fn accounting_tracks_the_outgoing_task() {
        let mut rq = rq(
            Policy::RoundRobin,
            vec![aperiodic(1, "a", 120), aperiodic(2, "b", 120)],
        );

        // pid 2 runs 0..25, then pid 1 runs 25..40
        assert_eq!(rq.pick_next(0), 2);
        assert_eq!(rq.pick_next(25), 1);
        assert_eq!(rq.pick_next(40), 2);

        let b = rq.get(2).unwrap();
        assert_eq!(b.se.sum_exec_runtime, 25);
        assert_eq!(b.se.vruntime, 25);
        assert_eq!(b.se.exec_start, 40);
    }

    #[test]
    fn analysis_slices_feed_the_worst_case() {
        let mut rq = rq(
            Policy::Edf,
            vec![
                aperiodic(1, "idle", 139),
                Task::new_periodic(2, "fresh", 0, 100),
            ],
        );

        assert_eq!(rq.pick_next(0), 2);
        rq.pick_next(7); // the analysed task ran for 7 ticks

        let fresh = rq.get_mut(2).unwrap();
        assert_eq!(fresh.se.wcet, 7);
        fresh.finish_analysis();
        assert!(fresh.is_periodic_task());
    }
}
