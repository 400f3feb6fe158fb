//! The process scheduler.
//!
//! All tasks live on a single [`RunQueue`]; at every scheduling point the
//! platform layer asks it to [`pick_next`](RunQueue::pick_next) and context
//! switches to whatever comes back. Which task that is depends on the
//! [`Policy`] the runqueue was built with; the six policies share the queue
//! format and only differ in the selection scan.
//!
//! The kernel-wide runqueue lives behind [`init`] and the free functions of
//! this module, which take the interrupt-masked lock around every
//! operation.

pub mod feedback;
pub mod policy;
pub mod prio;
pub mod runqueue;
pub mod task;

pub use policy::{DeadlineMissAction, Policy};
pub use prio::{Priority, NICE_0_WEIGHT};
pub use runqueue::RunQueue;
pub use task::{Pid, Task, TaskState};

use crate::platform;
use crate::sync::{IrqMutex, Once};

static RUNQUEUE: Once<IrqMutex<RunQueue>> = Once::new();

/// Initialise the kernel-wide runqueue with the given policy.
///
/// Must be called once during early boot; later calls are ignored.
pub fn init(policy: Policy) {
    if RUNQUEUE.is_completed() {
        log::warn!("the kernel-wide runqueue is already initialised");
        return;
    }

    log::info!("initialised the scheduler with the {} policy", policy.name());
    RUNQUEUE.call_once(|| IrqMutex::new(RunQueue::new(policy)));
}

/// Run `f` with the kernel-wide runqueue locked and interrupts masked.
///
/// # Panics
///
/// Panics when the scheduler was never initialised; there is no meaningful
/// way to limp on without a runqueue.
pub fn with_runqueue<R>(f: impl FnOnce(&mut RunQueue) -> R) -> R {
    let runqueue = RUNQUEUE
        .get()
        .expect("the scheduler was used before sched::init");
    f(&mut runqueue.lock())
}

/// Select the next task to run, reading the platform tick counter.
///
/// This is what the timer interrupt calls on every scheduling point.
pub fn pick_next() -> Pid {
    with_runqueue(|rq| rq.pick_next(platform::current_tick()))
}
