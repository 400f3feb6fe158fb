//! Synchronization primitives.
//!
//! The kernel runs a single thread of control, so the only "race" that
//! exists is between process context and an interrupt handler. Every
//! critical section is therefore guarded by masking interrupts on entry and
//! restoring the previous state on exit, on every exit path.
//!
//! [`IrqMutex`] packages that discipline as a [`lock_api`] mutex: taking the
//! lock saves and disables interrupts, dropping the guard restores them.

use crate::platform;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub use spin::{Lazy, Once};

/// A mutex whose critical section runs with interrupts disabled.
pub type IrqMutex<T> = lock_api::Mutex<RawIrqMutex, T>;

/// Guard returned by [`IrqMutex::lock`].
pub type IrqMutexGuard<'a, T> = lock_api::MutexGuard<'a, RawIrqMutex, T>;

/// Raw mutex that masks interrupts for as long as it is held.
///
/// The saved interrupt state lives inside the mutex itself; this is sound
/// because there is exactly one holder at a time.
pub struct RawIrqMutex {
    locked: AtomicBool,
    saved: AtomicUsize,
}

unsafe impl lock_api::RawMutex for RawIrqMutex {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Self {
        locked: AtomicBool::new(false),
        saved: AtomicUsize::new(0),
    };

    type GuardMarker = lock_api::GuardSend;

    fn lock(&self) {
        let state = platform::irq_save();

        // With interrupts masked on a single CPU this never actually spins,
        // it only catches re-entrancy bugs.
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            core::hint::spin_loop();
        }

        self.saved.store(state, Ordering::Relaxed);
    }

    fn try_lock(&self) -> bool {
        let state = platform::irq_save();

        if self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            self.saved.store(state, Ordering::Relaxed);
            true
        } else {
            platform::irq_restore(state);
            false
        }
    }

    unsafe fn unlock(&self) {
        let state = self.saved.load(Ordering::Relaxed);
        self.locked.store(false, Ordering::Release);
        platform::irq_restore(state);
    }
}
