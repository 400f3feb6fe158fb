//! Inbound platform dependencies of the kernel core.
//!
//! The core never talks to hardware directly. The embedding kernel installs
//! a [`Platform`] once during early boot; until then a no-op fallback keeps
//! the core usable on the host (and under `cargo test`).

use spin::Once;

/// Monotonic time, in timer ticks since boot.
pub type Tick = u64;

/// Opaque interrupt state returned by [`Platform::irq_save`].
pub type IrqState = usize;

/// The operations the platform layer provides to the core.
pub trait Platform: Send + Sync {
    /// Read the monotonic tick counter.
    fn current_tick(&self) -> Tick;

    /// Disable interrupts and return the previous interrupt state.
    fn irq_save(&self) -> IrqState;

    /// Restore the interrupt state returned by an earlier [`irq_save`].
    ///
    /// [`irq_save`]: Platform::irq_save
    fn irq_restore(&self, state: IrqState);
}

/// Fallback used before [`set_platform`] was called.
struct NoopPlatform;

impl Platform for NoopPlatform {
    fn current_tick(&self) -> Tick {
        0
    }

    fn irq_save(&self) -> IrqState {
        0
    }

    fn irq_restore(&self, _state: IrqState) {}
}

static PLATFORM: Once<&'static dyn Platform> = Once::new();

/// Install the platform implementation.
///
/// Must be called once during early boot, before the first timer interrupt.
/// Later calls are ignored.
pub fn set_platform(platform: &'static dyn Platform) {
    PLATFORM.call_once(|| platform);
}

fn get() -> &'static dyn Platform {
    PLATFORM.get().copied().unwrap_or(&NoopPlatform)
}

/// Read the monotonic tick counter of the platform timer.
pub fn current_tick() -> Tick {
    get().current_tick()
}

pub(crate) fn irq_save() -> IrqState {
    get().irq_save()
}

pub(crate) fn irq_restore(state: IrqState) {
    get().irq_restore(state)
}
