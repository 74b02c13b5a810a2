/*
 * System Tick and Timeouts
 *
 * This module provides the tick counter every blocking wait in the I/O core
 * is measured against, and the `Timeout` type callers pass to blocking calls.
 *
 * ## Description
 *
 * ### Core Functionality:
 * - **Tick Counter**: A 32-bit wrapping counter advanced once per SysTick
 *   interrupt via `on_tick()`; `start_ticks()` programs the tick source
 *   for `TICK_RATE_HZ`
 * - **Pluggable Clock**: An RTOS glue layer (or the host test harness) can
 *   install its own `Clock` so waits use the scheduler's notion of time and
 *   yield the CPU between polls instead of spinning
 * - **Deadlines**: `Timeout` converts into a `Deadline` that knows when a
 *   wait has to give up
 *
 * ### Timer Resolution:
 * - **Tick Rate**: `config::TICK_RATE_HZ` (100Hz, 10ms per tick)
 * - **Wrap-around**: all comparisons use wrapping arithmetic, so a counter
 *   overflow after ~497 days does not break pending waits
 *
 * There is no cancellation token anywhere in the I/O core: a caller abandons
 * a wait by letting its timeout expire.
 */

use core::sync::atomic::{AtomicU32, Ordering};

use spin::Once;

use crate::arch::TickSource;
use crate::arch::interrupts::wait_for_interrupt;
use crate::config::TICK_RATE_HZ;

/// Ticks since boot (wrapping)
static TICKS: AtomicU32 = AtomicU32::new(0);

/// Clock installed by the platform, if any
static CLOCK: Once<&'static dyn Clock> = Once::new();

/// Source of time for blocking waits.
pub trait Clock: Sync {
    /// Current tick count (wrapping).
    fn now(&self) -> u32;

    /// Called between polls of a blocked wait. The default just hints the
    /// CPU; an RTOS clock yields to the scheduler here.
    fn idle(&self) {
        core::hint::spin_loop();
    }
}

/// Default clock backed by the SysTick counter.
struct TickCounter;

impl Clock for TickCounter {
    fn now(&self) -> u32 {
        TICKS.load(Ordering::Acquire)
    }

    /// Sleeps until the next interrupt; the tick interrupt bounds the nap.
    fn idle(&self) {
        wait_for_interrupt();
    }
}

static TICK_COUNTER: TickCounter = TickCounter;

/// Called from the SysTick interrupt handler exactly once per tick.
pub fn on_tick() {
    TICKS.fetch_add(1, Ordering::AcqRel);
}

/// Program `source` to call `on_tick` `TICK_RATE_HZ` times per second.
pub fn start_ticks(source: &dyn TickSource, core_clock_hz: u32) {
    let reload = (core_clock_hz / TICK_RATE_HZ).saturating_sub(1);
    source.start_periodic(reload);
}

/// Install the platform clock. Only the first call has an effect.
pub fn install_clock(clock: &'static dyn Clock) {
    CLOCK.call_once(|| clock);
}

fn clock() -> &'static dyn Clock {
    match CLOCK.get() {
        Some(clock) => *clock,
        None => &TICK_COUNTER,
    }
}

/// Current tick count.
pub fn now() -> u32 {
    clock().now()
}

/// Give up the CPU briefly while waiting.
pub fn idle() {
    clock().idle()
}

/// How long a blocking call may wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Do not wait at all: check once and report "would block".
    Immediate,
    /// Wait at most this many ticks.
    Ticks(u32),
    /// Wait until the condition holds.
    Forever,
}

impl Timeout {
    /// Convert milliseconds to ticks, rounding down like the RTOS does.
    pub const fn from_millis(ms: u32) -> Self {
        let ticks = (ms as u64 * TICK_RATE_HZ as u64 / 1000) as u32;
        if ticks == 0 {
            Timeout::Immediate
        } else {
            Timeout::Ticks(ticks)
        }
    }

    /// Start the clock on this timeout.
    pub fn deadline(self) -> Deadline<'static> {
        self.deadline_on(clock())
    }

    /// Start this timeout against `clock`.
    pub fn deadline_on(self, clock: &dyn Clock) -> Deadline<'_> {
        let (start, ticks) = match self {
            Timeout::Immediate => (0, Some(0)),
            Timeout::Ticks(ticks) => (clock.now(), Some(ticks)),
            Timeout::Forever => (0, None),
        };
        Deadline {
            clock,
            start,
            ticks,
        }
    }
}

/// A started timeout.
#[derive(Clone, Copy)]
pub struct Deadline<'a> {
    clock: &'a dyn Clock,
    start: u32,
    ticks: Option<u32>,
}

impl Deadline<'_> {
    /// True once the wait has to give up.
    pub fn expired(&self) -> bool {
        match self.ticks {
            None => false,
            Some(0) => true,
            Some(ticks) => self.clock.now().wrapping_sub(self.start) >= ticks,
        }
    }
}

/// Poll `attempt` until it yields a value or the timeout expires.
///
/// `attempt` always runs at least once, so an `Immediate` wait still
/// observes a condition that already holds. It never runs again after the
/// deadline has been seen, so a value that shows up later is not returned
/// by this call.
pub fn block_until<T>(timeout: Timeout, attempt: impl FnMut() -> Option<T>) -> Option<T> {
    block_until_on(clock(), timeout, attempt)
}

/// `block_until` measured against `clock`.
pub fn block_until_on<T>(
    clock: &dyn Clock,
    timeout: Timeout,
    mut attempt: impl FnMut() -> Option<T>,
) -> Option<T> {
    let deadline = timeout.deadline_on(clock);
    loop {
        if let Some(value) = attempt() {
            return Some(value);
        }
        if deadline.expired() {
            return None;
        }
        clock.idle();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_millis_rounds_down_to_ticks() {
        assert_eq!(Timeout::from_millis(0), Timeout::Immediate);
        assert_eq!(Timeout::from_millis(5), Timeout::Immediate);
        assert_eq!(Timeout::from_millis(10), Timeout::Ticks(1));
        assert_eq!(Timeout::from_millis(1000), Timeout::Ticks(100));
    }

    #[test]
    fn immediate_deadline_is_already_expired() {
        assert!(Timeout::Immediate.deadline().expired());
        assert!(!Timeout::Forever.deadline().expired());
    }

    #[test]
    fn block_until_checks_once_for_immediate() {
        let mut calls = 0;
        let result: Option<()> = block_until(Timeout::Immediate, || {
            calls += 1;
            None
        });
        assert_eq!(result, None);
        assert_eq!(calls, 1);

        let result = block_until(Timeout::Immediate, || Some(7));
        assert_eq!(result, Some(7));
    }

    #[test]
    fn block_until_gives_up_after_ticks() {
        crate::tests::mock::init();
        let result: Option<()> = block_until(Timeout::Ticks(20), || None);
        assert_eq!(result, None);
    }

    /// Spins instead of sleeping, so waits only end when ticks arrive.
    struct Ticking;

    impl Clock for Ticking {
        fn now(&self) -> u32 {
            TICK_COUNTER.now()
        }
    }

    // The only test that advances the SysTick counter.
    #[test]
    fn tick_waits_expire_as_the_counter_advances() {
        let deadline = Timeout::Ticks(3).deadline_on(&Ticking);
        on_tick();
        on_tick();
        assert!(!deadline.expired());
        on_tick();
        assert!(deadline.expired());

        // Each poll stands in for a tick interrupt
        let mut polls = 0;
        let result: Option<()> = block_until_on(&Ticking, Timeout::Ticks(5), || {
            polls += 1;
            on_tick();
            None
        });
        assert_eq!(result, None);
        assert_eq!(polls, 5);
    }

    struct Recorded(AtomicU32);

    impl TickSource for Recorded {
        fn start_periodic(&self, reload: u32) {
            self.0.store(reload, Ordering::SeqCst);
        }
    }

    #[test]
    fn tick_source_reload_matches_the_tick_rate() {
        let source = Recorded(AtomicU32::new(0));
        start_ticks(&source, 72_000_000);
        assert_eq!(source.0.load(Ordering::SeqCst), 719_999);
        start_ticks(&source, 8_000_000);
        assert_eq!(source.0.load(Ordering::SeqCst), 79_999);
    }
}
