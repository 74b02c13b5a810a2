/*
 * Interrupt Masking
 *
 * This module provides utilities for globally masking CPU interrupts. It is
 * the only way to build a true critical section: a plain lock does not help
 * when an interrupt handler on the same core touches the same state.
 *
 * Why this is important:
 * - GPIO configuration registers are shared by every serial port and are
 *   read-modify-written during `SerialPort::start()`
 * - Task-side queue operations share a spin lock with interrupt handlers;
 *   holding it with interrupts enabled could deadlock the core
 * - Read-modify-write of USART control registers races with the ISR that
 *   disarms the transmit interrupt
 *
 * On Cortex-M targets this drives PRIMASK directly. On every other target
 * masking is emulated with a nesting counter so the same code paths run and
 * tests can observe whether a section is masked. Test builds keep one
 * counter per thread: each test thread stands in for its own core.
 */

/// Mask interrupts globally.
///
/// Returns true if interrupts were enabled before the call.
pub fn disable() -> bool {
    imp::disable()
}

/// Undo a `disable()` that returned `were_enabled`.
pub fn restore(were_enabled: bool) {
    imp::restore(were_enabled)
}

/// Check if interrupts are currently enabled
pub fn are_enabled() -> bool {
    imp::are_enabled()
}

/// Sleep until the next interrupt (WFI); only a CPU hint on the host.
pub fn wait_for_interrupt() {
    imp::wait_for_interrupt()
}

/// Execute a closure with interrupts disabled
///
/// Nests correctly: interrupts come back on only when the outermost section
/// ends.
pub fn without_interrupts<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = DisableInterrupts::new();
    f()
}

/// RAII guard that disables interrupts for its lifetime
///
/// Interrupts are disabled when this guard is created and restored to their
/// previous state when it's dropped, even on an early return.
pub struct DisableInterrupts {
    were_enabled: bool,
}

impl DisableInterrupts {
    /// Create a new interrupt guard, disabling interrupts
    pub fn new() -> Self {
        Self {
            were_enabled: disable(),
        }
    }
}

impl Default for DisableInterrupts {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DisableInterrupts {
    fn drop(&mut self) {
        restore(self.were_enabled);
    }
}

#[cfg(all(target_arch = "arm", target_os = "none"))]
mod imp {
    use core::arch::asm;

    #[inline(always)]
    fn primask() -> u32 {
        let value: u32;
        unsafe {
            asm!("mrs {}, PRIMASK", out(reg) value, options(nomem, nostack, preserves_flags));
        }
        value
    }

    #[inline(always)]
    pub fn are_enabled() -> bool {
        primask() & 1 == 0
    }

    #[inline(always)]
    pub fn disable() -> bool {
        let were_enabled = are_enabled();
        unsafe {
            asm!("cpsid i", options(nomem, nostack, preserves_flags));
        }
        were_enabled
    }

    #[inline(always)]
    pub fn restore(were_enabled: bool) {
        if were_enabled {
            unsafe {
                asm!("cpsie i", options(nomem, nostack, preserves_flags));
            }
        }
    }

    #[inline(always)]
    pub fn wait_for_interrupt() {
        // Wakes on a pending interrupt even while PRIMASK is set
        unsafe {
            asm!("wfi", options(nomem, nostack, preserves_flags));
        }
    }
}


#[cfg(all(not(test), not(all(target_arch = "arm", target_os = "none"))))]
mod imp {
    use core::sync::atomic::{AtomicUsize, Ordering};

    /// Number of open masked sections (emulated PRIMASK)
    static DEPTH: AtomicUsize = AtomicUsize::new(0);

    pub fn are_enabled() -> bool {
        DEPTH.load(Ordering::Acquire) == 0
    }

    pub fn disable() -> bool {
        DEPTH.fetch_add(1, Ordering::AcqRel) == 0
    }

    pub fn restore(_were_enabled: bool) {
        DEPTH.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn wait_for_interrupt() {
        core::hint::spin_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_report_masked_while_open() {
        without_interrupts(|| {
            assert!(!are_enabled());
            without_interrupts(|| assert!(!are_enabled()));
            assert!(!are_enabled());
        });
        assert!(are_enabled());
    }

    #[test]
    fn another_threads_section_does_not_mask_this_one() {
        without_interrupts(|| {
            let elsewhere = std::thread::spawn(are_enabled).join().unwrap();
            assert!(elsewhere);
            assert!(!are_enabled());
        });
    }
}
