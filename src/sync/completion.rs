use core::sync::atomic::{AtomicBool, Ordering};

use crate::io::Errno;
use crate::utils::timer::{Timeout, block_until};

/// Binary completion signal.
///
/// An interrupt handler signals it when a transfer ends; exactly one waiting
/// task consumes the signal. A signal given while nobody waits is kept until
/// the next `wait`.
pub struct Completion {
    signalled: AtomicBool,
}

impl Completion {
    pub const fn new() -> Self {
        Self {
            signalled: AtomicBool::new(false),
        }
    }

    pub fn signal_from_isr(&self) {
        self.signalled.store(true, Ordering::Release);
    }

    /// Consume the signal, waiting up to `timeout` for it.
    pub fn wait(&self, timeout: Timeout) -> Result<(), Errno> {
        block_until(timeout, || {
            self.signalled
                .swap(false, Ordering::AcqRel)
                .then_some(())
        })
        .ok_or(Errno::ETIMEDOUT)
    }

    /// Drop a stale signal before starting a new transfer.
    pub fn reset(&self) {
        self.signalled.store(false, Ordering::Release);
    }
}

impl Default for Completion {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_is_consumed_once() {
        let done = Completion::new();
        assert_eq!(done.wait(Timeout::Immediate), Err(Errno::ETIMEDOUT));
        done.signal_from_isr();
        assert_eq!(done.wait(Timeout::Immediate), Ok(()));
        assert_eq!(done.wait(Timeout::Immediate), Err(Errno::ETIMEDOUT));
    }
}
