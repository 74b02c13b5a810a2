use spin::{Mutex, MutexGuard};

use crate::utils::timer::{Timeout, block_until};

/// Lock `mutex`, giving up after `timeout`.
///
/// `spin::Mutex` has no timed lock of its own; this polls `try_lock` and
/// yields to the clock between attempts.
pub fn lock_within<T>(mutex: &Mutex<T>, timeout: Timeout) -> Option<MutexGuard<'_, T>> {
    block_until(timeout, || mutex.try_lock())
}
