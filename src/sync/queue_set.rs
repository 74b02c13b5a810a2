use core::sync::atomic::{AtomicU32, Ordering};

use crate::utils::timer::{Timeout, block_until};

/// A group of queues one task can wait on together.
///
/// Each member queue owns one bit (its id, 0..32). The bit is set while the
/// queue holds data, so `select` is level-triggered: a member stays ready
/// until it has been drained.
pub struct QueueSet {
    ready: AtomicU32,
}

impl QueueSet {
    pub const fn new() -> Self {
        Self {
            ready: AtomicU32::new(0),
        }
    }

    pub(crate) fn mark_ready(&self, id: u32) {
        self.ready.fetch_or(1 << id, Ordering::AcqRel);
    }

    pub(crate) fn clear_ready(&self, id: u32) {
        self.ready.fetch_and(!(1 << id), Ordering::AcqRel);
    }

    /// Bitmask of members that currently hold data.
    pub fn ready_mask(&self) -> u32 {
        self.ready.load(Ordering::Acquire)
    }

    /// Wait up to `timeout` for any member to hold data; returns the lowest
    /// ready member id.
    pub fn select(&self, timeout: Timeout) -> Option<u32> {
        block_until(timeout, || {
            let mask = self.ready_mask();
            (mask != 0).then(|| mask.trailing_zeros())
        })
    }
}

impl Default for QueueSet {
    fn default() -> Self {
        Self::new()
    }
}
