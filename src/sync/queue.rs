/*
 * Bounded Byte Queue
 *
 * FIFO of bytes shared between one interrupt handler and any number of
 * tasks. The storage is a fixed `heapless::Deque`, so capacity is decided at
 * compile time and nothing is ever allocated on the interrupt path.
 *
 * The RX direction pushes from the ISR and pops from tasks; the TX direction
 * pushes from tasks and pops from the ISR. Both directions share this type.
 */

use core::sync::atomic::{AtomicU32, Ordering};

use heapless::Deque;
use spin::{Mutex, Once};

use super::QueueSet;
use crate::arch::interrupts::without_interrupts;
use crate::io::Errno;
use crate::utils::timer::{Timeout, block_until};

/// Membership of a queue in a `QueueSet`.
#[derive(Clone, Copy)]
struct Member {
    set: &'static QueueSet,
    id: u32,
}

/// Bounded FIFO of bytes with an interrupt-safe producer/consumer side.
pub struct ByteQueue<const N: usize> {
    items: Mutex<Deque<u8, N>>,
    /// Bytes an ISR could not push because the queue was full
    dropped: AtomicU32,
    member: Once<Member>,
}

impl<const N: usize> ByteQueue<N> {
    pub const fn new() -> Self {
        Self {
            items: Mutex::new(Deque::new()),
            dropped: AtomicU32::new(0),
            member: Once::new(),
        }
    }

    /// Capacity in bytes.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Make pushes to this queue visible through `set` as member `id`.
    ///
    /// Only the first call has an effect.
    pub fn join(&self, set: &'static QueueSet, id: u32) {
        self.member.call_once(|| Member { set, id });
        if !self.is_empty() {
            set.mark_ready(id);
        }
    }

    // Called with the items lock held, so the ready bit always matches
    // whether the queue has data.
    fn update_member(&self, items: &Deque<u8, N>) {
        if let Some(member) = self.member.get() {
            if items.is_empty() {
                member.set.clear_ready(member.id);
            } else {
                member.set.mark_ready(member.id);
            }
        }
    }

    /// Push from an interrupt handler. Never waits: a full queue drops the
    /// byte and counts it.
    pub fn push_from_isr(&self, byte: u8) -> bool {
        let mut items = self.items.lock();
        match items.push_back(byte) {
            Ok(()) => {
                self.update_member(&items);
                true
            }
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Pop from an interrupt handler.
    pub fn pop_from_isr(&self) -> Option<u8> {
        let mut items = self.items.lock();
        let byte = items.pop_front();
        self.update_member(&items);
        byte
    }

    /// Push without waiting. Returns false if the queue is full.
    pub fn try_push(&self, byte: u8) -> bool {
        without_interrupts(|| {
            let mut items = self.items.lock();
            let pushed = items.push_back(byte).is_ok();
            self.update_member(&items);
            pushed
        })
    }

    /// Pop without waiting.
    pub fn try_pop(&self) -> Option<u8> {
        without_interrupts(|| {
            let mut items = self.items.lock();
            let byte = items.pop_front();
            self.update_member(&items);
            byte
        })
    }

    /// Push, waiting up to `timeout` for space.
    pub fn push(&self, byte: u8, timeout: Timeout) -> Result<(), Errno> {
        block_until(timeout, || self.try_push(byte).then_some(())).ok_or(Errno::ETIMEDOUT)
    }

    /// Pop, waiting up to `timeout` for a byte.
    ///
    /// A byte that arrives after the deadline was observed is left in the
    /// queue for the next call.
    pub fn pop(&self, timeout: Timeout) -> Result<u8, Errno> {
        block_until(timeout, || self.try_pop()).ok_or(Errno::ETIMEDOUT)
    }

    pub fn len(&self) -> usize {
        without_interrupts(|| self.items.lock().len())
    }

    pub fn is_empty(&self) -> bool {
        without_interrupts(|| self.items.lock().is_empty())
    }

    /// Discard everything queued. Returns how many bytes were discarded.
    pub fn clear(&self) -> usize {
        without_interrupts(|| {
            let mut items = self.items.lock();
            let count = items.len();
            items.clear();
            self.update_member(&items);
            count
        })
    }

    /// Total bytes dropped by `push_from_isr` since start.
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl<const N: usize> Default for ByteQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}
