/*
 * Interrupt-to-Task Signalling
 *
 * This module provides the primitives interrupt handlers and tasks use to
 * hand data and events to each other.
 *
 * ## Rules
 *
 * - The interrupt side never waits: `*_from_isr` operations either succeed
 *   at once or drop (and count) what they could not deliver
 * - The task side always waits with an explicit `Timeout`, and reports
 *   "timed out" as an ordinary error instead of blocking forever
 * - Task-side operations mask interrupts while holding a lock the interrupt
 *   side also takes, so an ISR can never spin on a lock held by the task it
 *   preempted
 *
 * Submodules:
 * - queue: bounded FIFO byte queue (serial RX/TX)
 * - completion: binary "transfer finished" signal (DMA writes)
 * - queue_set: wait on several queues at once
 * - mutex: bounded-wait locking of `spin::Mutex`
 */

pub mod completion;
pub mod mutex;
pub mod queue;
pub mod queue_set;

pub use completion::Completion;
pub use mutex::lock_within;
pub use queue::ByteQueue;
pub use queue_set::QueueSet;
