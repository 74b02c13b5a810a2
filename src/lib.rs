/*
 * posixio: I/O core of the STM32F1 firmware platform
 *
 * This crate is the layer between tasks and the serial hardware. It provides
 * a POSIX-ish file descriptor table that routes "/<device>/<remainder>" paths
 * to registered devices, the interrupt and DMA driven serial port driver the
 * serial device forwards to, and the DMA channel allocator shared by drivers.
 *
 * Why this is important:
 * - It is the only place where interrupt handlers, blocking tasks, shared
 *   hardware state (DMA channels, GPIO configuration, NVIC) and the global
 *   descriptor table meet
 * - Every consumer (CLI, LCD console, stdio) reaches the hardware through it
 * - Bounded resources (fds, devices, queues) fail predictably instead of
 *   allocating without limit
 *
 * Execution contexts:
 * - Tasks may block, always with an explicit timeout
 * - Interrupt handlers run to completion, never block, and only produce
 *   into queues/completions or check and clear hardware flags
 *
 * The crate is `no_std` + `alloc` on target. Host test builds link std so
 * the scenario tests in `tests/` can drive the drivers from threads that
 * stand in for interrupts.
 */

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod arch;
pub mod board;
pub mod config;
pub mod drivers;
pub mod io;
pub mod sync;
pub mod utils;

#[cfg(test)]
mod tests;

pub use drivers::dma::{DmaChannelManager, DmaHandler};
pub use drivers::serial::{PortId, SerialPort};
pub use io::{Errno, Posixio};
pub use utils::timer::Timeout;
