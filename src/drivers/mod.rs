/*
 * Device Drivers Module
 *
 * This module contains the peripheral drivers of the I/O core.
 *
 * Structure:
 * - dma: DMA channel allocation and interrupt dispatch
 * - serial: interrupt and DMA driven USART driver
 *
 * Drivers reach hardware only through the capability traits in `arch`, so
 * everything here also runs against the host mocks.
 */

use crate::arch::{InterruptController, PinConfig};

pub mod dma;
pub mod serial;

/// Shared hardware a driver needs while starting up.
#[derive(Clone, Copy)]
pub struct Peripherals {
    /// RCC clock gates and GPIO pin configuration
    pub pins: &'static dyn PinConfig,
    pub nvic: &'static dyn InterruptController,
    pub dma: &'static dma::DmaChannelManager,
    /// HCLK the baud divisors are derived from
    pub core_clock_hz: u32,
}
