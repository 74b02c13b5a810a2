use crate::arch::{DmaConfig, DmaController, DmaRegisters};
use crate::io::mmio::{Io, Mmio};

use super::{DMA1_BASE, DMA2_BASE};

/// Distance between two channels' register groups.
const CHANNEL_STRIDE: usize = 20;

/// Register blocks of DMA1 and DMA2.
pub struct Stm32Dma {
    dma1: usize,
    dma2: usize,
}

impl Stm32Dma {
    pub const fn new() -> Self {
        Stm32Dma {
            dma1: DMA1_BASE,
            dma2: DMA2_BASE,
        }
    }

    fn base(&self, controller: DmaController) -> usize {
        match controller {
            DmaController::Dma1 => self.dma1,
            DmaController::Dma2 => self.dma2,
        }
    }

    /// Register `offset` of `channel` (1-based): CCR=0x08, CNDTR=0x0C, CPAR=0x10, CMAR=0x14.
    fn channel_reg(&self, controller: DmaController, channel: u8, offset: usize) -> Mmio<u32> {
        Mmio::new(self.base(controller) + offset + CHANNEL_STRIDE * (channel as usize - 1))
    }
}

impl Default for Stm32Dma {
    fn default() -> Self {
        Self::new()
    }
}

impl DmaRegisters for Stm32Dma {
    fn config(&self, controller: DmaController, channel: u8) -> DmaConfig {
        DmaConfig::from_bits_retain(self.channel_reg(controller, channel, 0x08).read())
    }

    fn set_config(&self, controller: DmaController, channel: u8, config: DmaConfig) {
        self.channel_reg(controller, channel, 0x08).write(config.bits());
    }

    fn set_memory_address(&self, controller: DmaController, channel: u8, address: usize) {
        self.channel_reg(controller, channel, 0x14).write(address as u32);
    }

    fn set_peripheral_address(&self, controller: DmaController, channel: u8, address: usize) {
        self.channel_reg(controller, channel, 0x10).write(address as u32);
    }

    fn set_transfer_count(&self, controller: DmaController, channel: u8, count: u16) {
        self.channel_reg(controller, channel, 0x0C).write(count as u32);
    }

    fn interrupt_status(&self, controller: DmaController) -> u32 {
        Mmio::<u32>::new(self.base(controller)).read()
    }

    fn clear_interrupt_flags(&self, controller: DmaController, mask: u32) {
        Mmio::<u32>::new(self.base(controller) + 0x04).write(mask);
    }
}
