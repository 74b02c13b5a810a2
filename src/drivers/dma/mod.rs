/*
 * DMA Channel Manager
 *
 * This module owns the twelve DMA channels of the STM32F10x (DMA1 channels
 * 1-7, DMA2 channels 1-5). Drivers borrow a channel with `allocate`, program
 * transfers through the manager, and hand it back with `release`.
 *
 * ## Interrupt dispatch
 *
 * Every channel has a handler slot. When a channel interrupt fires, the
 * manager reads the channel's 4-bit flag group from ISR, clears it through
 * IFCR, and calls the installed handler with the flags. A channel with no
 * handler just gets its flags cleared: a stray completion arriving while a
 * channel is being torn down must not crash anything.
 *
 * ## Shared vectors
 *
 * Outside the connectivity line, DMA2 channels 4 and 5 raise the same
 * interrupt. Each shared vector keeps a mask of its active channels; the
 * vector is enabled while the mask is non-zero, i.e. on the 0 -> 1 use
 * transition, and disabled on 1 -> 0. Allocating a channel that is already
 * active does not count it twice.
 *
 * Allocation is meant for start-up and teardown. `allocate` and `release`
 * are not serialized against each other; only the handler slot update is
 * protected from the interrupt that reads it.
 */

use core::sync::atomic::{AtomicU32, Ordering};

use spin::Mutex;

use crate::arch::interrupts::without_interrupts;
use crate::arch::stm32f1::*;
use crate::arch::{
    DMA_FLAG_MASK, DmaConfig, DmaController, DmaFlags, DmaRegisters, InterruptController, Irq,
};
use crate::io::Errno;

/// Number of DMA channels managed.
pub const DMA_CHANNEL_COUNT: usize = 12;

/// Number of vectors shared by more than one channel.
#[cfg(not(feature = "connectivity-line"))]
pub const SHARED_VECTOR_COUNT: usize = 1;
#[cfg(feature = "connectivity-line")]
pub const SHARED_VECTOR_COUNT: usize = 0;

/// Static description of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaChannel {
    pub controller: DmaController,
    /// Channel number within the controller (1-based)
    pub channel: u8,
    pub vector: Irq,
    /// Position in `DMA_CHANNELS`
    pub index: usize,
    /// Position of this channel's flag group in ISR/IFCR
    pub flag_shift: u32,
    /// Slot in the manager's shared-vector table, if the vector is shared
    pub shared: Option<usize>,
}

impl DmaChannel {
    const fn new(controller: DmaController, channel: u8, vector: Irq, index: usize) -> Self {
        Self {
            controller,
            channel,
            vector,
            index,
            flag_shift: 4 * (channel as u32 - 1),
            shared: None,
        }
    }

    const fn sharing(mut self, slot: usize) -> Self {
        self.shared = Some(slot);
        self
    }

    /// IFCR bits covering this channel's whole flag group.
    pub const fn flag_mask(&self) -> u32 {
        DMA_FLAG_MASK << self.flag_shift
    }

    /// Look up a channel by controller and channel number.
    pub fn find(controller: DmaController, channel: u8) -> Option<&'static DmaChannel> {
        DMA_CHANNELS
            .iter()
            .find(|c| c.controller == controller && c.channel == channel)
    }
}

use DmaController::{Dma1, Dma2};

/// Every channel, in index order.
#[cfg(not(feature = "connectivity-line"))]
pub static DMA_CHANNELS: [DmaChannel; DMA_CHANNEL_COUNT] = [
    DmaChannel::new(Dma1, 1, DMA1_CHANNEL1_IRQ, 0),
    DmaChannel::new(Dma1, 2, DMA1_CHANNEL2_IRQ, 1),
    DmaChannel::new(Dma1, 3, DMA1_CHANNEL3_IRQ, 2),
    DmaChannel::new(Dma1, 4, DMA1_CHANNEL4_IRQ, 3),
    DmaChannel::new(Dma1, 5, DMA1_CHANNEL5_IRQ, 4),
    DmaChannel::new(Dma1, 6, DMA1_CHANNEL6_IRQ, 5),
    DmaChannel::new(Dma1, 7, DMA1_CHANNEL7_IRQ, 6),
    DmaChannel::new(Dma2, 1, DMA2_CHANNEL1_IRQ, 7),
    DmaChannel::new(Dma2, 2, DMA2_CHANNEL2_IRQ, 8),
    DmaChannel::new(Dma2, 3, DMA2_CHANNEL3_IRQ, 9),
    DmaChannel::new(Dma2, 4, DMA2_CHANNEL4_5_IRQ, 10).sharing(0),
    DmaChannel::new(Dma2, 5, DMA2_CHANNEL4_5_IRQ, 11).sharing(0),
];

#[cfg(feature = "connectivity-line")]
pub static DMA_CHANNELS: [DmaChannel; DMA_CHANNEL_COUNT] = [
    DmaChannel::new(Dma1, 1, DMA1_CHANNEL1_IRQ, 0),
    DmaChannel::new(Dma1, 2, DMA1_CHANNEL2_IRQ, 1),
    DmaChannel::new(Dma1, 3, DMA1_CHANNEL3_IRQ, 2),
    DmaChannel::new(Dma1, 4, DMA1_CHANNEL4_IRQ, 3),
    DmaChannel::new(Dma1, 5, DMA1_CHANNEL5_IRQ, 4),
    DmaChannel::new(Dma1, 6, DMA1_CHANNEL6_IRQ, 5),
    DmaChannel::new(Dma1, 7, DMA1_CHANNEL7_IRQ, 6),
    DmaChannel::new(Dma2, 1, DMA2_CHANNEL1_IRQ, 7),
    DmaChannel::new(Dma2, 2, DMA2_CHANNEL2_IRQ, 8),
    DmaChannel::new(Dma2, 3, DMA2_CHANNEL3_IRQ, 9),
    DmaChannel::new(Dma2, 4, DMA2_CHANNEL4_IRQ, 10),
    DmaChannel::new(Dma2, 5, DMA2_CHANNEL5_IRQ, 11),
];

/// Receiver of a channel's interrupt events.
///
/// Called in interrupt context: must not block.
pub trait DmaHandler: Sync {
    fn on_transfer_event(&self, flags: DmaFlags);
}

/// Owner of all DMA channels and their interrupt vectors.
pub struct DmaChannelManager {
    regs: &'static dyn DmaRegisters,
    nvic: &'static dyn InterruptController,
    handlers: [Mutex<Option<&'static dyn DmaHandler>>; DMA_CHANNEL_COUNT],
    /// Per shared vector: bit `n` set while channel index `n` is active
    shared_active: [AtomicU32; SHARED_VECTOR_COUNT],
}

impl DmaChannelManager {
    pub const fn new(
        regs: &'static dyn DmaRegisters,
        nvic: &'static dyn InterruptController,
    ) -> Self {
        Self {
            regs,
            nvic,
            handlers: [const { Mutex::new(None) }; DMA_CHANNEL_COUNT],
            shared_active: [const { AtomicU32::new(0) }; SHARED_VECTOR_COUNT],
        }
    }

    fn channel(index: usize) -> Result<&'static DmaChannel, Errno> {
        DMA_CHANNELS.get(index).ok_or(Errno::ENXIO)
    }

    /// Claim channel `index` for `handler`.
    ///
    /// Stops the engine, clears stale flags, installs the handler, sets the
    /// vector priority and enables the vector. Allocating an owned channel
    /// replaces its handler.
    pub fn allocate(
        &self,
        index: usize,
        priority: u8,
        handler: &'static dyn DmaHandler,
    ) -> Result<(), Errno> {
        let ch = Self::channel(index)?;

        self.disable(index)?;
        self.regs
            .set_config(ch.controller, ch.channel, DmaConfig::empty());

        let replaced = without_interrupts(|| self.handlers[index].lock().replace(handler));
        if replaced.is_some() {
            log::warn!("dma: channel {} reallocated, previous handler replaced", index);
        }

        self.nvic.set_priority(ch.vector, priority);
        match ch.shared {
            Some(slot) => {
                let before = self.shared_active[slot].fetch_or(1 << index, Ordering::AcqRel);
                if before == 0 {
                    self.nvic.enable(ch.vector);
                }
            }
            None => self.nvic.enable(ch.vector),
        }

        log::debug!("dma: channel {} ({:?} ch{}) allocated", index, ch.controller, ch.channel);
        Ok(())
    }

    /// Give channel `index` back.
    ///
    /// Disables the vector (a shared vector only once its last user is
    /// gone), stops the engine and clears the handler slot.
    pub fn release(&self, index: usize) -> Result<(), Errno> {
        let ch = Self::channel(index)?;

        match ch.shared {
            Some(slot) => {
                let bit = 1 << index;
                let before = self.shared_active[slot].fetch_and(!bit, Ordering::AcqRel);
                if before == bit {
                    self.nvic.disable(ch.vector);
                }
            }
            None => self.nvic.disable(ch.vector),
        }

        self.disable(index)?;
        without_interrupts(|| self.handlers[index].lock().take());

        log::debug!("dma: channel {} released", index);
        Ok(())
    }

    /// True while a handler is installed on `index`.
    pub fn is_allocated(&self, index: usize) -> bool {
        self.handlers
            .get(index)
            .is_some_and(|slot| without_interrupts(|| slot.lock().is_some()))
    }

    /// Number of active channels on shared vector `slot`.
    pub fn shared_use_count(&self, slot: usize) -> u32 {
        self.shared_active
            .get(slot)
            .map_or(0, |active| active.load(Ordering::Acquire).count_ones())
    }

    /// Stop the engine and clear its flags.
    pub fn disable(&self, index: usize) -> Result<(), Errno> {
        let ch = Self::channel(index)?;
        let config = self.regs.config(ch.controller, ch.channel);
        self.regs
            .set_config(ch.controller, ch.channel, config - DmaConfig::EN);
        self.regs.clear_interrupt_flags(ch.controller, ch.flag_mask());
        Ok(())
    }

    /// Start the engine with its current programming.
    pub fn enable(&self, index: usize) -> Result<(), Errno> {
        let ch = Self::channel(index)?;
        let config = self.regs.config(ch.controller, ch.channel);
        self.regs
            .set_config(ch.controller, ch.channel, config | DmaConfig::EN);
        Ok(())
    }

    /// Fixed peripheral-side address (CPAR).
    pub fn set_peripheral_address(&self, index: usize, address: usize) -> Result<(), Errno> {
        let ch = Self::channel(index)?;
        self.regs
            .set_peripheral_address(ch.controller, ch.channel, address);
        Ok(())
    }

    /// Program and start one transfer of `count` items from `memory`.
    pub fn start_transfer(
        &self,
        index: usize,
        config: DmaConfig,
        memory: usize,
        count: u16,
    ) -> Result<(), Errno> {
        let ch = Self::channel(index)?;
        self.disable(index)?;
        self.regs
            .set_config(ch.controller, ch.channel, config - DmaConfig::EN);
        self.regs.set_memory_address(ch.controller, ch.channel, memory);
        self.regs.set_transfer_count(ch.controller, ch.channel, count);
        self.enable(index)
    }

    /// Service the interrupt of channel `index`.
    pub fn on_channel_interrupt(&self, index: usize) {
        let Some(ch) = DMA_CHANNELS.get(index) else {
            return;
        };
        let status = self.regs.interrupt_status(ch.controller);
        let flags = DmaFlags::from_bits_truncate((status >> ch.flag_shift) & DMA_FLAG_MASK);
        self.regs.clear_interrupt_flags(ch.controller, ch.flag_mask());

        // Copy the handler out so it runs without the slot lock held
        let handler = *self.handlers[index].lock();
        if let Some(handler) = handler {
            handler.on_transfer_event(flags);
        }
    }

    /// Service a vector: every channel on it whose global flag is pending.
    ///
    /// A vector owned by a single channel is serviced unconditionally.
    pub fn on_vector_interrupt(&self, vector: Irq) {
        for ch in DMA_CHANNELS.iter().filter(|c| c.vector == vector) {
            if ch.shared.is_some() {
                let status = self.regs.interrupt_status(ch.controller);
                if (status >> ch.flag_shift) & DmaFlags::GIF.bits() == 0 {
                    continue;
                }
            }
            self.on_channel_interrupt(ch.index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_table_matches_flag_layout() {
        for (i, ch) in DMA_CHANNELS.iter().enumerate() {
            assert_eq!(ch.index, i);
            assert_eq!(ch.flag_shift, 4 * (ch.channel as u32 - 1));
        }
        assert_eq!(DMA_CHANNELS[3].controller, DmaController::Dma1);
        assert_eq!(DMA_CHANNELS[3].channel, 4);
        assert_eq!(DMA_CHANNELS[11].flag_mask(), 0xF << 16);
    }

    #[cfg(not(feature = "connectivity-line"))]
    #[test]
    fn only_dma2_channels_4_and_5_share_a_vector() {
        let shared: heapless::Vec<usize, 4> = DMA_CHANNELS
            .iter()
            .filter(|c| c.shared.is_some())
            .map(|c| c.index)
            .collect();
        assert_eq!(shared.as_slice(), &[10, 11]);
        assert_eq!(DMA_CHANNELS[10].vector, DMA_CHANNELS[11].vector);
    }

    #[test]
    fn find_resolves_controller_and_channel() {
        assert_eq!(DmaChannel::find(DmaController::Dma2, 5).map(|c| c.index), Some(11));
        assert!(DmaChannel::find(DmaController::Dma2, 6).is_none());
    }
}
