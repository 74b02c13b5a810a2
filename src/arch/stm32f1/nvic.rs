use crate::arch::{InterruptController, Irq};
use crate::io::mmio::{Io, Mmio};

use super::{NVIC_BASE, NVIC_PRIO_BITS};

/// Cortex-M3 NVIC.
///
/// ISER/ICER are write-one-to-act, so enable/disable need no read-modify-write.
pub struct Nvic {
    base: usize,
}

impl Nvic {
    pub const fn new() -> Self {
        Nvic { base: NVIC_BASE }
    }

    fn word(irq: Irq) -> (usize, u32) {
        ((irq.0 as usize / 32) * 4, 1 << (irq.0 % 32))
    }
}

impl Default for Nvic {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptController for Nvic {
    fn set_priority(&self, irq: Irq, priority: u8) {
        // IPR bytes start 0x300 past ISER0; only the top bits are implemented
        let ipr = Mmio::<u8>::new(self.base + 0x300 + irq.0 as usize);
        ipr.write(priority << (8 - NVIC_PRIO_BITS));
    }

    fn enable(&self, irq: Irq) {
        let (offset, bit) = Self::word(irq);
        Mmio::<u32>::new(self.base + offset).write(bit);
    }

    fn disable(&self, irq: Irq) {
        let (offset, bit) = Self::word(irq);
        Mmio::<u32>::new(self.base + 0x80 + offset).write(bit);
    }
}
