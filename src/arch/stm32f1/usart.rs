use crate::arch::{UsartControl, UsartRegisters, UsartStatus};
use crate::io::mmio::{Io, Mmio};

/// USART register block.
pub struct Stm32Usart {
    sr: Mmio<u32>,  // Status
    dr: Mmio<u32>,  // Data, read to receive, write to send
    brr: Mmio<u32>, // Baud rate divisor
    cr1: Mmio<u32>, // Control 1: enables and interrupt masks
    cr3: Mmio<u32>, // Control 3: DMA requests (CR2 stays at reset value)
}

impl Stm32Usart {
    /// Creates a new register block at `base`.
    pub const fn new(base: usize) -> Self {
        Stm32Usart {
            sr: Mmio::new(base),
            dr: Mmio::new(base + 0x04),
            brr: Mmio::new(base + 0x08),
            cr1: Mmio::new(base + 0x0C),
            cr3: Mmio::new(base + 0x14),
        }
    }
}

/// DMAT: DMA enable transmitter
const CR3_DMAT: u32 = 1 << 7;

impl UsartRegisters for Stm32Usart {
    fn status(&self) -> UsartStatus {
        UsartStatus::from_bits_truncate(self.sr.read())
    }

    fn clear_status(&self, flags: UsartStatus) {
        // rc_w0 bits: writing 1 leaves them alone
        self.sr.write(!flags.bits());
    }

    fn read_data(&self) -> u8 {
        (self.dr.read() & 0xFF) as u8
    }

    fn write_data(&self, byte: u8) {
        self.dr.write(byte as u32);
    }

    fn control(&self) -> UsartControl {
        UsartControl::from_bits_truncate(self.cr1.read())
    }

    fn set_control(&self, control: UsartControl) {
        self.cr1.write(control.bits());
    }

    fn set_dma_transmit(&self, enabled: bool) {
        self.cr3.write(if enabled { CR3_DMAT } else { 0 });
    }

    fn set_baud_divisor(&self, divisor: u32) {
        self.brr.write(divisor);
    }

    fn data_register_address(&self) -> usize {
        self.dr.address()
    }
}
