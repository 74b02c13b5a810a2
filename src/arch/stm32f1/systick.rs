use bitflags::bitflags;

use crate::arch::TickSource;
use crate::io::mmio::{Io, Mmio};

use super::SYSTICK_BASE;

bitflags! {
    /// SysTick control and status register (CSR)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SysTickControl: u32 {
        const ENABLE = 1 << 0;
        /// Raise the SysTick exception on every wrap
        const TICKINT = 1 << 1;
        /// Count the core clock instead of HCLK/8
        const CLKSOURCE = 1 << 2;
    }
}

/// Largest reload value (the counter is 24 bits wide).
pub const SYSTICK_MAX_RELOAD: u32 = 0x00FF_FFFF;

/// Cortex-M3 system timer.
pub struct SysTick {
    csr: Mmio<u32>, // Control and status
    rvr: Mmio<u32>, // Reload value
    cvr: Mmio<u32>, // Current value, any write clears it
}

impl SysTick {
    pub const fn new() -> Self {
        SysTick {
            csr: Mmio::new(SYSTICK_BASE),
            rvr: Mmio::new(SYSTICK_BASE + 0x04),
            cvr: Mmio::new(SYSTICK_BASE + 0x08),
        }
    }
}

impl Default for SysTick {
    fn default() -> Self {
        Self::new()
    }
}

impl TickSource for SysTick {
    fn start_periodic(&self, reload: u32) {
        self.csr.write(0);
        self.rvr.write(reload.min(SYSTICK_MAX_RELOAD));
        self.cvr.write(0);
        self.csr.write(
            (SysTickControl::CLKSOURCE | SysTickControl::TICKINT | SysTickControl::ENABLE).bits(),
        );
    }
}
