use crate::arch::{ClockGates, GpioConfigRegister, GpioPort, PinConfig};
use crate::io::mmio::{Io, Mmio};

use super::{GPIOA_BASE, GPIOB_BASE, GPIOC_BASE, GPIOD_BASE, RCC_BASE};

/// RCC enable registers and GPIO configuration registers.
pub struct Stm32Pins {
    ahbenr: Mmio<u32>,
    apb2enr: Mmio<u32>,
    apb1enr: Mmio<u32>,
}

impl Stm32Pins {
    pub const fn new() -> Self {
        Stm32Pins {
            ahbenr: Mmio::new(RCC_BASE + 0x14),
            apb2enr: Mmio::new(RCC_BASE + 0x18),
            apb1enr: Mmio::new(RCC_BASE + 0x1C),
        }
    }

    fn register(register: GpioConfigRegister) -> Mmio<u32> {
        let (port, offset) = match register {
            GpioConfigRegister::Crl(port) => (port, 0x00),
            GpioConfigRegister::Crh(port) => (port, 0x04),
        };
        let base = match port {
            GpioPort::A => GPIOA_BASE,
            GpioPort::B => GPIOB_BASE,
            GpioPort::C => GPIOC_BASE,
            GpioPort::D => GPIOD_BASE,
        };
        Mmio::new(base + offset)
    }
}

impl Default for Stm32Pins {
    fn default() -> Self {
        Self::new()
    }
}

impl PinConfig for Stm32Pins {
    fn enable_clocks(&self, gates: ClockGates) {
        if !gates.apb2.is_empty() {
            self.apb2enr.writef(gates.apb2.bits(), true);
        }
        if !gates.apb1.is_empty() {
            self.apb1enr.writef(gates.apb1.bits(), true);
        }
        if !gates.ahb.is_empty() {
            self.ahbenr.writef(gates.ahb.bits(), true);
        }
    }

    fn read_config(&self, register: GpioConfigRegister) -> u32 {
        Self::register(register).read()
    }

    fn write_config(&self, register: GpioConfigRegister, value: u32) {
        Self::register(register).write(value);
    }
}
