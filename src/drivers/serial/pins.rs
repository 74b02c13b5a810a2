/*
 * USART Pin Multiplexing
 *
 * Static routing of every port's TX/RX pins and the clock gates it needs.
 * `configure` performs the read-modify-write of the shared GPIO CRL/CRH
 * registers and must run inside a critical section.
 */

use crate::arch::{
    AhbEnable, Apb1Enable, Apb2Enable, ClockGates, GpioConfigRegister, GpioPort, PinConfig,
};

use super::PortId;

/// TX pin: alternate function push-pull, 50 MHz (CNF=10, MODE=11)
const TX_PIN_MODE: u32 = 0xB;
/// RX pin: floating input (CNF=01, MODE=00)
const RX_PIN_MODE: u32 = 0x4;

/// Pins and clocks of one port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinRoute {
    pub tx: (GpioPort, u8),
    pub rx: (GpioPort, u8),
    pub gates: ClockGates,
}

const fn apb2(gates: Apb2Enable) -> ClockGates {
    ClockGates {
        apb2: gates,
        apb1: Apb1Enable::empty(),
        ahb: AhbEnable::DMA1EN.union(AhbEnable::DMA2EN),
    }
}

const fn apb1(port_clocks: Apb2Enable, gates: Apb1Enable) -> ClockGates {
    ClockGates {
        apb2: port_clocks,
        apb1: gates,
        ahb: AhbEnable::DMA1EN.union(AhbEnable::DMA2EN),
    }
}

impl PortId {
    /// Pin assignment of this port (default remap).
    pub const fn route(self) -> PinRoute {
        let afio = Apb2Enable::AFIOEN;
        match self {
            PortId::Usart1 => PinRoute {
                tx: (GpioPort::A, 9),
                rx: (GpioPort::A, 10),
                gates: apb2(afio.union(Apb2Enable::IOPAEN).union(Apb2Enable::USART1EN)),
            },
            PortId::Usart2 => PinRoute {
                tx: (GpioPort::A, 2),
                rx: (GpioPort::A, 3),
                gates: apb1(afio.union(Apb2Enable::IOPAEN), Apb1Enable::USART2EN),
            },
            PortId::Usart3 => PinRoute {
                tx: (GpioPort::B, 10),
                rx: (GpioPort::B, 11),
                gates: apb1(afio.union(Apb2Enable::IOPBEN), Apb1Enable::USART3EN),
            },
            PortId::Uart4 => PinRoute {
                tx: (GpioPort::C, 10),
                rx: (GpioPort::C, 11),
                gates: apb1(afio.union(Apb2Enable::IOPCEN), Apb1Enable::UART4EN),
            },
            PortId::Uart5 => PinRoute {
                tx: (GpioPort::C, 12),
                rx: (GpioPort::D, 2),
                gates: apb1(
                    afio.union(Apb2Enable::IOPCEN).union(Apb2Enable::IOPDEN),
                    Apb1Enable::UART5EN,
                ),
            },
        }
    }
}

fn set_pin_mode(pins: &dyn PinConfig, (port, pin): (GpioPort, u8), mode: u32) {
    let (register, shift) = GpioConfigRegister::for_pin(port, pin);
    let value = pins.read_config(register);
    pins.write_config(register, (value & !(0xF << shift)) | (mode << shift));
}

/// Enable the port's clocks and route its pins.
///
/// Caller holds a critical section: the GPIO registers are shared with
/// every other port.
pub fn configure(port: PortId, pins: &dyn PinConfig) {
    let route = port.route();
    pins.enable_clocks(route.gates);
    set_pin_mode(pins, route.tx, TX_PIN_MODE);
    set_pin_mode(pins, route.rx, RX_PIN_MODE);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usart1_uses_apb2_and_port_a_high_register() {
        let route = PortId::Usart1.route();
        assert!(route.gates.apb2.contains(Apb2Enable::USART1EN | Apb2Enable::AFIOEN));
        assert!(route.gates.apb1.is_empty());
        assert_eq!(
            GpioConfigRegister::for_pin(route.tx.0, route.tx.1).0,
            GpioConfigRegister::Crh(GpioPort::A)
        );
    }

    #[test]
    fn uart5_spans_ports_c_and_d() {
        let route = PortId::Uart5.route();
        assert_eq!(route.tx, (GpioPort::C, 12));
        assert_eq!(route.rx, (GpioPort::D, 2));
        assert!(route.gates.apb2.contains(Apb2Enable::IOPCEN | Apb2Enable::IOPDEN));
        assert!(route.gates.apb1.contains(Apb1Enable::UART5EN));
    }
}
