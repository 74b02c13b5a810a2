/*
 * Architecture Abstraction Layer
 *
 * This module provides the hardware capabilities the I/O core is written
 * against. Drivers never touch register addresses directly: they talk to the
 * traits below, which the STM32F1 register blocks in `stm32f1` implement for
 * the real chip and the host mocks implement for tests.
 *
 * Why this is important:
 * - Keeps register layouts an opaque, externally given capability
 * - Lets the serial and DMA drivers run unchanged against mock peripherals
 * - Puts every read-modify-write of shared hardware behind one interface
 *   whose callers decide the locking (interrupt masking vs mutex)
 *
 * Submodules:
 * - interrupts: global interrupt masking (critical sections)
 * - stm32f1: register-level implementations for the STM32F10x family
 */

use bitflags::bitflags;

pub mod interrupts;
pub mod stm32f1;

/// NVIC interrupt number (IRQn).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Irq(pub u16);

/// Controller-level interrupt enable and priority (NVIC).
pub trait InterruptController: Sync {
    fn set_priority(&self, irq: Irq, priority: u8);
    fn enable(&self, irq: Irq);
    fn disable(&self, irq: Irq);
}

/// Periodic tick interrupt source (Cortex-M SysTick).
pub trait TickSource: Sync {
    /// Raise the tick interrupt every `reload + 1` core clock cycles.
    fn start_periodic(&self, reload: u32);
}

bitflags! {
    /// USART status register (SR)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct UsartStatus: u32 {
        const PARITY_ERROR = 1 << 0;
        const FRAMING_ERROR = 1 << 1;
        const NOISE = 1 << 2;
        const OVERRUN = 1 << 3;
        const IDLE = 1 << 4;
        /// Received data register not empty
        const RXNE = 1 << 5;
        /// Transmission complete
        const TC = 1 << 6;
        /// Transmit data register empty
        const TXE = 1 << 7;
    }
}

bitflags! {
    /// USART control register 1 (CR1)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct UsartControl: u32 {
        const RE = 1 << 2;
        const TE = 1 << 3;
        const IDLEIE = 1 << 4;
        const RXNEIE = 1 << 5;
        const TCIE = 1 << 6;
        const TXEIE = 1 << 7;
        const UE = 1 << 13;
    }
}

/// One USART register block.
pub trait UsartRegisters: Sync {
    fn status(&self) -> UsartStatus;
    /// Clear the given status bits (writing zero clears, other bits are kept).
    fn clear_status(&self, flags: UsartStatus);
    fn read_data(&self) -> u8;
    fn write_data(&self, byte: u8);
    fn control(&self) -> UsartControl;
    fn set_control(&self, control: UsartControl);
    /// Set and clear CR1 bits in one read-modify-write.
    fn modify_control(&self, set: UsartControl, clear: UsartControl) {
        let control = self.control();
        self.set_control((control | set) & !clear);
    }
    /// Write CR3: DMA transmit request on or off, everything else zero.
    fn set_dma_transmit(&self, enabled: bool);
    /// Write BRR.
    fn set_baud_divisor(&self, divisor: u32);
    /// Bus address of the data register, programmed into the DMA engine.
    fn data_register_address(&self) -> usize;
}

/// DMA controller instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DmaController {
    Dma1,
    Dma2,
}

bitflags! {
    /// DMA channel configuration register (CCR)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DmaConfig: u32 {
        /// Channel enable
        const EN = 1 << 0;
        /// Transfer complete interrupt enable
        const TCIE = 1 << 1;
        /// Half transfer interrupt enable
        const HTIE = 1 << 2;
        /// Transfer error interrupt enable
        const TEIE = 1 << 3;
        /// Read from memory (memory to peripheral)
        const DIR = 1 << 4;
        const CIRC = 1 << 5;
        const PINC = 1 << 6;
        const MINC = 1 << 7;
        const MEM2MEM = 1 << 14;
    }
}

bitflags! {
    /// Per-channel interrupt flags (4 bits of DMA_ISR, shifted down)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DmaFlags: u32 {
        /// Global interrupt flag
        const GIF = 1 << 0;
        /// Transfer complete
        const TCIF = 1 << 1;
        /// Half transfer
        const HTIF = 1 << 2;
        /// Transfer error
        const TEIF = 1 << 3;
    }
}

/// Width of one channel's flag group in ISR/IFCR.
pub const DMA_FLAG_MASK: u32 = 0xF;

/// Register access to both DMA controllers.
///
/// `channel` is the 1-based channel number within its controller.
pub trait DmaRegisters: Sync {
    fn config(&self, controller: DmaController, channel: u8) -> DmaConfig;
    fn set_config(&self, controller: DmaController, channel: u8, config: DmaConfig);
    fn set_memory_address(&self, controller: DmaController, channel: u8, address: usize);
    fn set_peripheral_address(&self, controller: DmaController, channel: u8, address: usize);
    fn set_transfer_count(&self, controller: DmaController, channel: u8, count: u16);
    /// Raw interrupt status register (ISR).
    fn interrupt_status(&self, controller: DmaController) -> u32;
    /// Write the interrupt flag clear register (IFCR).
    fn clear_interrupt_flags(&self, controller: DmaController, mask: u32);
}

bitflags! {
    /// RCC_APB2ENR bits the I/O core switches on
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Apb2Enable: u32 {
        const AFIOEN = 1 << 0;
        const IOPAEN = 1 << 2;
        const IOPBEN = 1 << 3;
        const IOPCEN = 1 << 4;
        const IOPDEN = 1 << 5;
        const USART1EN = 1 << 14;
    }
}

bitflags! {
    /// RCC_APB1ENR bits the I/O core switches on
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Apb1Enable: u32 {
        const USART2EN = 1 << 17;
        const USART3EN = 1 << 18;
        const UART4EN = 1 << 19;
        const UART5EN = 1 << 20;
    }
}

bitflags! {
    /// RCC_AHBENR bits the I/O core switches on
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AhbEnable: u32 {
        const DMA1EN = 1 << 0;
        const DMA2EN = 1 << 1;
    }
}

/// Peripheral clock gates to switch on, grouped per bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClockGates {
    pub apb2: Apb2Enable,
    pub apb1: Apb1Enable,
    pub ahb: AhbEnable,
}

/// GPIO port whose configuration registers are touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GpioPort {
    A,
    B,
    C,
    D,
}

/// GPIO configuration register: CRL covers pins 0..=7, CRH pins 8..=15.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GpioConfigRegister {
    Crl(GpioPort),
    Crh(GpioPort),
}

impl GpioConfigRegister {
    /// Register holding `pin`'s 4-bit MODE/CNF field, and the field's shift.
    pub const fn for_pin(port: GpioPort, pin: u8) -> (Self, u32) {
        if pin < 8 {
            (GpioConfigRegister::Crl(port), pin as u32 * 4)
        } else {
            (GpioConfigRegister::Crh(port), (pin as u32 - 8) * 4)
        }
    }
}

/// Clock gating and pin multiplexer configuration (RCC + GPIO CRL/CRH).
///
/// These registers are shared by every peripheral; callers must hold a
/// critical section across a read-modify-write.
pub trait PinConfig: Sync {
    fn enable_clocks(&self, gates: ClockGates);
    fn read_config(&self, register: GpioConfigRegister) -> u32;
    fn write_config(&self, register: GpioConfigRegister, value: u32);
}
