/*
 * STM32F10x Support Module
 *
 * Register-level implementations of the hardware capability traits for the
 * STM32F10x (XL density) family, plus the memory map and interrupt numbers
 * the board wiring needs.
 *
 * Submodules:
 * - usart: USART/UART register block
 * - dma: DMA1/DMA2 register blocks
 * - nvic: Cortex-M3 nested vectored interrupt controller
 * - gpio: RCC clock gates and GPIO CRL/CRH configuration
 * - systick: Cortex-M3 system timer driving the tick counter
 */

use super::Irq;

pub mod dma;
pub mod gpio;
pub mod nvic;
pub mod systick;
pub mod usart;

pub use dma::Stm32Dma;
pub use gpio::Stm32Pins;
pub use nvic::Nvic;
pub use systick::SysTick;
pub use usart::Stm32Usart;

// Peripheral base addresses
pub const USART1_BASE: usize = 0x4001_3800;
pub const USART2_BASE: usize = 0x4000_4400;
pub const USART3_BASE: usize = 0x4000_4800;
pub const UART4_BASE: usize = 0x4000_4C00;
pub const UART5_BASE: usize = 0x4000_5000;
pub const DMA1_BASE: usize = 0x4002_0000;
pub const DMA2_BASE: usize = 0x4002_0400;
pub const RCC_BASE: usize = 0x4002_1000;
pub const GPIOA_BASE: usize = 0x4001_0800;
pub const GPIOB_BASE: usize = 0x4001_0C00;
pub const GPIOC_BASE: usize = 0x4001_1000;
pub const GPIOD_BASE: usize = 0x4001_1400;
pub const SYSTICK_BASE: usize = 0xE000_E010;
pub const NVIC_BASE: usize = 0xE000_E100;

// Interrupt numbers (IRQn)
pub const DMA1_CHANNEL1_IRQ: Irq = Irq(11);
pub const DMA1_CHANNEL2_IRQ: Irq = Irq(12);
pub const DMA1_CHANNEL3_IRQ: Irq = Irq(13);
pub const DMA1_CHANNEL4_IRQ: Irq = Irq(14);
pub const DMA1_CHANNEL5_IRQ: Irq = Irq(15);
pub const DMA1_CHANNEL6_IRQ: Irq = Irq(16);
pub const DMA1_CHANNEL7_IRQ: Irq = Irq(17);
pub const USART1_IRQ: Irq = Irq(37);
pub const USART2_IRQ: Irq = Irq(38);
pub const USART3_IRQ: Irq = Irq(39);
pub const UART4_IRQ: Irq = Irq(52);
pub const UART5_IRQ: Irq = Irq(53);
pub const DMA2_CHANNEL1_IRQ: Irq = Irq(56);
pub const DMA2_CHANNEL2_IRQ: Irq = Irq(57);
pub const DMA2_CHANNEL3_IRQ: Irq = Irq(58);
/// DMA2 channels 4 and 5 share one vector outside the connectivity line.
pub const DMA2_CHANNEL4_5_IRQ: Irq = Irq(59);
/// Connectivity line only.
pub const DMA2_CHANNEL4_IRQ: Irq = Irq(59);
/// Connectivity line only.
pub const DMA2_CHANNEL5_IRQ: Irq = Irq(60);

/// Number of implemented NVIC priority bits.
pub const NVIC_PRIO_BITS: u8 = 4;
