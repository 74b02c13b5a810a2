/*
 * Board Wiring
 *
 * Static instances of the STM32F1 peripherals, the serial ports and the
 * posixio service, plus the interrupt entry points the vector table calls.
 *
 * Why this is important:
 * - Drivers are written against capability traits; this is the one place
 *   the real register blocks are plugged in
 * - `start` is the bring-up sequence of the I/O core: system tick, console
 *   port, logger, posixio, the remaining serial ports, then the stdio
 *   streams
 * - The IRQ handlers only exist on the bare-metal target, so host builds
 *   never reference peripheral addresses
 */

use alloc::format;
use alloc::sync::Arc;

use lazy_static::lazy_static;
use spin::Once;

#[cfg(not(feature = "external-tick"))]
use crate::arch::stm32f1::SysTick;
use crate::arch::stm32f1::{
    Nvic, Stm32Dma, Stm32Pins, Stm32Usart, UART4_BASE, UART5_BASE, USART1_BASE, USART2_BASE,
    USART3_BASE,
};
use crate::config::BoardConfig;
use crate::drivers::Peripherals;
use crate::drivers::dma::DmaChannelManager;
use crate::drivers::serial::{PortId, SerialPort};
use crate::io::{Device, Errno, Posixio, SerialDevice, stdio};
use crate::sync::QueueSet;
use crate::utils::debug::logger;
#[cfg(not(feature = "external-tick"))]
use crate::utils::timer;

static USART1_REGS: Stm32Usart = Stm32Usart::new(USART1_BASE);
static USART2_REGS: Stm32Usart = Stm32Usart::new(USART2_BASE);
static USART3_REGS: Stm32Usart = Stm32Usart::new(USART3_BASE);
static UART4_REGS: Stm32Usart = Stm32Usart::new(UART4_BASE);
static UART5_REGS: Stm32Usart = Stm32Usart::new(UART5_BASE);
static DMA_REGS: Stm32Dma = Stm32Dma::new();
static NVIC: Nvic = Nvic::new();
static PINS: Stm32Pins = Stm32Pins::new();
#[cfg(not(feature = "external-tick"))]
static SYSTICK: SysTick = SysTick::new();

/// DMA channels of both controllers.
pub static DMA: DmaChannelManager = DmaChannelManager::new(&DMA_REGS, &NVIC);

pub static SERIAL1: SerialPort =
    SerialPort::new(PortId::Usart1, &USART1_REGS, PortId::Usart1.tx_dma_channel());
pub static SERIAL2: SerialPort =
    SerialPort::new(PortId::Usart2, &USART2_REGS, PortId::Usart2.tx_dma_channel());
pub static SERIAL3: SerialPort =
    SerialPort::new(PortId::Usart3, &USART3_REGS, PortId::Usart3.tx_dma_channel());
pub static SERIAL4: SerialPort =
    SerialPort::new(PortId::Uart4, &UART4_REGS, PortId::Uart4.tx_dma_channel());
pub static SERIAL5: SerialPort =
    SerialPort::new(PortId::Uart5, &UART5_REGS, PortId::Uart5.tx_dma_channel());

/// Port selected as console by `start`
static CONSOLE: Once<&'static SerialPort> = Once::new();

/// The descriptor routing service of the firmware.
pub static POSIXIO: Posixio = Posixio::new();

lazy_static! {
    /// Built-in "/serial/<n>" device.
    static ref SERIAL_DEVICE: Arc<SerialDevice> = Arc::new(SerialDevice::new(
        "serial",
        PortId::ALL.map(|id| Some(port(id))),
    ));
}

/// Static instance of a port.
pub fn port(id: PortId) -> &'static SerialPort {
    match id {
        PortId::Usart1 => &SERIAL1,
        PortId::Usart2 => &SERIAL2,
        PortId::Usart3 => &SERIAL3,
        PortId::Uart4 => &SERIAL4,
        PortId::Uart5 => &SERIAL5,
    }
}

/// The console port, once `start` has chosen one.
pub fn console() -> Option<&'static SerialPort> {
    CONSOLE.get().copied()
}

fn peripherals(config: &BoardConfig) -> Peripherals {
    Peripherals {
        pins: &PINS,
        nvic: &NVIC,
        dma: &DMA,
        core_clock_hz: config.core_clock_hz,
    }
}

/// Bring up the I/O core.
///
/// Starts the system tick, brings the console port up and installs the
/// logger on it, starts posixio with the serial device, starts every other
/// enabled port (receive queues joining `queue_set` if given) and attaches
/// stdio to the console port.
pub fn start(config: &BoardConfig, queue_set: Option<&'static QueueSet>) -> Result<(), Errno> {
    #[cfg(not(feature = "external-tick"))]
    timer::start_ticks(&SYSTICK, config.core_clock_hz);

    let hw = peripherals(config);

    // Clocked and enabled before the first line is logged to it
    if let Some((id, baud)) = config.console_port() {
        let console = port(id);
        console.start(&hw, baud, queue_set)?;
        CONSOLE.call_once(|| console);
        logger::init(console).map_err(|_| Errno::EBUSY)?;
    }

    let serial: Arc<dyn Device> = SERIAL_DEVICE.clone();
    POSIXIO.start([serial])?;

    for entry in config.ports.iter() {
        if Some(entry.port) != config.console {
            port(entry.port).start(&hw, entry.baud, queue_set)?;
        }
    }

    if let Some(id) = config.console {
        stdio::attach(&POSIXIO, &format!("/serial/{}", id.number()))?;
    }

    log::info!("board: I/O core up, {} port(s)", config.ports.len());
    Ok(())
}

#[cfg(all(target_arch = "arm", target_os = "none"))]
#[allow(non_snake_case)]
mod vectors {
    use super::{DMA, SERIAL1, SERIAL2, SERIAL3, SERIAL4, SERIAL5};
    use crate::arch::stm32f1::*;

    #[cfg(not(feature = "external-tick"))]
    #[unsafe(no_mangle)]
    pub extern "C" fn SysTick_Handler() {
        crate::utils::timer::on_tick();
    }

    #[unsafe(no_mangle)]
    pub extern "C" fn USART1_IRQHandler() {
        SERIAL1.on_interrupt();
    }

    #[unsafe(no_mangle)]
    pub extern "C" fn USART2_IRQHandler() {
        SERIAL2.on_interrupt();
    }

    #[unsafe(no_mangle)]
    pub extern "C" fn USART3_IRQHandler() {
        SERIAL3.on_interrupt();
    }

    #[unsafe(no_mangle)]
    pub extern "C" fn UART4_IRQHandler() {
        SERIAL4.on_interrupt();
    }

    #[unsafe(no_mangle)]
    pub extern "C" fn UART5_IRQHandler() {
        SERIAL5.on_interrupt();
    }

    #[unsafe(no_mangle)]
    pub extern "C" fn DMA1_Channel1_IRQHandler() {
        DMA.on_vector_interrupt(DMA1_CHANNEL1_IRQ);
    }

    #[unsafe(no_mangle)]
    pub extern "C" fn DMA1_Channel2_IRQHandler() {
        DMA.on_vector_interrupt(DMA1_CHANNEL2_IRQ);
    }

    #[unsafe(no_mangle)]
    pub extern "C" fn DMA1_Channel3_IRQHandler() {
        DMA.on_vector_interrupt(DMA1_CHANNEL3_IRQ);
    }

    #[unsafe(no_mangle)]
    pub extern "C" fn DMA1_Channel4_IRQHandler() {
        DMA.on_vector_interrupt(DMA1_CHANNEL4_IRQ);
    }

    #[unsafe(no_mangle)]
    pub extern "C" fn DMA1_Channel5_IRQHandler() {
        DMA.on_vector_interrupt(DMA1_CHANNEL5_IRQ);
    }

    #[unsafe(no_mangle)]
    pub extern "C" fn DMA1_Channel6_IRQHandler() {
        DMA.on_vector_interrupt(DMA1_CHANNEL6_IRQ);
    }

    #[unsafe(no_mangle)]
    pub extern "C" fn DMA1_Channel7_IRQHandler() {
        DMA.on_vector_interrupt(DMA1_CHANNEL7_IRQ);
    }

    #[unsafe(no_mangle)]
    pub extern "C" fn DMA2_Channel1_IRQHandler() {
        DMA.on_vector_interrupt(DMA2_CHANNEL1_IRQ);
    }

    #[unsafe(no_mangle)]
    pub extern "C" fn DMA2_Channel2_IRQHandler() {
        DMA.on_vector_interrupt(DMA2_CHANNEL2_IRQ);
    }

    #[unsafe(no_mangle)]
    pub extern "C" fn DMA2_Channel3_IRQHandler() {
        DMA.on_vector_interrupt(DMA2_CHANNEL3_IRQ);
    }

    #[cfg(not(feature = "connectivity-line"))]
    #[unsafe(no_mangle)]
    pub extern "C" fn DMA2_Channel4_5_IRQHandler() {
        DMA.on_vector_interrupt(DMA2_CHANNEL4_5_IRQ);
    }

    #[cfg(feature = "connectivity-line")]
    #[unsafe(no_mangle)]
    pub extern "C" fn DMA2_Channel4_IRQHandler() {
        DMA.on_vector_interrupt(DMA2_CHANNEL4_IRQ);
    }

    #[cfg(feature = "connectivity-line")]
    #[unsafe(no_mangle)]
    pub extern "C" fn DMA2_Channel5_IRQHandler() {
        DMA.on_vector_interrupt(DMA2_CHANNEL5_IRQ);
    }
}
