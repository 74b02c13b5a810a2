/*
 * Build Configuration
 *
 * Compile-time limits and board settings for the I/O core. These mirror the
 * firmware's board header: table sizes, queue depths, interrupt priorities
 * and the tick rate all live here so drivers never hard-code them.
 */

use crate::drivers::serial::PortId;

/// Maximum number of concurrently open files (including stdin/out/err).
pub const MAX_OPEN_FILES: usize = 32;

/// Maximum number of registered devices.
pub const MAX_DEVICES: usize = 32;

/// First descriptor handed out by the allocator; 0..=2 are the standard streams.
pub const FIRST_DYNAMIC_FD: usize = 3;

/// Depth of each serial port's transmit byte queue.
pub const SERIAL_TX_SIZE: usize = 16;

/// Depth of each serial port's receive byte queue.
pub const SERIAL_RX_SIZE: usize = 16;

/// Size of the scratch buffer used by `SerialPort::write_fmt`.
pub const SERIAL_FMT_SIZE: usize = 64;

/// Baud rate used when a board entry does not specify one.
pub const DEFAULT_USART_BAUD: u32 = 9600;

/// NVIC priority of USART and their DMA vectors (lower number = higher priority).
pub const IRQ_PRIO_USART: u8 = 12;

/// RTOS tick frequency.
pub const TICK_RATE_HZ: u32 = 100;

/// Bounded wait for the descriptor table lock, in ticks. Expiry is fatal.
pub const FD_LOCK_TIMEOUT_TICKS: u32 = 1000;

/// How long the logger waits for a busy console before dropping a line.
pub const LOG_WRITE_TIMEOUT_TICKS: u32 = 10;

/// HCLK of the shipped board (SystemCoreClock).
pub const CORE_CLOCK_HZ: u32 = 72_000_000;

/// Per-port settings of a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortConfig {
    pub port: PortId,
    pub baud: u32,
}

/// Which peripherals a board brings up at start.
#[derive(Debug, Clone)]
pub struct BoardConfig {
    /// Serial ports to start, in start order.
    pub ports: heapless::Vec<PortConfig, 5>,
    /// Port whose posixio path becomes stdin/stdout/stderr.
    pub console: Option<PortId>,
    /// HCLK the baud divisors are derived from.
    pub core_clock_hz: u32,
}

impl BoardConfig {
    /// Board with no ports enabled.
    pub fn empty() -> Self {
        Self {
            ports: heapless::Vec::new(),
            console: None,
            core_clock_hz: CORE_CLOCK_HZ,
        }
    }

    /// Enable a port; a port listed twice keeps its first entry.
    pub fn with_port(mut self, port: PortId, baud: u32) -> Self {
        if !self.is_enabled(port) {
            // Five ports exist, so the vector can never be full here.
            let _ = self.ports.push(PortConfig { port, baud });
        }
        self
    }

    pub fn with_console(mut self, port: PortId) -> Self {
        self.console = Some(port);
        self
    }

    pub fn is_enabled(&self, port: PortId) -> bool {
        self.ports.iter().any(|p| p.port == port)
    }

    /// The console and its baud rate; `DEFAULT_USART_BAUD` when the console
    /// has no port entry of its own.
    pub fn console_port(&self) -> Option<(PortId, u32)> {
        let console = self.console?;
        let baud = self
            .ports
            .iter()
            .find(|p| p.port == console)
            .map_or(DEFAULT_USART_BAUD, |p| p.baud);
        Some((console, baud))
    }
}

impl Default for BoardConfig {
    /// The shipped board: USART1 at 9600 baud, used as the console.
    fn default() -> Self {
        Self::empty()
            .with_port(PortId::Usart1, DEFAULT_USART_BAUD)
            .with_console(PortId::Usart1)
    }
}
