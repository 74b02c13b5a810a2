/*
 * Serial Port Driver
 *
 * Interrupt and DMA driven driver for the five STM32F10x USART/UART ports.
 *
 * ## Structure
 *
 * Each port always owns a receive byte queue that its interrupt handler
 * fills. Transmit uses exactly one of two resources, chosen per port:
 *
 * - **DMA**: the whole buffer is handed to a DMA channel and the writer
 *   waits on a completion signalled by the channel's interrupt
 * - **Queue**: bytes go through a transmit queue that the TXE interrupt
 *   drains one byte at a time; the interrupt disarms itself once the queue
 *   is empty and the next write re-arms it
 *
 * ## Writer serialization
 *
 * `write`, `puts`, `write_fmt` and `drain` hold the port's writer mutex for
 * the whole operation, so two writers are interleaved per transfer, never
 * per byte.
 *
 * ## Interrupt context
 *
 * `on_interrupt` (USART vector) and `on_transfer_event` (DMA vector) never
 * block: received bytes that do not fit the queue are dropped and counted.
 */

use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use spin::{Mutex, Once};

use crate::arch::interrupts::without_interrupts;
use crate::arch::stm32f1::{UART4_IRQ, UART5_IRQ, USART1_IRQ, USART2_IRQ, USART3_IRQ};
use crate::arch::{DmaConfig, DmaFlags, Irq, UsartControl, UsartRegisters, UsartStatus};
use crate::config::{IRQ_PRIO_USART, SERIAL_FMT_SIZE, SERIAL_RX_SIZE, SERIAL_TX_SIZE};
use crate::drivers::Peripherals;
use crate::drivers::dma::{DmaChannelManager, DmaHandler};
use crate::io::Errno;
use crate::sync::{ByteQueue, Completion, QueueSet, lock_within};
use crate::utils::timer::Timeout;
use crate::utils::writer::FmtBuffer;

pub mod pins;

/// Largest transfer one DMA programming can move (CNDTR is 16 bits).
const DMA_MAX_CHUNK: usize = u16::MAX as usize;

/// Physical serial port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PortId {
    Usart1,
    Usart2,
    Usart3,
    Uart4,
    Uart5,
}

/// Peripheral bus a port's clock comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bus {
    /// PCLK2, assumed equal to HCLK
    Apb2,
    /// PCLK1, assumed HCLK / 2
    Apb1,
}

impl PortId {
    pub const ALL: [PortId; 5] = [
        PortId::Usart1,
        PortId::Usart2,
        PortId::Usart3,
        PortId::Uart4,
        PortId::Uart5,
    ];

    /// Zero-based position, also the port's queue-set member id.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Port number as used in paths ("1" to "5").
    pub const fn number(self) -> u32 {
        self as u32 + 1
    }

    pub fn from_number(number: u32) -> Option<Self> {
        Self::ALL.get((number as usize).checked_sub(1)?).copied()
    }

    pub const fn irq(self) -> Irq {
        match self {
            PortId::Usart1 => USART1_IRQ,
            PortId::Usart2 => USART2_IRQ,
            PortId::Usart3 => USART3_IRQ,
            PortId::Uart4 => UART4_IRQ,
            PortId::Uart5 => UART5_IRQ,
        }
    }

    pub const fn bus(self) -> Bus {
        match self {
            PortId::Usart1 => Bus::Apb2,
            _ => Bus::Apb1,
        }
    }

    /// DMA channel index wired to this port's TX request, if any.
    pub const fn tx_dma_channel(self) -> Option<usize> {
        match self {
            PortId::Usart1 => Some(3), // DMA1 channel 4
            PortId::Usart2 => Some(6), // DMA1 channel 7
            PortId::Usart3 => Some(1), // DMA1 channel 2
            PortId::Uart4 => Some(11), // DMA2 channel 5
            PortId::Uart5 => None,
        }
    }

    /// BRR value for `baud` given HCLK.
    pub const fn baud_divisor(self, core_clock_hz: u32, baud: u32) -> u32 {
        match self.bus() {
            Bus::Apb2 => core_clock_hz / baud,
            Bus::Apb1 => core_clock_hz / 2 / baud,
        }
    }
}

/// Transmit resource of a started port.
enum Transmit {
    Queue(ByteQueue<SERIAL_TX_SIZE>),
    Dma {
        manager: &'static DmaChannelManager,
        channel: usize,
        done: Completion,
        /// Flags the completion interrupt saw for the current chunk
        flags: AtomicU32,
    },
}

/// One USART/UART port.
pub struct SerialPort {
    id: PortId,
    regs: &'static dyn UsartRegisters,
    tx_dma: Option<usize>,
    speed: AtomicU32,
    core_clock_hz: AtomicU32,
    starting: AtomicBool,
    writer: Mutex<()>,
    rx: ByteQueue<SERIAL_RX_SIZE>,
    tx: Once<Transmit>,
}

impl SerialPort {
    /// Port `id` driven through `regs`. `tx_dma` selects DMA transmit on
    /// that channel index; `None` uses the interrupt-driven queue.
    pub const fn new(
        id: PortId,
        regs: &'static dyn UsartRegisters,
        tx_dma: Option<usize>,
    ) -> Self {
        Self {
            id,
            regs,
            tx_dma,
            speed: AtomicU32::new(0),
            core_clock_hz: AtomicU32::new(0),
            starting: AtomicBool::new(false),
            writer: Mutex::new(()),
            rx: ByteQueue::new(),
            tx: Once::new(),
        }
    }

    pub fn id(&self) -> PortId {
        self.id
    }

    pub fn is_started(&self) -> bool {
        self.tx.is_completed()
    }

    pub fn uses_dma(&self) -> bool {
        self.tx_dma.is_some()
    }

    /// Current baud rate (0 before start).
    pub fn speed(&self) -> u32 {
        self.speed.load(Ordering::Acquire)
    }

    /// Bring the port up.
    ///
    /// Clocks and pins are configured with interrupts masked. Received
    /// bytes mark the port's member bit in `queue_set`, if one is given.
    /// A port can only be started once.
    pub fn start(
        &'static self,
        hw: &Peripherals,
        baud: u32,
        queue_set: Option<&'static QueueSet>,
    ) -> Result<(), Errno> {
        if baud == 0 {
            return Err(Errno::EINVAL);
        }
        if self.starting.swap(true, Ordering::AcqRel) {
            return Err(Errno::EBUSY);
        }

        if let Some(set) = queue_set {
            self.rx.join(set, self.id.index() as u32);
        }

        without_interrupts(|| pins::configure(self.id, hw.pins));

        hw.nvic.set_priority(self.id.irq(), IRQ_PRIO_USART);
        hw.nvic.enable(self.id.irq());

        self.core_clock_hz.store(hw.core_clock_hz, Ordering::Release);
        self.set_speed(baud)?;
        self.regs.set_dma_transmit(false);

        let transmit = match self.tx_dma {
            Some(channel) => {
                hw.dma.allocate(channel, IRQ_PRIO_USART, self)?;
                hw.dma
                    .set_peripheral_address(channel, self.regs.data_register_address())?;
                self.regs.set_dma_transmit(true);
                Transmit::Dma {
                    manager: hw.dma,
                    channel,
                    done: Completion::new(),
                    flags: AtomicU32::new(0),
                }
            }
            None => Transmit::Queue(ByteQueue::new()),
        };
        self.tx.call_once(|| transmit);

        self.regs.set_control(
            UsartControl::UE | UsartControl::TE | UsartControl::RE | UsartControl::RXNEIE,
        );

        log::info!(
            "serial: {:?} started at {} baud, {} transmit",
            self.id,
            baud,
            if self.tx_dma.is_some() { "DMA" } else { "interrupt" }
        );
        Ok(())
    }

    /// Program the baud divisor.
    pub fn set_speed(&self, baud: u32) -> Result<(), Errno> {
        if baud == 0 {
            return Err(Errno::EINVAL);
        }
        let clock = self.core_clock_hz.load(Ordering::Acquire);
        self.speed.store(baud, Ordering::Release);
        self.regs
            .set_baud_divisor(self.id.baud_divisor(clock, baud));
        Ok(())
    }

    /// Wait for in-flight output to leave the wire, then change the baud rate.
    pub fn reconfigure(&self, baud: u32) -> Result<(), Errno> {
        if baud == 0 {
            return Err(Errno::EINVAL);
        }
        let _writer = self.lock_writer(Timeout::Forever)?;
        self.wait_transmit_complete();
        self.set_speed(baud)
    }

    /// Next received byte, waiting up to `timeout`.
    pub fn get(&self, timeout: Timeout) -> Result<u8, Errno> {
        if !self.is_started() {
            return Err(Errno::ENXIO);
        }
        self.rx.pop(timeout)
    }

    /// Bytes currently waiting in the receive queue.
    pub fn rx_pending(&self) -> usize {
        self.rx.len()
    }

    /// Discard buffered input; returns how many bytes were discarded.
    pub fn flush_input(&self) -> usize {
        self.rx.clear()
    }

    /// Received bytes dropped because the receive queue was full.
    pub fn dropped_bytes(&self) -> u32 {
        self.rx.dropped()
    }

    /// Transmit `data` as one uninterrupted transfer.
    pub fn write(&self, data: &[u8]) -> Result<usize, Errno> {
        self.write_timeout(data, Timeout::Forever)
    }

    pub fn puts(&self, s: &str) -> Result<usize, Errno> {
        self.write(s.as_bytes())
    }

    /// Like `write`, but give up if another writer holds the port longer
    /// than `timeout`.
    pub fn write_timeout(&self, data: &[u8], timeout: Timeout) -> Result<usize, Errno> {
        self.send(data, timeout)?;
        Ok(data.len())
    }

    /// Format into a 64 byte buffer and transmit it; longer output is cut.
    pub fn write_fmt(&self, args: fmt::Arguments<'_>) -> Result<usize, Errno> {
        if !self.is_started() {
            return Err(Errno::ENXIO);
        }
        let mut buf: FmtBuffer<SERIAL_FMT_SIZE> = FmtBuffer::new();
        // FmtBuffer truncates instead of failing
        let _ = fmt::Write::write_fmt(&mut buf, args);
        self.send(buf.as_bytes(), Timeout::Forever)?;
        Ok(buf.len())
    }

    /// Wait until the last byte has left the shift register.
    ///
    /// Spins on TC while holding the writer mutex.
    pub fn drain(&self) -> Result<(), Errno> {
        if !self.is_started() {
            return Err(Errno::ENXIO);
        }
        let _writer = self.lock_writer(Timeout::Forever)?;
        self.wait_transmit_complete();
        Ok(())
    }

    /// Transmit by polling TXE, bypassing queues, DMA and the writer mutex.
    ///
    /// Only for early boot output and panic paths. Does nothing before
    /// `start`: an unclocked USART never reports TXE.
    pub fn write_polled(&self, data: &[u8]) {
        if !self.is_started() {
            return;
        }
        for &byte in data {
            while !self.regs.status().contains(UsartStatus::TXE) {
                core::hint::spin_loop();
            }
            self.regs.write_data(byte);
        }
    }

    /// One transfer under the writer mutex.
    ///
    /// A transfer error is logged after the mutex is released, since the
    /// console logger may be writing to this same port.
    fn send(&self, data: &[u8], timeout: Timeout) -> Result<(), Errno> {
        let tx = self.tx.get().ok_or(Errno::ENXIO)?;
        let result = {
            let _writer = self.lock_writer(timeout)?;
            self.transmit(tx, data)
        };
        if result == Err(Errno::EIO) {
            log::warn!("serial: {:?} DMA transfer error", self.id);
        }
        result
    }

    fn lock_writer(&self, timeout: Timeout) -> Result<spin::MutexGuard<'_, ()>, Errno> {
        lock_within(&self.writer, timeout).ok_or(Errno::ETIMEDOUT)
    }

    fn wait_transmit_complete(&self) {
        while !self.regs.status().contains(UsartStatus::TC) {
            core::hint::spin_loop();
        }
    }

    // Writer mutex held by the caller.
    fn transmit(&self, tx: &Transmit, data: &[u8]) -> Result<(), Errno> {
        // TC only comes back after a byte goes out
        if data.is_empty() {
            return Ok(());
        }
        self.regs.clear_status(UsartStatus::TC);
        match tx {
            Transmit::Dma {
                manager,
                channel,
                done,
                flags,
            } => {
                let config =
                    DmaConfig::DIR | DmaConfig::MINC | DmaConfig::TEIE | DmaConfig::TCIE;
                for chunk in data.chunks(DMA_MAX_CHUNK) {
                    done.reset();
                    flags.store(0, Ordering::Release);
                    manager.start_transfer(
                        *channel,
                        config,
                        chunk.as_ptr() as usize,
                        chunk.len() as u16,
                    )?;
                    done.wait(Timeout::Forever)?;
                    let seen = DmaFlags::from_bits_truncate(flags.load(Ordering::Acquire));
                    if seen.contains(DmaFlags::TEIF) {
                        return Err(Errno::EIO);
                    }
                }
                Ok(())
            }
            Transmit::Queue(queue) => {
                for &byte in data {
                    queue.push(byte, Timeout::Forever)?;
                    without_interrupts(|| {
                        self.regs
                            .modify_control(UsartControl::TXEIE, UsartControl::empty())
                    });
                }
                Ok(())
            }
        }
    }

    /// USART interrupt service.
    pub fn on_interrupt(&self) {
        let status = self.regs.status();
        // SR then DR: also clears a pending overrun
        let data = self.regs.read_data();

        if status.contains(UsartStatus::RXNE) {
            self.rx.push_from_isr(data);
        }

        if status.contains(UsartStatus::TXE) {
            let next = match self.tx.get() {
                Some(Transmit::Queue(queue)) => queue.pop_from_isr(),
                _ => None,
            };
            match next {
                Some(byte) => self.regs.write_data(byte),
                None => self
                    .regs
                    .modify_control(UsartControl::empty(), UsartControl::TXEIE),
            }
        }
    }
}

impl DmaHandler for SerialPort {
    /// DMA completion (or error) of a transmit chunk.
    fn on_transfer_event(&self, event: DmaFlags) {
        if let Some(Transmit::Dma {
            manager,
            channel,
            done,
            flags,
        }) = self.tx.get()
        {
            let _ = manager.disable(*channel);
            flags.fetch_or(event.bits(), Ordering::AcqRel);
            done.signal_from_isr();
        }
    }
}

impl fmt::Debug for SerialPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialPort")
            .field("id", &self.id)
            .field("speed", &self.speed())
            .field("dma", &self.tx_dma)
            .field("started", &self.is_started())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_numbers_round_trip() {
        for port in PortId::ALL {
            assert_eq!(PortId::from_number(port.number()), Some(port));
        }
        assert_eq!(PortId::from_number(0), None);
        assert_eq!(PortId::from_number(6), None);
    }

    #[test]
    fn apb1_ports_use_half_the_core_clock() {
        assert_eq!(PortId::Usart1.baud_divisor(72_000_000, 9600), 7500);
        assert_eq!(PortId::Usart2.baud_divisor(72_000_000, 9600), 3750);
    }

    #[test]
    fn only_uart5_lacks_a_dma_channel() {
        let without: heapless::Vec<PortId, 5> = PortId::ALL
            .into_iter()
            .filter(|p| p.tx_dma_channel().is_none())
            .collect();
        assert_eq!(without.as_slice(), &[PortId::Uart5]);
    }
}
