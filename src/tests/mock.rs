/*
 * Host Mocks of the Hardware Capabilities
 *
 * Stand-ins for the USART, DMA, NVIC and RCC/GPIO register blocks so the
 * drivers run unchanged on the host.
 *
 * "Interrupts" are delivered the way the hardware would raise them:
 * - arming TXEIE on a USART runs the port's interrupt handler until it
 *   disarms it again, moving queued bytes onto the wire
 * - enabling a DMA channel performs the transfer into the USART the
 *   channel's peripheral address points at, then services the channel
 *   through the DMA manager
 * - `MockUsart::receive` plays incoming bytes through the RX interrupt
 *
 * One lock per USART keeps its interrupt handler from running on two
 * threads at once, as on a single core.
 */

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Instant;
use std::vec::Vec;

use crate::arch::{
    ClockGates, DmaConfig, DmaController, DmaFlags, DmaRegisters, GpioConfigRegister,
    InterruptController, Irq, PinConfig, UsartControl, UsartRegisters, UsartStatus,
};
use crate::drivers::Peripherals;
use crate::drivers::dma::{DMA_CHANNEL_COUNT, DmaChannel, DmaChannelManager};
use crate::drivers::serial::{PortId, SerialPort};
use crate::utils::timer::{self, Clock};

/// Give a value a `'static` lifetime for the length of the test run.
pub fn leak<T>(value: T) -> &'static T {
    Box::leak(Box::new(value))
}

/// Millisecond clock that yields the thread while waiting.
struct HostClock {
    epoch: Instant,
}

impl Clock for HostClock {
    fn now(&self) -> u32 {
        self.epoch.elapsed().as_millis() as u32
    }

    fn idle(&self) {
        std::thread::yield_now();
    }
}

static HOST_CLOCK: OnceLock<HostClock> = OnceLock::new();

/// Install the host clock (one tick = one millisecond).
pub fn init() {
    let clock = HOST_CLOCK.get_or_init(|| HostClock {
        epoch: Instant::now(),
    });
    timer::install_clock(clock);
}

/// USART register block with a recorded wire.
pub struct MockUsart {
    status: AtomicU32,
    control: AtomicU32,
    dma_transmit: AtomicBool,
    baud_divisor: AtomicU32,
    rx_data: AtomicU32,
    wire: Mutex<Vec<u8>>,
    /// Without its bus clock the block reads back all zeroes
    clocked: bool,
    port: OnceLock<&'static SerialPort>,
    /// Held while the port's interrupt handler runs
    isr: Mutex<()>,
}

impl MockUsart {
    pub fn new() -> Self {
        Self::with_clock(true)
    }

    /// A block whose status register stays empty: TXE and TC never set.
    pub fn unclocked() -> Self {
        Self::with_clock(false)
    }

    fn with_clock(clocked: bool) -> Self {
        let status = if clocked {
            UsartStatus::TXE | UsartStatus::TC
        } else {
            UsartStatus::empty()
        };
        Self {
            status: AtomicU32::new(status.bits()),
            control: AtomicU32::new(0),
            dma_transmit: AtomicBool::new(false),
            baud_divisor: AtomicU32::new(0),
            rx_data: AtomicU32::new(0),
            wire: Mutex::new(Vec::new()),
            clocked,
            port: OnceLock::new(),
            isr: Mutex::new(()),
        }
    }

    /// Route this block's interrupts to `port`.
    pub fn attach(&self, port: &'static SerialPort) {
        let _ = self.port.set(port);
    }

    /// Everything transmitted so far, removed from the record.
    pub fn take_wire(&self) -> Vec<u8> {
        std::mem::take(&mut *self.wire.lock().unwrap())
    }

    pub fn wire_len(&self) -> usize {
        self.wire.lock().unwrap().len()
    }

    pub fn baud_divisor(&self) -> u32 {
        self.baud_divisor.load(Ordering::SeqCst)
    }

    pub fn dma_transmit(&self) -> bool {
        self.dma_transmit.load(Ordering::SeqCst)
    }

    pub fn control_bits(&self) -> UsartControl {
        UsartControl::from_bits_truncate(self.control.load(Ordering::SeqCst))
    }

    /// Deliver `bytes` through the receive interrupt, one at a time.
    pub fn receive(&self, bytes: &[u8]) {
        let Some(port) = self.port.get() else {
            return;
        };
        for &byte in bytes {
            let _isr = self.isr.lock().unwrap();
            self.rx_data.store(byte as u32, Ordering::SeqCst);
            self.status
                .fetch_or(UsartStatus::RXNE.bits(), Ordering::SeqCst);
            port.on_interrupt();
        }
    }

    fn service_transmit(&self) {
        let Some(port) = self.port.get() else {
            return;
        };
        loop {
            let _isr = self.isr.lock().unwrap();
            if !self.control_bits().contains(UsartControl::TXEIE) {
                break;
            }
            port.on_interrupt();
        }
    }
}

impl UsartRegisters for MockUsart {
    fn status(&self) -> UsartStatus {
        UsartStatus::from_bits_truncate(self.status.load(Ordering::SeqCst))
    }

    fn clear_status(&self, flags: UsartStatus) {
        self.status.fetch_and(!flags.bits(), Ordering::SeqCst);
    }

    fn read_data(&self) -> u8 {
        self.status
            .fetch_and(!UsartStatus::RXNE.bits(), Ordering::SeqCst);
        self.rx_data.load(Ordering::SeqCst) as u8
    }

    fn write_data(&self, byte: u8) {
        if !self.clocked {
            return;
        }
        self.wire.lock().unwrap().push(byte);
        // The mock line is infinitely fast
        self.status
            .fetch_or((UsartStatus::TXE | UsartStatus::TC).bits(), Ordering::SeqCst);
    }

    fn control(&self) -> UsartControl {
        self.control_bits()
    }

    fn set_control(&self, control: UsartControl) {
        self.control.store(control.bits(), Ordering::SeqCst);
        if control.contains(UsartControl::TXEIE) {
            self.service_transmit();
        }
    }

    fn modify_control(&self, set: UsartControl, clear: UsartControl) {
        let before = self
            .control
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
                Some((v | set.bits()) & !clear.bits())
            })
            .unwrap_or_default();
        let after = UsartControl::from_bits_truncate((before | set.bits()) & !clear.bits());
        if after.contains(UsartControl::TXEIE) && set.contains(UsartControl::TXEIE) {
            self.service_transmit();
        }
    }

    fn set_dma_transmit(&self, enabled: bool) {
        self.dma_transmit.store(enabled, Ordering::SeqCst);
    }

    fn set_baud_divisor(&self, divisor: u32) {
        self.baud_divisor.store(divisor, Ordering::SeqCst);
    }

    fn data_register_address(&self) -> usize {
        &self.rx_data as *const AtomicU32 as usize
    }
}

/// Programming of one mock DMA channel.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ChannelRegs {
    pub ccr: u32,
    pub cndtr: u32,
    pub cpar: usize,
    pub cmar: usize,
}

/// Both DMA controllers.
pub struct MockDma {
    channels: Mutex<[ChannelRegs; DMA_CHANNEL_COUNT]>,
    isr: [AtomicU32; 2],
    sinks: Mutex<Vec<(usize, &'static MockUsart)>>,
    manager: OnceLock<&'static DmaChannelManager>,
    fail_on: Mutex<Option<Vec<u8>>>,
    transfers: AtomicU32,
}

fn controller_slot(controller: DmaController) -> usize {
    match controller {
        DmaController::Dma1 => 0,
        DmaController::Dma2 => 1,
    }
}

fn channel_of(controller: DmaController, channel: u8) -> &'static DmaChannel {
    DmaChannel::find(controller, channel).expect("mock DMA: no such channel")
}

impl MockDma {
    pub fn new() -> Self {
        Self {
            channels: Mutex::new([ChannelRegs::default(); DMA_CHANNEL_COUNT]),
            isr: [AtomicU32::new(0), AtomicU32::new(0)],
            sinks: Mutex::new(Vec::new()),
            manager: OnceLock::new(),
            fail_on: Mutex::new(None),
            transfers: AtomicU32::new(0),
        }
    }

    /// Deliver completion interrupts through `manager`.
    pub fn connect(&self, manager: &'static DmaChannelManager) {
        let _ = self.manager.set(manager);
    }

    /// Make transfers to `usart`'s data register land on its wire.
    pub fn add_sink(&self, usart: &'static MockUsart) {
        self.sinks
            .lock()
            .unwrap()
            .push((usart.data_register_address(), usart));
    }

    /// The next transfer of exactly `data` ends with a transfer error
    /// instead of moving it. Other transfers are unaffected.
    pub fn fail_transfer_of(&self, data: &[u8]) {
        *self.fail_on.lock().unwrap() = Some(data.to_vec());
    }

    /// Number of transfers started.
    pub fn transfers(&self) -> u32 {
        self.transfers.load(Ordering::SeqCst)
    }

    pub fn regs(&self, index: usize) -> ChannelRegs {
        self.channels.lock().unwrap()[index]
    }

    /// Set channel flags as if the hardware raised them, without an interrupt.
    pub fn raise(&self, index: usize, flags: DmaFlags) {
        let ch = &crate::drivers::dma::DMA_CHANNELS[index];
        self.isr[controller_slot(ch.controller)]
            .fetch_or(flags.bits() << ch.flag_shift, Ordering::SeqCst);
    }

    /// Pending flags of channel `index`.
    pub fn pending(&self, index: usize) -> DmaFlags {
        let ch = &crate::drivers::dma::DMA_CHANNELS[index];
        let isr = self.isr[controller_slot(ch.controller)].load(Ordering::SeqCst);
        DmaFlags::from_bits_truncate(isr >> ch.flag_shift)
    }

    fn run_transfer(&self, ch: &DmaChannel, regs: ChannelRegs) {
        self.transfers.fetch_add(1, Ordering::SeqCst);
        // SAFETY: the writer blocks until this transfer completes, so the
        // buffer programmed into CMAR is alive.
        let data =
            unsafe { std::slice::from_raw_parts(regs.cmar as *const u8, regs.cndtr as usize) };
        let failed = {
            let mut fail_on = self.fail_on.lock().unwrap();
            let hit = fail_on.as_deref() == Some(data);
            if hit {
                *fail_on = None;
            }
            hit
        };
        let flags = if failed {
            DmaFlags::GIF | DmaFlags::TEIF
        } else {
            let sink = self
                .sinks
                .lock()
                .unwrap()
                .iter()
                .find(|(address, _)| *address == regs.cpar)
                .map(|(_, usart)| *usart);
            if let Some(usart) = sink {
                for &byte in data {
                    usart.write_data(byte);
                }
            }
            self.channels.lock().unwrap()[ch.index].cndtr = 0;
            DmaFlags::GIF | DmaFlags::TCIF
        };
        self.raise(ch.index, flags);
        if let Some(manager) = self.manager.get() {
            manager.on_channel_interrupt(ch.index);
        }
    }
}

impl DmaRegisters for MockDma {
    fn config(&self, controller: DmaController, channel: u8) -> DmaConfig {
        let ch = channel_of(controller, channel);
        DmaConfig::from_bits_retain(self.channels.lock().unwrap()[ch.index].ccr)
    }

    fn set_config(&self, controller: DmaController, channel: u8, config: DmaConfig) {
        let ch = channel_of(controller, channel);
        let start = {
            let mut channels = self.channels.lock().unwrap();
            let regs = &mut channels[ch.index];
            let was_enabled = regs.ccr & DmaConfig::EN.bits() != 0;
            regs.ccr = config.bits();
            (config.contains(DmaConfig::EN) && !was_enabled && regs.cndtr > 0).then_some(*regs)
        };
        if let Some(regs) = start {
            self.run_transfer(ch, regs);
        }
    }

    fn set_memory_address(&self, controller: DmaController, channel: u8, address: usize) {
        let ch = channel_of(controller, channel);
        self.channels.lock().unwrap()[ch.index].cmar = address;
    }

    fn set_peripheral_address(&self, controller: DmaController, channel: u8, address: usize) {
        let ch = channel_of(controller, channel);
        self.channels.lock().unwrap()[ch.index].cpar = address;
    }

    fn set_transfer_count(&self, controller: DmaController, channel: u8, count: u16) {
        let ch = channel_of(controller, channel);
        self.channels.lock().unwrap()[ch.index].cndtr = count as u32;
    }

    fn interrupt_status(&self, controller: DmaController) -> u32 {
        self.isr[controller_slot(controller)].load(Ordering::SeqCst)
    }

    fn clear_interrupt_flags(&self, controller: DmaController, mask: u32) {
        self.isr[controller_slot(controller)].fetch_and(!mask, Ordering::SeqCst);
    }
}

/// Interrupt controller recording enables and priorities.
#[derive(Default)]
pub struct MockNvic {
    enabled: Mutex<HashSet<u16>>,
    priorities: Mutex<HashMap<u16, u8>>,
}

impl MockNvic {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self, irq: Irq) -> bool {
        self.enabled.lock().unwrap().contains(&irq.0)
    }

    pub fn priority(&self, irq: Irq) -> Option<u8> {
        self.priorities.lock().unwrap().get(&irq.0).copied()
    }
}

impl InterruptController for MockNvic {
    fn set_priority(&self, irq: Irq, priority: u8) {
        self.priorities.lock().unwrap().insert(irq.0, priority);
    }

    fn enable(&self, irq: Irq) {
        self.enabled.lock().unwrap().insert(irq.0);
    }

    fn disable(&self, irq: Irq) {
        self.enabled.lock().unwrap().remove(&irq.0);
    }
}

/// RCC gates and GPIO configuration registers.
#[derive(Default)]
pub struct MockPins {
    gates: Mutex<ClockGates>,
    config: Mutex<HashMap<GpioConfigRegister, u32>>,
    /// GPIO writes made while interrupts were enabled
    unmasked_writes: AtomicU32,
}

impl MockPins {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gates(&self) -> ClockGates {
        *self.gates.lock().unwrap()
    }

    pub fn unmasked_writes(&self) -> u32 {
        self.unmasked_writes.load(Ordering::SeqCst)
    }

    /// The 4-bit MODE/CNF field at `shift` in `register`.
    pub fn field(&self, register: GpioConfigRegister, shift: u32) -> u32 {
        (self.read_config(register) >> shift) & 0xF
    }
}

impl PinConfig for MockPins {
    fn enable_clocks(&self, gates: ClockGates) {
        let mut current = self.gates.lock().unwrap();
        current.apb2 |= gates.apb2;
        current.apb1 |= gates.apb1;
        current.ahb |= gates.ahb;
    }

    fn read_config(&self, register: GpioConfigRegister) -> u32 {
        // Reset value: every pin a floating input
        *self
            .config
            .lock()
            .unwrap()
            .get(&register)
            .unwrap_or(&0x4444_4444)
    }

    fn write_config(&self, register: GpioConfigRegister, value: u32) {
        if crate::arch::interrupts::are_enabled() {
            self.unmasked_writes.fetch_add(1, Ordering::SeqCst);
        }
        self.config.lock().unwrap().insert(register, value);
    }
}

/// A complete set of mock hardware with its own DMA manager.
pub struct Board {
    pub usarts: [&'static MockUsart; 5],
    pub dma: &'static MockDma,
    pub nvic: &'static MockNvic,
    pub pins: &'static MockPins,
    pub manager: &'static DmaChannelManager,
}

pub const CORE_CLOCK_HZ: u32 = 72_000_000;

impl Board {
    pub fn new() -> Self {
        init();
        let dma = leak(MockDma::new());
        let nvic = leak(MockNvic::new());
        let manager = leak(DmaChannelManager::new(dma, nvic));
        dma.connect(manager);
        Self {
            usarts: [(); 5].map(|_| leak(MockUsart::new())),
            dma,
            nvic,
            pins: leak(MockPins::new()),
            manager,
        }
    }

    pub fn peripherals(&self) -> Peripherals {
        Peripherals {
            pins: self.pins,
            nvic: self.nvic,
            dma: self.manager,
            core_clock_hz: CORE_CLOCK_HZ,
        }
    }

    pub fn usart(&self, id: PortId) -> &'static MockUsart {
        self.usarts[id.index()]
    }

    /// Port `id` on its mock USART; DMA transmit on the port's usual
    /// channel if `dma` is set.
    pub fn port(&self, id: PortId, dma: bool) -> &'static SerialPort {
        let usart = self.usart(id);
        let channel = if dma { id.tx_dma_channel() } else { None };
        let port = leak(SerialPort::new(id, usart, channel));
        usart.attach(port);
        self.dma.add_sink(usart);
        port
    }

    /// Like `port`, already started at `baud`.
    pub fn started_port(&self, id: PortId, dma: bool, baud: u32) -> &'static SerialPort {
        let port = self.port(id, dma);
        port.start(&self.peripherals(), baud, None)
            .expect("mock port failed to start");
        port
    }
}
