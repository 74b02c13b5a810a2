/*
 * Serial Device
 *
 * Adapts `SerialPort` to the `Device` trait so serial ports can be opened
 * through posixio.
 *
 * The built-in device is named "serial" and picks the port from the path
 * remainder: "/serial/1" is USART1 up to "/serial/5" for UART5. A device can
 * also be bound to one port, in which case the remainder is ignored.
 *
 * Reads block until at least one byte has arrived, then return whatever
 * else is already buffered. With `O_NONBLOCK` an empty port reports EAGAIN
 * instead of waiting.
 */

use alloc::string::String;

use super::device::{
    Device, DeviceCaps, DeviceClass, DeviceHandle, Errno, IoctlCommand, OpenFile, OpenFlags,
    OpenParams, S_IFCHR, Stat,
};
use crate::drivers::serial::{PortId, SerialPort};
use crate::utils::timer::Timeout;

/// How a device chooses its port.
pub enum PortSelect {
    /// Remainder "1".."5" selects from this table (indexed by `PortId::index`)
    ByPath([Option<&'static SerialPort>; 5]),
    /// Always this port
    Fixed(&'static SerialPort),
}

/// Serial port device
pub struct SerialDevice {
    name: String,
    ports: PortSelect,
}

impl From<PortId> for DeviceClass {
    fn from(port: PortId) -> Self {
        match port {
            PortId::Usart1 => DeviceClass::Usart1,
            PortId::Usart2 => DeviceClass::Usart2,
            PortId::Usart3 => DeviceClass::Usart3,
            PortId::Uart4 => DeviceClass::Uart4,
            PortId::Uart5 => DeviceClass::Uart5,
        }
    }
}

impl SerialDevice {
    /// Device `name` routing "/<name>/<n>" to `ports[n - 1]`.
    pub fn new(name: &str, ports: [Option<&'static SerialPort>; 5]) -> Self {
        Self {
            name: String::from(name),
            ports: PortSelect::ByPath(ports),
        }
    }

    /// Device `name` bound to one port.
    pub fn fixed(name: &str, port: &'static SerialPort) -> Self {
        Self {
            name: String::from(name),
            ports: PortSelect::Fixed(port),
        }
    }

    /// Port named by a path remainder.
    fn port_for_path(&self, remainder: &str) -> Option<&'static SerialPort> {
        match &self.ports {
            PortSelect::ByPath(table) => remainder
                .parse::<u32>()
                .ok()
                .and_then(PortId::from_number)
                .and_then(|id| table[id.index()]),
            PortSelect::Fixed(port) => Some(*port),
        }
    }

    /// Port behind an open file's handle.
    fn port_for_handle(&self, handle: Option<DeviceHandle>) -> Option<&'static SerialPort> {
        let id = PortId::from_number(handle?.0)?;
        match &self.ports {
            PortSelect::ByPath(table) => table[id.index()],
            PortSelect::Fixed(port) => (port.id() == id).then_some(*port),
        }
    }

    fn port(&self, file: &OpenFile) -> Result<&'static SerialPort, Errno> {
        self.port_for_handle(file.handle).ok_or(Errno::EBADF)
    }

    fn stat_of(port: &SerialPort) -> Stat {
        Stat {
            st_dev: port.id().into(),
            st_mode: S_IFCHR,
            ..Stat::default()
        }
    }
}

impl Device for SerialDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> DeviceCaps {
        DeviceCaps::CHAR | DeviceCaps::TTY
    }

    fn open(
        &self,
        remainder: &str,
        _flags: OpenFlags,
        params: &OpenParams,
    ) -> Result<DeviceHandle, Errno> {
        let port = self.port_for_path(remainder).ok_or(Errno::ENOENT)?;
        if !port.is_started() {
            return Err(Errno::ENXIO);
        }
        if let OpenParams::Tty { baud } = *params {
            port.reconfigure(baud)?;
        }
        Ok(DeviceHandle(port.id().number()))
    }

    fn close(&self, file: &OpenFile) -> Result<(), Errno> {
        self.port_for_handle(file.handle)
            .map(|_| ())
            .ok_or(Errno::ENOENT)
    }

    fn read(&self, file: &OpenFile, buf: &mut [u8]) -> Result<usize, Errno> {
        let port = self.port(file)?;
        if buf.is_empty() {
            return Ok(0);
        }

        buf[0] = if file.flags.contains(OpenFlags::NONBLOCK) {
            port.get(Timeout::Immediate).map_err(|_| Errno::EAGAIN)?
        } else {
            port.get(Timeout::Forever)?
        };

        let mut count = 1;
        while count < buf.len() {
            match port.get(Timeout::Immediate) {
                Ok(byte) => {
                    buf[count] = byte;
                    count += 1;
                }
                Err(_) => break,
            }
        }
        Ok(count)
    }

    fn write(&self, file: &OpenFile, buf: &[u8]) -> Result<usize, Errno> {
        self.port(file)?.write(buf)
    }

    fn fstat(&self, file: &OpenFile) -> Result<Stat, Errno> {
        Ok(Self::stat_of(self.port(file)?))
    }

    fn stat(&self, remainder: &str) -> Result<Stat, Errno> {
        self.port_for_path(remainder)
            .map(Self::stat_of)
            .ok_or(Errno::ENOENT)
    }

    fn ioctl(&self, file: &OpenFile, command: IoctlCommand, arg: u32) -> Result<u32, Errno> {
        let port = self.port(file)?;
        match command {
            IoctlCommand::SetBaudRate => port.reconfigure(arg).map(|()| 0),
            IoctlCommand::GetBaudRate => Ok(port.speed()),
            IoctlCommand::Drain => port.drain().map(|()| 0),
            IoctlCommand::FlushInput => Ok(port.flush_input() as u32),
            IoctlCommand::DroppedBytes => Ok(port.dropped_bytes()),
        }
    }
}
