/*
 * Input/Output System
 *
 * This module provides the hardware register access primitives and the
 * posixio layer: the device abstraction, the descriptor table, the device
 * registry, path routing and the serial device that exposes the serial
 * driver as files.
 */

pub mod device;
pub mod fd;
pub mod mmio;
pub mod path;
pub mod posixio;
pub mod registry;
pub mod serial_device;
pub mod stdio;

pub use mmio::{Io, Mmio};

// Re-export device abstraction types
pub use device::{
    Device, DeviceCaps, DeviceClass, DeviceHandle, Errno, IoctlCommand, OpenFile, OpenFlags,
    OpenParams, S_IFCHR, S_IFMT, S_ISCHR, Stat, Whence,
};
pub use fd::{Fd, FileDescriptorTable};
pub use path::split_path;
pub use posixio::Posixio;
pub use registry::DeviceRegistry;
pub use serial_device::SerialDevice;
