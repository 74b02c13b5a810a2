/*
 * Device Abstraction Layer
 *
 * Every device reachable through posixio implements `Device`. Each handler
 * is optional: the default implementation reports `Errno::ENOTSUP`, and the
 * routing layer turns that into the POSIX error the caller expects for that
 * particular operation (e.g. a missing read handler is EINVAL, a missing
 * stat handler is ENOENT).
 *
 * Handlers come in two groups:
 * - path based (open, stat, link, unlink) receive the path remainder after
 *   "/<device>/"
 * - handle based (close, read, write, seek, fstat, ioctl) receive the open
 *   file record, including the handle `open` returned
 */

use alloc::sync::Arc;
use core::fmt;

use bitflags::bitflags;

/// Device trait for everything posixio routes to.
pub trait Device: Send + Sync {
    /// Registry key; the first path component.
    fn name(&self) -> &str;

    /// Capabilities advertised by the device.
    fn capabilities(&self) -> DeviceCaps;

    /// Open `remainder` and return a device-private handle.
    ///
    /// A device without an open handler leaves the default, and its files
    /// carry no handle.
    fn open(
        &self,
        _remainder: &str,
        _flags: OpenFlags,
        _params: &OpenParams,
    ) -> Result<DeviceHandle, Errno> {
        Err(Errno::ENOTSUP)
    }

    fn close(&self, _file: &OpenFile) -> Result<(), Errno> {
        Err(Errno::ENOTSUP)
    }

    /// Read up to buf.len() bytes into buf
    ///
    /// Returns the number of bytes read, or an error.
    /// May block until data is available (for TTYs).
    fn read(&self, _file: &OpenFile, _buf: &mut [u8]) -> Result<usize, Errno> {
        Err(Errno::ENOTSUP)
    }

    /// Write buf.len() bytes from buf
    ///
    /// Returns the number of bytes written, or an error.
    fn write(&self, _file: &OpenFile, _buf: &[u8]) -> Result<usize, Errno> {
        Err(Errno::ENOTSUP)
    }

    fn seek(&self, _file: &OpenFile, _offset: i64, _whence: Whence) -> Result<u64, Errno> {
        Err(Errno::ENOTSUP)
    }

    /// Metadata of an open file.
    fn fstat(&self, _file: &OpenFile) -> Result<Stat, Errno> {
        Err(Errno::ENOTSUP)
    }

    /// Metadata of a path on this device.
    fn stat(&self, _remainder: &str) -> Result<Stat, Errno> {
        Err(Errno::ENOTSUP)
    }

    /// `old` is the remainder on this device, `new` the caller's full path.
    fn link(&self, _old: &str, _new: &str) -> Result<(), Errno> {
        Err(Errno::ENOTSUP)
    }

    fn unlink(&self, _remainder: &str) -> Result<(), Errno> {
        Err(Errno::ENOTSUP)
    }

    /// Device control operation
    fn ioctl(&self, _file: &OpenFile, _command: IoctlCommand, _arg: u32) -> Result<u32, Errno> {
        Err(Errno::ENOTSUP)
    }
}

/// POSIX errno values
///
/// Numbers follow newlib/Linux so they can be handed to C code unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Errno {
    EPERM = 1,       // Operation not permitted
    ENOENT = 2,      // No such file or directory
    EINTR = 4,       // Interrupted system call
    EIO = 5,         // I/O error
    ENXIO = 6,       // No such device or address
    EBADF = 9,       // Bad file descriptor
    EAGAIN = 11,     // Try again
    ENOMEM = 12,     // Out of memory
    EACCES = 13,     // Permission denied
    EFAULT = 14,     // Bad address
    EBUSY = 16,      // Device or resource busy
    EEXIST = 17,     // File exists
    ENODEV = 19,     // No such device
    EINVAL = 22,     // Invalid argument
    EMFILE = 24,     // Too many open files
    ENOTTY = 25,     // Not a typewriter
    ENOSPC = 28,     // No space left on device
    ESPIPE = 29,     // Illegal seek
    EMLINK = 31,     // Too many links
    ENOTSUP = 95,    // Operation not supported
    ETIMEDOUT = 110, // Timed out
}

impl Errno {
    /// Raw errno number.
    pub const fn code(self) -> i32 {
        self as i32
    }

    pub const fn description(self) -> &'static str {
        match self {
            Errno::EPERM => "operation not permitted",
            Errno::ENOENT => "no such file or directory",
            Errno::EINTR => "interrupted",
            Errno::EIO => "I/O error",
            Errno::ENXIO => "no such device or address",
            Errno::EBADF => "bad file descriptor",
            Errno::EAGAIN => "would block",
            Errno::ENOMEM => "out of memory",
            Errno::EACCES => "permission denied",
            Errno::EFAULT => "bad address",
            Errno::EBUSY => "resource busy",
            Errno::EEXIST => "already exists",
            Errno::ENODEV => "no such device",
            Errno::EINVAL => "invalid argument",
            Errno::EMFILE => "too many open files",
            Errno::ENOTTY => "inappropriate ioctl for device",
            Errno::ENOSPC => "device table full",
            Errno::ESPIPE => "illegal seek",
            Errno::EMLINK => "too many links",
            Errno::ENOTSUP => "operation not supported",
            Errno::ETIMEDOUT => "timed out",
        }
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.code())
    }
}

bitflags! {
    /// Flags passed to `open` (newlib values).
    ///
    /// Read-only is the absence of WRONLY and RDWR.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct OpenFlags: u32 {
        const WRONLY = 0x0001;
        const RDWR = 0x0002;
        const APPEND = 0x0008;
        const CREAT = 0x0200;
        const TRUNC = 0x0400;
        const EXCL = 0x0800;
        const NONBLOCK = 0x4000;
    }
}

impl OpenFlags {
    pub const RDONLY: Self = Self::empty();
}

bitflags! {
    /// Device capability flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DeviceCaps: u32 {
        /// Character stream
        const CHAR = 1 << 0;
        /// Block-addressable storage
        const BLOCK = 1 << 1;
        /// Terminal; `isatty` reports true
        const TTY = 1 << 2;
        /// Socket-like endpoint
        const SOCKET = 1 << 3;
    }
}

/// Extra `open` arguments, tagged by the capability they configure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenParams {
    #[default]
    None,
    /// Line settings for a TTY
    Tty { baud: u32 },
    /// Mode bits of a file created on block storage
    Create { mode: u32 },
}

impl OpenParams {
    /// True if a device with `caps` understands these parameters.
    pub fn accepted_by(&self, caps: DeviceCaps) -> bool {
        match self {
            OpenParams::None => true,
            OpenParams::Tty { .. } => caps.contains(DeviceCaps::TTY),
            OpenParams::Create { .. } => caps.contains(DeviceCaps::BLOCK),
        }
    }
}

/// Device control commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoctlCommand {
    /// Change the line speed; argument is the baud rate
    SetBaudRate,
    /// Current baud rate
    GetBaudRate,
    /// Wait until pending output has been sent
    Drain,
    /// Discard buffered input; returns the number of bytes discarded
    FlushInput,
    /// Input bytes lost to receive overrun
    DroppedBytes,
}

/// Origin of a `seek`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set,
    Cur,
    End,
}

/// Which peripheral a device file sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum DeviceClass {
    #[default]
    None = 0,
    Usart1 = 1,
    Usart2 = 2,
    Usart3 = 3,
    Uart4 = 4,
    Uart5 = 5,
}

/// Minimal stat structure
///
/// Subset of POSIX struct stat: enough for `isatty()`-style checks and for
/// telling serial ports apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stat {
    pub st_dev: DeviceClass,
    pub st_mode: u32,    // File type and mode
    pub st_size: u64,    // File size in bytes
    pub st_blksize: u64, // Block size for I/O
    pub st_blocks: u64,  // Number of 512B blocks allocated
}

// File type constants (POSIX)
pub const S_IFMT: u32 = 0o170000; // File type mask
pub const S_IFCHR: u32 = 0o020000; // Character device
pub const S_IFREG: u32 = 0o100000; // Regular file

/// Check if mode indicates a character device
#[allow(non_snake_case)]
#[inline]
pub fn S_ISCHR(mode: u32) -> bool {
    (mode & S_IFMT) == S_IFCHR
}

/// Opaque handle a device returns from `open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(pub u32);

/// State of one open file.
#[derive(Clone)]
pub struct OpenFile {
    /// Path remainder the file was opened with
    pub name: Arc<str>,
    pub device: Arc<dyn Device>,
    /// `None` when the device has no open handler
    pub handle: Option<DeviceHandle>,
    pub flags: OpenFlags,
}

impl fmt::Debug for OpenFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenFile")
            .field("device", &self.device.name())
            .field("name", &self.name)
            .field("handle", &self.handle)
            .field("flags", &self.flags)
            .finish()
    }
}
