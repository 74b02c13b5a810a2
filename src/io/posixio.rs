/*
 * posixio: Descriptor Routing Service
 *
 * This module ties the device registry, the path resolver and the
 * descriptor table together into the POSIX-style entry points tasks use:
 * open/close/read/write/seek/fstat/stat/link/unlink/isatty/ioctl/dup/dup2.
 *
 * Why this is important:
 * - It is the single place every consumer (stdio, CLI, LCD console) goes
 *   through to reach a device
 * - Its table is shared by all tasks and must never hand the same slot to
 *   two opens, or leave a slot pointing at a half-opened device
 *
 * ## Locking
 *
 * One mutex covers the registry and the table. It is only held for table
 * bookkeeping: device handlers always run with it released, so a read that
 * blocks on a serial port does not stall unrelated descriptors. An open
 * reserves its slot, runs the device's open handler unlocked, then installs
 * the record or gives the slot back.
 *
 * The lock wait is bounded (`FD_LOCK_TIMEOUT_TICKS`). Running out of time
 * means a lock holder is stuck, which is a bug, so it halts the system.
 *
 * ## Missing handlers
 *
 * A device that does not implement an operation reports `ENOTSUP`; the
 * caller sees the per-operation error below instead.
 *
 * | operation          | error    |
 * |--------------------|----------|
 * | read/write/seek    | EINVAL   |
 * | fstat/stat         | ENOENT   |
 * | link               | EMLINK   |
 * | unlink             | EINVAL   |
 * | ioctl              | ENOTTY   |
 * | open/close         | none: no handle / nothing to do |
 */

use alloc::sync::Arc;

use spin::{Mutex, MutexGuard};

use super::device::{
    Device, DeviceHandle, Errno, IoctlCommand, OpenFile, OpenFlags, OpenParams, Stat, Whence,
};
use super::fd::{Fd, FileDescriptorTable};
use super::path::split_path;
use super::registry::DeviceRegistry;
use crate::config::{FD_LOCK_TIMEOUT_TICKS, MAX_OPEN_FILES};
use crate::sync::lock_within;
use crate::utils::timer::Timeout;

struct State {
    devices: DeviceRegistry,
    files: FileDescriptorTable,
}

/// The descriptor routing service.
pub struct Posixio {
    state: Mutex<State>,
}

/// Translate a missing handler into the error for that operation.
fn unsupported_as(result_err: Errno, missing: Errno) -> Errno {
    if result_err == Errno::ENOTSUP {
        missing
    } else {
        result_err
    }
}

impl Posixio {
    /// Create an empty service: no devices, no open files.
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(State {
                devices: DeviceRegistry::new(),
                files: FileDescriptorTable::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        match lock_within(&self.state, Timeout::Ticks(FD_LOCK_TIMEOUT_TICKS)) {
            Some(guard) => guard,
            None => {
                log::error!("posixio: descriptor table lock timed out");
                panic!("posixio: descriptor table lock timed out");
            }
        }
    }

    /// Clear every descriptor slot and register the built-in devices.
    pub fn start(&self, builtin: impl IntoIterator<Item = Arc<dyn Device>>) -> Result<(), Errno> {
        self.lock().files.clear();
        for device in builtin {
            self.register_device(device)?;
        }
        log::info!("posixio: started");
        Ok(())
    }

    /// Add a device to the registry.
    ///
    /// `ENOSPC` when the registry is full, `EEXIST` for a duplicate name.
    pub fn register_device(&self, device: Arc<dyn Device>) -> Result<(), Errno> {
        let name = Arc::clone(&device);
        self.lock().devices.register(device)?;
        log::info!("posixio: registered device '{}'", name.name());
        Ok(())
    }

    /// Number of registered devices.
    pub fn device_count(&self) -> usize {
        self.lock().devices.len()
    }

    /// Number of open descriptors, standard streams included.
    pub fn open_count(&self) -> usize {
        self.lock().files.count()
    }

    pub fn is_open(&self, fd: Fd) -> bool {
        self.lock().files.is_valid(fd)
    }

    fn device(&self, name: &str) -> Result<Arc<dyn Device>, Errno> {
        self.lock()
            .devices
            .lookup(name)
            .cloned()
            .ok_or(Errno::ENODEV)
    }

    fn file(&self, fd: Fd) -> Result<OpenFile, Errno> {
        self.lock().files.get(fd).cloned()
    }

    // Runs the device's open handler for a new record.
    fn open_handle(
        device: &Arc<dyn Device>,
        remainder: &str,
        flags: OpenFlags,
        params: &OpenParams,
    ) -> Result<Option<DeviceHandle>, Errno> {
        match device.open(remainder, flags, params) {
            Ok(handle) => Ok(Some(handle)),
            Err(Errno::ENOTSUP) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Open `path` ("/<device>/<remainder>").
    pub fn open(&self, path: &str, flags: OpenFlags) -> Result<Fd, Errno> {
        self.open_with(path, flags, OpenParams::None)
    }

    /// Open with device-specific parameters.
    ///
    /// Parameters the device's capabilities do not cover fail with `EINVAL`.
    pub fn open_with(&self, path: &str, flags: OpenFlags, params: OpenParams) -> Result<Fd, Errno> {
        let (device_name, remainder) = split_path(path)?;

        let (device, fd) = {
            let mut state = self.lock();
            let device = state
                .devices
                .lookup(device_name)
                .cloned()
                .ok_or(Errno::ENODEV)?;
            if !params.accepted_by(device.capabilities()) {
                return Err(Errno::EINVAL);
            }
            let fd = state.files.reserve()?;
            (device, fd)
        };

        let handle = match Self::open_handle(&device, remainder, flags, &params) {
            Ok(handle) => handle,
            Err(e) => {
                self.lock().files.release(fd);
                return Err(e);
            }
        };

        let file = OpenFile {
            name: Arc::from(remainder),
            device,
            handle,
            flags,
        };
        self.lock().files.install(fd, file)?;

        log::debug!("posixio: opened {} as fd {}", path, fd);
        Ok(fd)
    }

    /// Close `fd`, running the device's close handler first.
    ///
    /// A failing close handler is logged; the descriptor is freed anyway.
    pub fn close(&self, fd: Fd) -> Result<(), Errno> {
        let file = self.lock().files.begin_close(fd)?;
        Self::close_file(fd, &file);
        self.lock().files.release(fd);
        log::debug!("posixio: closed fd {}", fd);
        Ok(())
    }

    fn close_file(fd: Fd, file: &OpenFile) {
        match file.device.close(file) {
            Ok(()) | Err(Errno::ENOTSUP) => {}
            Err(e) => log::warn!("posixio: close of fd {} failed: {}", fd, e),
        }
    }

    pub fn read(&self, fd: Fd, buf: &mut [u8]) -> Result<usize, Errno> {
        let file = self.file(fd)?;
        file.device
            .read(&file, buf)
            .map_err(|e| unsupported_as(e, Errno::EINVAL))
    }

    pub fn write(&self, fd: Fd, buf: &[u8]) -> Result<usize, Errno> {
        let file = self.file(fd)?;
        file.device
            .write(&file, buf)
            .map_err(|e| unsupported_as(e, Errno::EINVAL))
    }

    pub fn seek(&self, fd: Fd, offset: i64, whence: Whence) -> Result<u64, Errno> {
        let file = self.file(fd)?;
        file.device
            .seek(&file, offset, whence)
            .map_err(|e| unsupported_as(e, Errno::EINVAL))
    }

    pub fn fstat(&self, fd: Fd) -> Result<Stat, Errno> {
        let file = self.file(fd)?;
        file.device
            .fstat(&file)
            .map_err(|e| unsupported_as(e, Errno::ENOENT))
    }

    /// True if `fd` is on a TTY device.
    pub fn isatty(&self, fd: Fd) -> Result<bool, Errno> {
        let file = self.file(fd)?;
        Ok(file
            .device
            .capabilities()
            .contains(super::DeviceCaps::TTY))
    }

    pub fn ioctl(&self, fd: Fd, command: IoctlCommand, arg: u32) -> Result<u32, Errno> {
        let file = self.file(fd)?;
        file.device
            .ioctl(&file, command, arg)
            .map_err(|e| unsupported_as(e, Errno::ENOTTY))
    }

    pub fn stat(&self, path: &str) -> Result<Stat, Errno> {
        let (device_name, remainder) = split_path(path)?;
        self.device(device_name)?
            .stat(remainder)
            .map_err(|e| unsupported_as(e, Errno::ENOENT))
    }

    /// Link `old` to `new`; routed by the device of `old`.
    pub fn link(&self, old: &str, new: &str) -> Result<(), Errno> {
        let (device_name, remainder) = split_path(old)?;
        self.device(device_name)?
            .link(remainder, new)
            .map_err(|e| unsupported_as(e, Errno::EMLINK))
    }

    pub fn unlink(&self, path: &str) -> Result<(), Errno> {
        let (device_name, remainder) = split_path(path)?;
        self.device(device_name)?
            .unlink(remainder)
            .map_err(|e| unsupported_as(e, Errno::EINVAL))
    }

    // Copy of `file` with a fresh handle from the device's open handler.
    fn reopen(file: &OpenFile) -> Result<OpenFile, Errno> {
        let handle = Self::open_handle(&file.device, &file.name, file.flags, &OpenParams::None)?;
        Ok(OpenFile {
            handle,
            ..file.clone()
        })
    }

    /// Duplicate `fd` onto the lowest free descriptor.
    ///
    /// The copy does not share the original's handle: the device is opened
    /// again for it.
    pub fn dup(&self, fd: Fd) -> Result<Fd, Errno> {
        let (file, fd2) = {
            let mut state = self.lock();
            let file = state.files.get(fd)?.clone();
            let fd2 = state.files.reserve()?;
            (file, fd2)
        };

        let copy = match Self::reopen(&file) {
            Ok(copy) => copy,
            Err(e) => {
                self.lock().files.release(fd2);
                return Err(e);
            }
        };
        self.lock().files.install(fd2, copy)?;

        log::debug!("posixio: dup fd {} -> {}", fd, fd2);
        Ok(fd2)
    }

    /// Make `fd2` a copy of `fd`, closing whatever `fd2` held.
    ///
    /// `dup2(fd, fd)` returns `fd` without touching anything. Like `dup`,
    /// the device is opened again for the copy.
    pub fn dup2(&self, fd: Fd, fd2: Fd) -> Result<Fd, Errno> {
        let in_range = |n: Fd| (0..MAX_OPEN_FILES as Fd).contains(&n);
        if !in_range(fd) {
            return Err(Errno::EBADF);
        }
        if fd == fd2 {
            return Ok(fd);
        }
        if !in_range(fd2) {
            return Err(Errno::EBADF);
        }

        let file = self.file(fd)?;
        let copy = Self::reopen(&file)?;

        let replaced = match self.lock().files.replace(fd2, copy.clone()) {
            Ok(replaced) => replaced,
            Err(e) => {
                Self::close_file(fd2, &copy);
                return Err(e);
            }
        };
        if let Some(old) = replaced {
            Self::close_file(fd2, &old);
        }

        log::debug!("posixio: dup2 fd {} -> {}", fd, fd2);
        Ok(fd2)
    }
}

impl Default for Posixio {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "descriptor table lock timed out")]
    fn stuck_table_lock_is_fatal() {
        crate::tests::mock::init();
        let posixio = Posixio::new();
        let _held = posixio.state.lock();
        let _ = posixio.open_count();
    }

    static SERVICE: Posixio = Posixio::new();

    #[test]
    fn service_lives_in_a_plain_static() {
        crate::tests::mock::init();
        SERVICE.start(Vec::<Arc<dyn Device>>::new()).unwrap();
        assert_eq!(SERVICE.device_count(), 0);
        assert_eq!(SERVICE.open("/none/x", OpenFlags::RDWR), Err(Errno::ENODEV));
        assert_eq!(SERVICE.open_count(), 0);
    }
}
