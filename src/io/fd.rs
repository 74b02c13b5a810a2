/*
 * File Descriptor Table
 *
 * Fixed-size table mapping descriptor numbers to open-file records.
 *
 * Standard FDs:
 * - 0: stdin  (read)
 * - 1: stdout (write)
 * - 2: stderr (write)
 *
 * FDs 3+ are allocated dynamically, lowest free slot first. The standard
 * streams are only ever filled by `replace` (dup2).
 *
 * A slot is Free, Reserved or Open. Reserved covers the window in which
 * posixio has claimed a slot but is running a device handler with the table
 * unlocked; nothing else may reuse the slot during that time.
 */

use super::device::{Errno, OpenFile};
use crate::config::{FIRST_DYNAMIC_FD, MAX_OPEN_FILES};

/// File descriptor number.
pub type Fd = i32;

pub const STDIN_FILENO: Fd = 0;
pub const STDOUT_FILENO: Fd = 1;
pub const STDERR_FILENO: Fd = 2;

#[derive(Debug, Clone)]
enum Slot {
    Free,
    Reserved,
    Open(OpenFile),
}

/// Descriptor table
pub struct FileDescriptorTable {
    slots: [Slot; MAX_OPEN_FILES],
}

impl FileDescriptorTable {
    /// Create a new empty file descriptor table
    pub const fn new() -> Self {
        Self {
            slots: [const { Slot::Free }; MAX_OPEN_FILES],
        }
    }

    fn index(fd: Fd) -> Result<usize, Errno> {
        usize::try_from(fd)
            .ok()
            .filter(|&i| i < MAX_OPEN_FILES)
            .ok_or(Errno::EBADF)
    }

    /// Forget every record without running close handlers.
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = Slot::Free;
        }
    }

    /// Get the open file behind `fd`
    ///
    /// Returns EBADF if `fd` is out of range or not open.
    pub fn get(&self, fd: Fd) -> Result<&OpenFile, Errno> {
        match &self.slots[Self::index(fd)?] {
            Slot::Open(file) => Ok(file),
            _ => Err(Errno::EBADF),
        }
    }

    /// Claim the lowest free descriptor at or above 3.
    pub fn reserve(&mut self) -> Result<Fd, Errno> {
        let index = (FIRST_DYNAMIC_FD..MAX_OPEN_FILES)
            .find(|&i| matches!(self.slots[i], Slot::Free))
            .ok_or(Errno::EMFILE)?;
        self.slots[index] = Slot::Reserved;
        Ok(index as Fd)
    }

    /// Fill a slot claimed with `reserve`.
    pub fn install(&mut self, fd: Fd, file: OpenFile) -> Result<(), Errno> {
        let slot = &mut self.slots[Self::index(fd)?];
        match slot {
            Slot::Reserved => {
                *slot = Slot::Open(file);
                Ok(())
            }
            _ => Err(Errno::EBADF),
        }
    }

    /// Free a reserved or open slot.
    pub fn release(&mut self, fd: Fd) {
        if let Ok(index) = Self::index(fd) {
            self.slots[index] = Slot::Free;
        }
    }

    /// Put `file` at `fd` whatever was there, returning the record it
    /// replaces. A slot reserved by an open in progress is left alone.
    pub fn replace(&mut self, fd: Fd, file: OpenFile) -> Result<Option<OpenFile>, Errno> {
        let slot = &mut self.slots[Self::index(fd)?];
        match core::mem::replace(slot, Slot::Open(file)) {
            Slot::Free => Ok(None),
            Slot::Open(old) => Ok(Some(old)),
            Slot::Reserved => {
                *slot = Slot::Reserved;
                Err(Errno::EBUSY)
            }
        }
    }

    /// Take the record out of `fd` for closing; the slot stays reserved
    /// until `release`.
    pub fn begin_close(&mut self, fd: Fd) -> Result<OpenFile, Errno> {
        let slot = &mut self.slots[Self::index(fd)?];
        match core::mem::replace(slot, Slot::Reserved) {
            Slot::Open(file) => Ok(file),
            other => {
                *slot = other;
                Err(Errno::EBADF)
            }
        }
    }

    /// Get number of open file descriptors
    pub fn count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s, Slot::Open(_)))
            .count()
    }

    /// Check if a file descriptor is valid
    pub fn is_valid(&self, fd: Fd) -> bool {
        self.get(fd).is_ok()
    }
}

impl Default for FileDescriptorTable {
    fn default() -> Self {
        Self::new()
    }
}
