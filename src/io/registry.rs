use alloc::sync::Arc;

use heapless::Vec;

use super::{Device, Errno};
use crate::config::MAX_DEVICES;

/// Fixed-capacity list of registered devices.
///
/// Devices are registered once at start-up and never removed, so a lookup
/// result stays valid for as long as anything holds it.
pub struct DeviceRegistry {
    devices: Vec<Arc<dyn Device>, MAX_DEVICES>,
}

impl DeviceRegistry {
    pub const fn new() -> Self {
        Self {
            devices: Vec::new(),
        }
    }

    /// Add a device.
    ///
    /// Fails with `ENOSPC` when the table is full and with `EEXIST` when the
    /// name is taken; the registry is unchanged in both cases.
    pub fn register(&mut self, device: Arc<dyn Device>) -> Result<(), Errno> {
        if self.lookup(device.name()).is_some() {
            return Err(Errno::EEXIST);
        }
        self.devices.push(device).map_err(|_| Errno::ENOSPC)
    }

    pub fn lookup(&self, name: &str) -> Option<&Arc<dyn Device>> {
        self.devices.iter().find(|d| d.name() == name)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.devices.iter().map(|d| d.name())
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
