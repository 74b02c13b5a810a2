/*
 * Memory-Mapped I/O (MMIO) Implementation
 *
 * This module provides a safe Rust interface to memory-mapped peripheral
 * registers. Every STM32 peripheral (USART, DMA, RCC, GPIO, NVIC) is driven
 * through volatile loads and stores at fixed bus addresses.
 *
 * Why this is important:
 * - Prevents the compiler from caching, merging or reordering register access
 * - Provides typed access for the register widths in use (u8 priority
 *   bytes, u32 everywhere else)
 * - Forms the basis of the STM32F1 register blocks in `arch::stm32f1`
 *
 * Registers are shared hardware, so writes take `&self`: the owner of a
 * register block decides how concurrent access is serialized.
 */

use core::marker::PhantomData;
use core::ptr::NonNull;

use volatile::VolatilePtr;

/// I/O interface trait
pub trait Io {
    /// The value type used for I/O operations.
    type Value: Copy
        + PartialEq
        + core::ops::BitAnd<Output = Self::Value>
        + core::ops::BitOr<Output = Self::Value>
        + core::ops::Not<Output = Self::Value>;

    /// Reads the value from the I/O interface.
    fn read(&self) -> Self::Value;

    /// Writes the value to the I/O interface.
    fn write(&self, value: Self::Value);

    /// Reads the value from the I/O interface and checks if the specified flags are set.
    fn readf(&self, flags: Self::Value) -> bool {
        (self.read() & flags) == flags
    }

    /// Writes the value to the I/O interface with the specified flags.
    fn writef(&self, flags: Self::Value, value: bool) {
        let tmp: Self::Value = match value {
            true => self.read() | flags,
            false => self.read() & !flags,
        };
        self.write(tmp);
    }
}

/// Memory-mapped register
pub struct Mmio<T> {
    address: usize,
    value: PhantomData<T>,
}

impl<T> Mmio<T> {
    /// Create a new MMIO register at the given bus address.
    pub const fn new(address: usize) -> Self {
        Mmio::<T> {
            address,
            value: PhantomData,
        }
    }

    /// The register's bus address.
    pub const fn address(&self) -> usize {
        self.address
    }

    fn ptr(&self) -> VolatilePtr<'_, T> {
        // SAFETY: register blocks are only constructed from the fixed
        // peripheral addresses of the memory map, which are non-null,
        // aligned and valid for the lifetime of the program.
        unsafe { VolatilePtr::new(NonNull::new_unchecked(self.address as *mut T)) }
    }
}

// SAFETY: an Mmio is just an address; the hardware serializes the access.
unsafe impl<T> Sync for Mmio<T> {}
unsafe impl<T> Send for Mmio<T> {}

/// Read/Write for byte registers
impl Io for Mmio<u8> {
    type Value = u8;

    #[inline(always)]
    fn read(&self) -> u8 {
        self.ptr().read()
    }

    #[inline(always)]
    fn write(&self, value: u8) {
        self.ptr().write(value)
    }
}

/// Read/Write for word registers
impl Io for Mmio<u32> {
    type Value = u32;

    #[inline(always)]
    fn read(&self) -> u32 {
        self.ptr().read()
    }

    #[inline(always)]
    fn write(&self, value: u32) {
        self.ptr().write(value)
    }
}
