//! Access to the memory mapped System Control Space.

use crate::log;
use core::fmt::Debug;

/// An interface to the memory the debugger runs against.
///
/// On the device this is plain volatile access to the System Control Space and
/// to flash. In tests it is a simulated register file, see
/// [`MockMemory`](crate::test::MockMemory).
///
/// Accesses are infallible: every address the debugger touches is either an
/// architecturally defined register or the instruction it just trapped on.
pub trait MemoryInterface {
    /// Read a 32bit word at `address`.
    ///
    /// The address has to be a multiple of 4.
    fn read_word_32(&mut self, address: u32) -> u32;

    /// Write a 32bit word at `address`.
    ///
    /// The address has to be a multiple of 4.
    fn write_word_32(&mut self, address: u32, data: u32);

    /// Read a 16bit half-word at `address`.
    ///
    /// The address has to be a multiple of 2. Thumb instructions are fetched
    /// this way.
    fn read_word_16(&mut self, address: u32) -> u16;
}

impl<T: MemoryInterface + ?Sized> MemoryInterface for &mut T {
    fn read_word_32(&mut self, address: u32) -> u32 {
        (**self).read_word_32(address)
    }

    fn write_word_32(&mut self, address: u32, data: u32) {
        (**self).write_word_32(address, data)
    }

    fn read_word_16(&mut self, address: u32) -> u16 {
        (**self).read_word_16(address)
    }
}

/// A memory mapped register, for instance ARM debug registers (DHCSR, etc).
pub trait MemoryMappedRegister: Copy + From<u32> + Into<u32> + Debug {
    /// The register's address in the target memory.
    const ADDRESS: u32;
    /// The register's name.
    const NAME: &'static str;

    /// Read the register.
    fn load<M: MemoryInterface + ?Sized>(memory: &mut M) -> Self {
        Self::from(memory.read_word_32(Self::ADDRESS))
    }

    /// Write `self` to the register.
    fn store<M: MemoryInterface + ?Sized>(self, memory: &mut M) {
        let value: u32 = self.into();
        log::trace!("{} <- {:#010x}", Self::NAME, value);
        memory.write_word_32(Self::ADDRESS, value)
    }

    /// Read the register, let `f` change it and write it back.
    fn modify<M, F>(memory: &mut M, f: F) -> Self
    where
        M: MemoryInterface + ?Sized,
        F: FnOnce(&mut Self),
    {
        let mut value = Self::load(memory);
        f(&mut value);
        value.store(memory);
        value
    }
}
