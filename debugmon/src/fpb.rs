//! Driver for the Flash Patch and Breakpoint unit.
//!
//! A revision 1 comparator packs enable, replace mode and address into a
//! single word with only 27 usable address bits. [`Comparator::encode`] and
//! [`Comparator::decode`] are the only functions that know the layout and are
//! exact inverses of each other for half-word aligned code addresses.

use crate::error::FpbError;
use crate::log;
use crate::memory::{MemoryInterface, MemoryMappedRegister};
use crate::registers::{FpCtrl, FpRemap, FpRev1CompX};
use core::fmt;

/// First address above the code region. FPB revision 1 comparators can only
/// match instruction fetches below it.
pub const CODE_REGION_END: u32 = 0x2000_0000;

/// Capability and state of the FPB unit, as reported by FP_CTRL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FpbConfig {
    /// Whether the unit is enabled.
    pub enabled: bool,
    /// Architecture revision. Only revision 0 (FPB version 1) is supported.
    pub revision: u32,
    /// Number of instruction address comparators.
    pub num_code_comparators: usize,
    /// Number of literal address comparators, numbered after the code comparators.
    pub num_literal_comparators: usize,
}

impl FpbConfig {
    /// Code and literal comparators together.
    pub fn num_comparators(&self) -> usize {
        self.num_code_comparators + self.num_literal_comparators
    }

    fn check_revision(&self) -> Result<(), FpbError> {
        if self.revision != 0 {
            log::warn!(
                "FPB revision {} is not supported. HW breakpoints are not available.",
                self.revision
            );
            return Err(FpbError::UnsupportedRevision(self.revision));
        }
        Ok(())
    }
}

impl From<FpCtrl> for FpbConfig {
    fn from(ctrl: FpCtrl) -> Self {
        Self {
            enabled: ctrl.enable(),
            revision: ctrl.rev(),
            num_code_comparators: ctrl.num_code() as usize,
            num_literal_comparators: ctrl.num_lit() as usize,
        }
    }
}

/// Which half-word of the aligned word at the comparator address is replaced
/// by a breakpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Replace {
    /// No breakpoint, the comparator remaps the fetch through FP_REMAP.
    None = 0b00,
    /// Breakpoint on the lower half-word, `bits[1:0] == 0b00`.
    Low = 0b01,
    /// Breakpoint on the upper half-word, `bits[1:0] == 0b10`.
    High = 0b10,
    /// Breakpoint on both half-words.
    Both = 0b11,
}

impl From<u32> for Replace {
    fn from(bits: u32) -> Self {
        match bits & 0b11 {
            0b00 => Replace::None,
            0b01 => Replace::Low,
            0b10 => Replace::High,
            _ => Replace::Both,
        }
    }
}

/// Decoded state of one comparator slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Comparator {
    /// Whether the comparator is armed.
    pub enabled: bool,
    /// Replace mode.
    pub replace: Replace,
    /// The logical address: the word address with `bit[1]` restored from the replace mode.
    pub address: u32,
}

impl Comparator {
    /// Encode an enabled breakpoint on the half-word at `address`.
    pub fn breakpoint(address: u32) -> Result<FpRev1CompX, FpbError> {
        Self::encode(address, true)
    }

    /// Encode a breakpoint on the half-word at `address`.
    ///
    /// `bit[1]` of the address selects the replace mode, `bit[0]` (the Thumb
    /// bit of a function pointer) is ignored. A disabled comparator keeps its
    /// address and replace mode.
    pub fn encode(address: u32, enabled: bool) -> Result<FpRev1CompX, FpbError> {
        // The highest 3 bits of the address have to be zero, otherwise the breakpoint cannot
        // be set at the address.
        if address >= CODE_REGION_END {
            return Err(FpbError::AddressNotInCodeRegion(address));
        }

        // the replace value decides if the upper or lower half
        // word is matched for the break point
        let replace = if address & 0x2 == 0 {
            Replace::Low
        } else {
            Replace::High
        };

        let mut reg = FpRev1CompX::from(0);
        reg.set_replace(replace as u32);
        reg.set_comp((address & 0x1fff_fffc) >> 2);
        reg.set_enable(enabled);

        Ok(reg)
    }

    /// Decode a raw comparator register.
    pub fn decode(reg: FpRev1CompX) -> Self {
        let replace = Replace::from(reg.replace());

        let mut address = reg.comp() << 2;
        if replace == Replace::High {
            address |= 0x2;
        }

        Self {
            enabled: reg.enable(),
            replace,
            address,
        }
    }
}

/// Decoded FP_REMAP register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemapConfig {
    /// Whether the unit can remap instruction and literal fetches to SRAM.
    pub supported: bool,
    /// Base of the remap table in SRAM.
    pub base_address: u32,
}

/// The FPB unit, accessed through `memory`.
pub struct Fpb<'a, M: ?Sized> {
    memory: &'a mut M,
}

impl<'a, M: MemoryInterface + ?Sized> Fpb<'a, M> {
    /// Use the FPB unit visible through `memory`.
    pub fn new(memory: &'a mut M) -> Self {
        Self { memory }
    }

    /// Read FP_CTRL once and decode it.
    pub fn config(&mut self) -> FpbConfig {
        FpCtrl::load(self.memory).into()
    }

    /// Decode FP_REMAP.
    pub fn remap(&mut self) -> RemapConfig {
        let remap = FpRemap::load(self.memory);
        RemapConfig {
            supported: remap.rmpspt(),
            base_address: remap.base_address(),
        }
    }

    /// Enable the unit.
    pub fn enable(&mut self) {
        self.set_enabled(true)
    }

    /// Disable the unit. Programmed comparators are kept but stop matching.
    pub fn disable(&mut self) {
        self.set_enabled(false)
    }

    fn set_enabled(&mut self, enabled: bool) {
        // KEY must read as written on every access, or the write is ignored.
        FpCtrl::modify(self.memory, |ctrl| {
            ctrl.set_key(true);
            ctrl.set_enable(enabled);
        });
        log::trace!("FPB {}", if enabled { "enabled" } else { "disabled" });
    }

    /// Program code comparator `comp_id` to break on the instruction at `address`.
    ///
    /// Enables the unit if it is disabled. On error no register is written.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self)))]
    pub fn set_breakpoint(&mut self, comp_id: usize, address: u32) -> Result<(), FpbError> {
        let config = self.code_comparator(comp_id)?;
        let value = Comparator::breakpoint(address)?;

        if !config.enabled {
            log::info!("Enabling FPB.");
            self.enable();
        }

        let register = FpRev1CompX::address(comp_id);
        self.memory.write_word_32(register, value.into());

        log::debug!("FP_COMP[{}] = {:#010x}", comp_id, u32::from(value));
        Ok(())
    }

    /// Disarm code comparator `comp_id`.
    ///
    /// Only the enable bit is cleared, the programmed address stays readable.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self)))]
    pub fn clear_breakpoint(&mut self, comp_id: usize) -> Result<(), FpbError> {
        self.code_comparator(comp_id)?;

        let address = FpRev1CompX::address(comp_id);
        let mut value = FpRev1CompX::from(self.memory.read_word_32(address));
        value.set_enable(false);

        self.memory.write_word_32(address, value.into());
        Ok(())
    }

    /// Decode comparator `comp_id`, which may be a code or a literal comparator.
    pub fn comparator(&mut self, comp_id: usize) -> Result<Comparator, FpbError> {
        let config = self.config();
        config.check_revision()?;

        if comp_id >= config.num_comparators() {
            log::warn!("Comparator {} Not Implemented", comp_id);
            return Err(FpbError::ComparatorOutOfRange {
                comp_id,
                available: config.num_comparators(),
            });
        }

        Ok(self.read_comparator(comp_id))
    }

    /// Decode every code comparator, in order.
    pub fn breakpoints(&mut self) -> Result<Breakpoints<'_, M>, FpbError> {
        let config = self.config();
        config.check_revision()?;

        Ok(Breakpoints {
            memory: &mut *self.memory,
            next: 0,
            count: config.num_code_comparators,
        })
    }

    /// Print the unit configuration and every code comparator.
    ///
    /// Purely diagnostic, the state machine never calls this.
    pub fn dump_all<W: fmt::Write + ?Sized>(&mut self, out: &mut W) -> Result<(), FpbError> {
        let config = self.config();
        let remap = self.remap();

        // Output is best effort, the sink cannot fail.
        let _ = writeln!(
            out,
            "FPB Revision: {}, Enabled: {}, Hardware Breakpoints: {}, Literal Comparators: {}",
            config.revision,
            config.enabled as u8,
            config.num_code_comparators,
            config.num_literal_comparators,
        );
        if remap.supported {
            let _ = writeln!(out, "  FP_REMAP Table at {:#010x}", remap.base_address);
        }

        for (comp_id, comparator) in self.breakpoints()?.enumerate() {
            let _ = writeln!(
                out,
                "  FP_COMP[{}] Enabled {}, Replace: {}, Address {:#x}",
                comp_id,
                comparator.enabled as u8,
                comparator.replace as u8,
                comparator.address,
            );
        }
        Ok(())
    }

    fn code_comparator(&mut self, comp_id: usize) -> Result<FpbConfig, FpbError> {
        let config = self.config();
        config.check_revision()?;

        if comp_id >= config.num_code_comparators {
            log::warn!("Instruction Comparator {} Not Implemented", comp_id);
            return Err(FpbError::ComparatorOutOfRange {
                comp_id,
                available: config.num_code_comparators,
            });
        }

        Ok(config)
    }

    fn read_comparator(&mut self, comp_id: usize) -> Comparator {
        let raw = self.memory.read_word_32(FpRev1CompX::address(comp_id));
        Comparator::decode(raw.into())
    }
}

/// Iterator over the code comparators, see [`Fpb::breakpoints`].
pub struct Breakpoints<'a, M: ?Sized> {
    memory: &'a mut M,
    next: usize,
    count: usize,
}

impl<M: MemoryInterface + ?Sized> Iterator for Breakpoints<'_, M> {
    type Item = Comparator;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.count {
            return None;
        }

        let raw = self.memory.read_word_32(FpRev1CompX::address(self.next));
        self.next += 1;

        Some(Comparator::decode(raw.into()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.count - self.next;
        (remaining, Some(remaining))
    }
}
