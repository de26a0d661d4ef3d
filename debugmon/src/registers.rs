//! Register types for the ARMv7-M debug and Flash Patch blocks.
//!
//! Each register is a thin wrapper around its raw `u32` value with named
//! accessors. This is the only place that knows about bit positions; the
//! driver and the state machine work exclusively through these accessors.

use crate::memory::MemoryMappedRegister;
use crate::monitor::DebugEvents;
use bitfield::bitfield;

macro_rules! raw_conversions {
    ($($register:ident),* $(,)?) => {
        $(
            impl From<u32> for $register {
                fn from(value: u32) -> Self {
                    Self(value)
                }
            }

            impl From<$register> for u32 {
                fn from(value: $register) -> Self {
                    value.0
                }
            }
        )*
    };
}

raw_conversions!(FpCtrl, FpRemap, FpRev1CompX, Dfsr, Demcr, Dhcsr, Shpr3);

bitfield! {
    /// Flash Patch Control Register, FP_CTRL (see armv7-M Architecture Reference Manual C1.11.3)
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct FpCtrl(u32);
    impl Debug;
    /// Flash Patch breakpoint architecture revision:
    ///
    /// `0b0000` Flash Patch breakpoint version 1.\
    /// `0b0001` Flash Patch breakpoint version 2. Supports breakpoints on any location in the 4GB address range.
    pub rev, _: 31, 28;
    num_code_1, _: 14, 12;
    /// The number of literal address comparators supported, starting from NUM_CODE upwards.
    ///
    /// If this field is zero, the implementation does not support literal comparators.
    pub num_lit, _: 11, 8;
    num_code_0, _: 7, 4;
    /// On any write to FP_CTRL, this bit must be `1`. A write to the register with this bit set to zero
    /// is ignored.
    pub key, set_key: 1;
    /// Enable bit for the FPB:
    ///
    /// `0`: Flash Patch breakpoint disabled.\
    /// `1`: Flash Patch breakpoint enabled.
    ///
    /// A power-on reset clears this bit to `0`.
    pub enable, set_enable: 0;
}

impl FpCtrl {
    /// The number of instruction address comparators.
    ///
    /// NUM_CODE is split over two non-adjacent fields, `bits[14:12]` hold the
    /// upper three bits and `bits[7:4]` the lower four.
    pub fn num_code(&self) -> u32 {
        (self.num_code_1() << 4) | self.num_code_0()
    }
}

impl MemoryMappedRegister for FpCtrl {
    const ADDRESS: u32 = 0xE000_2000;
    const NAME: &'static str = "FP_CTRL";
}

bitfield! {
    /// Flash Patch Remap register, FP_REMAP (see armv7-M Architecture Reference Manual C1.11.4)
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct FpRemap(u32);
    impl Debug;
    /// Indicates whether the FPB unit supports flash patch remap:
    ///
    /// `0`: Remapping not supported. The FPB only supports breakpoint functionality.\
    /// `1`: Remapping supported.
    pub rmpspt, _: 29;
    /// `bits[28:5]` of the remap table base address in SRAM. `bits[31:29]` are `0b001`.
    pub remap, set_remap: 28, 5;
}

impl FpRemap {
    /// Base address of the remap table in SRAM.
    pub fn base_address(&self) -> u32 {
        0x2000_0000 | (self.remap() << 5)
    }
}

impl MemoryMappedRegister for FpRemap {
    const ADDRESS: u32 = 0xE000_2004;
    const NAME: &'static str = "FP_REMAP";
}

bitfield! {
    /// Flash Patch Comparator register, FP_COMPn (see armv7-M Architecture Reference Manual C1.11.5)
    ///
    /// This is the revision 1 layout, which is the only one the driver programs.
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct FpRev1CompX(u32);
    impl Debug;
    /// For an instruction address comparator, defines the behavior when the COMP address is matched:
    ///
    /// `00`: Remap to remap address, see [`FpRemap`].\
    /// `01`: Breakpoint on instruction at `'000':COMP:'00'`.\
    /// `10`: Breakpoint on instruction at `'000':COMP:'10'`.\
    /// `11`: Breakpoint on both instructions at `'000':COMP:'00'` and `'000':COMP:'10'`.
    ///
    /// For a literal address comparator the field is UNK/SBZP.
    pub replace, set_replace: 31, 30;
    /// `bits[28:2]` of the address to compare with addresses from the Code memory region.
    /// `bits[31:29]` of the address for comparison are zero.
    pub comp, set_comp: 28, 2;
    /// Enable bit for this comparator.
    ///
    /// A power-on reset clears this bit to `0`.
    pub enable, set_enable: 0;
}

impl FpRev1CompX {
    /// The address of comparator `comp_id` in the comparator array.
    pub fn address(comp_id: usize) -> u32 {
        Self::ADDRESS + (comp_id * core::mem::size_of::<u32>()) as u32
    }
}

impl MemoryMappedRegister for FpRev1CompX {
    const ADDRESS: u32 = 0xE000_2008;
    const NAME: &'static str = "FP_COMP0";
}

bitfield! {
    /// Debug Fault Status Register, DFSR (see armv7-M Architecture Reference Manual C1.6.1)
    ///
    /// All bits are sticky and cleared by writing `1` to them.
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct Dfsr(u32);
    impl Debug;
    /// An external debug request (EDBGRQ) was asserted.
    pub external, set_external: 4;
    /// A vector catch was triggered.
    pub vcatch, set_vcatch: 3;
    /// A DWT watchpoint or trace event was generated.
    pub dwttrap, set_dwttrap: 2;
    /// A breakpoint was hit, either a `BKPT` instruction or an FPB match.
    pub bkpt, set_bkpt: 1;
    /// A halt request or a step completed.
    pub halted, set_halted: 0;
}

impl Dfsr {
    /// Value that clears every status bit when written.
    pub fn clear_all() -> Self {
        Dfsr(0b11111)
    }

    /// The debug events latched in this register.
    pub fn events(&self) -> DebugEvents {
        DebugEvents::from_bits_truncate(self.0)
    }
}

impl From<DebugEvents> for Dfsr {
    fn from(events: DebugEvents) -> Self {
        Dfsr(events.bits())
    }
}

impl MemoryMappedRegister for Dfsr {
    const ADDRESS: u32 = 0xE000_ED30;
    const NAME: &'static str = "DFSR";
}

bitfield! {
    /// Debug Exception and Monitor Control Register, DEMCR (see armv7-M Architecture Reference Manual C1.6.5)
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct Demcr(u32);
    impl Debug;
    /// Global enable for DWT and ITM features
    pub trcena, set_trcena: 24;
    /// DebugMonitor semaphore bit
    pub mon_req, set_mon_req: 19;
    /// When monitor mode is enabled, step the processor one instruction after
    /// the DebugMonitor exception returns.
    pub mon_step, set_mon_step: 18;
    /// Sets or clears the pending state of the DebugMonitor exception
    pub mon_pend, set_mon_pend: 17;
    /// Enable the DebugMonitor exception
    pub mon_en, set_mon_en: 16;
    /// Enable halting debug trap on a HardFault exception
    pub vc_harderr, set_vc_harderr: 10;
    /// Enable Reset Vector Catch
    pub vc_corereset, set_vc_corereset: 0;
}

impl MemoryMappedRegister for Demcr {
    const ADDRESS: u32 = 0xE000_EDFC;
    const NAME: &'static str = "DEMCR";
}

bitfield! {
    /// Debug Halting Control and Status Register, DHCSR (see armv7-M Architecture Reference Manual C1.6.2)
    ///
    /// Only read by the monitor. Software running on the processor cannot set
    /// C_DEBUGEN, so its value tells whether a probe owns the core.
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct Dhcsr(u32);
    impl Debug;
    /// Indicates whether the processor is locked up because of an unrecoverable exception.
    pub s_lockup, _: 19;
    /// Indicates whether the processor is sleeping.
    pub s_sleep, _: 18;
    /// Indicates whether the processor is in Debug state.
    pub s_halt, _: 17;
    /// Processor step bit.
    pub c_step, _: 2;
    /// Processor halt bit.
    pub c_halt, _: 1;
    /// Halting debug enable bit. Only a debugger attached through the DAP can set it.
    pub c_debugen, _: 0;
}

impl MemoryMappedRegister for Dhcsr {
    const ADDRESS: u32 = 0xE000_EDF0;
    const NAME: &'static str = "DHCSR";
}

bitfield! {
    /// System Handler Priority Register 3, SHPR3 (see armv7-M Architecture Reference Manual B3.2.12)
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct Shpr3(u32);
    impl Debug;
    /// Priority of SysTick
    pub u8, pri_15, set_pri_15: 31, 24;
    /// Priority of PendSV
    pub u8, pri_14, set_pri_14: 23, 16;
    /// Priority of DebugMonitor
    pub u8, pri_12, set_pri_12: 7, 0;
}

impl MemoryMappedRegister for Shpr3 {
    const ADDRESS: u32 = 0xE000_ED20;
    const NAME: &'static str = "SHPR3";
}
