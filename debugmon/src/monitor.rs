//! The DebugMonitor exception handler.
//!
//! The handler runs inside the DebugMonitor exception at the lowest exception
//! priority. Every entry classifies the latched debug event, optionally waits
//! for a directive from the user, and resolves exactly one event before
//! returning.
//!
//! Stepping over a breakpoint takes two exception entries. The core can only
//! single-step after the exception returns, and an FPB breakpoint keeps
//! matching for as long as the unit is enabled. So on the breakpoint entry the
//! unit is disabled and DEMCR.MON_STEP is armed; once the original instruction
//! has executed the core re-enters the handler with DFSR.HALTED set, and that
//! entry enables the unit again. The breakpoint stays programmed for the next
//! hit.

use crate::channel::ByteSource;
use crate::config::Config;
use crate::console::{ByteSink, Console};
use crate::console_line;
use crate::fpb::Fpb;
use crate::log;
use crate::memory::{MemoryInterface, MemoryMappedRegister};
use crate::registers::{Demcr, Dfsr};
use bitflags::bitflags;
use core::sync::atomic::{AtomicU8, Ordering};
use static_assertions::const_assert_eq;

/// Size of a 16-bit Thumb instruction.
const THUMB_INSTRUCTION_SIZE: u32 = 2;

/// Registers stacked by the core on exception entry.
///
/// The trampoline hands the handler a pointer to this frame on whichever stack
/// was active when the exception was taken. The core restores the registers
/// from it on exception return, so changing `return_address` changes where
/// execution resumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(C)]
pub struct ExceptionFrame {
    /// (General purpose) Register 0
    pub r0: u32,
    /// (General purpose) Register 1
    pub r1: u32,
    /// (General purpose) Register 2
    pub r2: u32,
    /// (General purpose) Register 3
    pub r3: u32,
    /// (General purpose) Register 12
    pub r12: u32,
    /// Linker Register
    pub lr: u32,
    /// Address of the instruction that was interrupted (the faulting PC).
    pub return_address: u32,
    /// Program Status Register
    pub xpsr: u32,
}

const_assert_eq!(core::mem::size_of::<ExceptionFrame>(), 32);

bitflags! {
    /// Debug events latched in DFSR.
    ///
    /// The bits are independent and hardware may set several at once.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DebugEvents: u32 {
        /// A halt request or a completed step.
        const HALTED = 1 << 0;
        /// A `BKPT` instruction or an FPB match.
        const BKPT = 1 << 1;
        /// A DWT watchpoint.
        const DWTTRAP = 1 << 2;
        /// A vector catch.
        const VCATCH = 1 << 3;
        /// External debug request.
        const EXTERNAL = 1 << 4;
    }
}

impl DebugEvents {
    /// The one event an exception entry resolves.
    ///
    /// Priority is breakpoint, then halt, then watchpoint. Lower priority
    /// events stay latched and are seen again on the next entry.
    pub fn resolution(&self) -> Option<DebugEvent> {
        if self.contains(DebugEvents::BKPT) {
            Some(DebugEvent::Breakpoint)
        } else if self.contains(DebugEvents::HALTED) {
            Some(DebugEvent::Halt)
        } else if self.contains(DebugEvents::DWTTRAP) {
            Some(DebugEvent::Watchpoint)
        } else {
            None
        }
    }

    fn wants_user(&self) -> bool {
        self.intersects(DebugEvents::BKPT | DebugEvents::DWTTRAP)
    }
}

/// A debug event the handler knows how to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugEvent {
    /// Breakpoint hit.
    Breakpoint,
    /// Single step completed.
    Halt,
    /// Watchpoint hit. Acknowledged, not decoded.
    Watchpoint,
}

impl DebugEvent {
    /// The DFSR bit that acknowledges this event.
    pub fn flag(self) -> DebugEvents {
        match self {
            DebugEvent::Breakpoint => DebugEvents::BKPT,
            DebugEvent::Halt => DebugEvents::HALTED,
            DebugEvent::Watchpoint => DebugEvents::DWTTRAP,
        }
    }
}

/// What the user asked for the last time the handler prompted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum DebugState {
    /// Run freely until the next breakpoint.
    #[default]
    Running = 0,
    /// Stop again after the next instruction.
    SingleStepPending = 1,
}

/// A directive typed at the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// `c`
    Continue,
    /// `s`
    Step,
}

impl Directive {
    /// Parse a received byte, ignoring anything but `c` and `s`.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'c' => Some(Directive::Continue),
            b's' => Some(Directive::Step),
            _ => None,
        }
    }

    fn state(self) -> DebugState {
        match self {
            Directive::Continue => DebugState::Running,
            Directive::Step => DebugState::SingleStepPending,
        }
    }
}

/// Debug session state that persists across exception entries.
///
/// Lives from boot until reset and is only changed from inside the handler.
/// Backed by an atomic so it can be a `static` on the device.
#[derive(Debug)]
pub struct Session(AtomicU8);

impl Session {
    /// A session in [`DebugState::Running`].
    pub const fn new() -> Self {
        Session(AtomicU8::new(DebugState::Running as u8))
    }

    /// Current state.
    pub fn state(&self) -> DebugState {
        match self.0.load(Ordering::Relaxed) {
            0 => DebugState::Running,
            _ => DebugState::SingleStepPending,
        }
    }

    fn set_state(&self, state: DebugState) {
        self.0.store(state as u8, Ordering::Relaxed);
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// The monitor context: hardware access, session and configuration.
pub struct DebugMonitor<'s, M> {
    memory: M,
    session: &'s Session,
    config: Config,
}

impl<'s, M: MemoryInterface> DebugMonitor<'s, M> {
    /// Create a monitor for one exception entry.
    pub fn new(memory: M, session: &'s Session, config: Config) -> Self {
        Self {
            memory,
            session,
            config,
        }
    }

    /// The current session state.
    pub fn state(&self) -> DebugState {
        self.session.state()
    }

    /// Access the underlying memory.
    pub fn memory(&mut self) -> &mut M {
        &mut self.memory
    }

    /// Give back the underlying memory.
    pub fn into_memory(self) -> M {
        self.memory
    }

    /// Handle one DebugMonitor exception.
    ///
    /// Blocks polling `input` whenever a breakpoint or watchpoint was hit, or
    /// the user asked to single-step. There is no timeout: the prompt waits
    /// until `c` or `s` arrives. `input` must be fed from an interrupt with a
    /// higher priority than the DebugMonitor exception.
    ///
    /// Returns the event that was resolved and acknowledged in DFSR.
    pub fn handle_exception<I, S>(
        &mut self,
        frame: &mut ExceptionFrame,
        input: &mut I,
        console: &mut Console<S>,
    ) -> Option<DebugEvent>
    where
        I: ByteSource + ?Sized,
        S: ByteSink,
    {
        let dfsr = Dfsr::load(&mut self.memory);
        let events = dfsr.events();

        self.report(frame, dfsr, console);

        if events.wants_user() || self.state() == DebugState::SingleStepPending {
            console_line!(console, "Debug Event Detected, Awaiting 'c' or 's'");
            let directive = wait_for_directive(input, console);
            self.session.set_state(directive.state());
        } else {
            console_line!(console, "Resuming ...");
        }

        let resolved = events.resolution();
        match resolved {
            Some(DebugEvent::Breakpoint) => self.resolve_breakpoint(frame, console),
            Some(DebugEvent::Halt) => self.resolve_halt(),
            Some(DebugEvent::Watchpoint) => {}
            None => {
                log::warn!("No resolvable debug event latched, DFSR = {:?}", dfsr);
            }
        }

        if let Some(event) = resolved {
            Dfsr::from(event.flag()).store(&mut self.memory);
            log::debug!("Acknowledged {:?}", event);
        }

        resolved
    }

    fn report<S: ByteSink>(
        &mut self,
        frame: &ExceptionFrame,
        dfsr: Dfsr,
        console: &mut Console<S>,
    ) {
        let demcr = Demcr::load(&mut self.memory);

        log::debug!("DebugMonitor exception, {:?}, {:?}", dfsr, frame);

        console_line!(console, "DebugMonitor Exception");
        console_line!(console, "DEMCR: {:#010x}", u32::from(demcr));
        console_line!(
            console,
            "DFSR:  {:#010x} (bkpt={}, halt={}, dwt={})",
            u32::from(dfsr),
            dfsr.bkpt() as u8,
            dfsr.halted() as u8,
            dfsr.dwttrap() as u8,
        );

        if self.config.dump_registers {
            console_line!(console, "Register Dump");
            console_line!(console, " r0  ={:#010x}", frame.r0);
            console_line!(console, " r1  ={:#010x}", frame.r1);
            console_line!(console, " r2  ={:#010x}", frame.r2);
            console_line!(console, " r3  ={:#010x}", frame.r3);
            console_line!(console, " r12 ={:#010x}", frame.r12);
            console_line!(console, " lr  ={:#010x}", frame.lr);
            console_line!(console, " pc  ={:#010x}", frame.return_address);
            console_line!(console, " xpsr={:#010x}", frame.xpsr);
        }
    }

    fn resolve_breakpoint<S: ByteSink>(
        &mut self,
        frame: &mut ExceptionFrame,
        console: &mut Console<S>,
    ) {
        let instruction = self.memory.read_word_16(frame.return_address);

        if is_breakpoint_instruction(instruction) {
            // A BKPT compiled into the program. Skip it or the core traps on it forever.
            frame.return_address = frame.return_address.wrapping_add(THUMB_INSTRUCTION_SIZE);
            log::debug!("Skipping BKPT {:#06x}", instruction);

            if self.state() == DebugState::SingleStepPending {
                self.set_single_step(true);
            }
        } else {
            // The FPB substituted the BKPT, the real instruction is still in flash.
            Fpb::new(&mut self.memory).disable();
            console_line!(
                console,
                "Single-Stepping over FPB at {:#x}",
                frame.return_address
            );
            self.set_single_step(true);
        }
    }

    fn resolve_halt(&mut self) {
        // Does nothing if the unit was never disabled.
        Fpb::new(&mut self.memory).enable();

        if self.state() != DebugState::SingleStepPending {
            self.set_single_step(false);
        }
    }

    fn set_single_step(&mut self, enabled: bool) {
        Demcr::modify(&mut self.memory, |demcr| demcr.set_mon_step(enabled));
    }
}

/// Whether `instruction` is a 16-bit Thumb `BKPT #imm8`.
pub fn is_breakpoint_instruction(instruction: u16) -> bool {
    instruction & 0xff00 == 0xbe00
}

/// Spin on `input` until a directive arrives.
///
/// This is a busy wait inside exception context. New bytes only show up
/// because the receive interrupt preempts the spin.
fn wait_for_directive<I, S>(input: &mut I, console: &mut Console<S>) -> Directive
where
    I: ByteSource + ?Sized,
    S: ByteSink,
{
    loop {
        let Some(byte) = input.try_read_byte() else {
            core::hint::spin_loop();
            continue;
        };

        console_line!(console, "Got char '{}'!", byte as char);

        if let Some(directive) = Directive::from_byte(byte) {
            return directive;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::registers::FpCtrl;
    use crate::test::{MockInput, MockMemory};
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    const FP_CTRL: u32 = 0x0000_0260;
    const PC: u32 = 0x0800_0140;

    fn frame() -> ExceptionFrame {
        ExceptionFrame {
            r0: 1,
            r1: 2,
            r2: 3,
            r3: 4,
            r12: 0xc,
            lr: 0x0800_0105,
            return_address: PC,
            xpsr: 0x6100_0000,
        }
    }

    fn memory_with(dfsr: DebugEvents, instruction: u16) -> MockMemory {
        let mut memory = MockMemory::with_debug_registers(FP_CTRL | 0b11, 6, dfsr.bits());
        memory.add_half_word(PC, instruction);
        memory
    }

    fn run(
        memory: &mut MockMemory,
        session: &Session,
        frame: &mut ExceptionFrame,
        input: &[u8],
    ) -> (Option<DebugEvent>, String) {
        let mut console = Console::new(Vec::new());
        let mut input = MockInput::new(input);

        let resolved = DebugMonitor::new(&mut *memory, session, Config::default())
            .handle_exception(frame, &mut input, &mut console);

        assert!(input.is_exhausted(), "not all input was consumed");
        (resolved, String::from_utf8(console.into_inner()).unwrap())
    }

    #[test_case(DebugEvents::BKPT, Some(DebugEvent::Breakpoint); "breakpoint")]
    #[test_case(DebugEvents::HALTED, Some(DebugEvent::Halt); "halt")]
    #[test_case(DebugEvents::DWTTRAP, Some(DebugEvent::Watchpoint); "watchpoint")]
    #[test_case(DebugEvents::all(), Some(DebugEvent::Breakpoint); "breakpoint wins")]
    #[test_case(DebugEvents::HALTED | DebugEvents::DWTTRAP, Some(DebugEvent::Halt); "halt first")]
    #[test_case(DebugEvents::VCATCH | DebugEvents::EXTERNAL, None; "nothing to resolve")]
    fn resolution_priority(events: DebugEvents, expected: Option<DebugEvent>) {
        assert_eq!(events.resolution(), expected);
    }

    #[test_case(0xbe00, true; "bkpt 0")]
    #[test_case(0xbeab, true; "semihosting bkpt")]
    #[test_case(0x4770, false; "bx lr")]
    #[test_case(0xbf00, false; "nop")]
    fn breakpoint_instruction(instruction: u16, expected: bool) {
        assert_eq!(is_breakpoint_instruction(instruction), expected);
    }

    #[test]
    fn inline_breakpoint_is_skipped() {
        let mut memory = memory_with(DebugEvents::BKPT, 0xbe01);
        let session = Session::new();
        let mut frame = frame();

        let (resolved, _) = run(&mut memory, &session, &mut frame, b"c");

        assert_eq!(resolved, Some(DebugEvent::Breakpoint));
        assert_eq!(frame.return_address, PC + 2);
        assert!(memory.writes_to(FpCtrl::ADDRESS).is_empty());
        assert!(!Demcr::from(memory.word(Demcr::ADDRESS)).mon_step());
        assert_eq!(
            memory.writes_to(Dfsr::ADDRESS),
            vec![DebugEvents::BKPT.bits()]
        );
    }

    #[test]
    fn inline_breakpoint_at_the_top_of_memory_wraps() {
        let mut memory = memory_with(DebugEvents::BKPT, 0x4770);
        memory.add_half_word(0xffff_fffe, 0xbe00);
        let session = Session::new();
        let mut frame = ExceptionFrame {
            return_address: 0xffff_fffe,
            ..frame()
        };

        let (resolved, _) = run(&mut memory, &session, &mut frame, b"c");

        assert_eq!(resolved, Some(DebugEvent::Breakpoint));
        assert_eq!(frame.return_address, 0);
    }

    #[test]
    fn stepping_from_inline_breakpoint_arms_single_step() {
        let mut memory = memory_with(DebugEvents::BKPT, 0xbe01);
        let session = Session::new();
        let mut frame = frame();

        run(&mut memory, &session, &mut frame, b"s");

        assert_eq!(frame.return_address, PC + 2);
        assert!(Demcr::from(memory.word(Demcr::ADDRESS)).mon_step());
        assert!(memory.writes_to(FpCtrl::ADDRESS).is_empty());
        assert_eq!(session.state(), DebugState::SingleStepPending);
    }

    #[test]
    fn fpb_breakpoint_disables_unit_and_steps() {
        let mut memory = memory_with(DebugEvents::BKPT, 0x4770);
        let session = Session::new();
        let mut frame = frame();

        let (_, output) = run(&mut memory, &session, &mut frame, b"c");

        assert_eq!(frame.return_address, PC);
        assert!(!FpCtrl::from(memory.word(FpCtrl::ADDRESS)).enable());
        assert!(Demcr::from(memory.word(Demcr::ADDRESS)).mon_step());
        let stepping = "Single-Stepping over FPB at 0x8000140\r\n";
        assert!(output.contains(stepping));
    }

    #[test]
    fn junk_input_is_ignored() {
        let mut memory = memory_with(DebugEvents::BKPT, 0xbe01);
        let session = Session::new();
        let mut frame = frame();

        let (_, output) = run(&mut memory, &session, &mut frame, b"x\rs");

        assert_eq!(session.state(), DebugState::SingleStepPending);
        assert!(output.contains("Got char 'x'!\r\n"));
        assert!(output.contains("Got char 's'!\r\n"));
    }

    #[test]
    fn prompt_spins_until_input_arrives() {
        let mut memory = memory_with(DebugEvents::BKPT, 0xbe01);
        let session = Session::new();
        let mut console = Console::new(Vec::new());
        let mut input = MockInput::scripted([None, None, None, Some(b'c')]);

        DebugMonitor::new(&mut memory, &session, Config::default())
            .handle_exception(&mut frame(), &mut input, &mut console);

        assert_eq!(input.polls(), 4);
    }

    #[test]
    fn plain_halt_resumes_without_prompt() {
        let mut memory = memory_with(DebugEvents::HALTED, 0x4770);
        Demcr::modify(&mut memory, |demcr| demcr.set_mon_step(true));
        let session = Session::new();

        let (resolved, output) = run(&mut memory, &session, &mut frame(), b"");

        assert_eq!(resolved, Some(DebugEvent::Halt));
        assert!(output.contains("Resuming ...\r\n"));
        assert!(!output.contains("Awaiting"));
        assert!(!Demcr::from(memory.word(Demcr::ADDRESS)).mon_step());
    }

    #[test]
    fn watchpoint_is_only_acknowledged() {
        let mut memory = memory_with(DebugEvents::DWTTRAP, 0x4770);
        let session = Session::new();

        let (resolved, _) = run(&mut memory, &session, &mut frame(), b"c");

        assert_eq!(resolved, Some(DebugEvent::Watchpoint));
        assert_eq!(
            memory.writes(),
            &[(Dfsr::ADDRESS, DebugEvents::DWTTRAP.bits())]
        );
    }

    #[test]
    fn register_dump() {
        let mut memory = memory_with(DebugEvents::HALTED, 0x4770);
        let session = Session::new();

        let (_, output) = run(&mut memory, &session, &mut frame(), b"");

        assert_eq!(
            output,
            "DebugMonitor Exception\r\n\
             DEMCR: 0x00000000\r\n\
             DFSR:  0x00000001 (bkpt=0, halt=1, dwt=0)\r\n\
             Register Dump\r\n\
             \x20r0  =0x00000001\r\n\
             \x20r1  =0x00000002\r\n\
             \x20r2  =0x00000003\r\n\
             \x20r3  =0x00000004\r\n\
             \x20r12 =0x0000000c\r\n\
             \x20lr  =0x08000105\r\n\
             \x20pc  =0x08000140\r\n\
             \x20xpsr=0x61000000\r\n\
             Resuming ...\r\n"
        );
    }

    #[test]
    fn register_dump_can_be_turned_off() {
        let mut memory = memory_with(DebugEvents::HALTED, 0x4770);
        let session = Session::new();
        let mut console = Console::new(Vec::new());

        DebugMonitor::new(
            &mut memory,
            &session,
            Config::default().with_register_dump(false),
        )
        .handle_exception(&mut frame(), &mut MockInput::new(b""), &mut console);

        let output = String::from_utf8(console.into_inner()).unwrap();
        assert!(!output.contains("Register Dump"));
    }
}
