//! The monitor running on an ARMv7-M core.
//!
//! The crate provides the `DebugMonitor` exception vector itself. It passes
//! the stacked register frame to a function the application defines:
//!
//! ```ignore
//! #[no_mangle]
//! extern "C" fn __debug_monitor_handler(frame: &mut ExceptionFrame) {
//!     debugmon::cortex_m::handle_exception(frame, &RX, &mut Uart1, &Config::default());
//! }
//! ```
//!
//! The application also has to feed `RX` from its receive interrupt with
//! [`InputChannel::try_push`], and that interrupt must have a higher priority
//! than the DebugMonitor exception.

use crate::channel::{InputChannel, InterruptControl};
use crate::config::Config;
use crate::console::{ByteSink, Console};
use crate::memory::MemoryInterface;
use crate::monitor::{DebugEvent, DebugMonitor, ExceptionFrame, Session};

/// The debug session, alive from boot until reset.
static SESSION: Session = Session::new();

/// Volatile access to the processor's own address space.
#[derive(Debug)]
pub struct Mmio {
    _private: (),
}

impl Mmio {
    /// Access memory directly.
    ///
    /// # Safety
    ///
    /// Writes go straight to the System Control Space. The caller has to make
    /// sure nothing else programs the FPB or the debug registers concurrently.
    pub unsafe fn steal() -> Self {
        Mmio { _private: () }
    }
}

impl MemoryInterface for Mmio {
    fn read_word_32(&mut self, address: u32) -> u32 {
        // SAFETY: aligned access to an architecturally defined address.
        unsafe { core::ptr::read_volatile(address as usize as *const u32) }
    }

    fn write_word_32(&mut self, address: u32, data: u32) {
        // SAFETY: see `read_word_32`.
        unsafe { core::ptr::write_volatile(address as usize as *mut u32, data) }
    }

    fn read_word_16(&mut self, address: u32) -> u16 {
        // SAFETY: see `read_word_32`.
        unsafe { core::ptr::read_volatile(address as usize as *const u16) }
    }
}

/// Interrupt masking through PRIMASK.
#[derive(Debug, Clone, Copy, Default)]
pub struct Primask;

impl InterruptControl for Primask {
    fn disable(&self) -> bool {
        let was_enabled = cortex_m::register::primask::read().is_inactive();
        cortex_m::interrupt::disable();
        was_enabled
    }

    fn restore(&self, was_enabled: bool) {
        if was_enabled {
            // SAFETY: only undoes the `disable` that returned `was_enabled`.
            unsafe { cortex_m::interrupt::enable() };
        }
    }
}

/// Run the monitor for one DebugMonitor exception.
///
/// Call this from `__debug_monitor_handler`. Blocks until the user typed `c` or
/// `s` into `channel` if the exception needs a directive.
pub fn handle_exception<S, const N: usize>(
    frame: &mut ExceptionFrame,
    channel: &InputChannel<Primask, N>,
    output: &mut S,
    config: &Config,
) -> Option<DebugEvent>
where
    S: ByteSink + ?Sized,
{
    // SAFETY: the DebugMonitor exception does not preempt itself, and the
    // foreground is suspended while it runs.
    let memory = unsafe { Mmio::steal() };
    let mut console = Console::new(output);
    let mut input = channel;

    DebugMonitor::new(memory, &SESSION, *config)
        .handle_exception(frame, &mut input, &mut console)
}

/// Execute a `BKPT` instruction.
///
/// With monitor mode enabled this raises the DebugMonitor exception, which
/// then steps over the instruction.
#[inline(always)]
pub fn breakpoint_trap() {
    cortex_m::asm::bkpt();
}

// The exception entry selects the stack the frame was pushed to from
// EXC_RETURN bit 2 and tail calls the handler with the frame in r0.
#[cfg(all(target_arch = "arm", target_os = "none"))]
core::arch::global_asm!(
    ".section .text.DebugMonitor,\"ax\",%progbits",
    ".global DebugMonitor",
    ".type DebugMonitor,%function",
    ".thumb_func",
    "DebugMonitor:",
    "    tst lr, #4",
    "    ite eq",
    "    mrseq r0, msp",
    "    mrsne r0, psp",
    "    b __debug_monitor_handler",
    ".size DebugMonitor, . - DebugMonitor",
);
