//! # Monitor mode debugging for Cortex-M3
//!
//! `debugmon` turns the Flash Patch and Breakpoint (FPB) unit and the
//! DebugMonitor exception of an ARMv7-M core into a small interactive debugger
//! that runs on the device itself. No debug probe is involved: breakpoints are
//! programmed into the FPB comparators, hits are delivered as DebugMonitor
//! exceptions, and a human resumes or steps the core by typing `c` or `s` into
//! a byte channel that is fed from an interrupt.
//!
//! The crate is `no_std`. All hardware access goes through [`MemoryInterface`],
//! so the same driver and state machine code runs against memory mapped
//! registers on the device (feature `cortex-m`) and against a simulated
//! register file in tests (feature `test`).
//!
//! # Features
//!
//! - `cortex-m`: the on-target backend in the `cortex_m` module.
//! - `tracing`: internal diagnostics through the `tracing` crate. Without
//!   `std`, `tracing` requires `alloc`, so firmware without a global allocator
//!   must leave this feature off. `features = ["cortex-m"]` alone links
//!   without a heap.
//! - `std`: host builds, implies `tracing`.
//! - `test`: simulated hardware for tests, implies `std`.
//!
//! # Examples
//!
//! ## Setting a breakpoint
//!
//! ```
//! use debugmon::{fpb::Fpb, test::MockMemory};
//!
//! let mut memory = MockMemory::with_fpb(0x0000_0260, 6);
//! let mut fpb = Fpb::new(&mut memory);
//!
//! fpb.set_breakpoint(0, 0x0800_09A4)?;
//!
//! let comparator = fpb.comparator(0)?;
//! assert!(comparator.enabled);
//! assert_eq!(comparator.address, 0x0800_09A4);
//! # Ok::<(), debugmon::FpbError>(())
//! ```
//!
//! ## Wiring the exception on the device
//!
//! ```ignore
//! use debugmon::{channel::InputChannel, cortex_m::Primask, monitor::ExceptionFrame, Config};
//!
//! static RX: InputChannel<Primask> = InputChannel::new(Primask);
//!
//! #[no_mangle]
//! extern "C" fn __debug_monitor_handler(frame: &mut ExceptionFrame) {
//!     debugmon::cortex_m::handle_exception(frame, &RX, &mut Uart1, &Config::default());
//! }
//! ```
#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![warn(missing_docs)]

pub mod channel;
pub mod commands;
pub mod config;
pub mod console;
pub mod control;
pub mod fpb;
pub mod memory;
pub mod monitor;
pub mod registers;

mod error;
mod log;

#[cfg(feature = "cortex-m")]
pub mod cortex_m;


pub use crate::config::Config;
pub use crate::error::{Error, FpbError, MonitorError};
pub use crate::memory::{MemoryInterface, MemoryMappedRegister};
pub use crate::monitor::{DebugMonitor, DebugState, ExceptionFrame, Session};
