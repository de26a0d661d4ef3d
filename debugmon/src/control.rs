//! Switching monitor mode debugging on and off.

use crate::config::Config;
use crate::error::MonitorError;
use crate::log;
use crate::memory::{MemoryInterface, MemoryMappedRegister};
use crate::registers::{Demcr, Dfsr, Dhcsr, Shpr3};

/// Control over the DebugMonitor exception.
///
/// Monitor mode and halting debug are mutually exclusive: while a probe has
/// set DHCSR.C_DEBUGEN, debug events halt the core instead of raising the
/// DebugMonitor exception.
pub struct MonitorControl<'a, M: ?Sized> {
    memory: &'a mut M,
}

impl<'a, M: MemoryInterface + ?Sized> MonitorControl<'a, M> {
    /// Control the monitor through `memory`.
    pub fn new(memory: &'a mut M) -> Self {
        Self { memory }
    }

    /// Whether a probe owns the core.
    pub fn halting_debug_enabled(&mut self) -> bool {
        Dhcsr::load(self.memory).c_debugen()
    }

    /// Whether the DebugMonitor exception is enabled.
    pub fn is_enabled(&mut self) -> bool {
        Demcr::load(self.memory).mon_en()
    }

    /// Enable the DebugMonitor exception.
    ///
    /// Clears stale debug events from DFSR before enabling, and assigns the
    /// exception `config.debug_monitor_priority`.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self)))]
    pub fn enable(&mut self, config: &Config) -> Result<(), MonitorError> {
        if self.halting_debug_enabled() {
            log::warn!("Halting Debug Enabled - Can't Enable Monitor Mode Debug!");
            return Err(MonitorError::AlreadyUnderHaltingDebug);
        }

        Dfsr::clear_all().store(self.memory);
        Demcr::modify(self.memory, |demcr| demcr.set_mon_en(true));

        // SysTick and PendSV share the register.
        let shpr3 = Shpr3::modify(self.memory, |shpr3| {
            shpr3.set_pri_12(config.debug_monitor_priority)
        });

        log::info!(
            "Monitor Mode Debug Enabled! DebugMonitor priority {:#04x}",
            shpr3.pri_12()
        );
        Ok(())
    }

    /// Disable the DebugMonitor exception. Debug events are ignored afterwards.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self)))]
    pub fn disable(&mut self) {
        Demcr::modify(self.memory, |demcr| demcr.set_mon_en(false));
        log::info!("Monitor Mode Debug Disabled");
    }
}
