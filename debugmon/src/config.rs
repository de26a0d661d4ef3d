//! Runtime configuration of the monitor.

/// Settings consumed when enabling the monitor and while handling the
/// DebugMonitor exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Priority assigned to the DebugMonitor exception in SHPR3.
    ///
    /// Defaults to `0xFF`, the lowest priority, so the interrupt feeding the
    /// input channel can preempt a halted session. Implementations only keep
    /// the upper priority bits.
    pub debug_monitor_priority: u8,

    /// Print the stacked register frame on every exception entry.
    pub dump_registers: bool,
}

impl Config {
    /// The lowest exception priority on any ARMv7-M implementation.
    pub const LOWEST_PRIORITY: u8 = 0xFF;

    /// Use `priority` for the DebugMonitor exception.
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.debug_monitor_priority = priority;
        self
    }

    /// Enable or disable the register dump on exception entry.
    pub fn with_register_dump(mut self, dump_registers: bool) -> Self {
        self.dump_registers = dump_registers;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug_monitor_priority: Self::LOWEST_PRIORITY,
            dump_registers: true,
        }
    }
}
