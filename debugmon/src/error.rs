/// Errors reported by the [`Fpb`](crate::fpb::Fpb) driver.
///
/// None of these leave the FPB in a modified state: the requested operation is
/// simply not performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error, docsplay::Display)]
pub enum FpbError {
    /// FPB revision {0} is not supported, only revision 0 comparators can be programmed.
    UnsupportedRevision(u32),

    /// Comparator {comp_id} is not implemented, the FPB has {available} comparators.
    ComparatorOutOfRange {
        /// The requested comparator.
        comp_id: usize,
        /// The number of comparators the request was checked against.
        available: usize,
    },

    /// Address {0:#010x} is not in the code region.
    AddressNotInCodeRegion(u32),
}

/// Errors reported when switching monitor mode debugging on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error, docsplay::Display)]
pub enum MonitorError {
    /// Halting debug is enabled, monitor mode debug cannot be enabled.
    AlreadyUnderHaltingDebug,
}

/// Any error raised by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error, docsplay::Display)]
pub enum Error {
    /// {0}
    Fpb(#[from] FpbError),
    /// {0}
    Monitor(#[from] MonitorError),
}
