//! Diagnostics that compile away without the `tracing` feature.
//!
//! `tracing-core` needs `alloc` on `no_std` targets, which a heapless firmware
//! cannot provide. Without the feature the arguments are still type checked
//! but never formatted.

#[cfg(feature = "tracing")]
macro_rules! emit {
    ($level:ident, $($arg:tt)*) => {
        ::tracing::$level!($($arg)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! emit {
    ($level:ident, $($arg:tt)*) => {
        if false {
            let _ = ::core::format_args!($($arg)*);
        }
    };
}

macro_rules! trace {
    ($($arg:tt)*) => { $crate::log::emit!(trace, $($arg)*) };
}

macro_rules! debug {
    ($($arg:tt)*) => { $crate::log::emit!(debug, $($arg)*) };
}

macro_rules! info {
    ($($arg:tt)*) => { $crate::log::emit!(info, $($arg)*) };
}

macro_rules! warn_ {
    ($($arg:tt)*) => { $crate::log::emit!(warn, $($arg)*) };
}

pub(crate) use {debug, emit, info, trace, warn_ as warn};
