//! Byte channel from the receive interrupt to the monitor.
//!
//! There is exactly one producer, the UART receive interrupt, and two
//! consumers that never run at the same time: the foreground shell loop and
//! the DebugMonitor exception while it waits for a directive. The producer can
//! preempt either consumer at any point.
//!
//! The producer never masks interrupts. It runs at a single interrupt priority
//! and is never re-entered, and no consumer can preempt it. The consumer masks
//! interrupts around its update of `read_idx` and `num_bytes`, otherwise the
//! producer could fire between the load and the store and its increment of
//! `num_bytes` would be lost.

use crate::log;
use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicUsize, Ordering};

/// Default channel capacity in bytes.
pub const DEFAULT_CAPACITY: usize = 64;

/// Masking and unmasking of interrupts on the current core.
pub trait InterruptControl {
    /// Mask all configurable interrupts. Returns whether they were unmasked before.
    fn disable(&self) -> bool;

    /// Undo a previous [`disable`](InterruptControl::disable).
    ///
    /// `was_enabled` is the value `disable` returned; interrupts are only
    /// unmasked again if they were unmasked before.
    fn restore(&self, was_enabled: bool);

    /// Mask interrupts for as long as the returned guard lives.
    fn mask(&self) -> InterruptsMasked<'_, Self> {
        InterruptsMasked {
            was_enabled: self.disable(),
            control: self,
        }
    }
}

/// Interrupts stay masked until this guard is dropped.
#[must_use = "interrupts are unmasked again as soon as the guard is dropped"]
pub struct InterruptsMasked<'a, I: InterruptControl + ?Sized> {
    control: &'a I,
    was_enabled: bool,
}

impl<I: InterruptControl + ?Sized> Drop for InterruptsMasked<'_, I> {
    fn drop(&mut self) {
        self.control.restore(self.was_enabled);
    }
}

/// A non-blocking source of single bytes.
pub trait ByteSource {
    /// Take the next byte, or `None` if nothing has been received yet.
    fn try_read_byte(&mut self) -> Option<u8>;
}

impl<T: ByteSource + ?Sized> ByteSource for &mut T {
    fn try_read_byte(&mut self) -> Option<u8> {
        (**self).try_read_byte()
    }
}

/// Fixed capacity ring buffer shared between the receive interrupt and its consumers.
///
/// Writes beyond the free space are dropped, already buffered bytes are never
/// overwritten.
pub struct InputChannel<I, const N: usize = DEFAULT_CAPACITY> {
    interrupts: I,
    buffer: UnsafeCell<[u8; N]>,
    read_idx: AtomicUsize,
    num_bytes: AtomicUsize,
}

// SAFETY: the producer only writes slots outside of `read_idx..read_idx + num_bytes`
// and publishes them by bumping `num_bytes` afterwards. The consumer only reads
// slots inside that range and updates both indices with interrupts masked.
unsafe impl<I: Sync, const N: usize> Sync for InputChannel<I, N> {}

impl<I: InterruptControl, const N: usize> InputChannel<I, N> {
    /// Create an empty channel. Usable in a `static`.
    pub const fn new(interrupts: I) -> Self {
        Self {
            interrupts,
            buffer: UnsafeCell::new([0; N]),
            read_idx: AtomicUsize::new(0),
            num_bytes: AtomicUsize::new(0),
        }
    }

    /// Capacity in bytes.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.num_bytes.load(Ordering::Acquire)
    }

    /// Whether no byte is buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Producer side: buffer as many of `bytes` as fit and drop the rest.
    ///
    /// Returns the number of bytes accepted. Must only be called from the
    /// single receive interrupt.
    pub fn try_push(&self, bytes: &[u8]) -> usize {
        let read_idx = self.read_idx.load(Ordering::Acquire);
        let num_bytes = self.num_bytes.load(Ordering::Acquire);

        let accepted = bytes.len().min(N - num_bytes);
        if accepted < bytes.len() {
            log::warn!(
                "Input channel full, dropping {} of {} bytes",
                bytes.len() - accepted,
                bytes.len()
            );
        }

        let base = self.buffer.get().cast::<u8>();
        for (offset, byte) in bytes[..accepted].iter().enumerate() {
            // Wrap on every byte, a burst may cross the end of the buffer.
            let write_idx = (read_idx + num_bytes + offset) % N;
            // SAFETY: `write_idx < N`, and the slot is free space the consumer does not read.
            unsafe { base.add(write_idx).write_volatile(*byte) };
        }

        self.num_bytes.store(num_bytes + accepted, Ordering::Release);

        accepted
    }

    /// Consumer side: take the oldest byte, if any.
    pub fn try_pop(&self) -> Option<u8> {
        if self.num_bytes.load(Ordering::Acquire) == 0 {
            return None;
        }

        let _masked = self.interrupts.mask();

        let read_idx = self.read_idx.load(Ordering::Relaxed);
        let base = self.buffer.get().cast::<u8>();
        // SAFETY: `read_idx < N`, and the slot holds a published byte.
        let byte = unsafe { base.add(read_idx).read_volatile() };

        let remaining = self.num_bytes.load(Ordering::Relaxed) - 1;
        self.read_idx.store((read_idx + 1) % N, Ordering::Relaxed);
        self.num_bytes.store(remaining, Ordering::Release);

        Some(byte)
    }
}

impl<I: InterruptControl, const N: usize> ByteSource for &InputChannel<I, N> {
    fn try_read_byte(&mut self) -> Option<u8> {
        self.try_pop()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use core::cell::Cell;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct CountingMask {
        masked: Cell<bool>,
        critical_sections: Cell<usize>,
    }

    impl InterruptControl for CountingMask {
        fn disable(&self) -> bool {
            self.critical_sections.set(self.critical_sections.get() + 1);
            !self.masked.replace(true)
        }

        fn restore(&self, was_enabled: bool) {
            if was_enabled {
                self.masked.set(false);
            }
        }
    }

    fn drain<I: InterruptControl, const N: usize>(channel: &InputChannel<I, N>) -> Vec<u8> {
        std::iter::from_fn(|| channel.try_pop()).collect()
    }

    #[test]
    fn empty_channel_yields_nothing() {
        let channel: InputChannel<_, 8> = InputChannel::new(CountingMask::default());

        assert_eq!(channel.try_pop(), None);
        assert!(channel.is_empty());
        assert_eq!(channel.interrupts.critical_sections.get(), 0);
    }

    #[test]
    fn bytes_come_out_in_order() {
        let channel: InputChannel<_, 8> = InputChannel::new(CountingMask::default());

        assert_eq!(channel.try_push(b"abc"), 3);
        assert_eq!(channel.try_push(b"d"), 1);

        assert_eq!(drain(&channel), b"abcd");
    }

    #[test]
    fn overflow_drops_only_the_excess() {
        let channel: InputChannel<_, 4> = InputChannel::new(CountingMask::default());

        assert_eq!(channel.try_push(b"ab"), 2);
        assert_eq!(channel.try_push(b"cdef"), 2);
        assert_eq!(channel.len(), channel.capacity());

        // Completely full, nothing is accepted.
        assert_eq!(channel.try_push(b"g"), 0);
        assert_eq!(channel.len(), 4);

        assert_eq!(drain(&channel), b"abcd");
    }

    #[test]
    fn burst_wraps_around_the_end_of_the_buffer() {
        let channel: InputChannel<_, 4> = InputChannel::new(CountingMask::default());

        channel.try_push(b"xyz");
        assert_eq!(channel.try_pop(), Some(b'x'));
        assert_eq!(channel.try_pop(), Some(b'y'));

        // read_idx is 2, `z` sits in slot 2; this burst fills slots 3, 0 and 1.
        assert_eq!(channel.try_push(b"123"), 3);
        assert_eq!(channel.len(), 4);

        assert_eq!(drain(&channel), b"z123");
    }

    #[test]
    fn consumer_masks_interrupts_and_restores_them() {
        let channel: InputChannel<_, 4> = InputChannel::new(CountingMask::default());
        channel.try_push(b"ab");

        channel.try_pop();
        channel.try_pop();

        assert_eq!(channel.interrupts.critical_sections.get(), 2);
        assert!(!channel.interrupts.masked.get());
    }

    #[test]
    fn nested_mask_keeps_interrupts_masked() {
        let control = CountingMask::default();

        let outer = control.mask();
        {
            let _inner = control.mask();
        }
        assert!(control.masked.get());

        drop(outer);
        assert!(!control.masked.get());
    }
}
