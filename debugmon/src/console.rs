//! Line oriented text output towards the human at the other end of the UART.

use core::fmt;

/// A synchronous byte output, typically a blocking UART transmit.
///
/// The sink is provided by the application. Whatever it does with the bytes,
/// the call only returns once they have been handed off.
pub trait ByteSink {
    /// Transmit `bytes`.
    fn write_bytes(&mut self, bytes: &[u8]);
}

impl<T: ByteSink + ?Sized> ByteSink for &mut T {
    fn write_bytes(&mut self, bytes: &[u8]) {
        (**self).write_bytes(bytes)
    }
}

#[cfg(any(test, feature = "std"))]
impl ByteSink for Vec<u8> {
    fn write_bytes(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }
}

/// Formats text into a [`ByteSink`] and terminates every line with `"\r\n"`.
///
/// Output is fire-and-forget: a sink cannot fail, so neither can the console.
#[derive(Debug)]
pub struct Console<S> {
    sink: S,
}

impl<S: ByteSink> Console<S> {
    /// Wrap `sink`.
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    /// Write one formatted line.
    pub fn line(&mut self, args: fmt::Arguments<'_>) {
        // `Write::write_str` below never fails.
        let _ = fmt::Write::write_fmt(self, args);
        self.sink.write_bytes(b"\r\n");
    }

    /// Give back the wrapped sink.
    pub fn into_inner(self) -> S {
        self.sink
    }
}

impl<S: ByteSink> fmt::Write for Console<S> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let mut lines = s.split('\n');
        if let Some(first) = lines.next() {
            self.sink.write_bytes(first.as_bytes());
        }
        for line in lines {
            self.sink.write_bytes(b"\r\n");
            self.sink.write_bytes(line.as_bytes());
        }
        Ok(())
    }
}

/// Write a formatted line to a [`Console`].
#[macro_export]
macro_rules! console_line {
    ($console:expr, $($arg:tt)*) => {
        $console.line(::core::format_args!($($arg)*))
    };
}
