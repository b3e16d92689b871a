//! Text reporting of decoded values.
//!
//! Decoders return plain values; callers hand them to a diagnostic sink, any
//! [`core::fmt::Write`] implementation (a USB-CDC stream, a UART, a buffer).

use core::fmt::Write;

/// Values that can describe themselves as text lines.
pub trait Report {
    /// Writes one or more newline-terminated lines to `sink`.
    fn report<W: Write>(&self, sink: &mut W) -> core::fmt::Result;
}

/// Writes `value` to `sink`, ignoring sink failures.
///
/// Reporting is fire-and-forget: a full or absent sink never affects decoding.
pub fn emit<R, W>(value: &R, sink: &mut W)
where
    R: Report + ?Sized,
    W: Write,
{
    if value.report(sink).is_err() {
        trace!("diagnostic sink rejected output");
    }
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NullSink;

impl Write for NullSink {
    fn write_str(&mut self, _s: &str) -> core::fmt::Result {
        Ok(())
    }
}
