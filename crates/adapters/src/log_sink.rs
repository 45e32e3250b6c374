//! Line sinks shared by the JSON logger and the JSON metric exporter.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};

/// A sink that receives pre-formatted, newline-terminated lines.
pub trait LogSink: Send + Sync {
    /// Write a line to the sink.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when the line could not be written.
    fn write_line(&self, line: &str) -> io::Result<()>;
}

/// Log sink that writes to stderr.
#[derive(Debug, Default)]
pub struct StderrLogSink;

impl LogSink for StderrLogSink {
    fn write_line(&self, line: &str) -> io::Result<()> {
        io::stderr().lock().write_all(line.as_bytes())
    }
}

/// Sink that discards every line.
#[derive(Debug, Default)]
pub struct NullLogSink;

impl LogSink for NullLogSink {
    fn write_line(&self, _line: &str) -> io::Result<()> {
        Ok(())
    }
}

/// Write `line`, warning through `tracing` on the first failure only.
///
/// Later failures are dropped silently; the caller never sees them.
pub(crate) fn write_or_warn_once(
    sink: &dyn LogSink,
    line: &str,
    warned: &AtomicBool,
    writer: &'static str,
) {
    if let Err(error) = sink.write_line(line) {
        if !warned.swap(true, Ordering::Relaxed) {
            tracing::warn!(writer, %error, "line sink write failed; further failures are not reported");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn sinks_are_object_safe() -> io::Result<()> {
        let sinks: Vec<Arc<dyn LogSink>> = vec![Arc::new(NullLogSink), Arc::new(StderrLogSink)];
        for sink in &sinks {
            sink.write_line("")?;
        }
        assert_eq!(sinks.len(), 2);
        Ok(())
    }
}
