use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// Destination for rendered log lines.
///
/// Implementations must write each line atomically with respect to other
/// callers: concurrent events may never interleave partial lines.
pub trait LineSink: Send + Sync {
    /// Write a single line. `line` carries no trailing newline.
    ///
    /// **Returns**
    /// - `Ok(())` once the line has been written and flushed.
    /// - `Err(..)` if the underlying stream failed. The appender counts the
    ///   line as dropped and carries on.
    fn write_line(&self, line: &str) -> io::Result<()>;
}

/// Writes lines to the process stdout.
#[derive(Clone, Copy, Debug, Default)]
pub struct StdoutSink;

impl LineSink for StdoutSink {
    fn write_line(&self, line: &str) -> io::Result<()> {
        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');

        let mut out = io::stdout().lock();
        out.write_all(buf.as_bytes())?;
        out.flush()
    }
}

/// A sink that keeps every line in memory.
///
/// Useful for tests and for asserting on output without capturing stdout.
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

impl LineSink for MemorySink {
    fn write_line(&self, line: &str) -> io::Result<()> {
        self.lines
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "memory sink poisoned"))?
            .push(line.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_keeps_lines_in_order() {
        let sink = MemorySink::new();
        let shared = sink.clone();

        sink.write_line("first").unwrap();
        shared.write_line("second").unwrap();

        assert_eq!(sink.lines(), vec!["first", "second"]);
    }

    #[test]
    fn test_stdout_sink_writes() {
        StdoutSink.write_line("stdout sink smoke line").unwrap();
    }
}
