//! Destinations for trace output.

use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

/// Receives rendered trace text.
pub trait TraceSink: Send + Sync {
    /// Write `text`, terminating the line when `end_line` is set.
    fn write(&self, text: &str, end_line: bool);
}

/// Writes trace lines to standard output, flushing after every write.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl TraceSink for StdoutSink {
    fn write(&self, text: &str, end_line: bool) {
        let mut out = io::stdout().lock();
        let result = if end_line {
            writeln!(out, "{}", text)
        } else {
            write!(out, "{}", text)
        };
        // A closed stdout must not take the proxy down.
        let _ = result.and_then(|_| out.flush());
    }
}

/// Collects trace lines in memory.
#[derive(Debug, Default)]
pub struct CaptureSink {
    state: Mutex<CaptureState>,
}

#[derive(Debug, Default)]
struct CaptureState {
    lines: Vec<String>,
    partial: String,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Completed lines, oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.state().lines.clone()
    }

    /// Text written since the last completed line.
    pub fn pending(&self) -> String {
        self.state().partial.clone()
    }

    pub fn clear(&self) {
        let mut state = self.state();
        state.lines.clear();
        state.partial.clear();
    }

    fn state(&self) -> std::sync::MutexGuard<'_, CaptureState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TraceSink for CaptureSink {
    fn write(&self, text: &str, end_line: bool) {
        let mut state = self.state();
        state.partial.push_str(text);
        if end_line {
            let line = std::mem::take(&mut state.partial);
            state.lines.push(line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_joins_partial_writes() {
        let sink = CaptureSink::new();
        sink.write("echo(message='hi')", false);
        assert!(sink.lines().is_empty());
        assert_eq!(sink.pending(), "echo(message='hi')");

        sink.write(" -> 'hi'", true);
        assert_eq!(sink.lines(), vec!["echo(message='hi') -> 'hi'"]);
        assert_eq!(sink.pending(), "");

        sink.clear();
        assert!(sink.lines().is_empty());
    }
}
