//! Human-readable event transcript and the sinks that receive it.
//!
//! The transcript is the optional `(header, text)` stream describing what
//! happens during a run. Engine diagnostics go through `tracing` separately.

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::engine::SimTime;

/// Receiver of transcript lines.
pub trait LogSink {
    /// Consumes one transcript line.
    ///
    /// `header` is `[t.ttt]` for the first line of an event and empty for
    /// further lines produced by the same event.
    fn log(&mut self, header: &str, text: &str);
}

/// Forwards transcript lines to `tracing` at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn log(&mut self, header: &str, text: &str) {
        tracing::info!(target: "comsim::transcript", "{header:10} {text}");
    }
}

/// Prints transcript lines to stdout, one line per text line.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleLogSink;

impl LogSink for ConsoleLogSink {
    fn log(&mut self, header: &str, text: &str) {
        for (index, line) in text.lines().enumerate() {
            let header = if index == 0 { header } else { "" };
            println!("{header:10} {line}");
        }
    }
}

/// Single transcript line captured by [`MemoryLogSink`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Timestamp header or empty placeholder
    pub header: String,
    /// Line content
    pub text: String,
}

/// Collects transcript lines in memory.
///
/// Clones share the same buffer, so a test can keep one handle and give the
/// other to the simulation.
#[derive(Debug, Default, Clone)]
pub struct MemoryLogSink {
    records: Rc<RefCell<Vec<LogRecord>>>,
}

impl MemoryLogSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all captured lines.
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.borrow().clone()
    }

    /// Returns captured line texts that contain `pattern`.
    pub fn matching(&self, pattern: &str) -> Vec<String> {
        self.records
            .borrow()
            .iter()
            .filter(|record| record.text.contains(pattern))
            .map(|record| record.text.clone())
            .collect()
    }
}

impl LogSink for MemoryLogSink {
    fn log(&mut self, header: &str, text: &str) {
        self.records.borrow_mut().push(LogRecord {
            header: header.to_string(),
            text: text.to_string(),
        });
    }
}

/// Formats transcript headers and forwards lines to the configured sink.
#[derive(Default)]
pub(crate) struct Transcript {
    sink: Option<Box<dyn LogSink>>,
    header_pending: bool,
}

impl Transcript {
    pub(crate) fn set_sink(&mut self, sink: Box<dyn LogSink>) {
        self.sink = Some(sink);
    }

    /// Marks the start of a new event; its first line gets a timestamp.
    pub(crate) fn begin_event(&mut self) {
        self.header_pending = true;
    }

    pub(crate) fn log(&mut self, now: SimTime, text: &str) {
        let Some(sink) = self.sink.as_mut() else {
            return;
        };

        let header = if self.header_pending {
            self.header_pending = false;
            format!("[{:.3}]", now.as_secs())
        } else {
            String::new()
        };
        sink.log(&header, text);
    }
}
