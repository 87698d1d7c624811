//! Output targets for session status and device data.
//!
//! A session writes to exactly two places: a persistent log and the
//! interactive terminal. [`DualSink`] fans every call out to both.

use std::sync::Arc;

/// Line terminator used by the interactive terminal
pub const TERMINAL_LINE_ENDING: &str = "\r\n";

/// Line terminator native to the host, used by persistent logs
#[cfg(windows)]
pub const NATIVE_LINE_ENDING: &str = "\r\n";
#[cfg(not(windows))]
pub const NATIVE_LINE_ENDING: &str = "\n";

/// Persistent, append-only log target
pub trait LogSink: Send + Sync {
    fn append(&self, text: &str);

    fn append_line(&self, text: &str) {
        self.append(&format!("{}{}", text, NATIVE_LINE_ENDING));
    }

    /// Bring the log to the user's attention
    fn show(&self);
}

/// Interactive terminal target
pub trait InteractiveSink: Send + Sync {
    fn append(&self, text: &str);

    fn append_line(&self, text: &str) {
        self.append(&format!("{}{}", text, TERMINAL_LINE_ENDING));
    }

    /// Display size reported by the host. Output is never reflowed, so this is informational only.
    fn set_dimensions(&self, _columns: u16, _rows: u16) {}
}

/// Fan-out to a log target and an interactive target
#[derive(Clone)]
pub struct DualSink {
    log: Arc<dyn LogSink>,
    terminal: Arc<dyn InteractiveSink>,
}

impl DualSink {
    pub fn new(log: Arc<dyn LogSink>, terminal: Arc<dyn InteractiveSink>) -> Self {
        Self { log, terminal }
    }

    pub fn append(&self, text: &str) {
        self.log.append(text);
        self.terminal.append(text);
    }

    pub fn append_line(&self, text: &str) {
        self.log.append_line(text);
        self.terminal.append_line(text);
    }

    pub fn show_log(&self) {
        self.log.show();
    }
}
