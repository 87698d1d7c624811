//! Line-buffered routing of interactive input.
//!
//! Keystrokes arrive one at a time and pastes arrive as a block; both are
//! accumulated until a line terminator shows up, then each complete line is
//! handed to the bound [`ConnectionController`].

use crate::core::controller::ConnectionController;
use crate::core::sink::DualSink;
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Terminator that marks a complete line in the input buffer
pub const LINE_TERMINATOR: &str = "\r\n";

/// Router shared between the input pump and the controller that binds to it
pub type SharedRouter = Arc<Mutex<LineBufferedInputRouter>>;

pub struct LineBufferedInputRouter {
    buffer: String,
    controller: Option<Weak<ConnectionController>>,
    sink: Arc<DualSink>,
}

impl LineBufferedInputRouter {
    pub fn new(sink: Arc<DualSink>) -> Self {
        Self {
            buffer: String::new(),
            controller: None,
            sink,
        }
    }

    pub fn shared(sink: Arc<DualSink>) -> SharedRouter {
        Arc::new(Mutex::new(Self::new(sink)))
    }

    /// Rebind the write target. `None` detaches; lines flushed while
    /// detached are dropped, never queued.
    pub fn set_connection_controller(&mut self, controller: Option<Weak<ConnectionController>>) {
        self.controller = controller;
    }

    pub fn is_attached(&self) -> bool {
        self.controller
            .as_ref()
            .is_some_and(|controller| controller.strong_count() > 0)
    }

    /// Input not yet terminated by a line break
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    pub async fn handle_input(&mut self, chunk: &str) {
        let normalized = normalize_line_endings(chunk);
        self.buffer.push_str(&normalized);

        while let Some(index) = self.buffer.find(LINE_TERMINATOR) {
            let line: String = self.buffer.drain(..index + LINE_TERMINATOR.len()).collect();
            self.dispatch(&line[..index]).await;
        }

        self.sink.append(&normalized);
    }

    async fn dispatch(&self, line: &str) {
        let Some(controller) = self.controller.as_ref().and_then(Weak::upgrade) else {
            debug!("No serial port bound, dropping {} bytes of input", line.len());
            return;
        };

        // The controller already reported the failure on both sinks.
        if let Err(e) = controller.send_message(line).await {
            warn!("Failed to send input line: {}", e);
        }
    }
}

/// Expand every carriage return not already followed by a line feed into CRLF.
pub fn normalize_line_endings(chunk: &str) -> String {
    let mut normalized = String::with_capacity(chunk.len() + 1);
    let mut chars = chunk.chars().peekable();

    while let Some(c) = chars.next() {
        normalized.push(c);
        if c == '\r' && chars.peek() != Some(&'\n') {
            normalized.push('\n');
        }
    }

    normalized
}
