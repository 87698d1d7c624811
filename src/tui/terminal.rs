use super::event::{EventHandler, TerminalInput};
use crate::core::sink::InteractiveSink;
use crate::domain::error::{SerialMonError, SerialMonResult};
use crossterm::{
    event::{self, DisableBracketedPaste, EnableBracketedPaste},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::io::{self, Write};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// Interactive sink backed by the process's standard output
#[derive(Debug, Default)]
pub struct ConsoleTerminal;

impl ConsoleTerminal {
    pub fn new() -> Self {
        Self
    }
}

impl InteractiveSink for ConsoleTerminal {
    fn append(&self, text: &str) {
        let mut stdout = io::stdout().lock();
        if let Err(e) = stdout.write_all(text.as_bytes()).and_then(|()| stdout.flush()) {
            warn!("Failed to write to terminal: {}", e);
        }
    }

    fn set_dimensions(&self, columns: u16, rows: u16) {
        debug!("Terminal size {}x{}", columns, rows);
    }
}

/// Keeps the terminal in raw mode with bracketed paste until dropped
pub struct RawModeGuard;

impl RawModeGuard {
    pub fn enter() -> SerialMonResult<Self> {
        enable_raw_mode().map_err(|e| SerialMonError::Terminal(e.to_string()))?;
        if let Err(e) = execute!(io::stdout(), EnableBracketedPaste) {
            let _ = disable_raw_mode();
            return Err(SerialMonError::Terminal(e.to_string()));
        }
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = execute!(io::stdout(), DisableBracketedPaste);
        if let Err(e) = disable_raw_mode() {
            warn!("Failed to restore terminal mode: {}", e);
        }
    }
}

/// Read terminal events on a dedicated thread and deliver them as [`TerminalInput`].
///
/// The thread exits on the first event after the receiver is dropped.
pub fn spawn_input_pump() -> mpsc::UnboundedReceiver<TerminalInput> {
    let (sender, receiver) = mpsc::unbounded_channel();

    std::thread::spawn(move || {
        let handler = EventHandler::new();
        loop {
            match event::read() {
                Ok(event) => {
                    if let Some(input) = handler.handle_event(event) {
                        if sender.send(input).is_err() {
                            break;
                        }
                    }
                }
                Err(e) => {
                    error!("Failed to read terminal input: {}", e);
                    break;
                }
            }
        }
    });

    receiver
}
