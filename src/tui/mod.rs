// TUI module - Raw terminal front end for the serial monitor
pub mod event;
pub mod terminal;

pub use event::{EventHandler, LocalCommand, TerminalInput};
pub use terminal::{spawn_input_pump, ConsoleTerminal, RawModeGuard};
