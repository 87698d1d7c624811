use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

/// Actions handled by the monitor itself rather than sent to the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalCommand {
    Quit,
    CycleBaudRate,
    NextPort,
    Reopen,
}

/// Input delivered by the interactive terminal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalInput {
    /// Raw text as typed or pasted
    Chunk(String),
    Resize(u16, u16),
    Command(LocalCommand),
}

pub struct EventHandler;

impl EventHandler {
    pub fn new() -> Self {
        Self
    }

    pub fn handle_event(&self, event: Event) -> Option<TerminalInput> {
        match event {
            Event::Key(key) => self.handle_key_event(key),
            Event::Paste(text) => Some(TerminalInput::Chunk(text)),
            Event::Resize(columns, rows) => Some(TerminalInput::Resize(columns, rows)),
            _ => None,
        }
    }

    pub fn handle_key_event(&self, key: KeyEvent) -> Option<TerminalInput> {
        if key.kind == KeyEventKind::Release {
            return None;
        }
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

        let chunk = match key.code {
            // Unix terminals report Ctrl-] as Ctrl-5
            KeyCode::Char(']') | KeyCode::Char('5') if ctrl => {
                return Some(TerminalInput::Command(LocalCommand::Quit))
            }
            KeyCode::F(2) => return Some(TerminalInput::Command(LocalCommand::CycleBaudRate)),
            KeyCode::F(3) => return Some(TerminalInput::Command(LocalCommand::NextPort)),
            KeyCode::F(5) => return Some(TerminalInput::Command(LocalCommand::Reopen)),
            KeyCode::Char(c) if ctrl && c.is_ascii_alphabetic() => {
                char::from(c.to_ascii_lowercase() as u8 & 0x1f).to_string()
            }
            KeyCode::Char(c) => c.to_string(),
            KeyCode::Enter => "\r".to_string(),
            KeyCode::Tab => "\t".to_string(),
            KeyCode::Backspace => "\x7f".to_string(),
            KeyCode::Esc => "\x1b".to_string(),
            _ => return None,
        };

        Some(TerminalInput::Chunk(chunk))
    }
}

impl Default for EventHandler {
    fn default() -> Self {
        Self::new()
    }
}
