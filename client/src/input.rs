//! Keyboard handling with a two-state input mode

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use shared::{ClientMessage, Direction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    /// Movement keys send moves immediately
    #[default]
    Move,
    /// Keystrokes are typed into the chat buffer
    Chat,
}

/// What the caller should do after a key was handled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputAction {
    /// Nothing changed
    None,
    /// Local input state changed; redraw the input line
    Redraw,
    /// Send this message; local state may also have changed
    Send(ClientMessage),
    Quit,
}

/// Turns key events into lobby messages
///
/// Mode and buffer live here so the renderer can show them. Positions are
/// never predicted: a move only becomes visible once a snapshot reflects it.
#[derive(Debug, Default)]
pub struct InputManager {
    mode: InputMode,
    buffer: String,
}

impl InputManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> InputAction {
        // Only presses count, so a key repeat on release never double-sends
        if key.kind != KeyEventKind::Press {
            return InputAction::None;
        }

        if key.modifiers.contains(KeyModifiers::CONTROL)
            && matches!(key.code, KeyCode::Char('c') | KeyCode::Char('C'))
        {
            return InputAction::Quit;
        }

        match self.mode {
            InputMode::Move => self.handle_move_key(key.code),
            InputMode::Chat => self.handle_chat_key(key.code),
        }
    }

    fn handle_move_key(&mut self, code: KeyCode) -> InputAction {
        let direction = match code {
            KeyCode::Char(c) => Direction::parse(&c.to_string()),
            KeyCode::Up => Some(Direction::Up),
            KeyCode::Left => Some(Direction::Left),
            KeyCode::Down => Some(Direction::Down),
            KeyCode::Right => Some(Direction::Right),
            KeyCode::Enter => {
                self.mode = InputMode::Chat;
                return InputAction::Redraw;
            }
            _ => None,
        };

        match direction {
            Some(direction) => InputAction::Send(ClientMessage::move_to(direction)),
            None => InputAction::None,
        }
    }

    fn handle_chat_key(&mut self, code: KeyCode) -> InputAction {
        match code {
            KeyCode::Enter => {
                self.mode = InputMode::Move;
                let message = std::mem::take(&mut self.buffer);
                if message.is_empty() {
                    InputAction::Redraw
                } else {
                    InputAction::Send(ClientMessage::chat(message))
                }
            }
            KeyCode::Esc => {
                self.mode = InputMode::Move;
                self.buffer.clear();
                InputAction::Redraw
            }
            KeyCode::Backspace => {
                if self.buffer.pop().is_some() {
                    InputAction::Redraw
                } else {
                    InputAction::None
                }
            }
            KeyCode::Char(c) if !c.is_control() => {
                self.buffer.push(c);
                InputAction::Redraw
            }
            _ => InputAction::None,
        }
    }
}
