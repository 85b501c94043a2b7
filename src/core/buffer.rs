//! Line buffer and key interpreter
//!
//! Keys are folded into the in-progress line one at a time. The buffer only
//! decides what a key means; the session loop performs the matching terminal
//! output.

use unicode_width::UnicodeWidthChar;

use crate::ui::{Key, KeyInput};

/// Arrow key direction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

/// What a key did to the line
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyAction {
    /// Enter on a non-empty line; the buffer has been emptied
    Submit(String),
    /// Enter on an empty line
    EmptySubmit,
    /// Text appended to the line, to be echoed
    Echo(String),
    /// Last character removed; value is its display width in columns
    Erase(usize),
    /// Arrow key, reserved for history recall and cursor movement
    Navigate(Direction),
    Ignored,
}

/// The in-progress input line
#[derive(Clone, Debug, Default)]
pub struct LineBuffer {
    text: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(dead_code)]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Fold one key into the line
    pub fn interpret(&mut self, input: &KeyInput) -> KeyAction {
        match input.key {
            Key::Enter => {
                if self.text.is_empty() {
                    KeyAction::EmptySubmit
                } else {
                    KeyAction::Submit(std::mem::take(&mut self.text))
                }
            }
            Key::Backspace => match self.pop_char() {
                Some(columns) => KeyAction::Erase(columns),
                None => KeyAction::Ignored,
            },
            Key::Up => KeyAction::Navigate(Direction::Up),
            Key::Down => KeyAction::Navigate(Direction::Down),
            Key::Left => KeyAction::Navigate(Direction::Left),
            Key::Right => KeyAction::Navigate(Direction::Right),
            _ if input.modifiers.is_printable() && !input.text.is_empty() => {
                self.text.push_str(&input.text);
                KeyAction::Echo(input.text.clone())
            }
            _ => KeyAction::Ignored,
        }
    }

    /// Remove the last character with any combining marks on it; returns
    /// the columns it occupied
    fn pop_char(&mut self) -> Option<usize> {
        let mut popped = false;
        while let Some(ch) = self.text.pop() {
            popped = true;
            match ch.width() {
                Some(0) => continue,
                width => return Some(width.unwrap_or(1)),
            }
        }
        popped.then_some(0)
    }
}

/// Terminal sequence erasing `columns` cells left of the cursor
pub fn erase_sequence(columns: usize) -> String {
    "\x08 \x08".repeat(columns)
}
