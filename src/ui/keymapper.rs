//! Key mapping for shell input
//!
//! Converts crossterm events into the key inputs the line interpreter works
//! with: the key's text, its identity and the held modifiers.

use bitflags::bitflags;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tracing::warn;

bitflags! {
    /// Modifier keys
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Modifiers: u8 {
        const SHIFT     = 0b0_0001;
        const CTRL      = 0b0_0010;
        const ALT       = 0b0_0100;
        const ALT_GRAPH = 0b0_1000;
        const META      = 0b1_0000;
    }
}

impl Modifiers {
    /// A key is printable when no modifier other than Shift is held
    pub fn is_printable(self) -> bool {
        !self.intersects(Modifiers::ALT | Modifiers::ALT_GRAPH | Modifiers::CTRL | Modifiers::META)
    }
}

impl From<KeyModifiers> for Modifiers {
    fn from(mods: KeyModifiers) -> Self {
        let mut result = Modifiers::empty();
        if mods.contains(KeyModifiers::SHIFT) {
            result |= Modifiers::SHIFT;
        }
        if mods.contains(KeyModifiers::CONTROL) {
            result |= Modifiers::CTRL;
        }
        if mods.contains(KeyModifiers::ALT) {
            result |= Modifiers::ALT;
        }
        // Windows consoles report AltGr as Ctrl+Alt
        if mods.contains(KeyModifiers::CONTROL | KeyModifiers::ALT) {
            result |= Modifiers::ALT_GRAPH;
        }
        if mods.intersects(KeyModifiers::SUPER | KeyModifiers::META | KeyModifiers::HYPER) {
            result |= Modifiers::META;
        }
        result
    }
}

/// Key identity as seen by the line interpreter
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
    Enter,
    Backspace,
    Up,
    Down,
    Left,
    Right,
    Char(char),
    Other,
}

impl Key {
    /// Browser-style key code, used for logging
    pub fn code(self) -> u32 {
        match self {
            Key::Enter => 13,
            Key::Backspace => 8,
            Key::Left => 37,
            Key::Up => 38,
            Key::Right => 39,
            Key::Down => 40,
            Key::Char(ch) => ch.to_ascii_uppercase() as u32,
            Key::Other => 0,
        }
    }
}

/// A single key press
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyInput {
    /// Text the key produces; empty for non-character keys
    pub text: String,
    pub key: Key,
    pub modifiers: Modifiers,
}

impl KeyInput {
    pub fn new(key: Key, modifiers: Modifiers) -> Self {
        let text = match key {
            Key::Char(ch) => ch.to_string(),
            _ => String::new(),
        };
        Self { text, key, modifiers }
    }

    /// Unmodified character key
    #[allow(dead_code)]
    pub fn char(ch: char) -> Self {
        Self::new(Key::Char(ch), Modifiers::empty())
    }

    /// Unmodified special key
    #[allow(dead_code)]
    pub fn plain(key: Key) -> Self {
        Self::new(key, Modifiers::empty())
    }
}

/// Input delivered to the session loop
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TerminalEvent {
    Key(KeyInput),
    /// Pasted text, shown verbatim
    Paste(String),
    /// User asked to leave the shell
    Quit,
}

/// Key mapper for converting terminal events to shell input
pub struct KeyMapper;

impl KeyMapper {
    /// Map a crossterm KeyEvent to a key input. Releases and repeats are dropped.
    pub fn map(event: &KeyEvent) -> Option<KeyInput> {
        if event.kind != KeyEventKind::Press {
            return None;
        }

        let key = match event.code {
            KeyCode::Enter => Key::Enter,
            KeyCode::Backspace => Key::Backspace,
            KeyCode::Up => Key::Up,
            KeyCode::Down => Key::Down,
            KeyCode::Left => Key::Left,
            KeyCode::Right => Key::Right,
            KeyCode::Char(ch) => Key::Char(ch),
            KeyCode::Tab => Key::Char('\t'),
            _ => Key::Other,
        };
        Some(KeyInput::new(key, Modifiers::from(event.modifiers)))
    }

    /// Translate a raw terminal event into session input.
    ///
    /// Ctrl+D asks to quit and Ctrl+V pastes the system clipboard; both are
    /// handled here so the line interpreter only ever sees keys.
    pub fn translate(event: Event) -> Option<TerminalEvent> {
        match event {
            Event::Key(key_event) => {
                let input = Self::map(&key_event)?;
                if input.modifiers == Modifiers::CTRL {
                    match input.key {
                        Key::Char('d') | Key::Char('D') => return Some(TerminalEvent::Quit),
                        Key::Char('v') | Key::Char('V') => {
                            return Self::clipboard_text().map(TerminalEvent::Paste);
                        }
                        _ => {}
                    }
                }
                Some(TerminalEvent::Key(input))
            }
            Event::Paste(text) => Some(TerminalEvent::Paste(text)),
            _ => None,
        }
    }

    fn clipboard_text() -> Option<String> {
        match arboard::Clipboard::new().and_then(|mut clipboard| clipboard.get_text()) {
            Ok(text) => Some(text),
            Err(e) => {
                warn!("Clipboard paste failed: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_event(code: KeyCode, mods: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, mods)
    }

    #[test]
    fn test_char_keys() {
        let input = KeyMapper::map(&key_event(KeyCode::Char('a'), KeyModifiers::NONE)).unwrap();
        assert_eq!(input.text, "a");
        assert_eq!(input.key, Key::Char('a'));
        assert!(input.modifiers.is_printable());

        // Shift does not make a key unprintable
        let input = KeyMapper::map(&key_event(KeyCode::Char('A'), KeyModifiers::SHIFT)).unwrap();
        assert_eq!(input.text, "A");
        assert!(input.modifiers.is_printable());

        let input = KeyMapper::map(&key_event(KeyCode::Char('c'), KeyModifiers::CONTROL)).unwrap();
        assert!(!input.modifiers.is_printable());
    }

    #[test]
    fn test_modifier_mapping() {
        let mods = Modifiers::from(KeyModifiers::CONTROL | KeyModifiers::ALT);
        assert!(mods.contains(Modifiers::ALT_GRAPH));

        let mods = Modifiers::from(KeyModifiers::SUPER);
        assert_eq!(mods, Modifiers::META);
        assert!(!mods.is_printable());
    }

    #[test]
    fn test_special_keys() {
        let input = KeyMapper::map(&key_event(KeyCode::Enter, KeyModifiers::NONE)).unwrap();
        assert_eq!(input.key, Key::Enter);
        assert_eq!(input.key.code(), 13);
        assert!(input.text.is_empty());

        let input = KeyMapper::map(&key_event(KeyCode::Left, KeyModifiers::NONE)).unwrap();
        assert_eq!(input.key.code(), 37);

        let input = KeyMapper::map(&key_event(KeyCode::F(1), KeyModifiers::NONE)).unwrap();
        assert_eq!(input.key, Key::Other);

        // Tab is typed text
        let input = KeyMapper::map(&key_event(KeyCode::Tab, KeyModifiers::NONE)).unwrap();
        assert_eq!(input.text, "\t");
        assert_eq!(input.key.code(), 9);
        assert!(input.modifiers.is_printable());
    }

    #[test]
    fn test_release_is_dropped() {
        let event = KeyEvent::new_with_kind(KeyCode::Char('a'), KeyModifiers::NONE, KeyEventKind::Release);
        assert_eq!(KeyMapper::map(&event), None);
    }

    #[test]
    fn test_translate_events() {
        let quit = KeyMapper::translate(Event::Key(key_event(KeyCode::Char('d'), KeyModifiers::CONTROL)));
        assert_eq!(quit, Some(TerminalEvent::Quit));

        let paste = KeyMapper::translate(Event::Paste("ls -la".to_string()));
        assert_eq!(paste, Some(TerminalEvent::Paste("ls -la".to_string())));

        let key = KeyMapper::translate(Event::Key(key_event(KeyCode::Char('x'), KeyModifiers::NONE)));
        assert_eq!(key, Some(TerminalEvent::Key(KeyInput::char('x'))));

        assert_eq!(KeyMapper::translate(Event::FocusGained), None);
    }
}
