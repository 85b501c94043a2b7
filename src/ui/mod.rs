//! Terminal input and output.
//!
//! - **keymapper**: crossterm events to shell key inputs
//! - **terminal**: terminal surface trait, crossterm surface, shared handle

pub mod keymapper;
pub mod terminal;

pub use keymapper::{Key, KeyInput, KeyMapper, TerminalEvent};
pub use terminal::{CrosstermSurface, TerminalHandle};
