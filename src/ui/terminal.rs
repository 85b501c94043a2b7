//! Terminal surface
//!
//! Everything the shell shows goes through a [`TerminalSurface`]. The
//! crossterm surface drives the real console in raw mode; tests use the
//! in-memory surface and inspect the transcript.

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use crossterm::{
    cursor::MoveTo,
    event::{DisableBracketedPaste, EnableBracketedPaste},
    execute,
    terminal::{self, Clear, ClearType},
};
use tracing::{debug, warn};

/// Output primitives of a terminal.
pub trait TerminalSurface {
    /// Write text as-is at the cursor.
    fn write(&mut self, text: &str) -> io::Result<()>;
    /// Write text followed by a line break.
    fn write_line(&mut self, text: &str) -> io::Result<()>;
    /// Clear the whole screen and home the cursor.
    fn clear(&mut self) -> io::Result<()>;
}

/// Console surface backed by crossterm.
pub struct CrosstermSurface<W: Write = io::Stdout> {
    out: W,
    /// Whether raw mode has been entered
    initialized: bool,
    /// Request bracketed paste so pasted text arrives as one event
    bracketed_paste: bool,
}

impl CrosstermSurface {
    pub fn new(bracketed_paste: bool) -> Self {
        Self::with_writer(io::stdout(), bracketed_paste)
    }
}

impl<W: Write> CrosstermSurface<W> {
    pub fn with_writer(out: W, bracketed_paste: bool) -> Self {
        Self {
            out,
            initialized: false,
            bracketed_paste,
        }
    }

    /// Enter raw mode so keys arrive one by one without local echo
    pub fn init(&mut self) -> io::Result<()> {
        terminal::enable_raw_mode()?;
        // From here on cleanup must run, even if the rest of init fails
        self.initialized = true;
        if self.bracketed_paste {
            execute!(self.out, EnableBracketedPaste)?;
        }
        debug!("Terminal surface initialized (bracketed paste: {})", self.bracketed_paste);
        Ok(())
    }

    /// Restore the console. Safe to call more than once.
    ///
    /// Raw mode is always left, even when an earlier step fails; the first
    /// error is returned.
    pub fn cleanup(&mut self) -> io::Result<()> {
        if !self.initialized {
            return Ok(());
        }
        self.initialized = false;

        let mut result = Ok(());
        if self.bracketed_paste {
            keep_first(&mut result, execute!(self.out, DisableBracketedPaste));
        }
        keep_first(&mut result, write!(self.out, "\x1b[0m\r\n")); // Reset attributes
        keep_first(&mut result, self.out.flush());
        keep_first(&mut result, terminal::disable_raw_mode());
        result
    }
}

fn keep_first(result: &mut io::Result<()>, step: io::Result<()>) {
    if let Err(e) = step {
        warn!("Terminal restore step failed: {}", e);
        if result.is_ok() {
            *result = Err(e);
        }
    }
}

impl<W: Write> Drop for CrosstermSurface<W> {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

impl<W: Write> TerminalSurface for CrosstermSurface<W> {
    fn write(&mut self, text: &str) -> io::Result<()> {
        self.out.write_all(normalize_newlines(text).as_bytes())?;
        self.out.flush()
    }

    fn write_line(&mut self, text: &str) -> io::Result<()> {
        self.out.write_all(normalize_newlines(text).as_bytes())?;
        // Raw mode has no implicit carriage return
        self.out.write_all(b"\r\n")?;
        self.out.flush()
    }

    fn clear(&mut self) -> io::Result<()> {
        execute!(self.out, Clear(ClearType::All), MoveTo(0, 0))
    }
}

/// Turn bare `\n` into `\r\n` so command output does not staircase in raw mode.
fn normalize_newlines(text: &str) -> std::borrow::Cow<'_, str> {
    if !text.contains('\n') {
        return std::borrow::Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len() + 8);
    let mut prev = '\0';
    for ch in text.chars() {
        if ch == '\n' && prev != '\r' {
            out.push('\r');
        }
        out.push(ch);
        prev = ch;
    }
    std::borrow::Cow::Owned(out)
}

/// Shared handle to the single terminal surface of the process.
///
/// Writes go straight through to the surface; nothing is buffered. Write
/// failures are logged and dropped so a broken console never takes the
/// session loop down with it.
#[derive(Clone)]
pub struct TerminalHandle {
    surface: Rc<RefCell<dyn TerminalSurface>>,
}

impl TerminalHandle {
    pub fn new<S: TerminalSurface + 'static>(surface: S) -> Self {
        Self {
            surface: Rc::new(RefCell::new(surface)),
        }
    }

    pub fn write(&self, text: &str) {
        if let Err(e) = self.surface.borrow_mut().write(text) {
            warn!("Terminal write failed: {}", e);
        }
    }

    pub fn write_line(&self, text: &str) {
        if let Err(e) = self.surface.borrow_mut().write_line(text) {
            warn!("Terminal write failed: {}", e);
        }
    }

    pub fn clear(&self) {
        if let Err(e) = self.surface.borrow_mut().clear() {
            warn!("Terminal clear failed: {}", e);
        }
    }
}

/// In-memory surface recording everything written to it.
#[cfg(test)]
#[derive(Clone, Default)]
pub struct MemorySurface {
    transcript: Rc<RefCell<String>>,
    clears: Rc<std::cell::Cell<usize>>,
}

#[cfg(test)]
impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written since the last clear; line breaks are `\n`
    pub fn contents(&self) -> String {
        self.transcript.borrow().clone()
    }

    pub fn clear_count(&self) -> usize {
        self.clears.get()
    }

    /// A handle writing into this surface; the surface stays readable
    pub fn handle(&self) -> TerminalHandle {
        TerminalHandle::new(self.clone())
    }
}

#[cfg(test)]
impl TerminalSurface for MemorySurface {
    fn write(&mut self, text: &str) -> io::Result<()> {
        self.transcript.borrow_mut().push_str(text);
        Ok(())
    }

    fn write_line(&mut self, text: &str) -> io::Result<()> {
        let mut transcript = self.transcript.borrow_mut();
        transcript.push_str(text);
        transcript.push('\n');
        Ok(())
    }

    fn clear(&mut self) -> io::Result<()> {
        self.transcript.borrow_mut().clear();
        self.clears.set(self.clears.get() + 1);
        Ok(())
    }
}
