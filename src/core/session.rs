//! Session state and the session loop
//!
//! The loop cycles `Idle → Dispatching → Reporting → Idle`:
//!
//! ```text
//!   Idle ──line──▶ Dispatching ──outcome settles──▶ Reporting ──delay──▶ Idle
//!    ▲                                                                     │
//!    └──────────────────────────── prompt ◀────────────────────────────────┘
//! ```
//!
//! Keys are echoed in every phase, but a completed line is only dispatched
//! from `Idle`. Lines completed while busy wait in a queue and go out, in
//! order, after the next prompt.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::rc::Rc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{sleep, Sleep};
use tracing::{debug, info, warn};

use super::buffer::{erase_sequence, Direction, KeyAction, LineBuffer};
use super::dispatch::{CommandRegistry, Dispatch, Dispatcher};
use super::error::{render_error, ShellError};
use crate::config::Config;
use crate::host::Host;
use crate::ui::{KeyInput, TerminalEvent, TerminalHandle};

/// Version label used when the host has none configured
const DEFAULT_VERSION: &str = "latest";

/// Command run once at startup, before the first prompt
const STARTUP_COMMAND: &str = "banner";

/// State owned by one session
#[derive(Clone, Debug)]
pub struct SessionState {
    working_directory: PathBuf,
    input: LineBuffer,
    /// Every submitted line, oldest first
    history: Vec<String>,
}

impl SessionState {
    pub fn new(working_directory: PathBuf) -> Self {
        Self {
            working_directory,
            input: LineBuffer::new(),
            history: Vec::new(),
        }
    }

    pub fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    #[allow(dead_code)]
    pub fn input(&self) -> &LineBuffer {
        &self.input
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub(crate) fn record(&mut self, line: &str) {
        self.history.push(line.to_string());
    }
}

/// Session settings
#[derive(Clone, Debug)]
pub struct ShellSettings {
    pub app_name: String,
    pub working_directory: PathBuf,
    /// 256-colour index behind the prompt
    pub prompt_background: u8,
    /// Pause between a report and the next prompt
    pub redraw_delay: Duration,
}

impl ShellSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            app_name: config.app_name.clone(),
            working_directory: PathBuf::from(&config.working_directory),
            prompt_background: config.prompt.background,
            redraw_delay: config.prompt.redraw_delay(),
        }
    }
}

enum Phase {
    Idle,
    Dispatching(Dispatch),
    Reporting(Pin<Box<Sleep>>),
}

enum PhaseEvent {
    Settled(Result<(), ShellError>),
    DelayElapsed,
}

enum Step {
    Input(Option<TerminalEvent>),
    Phase(PhaseEvent),
}

/// Wait for the current phase to make progress. Never resolves while idle.
async fn next_phase_event(phase: &mut Phase) -> PhaseEvent {
    match phase {
        Phase::Idle => std::future::pending().await,
        Phase::Dispatching(dispatch) => PhaseEvent::Settled(dispatch.outcome.as_mut().await),
        Phase::Reporting(delay) => {
            delay.as_mut().await;
            PhaseEvent::DelayElapsed
        }
    }
}

/// One interactive session
pub struct Shell {
    state: SessionState,
    dispatcher: Dispatcher,
    host: Rc<dyn Host>,
    terminal: TerminalHandle,
    settings: ShellSettings,
    phase: Phase,
    /// Lines completed while a dispatch was in flight
    queued: VecDeque<String>,
}

impl Shell {
    pub fn new(
        settings: ShellSettings,
        registry: CommandRegistry,
        host: Rc<dyn Host>,
        terminal: TerminalHandle,
    ) -> Self {
        let dispatcher = Dispatcher::new(registry, Rc::clone(&host), terminal.clone());
        Self {
            state: SessionState::new(settings.working_directory.clone()),
            dispatcher,
            host,
            terminal,
            settings,
            phase: Phase::Idle,
            queued: VecDeque::new(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.phase, Phase::Idle)
    }

    /// Run the session until input ends or the user quits.
    ///
    /// Starts with the banner. Once `events` is closed, work already in
    /// flight (including queued lines) is finished before returning.
    pub async fn run(&mut self, mut events: UnboundedReceiver<TerminalEvent>) {
        self.start();
        let mut open = true;

        loop {
            if !open && self.is_idle() && self.queued.is_empty() {
                break;
            }

            let step = tokio::select! {
                biased;
                event = next_phase_event(&mut self.phase) => Step::Phase(event),
                event = events.recv(), if open => Step::Input(event),
            };

            match step {
                Step::Input(Some(TerminalEvent::Key(input))) => self.on_key(&input),
                Step::Input(Some(TerminalEvent::Paste(text))) => self.on_paste(&text),
                Step::Input(Some(TerminalEvent::Quit)) => {
                    if self.is_idle() && self.state.input.is_empty() && self.queued.is_empty() {
                        info!("Quit requested");
                        return;
                    }
                    debug!("Quit ignored while the session is busy");
                }
                Step::Input(None) => {
                    debug!("Input closed");
                    open = false;
                }
                Step::Phase(PhaseEvent::Settled(result)) => {
                    if let Phase::Dispatching(dispatch) = std::mem::replace(&mut self.phase, Phase::Idle) {
                        self.report(dispatch, result);
                    }
                }
                Step::Phase(PhaseEvent::DelayElapsed) => self.resume(),
            }
        }
    }

    fn start(&mut self) {
        info!("Session starting in {}", self.state.working_directory.display());
        self.submit(STARTUP_COMMAND);
    }

    /// Handle one key press
    pub fn on_key(&mut self, input: &KeyInput) {
        match self.state.input.interpret(input) {
            KeyAction::Submit(line) => {
                if self.is_idle() {
                    self.submit(&line);
                } else {
                    debug!("Queueing '{}' until the current command finishes", line);
                    self.queued.push_back(line);
                }
            }
            KeyAction::EmptySubmit => {
                // While busy the prompt is about to be drawn anyway
                if self.is_idle() {
                    self.prompt();
                }
            }
            KeyAction::Echo(text) => self.terminal.write(&text),
            KeyAction::Erase(columns) => self.terminal.write(&erase_sequence(columns)),
            KeyAction::Navigate(direction) => self.on_navigate(direction),
            KeyAction::Ignored => debug!("Ignored key code {}", input.key.code()),
        }
    }

    /// Pasted text is shown as-is
    pub fn on_paste(&mut self, text: &str) {
        self.terminal.write(text);
    }

    /// Arrow keys: reserved for history recall and cursor movement, which
    /// this shell does not offer yet.
    fn on_navigate(&mut self, direction: Direction) {
        debug!("No binding for {:?} arrow", direction);
    }

    fn submit(&mut self, line: &str) {
        self.terminal.write_line("");
        let dispatch = self.dispatcher.dispatch(&mut self.state, line);
        self.phase = Phase::Dispatching(dispatch);
    }

    fn report(&mut self, dispatch: Dispatch, result: Result<(), ShellError>) {
        self.terminal.write_line("");

        match result {
            Ok(()) => {
                if let Some(dir) = dispatch.directory_change() {
                    info!("Working directory: {}", dir.display());
                    self.state.working_directory = dir;
                }
            }
            Err(e) => {
                warn!("Command failed ({}): {}", e.kind(), e);
                self.terminal.write_line(&render_error(&e));
            }
        }

        self.phase = Phase::Reporting(Box::pin(sleep(self.settings.redraw_delay)));
    }

    fn resume(&mut self) {
        self.phase = Phase::Idle;
        self.prompt();

        if let Some(line) = self.queued.pop_front() {
            self.submit(&line);
        }
    }

    pub fn prompt(&self) {
        self.terminal.write_line("");
        self.terminal.write(&self.prompt_text());
    }

    /// `user@app-version:cwd > ` on the configured background colour
    pub fn prompt_text(&self) -> String {
        let user = self.host.current_user();
        let version = self
            .host
            .config_value("version")
            .unwrap_or_else(|| DEFAULT_VERSION.to_string());

        format!(
            "\x1b[48;5;{}m{}@{}-{}:{} > \x1b[0m ",
            self.settings.prompt_background,
            user.username,
            self.settings.app_name,
            version,
            self.state.working_directory.display()
        )
    }
}
