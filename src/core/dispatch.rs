//! Command registry and dispatcher
//!
//! Commands implement [`Command`] and are registered by name. The dispatcher
//! resolves a line's first word, parses the rest, runs the command with a
//! fresh [`ExecutionContext`] and turns whatever the command chose into one
//! future: see [`CompletionPolicy`].

use std::collections::BTreeMap;
use std::future::{ready, Future};
use std::path::PathBuf;
use std::pin::Pin;
use std::rc::Rc;

use tracing::{debug, info, warn};

use super::args::{self, ArgSchema, ParsedOptions};
use super::context::{ContextFactory, EffectSlot, ExecutionContext};
use super::error::{CommandError, ShellError};
use super::session::SessionState;
use crate::host::Host;
use crate::ui::TerminalHandle;

/// Pending outcome returned by a command
pub type CommandFuture = Pin<Box<dyn Future<Output = Result<(), CommandError>>>>;

/// Outcome of one dispatch
pub type DispatchFuture = Pin<Box<dyn Future<Output = Result<(), ShellError>>>>;

/// How a command completes
pub enum CompletionPolicy {
    /// Already done when `execute` returned
    Immediate,
    /// Done when this future resolves. Wins over any later
    /// [`ExecutionContext::close`] on the same context.
    Pending(CommandFuture),
    /// Done when the context is closed
    Channel,
}

impl CompletionPolicy {
    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = Result<(), CommandError>> + 'static,
    {
        CompletionPolicy::Pending(Box::pin(future))
    }
}

/// What a command gets to work with
pub struct CommandEnv {
    pub context: ExecutionContext,
    pub host: Rc<dyn Host>,
    pub terminal: TerminalHandle,
}

/// A single executable command
pub trait Command {
    /// The command name (what the user types)
    fn name(&self) -> &str;

    /// One-line description for `help`
    fn description(&self) -> &str;

    /// Flags this command accepts; none by default
    fn schema(&self) -> ArgSchema {
        ArgSchema::empty()
    }

    /// Run the command. An `Err` is a synchronous failure.
    fn execute(
        &self,
        env: CommandEnv,
        args: ParsedOptions,
        input: &str,
    ) -> Result<CompletionPolicy, CommandError>;
}

/// Registry of available commands
#[derive(Default)]
pub struct CommandRegistry {
    commands: BTreeMap<String, Box<dyn Command>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command. Replaces any existing command with the same name.
    pub fn register(&mut self, cmd: Box<dyn Command>) {
        self.commands.insert(cmd.name().to_string(), cmd);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Command> {
        self.commands.get(name).map(|cmd| cmd.as_ref())
    }

    /// Commands in name order
    pub fn iter(&self) -> impl Iterator<Item = &dyn Command> {
        self.commands.values().map(|cmd| cmd.as_ref())
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.commands.len()
    }
}

/// A dispatch in flight
pub struct Dispatch {
    pub outcome: DispatchFuture,
    effects: Option<EffectSlot>,
}

impl Dispatch {
    fn failed(err: ShellError) -> Self {
        Self {
            outcome: Box::pin(ready(Err(err))),
            effects: None,
        }
    }

    /// Directory the command asked to switch to, if any
    pub fn directory_change(&self) -> Option<PathBuf> {
        self.effects.as_ref().and_then(|fx| fx.borrow().directory.clone())
    }
}

pub struct Dispatcher {
    registry: CommandRegistry,
    host: Rc<dyn Host>,
    terminal: TerminalHandle,
    contexts: ContextFactory,
}

impl Dispatcher {
    pub fn new(registry: CommandRegistry, host: Rc<dyn Host>, terminal: TerminalHandle) -> Self {
        let contexts = ContextFactory::new(terminal.clone());
        Self {
            registry,
            host,
            terminal,
            contexts,
        }
    }

    /// Dispatch one submitted line.
    ///
    /// The line goes into history whether or not it resolves. The command
    /// runs before this returns; the returned [`Dispatch`] settles when the
    /// command has completed.
    pub fn dispatch(&mut self, state: &mut SessionState, raw_input: &str) -> Dispatch {
        let mut words = raw_input.split_whitespace();
        let name = words.next().unwrap_or_default();
        let words: Vec<&str> = words.collect();

        state.record(raw_input);

        let Some(command) = self.registry.get(name) else {
            warn!("Command not found: {}", raw_input);
            return Dispatch::failed(ShellError::CommandNotFound(raw_input.to_string()));
        };

        let options = match args::parse(&command.schema(), &words) {
            Ok(options) => options,
            Err(e) => return Dispatch::failed(ShellError::HandlerSyncFailure(e)),
        };

        let (context, completion) = self.contexts.create(raw_input, state.working_directory());
        let sink = self.terminal.clone();
        context.on_data(move |text| sink.write(text));
        let effects = context.effects();
        let id = context.id();
        // Released when this returns, so a forgotten close still abandons
        let probe = context.clone();

        info!("Dispatching '{}' (context {})", context.input(), id);
        let env = CommandEnv {
            context,
            host: Rc::clone(&self.host),
            terminal: self.terminal.clone(),
        };

        let outcome: DispatchFuture = match command.execute(env, options, raw_input) {
            Err(e) => Box::pin(ready(Err(ShellError::HandlerSyncFailure(e)))),
            Ok(CompletionPolicy::Immediate) => {
                debug!("Context {} completed immediately", id);
                Box::pin(ready(Ok(())))
            }
            Ok(CompletionPolicy::Pending(future)) => {
                debug!("Context {} completes with its returned future", id);
                Box::pin(async move { future.await.map_err(ShellError::HandlerAsyncFailure) })
            }
            Ok(CompletionPolicy::Channel) => {
                if probe.is_closed() {
                    debug!("Context {} closed before returning", id);
                } else {
                    debug!("Context {} completes through its channel", id);
                }
                Box::pin(async move { completion.wait().await.map_err(ShellError::HandlerAsyncFailure) })
            }
        };

        Dispatch {
            outcome,
            effects: Some(effects),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::ContextEvent;
    use crate::host::StaticHost;
    use crate::ui::terminal::MemorySurface;
    use std::cell::Cell;
    use std::time::Duration;

    /// Test command whose behaviour is a closure
    struct FnCommand<F> {
        name: &'static str,
        schema: ArgSchema,
        run: F,
    }

    impl<F> Command for FnCommand<F>
    where
        F: Fn(CommandEnv, ParsedOptions) -> Result<CompletionPolicy, CommandError>,
    {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "test command"
        }

        fn schema(&self) -> ArgSchema {
            self.schema.clone()
        }

        fn execute(&self, env: CommandEnv, args: ParsedOptions, _input: &str) -> Result<CompletionPolicy, CommandError> {
            (self.run)(env, args)
        }
    }

    fn command<F>(name: &'static str, run: F) -> Box<dyn Command>
    where
        F: Fn(CommandEnv, ParsedOptions) -> Result<CompletionPolicy, CommandError> + 'static,
    {
        Box::new(FnCommand { name, schema: ArgSchema::empty(), run })
    }

    fn setup(commands: Vec<Box<dyn Command>>) -> (Dispatcher, SessionState, MemorySurface) {
        let surface = MemorySurface::new();
        let mut registry = CommandRegistry::new();
        for cmd in commands {
            registry.register(cmd);
        }
        let host: Rc<dyn Host> = Rc::new(StaticHost::new("tester"));
        let dispatcher = Dispatcher::new(registry, host, surface.handle());
        (dispatcher, SessionState::new(PathBuf::from("/")), surface)
    }

    fn echo() -> Box<dyn Command> {
        command("echo", |env, args| {
            env.context.emit(ContextEvent::Data(args.positional.join(" ")));
            env.context.close(None);
            Ok(CompletionPolicy::Channel)
        })
    }

    #[tokio::test]
    async fn test_echo_through_channel() {
        let (mut dispatcher, mut state, surface) = setup(vec![echo()]);

        let dispatch = dispatcher.dispatch(&mut state, "echo hello world");
        assert!(dispatch.outcome.await.is_ok());
        assert_eq!(surface.contents(), "hello world");
        assert_eq!(state.history(), ["echo hello world"]);
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let (mut dispatcher, mut state, _) = setup(vec![echo()]);

        let err = dispatcher.dispatch(&mut state, "foo bar").outcome.await.unwrap_err();
        match err {
            ShellError::CommandNotFound(input) => assert_eq!(input, "foo bar"),
            other => panic!("unexpected error: {:?}", other),
        }
        // History records intent, not success
        assert_eq!(state.history(), ["foo bar"]);
    }

    #[tokio::test]
    async fn test_plain_value_needs_no_close() {
        let (mut dispatcher, mut state, _) = setup(vec![command("noop", |_, _| Ok(CompletionPolicy::Immediate))]);
        assert!(dispatcher.dispatch(&mut state, "noop").outcome.await.is_ok());
    }

    #[tokio::test]
    async fn test_sync_failure() {
        let (mut dispatcher, mut state, _) = setup(vec![command("bad", |_, _| Err(CommandError::msg("nope")))]);

        let err = dispatcher.dispatch(&mut state, "bad").outcome.await.unwrap_err();
        assert!(matches!(err, ShellError::HandlerSyncFailure(_)));
        assert_eq!(err.to_string(), "nope");
    }

    #[tokio::test]
    async fn test_argument_errors_are_sync_failures() {
        let strict: Box<dyn Command> = Box::new(FnCommand {
            name: "strict",
            schema: ArgSchema::empty().option("count", Some('c')),
            run: |_: CommandEnv, _: ParsedOptions| -> Result<CompletionPolicy, CommandError> {
                Ok(CompletionPolicy::Immediate)
            },
        });
        let (mut dispatcher, mut state, _) = setup(vec![strict]);

        let err = dispatcher.dispatch(&mut state, "strict --count").outcome.await.unwrap_err();
        assert!(matches!(err, ShellError::HandlerSyncFailure(CommandError::InvalidArguments(_))));
    }

    #[tokio::test]
    async fn test_close_with_error() {
        let (mut dispatcher, mut state, _) = setup(vec![command("fail", |env, _| {
            env.context.close(Some(CommandError::other(std::io::Error::new(std::io::ErrorKind::Other, "x"))));
            Ok(CompletionPolicy::Channel)
        })]);

        let err = dispatcher.dispatch(&mut state, "fail").outcome.await.unwrap_err();
        assert!(matches!(err, ShellError::HandlerAsyncFailure(CommandError::Other(_))));
        assert_eq!(err.to_string(), "x");
    }

    #[tokio::test]
    async fn test_returned_future_wins_over_close() {
        let (mut dispatcher, mut state, _) = setup(vec![command("race", |env, _| {
            env.context.close(Some(CommandError::msg("ignored")));
            Ok(CompletionPolicy::pending(async { Ok(()) }))
        })]);

        assert!(dispatcher.dispatch(&mut state, "race").outcome.await.is_ok());
    }

    #[tokio::test]
    async fn test_pending_failure() {
        let (mut dispatcher, mut state, _) = setup(vec![command("later", |_, _| {
            Ok(CompletionPolicy::pending(async { Err(CommandError::msg("timed out")) }))
        })]);

        let err = dispatcher.dispatch(&mut state, "later").outcome.await.unwrap_err();
        assert!(matches!(err, ShellError::HandlerAsyncFailure(_)));
    }

    #[tokio::test]
    async fn test_forgotten_close_is_abandoned() {
        let (mut dispatcher, mut state, _) = setup(vec![command("forget", |_, _| Ok(CompletionPolicy::Channel))]);

        let err = dispatcher.dispatch(&mut state, "forget").outcome.await.unwrap_err();
        assert!(matches!(err, ShellError::HandlerAsyncFailure(CommandError::Abandoned)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_from_spawned_task() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let (mut dispatcher, mut state, surface) = setup(vec![command("tick", |env, _| {
                    let context = env.context;
                    tokio::task::spawn_local(async move {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        context.write("tock");
                        context.close(None);
                    });
                    Ok(CompletionPolicy::Channel)
                })]);

                let dispatch = dispatcher.dispatch(&mut state, "tick");
                assert_eq!(surface.contents(), "");
                assert!(dispatch.outcome.await.is_ok());
                assert_eq!(surface.contents(), "tock");
            })
            .await;
    }

    #[tokio::test]
    async fn test_each_dispatch_gets_its_own_context() {
        let seen = Rc::new(Cell::new(0u64));
        let seen_in_cmd = Rc::clone(&seen);
        let (mut dispatcher, mut state, _) = setup(vec![command("id", move |env, _| {
            assert!(env.context.id() > seen_in_cmd.get());
            seen_in_cmd.set(env.context.id());
            Ok(CompletionPolicy::Immediate)
        })]);

        for _ in 0..3 {
            assert!(dispatcher.dispatch(&mut state, "id").outcome.await.is_ok());
        }
        assert_eq!(seen.get(), 3);
    }

    #[tokio::test]
    async fn test_directory_change_reported() {
        let (mut dispatcher, mut state, _) = setup(vec![command("go", |env, args| {
            env.context.change_directory(&args.positional[0]);
            Ok(CompletionPolicy::Immediate)
        })]);

        let dispatch = dispatcher.dispatch(&mut state, "go /srv/www");
        assert_eq!(dispatch.directory_change(), Some(PathBuf::from("/srv/www")));
        // Applying the change is the session's job
        assert_eq!(state.working_directory(), std::path::Path::new("/"));
    }
}
