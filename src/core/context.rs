//! Execution contexts
//!
//! Every submitted line gets a fresh [`ExecutionContext`]. A command writes
//! through it and, when it completes through the context rather than by its
//! return value, signals the outcome with [`ExecutionContext::close`].
//! Completion is a one-shot: the first signal wins and later ones are
//! dropped.

use std::cell::RefCell;
use std::path::{Component, Path, PathBuf};
use std::rc::Rc;

use tokio::sync::oneshot;
use tracing::debug;

use super::error::CommandError;
use crate::ui::TerminalHandle;

type CompletionSender = oneshot::Sender<Result<(), CommandError>>;

/// Events a command can emit on its context
#[derive(Debug)]
pub enum ContextEvent {
    /// Output text, forwarded to the bound data sink
    Data(String),
    /// Successful completion
    Close,
    /// Failed completion
    Error(CommandError),
}

/// Side effects requested by a command, applied by the session on success
#[derive(Debug, Default)]
pub struct ContextEffects {
    pub directory: Option<PathBuf>,
}

pub type EffectSlot = Rc<RefCell<ContextEffects>>;

struct ContextInner {
    id: u64,
    input: String,
    cwd: PathBuf,
    terminal: TerminalHandle,
    data_sink: RefCell<Option<Box<dyn Fn(&str)>>>,
    completion: RefCell<Option<CompletionSender>>,
    effects: EffectSlot,
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        if self.completion.get_mut().is_some() {
            debug!("Context {} dropped without signalling completion", self.id);
        }
    }
}

/// Handle given to a command for one dispatch.
///
/// Cloning is cheap and every clone refers to the same context. A context
/// is never reused: the next line gets a new one.
#[derive(Clone)]
pub struct ExecutionContext {
    inner: Rc<ContextInner>,
}

impl ExecutionContext {
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// The submitted line this context was created for
    pub fn input(&self) -> &str {
        &self.inner.input
    }

    /// Working directory at the time the line was submitted
    pub fn cwd(&self) -> &Path {
        &self.inner.cwd
    }

    /// Bind the sink receiving [`ContextEvent::Data`]; replaces any earlier sink
    pub fn on_data(&self, sink: impl Fn(&str) + 'static) {
        *self.inner.data_sink.borrow_mut() = Some(Box::new(sink));
    }

    pub fn emit(&self, event: ContextEvent) {
        match event {
            ContextEvent::Data(text) => match self.inner.data_sink.borrow().as_ref() {
                Some(sink) => sink(&text),
                None => debug!("Context {} has no data sink; dropping output", self.inner.id),
            },
            ContextEvent::Close => self.signal(Ok(())),
            ContextEvent::Error(err) => self.signal(Err(err)),
        }
    }

    /// Signal completion: `None` for success, `Some(err)` for failure
    pub fn close(&self, err: Option<CommandError>) {
        match err {
            None => self.emit(ContextEvent::Close),
            Some(err) => self.emit(ContextEvent::Error(err)),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.completion.borrow().is_none()
    }

    pub fn write(&self, text: &str) {
        self.inner.terminal.write(text);
    }

    pub fn write_line(&self, text: &str) {
        self.inner.terminal.write_line(text);
    }

    pub fn clear(&self) {
        self.inner.terminal.clear();
    }

    /// Request a working-directory change, resolved against [`Self::cwd`].
    /// Takes effect only if the dispatch succeeds.
    pub fn change_directory(&self, target: &str) {
        let resolved = resolve_path(&self.inner.cwd, target);
        debug!("Context {} requests directory {}", self.inner.id, resolved.display());
        self.inner.effects.borrow_mut().directory = Some(resolved);
    }

    pub(crate) fn effects(&self) -> EffectSlot {
        Rc::clone(&self.inner.effects)
    }

    fn signal(&self, result: Result<(), CommandError>) {
        let sender = self.inner.completion.borrow_mut().take();
        match sender {
            Some(tx) => {
                if tx.send(result).is_err() {
                    debug!("Context {} completed after its dispatch settled; ignoring", self.inner.id);
                }
            }
            None => debug!("Context {} already completed; ignoring signal", self.inner.id),
        }
    }
}

/// Receiving half of a context's completion channel
pub struct CompletionReceiver {
    rx: oneshot::Receiver<Result<(), CommandError>>,
}

impl CompletionReceiver {
    /// Wait for the context to complete. Fails with
    /// [`CommandError::Abandoned`] once every clone of the context is gone
    /// without a signal.
    pub async fn wait(self) -> Result<(), CommandError> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(CommandError::Abandoned),
        }
    }
}

/// Creates one context per submitted line
pub struct ContextFactory {
    terminal: TerminalHandle,
    next_id: u64,
}

impl ContextFactory {
    pub fn new(terminal: TerminalHandle) -> Self {
        Self { terminal, next_id: 1 }
    }

    /// Create a context for `input`, snapshotting `cwd`
    pub fn create(&mut self, input: &str, cwd: &Path) -> (ExecutionContext, CompletionReceiver) {
        let id = self.next_id;
        self.next_id += 1;

        let (tx, rx) = oneshot::channel();
        let inner = ContextInner {
            id,
            input: input.to_string(),
            cwd: cwd.to_path_buf(),
            terminal: self.terminal.clone(),
            data_sink: RefCell::new(None),
            completion: RefCell::new(Some(tx)),
            effects: EffectSlot::default(),
        };
        (ExecutionContext { inner: Rc::new(inner) }, CompletionReceiver { rx })
    }
}

/// Resolve `target` against `base` lexically. The result is always absolute
/// and never climbs above `/`.
pub fn resolve_path(base: &Path, target: &str) -> PathBuf {
    let mut parts: Vec<String> = if target.starts_with('/') {
        Vec::new()
    } else {
        base.components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect()
    };

    for part in target.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other.to_string()),
        }
    }

    PathBuf::from(format!("/{}", parts.join("/")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::terminal::MemorySurface;

    fn factory() -> (ContextFactory, MemorySurface) {
        let surface = MemorySurface::new();
        (ContextFactory::new(surface.handle()), surface)
    }

    #[tokio::test]
    async fn test_close_completes() {
        let (mut factory, _) = factory();
        let (ctx, completion) = factory.create("echo", Path::new("/"));

        ctx.close(None);
        assert!(ctx.is_closed());
        assert!(completion.wait().await.is_ok());
    }

    #[tokio::test]
    async fn test_close_with_error_fails() {
        let (mut factory, _) = factory();
        let (ctx, completion) = factory.create("boom", Path::new("/"));

        ctx.close(Some(CommandError::msg("x")));
        let err = completion.wait().await.unwrap_err();
        assert_eq!(err.to_string(), "x");
    }

    #[tokio::test]
    async fn test_first_signal_wins() {
        let (mut factory, _) = factory();
        let (ctx, completion) = factory.create("twice", Path::new("/"));

        ctx.close(None);
        ctx.emit(ContextEvent::Error(CommandError::msg("late")));
        assert!(completion.wait().await.is_ok());
    }

    #[tokio::test]
    async fn test_dropped_context_is_abandoned() {
        let (mut factory, _) = factory();
        let (ctx, completion) = factory.create("forgetful", Path::new("/"));

        drop(ctx);
        assert!(matches!(completion.wait().await, Err(CommandError::Abandoned)));
    }

    #[tokio::test]
    async fn test_contexts_are_isolated() {
        let (mut factory, _) = factory();
        let (first, first_done) = factory.create("one", Path::new("/"));
        let (second, second_done) = factory.create("two", Path::new("/"));
        assert_ne!(first.id(), second.id());

        second.close(Some(CommandError::msg("second failed")));
        first.close(None);

        assert!(first_done.wait().await.is_ok());
        assert!(second_done.wait().await.is_err());
    }

    #[test]
    fn test_data_and_passthrough() {
        let (mut factory, surface) = factory();
        let (ctx, _completion) = factory.create("echo hi", Path::new("/home"));

        // No sink bound yet: data is dropped
        ctx.emit(ContextEvent::Data("lost".to_string()));
        assert_eq!(surface.contents(), "");

        let sink = surface.handle();
        ctx.on_data(move |text| sink.write(text));
        ctx.emit(ContextEvent::Data("hi".to_string()));
        ctx.write_line("!");
        assert_eq!(surface.contents(), "hi!\n");

        assert_eq!(ctx.input(), "echo hi");
        assert_eq!(ctx.cwd(), Path::new("/home"));
    }

    #[test]
    fn test_change_directory_effect() {
        let (mut factory, _) = factory();
        let (ctx, _completion) = factory.create("cd ../tmp", Path::new("/home/user"));

        ctx.change_directory("../tmp");
        assert_eq!(ctx.effects().borrow().directory, Some(PathBuf::from("/home/tmp")));
        // The snapshot itself never moves
        assert_eq!(ctx.cwd(), Path::new("/home/user"));
    }

    #[test]
    fn test_resolve_path() {
        assert_eq!(resolve_path(Path::new("/a/b"), "c"), PathBuf::from("/a/b/c"));
        assert_eq!(resolve_path(Path::new("/a/b"), "/x/./y"), PathBuf::from("/x/y"));
        assert_eq!(resolve_path(Path::new("/a"), "../../.."), PathBuf::from("/"));
        assert_eq!(resolve_path(Path::new("/"), ""), PathBuf::from("/"));
    }
}
