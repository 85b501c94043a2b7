//! Error types for command dispatch
//!
//! [`CommandError`] is what a command handler fails with; [`ShellError`] is
//! what a dispatch fails with. Neither is ever fatal to the shell: the
//! session loop renders them and goes back to the prompt.

use std::io;

use serde::ser::{Error as _, SerializeStruct};
use serde::{Serialize, Serializer};
use thiserror::Error;
use tracing::debug;

/// Failure reported by a command handler
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("{0}")]
    Failed(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Command finished without signalling completion")]
    Abandoned,

    /// Any foreign error type; has no structured form
    #[error("{0}")]
    Other(Box<dyn std::error::Error + 'static>),
}

impl CommandError {
    #[allow(dead_code)]
    pub fn msg(message: impl Into<String>) -> Self {
        CommandError::Failed(message.into())
    }

    #[allow(dead_code)]
    pub fn other<E: std::error::Error + 'static>(err: E) -> Self {
        CommandError::Other(Box::new(err))
    }

    fn kind(&self) -> &'static str {
        match self {
            CommandError::Failed(_) => "failed",
            CommandError::InvalidArguments(_) => "invalid_arguments",
            CommandError::Io(_) => "io",
            CommandError::Abandoned => "abandoned",
            CommandError::Other(_) => "other",
        }
    }
}

impl Serialize for CommandError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if let CommandError::Other(_) = self {
            return Err(S::Error::custom("opaque error has no structured form"));
        }

        let mut state = serializer.serialize_struct("CommandError", 2)?;
        state.serialize_field("kind", self.kind())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Failure of one dispatch
#[derive(Error, Debug)]
pub enum ShellError {
    /// Leading token names no registered command; carries the whole input line
    #[error("Command not found: {0}")]
    CommandNotFound(String),

    /// The handler failed before returning
    #[error("{0}")]
    HandlerSyncFailure(#[source] CommandError),

    /// The handler's pending outcome or completion channel reported failure
    #[error("{0}")]
    HandlerAsyncFailure(#[source] CommandError),
}

impl ShellError {
    pub fn kind(&self) -> &'static str {
        match self {
            ShellError::CommandNotFound(_) => "CommandNotFound",
            ShellError::HandlerSyncFailure(_) => "HandlerSyncFailure",
            ShellError::HandlerAsyncFailure(_) => "HandlerAsyncFailure",
        }
    }
}

impl Serialize for ShellError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ShellError", 2)?;
        state.serialize_field("error", self.kind())?;
        match self {
            ShellError::CommandNotFound(input) => state.serialize_field("input", input)?,
            ShellError::HandlerSyncFailure(cause) | ShellError::HandlerAsyncFailure(cause) => {
                state.serialize_field("cause", cause)?
            }
        }
        state.end()
    }
}

/// Render an error for the terminal: JSON when the error has a structured
/// form, its display text otherwise.
pub fn render_error(err: &ShellError) -> String {
    match serde_json::to_string(err) {
        Ok(json) => json,
        Err(e) => {
            debug!("Structured rendering failed ({}), using plain text", e);
            err.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_renders_structured() {
        let err = ShellError::CommandNotFound("foo bar".to_string());
        let rendered = render_error(&err);

        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value["error"], "CommandNotFound");
        assert_eq!(value["input"], "foo bar");
    }

    #[test]
    fn test_handler_failure_renders_cause() {
        let err = ShellError::HandlerAsyncFailure(CommandError::msg("disk full"));
        let value: serde_json::Value = serde_json::from_str(&render_error(&err)).unwrap();

        assert_eq!(value["error"], "HandlerAsyncFailure");
        assert_eq!(value["cause"]["kind"], "failed");
        assert_eq!(value["cause"]["message"], "disk full");
    }

    #[test]
    fn test_opaque_error_falls_back_to_text() {
        let cause = CommandError::other(io::Error::new(io::ErrorKind::Other, "x"));
        let err = ShellError::HandlerAsyncFailure(cause);

        assert!(serde_json::to_string(&err).is_err());
        assert_eq!(render_error(&err), "x");
    }

    #[test]
    fn test_display() {
        let err = ShellError::CommandNotFound("foo bar".to_string());
        assert_eq!(err.to_string(), "Command not found: foo bar");

        let err = ShellError::HandlerSyncFailure(CommandError::InvalidArguments("--n".to_string()));
        assert_eq!(err.to_string(), "Invalid arguments: --n");
        assert_eq!(err.kind(), "HandlerSyncFailure");
    }
}
