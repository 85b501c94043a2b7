//! Core shell components.
//!
//! - **buffer**: line buffer and key interpreter
//! - **context**: per-line execution contexts and their completion channel
//! - **args**: argument parsing for command words
//! - **dispatch**: command trait, registry and dispatcher
//! - **error**: dispatch error taxonomy and rendering
//! - **session**: session state and the prompt/dispatch loop
//!
//! # Data flow
//!
//! ```text
//! key ─▶ LineBuffer ─(line)─▶ Dispatcher ─▶ ExecutionContext ─▶ terminal
//!                                  │
//!                                  └─(outcome)─▶ Shell ─▶ next prompt
//! ```

pub mod args;
pub mod buffer;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod session;
