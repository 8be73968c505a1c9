//! Error taxonomy shared across the workspace.
//!
//! None of these are fatal at runtime: validation and not-found errors are
//! surfaced back to the invoking chat, store and transport errors are logged
//! and recovered locally. The only process-fatal condition is a missing bot
//! token at startup, which the binary reports through `anyhow` before any of
//! this machinery is running.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RoozError>;

#[derive(Debug, Error)]
pub enum RoozError {
    /// Malformed user input: date strings, time strings, identifiers.
    #[error("invalid input: {0}")]
    Validation(String),

    /// A referenced recipient, admin, or leave record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The key-value store failed to read or write a record.
    #[error("store error: {0}")]
    Store(String),

    /// An outbound send failed (e.g. the recipient blocked the bot).
    #[error("transport error: {0}")]
    Transport(String),

    /// Startup configuration problem.
    #[error("config error: {0}")]
    Config(String),
}
