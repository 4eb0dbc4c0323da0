//! Subcommand implementations.

pub mod cart;
pub mod simulate;

use giftshop_sync::{CartError, SessionError};
use thiserror::Error;

/// Errors that end a command with exit code 1.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("cart error: {0}")]
    Cart(#[from] CartError),

    /// A scripted step did not settle in time.
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
}
