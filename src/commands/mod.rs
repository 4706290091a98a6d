//! Command handling module.
//!
//! Parses bot commands and inline-button presses and runs them against
//! the ledger and the cache.

mod handler;
mod types;

pub use handler::CommandHandler;
pub use types::{BotCommand, CallbackAction, CommandResult};
