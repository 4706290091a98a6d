//! Telegram Bot API module.
//!
//! Provides a thin HTTPS client for the Bot API (long polling, sending
//! messages, answering callback queries) with flood-wait aware pacing.

mod client;
#[cfg(test)]
pub(crate) mod fake_server;
mod rate_limiter;
pub mod types;

pub use client::{BotApi, MAX_MESSAGE_CHARS, POLL_TIMEOUT_SECS, TelegramError};
pub use rate_limiter::RateLimiter;
pub use types::{
    BotCommandInfo, CallbackQuery, InlineKeyboardButton, InlineKeyboardMarkup, Message, Update,
    User,
};
