//! Access control for incoming updates.
//!
//! Only users listed in `ADMIN_IDS` may interact with the bot.

mod gate;

pub use gate::{AccessDenied, AccessGate};
