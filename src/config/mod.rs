//! Configuration module for the agency bot.
//!
//! Handles loading settings from the environment and describes the
//! fixed layout of the bookkeeping spreadsheet.

pub mod layout;
mod settings;

pub use layout::{SheetKind, SheetLayout};
pub use settings::{AdminIds, ConfigError, Settings};
