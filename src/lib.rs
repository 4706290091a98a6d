//! Agency Sheets Bot Library
//!
//! A Telegram bot for design agency bookkeeping backed by Google Sheets.
//!
//! This crate provides the core functionality for:
//! - Loading settings and the fixed spreadsheet layout
//! - Restricting the bot to an allow-list of Telegram users
//! - Recording orders, payments and expenses as rollback-safe transactions
//! - Caching the client and designer directory in `SQLite`
//! - Handling user commands via chat messages and inline buttons

pub mod access;
pub mod cache;
pub mod commands;
pub mod config;
pub mod dispatcher;
pub mod sheets;
pub mod startup;
pub mod telegram;
