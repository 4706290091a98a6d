//! Local `SQLite` cache of the spreadsheet directory and its refresh task.

mod status;
mod store;
mod syncer;

use std::path::PathBuf;

use thiserror::Error;

use crate::sheets::SheetsError;

pub use status::SyncStatus;
pub use store::{CacheStore, SyncInfo};
pub use syncer::{CacheSyncer, SyncMessage};

/// Errors of the cache layer.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cannot create cache directory {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot read spreadsheet: {0}")]
    Sheets(#[from] SheetsError),
}
