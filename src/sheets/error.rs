//! Errors raised by the spreadsheet layer.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::SheetKind;

/// Errors that can occur while talking to Google Sheets.
#[derive(Debug, Error)]
pub enum SheetsError {
    #[error("{} not found", .0.display())]
    CredentialsNotFound(PathBuf),

    #[error("Invalid service-account credentials: {0}")]
    InvalidCredentials(String),

    #[error("Failed to sign service-account assertion: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("OAuth token exchange failed: {0}")]
    TokenExchange(String),

    #[error("The caller does not have permission")]
    PermissionDenied,

    #[error("Spreadsheet not found: {0}")]
    SpreadsheetNotFound(String),

    #[error("Sheets API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid request URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Client '{0}' has no outstanding debt")]
    NoOutstandingDebt(String),

    #[error("Write to {sheet} failed: {reason}")]
    WriteFailed { sheet: SheetKind, reason: String },
}
