//! Ordered startup checks.
//!
//! Each check is fatal and maps to a distinct [`StartupError`]:
//! 1. configuration,
//! 2. service-account credentials,
//! 3. bot token (`getMe`),
//! 4. spreadsheet access and tabs,
//! 5. the cache database.

use std::path::Path;

use thiserror::Error;
use tracing::info;

use crate::cache::{CacheError, CacheStore};
use crate::config::{ConfigError, SheetKind, Settings};
use crate::sheets::{ServiceAccountKey, SheetsClient, SheetsError, SpreadsheetInfo};
use crate::telegram::{BotApi, TelegramError, User};

/// Why the bot refused to start.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Credentials(SheetsError),

    #[error("Invalid token")]
    InvalidToken,

    #[error("Telegram is unreachable: {0}")]
    Telegram(TelegramError),

    #[error("{error} (share the spreadsheet with {email} as editor)")]
    SheetAccess { error: SheetsError, email: String },

    #[error("Spreadsheet is missing tabs: {}", format_sheets(.0))]
    MissingSheets(Vec<SheetKind>),

    #[error("{0}")]
    Cache(#[from] CacheError),
}

fn format_sheets(sheets: &[SheetKind]) -> String {
    sheets
        .iter()
        .map(|s| s.title())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Everything the checks produced, ready to wire the bot together.
#[derive(Debug)]
pub struct Startup {
    pub settings: Settings,
    pub bot: BotApi,
    pub me: User,
    pub sheets: SheetsClient,
    pub spreadsheet: SpreadsheetInfo,
    pub cache: CacheStore,
}

/// Loads the service-account key from the configured path.
///
/// # Errors
///
/// Returns `StartupError::Credentials` if the file is absent or invalid.
pub fn load_credentials(path: &Path) -> Result<ServiceAccountKey, StartupError> {
    let key = ServiceAccountKey::load(path).map_err(StartupError::Credentials)?;
    info!("Loaded credentials for {}", key.client_email);
    Ok(key)
}

/// Verifies the bot token.
///
/// # Errors
///
/// Returns `StartupError::InvalidToken` if Telegram rejects the token.
pub async fn check_bot(bot: &BotApi) -> Result<User, StartupError> {
    bot.get_me().await.map_err(|e| match e {
        TelegramError::InvalidToken => StartupError::InvalidToken,
        other => StartupError::Telegram(other),
    })
}

/// Verifies spreadsheet access and that every tab exists.
///
/// # Errors
///
/// Returns `SheetAccess` if the metadata cannot be read and
/// `MissingSheets` if tabs of the layout are absent.
pub async fn check_spreadsheet(sheets: &SheetsClient) -> Result<SpreadsheetInfo, StartupError> {
    let info = sheets
        .spreadsheet_info()
        .await
        .map_err(|error| StartupError::SheetAccess {
            error,
            email: sheets.service_account_email().to_owned(),
        })?;

    let missing = info.missing_sheets();
    if !missing.is_empty() {
        return Err(StartupError::MissingSheets(missing));
    }
    Ok(info)
}

/// Runs every check in order, stopping at the first failure.
///
/// # Errors
///
/// Returns the first failed check.
pub async fn run_checks(settings: Settings) -> Result<Startup, StartupError> {
    let key = load_credentials(&settings.credentials_file)?;

    let bot = BotApi::new(&settings.bot_token).map_err(StartupError::Telegram)?;
    let me = check_bot(&bot).await?;

    let sheets = SheetsClient::new(&settings.spreadsheet_id, key).map_err(StartupError::Credentials)?;
    let spreadsheet = check_spreadsheet(&sheets).await?;

    let cache = CacheStore::open(&settings.cache_db_path).await?;
    info!("All startup checks passed");

    Ok(Startup {
        settings,
        bot,
        me,
        sheets,
        spreadsheet,
        cache,
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::telegram::fake_server::{FakeBotServer, ok_responder, unauthorized_responder};

    fn settings(credentials: &str) -> Settings {
        Settings::from_lookup(|key| match key {
            "BOT_TOKEN" => Some("123:abc".to_owned()),
            "SPREADSHEET_ID" => Some("sheet-id".to_owned()),
            "ADMIN_IDS" => Some("906038550".to_owned()),
            "CREDENTIALS_FILE" => Some(credentials.to_owned()),
            _ => None,
        })
        .unwrap()
    }

    #[test]
    fn test_missing_credentials_file() {
        let path = PathBuf::from("definitely/not/here/credentials.json");
        let err = load_credentials(&path).unwrap_err();
        assert!(matches!(
            err,
            StartupError::Credentials(SheetsError::CredentialsNotFound(_))
        ));
        assert_eq!(err.to_string(), "definitely/not/here/credentials.json not found");
    }

    #[tokio::test]
    async fn test_run_checks_stops_at_credentials() {
        // No network is touched: the credentials check comes first.
        let err = run_checks(settings("missing/credentials.json")).await.unwrap_err();
        assert!(matches!(err, StartupError::Credentials(_)));
    }

    #[tokio::test]
    async fn test_rejected_token() {
        let server = FakeBotServer::start(unauthorized_responder).await;
        let bot = BotApi::with_base(&server.base, "bad").unwrap();

        let err = check_bot(&bot).await.unwrap_err();
        assert!(matches!(err, StartupError::InvalidToken));
        assert_eq!(err.to_string(), "Invalid token");
    }

    #[tokio::test]
    async fn test_accepted_token() {
        let server = FakeBotServer::start(ok_responder).await;
        let bot = BotApi::with_base(&server.base, "good").unwrap();

        let me = check_bot(&bot).await.unwrap();
        assert_eq!(me.username.as_deref(), Some("agency_bot"));
    }

    #[test]
    fn test_missing_sheets_message() {
        let err = StartupError::MissingSheets(vec![SheetKind::Whitelist, SheetKind::Blacklist]);
        assert_eq!(
            err.to_string(),
            "Spreadsheet is missing tabs: WHITELIST, BLACKLIST"
        );
    }
}
