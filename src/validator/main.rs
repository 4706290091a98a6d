//! Standalone setup checker for the agency bot.
//!
//! Runs the same checks as the bot's startup and prints a report, so a
//! fresh deployment can be verified without starting to poll. With
//! `--init-headers` it also writes header rows into empty tabs.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use agency_sheets_bot::cache::CacheStore;
use agency_sheets_bot::config::{SheetKind, Settings};
use agency_sheets_bot::sheets::{SheetsClient, rows};
use agency_sheets_bot::startup::{self, StartupError};
use agency_sheets_bot::telegram::BotApi;

/// Agency bot setup checker.
#[derive(Parser, Debug)]
#[command(name = "check_setup")]
#[command(about = "Checks configuration, credentials, bot token and spreadsheet access")]
#[command(version)]
struct Args {
    /// Path to the .env file for environment variables.
    #[arg(long, default_value = ".env")]
    env_file: String,

    /// Write header rows into tabs whose first row is empty.
    #[arg(long)]
    init_headers: bool,

    /// Show debug logs from the checks.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(level))
        .with_target(false)
        .init();

    match dotenvy::from_filename(&args.env_file) {
        Ok(_) => println!("✓ Loaded {}", args.env_file),
        Err(e) => println!("⚠ Could not load {} ({e}); using the process environment", args.env_file),
    }

    match check(args.init_headers).await {
        Ok(()) => {
            println!("\n✓ Setup looks good. Start the bot with: agency_bot");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ {e}");
            if let Some(hint) = remediation(&e) {
                eprintln!("  → {hint}");
            }
            ExitCode::FAILURE
        }
    }
}

async fn check(init_headers: bool) -> Result<(), StartupError> {
    let settings = Settings::from_env()?;
    println!("✓ Configuration");
    println!("  Admins:        {}", settings.admin_ids.len());
    println!("  Spreadsheet:   {}", settings.spreadsheet_id);
    println!("  Credentials:   {}", settings.credentials_file.display());
    println!("  Cache:         {}", settings.cache_db_path.display());
    println!("  Sync interval: {}s", settings.cache_sync_interval_secs);
    if settings.admin_ids.is_empty() {
        println!("  ⚠ ADMIN_IDS is empty: every user will be denied");
    }

    let key = startup::load_credentials(&settings.credentials_file)?;
    println!("✓ Credentials for {}", key.client_email);

    let bot = BotApi::new(&settings.bot_token).map_err(StartupError::Telegram)?;
    let me = startup::check_bot(&bot).await?;
    println!(
        "✓ Bot token accepted (@{})",
        me.username.as_deref().unwrap_or("unknown")
    );

    let sheets = SheetsClient::new(&settings.spreadsheet_id, key).map_err(StartupError::Credentials)?;
    let result = startup::check_spreadsheet(&sheets).await;

    if init_headers {
        write_headers(&sheets).await;
    }

    let info = result?;
    println!("✓ Spreadsheet '{}' with all {} tabs", info.title, SheetKind::ALL.len());

    let cache = CacheStore::open(&settings.cache_db_path).await?;
    match cache.last_sync().await {
        Ok(Some(sync)) => println!(
            "✓ Cache opened (last sync {}, {} rows)",
            sync.last_synced_at.format("%d.%m.%Y %H:%M"),
            sync.rows_synced
        ),
        _ => println!("✓ Cache opened (never synced)"),
    }
    cache.close().await;

    Ok(())
}

/// Writes headers into every existing tab with an empty first row.
async fn write_headers(sheets: &SheetsClient) {
    let present = match sheets.spreadsheet_info().await {
        Ok(info) => info.sheet_titles,
        Err(e) => {
            println!("⚠ Cannot write headers: {e}");
            return;
        }
    };

    for kind in SheetKind::ALL {
        if !present.iter().any(|t| t == kind.title()) {
            println!("  ⚠ {kind}: tab missing, create it by hand");
            continue;
        }
        match rows::init_headers(sheets, kind).await {
            Ok(true) => println!("  ✓ {kind}: header row written"),
            Ok(false) => println!("  · {kind}: header row already present"),
            Err(e) => println!("  ✗ {kind}: {e}"),
        }
    }
}

/// What to do about a failed check.
fn remediation(error: &StartupError) -> Option<&'static str> {
    match error {
        StartupError::Config(_) => Some("Set BOT_TOKEN, SPREADSHEET_ID and ADMIN_IDS in .env"),
        StartupError::Credentials(_) => {
            Some("Download the service-account key and place it at CREDENTIALS_FILE")
        }
        StartupError::InvalidToken => Some("Verify BOT_TOKEN with @BotFather"),
        StartupError::SheetAccess { .. } => {
            Some("Share the spreadsheet with the service-account email as editor")
        }
        StartupError::MissingSheets(_) => {
            Some("Create the missing tabs, then rerun with --init-headers")
        }
        StartupError::Telegram(_) | StartupError::Cache(_) => None,
    }
}
