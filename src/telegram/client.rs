//! Telegram Bot API client over HTTPS.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::RateLimiter;
use super::types::{ApiResponse, BotCommandInfo, InlineKeyboardMarkup, Update, User};

const API_BASE: &str = "https://api.telegram.org";

/// Long-polling timeout passed to `getUpdates`.
pub const POLL_TIMEOUT_SECS: u64 = 30;

/// Minimum spacing between outgoing messages.
const SEND_INTERVAL_MS: u64 = 40;

/// Telegram rejects messages longer than this many characters.
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// Errors that can occur during Bot API calls.
#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("Invalid token")]
    InvalidToken,

    #[error("Flood wait required: {0} seconds")]
    FloodWait(u32),

    #[error("Bot API error {code}: {description}")]
    Api { code: u16, description: String },

    #[error("Connection error: {0}")]
    Connection(#[from] reqwest::Error),

    #[error("Unexpected response from {method}: {reason}")]
    Unexpected { method: &'static str, reason: String },
}

/// High-level Bot API client.
pub struct BotApi {
    /// HTTP client used for all calls.
    http: reqwest::Client,

    /// `https://api.telegram.org/bot<token>`.
    base_url: String,

    /// Pacing for outgoing messages.
    rate_limiter: RateLimiter,
}

impl BotApi {
    /// Creates a client for the given bot token.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(token: &str) -> Result<Self, TelegramError> {
        Self::with_base(API_BASE, token)
    }

    /// Creates a client against a custom API server.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_base(api_base: &str, token: &str) -> Result<Self, TelegramError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 15))
            .build()?;

        Ok(Self {
            http,
            base_url: format!("{}/bot{}", api_base.trim_end_matches('/'), token),
            rate_limiter: RateLimiter::from_millis(SEND_INTERVAL_MS),
        })
    }

    /// Calls a Bot API method with a JSON body.
    async fn call<T, B>(&self, method: &'static str, body: &B) -> Result<T, TelegramError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = format!("{}/{}", self.base_url, method);
        let response = self.http.post(&url).json(body).send().await?;
        let status = response.status();

        let envelope: ApiResponse<T> = response.json().await.map_err(|e| {
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::NOT_FOUND {
                return TelegramError::InvalidToken;
            }
            TelegramError::Unexpected {
                method,
                reason: e.to_string(),
            }
        })?;

        if envelope.ok {
            return envelope.result.ok_or_else(|| TelegramError::Unexpected {
                method,
                reason: "missing result".to_owned(),
            });
        }

        Err(classify_error(status, &envelope))
    }

    /// Verifies the token and returns the bot's own user.
    ///
    /// # Errors
    ///
    /// Returns `TelegramError::InvalidToken` if Telegram rejects the token.
    pub async fn get_me(&self) -> Result<User, TelegramError> {
        let me: User = self.call("getMe", &json!({})).await?;
        info!(
            "Authorized as @{} (id {})",
            me.username.as_deref().unwrap_or("unknown"),
            me.id
        );
        Ok(me)
    }

    /// Long-polls for updates newer than `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Update>, TelegramError> {
        let body = json!({
            "offset": offset,
            "timeout": POLL_TIMEOUT_SECS,
            "allowed_updates": ["message", "callback_query"],
        });
        self.call("getUpdates", &body).await
    }

    /// Sends a plain-text message, splitting it if it is too long.
    ///
    /// # Errors
    ///
    /// Returns an error if sending fails.
    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboardMarkup>,
    ) -> Result<(), TelegramError> {
        let chunks = split_message(text, MAX_MESSAGE_CHARS);
        let last = chunks.len().saturating_sub(1);

        for (i, chunk) in chunks.iter().enumerate() {
            let mut body = json!({ "chat_id": chat_id, "text": chunk });
            if i == last
                && let Some(markup) = keyboard
            {
                body["reply_markup"] = serde_json::to_value(markup).map_err(|e| {
                    TelegramError::Unexpected {
                        method: "sendMessage",
                        reason: e.to_string(),
                    }
                })?;
            }
            self.send_paced::<serde_json::Value>("sendMessage", &body).await?;
        }

        debug!("Sent {} message part(s) to chat {}", chunks.len(), chat_id);
        Ok(())
    }

    /// Answers a callback query, optionally with a popup alert.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn answer_callback_query(
        &self,
        callback_id: &str,
        text: Option<&str>,
        show_alert: bool,
    ) -> Result<(), TelegramError> {
        let body = json!({
            "callback_query_id": callback_id,
            "text": text,
            "show_alert": show_alert,
        });
        let _: bool = self.call("answerCallbackQuery", &body).await?;
        Ok(())
    }

    /// Publishes the command menu.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn set_my_commands(&self, commands: &[BotCommandInfo]) -> Result<(), TelegramError> {
        let _: bool = self
            .call("setMyCommands", &json!({ "commands": commands }))
            .await?;
        info!("Published {} bot commands", commands.len());
        Ok(())
    }

    /// Sends through the rate limiter, retrying once after a flood wait.
    async fn send_paced<T: DeserializeOwned>(
        &self,
        method: &'static str,
        body: &serde_json::Value,
    ) -> Result<T, TelegramError> {
        self.rate_limiter.wait_and_acquire().await;

        match self.call(method, body).await {
            Err(TelegramError::FloodWait(seconds)) => {
                warn!("Flood wait triggered on {}: {} seconds", method, seconds);
                self.rate_limiter.handle_flood_wait(seconds).await;
                self.rate_limiter.wait_and_acquire().await;
                self.call(method, body).await
            }
            other => other,
        }
    }
}

impl std::fmt::Debug for BotApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotApi")
            .field("rate_limiter", &self.rate_limiter)
            .finish_non_exhaustive()
    }
}

/// Maps a failed envelope to a typed error.
fn classify_error<T>(status: StatusCode, envelope: &ApiResponse<T>) -> TelegramError {
    let code = envelope.error_code.unwrap_or(status.as_u16());
    let description = envelope
        .description
        .clone()
        .unwrap_or_else(|| status.to_string());

    match code {
        401 | 404 => TelegramError::InvalidToken,
        429 => {
            let seconds = envelope
                .parameters
                .as_ref()
                .and_then(|p| p.retry_after)
                .or_else(|| extract_retry_after(&description))
                .unwrap_or(1);
            TelegramError::FloodWait(seconds)
        }
        _ => TelegramError::Api { code, description },
    }
}

/// Extracts the wait from "Too Many Requests: retry after N".
fn extract_retry_after(description: &str) -> Option<u32> {
    let idx = description.to_lowercase().find("retry after ")?;
    description[idx + "retry after ".len()..]
        .chars()
        .take_while(char::is_ascii_digit)
        .collect::<String>()
        .parse()
        .ok()
}

/// Splits text into chunks of at most `max_chars`, preferring line breaks.
fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    if text.chars().count() <= max_chars {
        return vec![text.to_owned()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();

        if current_len + line_len > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if line_len > max_chars {
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(max_chars) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }

        current.push_str(line);
        current_len += line_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
