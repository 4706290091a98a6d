//! Bot API object types used by the bot.
//!
//! Only the fields the bot reads are modelled; unknown fields are ignored.

use serde::{Deserialize, Serialize};

/// Envelope of every Bot API response.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
    pub error_code: Option<u16>,
    pub parameters: Option<ResponseParameters>,
}

/// Extra information attached to failed requests.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseParameters {
    pub retry_after: Option<u32>,
}

/// A Telegram user or bot.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub first_name: String,
    pub username: Option<String>,
}

/// A chat.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Chat {
    pub id: i64,
}

/// An incoming message.
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub from: Option<User>,
    pub chat: Chat,
    pub text: Option<String>,
}

/// A press on an inline keyboard button.
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    pub message: Option<Message>,
    pub data: Option<String>,
}

/// An update from `getUpdates`.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

impl Update {
    /// ID of the user who caused the update, if any.
    #[must_use]
    pub fn sender_id(&self) -> Option<i64> {
        if let Some(message) = &self.message {
            return message.from.as_ref().map(|u| u.id);
        }
        self.callback_query.as_ref().map(|q| q.from.id)
    }
}

/// A button of an inline keyboard.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct InlineKeyboardButton {
    pub text: String,
    pub callback_data: String,
}

impl InlineKeyboardButton {
    /// Creates a callback button.
    #[must_use]
    pub fn callback(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: data.into(),
        }
    }
}

/// Inline keyboard attached to a message.
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Default)]
pub struct InlineKeyboardMarkup {
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

impl InlineKeyboardMarkup {
    /// Adds a row of buttons.
    #[must_use]
    pub fn row(mut self, buttons: Vec<InlineKeyboardButton>) -> Self {
        self.inline_keyboard.push(buttons);
        self
    }
}

/// Entry of the command menu shown by Telegram clients.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BotCommandInfo {
    pub command: String,
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_message_update() {
        let json = r#"{
            "update_id": 10,
            "message": {
                "message_id": 5,
                "from": {"id": 906038550, "is_bot": false, "first_name": "Ann", "username": "ann"},
                "chat": {"id": 906038550, "type": "private"},
                "date": 1700000000,
                "text": "/start"
            }
        }"#;
        let update: Update = serde_json::from_str(json).unwrap();
        assert_eq!(update.update_id, 10);
        assert_eq!(update.sender_id(), Some(906_038_550));
        assert_eq!(update.message.unwrap().text.as_deref(), Some("/start"));
    }

    #[test]
    fn test_deserialize_callback_update() {
        let json = r#"{
            "update_id": 11,
            "callback_query": {
                "id": "abc",
                "from": {"id": 42, "is_bot": false, "first_name": "Bob"},
                "chat_instance": "x",
                "data": "list:white:Acme"
            }
        }"#;
        let update: Update = serde_json::from_str(json).unwrap();
        assert_eq!(update.sender_id(), Some(42));
        assert_eq!(
            update.callback_query.unwrap().data.as_deref(),
            Some("list:white:Acme")
        );
    }

    #[test]
    fn test_deserialize_error_envelope() {
        let json = r#"{"ok": false, "error_code": 429, "description": "Too Many Requests: retry after 7", "parameters": {"retry_after": 7}}"#;
        let resp: ApiResponse<User> = serde_json::from_str(json).unwrap();
        assert!(!resp.ok);
        assert_eq!(resp.error_code, Some(429));
        assert_eq!(resp.parameters.and_then(|p| p.retry_after), Some(7));
    }

    #[test]
    fn test_keyboard_serialization() {
        let markup = InlineKeyboardMarkup::default()
            .row(vec![InlineKeyboardButton::callback("A", "a")]);
        let json = serde_json::to_value(&markup).unwrap();
        assert_eq!(json["inline_keyboard"][0][0]["callback_data"], "a");
    }
}
