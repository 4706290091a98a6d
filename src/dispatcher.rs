//! Long-polling loop that routes updates through the access gate to the
//! command handler.
//!
//! Updates are processed one at a time, so replies keep the order of the
//! incoming messages.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::access::AccessGate;
use crate::cache::SyncMessage;
use crate::commands::{BotCommand, CommandHandler, CommandResult};
use crate::sheets::ValuesApi;
use crate::telegram::{BotApi, BotCommandInfo, CallbackQuery, Message, TelegramError, Update};

/// Reply sent to users outside the allow-list.
pub const ACCESS_DENIED_REPLY: &str = "⛔ Access denied";

const UNKNOWN_COMMAND_REPLY: &str = "❓ Unknown command or wrong arguments. Send /help for the list.";

/// Pause after a failed `getUpdates` call.
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Routes Telegram updates to the command handler.
pub struct Dispatcher<A: ValuesApi> {
    bot: Arc<BotApi>,
    gate: AccessGate,
    handler: Arc<CommandHandler<A>>,
    sync_tx: mpsc::Sender<SyncMessage>,
}

impl<A: ValuesApi> Dispatcher<A> {
    #[must_use]
    pub fn new(
        bot: Arc<BotApi>,
        gate: AccessGate,
        handler: Arc<CommandHandler<A>>,
        sync_tx: mpsc::Sender<SyncMessage>,
    ) -> Self {
        Self {
            bot,
            gate,
            handler,
            sync_tx,
        }
    }

    /// Publishes the command menu. Failure is logged, not fatal.
    pub async fn publish_commands(&self) {
        let commands: Vec<BotCommandInfo> = BotCommand::all_commands()
            .into_iter()
            .map(|(command, _, description)| BotCommandInfo {
                command: command.to_owned(),
                description: description.to_owned(),
            })
            .collect();

        if let Err(e) = self.bot.set_my_commands(&commands).await {
            warn!("Failed to publish bot commands: {}", e);
        }
    }

    /// Polls for updates until `shutdown` flips to true.
    ///
    /// # Errors
    ///
    /// Returns `TelegramError::InvalidToken` if the token is revoked while
    /// running; other polling errors are logged and retried.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), TelegramError> {
        info!("Dispatcher started, polling for updates");
        let mut offset: Option<i64> = None;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let updates = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                result = self.bot.get_updates(offset) => result,
            };

            match updates {
                Ok(updates) => {
                    for update in updates {
                        offset = Some(update.update_id + 1);
                        self.handle_update(update).await;
                    }
                }
                Err(TelegramError::InvalidToken) => {
                    error!("Bot token rejected while polling");
                    return Err(TelegramError::InvalidToken);
                }
                Err(TelegramError::FloodWait(seconds)) => {
                    warn!("Flood wait on getUpdates: {} seconds", seconds);
                    tokio::time::sleep(Duration::from_secs(u64::from(seconds))).await;
                }
                Err(e) => {
                    warn!("getUpdates failed: {}; retrying in {:?}", e, RETRY_DELAY);
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        () = tokio::time::sleep(RETRY_DELAY) => {}
                    }
                }
            }
        }

        info!("Dispatcher stopped");
        Ok(())
    }

    /// Processes one update. Errors are logged; nothing here is fatal.
    pub async fn handle_update(&self, update: Update) {
        let text = update.message.as_ref().and_then(|m| m.text.as_deref());
        if text.is_some_and(|t| self.handler.is_for_other_bot(t)) {
            debug!("Ignoring update {}: command for another bot", update.update_id);
            return;
        }

        if let Err(denied) = self.gate.check(update.sender_id()) {
            warn!("Update {} rejected: {}", update.update_id, denied);
            self.reply_denied(&update).await;
            return;
        }

        if let Some(query) = update.callback_query {
            self.handle_callback(&query).await;
        } else if let Some(message) = update.message {
            self.handle_message(&message).await;
        }
    }

    async fn reply_denied(&self, update: &Update) {
        let result = if let Some(query) = &update.callback_query {
            self.bot
                .answer_callback_query(&query.id, Some(ACCESS_DENIED_REPLY), true)
                .await
        } else if let Some(message) = &update.message {
            self.bot
                .send_message(message.chat.id, ACCESS_DENIED_REPLY, None)
                .await
        } else {
            Ok(())
        };

        if let Err(e) = result {
            warn!("Failed to send access-denied reply: {}", e);
        }
    }

    async fn handle_message(&self, message: &Message) {
        let Some(text) = message.text.as_deref() else {
            return;
        };

        let result = match self.handler.try_handle(text).await {
            Some(result) => result,
            None if text.trim_start().starts_with('/') => CommandResult::error(UNKNOWN_COMMAND_REPLY),
            None => {
                debug!("Ignoring non-command message in chat {}", message.chat.id);
                return;
            }
        };

        self.deliver(message.chat.id, &result).await;
    }

    async fn handle_callback(&self, query: &CallbackQuery) {
        let data = query.data.as_deref().unwrap_or_default();
        let result = self.handler.handle_callback(data).await;

        let notice = match &result {
            Some(r) if r.success => "Done",
            Some(_) => "Failed",
            None => "Unknown action",
        };
        if let Err(e) = self
            .bot
            .answer_callback_query(&query.id, Some(notice), false)
            .await
        {
            warn!("Failed to answer callback query: {}", e);
        }

        if let Some(result) = result {
            let chat_id = query.message.as_ref().map_or(query.from.id, |m| m.chat.id);
            self.deliver(chat_id, &result).await;
        }
    }

    /// Sends the reply and requests a cache refresh after writes.
    async fn deliver(&self, chat_id: i64, result: &CommandResult) {
        if let Err(e) = self
            .bot
            .send_message(chat_id, &result.message, result.keyboard.as_ref())
            .await
        {
            error!("Failed to send reply to chat {}: {}", chat_id, e);
        }

        if result.trigger_sync
            && let Err(e) = self.sync_tx.try_send(SyncMessage::TriggerSync)
        {
            debug!("Sync trigger not queued: {}", e);
        }
    }
}

impl<A: ValuesApi> std::fmt::Debug for Dispatcher<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::RwLock;

    use super::*;
    use crate::cache::{CacheStore, CacheSyncer, SyncStatus};
    use crate::config::AdminIds;
    use crate::sheets::Ledger;
    use crate::sheets::memory::MemorySheets;
    use crate::telegram::fake_server::{FakeBotServer, ok_responder};

    const ADMIN: i64 = 906_038_550;

    async fn dispatcher(
        server: &FakeBotServer,
    ) -> (Dispatcher<MemorySheets>, mpsc::Receiver<SyncMessage>) {
        let bot = Arc::new(BotApi::with_base(&server.base, "TEST").unwrap());
        let ledger = Arc::new(Ledger::new(MemorySheets::new()));
        let cache = Arc::new(CacheStore::open_in_memory().await.unwrap());
        let syncer = Arc::new(CacheSyncer::new(
            Arc::clone(&ledger),
            Arc::clone(&cache),
            Arc::new(RwLock::new(SyncStatus::new())),
            Duration::from_secs(300),
        ));
        let handler = Arc::new(
            CommandHandler::new(ledger, cache, syncer).with_bot_username(Some("agency_bot".to_owned())),
        );
        let gate = AccessGate::new(AdminIds::parse("906038550,123456789").unwrap());
        let (tx, rx) = mpsc::channel(4);
        (Dispatcher::new(bot, gate, handler, tx), rx)
    }

    fn message(from: i64, text: &str) -> Update {
        serde_json::from_value(serde_json::json!({
            "update_id": 1,
            "message": {
                "message_id": 1,
                "from": {"id": from, "is_bot": false, "first_name": "U"},
                "chat": {"id": from},
                "text": text
            }
        }))
        .unwrap()
    }

    fn callback(from: i64, data: &str) -> Update {
        serde_json::from_value(serde_json::json!({
            "update_id": 2,
            "callback_query": {
                "id": "cb1",
                "from": {"id": from, "is_bot": false, "first_name": "U"},
                "data": data
            }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_stranger_gets_access_denied() {
        let server = FakeBotServer::start(ok_responder).await;
        let (dispatcher, _rx) = dispatcher(&server).await;

        dispatcher.handle_update(message(42, "/debtors")).await;

        let sent = server.calls("sendMessage");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["chat_id"], 42);
        assert_eq!(sent[0]["text"], ACCESS_DENIED_REPLY);
    }

    #[tokio::test]
    async fn test_stranger_callback_gets_alert() {
        let server = FakeBotServer::start(ok_responder).await;
        let (dispatcher, _rx) = dispatcher(&server).await;

        dispatcher.handle_update(callback(42, "list:white:Acme")).await;

        let answers = server.calls("answerCallbackQuery");
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0]["show_alert"], true);
        assert!(server.calls("sendMessage").is_empty());
    }

    #[tokio::test]
    async fn test_admin_command_is_answered() {
        let server = FakeBotServer::start(ok_responder).await;
        let (dispatcher, _rx) = dispatcher(&server).await;

        dispatcher.handle_update(message(ADMIN, "/help")).await;

        let sent = server.calls("sendMessage");
        assert_eq!(sent.len(), 1);
        assert!(sent[0]["text"].as_str().unwrap().contains("/pay"));
    }

    #[tokio::test]
    async fn test_unknown_command_and_plain_text() {
        let server = FakeBotServer::start(ok_responder).await;
        let (dispatcher, _rx) = dispatcher(&server).await;

        dispatcher.handle_update(message(ADMIN, "/frobnicate")).await;
        dispatcher.handle_update(message(ADMIN, "hello there")).await;

        let sent = server.calls("sendMessage");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["text"], UNKNOWN_COMMAND_REPLY);
    }

    #[tokio::test]
    async fn test_commands_for_other_bots_get_no_reply() {
        let server = FakeBotServer::start(ok_responder).await;
        let (dispatcher, _rx) = dispatcher(&server).await;

        dispatcher.handle_update(message(ADMIN, "/help@OtherBot")).await;
        dispatcher.handle_update(message(ADMIN, "/frobnicate@OtherBot")).await;
        dispatcher.handle_update(message(42, "/start@OtherBot")).await;
        assert!(server.calls("sendMessage").is_empty());

        dispatcher.handle_update(message(ADMIN, "/frobnicate@agency_bot")).await;
        let sent = server.calls("sendMessage");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["text"], UNKNOWN_COMMAND_REPLY);
    }

    #[tokio::test]
    async fn test_write_triggers_sync() {
        let server = FakeBotServer::start(ok_responder).await;
        let (dispatcher, mut rx) = dispatcher(&server).await;

        dispatcher
            .handle_update(message(ADMIN, "/expense Hosting; 25"))
            .await;

        assert_eq!(rx.try_recv().unwrap(), SyncMessage::TriggerSync);
    }

    #[tokio::test]
    async fn test_admin_callback_is_answered_and_reported() {
        let server = FakeBotServer::start(ok_responder).await;
        let (dispatcher, mut rx) = dispatcher(&server).await;

        dispatcher.handle_update(callback(ADMIN, "list:white:Acme")).await;

        let answers = server.calls("answerCallbackQuery");
        assert_eq!(answers[0]["text"], "Done");
        let sent = server.calls("sendMessage");
        assert_eq!(sent[0]["chat_id"], ADMIN);
        assert_eq!(rx.try_recv().unwrap(), SyncMessage::TriggerSync);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let server = FakeBotServer::start(ok_responder).await;
        let (dispatcher, _rx) = dispatcher(&server).await;

        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        dispatcher.run(rx).await.unwrap();
    }

    #[tokio::test]
    async fn test_run_keeps_polling_until_shutdown_is_sent() {
        let server = FakeBotServer::start(ok_responder).await;
        let (dispatcher, _rx) = dispatcher(&server).await;

        let (tx, rx) = watch::channel(false);
        let polling = tokio::time::timeout(Duration::from_millis(300), dispatcher.run(rx.clone())).await;
        assert!(polling.is_err(), "dispatcher stopped while the sender was alive");
        assert!(!server.calls("getUpdates").is_empty());

        tx.send(true).unwrap();
        dispatcher.run(rx).await.unwrap();
    }
}
