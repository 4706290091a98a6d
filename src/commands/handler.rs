//! Command handler implementation.

use std::fmt::Write as _;
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::types::{BotCommand, CallbackAction, CommandResult};
use crate::cache::{CacheStore, CacheSyncer};
use crate::sheets::{
    ClientDebt, Ledger, ListStatus, NewOrder, Period, SheetsError, ValuesApi,
};
use crate::telegram::{InlineKeyboardButton, InlineKeyboardMarkup};

/// Telegram limit for callback data, in bytes.
const MAX_CALLBACK_DATA: usize = 64;

/// Names shown per list before the rest is summarized.
const MAX_LISTED_NAMES: usize = 100;

/// Handles bot commands against the ledger and the cache.
pub struct CommandHandler<A: ValuesApi> {
    ledger: Arc<Ledger<A>>,
    cache: Arc<CacheStore>,
    syncer: Arc<CacheSyncer<A>>,

    /// Username of this bot, for `/cmd@BotName` addressing.
    bot_username: Option<String>,
}

impl<A: ValuesApi> CommandHandler<A> {
    /// Creates a new command handler.
    #[must_use]
    pub fn new(ledger: Arc<Ledger<A>>, cache: Arc<CacheStore>, syncer: Arc<CacheSyncer<A>>) -> Self {
        Self {
            ledger,
            cache,
            syncer,
            bot_username: None,
        }
    }

    /// Only accepts `/cmd@name` commands addressed to `username`.
    #[must_use]
    pub fn with_bot_username(mut self, username: Option<String>) -> Self {
        self.bot_username = username;
        self
    }

    /// Whether the message is a command addressed to another bot.
    #[must_use]
    pub fn is_for_other_bot(&self, message_text: &str) -> bool {
        BotCommand::is_for_other_bot(message_text, self.bot_username.as_deref())
    }

    /// Tries to parse and execute a command from a message.
    ///
    /// Returns `None` if the message is not a known, well-formed command.
    pub async fn try_handle(&self, message_text: &str) -> Option<CommandResult> {
        let command = BotCommand::parse(message_text, self.bot_username.as_deref())?;

        if command.is_write() {
            info!("Handling write command: {}", command);
        } else {
            debug!("Handling command: {}", command);
        }
        let result = self.execute(command).await;
        info!(
            "Command result: success={}, trigger_sync={}",
            result.success, result.trigger_sync
        );

        Some(result)
    }

    /// Executes an inline-button press.
    ///
    /// Returns `None` for unknown callback data.
    pub async fn handle_callback(&self, data: &str) -> Option<CommandResult> {
        let action = CallbackAction::parse(data)?;
        debug!("Handling callback: {:?}", action);

        Some(match action {
            CallbackAction::SetList(client, status) => self.handle_set_list(&client, status).await,
            CallbackAction::RemoveFromLists(client) => self.handle_unlist(&client).await,
        })
    }

    /// Executes a parsed command.
    async fn execute(&self, command: BotCommand) -> CommandResult {
        match command {
            BotCommand::Start => Self::handle_start(),
            BotCommand::Help => Self::handle_help(),
            BotCommand::Status => self.handle_status().await,
            BotCommand::Info => Self::handle_info(),
            BotCommand::Clients => self.handle_clients().await,
            BotCommand::Designers => self.handle_designers().await,
            BotCommand::Client(name) => self.handle_client(&name).await,
            BotCommand::Debtors(period) => self.handle_debtors(period).await,
            BotCommand::Earnings(period) => self.handle_earnings(period).await,
            BotCommand::Expenses(period) => self.handle_expenses(period).await,
            BotCommand::Summary(period) => self.handle_summary(period).await,
            BotCommand::Order(order) => self.handle_order(&order).await,
            BotCommand::Pay { client, amount } => self.handle_pay(&client, amount).await,
            BotCommand::Expense { category, amount } => self.handle_expense(&category, amount).await,
            BotCommand::Payout { designer, amount } => self.handle_payout(&designer, amount).await,
            BotCommand::Whitelist(client) => self.handle_set_list(&client, ListStatus::Whitelist).await,
            BotCommand::Blacklist(client) => self.handle_set_list(&client, ListStatus::Blacklist).await,
            BotCommand::Unlist(client) => self.handle_unlist(&client).await,
            BotCommand::Lists => self.handle_lists().await,
            BotCommand::Undo(id) => self.handle_undo(id).await,
            BotCommand::Sync => self.handle_sync().await,
        }
    }

    fn handle_start() -> CommandResult {
        let mut message = String::from("👋 Agency bookkeeping bot.\n\n");
        message.push_str(&Self::handle_help().message);
        CommandResult::success(message)
    }

    fn handle_help() -> CommandResult {
        let mut lines = vec![
            "Commands (arguments with spaces are separated by ';'):".to_owned(),
            String::new(),
        ];

        for (cmd, args, desc) in BotCommand::all_commands() {
            if args.is_empty() {
                lines.push(format!("/{cmd} - {desc}"));
            } else {
                lines.push(format!("/{cmd} {args} - {desc}"));
            }
        }

        lines.push(String::new());
        lines.push("Periods: today, week, month, all, DD.MM.YYYY-DD.MM.YYYY".to_owned());
        CommandResult::success(lines.join("\n"))
    }

    async fn handle_status(&self) -> CommandResult {
        let stale_after = self.syncer.interval() * 2;
        let (last_success, last_rows, failures, last_error, in_progress, stale) = {
            let status = self.syncer.status().read().await;
            (
                status.last_success_at,
                status.last_rows,
                status.consecutive_failures,
                status.last_error.clone(),
                status.in_progress,
                status.is_stale(stale_after),
            )
        };

        let last_sync = match (last_success, self.cache.last_sync().await) {
            (Some(at), _) => format!("{} ({} rows)", at.format("%d.%m.%Y %H:%M:%S UTC"), last_rows),
            (None, Ok(Some(info))) => format!(
                "{} ({} rows, previous run)",
                info.last_synced_at.format("%d.%m.%Y %H:%M:%S UTC"),
                info.rows_synced
            ),
            (None, _) => "never".to_owned(),
        };

        let counts = match (self.cache.clients().await, self.cache.designers().await) {
            (Ok(clients), Ok(designers)) => format!("{} clients, {} designers", clients.len(), designers.len()),
            _ => "unavailable".to_owned(),
        };

        let mut message = format!(
            "📊 Status\n\
             Cache: {counts}\n\
             Last sync: {last_sync}\n\
             Sync interval: {}s",
            self.syncer.interval().as_secs()
        );
        if in_progress {
            message.push_str("\nSync in progress…");
        }
        if stale && !in_progress {
            message.push_str("\n⚠️ Cache is stale; run /sync");
        }
        if let Some(error) = last_error {
            let _ = write!(message, "\n⚠️ Last sync failed ({failures}x): {error}");
        }

        CommandResult::success(message)
    }

    fn handle_info() -> CommandResult {
        let version = env!("CARGO_PKG_VERSION");
        CommandResult::success(format!(
            "Agency Sheets Bot v{version}\n\
             Records orders, payments and expenses in Google Sheets."
        ))
    }

    async fn handle_clients(&self) -> CommandResult {
        let names = match self.cache.clients().await {
            Ok(names) if !names.is_empty() => Ok(names),
            _ => self.ledger.all_clients().await,
        };
        match names {
            Ok(names) => CommandResult::success(format_names("👥 Clients", &names)),
            Err(e) => sheets_error("load clients", &e),
        }
    }

    async fn handle_designers(&self) -> CommandResult {
        let names = match self.cache.designers().await {
            Ok(names) if !names.is_empty() => Ok(names),
            _ => self.ledger.all_designers().await,
        };
        match names {
            Ok(names) => CommandResult::success(format_names("🎨 Designers", &names)),
            Err(e) => sheets_error("load designers", &e),
        }
    }

    async fn handle_client(&self, name: &str) -> CommandResult {
        let orders = match self.ledger.client_orders(name).await {
            Ok(orders) => orders,
            Err(e) => return sheets_error("load orders", &e),
        };

        let status = match self.cache.list_status(name).await {
            Ok(Some(status)) => Some(status),
            _ => self.ledger.list_status(name).await.unwrap_or_else(|e| {
                warn!("Could not read list status of '{}': {}", name, e);
                None
            }),
        };

        let display_name = orders.first().map_or(name, |o| o.client.as_str());
        let mut message = format!("👤 {display_name}\n");
        let _ = writeln!(
            message,
            "List: {}",
            status.map_or("none", ListStatus::as_str)
        );

        if orders.is_empty() {
            message.push_str("No orders found.");
        } else {
            let total: f64 = orders.iter().map(|o| o.amount).sum();
            let paid: f64 = orders.iter().map(|o| o.paid).sum();
            let debt: f64 = orders.iter().map(|o| o.debt).sum();
            let _ = writeln!(
                message,
                "Orders: {} | total {total:.2} | paid {paid:.2} | debt {debt:.2}\n",
                orders.len()
            );
            for order in &orders {
                let _ = writeln!(
                    message,
                    "{} {:.2} paid {:.2} debt {:.2} ({})",
                    order.date, order.amount, order.paid, order.debt, order.status
                );
            }
        }

        let result = CommandResult::success(message.trim_end().to_owned());
        match list_keyboard(display_name, status) {
            Some(keyboard) => result.with_keyboard(keyboard),
            None => result,
        }
    }

    async fn handle_debtors(&self, period: Period) -> CommandResult {
        let debtors = if period == Period::All {
            let filled = self.cache_is_filled().await;
            match self.cache.debtors().await {
                Ok(debtors) if filled => Ok(debtors),
                _ => self.ledger.debtors().await,
            }
        } else {
            self.ledger
                .clients_with_debts(period)
                .await
                .map(|all| all.into_iter().filter(ClientDebt::owes).collect())
        };

        match debtors {
            Ok(debtors) => CommandResult::success(format_debtors(&debtors, period)),
            Err(e) => sheets_error("load debtors", &e),
        }
    }

    async fn handle_earnings(&self, period: Period) -> CommandResult {
        let earnings = match self.ledger.designers_with_earnings(period).await {
            Ok(earnings) => earnings,
            Err(e) => return sheets_error("load earnings", &e),
        };

        if earnings.is_empty() {
            return CommandResult::success(format!("No designer earnings for {period}."));
        }

        let mut message = format!("🎨 Designer earnings, {period}\n");
        for e in &earnings {
            let _ = writeln!(
                message,
                "{}: {} orders, earned {:.2}, paid out {:.2}, balance {:.2}",
                e.designer,
                e.orders_count,
                e.total_earnings,
                e.paid_out,
                e.balance()
            );
        }
        CommandResult::success(message.trim_end().to_owned())
    }

    async fn handle_expenses(&self, period: Period) -> CommandResult {
        let categories = match self.ledger.expenses_by_category(period).await {
            Ok(categories) => categories,
            Err(e) => return sheets_error("load expenses", &e),
        };

        if categories.is_empty() {
            return CommandResult::success(format!("No expenses for {period}."));
        }

        let total: f64 = categories.iter().map(|c| c.total).sum();
        let mut message = format!("💸 Expenses, {period}: {total:.2}\n");
        for c in &categories {
            let _ = writeln!(message, "{}: {:.2} ({}x)", c.category, c.total, c.count);
        }
        CommandResult::success(message.trim_end().to_owned())
    }

    async fn handle_summary(&self, period: Period) -> CommandResult {
        match self.ledger.summary(period).await {
            Ok(s) => CommandResult::success(format!(
                "📈 Summary, {period}\n\
                 Orders: {}\n\
                 Revenue: {:.2}\n\
                 Received: {:.2}\n\
                 Outstanding: {:.2}\n\
                 Designer shares: {:.2}\n\
                 Expenses: {:.2}\n\
                 Paid out to designers: {:.2}\n\
                 Profit: {:.2}",
                s.orders_count,
                s.revenue,
                s.received,
                s.outstanding,
                s.designer_shares,
                s.expenses,
                s.payouts,
                s.profit()
            )),
            Err(e) => sheets_error("build summary", &e),
        }
    }

    async fn handle_order(&self, order: &NewOrder) -> CommandResult {
        match self.ledger.record_order(order).await {
            Ok(receipt) => CommandResult::success_with_sync(format!(
                "✓ Order recorded for {}\n\
                 Amount: {:.2}, paid {:.2}, debt {:.2}\n\
                 Designer share: {:.2}, agency income: {:.2}\n\
                 Operation: {}",
                order.client.trim(),
                order.amount,
                order.paid,
                receipt.debt,
                receipt.designer_share,
                receipt.agency_income,
                receipt.operation_id
            )),
            Err(e) => sheets_error("record order", &e),
        }
    }

    async fn handle_pay(&self, client: &str, amount: f64) -> CommandResult {
        let result = match self.ledger.record_payment(client, amount).await {
            Ok(result) => result,
            Err(e @ SheetsError::NoOutstandingDebt(_)) => return CommandResult::error(format!("❌ {e}")),
            Err(e) => return sheets_error("record payment", &e),
        };

        let mut message = format!(
            "✓ Payment of {amount:.2} from {} applied to {} order(s)\n",
            client.trim(),
            result.allocations.len()
        );
        for a in &result.allocations {
            let _ = writeln!(
                message,
                "{}: +{:.2}, remaining {:.2}",
                a.date, a.applied, a.remaining_debt
            );
        }
        let _ = writeln!(message, "Remaining debt: {:.2}", result.remaining_debt);
        if result.overpaid > 0.0 {
            let _ = writeln!(message, "Overpaid: {:.2}", result.overpaid);
        }
        let _ = write!(message, "Operation: {}", result.operation_id);

        CommandResult::success_with_sync(message)
    }

    async fn handle_expense(&self, category: &str, amount: f64) -> CommandResult {
        match self.ledger.record_expense(category, amount).await {
            Ok(id) => CommandResult::success_with_sync(format!(
                "✓ Expense recorded: {} {amount:.2}\nOperation: {id}",
                category.trim()
            )),
            Err(e) => sheets_error("record expense", &e),
        }
    }

    async fn handle_payout(&self, designer: &str, amount: f64) -> CommandResult {
        match self.ledger.record_payout(designer, amount).await {
            Ok(id) => CommandResult::success_with_sync(format!(
                "✓ Payout recorded: {} {amount:.2}\nOperation: {id}",
                designer.trim()
            )),
            Err(e) => sheets_error("record payout", &e),
        }
    }

    async fn handle_set_list(&self, client: &str, status: ListStatus) -> CommandResult {
        match self.ledger.set_list_status(client, status).await {
            Ok(true) => CommandResult::success_with_sync(format!("✓ {} moved to {status}", client.trim())),
            Ok(false) => CommandResult::success(format!("{} is already on the {status}", client.trim())),
            Err(e) => sheets_error("update lists", &e),
        }
    }

    async fn handle_unlist(&self, client: &str) -> CommandResult {
        match self.ledger.remove_from_lists(client).await {
            Ok(true) => CommandResult::success_with_sync(format!("✓ {} removed from lists", client.trim())),
            Ok(false) => CommandResult::error(format!("{} is not on any list", client.trim())),
            Err(e) => sheets_error("update lists", &e),
        }
    }

    async fn handle_lists(&self) -> CommandResult {
        let filled = self.cache_is_filled().await;
        let mut sections = Vec::with_capacity(2);
        for (status, title) in [
            (ListStatus::Whitelist, "✅ Whitelist"),
            (ListStatus::Blacklist, "⛔ Blacklist"),
        ] {
            let names = match self.cache.listed(status).await {
                Ok(names) if filled => Ok(names),
                _ => self.ledger.list_entries(status).await,
            };
            match names {
                Ok(names) => sections.push(format_names(title, &names)),
                Err(e) => return sheets_error("load lists", &e),
            }
        }
        CommandResult::success(sections.join("\n\n"))
    }

    async fn handle_undo(&self, operation_id: Uuid) -> CommandResult {
        match self.ledger.undo(operation_id).await {
            Ok(report) if report.total_rows() == 0 => {
                CommandResult::error(format!("No rows found for operation {operation_id}"))
            }
            Ok(report) => {
                let tabs: Vec<String> = report
                    .cleared
                    .iter()
                    .map(|(sheet, n)| format!("{sheet} ({n})"))
                    .collect();
                let mut message = format!("✓ Operation {operation_id} undone: {}", tabs.join(", "));
                if report.reverted_payments > 0 {
                    let _ = write!(
                        message,
                        "\nRestored paid amounts on {} order(s)",
                        report.reverted_payments
                    );
                }
                CommandResult::success_with_sync(message)
            }
            Err(e) => sheets_error("undo operation", &e),
        }
    }

    async fn handle_sync(&self) -> CommandResult {
        match self.syncer.sync_now().await {
            Ok(rows) => CommandResult::success(format!("✓ Cache synced ({rows} rows)")),
            Err(e) => CommandResult::error(format!("❌ Sync failed: {e}")),
        }
    }

    async fn cache_is_filled(&self) -> bool {
        matches!(self.cache.last_sync().await, Ok(Some(_)))
    }
}

impl<A: ValuesApi> std::fmt::Debug for CommandHandler<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandHandler")
            .field("bot_username", &self.bot_username)
            .finish_non_exhaustive()
    }
}

fn sheets_error(action: &str, error: &SheetsError) -> CommandResult {
    warn!("Failed to {}: {}", action, error);
    CommandResult::error(format!("❌ Failed to {action}: {error}"))
}

fn format_names(title: &str, names: &[String]) -> String {
    if names.is_empty() {
        return format!("{title}: none");
    }

    let mut message = format!("{title} ({})\n", names.len());
    for name in names.iter().take(MAX_LISTED_NAMES) {
        let _ = writeln!(message, "• {name}");
    }
    if names.len() > MAX_LISTED_NAMES {
        let _ = writeln!(message, "… and {} more", names.len() - MAX_LISTED_NAMES);
    }
    message.trim_end().to_owned()
}

fn format_debtors(debtors: &[ClientDebt], period: Period) -> String {
    if debtors.is_empty() {
        return format!("No debtors for {period}. 🎉");
    }

    let total: f64 = debtors.iter().map(|d| d.total_debt).sum();
    let mut message = format!("💰 Debtors, {period}: {total:.2}\n");
    for d in debtors {
        let _ = writeln!(
            message,
            "{}: {:.2} ({} orders, paid {:.2} of {:.2})",
            d.client, d.total_debt, d.orders_count, d.total_paid, d.total_amount
        );
    }
    message.trim_end().to_owned()
}

/// Buttons to move a client between lists; `None` if the name does not fit.
fn list_keyboard(client: &str, current: Option<ListStatus>) -> Option<InlineKeyboardMarkup> {
    let mut buttons = Vec::new();
    if current != Some(ListStatus::Whitelist) {
        buttons.push(("✅ Whitelist", CallbackAction::SetList(client.to_owned(), ListStatus::Whitelist)));
    }
    if current != Some(ListStatus::Blacklist) {
        buttons.push(("⛔ Blacklist", CallbackAction::SetList(client.to_owned(), ListStatus::Blacklist)));
    }
    if current.is_some() {
        buttons.push(("↩ Remove from lists", CallbackAction::RemoveFromLists(client.to_owned())));
    }

    let row = buttons
        .into_iter()
        .map(|(label, action)| {
            let data = action.encode();
            (data.len() <= MAX_CALLBACK_DATA).then(|| InlineKeyboardButton::callback(label, data))
        })
        .collect::<Option<Vec<_>>>()?;

    Some(InlineKeyboardMarkup::default().row(row))
}
