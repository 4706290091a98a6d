//! Command types and definitions.

use std::fmt;

use uuid::Uuid;

use crate::sheets::values::parse_amount;
use crate::sheets::{DesignerPay, ListStatus, NewOrder, Period};
use crate::telegram::InlineKeyboardMarkup;

/// Separator between command arguments that may contain spaces.
pub const ARG_SEPARATOR: char = ';';

/// Prefix of inline-button callback data for list changes.
pub const LIST_CALLBACK_PREFIX: &str = "list:";

/// Available bot commands.
#[derive(Debug, Clone, PartialEq)]
pub enum BotCommand {
    /// Greeting with the command list.
    Start,

    /// Show help information.
    Help,

    /// Show cache and sync status.
    Status,

    /// Show information about the bot.
    Info,

    /// List known clients.
    Clients,

    /// List known designers.
    Designers,

    /// Orders, debt and list status of one client.
    Client(String),

    /// Clients that owe money.
    Debtors(Period),

    /// Designer earnings and payouts.
    Earnings(Period),

    /// Expenses by category.
    Expenses(Period),

    /// Revenue, costs and profit.
    Summary(Period),

    /// Record a new order.
    Order(NewOrder),

    /// Record a client payment.
    Pay { client: String, amount: f64 },

    /// Record an agency expense.
    Expense { category: String, amount: f64 },

    /// Record a payout to a designer.
    Payout { designer: String, amount: f64 },

    /// Put a client on the whitelist.
    Whitelist(String),

    /// Put a client on the blacklist.
    Blacklist(String),

    /// Remove a client from both lists.
    Unlist(String),

    /// Show both lists.
    Lists,

    /// Clear every row written by an operation.
    Undo(Uuid),

    /// Refresh the cache now.
    Sync,
}

impl BotCommand {
    /// Whether `text` is a `/cmd@OtherBot` command meant for another bot.
    #[must_use]
    pub fn is_for_other_bot(text: &str, bot_username: Option<&str>) -> bool {
        let Some(own) = bot_username else {
            return false;
        };
        let Some(after_slash) = text.trim().strip_prefix('/') else {
            return false;
        };
        let head = after_slash.split(char::is_whitespace).next().unwrap_or_default();
        head.split_once('@')
            .is_some_and(|(_, target)| !target.eq_ignore_ascii_case(own.trim_start_matches('@')))
    }

    /// Parses a command from a message text.
    ///
    /// Accepts `/cmd` and `/cmd@BotName` in any letter case. When
    /// `bot_username` is given, commands addressed to another bot are
    /// ignored. Returns `None` for non-commands, unknown commands and
    /// malformed arguments.
    #[must_use]
    pub fn parse(text: &str, bot_username: Option<&str>) -> Option<Self> {
        let text = text.trim();
        let after_slash = text.strip_prefix('/')?;

        let (head, args) = match after_slash.split_once(char::is_whitespace) {
            Some((head, args)) => (head, args.trim()),
            None => (after_slash, ""),
        };

        if Self::is_for_other_bot(text, bot_username) {
            return None;
        }
        let cmd = head.split_once('@').map_or(head, |(cmd, _)| cmd);

        match cmd.to_lowercase().as_str() {
            "start" => Some(Self::Start),
            "help" => Some(Self::Help),
            "status" => Some(Self::Status),
            "info" => Some(Self::Info),
            "clients" => Some(Self::Clients),
            "designers" => Some(Self::Designers),
            "client" => non_empty(args).map(Self::Client),
            "debtors" | "debts" => Period::parse(args).map(Self::Debtors),
            "earnings" => Period::parse(args).map(Self::Earnings),
            "expenses" => Period::parse(args).map(Self::Expenses),
            "summary" => Period::parse(args).map(Self::Summary),
            "order" => Self::parse_order(args),
            "pay" | "payment" => {
                let (client, amount) = name_and_amount(args)?;
                Some(Self::Pay { client, amount })
            }
            "expense" => {
                let (category, amount) = name_and_amount(args)?;
                Some(Self::Expense { category, amount })
            }
            "payout" => {
                let (designer, amount) = name_and_amount(args)?;
                Some(Self::Payout { designer, amount })
            }
            "whitelist" => non_empty(args).map(Self::Whitelist),
            "blacklist" => non_empty(args).map(Self::Blacklist),
            "unlist" => non_empty(args).map(Self::Unlist),
            "lists" => Some(Self::Lists),
            "undo" => Uuid::parse_str(args).ok().map(Self::Undo),
            "sync" => Some(Self::Sync),
            _ => None,
        }
    }

    /// Parses `<designer|->; <client>; <amount>; <share>[; <paid>]`.
    fn parse_order(args: &str) -> Option<Self> {
        let parts = split_args(args);
        if !(4..=5).contains(&parts.len()) {
            return None;
        }

        let designer = match parts[0] {
            "" => return None,
            "-" => None,
            name => Some(name.to_owned()),
        };
        let client = non_empty(parts[1])?;
        let amount = parse_amount(parts[2])?;
        let pay = DesignerPay::parse(parts[3])?;
        let paid = match parts.get(4) {
            Some(raw) => parse_amount(raw)?,
            None => 0.0,
        };

        Some(Self::Order(NewOrder {
            designer,
            client,
            amount,
            pay,
            paid,
        }))
    }

    /// Returns the command name as it appears in help.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Help => "help",
            Self::Status => "status",
            Self::Info => "info",
            Self::Clients => "clients",
            Self::Designers => "designers",
            Self::Client(_) => "client",
            Self::Debtors(_) => "debtors",
            Self::Earnings(_) => "earnings",
            Self::Expenses(_) => "expenses",
            Self::Summary(_) => "summary",
            Self::Order(_) => "order",
            Self::Pay { .. } => "pay",
            Self::Expense { .. } => "expense",
            Self::Payout { .. } => "payout",
            Self::Whitelist(_) => "whitelist",
            Self::Blacklist(_) => "blacklist",
            Self::Unlist(_) => "unlist",
            Self::Lists => "lists",
            Self::Undo(_) => "undo",
            Self::Sync => "sync",
        }
    }

    /// Whether the command changes the spreadsheet.
    #[must_use]
    pub const fn is_write(&self) -> bool {
        matches!(
            self,
            Self::Order(_)
                | Self::Pay { .. }
                | Self::Expense { .. }
                | Self::Payout { .. }
                | Self::Whitelist(_)
                | Self::Blacklist(_)
                | Self::Unlist(_)
                | Self::Undo(_)
        )
    }

    /// Returns all available commands as `(command, arguments, description)`.
    #[must_use]
    pub fn all_commands() -> Vec<(&'static str, &'static str, &'static str)> {
        vec![
            ("help", "", "Show this help message"),
            ("status", "", "Show cache and sync status"),
            ("clients", "", "List known clients"),
            ("designers", "", "List known designers"),
            ("client", "<name>", "Orders, debt and list of a client"),
            ("debtors", "[period]", "Clients with outstanding debt"),
            ("earnings", "[period]", "Designer earnings and payouts"),
            ("expenses", "[period]", "Expenses by category"),
            ("summary", "[period]", "Revenue, costs and profit"),
            (
                "order",
                "<designer|->; <client>; <amount>; <share 30% or 150>; [paid]",
                "Record an order",
            ),
            ("pay", "<client>; <amount>", "Record a client payment (oldest debts first)"),
            ("expense", "<category>; <amount>", "Record an expense"),
            ("payout", "<designer>; <amount>", "Record a payout to a designer"),
            ("whitelist", "<client>", "Put a client on the whitelist"),
            ("blacklist", "<client>", "Put a client on the blacklist"),
            ("unlist", "<client>", "Remove a client from both lists"),
            ("lists", "", "Show whitelist and blacklist"),
            ("undo", "<operation id>", "Remove everything an operation wrote"),
            ("sync", "", "Refresh the local cache now"),
            ("info", "", "Show bot information"),
        ]
    }
}

impl fmt::Display for BotCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client(name) | Self::Whitelist(name) | Self::Blacklist(name) | Self::Unlist(name) => {
                write!(f, "{} {name}", self.name())
            }
            Self::Debtors(p) | Self::Earnings(p) | Self::Expenses(p) | Self::Summary(p) => {
                write!(f, "{} {p}", self.name())
            }
            Self::Order(order) => write!(
                f,
                "order {}; {}; {:.2}",
                order.designer.as_deref().unwrap_or("-"),
                order.client,
                order.amount
            ),
            Self::Pay { client: name, amount }
            | Self::Expense {
                category: name,
                amount,
            }
            | Self::Payout {
                designer: name,
                amount,
            } => write!(f, "{} {name}; {amount:.2}", self.name()),
            Self::Undo(id) => write!(f, "undo {id}"),
            _ => write!(f, "{}", self.name()),
        }
    }
}

/// Action encoded in inline-button callback data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    /// `list:white:<client>` or `list:black:<client>`.
    SetList(String, ListStatus),
    /// `list:remove:<client>`.
    RemoveFromLists(String),
}

impl CallbackAction {
    /// Parses callback data; `None` for unknown data.
    #[must_use]
    pub fn parse(data: &str) -> Option<Self> {
        let rest = data.strip_prefix(LIST_CALLBACK_PREFIX)?;
        let (action, client) = rest.split_once(':')?;
        let client = non_empty(client)?;

        match action {
            "white" => Some(Self::SetList(client, ListStatus::Whitelist)),
            "black" => Some(Self::SetList(client, ListStatus::Blacklist)),
            "remove" => Some(Self::RemoveFromLists(client)),
            _ => None,
        }
    }

    /// Encodes the action as callback data.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::SetList(client, ListStatus::Whitelist) => format!("{LIST_CALLBACK_PREFIX}white:{client}"),
            Self::SetList(client, ListStatus::Blacklist) => format!("{LIST_CALLBACK_PREFIX}black:{client}"),
            Self::RemoveFromLists(client) => format!("{LIST_CALLBACK_PREFIX}remove:{client}"),
        }
    }
}

/// Result of command execution.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Whether the command was successful.
    pub success: bool,

    /// Response message to show the user.
    pub message: String,

    /// Inline buttons to attach to the reply.
    pub keyboard: Option<InlineKeyboardMarkup>,

    /// Whether the cache should be refreshed after this command.
    pub trigger_sync: bool,
}

impl CommandResult {
    /// Creates a successful result.
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            keyboard: None,
            trigger_sync: false,
        }
    }

    /// Creates a successful result that refreshes the cache.
    #[must_use]
    pub fn success_with_sync(message: impl Into<String>) -> Self {
        Self {
            trigger_sync: true,
            ..Self::success(message)
        }
    }

    /// Creates an error result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            keyboard: None,
            trigger_sync: false,
        }
    }

    /// Attaches inline buttons.
    #[must_use]
    pub fn with_keyboard(mut self, keyboard: InlineKeyboardMarkup) -> Self {
        self.keyboard = Some(keyboard);
        self
    }
}

fn split_args(args: &str) -> Vec<&str> {
    args.split(ARG_SEPARATOR).map(str::trim).collect()
}

fn non_empty(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

/// Parses `<name>; <amount>`.
fn name_and_amount(args: &str) -> Option<(String, f64)> {
    let parts = split_args(args);
    let [name, amount] = parts.as_slice() else {
        return None;
    };
    Some((non_empty(name)?, parse_amount(amount)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(BotCommand::parse("/start", None), Some(BotCommand::Start));
        assert_eq!(BotCommand::parse("/help", None), Some(BotCommand::Help));
        assert_eq!(BotCommand::parse("/lists", None), Some(BotCommand::Lists));
        assert_eq!(BotCommand::parse("/sync", None), Some(BotCommand::Sync));
    }

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!(BotCommand::parse("/STATUS", None), Some(BotCommand::Status));
        assert_eq!(BotCommand::parse("/Clients", None), Some(BotCommand::Clients));
    }

    #[test]
    fn test_parse_bot_suffix() {
        assert_eq!(
            BotCommand::parse("/status@AgencyBot", Some("agencybot")),
            Some(BotCommand::Status)
        );
        assert_eq!(
            BotCommand::parse("/status@AgencyBot", None),
            Some(BotCommand::Status)
        );
        assert_eq!(BotCommand::parse("/status@OtherBot", Some("AgencyBot")), None);
    }

    #[test]
    fn test_command_for_other_bot() {
        assert!(BotCommand::is_for_other_bot("/debtors@OtherBot month", Some("AgencyBot")));
        assert!(BotCommand::is_for_other_bot("/nonsense@OtherBot", Some("@AgencyBot")));
        assert!(!BotCommand::is_for_other_bot("/debtors@agencybot", Some("AgencyBot")));
        assert!(!BotCommand::is_for_other_bot("/debtors", Some("AgencyBot")));
        assert!(!BotCommand::is_for_other_bot("/debtors@OtherBot", None));
        assert!(!BotCommand::is_for_other_bot("mail me@OtherBot", Some("AgencyBot")));
    }

    #[test]
    fn test_parse_not_a_command() {
        assert_eq!(BotCommand::parse("hello", None), None);
        assert_eq!(BotCommand::parse("/unknown", None), None);
        assert_eq!(BotCommand::parse("", None), None);
    }

    #[test]
    fn test_parse_client_requires_name() {
        assert_eq!(
            BotCommand::parse("/client  Acme Studio ", None),
            Some(BotCommand::Client("Acme Studio".to_owned()))
        );
        assert_eq!(BotCommand::parse("/client", None), None);
    }

    #[test]
    fn test_parse_periods() {
        assert_eq!(
            BotCommand::parse("/debtors", None),
            Some(BotCommand::Debtors(Period::All))
        );
        assert_eq!(
            BotCommand::parse("/summary month", None),
            Some(BotCommand::Summary(Period::Month))
        );
        assert_eq!(BotCommand::parse("/earnings someday", None), None);
    }

    #[test]
    fn test_parse_order() {
        assert_eq!(
            BotCommand::parse("/order Anna; Acme; 1000; 30%; 400", None),
            Some(BotCommand::Order(NewOrder {
                designer: Some("Anna".to_owned()),
                client: "Acme".to_owned(),
                amount: 1000.0,
                pay: DesignerPay::Percent(30.0),
                paid: 400.0,
            }))
        );
        assert_eq!(
            BotCommand::parse("/order -; Acme; 500; 0", None),
            Some(BotCommand::Order(NewOrder {
                designer: None,
                client: "Acme".to_owned(),
                amount: 500.0,
                pay: DesignerPay::Fixed(0.0),
                paid: 0.0,
            }))
        );
    }

    #[test]
    fn test_parse_order_malformed() {
        assert_eq!(BotCommand::parse("/order Anna; Acme", None), None);
        assert_eq!(BotCommand::parse("/order Anna; Acme; lots; 30%", None), None);
        assert_eq!(BotCommand::parse("/order ; Acme; 100; 30%", None), None);
    }

    #[test]
    fn test_parse_amount_commands() {
        assert_eq!(
            BotCommand::parse("/pay Acme Studio; 1 500,50", None),
            Some(BotCommand::Pay {
                client: "Acme Studio".to_owned(),
                amount: 1500.5,
            })
        );
        assert_eq!(
            BotCommand::parse("/expense rent; 300", None),
            Some(BotCommand::Expense {
                category: "rent".to_owned(),
                amount: 300.0,
            })
        );
        assert_eq!(BotCommand::parse("/payout Anna", None), None);
        assert_eq!(BotCommand::parse("/pay Acme; 10; 20", None), None);
    }

    #[test]
    fn test_parse_undo() {
        let id = Uuid::new_v4();
        assert_eq!(
            BotCommand::parse(&format!("/undo {id}"), None),
            Some(BotCommand::Undo(id))
        );
        assert_eq!(BotCommand::parse("/undo not-an-id", None), None);
    }

    #[test]
    fn test_write_commands() {
        assert!(BotCommand::Unlist("Acme".to_owned()).is_write());
        assert!(!BotCommand::Lists.is_write());
    }

    #[test]
    fn test_callback_round_trip() {
        let action = CallbackAction::SetList("Acme Studio".to_owned(), ListStatus::Blacklist);
        assert_eq!(action.encode(), "list:black:Acme Studio");
        assert_eq!(CallbackAction::parse(&action.encode()), Some(action));
        assert_eq!(
            CallbackAction::parse("list:remove:Acme"),
            Some(CallbackAction::RemoveFromLists("Acme".to_owned()))
        );
        assert_eq!(CallbackAction::parse("list:grey:Acme"), None);
        assert_eq!(CallbackAction::parse("other:white:Acme"), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            BotCommand::Pay {
                client: "Acme".to_owned(),
                amount: 10.0
            }
            .to_string(),
            "pay Acme; 10.00"
        );
        assert_eq!(BotCommand::Debtors(Period::Week).to_string(), "debtors this week");
    }
}
