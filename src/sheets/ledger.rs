//! Agency bookkeeping on top of the six spreadsheet tabs.
//!
//! Writes go through [`SheetTransaction`] so an order spread over several
//! tabs either lands completely or not at all. Reads scan the data rows of
//! a tab once and aggregate in memory.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{Datelike, Local, NaiveDate};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use super::SheetsError;
use super::period::{Period, date_sort_key, format_sheet_date, sheet_date_text};
use super::rows::{clear_rows_by_operation_id, find_rows_by_operation_id, write_row};
use super::transaction::SheetTransaction;
use super::values::{ValuesApi, a1_range, cell, cell_number, cell_text, money, round2, text};
use crate::config::SheetKind;
use crate::config::layout::{clients, designers, expenses, general, lists};

/// Amounts below this are treated as zero.
const EPSILON: f64 = 0.005;

const STATUS_DEBT: &str = "debt";
const STATUS_PAID: &str = "paid";

/// Category written for designer payouts in EXPENSES.
pub const PAYOUT_CATEGORY: &str = "payout";

/// Prefix of the GENERAL note that records how a payment was allocated.
const ALLOCATION_PREFIX: &str = "fifo ";

/// Journal entry kinds in GENERAL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Order,
    Payment,
    Expense,
    Payout,
}

impl EntryKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Order => "order",
            Self::Payment => "payment",
            Self::Expense => "expense",
            Self::Payout => "payout",
        }
    }
}

/// How the designer is paid for an order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DesignerPay {
    /// Percentage of the order amount.
    Percent(f64),
    /// Fixed sum.
    Fixed(f64),
}

impl DesignerPay {
    /// Parses `30%` as a percentage and `150` as a fixed sum.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if let Some(percent) = raw.strip_suffix('%') {
            return super::values::parse_amount(percent).map(Self::Percent);
        }
        super::values::parse_amount(raw).map(Self::Fixed)
    }

    /// Designer share of `amount`.
    #[must_use]
    pub fn share(self, amount: f64) -> f64 {
        match self {
            Self::Percent(p) => round2(amount * p / 100.0),
            Self::Fixed(sum) => round2(sum),
        }
    }

    /// Effective percentage of `amount`.
    #[must_use]
    pub fn percent(self, amount: f64) -> f64 {
        match self {
            Self::Percent(p) => p,
            Self::Fixed(_) if amount <= 0.0 => 0.0,
            Self::Fixed(sum) => round2(sum / amount * 100.0),
        }
    }
}

/// Input of [`Ledger::record_order`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    /// `None` for orders done in-house.
    pub designer: Option<String>,
    pub client: String,
    pub amount: f64,
    pub pay: DesignerPay,
    pub paid: f64,
}

impl NewOrder {
    /// Checks names and amounts.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` describing the first problem found.
    pub fn validate(&self) -> Result<(), SheetsError> {
        if self.client.trim().is_empty() {
            return Err(invalid("client name is empty"));
        }
        if self.designer.as_deref().is_some_and(|d| d.trim().is_empty()) {
            return Err(invalid("designer name is empty"));
        }
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(invalid("order amount must be positive"));
        }
        if self.paid < 0.0 {
            return Err(invalid("paid amount cannot be negative"));
        }
        match self.pay {
            DesignerPay::Percent(p) if !(0.0..=100.0).contains(&p) => {
                Err(invalid("designer percent must be between 0 and 100"))
            }
            DesignerPay::Fixed(sum) if sum < 0.0 || sum > self.amount => {
                Err(invalid("designer share must be between 0 and the order amount"))
            }
            _ if self.designer.is_none() && self.pay.share(self.amount) > 0.0 => {
                Err(invalid("a designer share needs a designer"))
            }
            _ => Ok(()),
        }
    }

    #[must_use]
    pub fn designer_share(&self) -> f64 {
        if self.designer.is_none() {
            return 0.0;
        }
        self.pay.share(self.amount)
    }

    #[must_use]
    pub fn debt(&self) -> f64 {
        round2((self.amount - self.paid).max(0.0))
    }

    #[must_use]
    pub fn agency_income(&self) -> f64 {
        round2(self.amount - self.designer_share())
    }
}

/// What [`Ledger::record_order`] wrote.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderReceipt {
    pub operation_id: Uuid,
    pub designer_share: f64,
    pub agency_income: f64,
    pub debt: f64,
}

/// One order row in CLIENTS.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientOrder {
    pub row: u32,
    /// Column A of the row, the operation that wrote the order.
    pub operation_id: String,
    pub date: String,
    pub client: String,
    pub status: String,
    pub amount: f64,
    pub paid: f64,
    pub debt: f64,
}

/// Per-client totals over CLIENTS.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientDebt {
    pub client: String,
    pub orders_count: u32,
    pub total_amount: f64,
    pub total_paid: f64,
    pub total_debt: f64,
}

impl ClientDebt {
    /// Debt at or below this counts as settled.
    pub const THRESHOLD: f64 = EPSILON;

    /// Whether the client still owes anything beyond rounding noise.
    #[must_use]
    pub fn owes(&self) -> bool {
        self.total_debt > Self::THRESHOLD
    }
}

/// Per-designer totals over DESIGNERS and payouts in EXPENSES.
#[derive(Debug, Clone, PartialEq)]
pub struct DesignerEarnings {
    pub designer: String,
    pub orders_count: u32,
    pub total_amount: f64,
    pub total_earnings: f64,
    pub paid_out: f64,
}

impl DesignerEarnings {
    /// Earned but not yet paid out.
    #[must_use]
    pub fn balance(&self) -> f64 {
        round2(self.total_earnings - self.paid_out)
    }
}

/// Expense total of one category.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryTotal {
    pub category: String,
    pub count: u32,
    pub total: f64,
}

/// Figures for `/summary`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Summary {
    pub orders_count: u32,
    pub revenue: f64,
    pub received: f64,
    pub outstanding: f64,
    pub designer_shares: f64,
    pub expenses: f64,
    pub payouts: f64,
}

impl Summary {
    /// Revenue minus designer shares and expenses.
    #[must_use]
    pub fn profit(&self) -> f64 {
        round2(self.revenue - self.designer_shares - self.expenses)
    }
}

/// Part of a payment applied to one order.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentAllocation {
    pub row: u32,
    pub order_id: String,
    pub date: String,
    pub applied: f64,
    pub remaining_debt: f64,
}

/// What [`Ledger::record_payment`] did.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentResult {
    pub operation_id: Uuid,
    pub allocations: Vec<PaymentAllocation>,
    pub overpaid: f64,
    /// Client debt left after the payment.
    pub remaining_debt: f64,
}

impl PaymentResult {
    #[must_use]
    pub fn applied(&self) -> f64 {
        round2(self.allocations.iter().map(|a| a.applied).sum())
    }
}

/// Client reliability lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListStatus {
    Whitelist,
    Blacklist,
}

impl ListStatus {
    #[must_use]
    pub const fn sheet(self) -> SheetKind {
        match self {
            Self::Whitelist => SheetKind::Whitelist,
            Self::Blacklist => SheetKind::Blacklist,
        }
    }

    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::Whitelist => Self::Blacklist,
            Self::Blacklist => Self::Whitelist,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Whitelist => "whitelist",
            Self::Blacklist => "blacklist",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "whitelist" | "white" => Some(Self::Whitelist),
            "blacklist" | "black" => Some(Self::Blacklist),
            _ => None,
        }
    }
}

impl fmt::Display for ListStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rows cleared by [`Ledger::undo`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UndoReport {
    pub cleared: Vec<(SheetKind, usize)>,
    /// CLIENTS rows whose paid amount was restored.
    pub reverted_payments: usize,
}

impl UndoReport {
    #[must_use]
    pub fn total_rows(&self) -> usize {
        self.cleared.iter().map(|(_, n)| n).sum()
    }
}

/// Everything the local cache keeps.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DirectorySnapshot {
    pub clients: Vec<String>,
    pub designers: Vec<String>,
    pub list_status: Vec<(String, ListStatus)>,
    pub debts: Vec<ClientDebt>,
    pub rows_read: usize,
}

/// A non-empty data row of a tab.
#[derive(Debug, Clone)]
struct DataRow {
    number: u32,
    cells: Vec<Value>,
}

impl DataRow {
    fn text(&self, column: char) -> String {
        cell_text(cell(&self.cells, column))
    }

    fn number(&self, column: char) -> f64 {
        cell_number(cell(&self.cells, column)).unwrap_or(0.0)
    }

    fn date(&self, column: char) -> String {
        sheet_date_text(cell(&self.cells, column))
    }
}

fn invalid(message: &str) -> SheetsError {
    SheetsError::InvalidInput(message.to_owned())
}

fn clean_name(raw: &str, what: &str) -> Result<String, SheetsError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(SheetsError::InvalidInput(format!("{what} name is empty")));
    }
    Ok(name.to_owned())
}

fn positive(amount: f64, what: &str) -> Result<f64, SheetsError> {
    if amount.is_finite() && amount > 0.0 {
        Ok(round2(amount))
    } else {
        Err(SheetsError::InvalidInput(format!("{what} must be positive")))
    }
}

fn same_name(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

fn today_local() -> NaiveDate {
    Local::now().date_naive()
}

/// Bookkeeping operations over a [`ValuesApi`].
pub struct Ledger<A: ValuesApi> {
    api: A,
    clock: fn() -> NaiveDate,
}

impl<A: ValuesApi> Ledger<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            clock: today_local,
        }
    }

    /// Uses `clock` instead of the local date.
    #[must_use]
    pub fn with_clock(mut self, clock: fn() -> NaiveDate) -> Self {
        self.clock = clock;
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    fn today(&self) -> NaiveDate {
        (self.clock)()
    }

    fn today_text(&self) -> Value {
        text(format_sheet_date(self.today()))
    }

    // ---- writes ---------------------------------------------------------

    /// Records an order in DESIGNERS (when a designer is set), CLIENTS and
    /// GENERAL under one operation ID.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for bad input and `WriteFailed` if any write
    /// failed; in that case the rows already written were cleared.
    pub async fn record_order(&self, order: &NewOrder) -> Result<OrderReceipt, SheetsError> {
        order.validate()?;

        let client = order.client.trim().to_owned();
        let designer = order.designer.as_deref().map(str::trim).map(str::to_owned);
        let share = order.designer_share();
        let debt = order.debt();
        let income = order.agency_income();
        let status = if debt > EPSILON { STATUS_DEBT } else { STATUS_PAID };
        let date = self.today_text();

        let mut tx = SheetTransaction::new(&self.api);

        if let Some(designer) = &designer {
            tx.add_row(
                SheetKind::Designers,
                vec![
                    date.clone(),
                    text(designer.as_str()),
                    text(client.as_str()),
                    money(order.amount),
                    money(order.pay.percent(order.amount)),
                    money(share),
                ],
            );
        }

        tx.add_row(
            SheetKind::Clients,
            vec![
                date.clone(),
                text(client.as_str()),
                text(status),
                money(order.amount),
                money(order.paid),
                money(debt),
            ],
        );

        tx.add_row(
            SheetKind::General,
            vec![
                date,
                text(EntryKind::Order.as_str()),
                text(designer.unwrap_or_default()),
                text(client.as_str()),
                money(order.amount),
                money(order.paid),
                money(debt),
                money(share),
                money(income),
                text(""),
                text(""),
            ],
        );

        let operation_id = tx.commit().await.into_result()?;
        info!(
            "Recorded order for '{}' ({:.2}, debt {:.2}) as {}",
            client, order.amount, debt, operation_id
        );

        Ok(OrderReceipt {
            operation_id,
            designer_share: share,
            agency_income: income,
            debt,
        })
    }

    /// Records an agency expense in EXPENSES and GENERAL.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for bad input and `WriteFailed` on write errors.
    pub async fn record_expense(&self, category: &str, amount: f64) -> Result<Uuid, SheetsError> {
        let category = clean_name(category, "category")?;
        let amount = positive(amount, "expense amount")?;
        let date = self.today_text();

        let mut tx = SheetTransaction::new(&self.api);
        tx.add_row(
            SheetKind::Expenses,
            vec![date.clone(), text(category.as_str()), money(amount), text("")],
        );
        tx.add_row(
            SheetKind::General,
            general_cash_row(date, EntryKind::Expense, "", amount, &category),
        );

        let operation_id = tx.commit().await.into_result()?;
        info!("Recorded expense '{}' {:.2} as {}", category, amount, operation_id);
        Ok(operation_id)
    }

    /// Records a payout to a designer in EXPENSES and GENERAL.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for bad input and `WriteFailed` on write errors.
    pub async fn record_payout(&self, designer: &str, amount: f64) -> Result<Uuid, SheetsError> {
        let designer = clean_name(designer, "designer")?;
        let amount = positive(amount, "payout amount")?;
        let date = self.today_text();

        let mut tx = SheetTransaction::new(&self.api);
        tx.add_row(
            SheetKind::Expenses,
            vec![
                date.clone(),
                text(PAYOUT_CATEGORY),
                money(amount),
                text(designer.as_str()),
            ],
        );
        tx.add_row(
            SheetKind::General,
            general_cash_row(date, EntryKind::Payout, &designer, amount, ""),
        );

        let operation_id = tx.commit().await.into_result()?;
        info!("Recorded payout to '{}' {:.2} as {}", designer, amount, operation_id);
        Ok(operation_id)
    }

    /// Applies a client payment to their orders, oldest first.
    ///
    /// Each touched CLIENTS row gets its paid amount raised, its debt
    /// lowered and its status updated. Whatever exceeds the total debt is
    /// reported as overpayment. The payment is journaled in GENERAL.
    ///
    /// # Errors
    ///
    /// Returns `NoOutstandingDebt` if the client owes nothing. On a write
    /// failure the rows already updated are restored.
    pub async fn record_payment(&self, client: &str, amount: f64) -> Result<PaymentResult, SheetsError> {
        let client = clean_name(client, "client")?;
        let amount = positive(amount, "payment amount")?;

        let orders: Vec<ClientOrder> = self
            .client_orders(&client)
            .await?
            .into_iter()
            .filter(|o| o.debt > EPSILON)
            .collect();

        if orders.is_empty() {
            return Err(SheetsError::NoOutstandingDebt(client));
        }

        let total_debt: f64 = orders.iter().map(|o| o.debt).sum();
        let mut remaining = amount;
        let mut allocations = Vec::new();
        let mut touched: Vec<&ClientOrder> = Vec::new();

        for order in &orders {
            if remaining <= EPSILON {
                break;
            }
            let applied = round2(remaining.min(order.debt));
            remaining = round2(remaining - applied);
            let new_debt = round2(order.debt - applied);

            let update = self
                .write_client_payment(order, round2(order.paid + applied), new_debt)
                .await;
            if let Err(e) = update {
                self.restore_orders(touched).await;
                return Err(e);
            }
            touched.push(order);

            allocations.push(PaymentAllocation {
                row: order.row,
                order_id: order.operation_id.clone(),
                date: order.date.clone(),
                applied,
                remaining_debt: new_debt,
            });
        }

        let result = PaymentResult {
            operation_id: Uuid::new_v4(),
            overpaid: round2(remaining.max(0.0)),
            remaining_debt: round2((total_debt - amount).max(0.0)),
            allocations,
        };

        let journal = vec![
            self.today_text(),
            text(EntryKind::Payment.as_str()),
            text(""),
            text(client.as_str()),
            money(amount),
            money(result.applied()),
            money(result.remaining_debt),
            text(""),
            text(""),
            text(""),
            text(allocation_note(&result)),
        ];

        if let Err(e) = write_row(&self.api, SheetKind::General, result.operation_id, &journal).await {
            self.restore_orders(touched).await;
            return Err(SheetsError::WriteFailed {
                sheet: SheetKind::General,
                reason: e.to_string(),
            });
        }

        info!(
            "Recorded payment {:.2} from '{}' over {} order(s), overpaid {:.2}",
            amount,
            client,
            result.allocations.len(),
            result.overpaid
        );
        Ok(result)
    }

    async fn write_client_payment(&self, order: &ClientOrder, paid: f64, debt: f64) -> Result<(), SheetsError> {
        let status = if debt > EPSILON { STATUS_DEBT } else { STATUS_PAID };
        let range = a1_range(clients::STATUS, order.row, clients::DEBT, order.row);
        self.api
            .update_range(
                SheetKind::Clients,
                &range,
                vec![vec![text(status), money(order.amount), money(paid), money(debt)]],
            )
            .await
    }

    async fn restore_orders<'a>(&self, orders: impl IntoIterator<Item = &'a ClientOrder>) {
        for order in orders {
            if let Err(e) = self.write_client_payment(order, order.paid, order.debt).await {
                warn!("Could not restore CLIENTS row {}: {}", order.row, e);
            }
        }
    }

    /// Clears every row written by `operation_id` in all tabs.
    ///
    /// Payments are reverted on the CLIENTS rows they were applied to, then
    /// their journal row is cleared before any other tab. A failure in
    /// either step puts the reverted rows back, so the undo can be retried.
    ///
    /// # Errors
    ///
    /// Propagates read, write and clear failures.
    pub async fn undo(&self, operation_id: Uuid) -> Result<UndoReport, SheetsError> {
        let reverted = self.revert_payment(operation_id).await?;
        let journal = match clear_rows_by_operation_id(&self.api, SheetKind::General, operation_id).await {
            Ok(cleared) => cleared,
            Err(e) => {
                self.restore_orders(&reverted).await;
                return Err(e);
            }
        };

        let mut report = UndoReport {
            reverted_payments: reverted.len(),
            ..UndoReport::default()
        };
        if journal > 0 {
            report.cleared.push((SheetKind::General, journal));
        }

        for sheet in SheetKind::ALL.into_iter().filter(|s| *s != SheetKind::General) {
            let cleared = clear_rows_by_operation_id(&self.api, sheet, operation_id).await?;
            if cleared > 0 {
                report.cleared.push((sheet, cleared));
            }
        }

        if report.total_rows() == 0 {
            warn!("Undo found no rows for operation {}", operation_id);
        } else {
            info!("Undid operation {} ({} rows)", operation_id, report.total_rows());
        }
        Ok(report)
    }

    /// Takes a payment back off the orders it was applied to.
    ///
    /// Returns the orders as they were before the revert. Rows that now
    /// hold a different order are left alone.
    async fn revert_payment(&self, operation_id: Uuid) -> Result<Vec<ClientOrder>, SheetsError> {
        let mut reverted = Vec::new();
        for row in find_rows_by_operation_id(&self.api, SheetKind::General, operation_id).await? {
            let range = a1_range('A', row, general::NOTE, row);
            let cells = match self.api.get_range(SheetKind::General, &range).await {
                Ok(cells) => cells,
                Err(e) => {
                    self.restore_orders(&reverted).await;
                    return Err(e);
                }
            };
            let Some(cells) = cells.into_iter().next() else {
                continue;
            };
            if cell_text(cell(&cells, general::KIND)) != EntryKind::Payment.as_str() {
                continue;
            }

            for allocation in parse_allocation_note(&cell_text(cell(&cells, general::NOTE))) {
                match self.revert_allocation(&allocation).await {
                    Ok(Some(order)) => reverted.push(order),
                    Ok(None) => {}
                    Err(e) => {
                        self.restore_orders(&reverted).await;
                        return Err(e);
                    }
                }
            }
        }
        Ok(reverted)
    }

    async fn revert_allocation(&self, allocation: &NoteAllocation) -> Result<Option<ClientOrder>, SheetsError> {
        let row = allocation.row;
        let range = a1_range('A', row, clients::DEBT, row);
        let Some(cells) = self.api.get_range(SheetKind::Clients, &range).await?.into_iter().next() else {
            warn!("CLIENTS row {} is empty, payment share {:.2} not reverted", row, allocation.applied);
            return Ok(None);
        };
        let order = client_order(&DataRow { number: row, cells });

        let owner_changed = allocation
            .order_id
            .as_deref()
            .is_some_and(|id| id != order.operation_id);
        if owner_changed || order.client.is_empty() {
            warn!(
                "CLIENTS row {} now holds another order, payment share {:.2} not reverted",
                row, allocation.applied
            );
            return Ok(None);
        }

        let paid = round2((order.paid - allocation.applied).max(0.0));
        let debt = round2(order.debt + allocation.applied);
        self.write_client_payment(&order, paid, debt).await?;
        Ok(Some(order))
    }

    // ---- reads ----------------------------------------------------------

    /// Non-empty data rows of a tab, read from column A.
    async fn read_rows(&self, sheet: SheetKind) -> Result<Vec<DataRow>, SheetsError> {
        let layout = sheet.layout();
        let range = a1_range(
            layout.id_column,
            layout.start_row,
            layout.data_end,
            layout.scan_end_row(),
        );
        let rows = self.api.get_range(sheet, &range).await?;

        Ok(rows
            .into_iter()
            .zip(layout.start_row..)
            .map(|(cells, number)| DataRow { number, cells })
            .filter(|row| !row.text(layout.check_column).is_empty())
            .collect())
    }

    /// Orders of a client, oldest first.
    ///
    /// # Errors
    ///
    /// Propagates read failures.
    pub async fn client_orders(&self, client: &str) -> Result<Vec<ClientOrder>, SheetsError> {
        let year = self.today().year();
        let mut orders: Vec<ClientOrder> = self
            .read_rows(SheetKind::Clients)
            .await?
            .iter()
            .filter(|row| same_name(&row.text(clients::CLIENT), client))
            .map(client_order)
            .collect();

        orders.sort_by_key(|o| date_sort_key(&o.date, year));
        Ok(orders)
    }

    /// Per-client totals for orders dated inside `period`, largest debt first.
    ///
    /// # Errors
    ///
    /// Propagates read failures.
    pub async fn clients_with_debts(&self, period: Period) -> Result<Vec<ClientDebt>, SheetsError> {
        let rows = self.read_rows(SheetKind::Clients).await?;
        Ok(aggregate_debts(&rows, period, self.today()))
    }

    /// Clients that owe money, over all time.
    ///
    /// # Errors
    ///
    /// Propagates read failures.
    pub async fn debtors(&self) -> Result<Vec<ClientDebt>, SheetsError> {
        Ok(self
            .clients_with_debts(Period::All)
            .await?
            .into_iter()
            .filter(ClientDebt::owes)
            .collect())
    }

    /// Per-designer earnings and payouts inside `period`, highest earnings first.
    ///
    /// # Errors
    ///
    /// Propagates read failures.
    pub async fn designers_with_earnings(&self, period: Period) -> Result<Vec<DesignerEarnings>, SheetsError> {
        let today = self.today();
        let designer_rows = self.read_rows(SheetKind::Designers).await?;
        let expense_rows = self.read_rows(SheetKind::Expenses).await?;

        let mut by_name: BTreeMap<String, DesignerEarnings> = BTreeMap::new();

        for row in designer_rows.iter().filter(|r| period.contains(&r.date(designers::DATE), today)) {
            let name = row.text(designers::DESIGNER);
            let amount = row.number(designers::AMOUNT);
            let entry = by_name
                .entry(name.to_lowercase())
                .or_insert_with(|| empty_earnings(&name));
            entry.orders_count += 1;
            entry.total_amount = round2(entry.total_amount + amount);
            entry.total_earnings = round2(entry.total_earnings + designer_earning(row));
        }

        for row in payout_rows(&expense_rows).filter(|r| period.contains(&r.date(expenses::DATE), today)) {
            let name = row.text(expenses::DESIGNER);
            let entry = by_name
                .entry(name.to_lowercase())
                .or_insert_with(|| empty_earnings(&name));
            entry.paid_out = round2(entry.paid_out + row.number(expenses::AMOUNT));
        }

        let mut result: Vec<_> = by_name.into_values().collect();
        result.sort_by(|a, b| b.total_earnings.total_cmp(&a.total_earnings));
        Ok(result)
    }

    /// Agency expenses (payouts excluded) grouped by category, largest first.
    ///
    /// # Errors
    ///
    /// Propagates read failures.
    pub async fn expenses_by_category(&self, period: Period) -> Result<Vec<CategoryTotal>, SheetsError> {
        let today = self.today();
        let rows = self.read_rows(SheetKind::Expenses).await?;

        let mut by_category: BTreeMap<String, CategoryTotal> = BTreeMap::new();
        for row in rows
            .iter()
            .filter(|r| r.text(expenses::DESIGNER).is_empty())
            .filter(|r| period.contains(&r.date(expenses::DATE), today))
        {
            let mut category = row.text(expenses::CATEGORY);
            if category.is_empty() {
                category = "other".to_owned();
            }
            let entry = by_category
                .entry(category.to_lowercase())
                .or_insert_with(|| CategoryTotal {
                    category,
                    count: 0,
                    total: 0.0,
                });
            entry.count += 1;
            entry.total = round2(entry.total + row.number(expenses::AMOUNT));
        }

        let mut result: Vec<_> = by_category.into_values().collect();
        result.sort_by(|a, b| b.total.total_cmp(&a.total));
        Ok(result)
    }

    /// Revenue, debt, shares and expenses inside `period`.
    ///
    /// # Errors
    ///
    /// Propagates read failures.
    pub async fn summary(&self, period: Period) -> Result<Summary, SheetsError> {
        let today = self.today();
        let mut summary = Summary::default();

        for debt in self.clients_with_debts(period).await? {
            summary.orders_count += debt.orders_count;
            summary.revenue += debt.total_amount;
            summary.received += debt.total_paid;
            summary.outstanding += debt.total_debt;
        }

        for row in self
            .read_rows(SheetKind::Designers)
            .await?
            .iter()
            .filter(|r| period.contains(&r.date(designers::DATE), today))
        {
            summary.designer_shares += designer_earning(row);
        }

        for row in self
            .read_rows(SheetKind::Expenses)
            .await?
            .iter()
            .filter(|r| period.contains(&r.date(expenses::DATE), today))
        {
            if row.text(expenses::DESIGNER).is_empty() {
                summary.expenses += row.number(expenses::AMOUNT);
            } else {
                summary.payouts += row.number(expenses::AMOUNT);
            }
        }

        summary.revenue = round2(summary.revenue);
        summary.received = round2(summary.received);
        summary.outstanding = round2(summary.outstanding);
        summary.designer_shares = round2(summary.designer_shares);
        summary.expenses = round2(summary.expenses);
        summary.payouts = round2(summary.payouts);
        Ok(summary)
    }

    /// Unique client names from CLIENTS and both lists.
    ///
    /// # Errors
    ///
    /// Propagates read failures.
    pub async fn all_clients(&self) -> Result<Vec<String>, SheetsError> {
        let mut names: Vec<String> = self
            .read_rows(SheetKind::Clients)
            .await?
            .iter()
            .map(|r| r.text(clients::CLIENT))
            .collect();
        for status in [ListStatus::Whitelist, ListStatus::Blacklist] {
            names.extend(self.list_entries(status).await?);
        }
        Ok(unique_sorted(names))
    }

    /// Unique designer names from DESIGNERS and payouts.
    ///
    /// # Errors
    ///
    /// Propagates read failures.
    pub async fn all_designers(&self) -> Result<Vec<String>, SheetsError> {
        let mut names: Vec<String> = self
            .read_rows(SheetKind::Designers)
            .await?
            .iter()
            .map(|r| r.text(designers::DESIGNER))
            .collect();
        let expense_rows = self.read_rows(SheetKind::Expenses).await?;
        names.extend(payout_rows(&expense_rows).map(|r| r.text(expenses::DESIGNER)));
        Ok(unique_sorted(names))
    }

    // ---- lists ----------------------------------------------------------

    /// Clients on a list, in sheet order.
    ///
    /// # Errors
    ///
    /// Propagates read failures.
    pub async fn list_entries(&self, status: ListStatus) -> Result<Vec<String>, SheetsError> {
        Ok(self
            .read_rows(status.sheet())
            .await?
            .iter()
            .map(|r| r.text(lists::CLIENT))
            .collect())
    }

    /// The list a client is on, if any. Blacklist wins if both contain it.
    ///
    /// # Errors
    ///
    /// Propagates read failures.
    pub async fn list_status(&self, client: &str) -> Result<Option<ListStatus>, SheetsError> {
        for status in [ListStatus::Blacklist, ListStatus::Whitelist] {
            if self
                .list_entries(status)
                .await?
                .iter()
                .any(|name| same_name(name, client))
            {
                return Ok(Some(status));
            }
        }
        Ok(None)
    }

    /// Puts a client on `status`, removing it from the other list.
    ///
    /// Returns `false` if the client was already on that list.
    ///
    /// # Errors
    ///
    /// Propagates read and write failures.
    pub async fn set_list_status(&self, client: &str, status: ListStatus) -> Result<bool, SheetsError> {
        let client = clean_name(client, "client")?;
        self.remove_from_list(&client, status.other()).await?;

        if self
            .list_entries(status)
            .await?
            .iter()
            .any(|name| same_name(name, &client))
        {
            return Ok(false);
        }

        write_row(
            &self.api,
            status.sheet(),
            Uuid::new_v4(),
            &[text(client.as_str()), self.today_text()],
        )
        .await?;
        info!("Moved client '{}' to {}", client, status);
        Ok(true)
    }

    /// Removes a client from both lists; returns `false` if it was on neither.
    ///
    /// # Errors
    ///
    /// Propagates read and clear failures.
    pub async fn remove_from_lists(&self, client: &str) -> Result<bool, SheetsError> {
        let client = clean_name(client, "client")?;
        let mut removed = 0;
        for status in [ListStatus::Whitelist, ListStatus::Blacklist] {
            removed += self.remove_from_list(&client, status).await?;
        }
        if removed > 0 {
            info!("Removed client '{}' from lists", client);
        }
        Ok(removed > 0)
    }

    async fn remove_from_list(&self, client: &str, status: ListStatus) -> Result<usize, SheetsError> {
        let sheet = status.sheet();
        let layout = sheet.layout();
        let rows: Vec<u32> = self
            .read_rows(sheet)
            .await?
            .iter()
            .filter(|r| same_name(&r.text(lists::CLIENT), client))
            .map(|r| r.number)
            .collect();

        for row in &rows {
            let range = a1_range(layout.id_column, *row, layout.data_end, *row);
            self.api.clear_range(sheet, &range).await?;
        }
        Ok(rows.len())
    }

    // ---- cache ----------------------------------------------------------

    /// Reads what the local cache stores, one read per tab.
    ///
    /// # Errors
    ///
    /// Propagates read failures.
    pub async fn snapshot(&self) -> Result<DirectorySnapshot, SheetsError> {
        let today = self.today();
        let client_rows = self.read_rows(SheetKind::Clients).await?;
        let designer_rows = self.read_rows(SheetKind::Designers).await?;
        let expense_rows = self.read_rows(SheetKind::Expenses).await?;
        let white_rows = self.read_rows(SheetKind::Whitelist).await?;
        let black_rows = self.read_rows(SheetKind::Blacklist).await?;

        let mut list_status: BTreeMap<String, (String, ListStatus)> = BTreeMap::new();
        for (rows, status) in [
            (&white_rows, ListStatus::Whitelist),
            (&black_rows, ListStatus::Blacklist),
        ] {
            for row in rows {
                let name = row.text(lists::CLIENT);
                list_status.insert(name.to_lowercase(), (name, status));
            }
        }

        let clients = unique_sorted(
            client_rows
                .iter()
                .map(|r| r.text(clients::CLIENT))
                .chain(list_status.values().map(|(name, _)| name.clone()))
                .collect(),
        );
        let designers = unique_sorted(
            designer_rows
                .iter()
                .map(|r| r.text(designers::DESIGNER))
                .chain(payout_rows(&expense_rows).map(|r| r.text(expenses::DESIGNER)))
                .collect(),
        );

        Ok(DirectorySnapshot {
            clients,
            designers,
            list_status: list_status.into_values().collect(),
            debts: aggregate_debts(&client_rows, Period::All, today),
            rows_read: client_rows.len()
                + designer_rows.len()
                + expense_rows.len()
                + white_rows.len()
                + black_rows.len(),
        })
    }
}

/// GENERAL row for a cash movement (expense or payout).
fn general_cash_row(date: Value, kind: EntryKind, designer: &str, amount: f64, note: &str) -> Vec<Value> {
    vec![
        date,
        text(kind.as_str()),
        text(designer),
        text(""),
        text(""),
        text(""),
        text(""),
        text(""),
        text(""),
        money(amount),
        text(note),
    ]
}

fn client_order(row: &DataRow) -> ClientOrder {
    let amount = row.number(clients::AMOUNT);
    let paid = row.number(clients::PAID);
    let debt = cell_number(cell(&row.cells, clients::DEBT))
        .unwrap_or_else(|| round2((amount - paid).max(0.0)));

    ClientOrder {
        row: row.number,
        operation_id: row.text('A'),
        date: row.date(clients::DATE),
        client: row.text(clients::CLIENT),
        status: row.text(clients::STATUS),
        amount,
        paid,
        debt,
    }
}

/// Share of one DESIGNERS row; falls back to amount × percent.
///
/// Percentages below 1 are read as fractions (`0.4` = 40 %).
fn designer_earning(row: &DataRow) -> f64 {
    let share = row.number(designers::SHARE);
    if share > 0.0 {
        return share;
    }
    let amount = row.number(designers::AMOUNT);
    let percent = row.number(designers::PERCENT);
    if percent <= 0.0 || amount <= 0.0 {
        0.0
    } else if percent < 1.0 {
        round2(amount * percent)
    } else {
        round2(amount * percent / 100.0)
    }
}

fn empty_earnings(name: &str) -> DesignerEarnings {
    DesignerEarnings {
        designer: name.to_owned(),
        orders_count: 0,
        total_amount: 0.0,
        total_earnings: 0.0,
        paid_out: 0.0,
    }
}

fn payout_rows(rows: &[DataRow]) -> impl Iterator<Item = &DataRow> {
    rows.iter().filter(|r| !r.text(expenses::DESIGNER).is_empty())
}

fn aggregate_debts(rows: &[DataRow], period: Period, today: NaiveDate) -> Vec<ClientDebt> {
    let mut by_client: BTreeMap<String, ClientDebt> = BTreeMap::new();

    for row in rows.iter().filter(|r| period.contains(&r.date(clients::DATE), today)) {
        let order = client_order(row);
        let entry = by_client
            .entry(order.client.to_lowercase())
            .or_insert_with(|| ClientDebt {
                client: order.client.clone(),
                orders_count: 0,
                total_amount: 0.0,
                total_paid: 0.0,
                total_debt: 0.0,
            });
        entry.orders_count += 1;
        entry.total_amount = round2(entry.total_amount + order.amount);
        entry.total_paid = round2(entry.total_paid + order.paid);
        entry.total_debt = round2(entry.total_debt + order.debt);
    }

    let mut result: Vec<_> = by_client.into_values().collect();
    result.sort_by(|a, b| b.total_debt.total_cmp(&a.total_debt));
    result
}

/// Deduplicates case-insensitively, keeping the first spelling, sorted.
fn unique_sorted(names: Vec<String>) -> Vec<String> {
    let mut seen: BTreeMap<String, String> = BTreeMap::new();
    for name in names {
        let name = name.trim().to_owned();
        if !name.is_empty() {
            seen.entry(name.to_lowercase()).or_insert(name);
        }
    }
    seen.into_values().collect()
}

fn allocation_note(result: &PaymentResult) -> String {
    let parts: Vec<String> = result
        .allocations
        .iter()
        .map(|a| format!("{}:{}={:.2}", a.row, a.order_id, a.applied))
        .collect();
    let mut note = format!("{ALLOCATION_PREFIX}{}", parts.join(","));
    if result.overpaid > EPSILON {
        note.push_str(&format!("; overpaid {:.2}", result.overpaid));
    }
    note
}

/// One `row:order=applied` entry of an allocation note.
#[derive(Debug, Clone, PartialEq)]
struct NoteAllocation {
    row: u32,
    /// Absent in notes written before order ids were recorded.
    order_id: Option<String>,
    applied: f64,
}

/// Parses `fifo 5:<id>=100.00,7:<id>=50.00; ...` into allocations.
fn parse_allocation_note(note: &str) -> Vec<NoteAllocation> {
    let Some(rest) = note.strip_prefix(ALLOCATION_PREFIX) else {
        return Vec::new();
    };
    let allocations = rest.split(';').next().unwrap_or_default();

    allocations
        .split(',')
        .filter_map(|part| {
            let (target, applied) = part.trim().split_once('=')?;
            let (row, order_id) = match target.split_once(':') {
                Some((row, id)) => (row, Some(id.to_owned())),
                None => (target, None),
            };
            Some(NoteAllocation {
                row: row.parse().ok()?,
                order_id,
                applied: applied.parse().ok()?,
            })
        })
        .collect()
}
