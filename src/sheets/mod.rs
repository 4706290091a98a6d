//! Google Sheets access and the bookkeeping built on it.

mod auth;
mod client;
mod error;
pub mod ledger;
#[cfg(test)]
pub(crate) mod memory;
pub mod period;
pub mod rows;
pub mod transaction;
pub mod values;

pub use auth::{SHEETS_SCOPE, ServiceAccountKey, TokenProvider};
pub use client::{SheetsClient, SpreadsheetInfo};
pub use error::SheetsError;
pub use ledger::{
    CategoryTotal, ClientDebt, ClientOrder, DesignerEarnings, DesignerPay, DirectorySnapshot,
    Ledger, ListStatus, NewOrder, OrderReceipt, PaymentResult, Summary, UndoReport,
};
pub use period::Period;
pub use transaction::{OperationStatus, SheetTransaction, TransactionResult};
pub use values::ValuesApi;
