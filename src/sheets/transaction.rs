//! Multi-tab writes that either all land or are all cleared again.

use serde_json::Value;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::SheetsError;
use super::rows::{clear_rows_by_operation_id, write_row};
use super::values::ValuesApi;
use crate::config::SheetKind;

/// State of a single row write inside a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    Pending,
    Committed,
    RolledBack,
    Failed,
}

/// One row scheduled for a tab.
#[derive(Debug, Clone)]
pub struct SheetOperation {
    pub sheet: SheetKind,
    pub values: Vec<Value>,
    pub status: OperationStatus,
    /// Row number, known once written.
    pub row: Option<u32>,
}

/// Outcome of [`SheetTransaction::commit`].
#[derive(Debug)]
pub struct TransactionResult {
    pub operation_id: Uuid,
    pub operations: Vec<SheetOperation>,
    /// Tab and error of the write that failed, if any.
    pub failure: Option<(SheetKind, SheetsError)>,
}

impl TransactionResult {
    #[must_use]
    pub fn success(&self) -> bool {
        self.failure.is_none()
    }

    /// Tabs written and still in place.
    #[must_use]
    pub fn committed_sheets(&self) -> Vec<SheetKind> {
        self.operations
            .iter()
            .filter(|op| op.status == OperationStatus::Committed)
            .map(|op| op.sheet)
            .collect()
    }

    /// Converts a failed transaction into `WriteFailed`.
    ///
    /// # Errors
    ///
    /// Returns the failure of the first write that did not land.
    pub fn into_result(self) -> Result<Uuid, SheetsError> {
        match self.failure {
            None => Ok(self.operation_id),
            Some((sheet, err)) => Err(SheetsError::WriteFailed {
                sheet,
                reason: err.to_string(),
            }),
        }
    }
}

/// Rows for several tabs written under one operation ID.
///
/// Writes happen in the order rows were added. If one fails, every row
/// already written is cleared by operation ID.
pub struct SheetTransaction<'a, A: ValuesApi> {
    api: &'a A,
    operation_id: Uuid,
    operations: Vec<SheetOperation>,
}

impl<'a, A: ValuesApi> SheetTransaction<'a, A> {
    /// Starts a transaction with a fresh operation ID.
    pub fn new(api: &'a A) -> Self {
        Self::with_operation_id(api, Uuid::new_v4())
    }

    pub fn with_operation_id(api: &'a A, operation_id: Uuid) -> Self {
        Self {
            api,
            operation_id,
            operations: Vec::new(),
        }
    }

    #[must_use]
    pub fn operation_id(&self) -> Uuid {
        self.operation_id
    }

    /// Schedules a row for `sheet`; `values` fill the data columns.
    pub fn add_row(&mut self, sheet: SheetKind, values: Vec<Value>) {
        debug!("Queued {} row for operation {}", sheet, self.operation_id);
        self.operations.push(SheetOperation {
            sheet,
            values,
            status: OperationStatus::Pending,
            row: None,
        });
    }

    /// Writes all rows, rolling back on the first failure.
    pub async fn commit(mut self) -> TransactionResult {
        if self.operations.is_empty() {
            warn!("Empty transaction {}, nothing to commit", self.operation_id);
        }

        let mut failure = None;
        for op in &mut self.operations {
            match write_row(self.api, op.sheet, self.operation_id, &op.values).await {
                Ok(row) => {
                    op.row = Some(row);
                    op.status = OperationStatus::Committed;
                }
                Err(e) => {
                    error!(
                        "Write to {} failed for operation {}: {}",
                        op.sheet, self.operation_id, e
                    );
                    op.status = OperationStatus::Failed;
                    failure = Some((op.sheet, e));
                    break;
                }
            }
        }

        if failure.is_some() {
            self.rollback().await;
        } else {
            info!(
                "Committed operation {} ({} rows)",
                self.operation_id,
                self.operations.len()
            );
        }

        TransactionResult {
            operation_id: self.operation_id,
            operations: self.operations,
            failure,
        }
    }

    async fn rollback(&mut self) {
        warn!("Rolling back operation {}", self.operation_id);

        for op in self.operations.iter_mut().rev() {
            if op.status != OperationStatus::Committed {
                continue;
            }
            match clear_rows_by_operation_id(self.api, op.sheet, self.operation_id).await {
                Ok(_) => op.status = OperationStatus::RolledBack,
                // The row stays committed; it can still be removed with /undo.
                Err(e) => error!(
                    "Rollback of {} failed for operation {}: {}",
                    op.sheet, self.operation_id, e
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::sheets::memory::MemorySheets;

    #[tokio::test]
    async fn test_commit_writes_every_tab_with_same_id() {
        let sheets = MemorySheets::new();
        let mut tx = SheetTransaction::new(&sheets);
        let op = tx.operation_id();
        tx.add_row(SheetKind::Expenses, vec![json!("19.10.2026"), json!("rent"), json!(100.0)]);
        tx.add_row(SheetKind::General, vec![json!("19.10.2026"), json!("expense")]);

        let result = tx.commit().await;
        assert!(result.success());
        assert_eq!(
            result.committed_sheets(),
            vec![SheetKind::Expenses, SheetKind::General]
        );
        assert_eq!(sheets.cell(SheetKind::Expenses, 2, 'A'), json!(op.to_string()));
        assert_eq!(sheets.cell(SheetKind::General, 2, 'A'), json!(op.to_string()));
    }

    #[tokio::test]
    async fn test_failed_second_write_rolls_back_first() {
        let sheets = MemorySheets::new();
        sheets.fail_updates(SheetKind::Clients);

        let mut tx = SheetTransaction::new(&sheets);
        tx.add_row(SheetKind::Designers, vec![json!("19.10.2026"), json!("Anna")]);
        tx.add_row(SheetKind::Clients, vec![json!("19.10.2026"), json!("Acme")]);
        tx.add_row(SheetKind::General, vec![json!("19.10.2026"), json!("order")]);

        let result = tx.commit().await;
        assert!(!result.success());
        assert!(result.committed_sheets().is_empty());
        assert_eq!(result.operations[0].status, OperationStatus::RolledBack);
        assert_eq!(result.operations[1].status, OperationStatus::Failed);
        assert_eq!(result.operations[2].status, OperationStatus::Pending);

        assert_eq!(sheets.filled_rows(SheetKind::Designers), 0);
        assert_eq!(sheets.filled_rows(SheetKind::General), 0);

        let err = result.into_result().unwrap_err();
        assert!(matches!(
            err,
            SheetsError::WriteFailed {
                sheet: SheetKind::Clients,
                ..
            }
        ));
    }
}
