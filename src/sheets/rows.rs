//! Row-level primitives shared by the ledger and transactions.

use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use super::SheetsError;
use super::values::{ValuesApi, a1_range, is_blank, text};
use crate::config::SheetKind;

/// Finds the first row whose check column is empty.
///
/// # Errors
///
/// Returns `WriteFailed` if every scanned row is occupied.
pub async fn first_empty_row<A: ValuesApi>(api: &A, sheet: SheetKind) -> Result<u32, SheetsError> {
    let layout = sheet.layout();
    let range = a1_range(
        layout.check_column,
        layout.start_row,
        layout.check_column,
        layout.scan_end_row(),
    );
    let column = api.get_range(sheet, &range).await?;

    let offset = column
        .iter()
        .position(|row| is_blank(row.first()))
        .unwrap_or(column.len());

    let row = u32::try_from(offset)
        .unwrap_or(u32::MAX)
        .saturating_add(layout.start_row);
    if row > layout.scan_end_row() {
        return Err(SheetsError::WriteFailed {
            sheet,
            reason: format!("no empty row found below row {}", layout.scan_end_row()),
        });
    }

    debug!("First empty row in {} is {}", sheet, row);
    Ok(row)
}

/// Writes `values` to `row`, with the operation ID in the ID column.
///
/// `values` fill the data columns left to right; missing trailing cells are
/// written as empty strings so stale content is overwritten.
///
/// # Errors
///
/// Returns `InvalidInput` if there are more values than data columns.
pub async fn write_row_at<A: ValuesApi>(
    api: &A,
    sheet: SheetKind,
    row: u32,
    operation_id: Uuid,
    values: &[Value],
) -> Result<(), SheetsError> {
    let layout = sheet.layout();
    if values.len() > layout.data_width() {
        return Err(SheetsError::InvalidInput(format!(
            "{} values do not fit the {} data columns of {}",
            values.len(),
            layout.data_width(),
            sheet
        )));
    }

    let mut cells = Vec::with_capacity(layout.data_width() + 1);
    cells.push(text(operation_id.to_string()));
    cells.extend(values.iter().cloned());
    cells.resize(layout.data_width() + 1, text(""));

    let range = a1_range(layout.id_column, row, layout.data_end, row);
    api.update_range(sheet, &range, vec![cells]).await
}

/// Writes a row into the first empty row and returns its number.
///
/// # Errors
///
/// Propagates lookup and write failures.
pub async fn write_row<A: ValuesApi>(
    api: &A,
    sheet: SheetKind,
    operation_id: Uuid,
    values: &[Value],
) -> Result<u32, SheetsError> {
    let row = first_empty_row(api, sheet).await?;
    write_row_at(api, sheet, row, operation_id, values).await?;
    info!("Wrote {} row {} (operation {})", sheet, row, operation_id);
    Ok(row)
}

/// Row numbers whose ID column equals `operation_id`.
///
/// # Errors
///
/// Propagates read failures.
pub async fn find_rows_by_operation_id<A: ValuesApi>(
    api: &A,
    sheet: SheetKind,
    operation_id: Uuid,
) -> Result<Vec<u32>, SheetsError> {
    let layout = sheet.layout();
    let range = a1_range(
        layout.id_column,
        layout.start_row,
        layout.id_column,
        layout.scan_end_row(),
    );
    let ids = api.get_range(sheet, &range).await?;
    let wanted = operation_id.to_string();

    Ok(ids
        .iter()
        .zip(layout.start_row..)
        .filter(|(row, _)| {
            row.first()
                .and_then(Value::as_str)
                .is_some_and(|id| id.trim().eq_ignore_ascii_case(&wanted))
        })
        .map(|(_, number)| number)
        .collect())
}

/// Clears every row written by `operation_id` and returns how many were cleared.
///
/// # Errors
///
/// Propagates read and clear failures.
pub async fn clear_rows_by_operation_id<A: ValuesApi>(
    api: &A,
    sheet: SheetKind,
    operation_id: Uuid,
) -> Result<usize, SheetsError> {
    let layout = sheet.layout();
    let rows = find_rows_by_operation_id(api, sheet, operation_id).await?;

    for row in &rows {
        let range = a1_range(layout.id_column, *row, layout.data_end, *row);
        api.clear_range(sheet, &range).await?;
    }

    if !rows.is_empty() {
        info!(
            "Cleared {} row(s) of operation {} in {}",
            rows.len(),
            operation_id,
            sheet
        );
    }
    Ok(rows.len())
}

/// Writes the layout headers into row 1 if that row is empty.
///
/// Returns true if the headers were written.
///
/// # Errors
///
/// Propagates read and write failures.
pub async fn init_headers<A: ValuesApi>(api: &A, sheet: SheetKind) -> Result<bool, SheetsError> {
    let layout = sheet.layout();
    let range = a1_range(layout.id_column, 1, layout.data_end, 1);

    let existing = api.get_range(sheet, &range).await?;
    if existing.first().is_some_and(|row| row.iter().any(|v| !is_blank(Some(v)))) {
        debug!("{} already has a header row", sheet);
        return Ok(false);
    }

    let headers: Vec<Value> = layout.headers.iter().map(|h| text(*h)).collect();
    api.update_range(sheet, &range, vec![headers]).await?;
    info!("Wrote header row to {}", sheet);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::sheets::memory::MemorySheets;

    #[tokio::test]
    async fn test_first_empty_row_skips_filled_rows() {
        let sheets = MemorySheets::new();
        sheets.put(SheetKind::Clients, 2, &["x", "01.10.2026", "Acme"]);
        sheets.put(SheetKind::Clients, 3, &["y", "02.10.2026", "Beta"]);

        assert_eq!(first_empty_row(&sheets, SheetKind::Clients).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_first_empty_row_reuses_cleared_gap() {
        let sheets = MemorySheets::new();
        sheets.put(SheetKind::Clients, 2, &["x", "01.10.2026", "Acme"]);
        sheets.put(SheetKind::Clients, 4, &["y", "02.10.2026", "Beta"]);

        assert_eq!(first_empty_row(&sheets, SheetKind::Clients).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_write_find_and_clear() {
        let sheets = MemorySheets::new();
        let op = Uuid::new_v4();

        let row = write_row(&sheets, SheetKind::Expenses, op, &[json!("19.10.2026"), json!("rent"), json!(500.0)])
            .await
            .unwrap();
        assert_eq!(row, 2);
        assert_eq!(sheets.cell(SheetKind::Expenses, 2, 'C'), json!("rent"));
        assert_eq!(sheets.cell(SheetKind::Expenses, 2, 'E'), json!(""));

        let found = find_rows_by_operation_id(&sheets, SheetKind::Expenses, op).await.unwrap();
        assert_eq!(found, vec![2]);

        let cleared = clear_rows_by_operation_id(&sheets, SheetKind::Expenses, op).await.unwrap();
        assert_eq!(cleared, 1);
        assert_eq!(first_empty_row(&sheets, SheetKind::Expenses).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_write_row_rejects_too_many_values() {
        let sheets = MemorySheets::new();
        let values = vec![json!("a"); 3];
        let err = write_row(&sheets, SheetKind::Whitelist, Uuid::new_v4(), &values)
            .await
            .unwrap_err();
        assert!(matches!(err, SheetsError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_init_headers_only_fills_empty_row() {
        let sheets = MemorySheets::new();
        assert!(init_headers(&sheets, SheetKind::Expenses).await.unwrap());
        assert_eq!(
            sheets.cell(SheetKind::Expenses, 1, 'A'),
            json!(SheetKind::Expenses.layout().headers[0])
        );

        sheets.put(SheetKind::Clients, 1, &["", "My own title"]);
        assert!(!init_headers(&sheets, SheetKind::Clients).await.unwrap());
        assert_eq!(sheets.cell(SheetKind::Clients, 1, 'B'), json!("My own title"));
    }
}
