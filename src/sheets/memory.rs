//! In-memory `ValuesApi` used by the ledger tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use serde_json::Value;

use super::SheetsError;
use super::values::{Rows, ValuesApi, column_index};
use crate::config::SheetKind;

/// Parsed `A2:G502` range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct A1 {
    start_col: usize,
    start_row: u32,
    end_col: usize,
    end_row: u32,
}

fn parse_cell(cell: &str) -> Option<(usize, u32)> {
    let mut chars = cell.chars();
    let column = chars.next().filter(char::is_ascii_alphabetic)?;
    let row = chars.as_str().parse().ok()?;
    Some((column_index(column), row))
}

fn parse_a1(range: &str) -> Option<A1> {
    let (start, end) = range.split_once(':')?;
    let (start_col, start_row) = parse_cell(start)?;
    let (end_col, end_row) = parse_cell(end)?;
    Some(A1 {
        start_col,
        start_row,
        end_col,
        end_row,
    })
}

fn bad_range(range: &str) -> SheetsError {
    SheetsError::InvalidInput(format!("bad range {range}"))
}

/// Spreadsheet grid kept in memory, one row map per tab.
#[derive(Debug, Default)]
pub struct MemorySheets {
    grid: Mutex<HashMap<SheetKind, BTreeMap<u32, Vec<Value>>>>,
    failing: Mutex<HashSet<SheetKind>>,
    failing_rows: Mutex<HashSet<(SheetKind, u32)>>,
}

impl MemorySheets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores text cells starting at column A.
    pub fn put(&self, sheet: SheetKind, row: u32, cells: &[&str]) {
        let values = cells.iter().map(|c| Value::String((*c).to_owned())).collect();
        self.put_values(sheet, row, values);
    }

    /// Stores raw cells starting at column A.
    pub fn put_values(&self, sheet: SheetKind, row: u32, cells: Vec<Value>) {
        self.grid
            .lock()
            .unwrap()
            .entry(sheet)
            .or_default()
            .insert(row, cells);
    }

    /// Returns a cell, `Null` when absent.
    pub fn cell(&self, sheet: SheetKind, row: u32, column: char) -> Value {
        self.grid
            .lock()
            .unwrap()
            .get(&sheet)
            .and_then(|rows| rows.get(&row))
            .and_then(|cells| cells.get(column_index(column)))
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Number of rows in a tab that hold at least one non-empty cell.
    pub fn filled_rows(&self, sheet: SheetKind) -> usize {
        self.grid.lock().unwrap().get(&sheet).map_or(0, |rows| {
            rows.values()
                .filter(|cells| cells.iter().any(|c| !is_empty(c)))
                .count()
        })
    }

    /// Makes every update of `sheet` fail.
    pub fn fail_updates(&self, sheet: SheetKind) {
        self.failing.lock().unwrap().insert(sheet);
    }

    /// Makes updates starting at `row` of `sheet` fail.
    pub fn fail_updates_at(&self, sheet: SheetKind, row: u32) {
        self.failing_rows.lock().unwrap().insert((sheet, row));
    }

    /// Lifts every injected failure.
    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
        self.failing_rows.lock().unwrap().clear();
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

impl ValuesApi for MemorySheets {
    async fn get_range(&self, sheet: SheetKind, range: &str) -> Result<Rows, SheetsError> {
        let a1 = parse_a1(range).ok_or_else(|| bad_range(range))?;
        let grid = self.grid.lock().unwrap();
        let rows = grid.get(&sheet);

        let mut out: Rows = (a1.start_row..=a1.end_row)
            .map(|number| {
                let mut cells: Vec<Value> = rows
                    .and_then(|r| r.get(&number))
                    .map(|cells| {
                        (a1.start_col..=a1.end_col)
                            .map(|c| cells.get(c).cloned().unwrap_or(Value::Null))
                            .collect()
                    })
                    .unwrap_or_default();
                while cells.last().is_some_and(is_empty) {
                    cells.pop();
                }
                cells
            })
            .collect();

        while out.last().is_some_and(Vec::is_empty) {
            out.pop();
        }
        Ok(out)
    }

    async fn update_range(&self, sheet: SheetKind, range: &str, rows: Rows) -> Result<(), SheetsError> {
        let a1 = parse_a1(range).ok_or_else(|| bad_range(range))?;
        if self.failing.lock().unwrap().contains(&sheet)
            || self.failing_rows.lock().unwrap().contains(&(sheet, a1.start_row))
        {
            return Err(SheetsError::Api {
                status: 500,
                message: format!("injected failure for {sheet}"),
            });
        }

        let mut grid = self.grid.lock().unwrap();
        let tab = grid.entry(sheet).or_default();

        for (number, values) in (a1.start_row..=a1.end_row).zip(rows) {
            let cells = tab.entry(number).or_default();
            for (column, value) in (a1.start_col..=a1.end_col).zip(values) {
                if cells.len() <= column {
                    cells.resize(column + 1, Value::Null);
                }
                cells[column] = value;
            }
        }
        Ok(())
    }

    async fn clear_range(&self, sheet: SheetKind, range: &str) -> Result<(), SheetsError> {
        let a1 = parse_a1(range).ok_or_else(|| bad_range(range))?;
        let mut grid = self.grid.lock().unwrap();
        if let Some(tab) = grid.get_mut(&sheet) {
            for number in a1.start_row..=a1.end_row {
                if let Some(cells) = tab.get_mut(&number) {
                    for column in a1.start_col..=a1.end_col {
                        if let Some(cell) = cells.get_mut(column) {
                            *cell = Value::Null;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_a1() {
        assert_eq!(
            parse_a1("B2:G502"),
            Some(A1 {
                start_col: 1,
                start_row: 2,
                end_col: 6,
                end_row: 502
            })
        );
        assert_eq!(parse_a1("B2"), None);
    }

    #[tokio::test]
    async fn test_get_range_trims_trailing_empties() {
        let sheets = MemorySheets::new();
        sheets.put(SheetKind::Clients, 2, &["id", "01.10.2026", "Acme"]);
        sheets.put(SheetKind::Clients, 4, &["id", "", "Beta", ""]);

        let rows = sheets.get_range(SheetKind::Clients, "C2:D10").await.unwrap();
        assert_eq!(rows, vec![vec![json!("Acme")], vec![], vec![json!("Beta")]]);
    }
}
