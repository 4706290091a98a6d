//! Cell-level access to the spreadsheet.
//!
//! `ValuesApi` is the seam between the ledger logic and the HTTP client,
//! so the ledger can run against an in-memory grid in tests.

use std::future::Future;

use serde_json::Value;

use super::SheetsError;
use crate::config::SheetKind;

/// A rectangular block of cells as returned by the values API.
pub type Rows = Vec<Vec<Value>>;

/// Minimal values API used by the ledger.
///
/// Ranges are A1 notation without the sheet name, e.g. `B2:G502`.
pub trait ValuesApi: Send + Sync {
    /// Reads a range. Trailing empty rows and cells are omitted.
    fn get_range(
        &self,
        sheet: SheetKind,
        range: &str,
    ) -> impl Future<Output = Result<Rows, SheetsError>> + Send;

    /// Overwrites a range with the given rows.
    fn update_range(
        &self,
        sheet: SheetKind,
        range: &str,
        rows: Rows,
    ) -> impl Future<Output = Result<(), SheetsError>> + Send;

    /// Clears the values of a range.
    fn clear_range(
        &self,
        sheet: SheetKind,
        range: &str,
    ) -> impl Future<Output = Result<(), SheetsError>> + Send;
}

/// Formats an A1 range such as `A2:L502`.
#[must_use]
pub fn a1_range(start_col: char, start_row: u32, end_col: char, end_row: u32) -> String {
    format!("{start_col}{start_row}:{end_col}{end_row}")
}

/// Zero-based index of a column letter (`A` = 0).
#[must_use]
pub fn column_index(column: char) -> usize {
    (column.to_ascii_uppercase() as usize).saturating_sub('A' as usize)
}

/// Returns the cell of `row` in `column`, where the row starts at column A.
#[must_use]
pub fn cell(row: &[Value], column: char) -> Option<&Value> {
    row.get(column_index(column))
}

/// Returns true for missing, null or whitespace-only cells.
#[must_use]
pub fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

/// Cell content as trimmed text.
#[must_use]
pub fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.trim().to_owned(),
        Some(other) => other.to_string(),
    }
}

/// Cell content as a number.
///
/// Accepts JSON numbers and text such as `1 234,50` or `$120`.
#[must_use]
pub fn cell_number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_amount(s),
        _ => None,
    }
}

/// Parses a user- or sheet-supplied amount.
#[must_use]
pub fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches('$')
        .trim_end_matches('$')
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();

    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Rounds to cents.
#[must_use]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Wraps an amount as a JSON number cell.
#[must_use]
pub fn money(value: f64) -> Value {
    serde_json::Number::from_f64(round2(value)).map_or(Value::Null, Value::Number)
}

/// Wraps text as a JSON string cell.
#[must_use]
pub fn text(value: impl Into<String>) -> Value {
    Value::String(value.into())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_a1_range() {
        assert_eq!(a1_range('A', 2, 'L', 502), "A2:L502");
    }

    #[test]
    fn test_column_index() {
        assert_eq!(column_index('A'), 0);
        assert_eq!(column_index('g'), 6);
    }

    #[test]
    fn test_cell_number_variants() {
        assert_eq!(cell_number(Some(&json!(12.5))), Some(12.5));
        assert_eq!(cell_number(Some(&json!("1 234,50"))), Some(1234.5));
        assert_eq!(cell_number(Some(&json!("$120"))), Some(120.0));
        assert_eq!(cell_number(Some(&json!("abc"))), None);
        assert_eq!(cell_number(Some(&json!(""))), None);
        assert_eq!(cell_number(None), None);
    }

    #[test]
    fn test_cell_text_and_blank() {
        assert_eq!(cell_text(Some(&json!("  Acme "))), "Acme");
        assert_eq!(cell_text(Some(&json!(5))), "5");
        assert!(is_blank(Some(&json!("   "))));
        assert!(is_blank(Some(&Value::Null)));
        assert!(!is_blank(Some(&json!(0))));
    }

    #[test]
    fn test_money_rounds() {
        assert_eq!(money(10.005_1), json!(10.01));
        assert_eq!(money(f64::NAN), Value::Null);
    }
}
