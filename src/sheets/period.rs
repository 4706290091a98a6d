//! Sheet dates and reporting periods.

use std::fmt;

use chrono::{Datelike, Days, NaiveDate};
use serde_json::Value;

use super::values::cell_text;

/// Date format used in every tab.
pub const SHEET_DATE_FORMAT: &str = "%d.%m.%Y";

/// Formats a date the way the bot writes it.
#[must_use]
pub fn format_sheet_date(date: NaiveDate) -> String {
    date.format(SHEET_DATE_FORMAT).to_string()
}

/// Parses `DD.MM.YYYY`, or `DD.MM` in `current_year`.
#[must_use]
pub fn parse_sheet_date(raw: &str, current_year: i32) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, SHEET_DATE_FORMAT) {
        return Some(date);
    }

    let (day, month) = raw.split_once('.')?;
    NaiveDate::from_ymd_opt(current_year, month.parse().ok()?, day.parse().ok()?)
}

/// Converts a serial date (days since 1899-12-30, time as the fraction).
#[must_use]
pub fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    // Truncation drops the time of day.
    epoch.checked_add_days(Days::new(serial.floor() as u64))
}

/// Date cell as `DD.MM.YYYY` text.
///
/// Cells typed as dates arrive as serial numbers and are reformatted;
/// text cells are returned as they are.
#[must_use]
pub fn sheet_date_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::Number(n)) => n
            .as_f64()
            .and_then(serial_to_date)
            .map_or_else(|| n.to_string(), format_sheet_date),
        other => cell_text(other),
    }
}

/// Reporting period used by the query commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Period {
    Today,
    /// Since Monday of the current week.
    Week,
    /// Since the first day of the current month.
    Month,
    #[default]
    All,
    /// Inclusive custom range.
    Range(NaiveDate, NaiveDate),
}

impl Period {
    /// Parses `today`, `week`, `month`, `all` or `DD.MM.YYYY-DD.MM.YYYY`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim().to_lowercase();
        match raw.as_str() {
            "today" | "day" => Some(Self::Today),
            "week" => Some(Self::Week),
            "month" => Some(Self::Month),
            "all" | "" => Some(Self::All),
            _ => {
                let (start, end) = raw.split_once('-')?;
                let start = NaiveDate::parse_from_str(start.trim(), SHEET_DATE_FORMAT).ok()?;
                let end = NaiveDate::parse_from_str(end.trim(), SHEET_DATE_FORMAT).ok()?;
                (start <= end).then_some(Self::Range(start, end))
            }
        }
    }

    /// Inclusive bounds relative to `today`; `None` means unbounded.
    #[must_use]
    pub fn bounds(self, today: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
        match self {
            Self::Today => Some((today, today)),
            Self::Week => {
                let since_monday = u64::from(today.weekday().num_days_from_monday());
                let monday = today.checked_sub_days(Days::new(since_monday))?;
                Some((monday, today))
            }
            Self::Month => Some((today.with_day(1)?, today)),
            Self::All => None,
            Self::Range(start, end) => Some((start, end)),
        }
    }

    /// Checks whether a raw sheet date falls inside the period.
    ///
    /// Unbounded periods accept everything, including unparseable dates.
    #[must_use]
    pub fn contains(self, raw_date: &str, today: NaiveDate) -> bool {
        let Some((start, end)) = self.bounds(today) else {
            return true;
        };
        parse_sheet_date(raw_date, today.year()).is_some_and(|d| d >= start && d <= end)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Today => f.write_str("today"),
            Self::Week => f.write_str("this week"),
            Self::Month => f.write_str("this month"),
            Self::All => f.write_str("all time"),
            Self::Range(start, end) => write!(
                f,
                "{} - {}",
                format_sheet_date(*start),
                format_sheet_date(*end)
            ),
        }
    }
}

/// Sort key placing unparseable dates last.
#[must_use]
pub fn date_sort_key(raw: &str, current_year: i32) -> NaiveDate {
    parse_sheet_date(raw, current_year).unwrap_or(NaiveDate::MAX)
}
