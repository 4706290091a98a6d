//! Fixed layout of the bookkeeping spreadsheet.
//!
//! Every tab keeps the operation ID of the writing operation in column A,
//! a header in row 1 and data from row 2 onwards.

use std::fmt;

/// The six tabs of the spreadsheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SheetKind {
    General,
    Designers,
    Clients,
    Expenses,
    Whitelist,
    Blacklist,
}

impl SheetKind {
    /// All tabs in a stable order.
    pub const ALL: [Self; 6] = [
        Self::General,
        Self::Designers,
        Self::Clients,
        Self::Expenses,
        Self::Whitelist,
        Self::Blacklist,
    ];

    /// Tab title as it appears in the spreadsheet.
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::General => "GENERAL",
            Self::Designers => "DESIGNERS",
            Self::Clients => "CLIENTS",
            Self::Expenses => "EXPENSES",
            Self::Whitelist => "WHITELIST",
            Self::Blacklist => "BLACKLIST",
        }
    }

    /// Layout of this tab.
    #[must_use]
    pub fn layout(self) -> &'static SheetLayout {
        match self {
            Self::General => &GENERAL,
            Self::Designers => &DESIGNERS,
            Self::Clients => &CLIENTS,
            Self::Expenses => &EXPENSES,
            Self::Whitelist => &WHITELIST,
            Self::Blacklist => &BLACKLIST,
        }
    }
}

impl fmt::Display for SheetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// Column layout of a single tab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetLayout {
    /// Which tab this is.
    pub kind: SheetKind,

    /// Column holding the operation ID.
    pub id_column: char,

    /// First data column.
    pub data_start: char,

    /// Last data column.
    pub data_end: char,

    /// First row the bot may write to (1-based).
    pub start_row: u32,

    /// Column inspected to decide whether a row is empty.
    pub check_column: char,

    /// Header titles for `id_column..=data_end`.
    pub headers: &'static [&'static str],
}

impl SheetLayout {
    /// Number of data columns.
    #[must_use]
    pub const fn data_width(&self) -> usize {
        (self.data_end as usize) - (self.data_start as usize) + 1
    }

    /// Last row inspected when scanning for data.
    #[must_use]
    pub const fn scan_end_row(&self) -> u32 {
        self.start_row + MAX_SCAN_ROWS
    }

    /// Zero-based offset of `column` relative to the first data column.
    #[must_use]
    pub fn data_offset(&self, column: char) -> Option<usize> {
        if column < self.data_start || column > self.data_end {
            return None;
        }
        Some((column as usize) - (self.data_start as usize))
    }
}

/// Maximum number of rows scanned below `start_row`.
pub const MAX_SCAN_ROWS: u32 = 500;

/// Column indices inside GENERAL.
pub mod general {
    pub const DATE: char = 'B';
    pub const KIND: char = 'C';
    pub const DESIGNER: char = 'D';
    pub const CLIENT: char = 'E';
    pub const AMOUNT: char = 'F';
    pub const PAID: char = 'G';
    pub const DEBT: char = 'H';
    pub const DESIGNER_SHARE: char = 'I';
    pub const AGENCY_INCOME: char = 'J';
    pub const EXPENSE: char = 'K';
    pub const NOTE: char = 'L';
}

/// Column indices inside DESIGNERS.
pub mod designers {
    pub const DATE: char = 'B';
    pub const DESIGNER: char = 'C';
    pub const CLIENT: char = 'D';
    pub const AMOUNT: char = 'E';
    pub const PERCENT: char = 'F';
    pub const SHARE: char = 'G';
}

/// Column indices inside CLIENTS.
pub mod clients {
    pub const DATE: char = 'B';
    pub const CLIENT: char = 'C';
    pub const STATUS: char = 'D';
    pub const AMOUNT: char = 'E';
    pub const PAID: char = 'F';
    pub const DEBT: char = 'G';
}

/// Column indices inside EXPENSES.
pub mod expenses {
    pub const DATE: char = 'B';
    pub const CATEGORY: char = 'C';
    pub const AMOUNT: char = 'D';
    pub const DESIGNER: char = 'E';
}

/// Column indices inside WHITELIST and BLACKLIST.
pub mod lists {
    pub const CLIENT: char = 'B';
    pub const ADDED: char = 'C';
}

static GENERAL: SheetLayout = SheetLayout {
    kind: SheetKind::General,
    id_column: 'A',
    data_start: 'B',
    data_end: 'L',
    start_row: 2,
    check_column: general::DATE,
    headers: &[
        "operation_id",
        "date",
        "kind",
        "designer",
        "client",
        "amount",
        "paid",
        "debt",
        "designer_share",
        "agency_income",
        "expense",
        "note",
    ],
};

static DESIGNERS: SheetLayout = SheetLayout {
    kind: SheetKind::Designers,
    id_column: 'A',
    data_start: 'B',
    data_end: 'G',
    start_row: 2,
    check_column: designers::DESIGNER,
    headers: &[
        "operation_id",
        "date",
        "designer",
        "client",
        "amount",
        "percent",
        "designer_share",
    ],
};

static CLIENTS: SheetLayout = SheetLayout {
    kind: SheetKind::Clients,
    id_column: 'A',
    data_start: 'B',
    data_end: 'G',
    start_row: 2,
    check_column: clients::CLIENT,
    headers: &[
        "operation_id",
        "date",
        "client",
        "status",
        "amount",
        "paid",
        "debt",
    ],
};

static EXPENSES: SheetLayout = SheetLayout {
    kind: SheetKind::Expenses,
    id_column: 'A',
    data_start: 'B',
    data_end: 'E',
    start_row: 2,
    check_column: expenses::DATE,
    headers: &["operation_id", "date", "category", "amount", "designer"],
};

static WHITELIST: SheetLayout = SheetLayout {
    kind: SheetKind::Whitelist,
    id_column: 'A',
    data_start: 'B',
    data_end: 'C',
    start_row: 2,
    check_column: lists::CLIENT,
    headers: &["operation_id", "client", "added"],
};

static BLACKLIST: SheetLayout = SheetLayout {
    kind: SheetKind::Blacklist,
    id_column: 'A',
    data_start: 'B',
    data_end: 'C',
    start_row: 2,
    check_column: lists::CLIENT,
    headers: &["operation_id", "client", "added"],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_cover_all_columns() {
        for kind in SheetKind::ALL {
            let layout = kind.layout();
            assert_eq!(layout.kind, kind);
            assert_eq!(
                layout.headers.len(),
                layout.data_width() + 1,
                "header count mismatch for {kind}"
            );
        }
    }

    #[test]
    fn test_titles() {
        let titles: Vec<_> = SheetKind::ALL.iter().map(|k| k.title()).collect();
        assert_eq!(
            titles,
            ["GENERAL", "DESIGNERS", "CLIENTS", "EXPENSES", "WHITELIST", "BLACKLIST"]
        );
    }

    #[test]
    fn test_data_offset() {
        let layout = SheetKind::Clients.layout();
        assert_eq!(layout.data_offset('B'), Some(0));
        assert_eq!(layout.data_offset(clients::DEBT), Some(5));
        assert_eq!(layout.data_offset('A'), None);
        assert_eq!(layout.data_offset('H'), None);
    }
}
