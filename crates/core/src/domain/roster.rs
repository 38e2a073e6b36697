use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

pub const EMAIL_HEADER: &str = "Email";
pub const FIRST_NAME_HEADER: &str = "First Name";
pub const LAST_NAME_HEADER: &str = "Last Name";
pub const DEFAULT_FIXED_HEADERS: &[&str] =
    &[EMAIL_HEADER, FIRST_NAME_HEADER, LAST_NAME_HEADER, "Timestamp"];

/// Columns that describe identity rather than entitlements. Every other
/// header names a role.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FixedHeaders(BTreeSet<String>);

impl FixedHeaders {
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(headers.into_iter().map(|header| header.as_ref().trim().to_owned()).collect())
    }

    pub fn contains(&self, header: &str) -> bool {
        self.0.contains(header.trim())
    }
}

impl Default for FixedHeaders {
    fn default() -> Self {
        Self::new(DEFAULT_FIXED_HEADERS)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterRow {
    cells: BTreeMap<String, String>,
}

impl RosterRow {
    pub fn new<I, K, V>(cells: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            cells: cells
                .into_iter()
                .map(|(header, value)| (header.into().trim().to_owned(), value.into()))
                .collect(),
        }
    }

    /// Trimmed cell value; blank cells read as absent.
    pub fn get(&self, header: &str) -> Option<&str> {
        self.cells.get(header.trim()).map(|value| value.trim()).filter(|value| !value.is_empty())
    }

    pub fn email(&self) -> Option<String> {
        self.get(EMAIL_HEADER).map(str::to_lowercase)
    }

    /// `First Name` and `Last Name` joined by a space, skipping blank parts.
    pub fn nickname(&self) -> Option<String> {
        let parts: Vec<&str> =
            [FIRST_NAME_HEADER, LAST_NAME_HEADER].iter().filter_map(|h| self.get(h)).collect();
        (!parts.is_empty()).then(|| parts.join(" "))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RosterEntitlements {
    pub nickname: Option<String>,
    pub roles: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RosterSheet {
    pub headers: Vec<String>,
    pub rows: Vec<RosterRow>,
}

impl RosterSheet {
    pub fn new(headers: Vec<String>, rows: Vec<RosterRow>) -> Self {
        Self { headers: headers.into_iter().map(|h| h.trim().to_owned()).collect(), rows }
    }

    /// Builds a sheet from a raw value grid whose first row holds the
    /// headers. Short rows are padded with empty cells, extra cells dropped.
    pub fn from_grid(grid: Vec<Vec<String>>) -> Self {
        let mut lines = grid.into_iter();
        let Some(headers) = lines.next() else {
            return Self::default();
        };

        let rows = lines
            .filter(|line| line.iter().any(|cell| !cell.trim().is_empty()))
            .map(|line| {
                let mut values = line.into_iter();
                RosterRow::new(
                    headers
                        .iter()
                        .map(|header| (header.clone(), values.next().unwrap_or_default())),
                )
            })
            .collect();

        Self::new(headers, rows)
    }

    /// Case-insensitive lookup on the `Email` column. When the sheet lists an
    /// address more than once the last row wins.
    pub fn find_by_email(&self, email: &str) -> Option<&RosterRow> {
        let wanted = email.trim().to_lowercase();
        self.rows.iter().rev().find(|row| row.email().as_deref() == Some(wanted.as_str()))
    }

    pub fn role_headers<'a>(&'a self, fixed: &FixedHeaders) -> Vec<&'a str> {
        let mut seen = BTreeSet::new();
        self.headers
            .iter()
            .map(String::as_str)
            .filter(|header| !header.is_empty() && !fixed.contains(header))
            .filter(|header| seen.insert(*header))
            .collect()
    }

    /// Roles in column order for every non-fixed column the row fills in.
    pub fn entitlements(&self, row: &RosterRow, fixed: &FixedHeaders) -> RosterEntitlements {
        let roles = self
            .role_headers(fixed)
            .into_iter()
            .filter(|header| row.get(header).is_some())
            .map(str::to_owned)
            .collect();

        RosterEntitlements { nickname: row.nickname(), roles }
    }
}
