//! Row/column result sets returned by the query transports.

use std::borrow::Cow;
use std::collections::BTreeMap;

/// One cell of a query result.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Null,
    String(String),
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    /// Nanoseconds since the Unix epoch.
    Time(i64),
}

impl Datum {
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view of numeric and time cells.
    ///
    /// InfluxQL JSON may render whole floats as integers and the other way
    /// around, so integral floats are accepted too.
    #[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) | Self::Time(i) => Some(*i),
            Self::UInt(u) => i64::try_from(*u).ok(),
            Self::Float(f) if f.fract() == 0.0 && f.abs() < 9.2e18 => Some(*f as i64),
            _ => None,
        }
    }
}

/// A table of rows sharing one set of columns.
///
/// `group_key` holds values common to every row that the engine reports
/// separately from the columns, such as InfluxQL series tags.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultTable {
    pub group_key: BTreeMap<String, String>,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Datum>>,
}

impl ResultTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            group_key: BTreeMap::new(),
            columns,
            rows: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_group_key(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.group_key.insert(key.into(), value.into());
        self
    }

    pub fn push_row(&mut self, row: Vec<Datum>) {
        self.rows.push(row);
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Value of a column that is constant across the table.
    ///
    /// Checks the group key first, then the first row.
    pub fn constant(&self, name: &str) -> Option<&str> {
        if let Some(value) = self.group_key.get(name) {
            return Some(value);
        }
        let idx = self.column_index(name)?;
        self.rows.first()?.get(idx)?.as_str()
    }

    /// The table with group key entries appended as columns to every row.
    ///
    /// Borrowed unchanged when every group key entry is already a column.
    pub fn expand_group_key(&self) -> Cow<'_, Self> {
        let missing: Vec<(&String, &String)> = self
            .group_key
            .iter()
            .filter(|(key, _)| self.column_index(key).is_none())
            .collect();
        if missing.is_empty() {
            return Cow::Borrowed(self);
        }

        let mut columns = self.columns.clone();
        columns.extend(missing.iter().map(|(key, _)| (*key).clone()));
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let mut row = row.clone();
                row.extend(missing.iter().map(|(_, value)| Datum::String((*value).clone())));
                row
            })
            .collect();

        Cow::Owned(Self {
            group_key: self.group_key.clone(),
            columns,
            rows,
        })
    }

    /// Non-null string values of one column, or the group key value once.
    pub fn strings(&self, name: &str) -> Vec<String> {
        if let Some(value) = self.group_key.get(name) {
            return vec![value.clone()];
        }
        let Some(idx) = self.column_index(name) else {
            return Vec::new();
        };
        self.rows
            .iter()
            .filter_map(|row| row.get(idx)?.as_str().map(ToString::to_string))
            .collect()
    }
}
