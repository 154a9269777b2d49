//! Minimal Typed Table
//!
//! A small row-major table (`Table`) with a typed cell model (`Value`),
//! covering exactly what the join-admission engine needs: column
//! derivation and renaming, key-based deduplication, distinct-key
//! enumeration, a row-preserving left join, and CSV read/write.
//!
//! Join keys compare via a canonical string rendering (`Value::key_repr`)
//! so an integer-typed `2023` from a spreadsheet joins against the
//! string `"2023"` from a CSV file.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// A single table cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Value {
    /// Infer a typed value from a raw text cell.
    ///
    /// Digit strings with a leading zero (e.g. `"01001"`) stay strings:
    /// they are zero-padded codes, and collapsing them to integers
    /// would corrupt the join key.
    pub fn infer(cell: &str) -> Value {
        let s = cell.trim();
        if s.is_empty() {
            return Value::Null;
        }
        let digits = s.strip_prefix('-').unwrap_or(s);
        if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
            if digits.len() > 1 && digits.starts_with('0') {
                return Value::Str(s.to_string());
            }
            if let Ok(i) = s.parse::<i64>() {
                return Value::Int(i);
            }
        }
        if let Ok(f) = s.parse::<f64>() {
            return Value::Float(f);
        }
        Value::Str(s.to_string())
    }

    /// Canonical string rendering used for join-key comparison.
    ///
    /// Integral floats render without a fractional part so spreadsheet
    /// cells (always floats in calamine) match integer CSV cells.
    pub fn key_repr(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15 => {
                format!("{}", *f as i64)
            }
            Value::Float(f) => f.to_string(),
            Value::Str(s) => s.trim().to_string(),
        }
    }

    /// Integer view of the value, if it has one.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.is_finite() && f.fract() == 0.0 => Some(*f as i64),
            Value::Str(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    /// Whether the cell is null/empty.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Str(s) => write!(f, "{}", s),
        }
    }
}

/// A row-major table with named columns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// Create an empty table with the given column names.
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Column names in order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// All rows in order.
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns.
    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    /// Append a row; its arity must match the column count.
    pub fn push_row(&mut self, row: Vec<Value>) -> CoreResult<()> {
        if row.len() != self.columns.len() {
            return Err(CoreError::validation(format!(
                "row has {} cells, table has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Index of an exactly named column.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Index of a column matched case-insensitively (first match wins).
    pub fn column_index_ci(&self, name: &str) -> Option<usize> {
        let needle = name.to_lowercase();
        self.columns
            .iter()
            .position(|c| c.to_lowercase() == needle)
    }

    /// Whether an exactly named column exists.
    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// The cell at (row, column index).
    pub fn value(&self, row: usize, col: usize) -> &Value {
        &self.rows[row][col]
    }

    /// Add a new column with one value per existing row.
    pub fn add_column(&mut self, name: impl Into<String>, values: Vec<Value>) -> CoreResult<()> {
        let name = name.into();
        if self.has_column(&name) {
            return Err(CoreError::validation(format!(
                "column already exists: {}",
                name
            )));
        }
        if values.len() != self.rows.len() {
            return Err(CoreError::validation(format!(
                "column {} has {} values, table has {} rows",
                name,
                values.len(),
                self.rows.len()
            )));
        }
        self.columns.push(name);
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
        Ok(())
    }

    /// Rename a column in place. Missing source column is a no-op.
    pub fn rename_column(&mut self, from: &str, to: impl Into<String>) {
        if let Some(idx) = self.column_index(from) {
            self.columns[idx] = to.into();
        }
    }

    /// Canonical key tuple for one row over the given column indices.
    pub fn key_tuple(&self, row: usize, key_cols: &[usize]) -> Vec<String> {
        key_cols
            .iter()
            .map(|&c| self.rows[row][c].key_repr())
            .collect()
    }

    /// Distinct key tuples over the given columns, in first-seen order.
    pub fn distinct_keys(&self, key_cols: &[usize]) -> Vec<Vec<String>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for row in 0..self.rows.len() {
            let key = self.key_tuple(row, key_cols);
            if seen.insert(key.clone()) {
                out.push(key);
            }
        }
        out
    }

    /// Drop duplicate rows on the given key columns, keeping the first
    /// occurrence of each key tuple.
    pub fn dedup_on(&self, key_cols: &[usize]) -> Table {
        let mut seen = HashSet::new();
        let mut out = Table::new(self.columns.clone());
        for row in &self.rows {
            let key: Vec<String> = key_cols.iter().map(|&c| row[c].key_repr()).collect();
            if seen.insert(key) {
                out.rows.push(row.clone());
            }
        }
        out
    }

    /// Left-join a key-unique right table onto this one.
    ///
    /// Every non-key column of `right` is appended to this table's
    /// schema; rows without a match get nulls. The left row count and
    /// order are preserved unconditionally. Duplicate keys on the right
    /// are an error (callers dedup first).
    pub fn left_join_unique(
        &self,
        right: &Table,
        left_keys: &[usize],
        right_keys: &[usize],
    ) -> CoreResult<Table> {
        if left_keys.len() != right_keys.len() {
            return Err(CoreError::validation(
                "left and right join key counts differ",
            ));
        }
        let mut right_index: HashMap<Vec<String>, usize> = HashMap::new();
        for row in 0..right.n_rows() {
            let key = right.key_tuple(row, right_keys);
            if right_index.insert(key, row).is_some() {
                return Err(CoreError::validation(
                    "right side of join has duplicate keys",
                ));
            }
        }

        let carry_cols: Vec<usize> = (0..right.n_cols())
            .filter(|c| !right_keys.contains(c))
            .collect();

        let mut columns = self.columns.clone();
        for &c in &carry_cols {
            if columns.contains(&right.columns[c]) {
                return Err(CoreError::validation(format!(
                    "join would duplicate column: {}",
                    right.columns[c]
                )));
            }
            columns.push(right.columns[c].clone());
        }

        let mut out = Table::new(columns);
        for row in 0..self.n_rows() {
            let mut cells = self.rows[row].clone();
            match right_index.get(&self.key_tuple(row, left_keys)) {
                Some(&r) => {
                    for &c in &carry_cols {
                        cells.push(right.rows[r][c].clone());
                    }
                }
                None => {
                    for _ in &carry_cols {
                        cells.push(Value::Null);
                    }
                }
            }
            out.rows.push(cells);
        }
        Ok(out)
    }

    // ── CSV ────────────────────────────────────────────────────────────

    /// Parse a table from CSV text (RFC 4180 quoting, first row is the
    /// header). Short rows are padded with nulls; long rows are an
    /// error.
    pub fn from_csv_str(text: &str) -> CoreResult<Table> {
        let mut records = parse_csv_records(text)?;
        if records.is_empty() {
            return Err(CoreError::parse("CSV input has no header row"));
        }
        let header = records.remove(0);
        let mut table = Table::new(header.iter().map(|h| h.trim().to_string()).collect());
        for record in records {
            if record.len() > table.columns.len() {
                return Err(CoreError::parse(format!(
                    "CSV row has {} fields, header has {}",
                    record.len(),
                    table.columns.len()
                )));
            }
            let mut row: Vec<Value> = record.iter().map(|c| Value::infer(c)).collect();
            row.resize(table.columns.len(), Value::Null);
            table.rows.push(row);
        }
        Ok(table)
    }

    /// Read a CSV file into a table.
    pub fn from_csv_path(path: &Path) -> CoreResult<Table> {
        let text = std::fs::read_to_string(path)?;
        Self::from_csv_str(&text)
    }

    /// Serialize the table to CSV text.
    pub fn to_csv_string(&self) -> String {
        let mut out = String::new();
        let header: Vec<String> = self.columns.iter().map(|c| csv_escape(c)).collect();
        out.push_str(&header.join(","));
        out.push('\n');
        for row in &self.rows {
            let cells: Vec<String> = row.iter().map(|v| csv_escape(&v.to_string())).collect();
            out.push_str(&cells.join(","));
            out.push('\n');
        }
        out
    }

    /// Write the table as a CSV file, creating parent directories.
    pub fn write_csv(&self, path: &Path) -> CoreResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, self.to_csv_string())?;
        Ok(())
    }
}

/// Quote a CSV field when it contains a delimiter, quote, or newline.
pub fn csv_escape(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Split CSV text into records of raw string fields.
fn parse_csv_records(text: &str) -> CoreResult<Vec<Vec<String>>> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                }
                _ => field.push(ch),
            }
            continue;
        }
        match ch {
            '"' if field.is_empty() => in_quotes = true,
            ',' => {
                record.push(std::mem::take(&mut field));
            }
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(ch),
        }
    }
    if in_quotes {
        return Err(CoreError::parse("unterminated quoted CSV field"));
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    // Trailing blank lines produce empty single-field records; drop them.
    records.retain(|r| !(r.len() == 1 && r[0].is_empty()));
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::from_csv_str("fips,year,ALICE_pct\n13001,2023,0.3\n13003,2023,0.4\n13005,2023,0.2\n")
            .unwrap()
    }

    #[test]
    fn test_infer_types() {
        assert_eq!(Value::infer("2023"), Value::Int(2023));
        assert_eq!(Value::infer("0.5"), Value::Float(0.5));
        assert_eq!(Value::infer(""), Value::Null);
        assert_eq!(Value::infer("Georgia"), Value::Str("Georgia".to_string()));
        // Zero-padded codes must survive as strings.
        assert_eq!(Value::infer("01001"), Value::Str("01001".to_string()));
    }

    #[test]
    fn test_key_repr_bridges_types() {
        assert_eq!(Value::Int(2023).key_repr(), "2023");
        assert_eq!(Value::Float(2023.0).key_repr(), "2023");
        assert_eq!(Value::Str(" 2023 ".to_string()).key_repr(), "2023");
    }

    #[test]
    fn test_csv_roundtrip_with_quoting() {
        let mut t = Table::new(vec!["name".into(), "note".into()]);
        t.push_row(vec![
            Value::Str("a,b".into()),
            Value::Str("say \"hi\"".into()),
        ])
        .unwrap();
        let text = t.to_csv_string();
        let back = Table::from_csv_str(&text).unwrap();
        assert_eq!(back.n_rows(), 1);
        assert_eq!(back.value(0, 0), &Value::Str("a,b".into()));
        assert_eq!(back.value(0, 1), &Value::Str("say \"hi\"".into()));
    }

    #[test]
    fn test_quoted_field_with_newline() {
        let t = Table::from_csv_str("a,b\n\"line1\nline2\",2\n").unwrap();
        assert_eq!(t.n_rows(), 1);
        assert_eq!(t.value(0, 0), &Value::Str("line1\nline2".into()));
    }

    #[test]
    fn test_distinct_keys_and_dedup() {
        let t = Table::from_csv_str("fips,year,x\n13001,2023,1\n13001,2023,2\n13003,2023,3\n")
            .unwrap();
        let keys = t.distinct_keys(&[0, 1]);
        assert_eq!(keys.len(), 2);
        let d = t.dedup_on(&[0, 1]);
        assert_eq!(d.n_rows(), 2);
        // First occurrence wins.
        assert_eq!(d.value(0, 2), &Value::Int(1));
    }

    #[test]
    fn test_left_join_preserves_rows() {
        let base = sample();
        let ext = Table::from_csv_str("fips,year,feature_x\n13001,2023,10\n13003,2023,20\n")
            .unwrap();
        let joined = base.left_join_unique(&ext, &[0, 1], &[0, 1]).unwrap();
        assert_eq!(joined.n_rows(), 3);
        assert_eq!(joined.n_cols(), 4);
        assert_eq!(joined.value(0, 3), &Value::Int(10));
        assert_eq!(joined.value(2, 3), &Value::Null);
    }

    #[test]
    fn test_left_join_rejects_duplicate_right_keys() {
        let base = sample();
        let dup = Table::from_csv_str("fips,year,x\n13001,2023,1\n13001,2023,2\n").unwrap();
        assert!(base.left_join_unique(&dup, &[0, 1], &[0, 1]).is_err());
    }

    #[test]
    fn test_add_column_and_rename() {
        let mut t = sample();
        t.add_column(
            "flag",
            vec![Value::Bool(true), Value::Bool(false), Value::Null],
        )
        .unwrap();
        assert!(t.has_column("flag"));
        t.rename_column("flag", "flag2");
        assert!(t.has_column("flag2"));
        assert!(t.add_column("year", vec![]).is_err());
    }

    #[test]
    fn test_short_rows_pad_with_null() {
        let t = Table::from_csv_str("a,b,c\n1,2\n").unwrap();
        assert_eq!(t.value(0, 2), &Value::Null);
    }
}
