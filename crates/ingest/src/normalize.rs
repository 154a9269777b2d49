//! Joinable-Frame Normalization
//!
//! Derives the canonical join columns on a freshly loaded external
//! table: a zero-padded `fips` code, an integer `year`, a normalized
//! `county_name_norm`, and a `state` column, each only when a
//! recognizable source column exists. Columns already present are left
//! untouched.

use std::collections::HashMap;

use datagate_core::{normalize_county_name, pad_fips, CoreResult, Table, Value};

/// Source column names recognized as a geographic code.
const FIPS_SOURCES: [&str; 2] = ["geo id2", "fips_code"];

/// Return a copy of the table with the canonical join columns derived.
pub fn prepare_joinable(table: &Table) -> CoreResult<Table> {
    let mut out = table.clone();

    // First case-insensitive match wins, like the original column scan.
    let mut lower: HashMap<String, usize> = HashMap::new();
    for (idx, name) in table.columns().iter().enumerate() {
        lower.entry(name.to_lowercase()).or_insert(idx);
    }

    if !out.has_column("fips") {
        if let Some(&src) = FIPS_SOURCES.iter().find_map(|s| lower.get(*s)) {
            let values = derive_column(table, src, |v| match v.as_i64() {
                Some(code) => Value::Str(pad_fips(code)),
                None => Value::Null,
            });
            out.add_column("fips", values)?;
        }
    }

    if !out.has_column("year") {
        if let Some(&src) = lower.get("year") {
            let values = derive_column(table, src, |v| match v.as_i64() {
                Some(year) => Value::Int(year),
                None => Value::Null,
            });
            out.add_column("year", values)?;
        }
    }

    if !out.has_column("county_name_norm") {
        let src = lower.get("county").or_else(|| lower.get("county_name"));
        if let Some(&src) = src {
            let values = derive_column(table, src, |v| match v {
                Value::Null => Value::Null,
                other => Value::Str(normalize_county_name(&other.to_string())),
            });
            out.add_column("county_name_norm", values)?;
        }
    }

    if !out.has_column("state") {
        let src = lower.get("state").or_else(|| lower.get("state abbr"));
        if let Some(&src) = src {
            let values = derive_column(table, src, |v| match v {
                Value::Null => Value::Null,
                other => Value::Str(other.to_string()),
            });
            out.add_column("state", values)?;
        }
    }

    Ok(out)
}

fn derive_column(table: &Table, src: usize, f: impl Fn(&Value) -> Value) -> Vec<Value> {
    (0..table.n_rows())
        .map(|row| f(table.value(row, src)))
        .collect()
}
