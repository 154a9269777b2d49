//! External File Resolution and Loading
//!
//! Maps an approved ledger entry to a physical file in the operator's
//! approved-data directory and loads it into a `Table`. Only a small
//! allow-list of tabular containers is accepted: delimited text,
//! spreadsheets, and zip archives holding one of those.

use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use calamine::{Data, Range, Reader};

use datagate_core::{slug, Table, Value};

use crate::error::{IngestError, IngestResult};

/// Accepted file extensions (lowercase, without the dot).
pub const ALLOWED_EXTENSIONS: [&str; 3] = ["csv", "xlsx", "zip"];

/// Lowercased extension of a path, if any.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

/// Whether a path's extension is on the allow-list.
pub fn extension_allowed(path: &Path) -> bool {
    matches!(extension_of(path).as_deref(), Some(e) if ALLOWED_EXTENSIONS.contains(&e))
}

/// Resolve the physical file for a dataset.
///
/// Preference order: the explicit ledger mapping (absolute or
/// approved-dir-relative), then a slug substring scan of the approved
/// directory, then a single-file default when the directory holds
/// exactly one file. Returns `None` when nothing matches.
pub fn resolve_local_file(
    name: &str,
    approved_dir: &Path,
    explicit: Option<&str>,
) -> Option<PathBuf> {
    if let Some(explicit) = explicit {
        let direct = PathBuf::from(explicit);
        if direct.is_file() {
            return Some(direct);
        }
        let relative = approved_dir.join(explicit);
        if relative.is_file() {
            return Some(relative);
        }
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(approved_dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.is_file())
        .collect();
    files.sort();

    let target = slug(name);
    if !target.is_empty() {
        for file in &files {
            let stem = file
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default();
            if slug(stem).contains(&target) {
                return Some(file.clone());
            }
        }
    }
    if files.len() == 1 {
        return files.pop();
    }
    None
}

/// Load an external tabular file into a `Table`.
pub fn load_external_table(path: &Path) -> IngestResult<Table> {
    match extension_of(path).as_deref() {
        Some("csv") => Ok(Table::from_csv_path(path)?),
        Some("xlsx") => load_xlsx_path(path),
        Some("zip") => load_zip(path),
        other => Err(IngestError::unsupported(format!(
            "unsupported extension {:?} for {}",
            other.unwrap_or(""),
            path.display()
        ))),
    }
}

fn load_xlsx_path(path: &Path) -> IngestResult<Table> {
    let mut workbook = calamine::open_workbook_auto(path)
        .map_err(|e| IngestError::unsupported(format!("failed to open spreadsheet: {}", e)))?;
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| IngestError::unsupported("spreadsheet has no sheets"))?;
    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| IngestError::unsupported(format!("failed to read sheet: {}", e)))?;
    range_to_table(&range)
}

fn load_zip(path: &Path) -> IngestResult<Table> {
    let file = std::fs::File::open(path)?;
    let mut archive = zip::ZipArchive::new(file)?;

    // First csv/xlsx member in archive order, matching the original
    // operator workflow for bulk-downloaded census bundles.
    let names: Vec<String> = archive.file_names().map(String::from).collect();
    let inner = names
        .iter()
        .find(|n| {
            let lower = n.to_lowercase();
            lower.ends_with(".csv") || lower.ends_with(".xlsx")
        })
        .cloned()
        .ok_or_else(|| {
            IngestError::unsupported(format!(
                "zip archive {} contains no csv/xlsx members",
                path.display()
            ))
        })?;

    let mut payload = Vec::new();
    archive.by_name(&inner)?.read_to_end(&mut payload)?;

    if inner.to_lowercase().ends_with(".csv") {
        let text = String::from_utf8_lossy(&payload);
        Ok(Table::from_csv_str(&text)?)
    } else {
        let mut workbook = calamine::Xlsx::new(Cursor::new(payload))?;
        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| IngestError::unsupported("spreadsheet has no sheets"))?;
        let range = workbook
            .worksheet_range(&sheet_name)
            .map_err(|e| IngestError::unsupported(format!("failed to read sheet: {}", e)))?;
        range_to_table(&range)
    }
}

fn range_to_table(range: &Range<Data>) -> IngestResult<Table> {
    let mut rows = range.rows();
    let header = rows
        .next()
        .ok_or_else(|| IngestError::unsupported("spreadsheet sheet is empty"))?;
    let columns: Vec<String> = header
        .iter()
        .enumerate()
        .map(|(i, cell)| {
            let name = cell.to_string().trim().to_string();
            if name.is_empty() {
                format!("col_{}", i)
            } else {
                name
            }
        })
        .collect();

    let width = columns.len();
    let mut table = Table::new(columns);
    for row in rows {
        let mut cells: Vec<Value> = row.iter().take(width).map(cell_to_value).collect();
        cells.resize(width, Value::Null);
        table.push_row(cells)?;
    }
    Ok(table)
}

fn cell_to_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::Int(i) => Value::Int(*i),
        Data::Float(f) => Value::Float(*f),
        Data::Bool(b) => Value::Bool(*b),
        Data::String(s) => Value::infer(s),
        Data::DateTime(dt) => Value::Float(dt.as_f64()),
        other => Value::infer(&other.to_string()),
    }
}
