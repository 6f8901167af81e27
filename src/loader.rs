//! Tabular loader: delimited source files into ordered, header-keyed records.
//!
//! Purely syntactic: shape checks and trimming only, no semantic validation.
//! A malformed row (column count mismatch, broken quoting, invalid UTF-8)
//! aborts the load with a [`ParseError`] carrying file and line context;
//! semantic problems are someone else's job (see `validation`).

use csv::{ReaderBuilder, Trim};
use serde_json::{Map, Value};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::{ParseError, PipelineError, PipelineResult};

/// One parsed source file, rows in file order.
#[derive(Debug, Clone)]
pub struct Table {
    pub file: PathBuf,
    /// Declared column names, in file order.
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

/// One record: a mapping from declared column name to trimmed raw value,
/// preserving column order, plus the 1-based line it came from.
#[derive(Debug, Clone)]
pub struct Row {
    pub line: usize,
    pub values: Map<String, Value>,
}

impl Row {
    /// Trimmed cell value of a column; `None` when the column is absent.
    /// The empty string is a present-but-blank cell, not an absent one -
    /// the distinction belongs to the merge rules, not the loader.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.values.get(column).and_then(Value::as_str)
    }
}

impl Table {
    /// Check that every identity column a consumer indexes by is declared.
    pub fn require_columns(&self, columns: &[&str]) -> Result<(), ParseError> {
        for column in columns {
            if !self.headers.iter().any(|h| h == column) {
                return Err(ParseError::MissingColumn {
                    file: self.file.clone(),
                    column: (*column).to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Load one CSV file from disk.
pub fn load_table(path: &Path) -> PipelineResult<Table> {
    let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
    read_table(file, path)
}

/// Parse CSV from a reader. `file` is used for error context only.
pub fn read_table<R: Read>(reader: R, file: &Path) -> PipelineResult<Table> {
    let mut rdr = ReaderBuilder::new().trim(Trim::All).from_reader(reader);

    let headers: Vec<String> = rdr
        .headers()
        .map_err(|e| csv_error(file, e))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
        return Err(ParseError::Empty { file: file.into() }.into());
    }

    let mut rows = Vec::new();
    for (idx, result) in rdr.records().enumerate() {
        // Column count mismatches surface here as UnequalLengths.
        let record = result.map_err(|e| csv_error(file, e))?;
        // +1 for 1-based, +1 for the header line; the reader's own position
        // is preferred since quoted fields can span lines.
        let line = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(idx + 2);

        let mut values = Map::new();
        for (header, cell) in headers.iter().zip(record.iter()) {
            values.insert(header.clone(), Value::String(cell.to_string()));
        }
        rows.push(Row { line, values });
    }

    Ok(Table {
        file: file.to_path_buf(),
        headers,
        rows,
    })
}

fn csv_error(file: &Path, err: csv::Error) -> PipelineError {
    let line = err
        .position()
        .map(|p| p.line() as usize)
        .unwrap_or_default();
    ParseError::Malformed {
        file: file.into(),
        line,
        message: err.to_string(),
    }
    .into()
}
