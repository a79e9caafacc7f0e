//! Run worksheet loading
//!
//! The worksheet is the lab's per-run sample table: one row per sequencing
//! ID with expected values and the Nextclade results pasted in. It normally
//! lives in the `Samples` sheet of an Excel workbook, but CSV/TSV exports and
//! JSON row arrays are accepted too. JSON is the only format where a cell can
//! hold a real list.

use crate::error::{CovidSeqError, CovidSeqResult};
use calamine::{open_workbook_auto, Data, Reader};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

pub const DEFAULT_SHEET_NAME: &str = "Samples";
pub const DEFAULT_ID_COLUMN: &str = "Sequencing ID";

/// Spreadsheet extensions calamine can open
pub const SPREADSHEET_EXTENSIONS: [&str; 4] = ["xlsx", "xlsm", "xls", "ods"];

/// A single worksheet value
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    List(Vec<String>),
}

impl Cell {
    /// Blank and whitespace-only text is treated as an empty cell
    pub fn from_text(raw: &str) -> Self {
        if raw.trim().is_empty() {
            Cell::Empty
        } else {
            Cell::Text(raw.to_string())
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    /// Text rendering used for joins and output; `None` for empty cells
    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            other => Some(other.to_string()),
        }
    }

    /// Whole, non-negative numbers only. `"12"`, `12.0` and `"12.0"` all give 12.
    pub fn as_count(&self) -> Option<u64> {
        let value = match self {
            Cell::Number(n) => *n,
            Cell::Text(s) => s.trim().parse::<f64>().ok()?,
            _ => return None,
        };
        (value.is_finite() && value >= 0.0 && value.fract() == 0.0).then(|| value as u64)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Text(s) => f.write_str(s),
            Cell::Number(n) => write!(f, "{}", n),
            Cell::Bool(b) => write!(f, "{}", b),
            Cell::List(items) => f.write_str(&items.join(",")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorksheetOptions {
    pub sheet_name: String,
    pub id_column: String,
}

impl Default for WorksheetOptions {
    fn default() -> Self {
        Self {
            sheet_name: DEFAULT_SHEET_NAME.to_string(),
            id_column: DEFAULT_ID_COLUMN.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct WorksheetRow {
    values: HashMap<String, Cell>,
}

impl WorksheetRow {
    pub fn get(&self, column: &str) -> Option<&Cell> {
        self.values.get(column)
    }
}

#[derive(Debug, Clone)]
pub struct Worksheet {
    pub source: PathBuf,
    id_column: String,
    columns: Vec<String>,
    rows: Vec<WorksheetRow>,
}

impl Worksheet {
    /// Load a worksheet, choosing the reader from the file extension
    pub fn load<P: AsRef<Path>>(path: P, options: &WorksheetOptions) -> CovidSeqResult<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        let worksheet = match extension.as_str() {
            ext if SPREADSHEET_EXTENSIONS.contains(&ext) => Self::from_spreadsheet(path, options)?,
            "csv" => Self::from_delimited(path, b',', options)?,
            "tsv" | "txt" => Self::from_delimited(path, b'\t', options)?,
            "json" => Self::from_json(path, options)?,
            _ => {
                return Err(worksheet_error(
                    path,
                    format!("unsupported worksheet format '{}'", extension),
                ))
            }
        };

        log::info!(
            "Loaded worksheet {} ({} rows)",
            path.display(),
            worksheet.len()
        );
        Ok(worksheet)
    }

    fn from_spreadsheet(path: &Path, options: &WorksheetOptions) -> CovidSeqResult<Self> {
        let mut workbook = open_workbook_auto(path).map_err(|e| worksheet_error(path, e))?;
        let range = workbook
            .worksheet_range(&options.sheet_name)
            .map_err(|e| worksheet_error(path, format!("sheet '{}': {}", options.sheet_name, e)))?;

        let mut rows = range.rows();
        let header = rows
            .next()
            .ok_or_else(|| worksheet_error(path, "sheet is empty"))?
            .iter()
            .map(|cell| cell.to_string())
            .collect();
        let body = rows
            .map(|row| row.iter().map(cell_from_data).collect())
            .collect();

        Self::from_parts(path, options, header, body)
    }

    fn from_delimited(
        path: &Path,
        delimiter: u8,
        options: &WorksheetOptions,
    ) -> CovidSeqResult<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .from_path(path)
            .map_err(|e| worksheet_error(path, e))?;

        let header = reader
            .headers()
            .map_err(|e| worksheet_error(path, e))?
            .iter()
            .map(str::to_string)
            .collect();

        let mut body = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| worksheet_error(path, e))?;
            body.push(record.iter().map(Cell::from_text).collect());
        }

        Self::from_parts(path, options, header, body)
    }

    /// Either a bare array of row objects or an object keyed by sheet name
    fn from_json(path: &Path, options: &WorksheetOptions) -> CovidSeqResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| worksheet_error(path, e))?;
        let root: Value = serde_json::from_str(&content).map_err(|e| worksheet_error(path, e))?;

        let rows = match &root {
            Value::Array(rows) => rows,
            Value::Object(sheets) => match sheets.get(&options.sheet_name) {
                Some(Value::Array(rows)) => rows,
                _ => {
                    return Err(worksheet_error(
                        path,
                        format!("no '{}' array in document", options.sheet_name),
                    ))
                }
            },
            _ => return Err(worksheet_error(path, "expected an array of rows")),
        };

        let mut header: Vec<String> = Vec::new();
        for row in rows {
            let Value::Object(fields) = row else {
                return Err(worksheet_error(path, "worksheet rows must be objects"));
            };
            for key in fields.keys() {
                if !header.contains(key) {
                    header.push(key.clone());
                }
            }
        }

        let body = rows
            .iter()
            .map(|row| {
                header
                    .iter()
                    .map(|column| row.get(column).map(cell_from_json).unwrap_or(Cell::Empty))
                    .collect()
            })
            .collect();

        Self::from_parts(path, options, header, body)
    }

    /// Build from a header and positional rows. Later duplicate headers are
    /// ignored and fully blank rows are dropped.
    pub fn from_parts<P: AsRef<Path>>(
        source: P,
        options: &WorksheetOptions,
        header: Vec<String>,
        body: Vec<Vec<Cell>>,
    ) -> CovidSeqResult<Self> {
        let source = source.as_ref();
        let header: Vec<String> = header.into_iter().map(|h| h.trim().to_string()).collect();

        if !header.iter().any(|h| h == &options.id_column) {
            return Err(worksheet_error(
                source,
                format!("missing identifier column '{}'", options.id_column),
            ));
        }

        let mut columns = Vec::with_capacity(header.len());
        for name in &header {
            if !name.is_empty() && !columns.contains(name) {
                columns.push(name.clone());
            }
        }

        let rows = body
            .into_iter()
            .filter(|cells| cells.iter().any(|c| !c.is_empty()))
            .map(|cells| {
                let mut values = HashMap::new();
                for (name, cell) in header.iter().zip(cells) {
                    if !name.is_empty() {
                        values.entry(name.clone()).or_insert(cell);
                    }
                }
                WorksheetRow { values }
            })
            .collect();

        Ok(Self {
            source: source.to_path_buf(),
            id_column: options.id_column.clone(),
            columns,
            rows,
        })
    }

    pub fn id_column(&self) -> &str {
        &self.id_column
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows whose identifier column matches `sample_id`, in sheet order
    pub fn rows_for<'a, 's>(
        &'a self,
        sample_id: &'s str,
    ) -> impl Iterator<Item = &'a WorksheetRow> + 's
    where
        'a: 's,
    {
        self.rows
            .iter()
            .filter(move |row| self.row_matches(row, sample_id))
    }

    fn row_matches(&self, row: &WorksheetRow, sample_id: &str) -> bool {
        row.get(&self.id_column)
            .and_then(Cell::as_text)
            .map_or(false, |id| id.trim() == sample_id)
    }

    pub fn first_row<'a>(&'a self, sample_id: &str) -> Option<&'a WorksheetRow> {
        self.rows.iter().find(|row| self.row_matches(row, sample_id))
    }

    /// First matching row, first value; `None` when no row or no column
    pub fn first_value<'a>(&'a self, sample_id: &str, column: &str) -> Option<&'a Cell> {
        self.first_row(sample_id)?.get(column)
    }
}

fn worksheet_error<E: fmt::Display>(path: &Path, reason: E) -> CovidSeqError {
    CovidSeqError::Worksheet {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn cell_from_data(data: &Data) -> Cell {
    match data {
        Data::Empty | Data::Error(_) => Cell::Empty,
        Data::String(s) => Cell::from_text(s),
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Bool(*b),
        other => Cell::from_text(&other.to_string()),
    }
}

fn cell_from_json(value: &Value) -> Cell {
    match value {
        Value::Null => Cell::Empty,
        Value::String(s) => Cell::from_text(s),
        Value::Number(n) => n.as_f64().map(Cell::Number).unwrap_or(Cell::Empty),
        Value::Bool(b) => Cell::Bool(*b),
        Value::Array(items) => Cell::List(
            items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect(),
        ),
        Value::Object(_) => Cell::Text(value.to_string()),
    }
}
