//! Error types for run aggregation
//!
//! Field-level absence is not an error: missing report sections and
//! informational worksheet lookups resolve to `None` or the `"No Data"`
//! sentinel. The variants here are sample-level or run-level failures.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CovidSeqError {
    /// The report document could not be read or parsed at all.
    #[error("report unreadable: {}: {reason}", path.display())]
    ReportUnreadable { path: PathBuf, reason: String },

    /// The report has no sample name, so it cannot be joined to the worksheet.
    #[error("no sample name in reads summary of {}", path.display())]
    UnidentifiedSample { path: PathBuf },

    /// A required worksheet field has no matching row or column.
    #[error("sample {sample_id}: no worksheet value for required column '{column}'")]
    LookupMissRequired { sample_id: String, column: String },

    /// A required count column holds something other than a whole number.
    #[error("sample {sample_id}: column '{column}' is not a count: '{value}'")]
    InvalidCount {
        sample_id: String,
        column: String,
        value: String,
    },

    #[error("worksheet unreadable: {}: {reason}", path.display())]
    Worksheet { path: PathBuf, reason: String },

    /// Run-level problem detected before any extraction starts.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type CovidSeqResult<T> = Result<T, CovidSeqError>;
