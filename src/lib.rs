//! COVIDSeq QC Tools
//!
//! Aggregates per-sample QC reports and worksheet lineage calls from a
//! COVIDSeq sequencing run into flat result tables.
//!
//! This library provides shared functionality for:
//! - Loading per-sample QC reports with independently optional sections
//! - Loading the run worksheet (Excel, CSV/TSV or JSON)
//! - Joining reports to worksheet rows by sample identifier
//! - Run-level aggregation and CSV output
//! - Validation summaries (sensitivity, agreement, Wilson intervals)

pub mod aggregate;
pub mod cli;
pub mod error;
pub mod extract;
pub mod output;
pub mod report;
pub mod validation;
pub mod worksheet;

#[cfg(test)]
mod test_support;

pub use aggregate::{FailurePolicy, RunAggregator, RunConfig, RunTable, SampleFailure};
pub use error::{CovidSeqError, CovidSeqResult};
pub use extract::{SampleExtractor, NO_DATA};
pub use report::CovidSeqReport;
pub use worksheet::{Cell, Worksheet, WorksheetOptions};

use serde::{Deserialize, Serialize};

/// One sample's flattened QC and lineage results.
///
/// Report-sourced metrics are `None` when their report section was missing.
/// Informational worksheet fields hold `"No Data"` when the worksheet had
/// nothing for the sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub sequence: String,
    pub total_reads: Option<u64>,
    pub lineage: String,
    pub clade: String,
    pub strain: String,
    pub copies_per_ml: String,
    pub trim_percent: Option<f64>,
    pub contamination_rate: Option<f64>,
    pub map_rate: Option<f64>,
    pub duplicate_read_rate: Option<f64>,
    pub median_coverage: Option<f64>,
    pub average_coverage: Option<f64>,
    pub low_coverage_percent: Option<f64>,
    pub substitution_count: u64,
    pub deletion_count: u64,
    pub insertion_count: u64,
    pub missing_bases: u64,
    pub substitutions: Vec<String>,
    pub deletions: Vec<String>,
    pub insertions: Vec<String>,
    pub aa_substitutions: Vec<String>,
    pub aa_deletions: Vec<String>,
    pub aa_insertions: Vec<String>,
}
