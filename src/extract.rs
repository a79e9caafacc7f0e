//! Sample extraction
//!
//! Joins one loaded report with the run worksheet. The join key is the
//! report's sample name truncated at the first underscore, computed once per
//! report and used for every lookup and for the `Sequence` field.

use crate::error::{CovidSeqError, CovidSeqResult};
use crate::report::CovidSeqReport;
use crate::worksheet::{Cell, Worksheet};
use crate::SampleRecord;

/// Sentinel for informational worksheet fields that were looked up and absent
pub const NO_DATA: &str = "No Data";

/// Worksheet columns harvested per sample
pub mod columns {
    pub const LINEAGE: &str = "Nextclade_pango";
    pub const CLADE: &str = "clade";
    pub const STRAIN: &str = "Strain";
    pub const CONCENTRATION: &str = "Calculated Concentration";

    pub const TOTAL_SUBSTITUTIONS: &str = "totalSubstitutions";
    pub const TOTAL_DELETIONS: &str = "totalDeletions";
    pub const TOTAL_INSERTIONS: &str = "totalInsertions";
    pub const TOTAL_MISSING: &str = "totalMissing";

    pub const SUBSTITUTIONS: &str = "substitutions";
    pub const DELETIONS: &str = "deletions";
    pub const INSERTIONS: &str = "insertions";
    pub const AA_SUBSTITUTIONS: &str = "aaSubstitutions";
    pub const AA_DELETIONS: &str = "aaDeletions";
    pub const AA_INSERTIONS: &str = "aaInsertions";
}

/// Normalize a multi-valued worksheet cell to an ordered list.
///
/// Comma-delimited text is split (pieces trimmed, blanks dropped), lists are
/// returned as they are, and any other scalar becomes a single entry.
pub fn normalize_variants(cell: &Cell) -> Vec<String> {
    match cell {
        Cell::Empty => Vec::new(),
        Cell::Text(text) => text
            .split(',')
            .map(str::trim)
            .filter(|piece| !piece.is_empty())
            .map(str::to_string)
            .collect(),
        Cell::List(items) => items.clone(),
        other => vec![other.to_string()],
    }
}

/// Extracts flat sample records against a shared worksheet
pub struct SampleExtractor<'a> {
    worksheet: &'a Worksheet,
}

impl<'a> SampleExtractor<'a> {
    pub fn new(worksheet: &'a Worksheet) -> Self {
        Self { worksheet }
    }

    /// Build the record for one report.
    ///
    /// Fails with `UnidentifiedSample` when the report has no sample name and
    /// with `LookupMissRequired`/`InvalidCount` when a variant count cannot be
    /// read from the worksheet. Everything else degrades per field.
    pub fn extract(&self, report: &CovidSeqReport) -> CovidSeqResult<SampleRecord> {
        let sample_id = report
            .sample_id()
            .ok_or_else(|| CovidSeqError::UnidentifiedSample {
                path: report.source.clone(),
            })?;

        match self.worksheet.rows_for(&sample_id).count() {
            0 => log::warn!(
                "Sample {}: no row in worksheet {}, informational fields set to '{}'",
                sample_id,
                self.worksheet.source.display(),
                NO_DATA
            ),
            1 => {}
            n => log::warn!(
                "Sample {}: {} worksheet rows match, using the first",
                sample_id,
                n
            ),
        }

        let substitution_count = self.required_count(&sample_id, columns::TOTAL_SUBSTITUTIONS)?;
        let deletion_count = self.required_count(&sample_id, columns::TOTAL_DELETIONS)?;
        let insertion_count = self.required_count(&sample_id, columns::TOTAL_INSERTIONS)?;
        let missing_bases = self.required_count(&sample_id, columns::TOTAL_MISSING)?;

        let record = SampleRecord {
            total_reads: reported(&sample_id, "Total Reads", report.total_reads()),
            lineage: self.informational(&sample_id, columns::LINEAGE),
            clade: self.informational(&sample_id, columns::CLADE),
            strain: self.informational(&sample_id, columns::STRAIN),
            copies_per_ml: self.informational(&sample_id, columns::CONCENTRATION),
            trim_percent: reported(&sample_id, "Trim Percent", report.trim_fraction()),
            contamination_rate: reported(
                &sample_id,
                "Contamination Rate",
                report.contamination_rate(),
            ),
            map_rate: reported(&sample_id, "Map Rate", report.map_rate()),
            duplicate_read_rate: reported(
                &sample_id,
                "Duplicate Read Rate",
                report.duplicate_rate(),
            ),
            median_coverage: reported(&sample_id, "Median Coverage", report.median_coverage()),
            average_coverage: reported(&sample_id, "Average Coverage", report.average_coverage()),
            low_coverage_percent: reported(
                &sample_id,
                "Positions with Low Coverage Percent",
                report.low_coverage_fraction(),
            ),
            substitution_count,
            deletion_count,
            insertion_count,
            missing_bases,
            substitutions: self.variants(&sample_id, columns::SUBSTITUTIONS),
            deletions: self.variants(&sample_id, columns::DELETIONS),
            insertions: self.variants(&sample_id, columns::INSERTIONS),
            aa_substitutions: self.variants(&sample_id, columns::AA_SUBSTITUTIONS),
            aa_deletions: self.variants(&sample_id, columns::AA_DELETIONS),
            aa_insertions: self.variants(&sample_id, columns::AA_INSERTIONS),
            sequence: sample_id,
        };

        Ok(record)
    }

    /// First matching row, first value, or `"No Data"`. Never fails.
    pub fn informational(&self, sample_id: &str, column: &str) -> String {
        self.worksheet
            .first_value(sample_id, column)
            .and_then(Cell::as_text)
            .unwrap_or_else(|| NO_DATA.to_string())
    }

    /// First matching row, first value, which must be a whole number
    pub fn required_count(&self, sample_id: &str, column: &str) -> CovidSeqResult<u64> {
        let missing = || CovidSeqError::LookupMissRequired {
            sample_id: sample_id.to_string(),
            column: column.to_string(),
        };

        let cell = self
            .worksheet
            .first_value(sample_id, column)
            .filter(|cell| !cell.is_empty())
            .ok_or_else(missing)?;

        cell.as_count().ok_or_else(|| CovidSeqError::InvalidCount {
            sample_id: sample_id.to_string(),
            column: column.to_string(),
            value: cell.to_string(),
        })
    }

    /// Multi-valued field; empty when the sample or column is absent
    pub fn variants(&self, sample_id: &str, column: &str) -> Vec<String> {
        self.worksheet
            .first_value(sample_id, column)
            .map(normalize_variants)
            .unwrap_or_default()
    }
}

fn reported<T>(sample_id: &str, field: &str, value: Option<T>) -> Option<T> {
    if value.is_none() {
        log::warn!("Sample {}: '{}' not available in report", sample_id, field);
    }
    value
}
