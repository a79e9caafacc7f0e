//! Per-sample QC report loading
//!
//! A COVIDSeq report is a JSON document whose `data` object holds one entry
//! per analysis step. Each step we harvest from is parsed into its own typed
//! section, and every section is optional: a report missing its duplicates
//! step still yields read counts, mapping rates and coverage. Leaves are
//! optional too, so a value of the wrong type only loses that one field.

use crate::error::{CovidSeqError, CovidSeqResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};

/// Top-level report sections, in document order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportSection {
    SequencingReadsQc,
    ReadsSummary,
    TrimReads,
    ReadMappingSummary,
    DuplicatedMappedReads,
    TargetedQc,
}

impl ReportSection {
    pub const ALL: [ReportSection; 6] = [
        ReportSection::SequencingReadsQc,
        ReportSection::ReadsSummary,
        ReportSection::TrimReads,
        ReportSection::ReadMappingSummary,
        ReportSection::DuplicatedMappedReads,
        ReportSection::TargetedQc,
    ];

    /// Key of the section inside the report's `data` object
    pub fn key(self) -> &'static str {
        match self {
            ReportSection::SequencingReadsQc => "qc_for_sequencing_reads",
            ReportSection::ReadsSummary => "reads_summary",
            ReportSection::TrimReads => "trim_reads",
            ReportSection::ReadMappingSummary => "read_mapping_summary",
            ReportSection::DuplicatedMappedReads => "duplicated_mapped_reads",
            ReportSection::TargetedQc => "qc_for_targeted_sequencing",
        }
    }
}

impl fmt::Display for ReportSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ReportSection::SequencingReadsQc => "sequencing reads QC",
            ReportSection::ReadsSummary => "reads summary",
            ReportSection::TrimReads => "trim reads",
            ReportSection::ReadMappingSummary => "read mapping summary",
            ReportSection::DuplicatedMappedReads => "duplicates report",
            ReportSection::TargetedQc => "targeted sequencing QC",
        };
        f.write_str(label)
    }
}

/// The report tool writes every statistic as a list of rows under `table_1`
#[derive(Debug, Clone, Deserialize)]
pub struct Table<T> {
    pub table_1: Vec<T>,
}

impl<T> Table<T> {
    fn row(&self, index: usize) -> Option<&T> {
        self.table_1.get(index)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReadsSummary {
    pub summary_statistics: Table<ReadCountRow>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReadCountRow {
    #[serde(default, deserialize_with = "lenient_text")]
    pub sample_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub reads_number_of: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrimReads {
    pub trim_summary: Table<TrimRow>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrimRow {
    #[serde(default, deserialize_with = "lenient_number")]
    pub reads_after_trim_percent: Option<f64>,
}

/// Row 0 is the contamination reference (human), row 1 the SARS-CoV-2 genome
#[derive(Debug, Clone, Deserialize)]
pub struct ReadMappingSummary {
    pub reads_summary: Table<MappingRow>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MappingRow {
    #[serde(default, deserialize_with = "lenient_number")]
    pub mapped_reads_percent: Option<f64>,
}

pub type DuplicatedMappedReads = Table<DuplicatesRow>;

#[derive(Debug, Clone, Deserialize)]
pub struct DuplicatesRow {
    #[serde(default, deserialize_with = "lenient_number")]
    pub duplicates_percent: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetedQc {
    pub summary: Table<CoverageRow>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoverageRow {
    #[serde(default, deserialize_with = "lenient_number")]
    pub median_coverage: Option<f64>,
    #[serde(rename = "avg._coverage", default, deserialize_with = "lenient_number")]
    pub average_coverage: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub length_of_target_region_positions_with_low_coverage_percent: Option<f64>,
}

const CONTAMINATION_ROW: usize = 0;
const TARGET_ROW: usize = 1;

/// One sample's combined QC report
#[derive(Debug, Clone)]
pub struct CovidSeqReport {
    pub source: PathBuf,
    /// Kept for completeness; nothing is extracted from it yet
    pub sequencing_reads_qc: Option<Value>,
    pub reads_summary: Option<ReadsSummary>,
    pub trim_reads: Option<TrimReads>,
    pub read_mapping_summary: Option<ReadMappingSummary>,
    pub duplicated_mapped_reads: Option<DuplicatedMappedReads>,
    pub targeted_qc: Option<TargetedQc>,
}

impl CovidSeqReport {
    /// Load a report from disk.
    ///
    /// Unreadable files and invalid JSON are `ReportUnreadable`; missing or
    /// malformed sections are logged and left as `None`.
    pub fn load<P: AsRef<Path>>(path: P) -> CovidSeqResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| CovidSeqError::ReportUnreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_json_str(&content, path)
    }

    /// Parse a report held in memory; `source` is used for messages only
    pub fn from_json_str<P: AsRef<Path>>(content: &str, source: P) -> CovidSeqResult<Self> {
        let source = source.as_ref();
        let root: Value =
            serde_json::from_str(content).map_err(|e| CovidSeqError::ReportUnreadable {
                path: source.to_path_buf(),
                reason: e.to_string(),
            })?;

        let data = root.get("data");
        if data.is_none() {
            log::warn!("{}: report has no 'data' object", source.display());
        }

        Ok(Self {
            source: source.to_path_buf(),
            sequencing_reads_qc: raw_section(data, ReportSection::SequencingReadsQc, source)
                .cloned(),
            reads_summary: typed_section(data, ReportSection::ReadsSummary, source),
            trim_reads: typed_section(data, ReportSection::TrimReads, source),
            read_mapping_summary: typed_section(data, ReportSection::ReadMappingSummary, source),
            duplicated_mapped_reads: typed_section(
                data,
                ReportSection::DuplicatedMappedReads,
                source,
            ),
            targeted_qc: typed_section(data, ReportSection::TargetedQc, source),
        })
    }

    /// Sections that were absent or unusable in this report
    pub fn missing_sections(&self) -> Vec<ReportSection> {
        ReportSection::ALL
            .into_iter()
            .filter(|section| !self.has_section(*section))
            .collect()
    }

    pub fn has_section(&self, section: ReportSection) -> bool {
        match section {
            ReportSection::SequencingReadsQc => self.sequencing_reads_qc.is_some(),
            ReportSection::ReadsSummary => self.reads_summary.is_some(),
            ReportSection::TrimReads => self.trim_reads.is_some(),
            ReportSection::ReadMappingSummary => self.read_mapping_summary.is_some(),
            ReportSection::DuplicatedMappedReads => self.duplicated_mapped_reads.is_some(),
            ReportSection::TargetedQc => self.targeted_qc.is_some(),
        }
    }

    fn read_counts(&self) -> Option<&ReadCountRow> {
        self.reads_summary.as_ref()?.summary_statistics.row(0)
    }

    fn coverage(&self) -> Option<&CoverageRow> {
        self.targeted_qc.as_ref()?.summary.row(0)
    }

    fn mapped_percent(&self, row: usize) -> Option<f64> {
        self.read_mapping_summary
            .as_ref()?
            .reads_summary
            .row(row)?
            .mapped_reads_percent
    }

    /// Sample name exactly as recorded, e.g. `S123_L001`
    pub fn sample_name(&self) -> Option<&str> {
        self.read_counts()?.sample_name.as_deref()
    }

    /// Canonical sample identifier: the sample name up to its first underscore
    pub fn sample_id(&self) -> Option<String> {
        self.sample_name().map(sample_id_from_name)
    }

    pub fn total_reads(&self) -> Option<u64> {
        let reads = self.read_counts()?.reads_number_of?;
        (reads.is_finite() && reads >= 0.0 && reads.fract() == 0.0).then(|| reads as u64)
    }

    /// Fraction of reads surviving adapter and quality trimming
    pub fn trim_fraction(&self) -> Option<f64> {
        let row = self.trim_reads.as_ref()?.trim_summary.row(0)?;
        row.reads_after_trim_percent.map(percent_to_fraction)
    }

    /// Fraction of reads mapping to the SARS-CoV-2 reference
    pub fn map_rate(&self) -> Option<f64> {
        self.mapped_percent(TARGET_ROW).map(percent_to_fraction)
    }

    /// Fraction of reads mapping to the human reference
    pub fn contamination_rate(&self) -> Option<f64> {
        self.mapped_percent(CONTAMINATION_ROW).map(percent_to_fraction)
    }

    pub fn duplicate_rate(&self) -> Option<f64> {
        let row = self.duplicated_mapped_reads.as_ref()?.row(0)?;
        row.duplicates_percent.map(percent_to_fraction)
    }

    pub fn median_coverage(&self) -> Option<f64> {
        self.coverage()?.median_coverage
    }

    pub fn average_coverage(&self) -> Option<f64> {
        self.coverage()?.average_coverage
    }

    /// Fraction of target positions below the coverage threshold
    pub fn low_coverage_fraction(&self) -> Option<f64> {
        self.coverage()?
            .length_of_target_region_positions_with_low_coverage_percent
            .map(percent_to_fraction)
    }
}

/// Truncate a recorded sample name at its first underscore
pub fn sample_id_from_name(name: &str) -> String {
    name.split('_').next().unwrap_or(name).to_string()
}

fn percent_to_fraction(percent: f64) -> f64 {
    percent / 100.0
}

/// Numeric leaf; numbers written as text are accepted, anything else is absent
fn lenient_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let number = match &value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(number.filter(|n| n.is_finite()))
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) if !s.trim().is_empty() => Ok(Some(s)),
        _ => Ok(None),
    }
}

fn raw_section<'a>(
    data: Option<&'a Value>,
    section: ReportSection,
    source: &Path,
) -> Option<&'a Value> {
    let raw = data.and_then(|d| d.get(section.key())).filter(|v| !v.is_null());
    if raw.is_none() {
        log::warn!("{}: missing {}", source.display(), section);
    }
    raw
}

fn typed_section<T: DeserializeOwned>(
    data: Option<&Value>,
    section: ReportSection,
    source: &Path,
) -> Option<T> {
    let raw = raw_section(data, section, source)?;
    match T::deserialize(raw) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            log::warn!(
                "{}: {} has an unexpected shape, treating it as missing: {}",
                source.display(),
                section,
                e
            );
            None
        }
    }
}
