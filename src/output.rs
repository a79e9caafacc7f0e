//! CSV output of run tables
//!
//! Column order is fixed by the downstream consumers of the results file.

use crate::aggregate::RunTable;
use crate::error::CovidSeqResult;
use crate::SampleRecord;
use std::path::Path;

/// One output column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Run,
    Sequence,
    TotalReads,
    Lineage,
    Clade,
    Strain,
    CopiesPerMl,
    TrimPercent,
    ContaminationRate,
    MapRate,
    DuplicateReadRate,
    MedianCoverage,
    AverageCoverage,
    LowCoveragePercent,
    SubstitutionCount,
    DeletionCount,
    InsertionCount,
    MissingBases,
    Substitutions,
    Deletions,
    Insertions,
    AaSubstitutions,
    AaDeletions,
    AaInsertions,
}

/// Columns of the per-run results file
pub const RESULT_COLUMNS: [Column; 18] = [
    Column::Run,
    Column::Sequence,
    Column::TotalReads,
    Column::Lineage,
    Column::Clade,
    Column::ContaminationRate,
    Column::MapRate,
    Column::MedianCoverage,
    Column::SubstitutionCount,
    Column::DeletionCount,
    Column::InsertionCount,
    Column::MissingBases,
    Column::Substitutions,
    Column::Deletions,
    Column::Insertions,
    Column::AaSubstitutions,
    Column::AaDeletions,
    Column::AaInsertions,
];

/// Every harvested field, used for the validation all-data table
pub const ALL_DATA_COLUMNS: [Column; 24] = [
    Column::Run,
    Column::Sequence,
    Column::TotalReads,
    Column::Lineage,
    Column::Clade,
    Column::Strain,
    Column::TrimPercent,
    Column::CopiesPerMl,
    Column::ContaminationRate,
    Column::MapRate,
    Column::DuplicateReadRate,
    Column::MedianCoverage,
    Column::AverageCoverage,
    Column::LowCoveragePercent,
    Column::SubstitutionCount,
    Column::DeletionCount,
    Column::InsertionCount,
    Column::MissingBases,
    Column::Substitutions,
    Column::Deletions,
    Column::Insertions,
    Column::AaSubstitutions,
    Column::AaDeletions,
    Column::AaInsertions,
];

impl Column {
    pub fn name(self) -> &'static str {
        match self {
            Column::Run => "Run",
            Column::Sequence => "Sequence",
            Column::TotalReads => "Total Reads",
            Column::Lineage => "Lineage",
            Column::Clade => "Clade",
            Column::Strain => "Strain",
            Column::CopiesPerMl => "Copies per mL",
            Column::TrimPercent => "Trim Percent",
            Column::ContaminationRate => "Contamination Rate",
            Column::MapRate => "Map Rate",
            Column::DuplicateReadRate => "Duplicate Read Rate",
            Column::MedianCoverage => "Median Coverage",
            Column::AverageCoverage => "Average Coverage",
            Column::LowCoveragePercent => "Positions with Low Coverage Percent",
            Column::SubstitutionCount => "Number of Substitutions",
            Column::DeletionCount => "Number of Deletions",
            Column::InsertionCount => "Number of Insertions",
            Column::MissingBases => "Number of Missing Bases",
            Column::Substitutions => "Substitutions",
            Column::Deletions => "Deletions",
            Column::Insertions => "Insertions",
            Column::AaSubstitutions => "AA_Substitutions",
            Column::AaDeletions => "AA_Deletions",
            Column::AaInsertions => "AA_Insertions",
        }
    }

    /// Cell text for one record. Absent report values are empty cells.
    pub fn render(self, run: &str, record: &SampleRecord) -> String {
        match self {
            Column::Run => run.to_string(),
            Column::Sequence => record.sequence.clone(),
            Column::TotalReads => optional(record.total_reads),
            Column::Lineage => record.lineage.clone(),
            Column::Clade => record.clade.clone(),
            Column::Strain => record.strain.clone(),
            Column::CopiesPerMl => record.copies_per_ml.clone(),
            Column::TrimPercent => optional(record.trim_percent),
            Column::ContaminationRate => optional(record.contamination_rate),
            Column::MapRate => optional(record.map_rate),
            Column::DuplicateReadRate => optional(record.duplicate_read_rate),
            Column::MedianCoverage => optional(record.median_coverage),
            Column::AverageCoverage => optional(record.average_coverage),
            Column::LowCoveragePercent => optional(record.low_coverage_percent),
            Column::SubstitutionCount => record.substitution_count.to_string(),
            Column::DeletionCount => record.deletion_count.to_string(),
            Column::InsertionCount => record.insertion_count.to_string(),
            Column::MissingBases => record.missing_bases.to_string(),
            Column::Substitutions => record.substitutions.join(","),
            Column::Deletions => record.deletions.join(","),
            Column::Insertions => record.insertions.join(","),
            Column::AaSubstitutions => record.aa_substitutions.join(","),
            Column::AaDeletions => record.aa_deletions.join(","),
            Column::AaInsertions => record.aa_insertions.join(","),
        }
    }
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Write `table` with the given columns. Extra columns are appended after
/// them, one value per record, in the same order as the records.
pub(crate) fn ensure_parent_dir(path: &Path) -> CovidSeqResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

pub fn write_table<P: AsRef<Path>>(
    table: &RunTable,
    columns: &[Column],
    extra: &[(&str, Vec<String>)],
    path: P,
) -> CovidSeqResult<()> {
    ensure_parent_dir(path.as_ref())?;
    let mut writer = csv::Writer::from_path(path.as_ref())?;

    let header: Vec<&str> = columns
        .iter()
        .map(|c| c.name())
        .chain(extra.iter().map(|(name, _)| *name))
        .collect();
    writer.write_record(&header)?;

    for (index, record) in table.records.iter().enumerate() {
        let row: Vec<String> = columns
            .iter()
            .map(|c| c.render(&table.run, record))
            .chain(
                extra
                    .iter()
                    .map(|(_, values)| values.get(index).cloned().unwrap_or_default()),
            )
            .collect();
        writer.write_record(&row)?;
    }

    writer.flush()?;
    log::info!(
        "Wrote {} row(s) to {}",
        table.records.len(),
        path.as_ref().display()
    );
    Ok(())
}

/// The per-run results file
pub fn write_results_csv<P: AsRef<Path>>(table: &RunTable, path: P) -> CovidSeqResult<()> {
    write_table(table, &RESULT_COLUMNS, &[], path)
}

/// Export the table, including skipped samples, as pretty JSON
pub fn export_json<P: AsRef<Path>>(table: &RunTable, path: P) -> anyhow::Result<()> {
    let json_content = serde_json::to_string_pretty(table)?;
    std::fs::write(path, json_content)?;
    Ok(())
}
