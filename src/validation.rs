//! Assay validation summaries
//!
//! Compares called lineages against the known strain of each control sample
//! and summarises detection by dilution level, with Wilson score intervals.

use crate::aggregate::RunTable;
use crate::error::CovidSeqResult;
use crate::output::{ensure_parent_dir, write_table, ALL_DATA_COLUMNS};
use crate::{SampleRecord, NO_DATA};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;

pub const DEFAULT_ALPHA: f64 = 0.05;

pub const SENSITIVITY_HEADER: [&str; 6] = [
    "Copies per mL",
    "Correct",
    "Total",
    "CI_Lower",
    "CI_Upper",
    "Percent_Detected",
];

pub const CLINICAL_HEADER: [&str; 6] = [
    "Sequence",
    "Lineage",
    "Expected",
    "Median Coverage",
    "Number of Missing Bases",
    "Contamination Rate",
];

/// Detection at one concentration level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityRow {
    #[serde(rename = "Copies per mL")]
    pub copies_per_ml: String,
    #[serde(rename = "Correct")]
    pub correct: u64,
    #[serde(rename = "Total")]
    pub total: u64,
    #[serde(rename = "CI_Lower")]
    pub ci_lower: Option<f64>,
    #[serde(rename = "CI_Upper")]
    pub ci_upper: Option<f64>,
    #[serde(rename = "Percent_Detected")]
    pub percent_detected: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalRow {
    #[serde(rename = "Sequence")]
    pub sequence: String,
    #[serde(rename = "Lineage")]
    pub lineage: String,
    #[serde(rename = "Expected")]
    pub expected: String,
    #[serde(rename = "Median Coverage")]
    pub median_coverage: Option<f64>,
    #[serde(rename = "Number of Missing Bases")]
    pub missing_bases: u64,
    #[serde(rename = "Contamination Rate")]
    pub contamination_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proportion {
    pub successes: u64,
    pub total: u64,
    pub interval: Option<(f64, f64)>,
}

impl Proportion {
    pub fn new(successes: u64, total: u64, alpha: f64) -> Self {
        Self {
            successes,
            total,
            interval: wilson_interval(successes, total, alpha),
        }
    }

    pub fn rate(&self) -> Option<f64> {
        (self.total > 0).then(|| self.successes as f64 / self.total as f64)
    }
}

/// Positive and negative percent agreement against the known strains
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agreement {
    pub ppa: Proportion,
    pub npa: Proportion,
}

/// Wilson score interval for a binomial proportion.
///
/// `None` when there are no trials, more successes than trials, or `alpha`
/// is outside (0, 1).
pub fn wilson_interval(successes: u64, total: u64, alpha: f64) -> Option<(f64, f64)> {
    if total == 0 || successes > total || !(alpha > 0.0 && alpha < 1.0) {
        return None;
    }

    let z = Normal::new(0.0, 1.0).ok()?.inverse_cdf(1.0 - alpha / 2.0);
    let n = total as f64;
    let p = successes as f64 / n;
    let z2 = z * z;

    let denominator = 1.0 + z2 / n;
    let center = (p + z2 / (2.0 * n)) / denominator;
    let half_width = z * (p * (1.0 - p) / n + z2 / (4.0 * n * n)).sqrt() / denominator;

    let lower = if successes == 0 { 0.0 } else { (center - half_width).max(0.0) };
    let upper = if successes == total { 1.0 } else { (center + half_width).min(1.0) };
    Some((lower, upper))
}

/// A control sample is correct when its called lineage equals its known strain
pub fn is_correct(record: &SampleRecord) -> bool {
    has_known_strain(record) && record.strain == record.lineage
}

pub fn has_known_strain(record: &SampleRecord) -> bool {
    record.strain != NO_DATA
}

fn lineage_called(record: &SampleRecord) -> bool {
    let lineage = record.lineage.trim();
    !(lineage.is_empty()
        || lineage == NO_DATA
        || lineage.eq_ignore_ascii_case("unassigned")
        || lineage.eq_ignore_ascii_case("none"))
}

/// Detection rate per concentration level over samples with a known strain.
///
/// Samples without a concentration are left out. Levels are ordered
/// numerically when they parse as numbers, otherwise by text.
pub fn sensitivity_by_concentration(table: &RunTable, alpha: f64) -> Vec<SensitivityRow> {
    let mut groups: BTreeMap<&str, (u64, u64)> = BTreeMap::new();
    for record in table.records.iter().filter(|r| has_known_strain(r)) {
        if record.copies_per_ml == NO_DATA {
            continue;
        }
        let entry = groups.entry(record.copies_per_ml.as_str()).or_insert((0, 0));
        if is_correct(record) {
            entry.0 += 1;
        }
        entry.1 += 1;
    }

    let mut levels: Vec<(&str, (u64, u64))> = groups.into_iter().collect();
    levels.sort_by(|(a, _), (b, _)| compare_levels(a, b));

    levels
        .into_iter()
        .map(|(level, (correct, total))| {
            let interval = wilson_interval(correct, total, alpha);
            SensitivityRow {
                copies_per_ml: level.to_string(),
                correct,
                total,
                ci_lower: interval.map(|(lower, _)| lower),
                ci_upper: interval.map(|(_, upper)| upper),
                percent_detected: correct as f64 / total as f64,
            }
        })
        .collect()
}

fn compare_levels(a: &str, b: &str) -> Ordering {
    match (a.trim().parse::<f64>(), b.trim().parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// The first `limit` samples with their expected strain alongside the call
pub fn clinical_correlation(table: &RunTable, limit: usize) -> Vec<ClinicalRow> {
    table
        .records
        .iter()
        .take(limit)
        .map(|record| ClinicalRow {
            sequence: record.sequence.clone(),
            lineage: record.lineage.clone(),
            expected: record.strain.clone(),
            median_coverage: record.median_coverage,
            missing_bases: record.missing_bases,
            contamination_rate: record.contamination_rate,
        })
        .collect()
}

/// PPA over samples with a known strain, NPA over the rest
pub fn agreement(table: &RunTable, alpha: f64) -> Agreement {
    let (positives, negatives): (Vec<&SampleRecord>, Vec<&SampleRecord>) =
        table.records.iter().partition(|r| has_known_strain(r));

    let agreed_positive = positives.iter().filter(|r| is_correct(r)).count() as u64;
    let agreed_negative = negatives.iter().filter(|r| !lineage_called(r)).count() as u64;

    Agreement {
        ppa: Proportion::new(agreed_positive, positives.len() as u64, alpha),
        npa: Proportion::new(agreed_negative, negatives.len() as u64, alpha),
    }
}

/// `True`/`False` per record, in table order
pub fn correct_flags(table: &RunTable) -> Vec<String> {
    table
        .records
        .iter()
        .map(|r| (if is_correct(r) { "True" } else { "False" }).to_string())
        .collect()
}

/// All harvested fields plus the `Correct` column
pub fn write_all_data_csv<P: AsRef<Path>>(table: &RunTable, path: P) -> CovidSeqResult<()> {
    write_table(
        table,
        &ALL_DATA_COLUMNS,
        &[("Correct", correct_flags(table))],
        path,
    )
}

pub fn write_sensitivity_csv<P: AsRef<Path>>(rows: &[SensitivityRow], path: P) -> CovidSeqResult<()> {
    write_rows(&SENSITIVITY_HEADER, rows, path)
}

pub fn write_clinical_correlation_csv<P: AsRef<Path>>(
    rows: &[ClinicalRow],
    path: P,
) -> CovidSeqResult<()> {
    write_rows(&CLINICAL_HEADER, rows, path)
}

/// Header is written up front so an empty table still names its columns
fn write_rows<T: Serialize, P: AsRef<Path>>(
    header: &[&str],
    rows: &[T],
    path: P,
) -> CovidSeqResult<()> {
    ensure_parent_dir(path.as_ref())?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path.as_ref())?;
    writer.write_record(header)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}
