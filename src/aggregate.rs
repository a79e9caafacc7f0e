//! Run-level aggregation
//!
//! Expects a run folder laid out by the sequencing lab:
//!
//! ```text
//! NGS220420-1MM/
//! ├── Consensus Sequences
//! ├── Exported Files
//! ├── Fastq
//! ├── Reports
//! ├── Sample Sheet
//! ├── Script Output
//! └── NGS220420-1MM_worksheet.xlsx
//! ```

use crate::error::{CovidSeqError, CovidSeqResult};
use crate::extract::SampleExtractor;
use crate::report::CovidSeqReport;
use crate::worksheet::{Worksheet, WorksheetOptions, SPREADSHEET_EXTENSIONS};
use crate::SampleRecord;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Subfolders of a complete run folder
pub const RUN_FOLDERS: [&str; 6] = [
    "Consensus Sequences",
    "Fastq",
    "Exported Files",
    "Reports",
    "Sample Sheet",
    "Script Output",
];

pub const DEFAULT_REPORTS_DIR: &str = "Reports";
pub const OUTPUT_DIR: &str = "Script Output";
pub const REPORT_EXTENSION: &str = "json";

/// What to do when a single sample cannot be loaded or extracted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Log the failure, record it on the table and continue
    #[default]
    Skip,
    /// Stop the run at the first failing sample
    Abort,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "skip" | "continue" => Ok(FailurePolicy::Skip),
            "abort" | "fail" => Ok(FailurePolicy::Abort),
            other => Err(format!("unknown failure policy '{}' (expected skip or abort)", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub run_folder: PathBuf,
    /// Use this worksheet instead of searching the run folder
    pub worksheet: Option<PathBuf>,
    pub reports_dir: String,
    pub worksheet_options: WorksheetOptions,
    pub failure_policy: FailurePolicy,
    /// Require every folder in `RUN_FOLDERS`, not just the reports folder
    pub strict_layout: bool,
    pub parallel: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            run_folder: PathBuf::from("."),
            worksheet: None,
            reports_dir: DEFAULT_REPORTS_DIR.to_string(),
            worksheet_options: WorksheetOptions::default(),
            failure_policy: FailurePolicy::default(),
            strict_layout: false,
            parallel: false,
        }
    }
}

impl RunConfig {
    pub fn new<P: Into<PathBuf>>(run_folder: P) -> Self {
        Self {
            run_folder: run_folder.into(),
            ..Self::default()
        }
    }

    pub fn reports_path(&self) -> PathBuf {
        self.run_folder.join(&self.reports_dir)
    }

    /// `<run folder>/Script Output/<run>_Results.csv`
    pub fn default_results_path(&self, run_id: &str) -> PathBuf {
        self.run_folder
            .join(OUTPUT_DIR)
            .join(format!("{}_Results.csv", run_id))
    }
}

/// A sample that was left out of the table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleFailure {
    pub report: PathBuf,
    pub error: String,
}

/// All extracted samples of one run, in report path order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunTable {
    pub run: String,
    pub records: Vec<SampleRecord>,
    pub failures: Vec<SampleFailure>,
}

impl RunTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

pub struct RunAggregator {
    pub config: RunConfig,
}

impl RunAggregator {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    /// Validate the run folder, load the worksheet and extract every report.
    ///
    /// Configuration problems fail before any report is read. Sample failures
    /// follow the configured `FailurePolicy`.
    pub fn aggregate(&self) -> CovidSeqResult<RunTable> {
        validate_layout(&self.config)?;

        let worksheet_path = match &self.config.worksheet {
            Some(path) => path.clone(),
            None => discover_worksheet(&self.config.run_folder)?,
        };
        let run = run_id_from_worksheet(&worksheet_path)?;
        let worksheet = Worksheet::load(&worksheet_path, &self.config.worksheet_options)?;
        let reports = discover_reports(&self.config.reports_path())?;

        log::info!(
            "Run {}: {} report(s) under {}",
            run,
            reports.len(),
            self.config.reports_path().display()
        );

        let extractor = SampleExtractor::new(&worksheet);
        let process = |path: &PathBuf| {
            CovidSeqReport::load(path).and_then(|report| extractor.extract(&report))
        };

        let outcomes: Vec<CovidSeqResult<SampleRecord>> = if self.config.parallel {
            reports.par_iter().map(process).collect()
        } else {
            reports.iter().map(process).collect()
        };

        let mut records = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        for (path, outcome) in reports.iter().zip(outcomes) {
            match outcome {
                Ok(record) => records.push(record),
                Err(e) => match self.config.failure_policy {
                    FailurePolicy::Abort => {
                        log::error!("{}: {}", path.display(), e);
                        return Err(e);
                    }
                    FailurePolicy::Skip => {
                        log::error!("Skipping {}: {}", path.display(), e);
                        failures.push(SampleFailure {
                            report: path.clone(),
                            error: e.to_string(),
                        });
                    }
                },
            }
        }

        Ok(RunTable {
            run,
            records,
            failures,
        })
    }
}

/// Check the run folder structure, reporting every missing folder at once
pub fn validate_layout(config: &RunConfig) -> CovidSeqResult<()> {
    if !config.run_folder.is_dir() {
        return Err(CovidSeqError::Configuration(format!(
            "run folder does not exist: {}",
            config.run_folder.display()
        )));
    }

    let required: Vec<&str> = if config.strict_layout {
        let mut folders = RUN_FOLDERS.to_vec();
        if !folders.contains(&config.reports_dir.as_str()) {
            folders.push(config.reports_dir.as_str());
        }
        folders
    } else {
        vec![config.reports_dir.as_str()]
    };

    let missing: Vec<&str> = required
        .into_iter()
        .filter(|name| !config.run_folder.join(name).is_dir())
        .collect();

    for name in &missing {
        log::error!(
            "Folder {} missing",
            config.run_folder.join(name).display()
        );
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(CovidSeqError::Configuration(format!(
            "missing folder(s) in {}: {}",
            config.run_folder.display(),
            missing.join(", ")
        )))
    }
}

/// Find the single spreadsheet anywhere under the run folder.
///
/// Excel lock files (`~$name.xlsx`) are ignored.
pub fn discover_worksheet(run_folder: &Path) -> CovidSeqResult<PathBuf> {
    let mut candidates: Vec<PathBuf> = files_under(run_folder)?
        .into_iter()
        .filter(|path| has_extension(path, &SPREADSHEET_EXTENSIONS))
        .filter(|path| {
            !path
                .file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n.starts_with("~$"))
        })
        .collect();

    match candidates.len() {
        0 => Err(CovidSeqError::Configuration(format!(
            "cannot find a worksheet in {}",
            run_folder.display()
        ))),
        1 => Ok(candidates.remove(0)),
        _ => Err(CovidSeqError::Configuration(format!(
            "found {} worksheets in {}: {}",
            candidates.len(),
            run_folder.display(),
            candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}

/// Run identifier from the worksheet file name.
///
/// `RUN42_worksheet.xlsx` gives `RUN42`, `NGS220420.1MM.xlsx` gives `NGS220420.1MM`.
pub fn run_id_from_worksheet(path: &Path) -> CovidSeqResult<String> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| {
            CovidSeqError::Configuration(format!("invalid worksheet name: {}", path.display()))
        })?;

    let trimmed = stem.trim();
    let without_token = if trimmed.to_ascii_lowercase().ends_with("worksheet") {
        &trimmed[..trimmed.len() - "worksheet".len()]
    } else {
        trimmed
    };
    let run = without_token.trim_matches(|c: char| matches!(c, '_' | '-' | '.' | ' '));

    if run.is_empty() {
        return Err(CovidSeqError::Configuration(format!(
            "cannot derive a run name from {}",
            path.display()
        )));
    }
    Ok(run.to_string())
}

/// Every report file at any depth under the reports folder, sorted by path
pub fn discover_reports(reports_dir: &Path) -> CovidSeqResult<Vec<PathBuf>> {
    let mut reports: Vec<PathBuf> = Vec::new();
    for path in files_under(reports_dir)? {
        if has_extension(&path, &[REPORT_EXTENSION]) {
            reports.push(path);
        } else {
            log::debug!("Ignoring non-report file {}", path.display());
        }
    }
    reports.sort();
    Ok(reports)
}

fn files_under(root: &Path) -> CovidSeqResult<Vec<PathBuf>> {
    let root_str = root.to_str().ok_or_else(|| {
        CovidSeqError::Configuration(format!("path is not valid UTF-8: {}", root.display()))
    })?;
    let pattern = format!("{}/**/*", glob::Pattern::escape(root_str));

    let entries = glob::glob(&pattern)
        .map_err(|e| CovidSeqError::Configuration(format!("bad search pattern: {}", e)))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| CovidSeqError::Io(e.into()))?;
        if path.is_file() {
            files.push(path);
        }
    }
    Ok(files)
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| {
            let e = e.to_ascii_lowercase();
            extensions.iter().any(|candidate| *candidate == e)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::ReportSection;
    use crate::test_support::{write_csv_worksheet, write_report, write_xlsx_worksheet, ReportFixture};
    use tempfile::tempdir;

    fn run_folder_with_reports(root: &Path, samples: &[&str]) {
        for folder in RUN_FOLDERS {
            std::fs::create_dir_all(root.join(folder)).unwrap();
        }
        for sample in samples {
            let path = root.join("Reports").join(format!("{}.json", sample));
            write_report(&path, &ReportFixture::new(&format!("{}_L001", sample)));
        }
    }

    #[test]
    fn test_run_id_from_worksheet() {
        let id = |name: &str| run_id_from_worksheet(Path::new(name)).unwrap();
        assert_eq!(id("RUN42_worksheet.xlsx"), "RUN42");
        assert_eq!(id("NGS220809.1KM_worksheet.xlsx"), "NGS220809.1KM");
        assert_eq!(id("NGS220420.1MM.xlsx"), "NGS220420.1MM");
        assert_eq!(id("RUN7-Worksheet.xlsx"), "RUN7");
        assert!(run_id_from_worksheet(Path::new("_worksheet.xlsx")).is_err());
    }

    #[test]
    fn test_failure_policy_parse() {
        assert_eq!("skip".parse::<FailurePolicy>(), Ok(FailurePolicy::Skip));
        assert_eq!("ABORT".parse::<FailurePolicy>(), Ok(FailurePolicy::Abort));
        assert!("maybe".parse::<FailurePolicy>().is_err());
    }

    #[test]
    fn test_end_to_end_two_reports() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        run_folder_with_reports(root, &["S2", "S1"]);
        write_xlsx_worksheet(&root.join("RUN42_worksheet.xlsx"));
        std::fs::write(root.join("Reports").join("notes.txt"), "not a report").unwrap();

        let table = RunAggregator::new(RunConfig::new(root)).aggregate().unwrap();

        assert_eq!(table.run, "RUN42");
        assert_eq!(table.len(), 2);
        assert!(table.failures.is_empty());
        let sequences: Vec<&str> = table.records.iter().map(|r| r.sequence.as_str()).collect();
        assert_eq!(sequences, vec!["S1", "S2"]);
        assert_eq!(table.records[0].lineage, "BA.2");
        assert_eq!(table.records[1].missing_bases, 40);
    }

    #[test]
    fn test_repeated_runs_write_identical_results() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        run_folder_with_reports(root, &["S2", "S1"]);
        write_xlsx_worksheet(&root.join("RUN42_worksheet.xlsx"));

        let config = RunConfig::new(root);
        let first = RunAggregator::new(config.clone()).aggregate().unwrap();
        let second = RunAggregator::new(config.clone()).aggregate().unwrap();

        let first_path = config.default_results_path(&first.run);
        crate::output::write_results_csv(&first, &first_path).unwrap();
        let first_bytes = std::fs::read(&first_path).unwrap();
        crate::output::write_results_csv(&second, &first_path).unwrap();
        assert_eq!(first_bytes, std::fs::read(&first_path).unwrap());
        assert!(first_path.ends_with("Script Output/RUN42_Results.csv"));
    }

    #[test]
    fn test_reports_found_recursively() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        run_folder_with_reports(root, &["S1"]);
        write_report(
            &root.join("Reports").join("lane2").join("S2.JSON"),
            &ReportFixture::new("S2_L002"),
        );

        let reports = discover_reports(&root.join("Reports")).unwrap();
        assert_eq!(reports.len(), 2);
    }

    #[test]
    fn test_no_worksheet_is_configuration_error() {
        let dir = tempdir().unwrap();
        run_folder_with_reports(dir.path(), &["S1"]);

        let err = RunAggregator::new(RunConfig::new(dir.path()))
            .aggregate()
            .unwrap_err();
        assert!(matches!(err, CovidSeqError::Configuration(_)));
    }

    #[test]
    fn test_two_worksheets_is_configuration_error() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        run_folder_with_reports(root, &["S1"]);
        write_xlsx_worksheet(&root.join("RUN42_worksheet.xlsx"));
        write_xlsx_worksheet(&root.join("Sample Sheet").join("RUN43_worksheet.xlsx"));

        let err = discover_worksheet(root).unwrap_err();
        assert!(matches!(err, CovidSeqError::Configuration(_)));
    }

    #[test]
    fn test_lock_file_ignored() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write_xlsx_worksheet(&root.join("RUN42_worksheet.xlsx"));
        std::fs::write(root.join("~$RUN42_worksheet.xlsx"), b"lock").unwrap();

        assert_eq!(
            discover_worksheet(root).unwrap(),
            root.join("RUN42_worksheet.xlsx")
        );
    }

    #[test]
    fn test_strict_layout_lists_missing_folders() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("Reports")).unwrap();

        let mut config = RunConfig::new(dir.path());
        assert!(validate_layout(&config).is_ok());

        config.strict_layout = true;
        match validate_layout(&config).unwrap_err() {
            CovidSeqError::Configuration(message) => {
                assert!(message.contains("Fastq"));
                assert!(message.contains("Script Output"));
                assert!(!message.contains("Reports"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_reports_folder() {
        let dir = tempdir().unwrap();
        let err = validate_layout(&RunConfig::new(dir.path())).unwrap_err();
        assert!(matches!(err, CovidSeqError::Configuration(_)));
    }

    #[test]
    fn test_skip_policy_records_failures() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        run_folder_with_reports(root, &["S1", "S99"]);
        std::fs::write(root.join("Reports").join("S0.json"), "{ truncated").unwrap();
        let worksheet = root.join("RUN42_worksheet.csv");
        write_csv_worksheet(&worksheet);

        let mut config = RunConfig::new(root);
        config.worksheet = Some(worksheet);
        let table = RunAggregator::new(config).aggregate().unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(table.records[0].sequence, "S1");
        assert_eq!(table.failures.len(), 2);
        assert!(table.failures[0].report.ends_with("S0.json"));
        assert!(table.failures[0].error.contains("report unreadable"));
        assert!(table.failures[1].error.contains("S99"));
    }

    #[test]
    fn test_abort_policy_stops_at_first_failure() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        run_folder_with_reports(root, &["S1"]);
        std::fs::write(root.join("Reports").join("S0.json"), "{ truncated").unwrap();
        let worksheet = root.join("RUN42_worksheet.csv");
        write_csv_worksheet(&worksheet);

        let mut config = RunConfig::new(root);
        config.worksheet = Some(worksheet);
        config.failure_policy = FailurePolicy::Abort;
        let err = RunAggregator::new(config).aggregate().unwrap_err();
        assert!(matches!(err, CovidSeqError::ReportUnreadable { .. }));
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        run_folder_with_reports(root, &["S2", "S1", "S99"]);
        write_xlsx_worksheet(&root.join("RUN42_worksheet.xlsx"));

        let sequential = RunAggregator::new(RunConfig::new(root)).aggregate().unwrap();
        let mut config = RunConfig::new(root);
        config.parallel = true;
        let parallel = RunAggregator::new(config).aggregate().unwrap();

        assert_eq!(sequential.records, parallel.records);
        assert_eq!(sequential.failures.len(), parallel.failures.len());
    }

    #[test]
    fn test_missing_section_still_yields_row() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        run_folder_with_reports(root, &["S2"]);
        write_report(
            &root.join("Reports").join("S1.json"),
            &ReportFixture::new("S1_L001").without(ReportSection::DuplicatedMappedReads),
        );
        write_xlsx_worksheet(&root.join("RUN42_worksheet.xlsx"));

        testing_logger::setup();
        let table = RunAggregator::new(RunConfig::new(root)).aggregate().unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.records[0].duplicate_read_rate, None);
        assert!(table.records[0].total_reads.is_some());
        assert!(table.records[1].duplicate_read_rate.is_some());

        testing_logger::validate(|captured| {
            let warnings: Vec<&str> = captured
                .iter()
                .filter(|entry| entry.level == log::Level::Warn)
                .map(|entry| entry.body.as_str())
                .collect();
            assert!(warnings
                .iter()
                .any(|w| w.ends_with("S1.json: missing duplicates report")));
            assert!(warnings
                .contains(&"Sample S1: 'Duplicate Read Rate' not available in report"));
        });
    }
}
