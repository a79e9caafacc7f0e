//! Fixture builders shared by the module tests

use crate::report::ReportSection;
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::path::Path;

pub struct ReportFixture {
    pub sample_name: String,
    pub total_reads: f64,
    pub trim_percent: f64,
    pub human_mapped_percent: f64,
    pub target_mapped_percent: f64,
    pub duplicates_percent: f64,
    pub median_coverage: f64,
    pub average_coverage: f64,
    pub low_coverage_percent: f64,
    pub omitted: HashSet<ReportSection>,
}

impl ReportFixture {
    pub fn new(sample_name: &str) -> Self {
        Self {
            sample_name: sample_name.to_string(),
            total_reads: 250_000.0,
            trim_percent: 95.3,
            human_mapped_percent: 1.2,
            target_mapped_percent: 98.7,
            duplicates_percent: 35.0,
            median_coverage: 1520.0,
            average_coverage: 1488.5,
            low_coverage_percent: 2.1,
            omitted: HashSet::new(),
        }
    }

    pub fn without(mut self, section: ReportSection) -> Self {
        self.omitted.insert(section);
        self
    }
}

pub fn report_json(fixture: &ReportFixture) -> String {
    let sections = [
        (
            ReportSection::SequencingReadsQc,
            json!({"quality_distribution": {"table_1": []}}),
        ),
        (
            ReportSection::ReadsSummary,
            json!({"summary_statistics": {"table_1": [{
                "sample_name": fixture.sample_name,
                "reads_number_of": fixture.total_reads,
            }]}}),
        ),
        (
            ReportSection::TrimReads,
            json!({"trim_summary": {"table_1": [{
                "reads_after_trim_percent": fixture.trim_percent,
            }]}}),
        ),
        (
            ReportSection::ReadMappingSummary,
            json!({"reads_summary": {"table_1": [
                {"reference": "hg38", "mapped_reads_percent": fixture.human_mapped_percent},
                {"reference": "MN908947.3", "mapped_reads_percent": fixture.target_mapped_percent},
            ]}}),
        ),
        (
            ReportSection::DuplicatedMappedReads,
            json!({"table_1": [{"duplicates_percent": fixture.duplicates_percent}]}),
        ),
        (
            ReportSection::TargetedQc,
            json!({"summary": {"table_1": [{
                "median_coverage": fixture.median_coverage,
                "avg._coverage": fixture.average_coverage,
                "length_of_target_region_positions_with_low_coverage_percent":
                    fixture.low_coverage_percent,
            }]}}),
        ),
    ];

    let mut data = Map::new();
    for (section, value) in sections {
        if !fixture.omitted.contains(&section) {
            data.insert(section.key().to_string(), value);
        }
    }
    json!({ "data": Value::Object(data) }).to_string()
}

pub fn write_report(path: &Path, fixture: &ReportFixture) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, report_json(fixture)).unwrap();
}

pub const WORKSHEET_HEADER: [&str; 15] = [
    "Sequencing ID",
    "Nextclade_pango",
    "clade",
    "Strain",
    "Calculated Concentration",
    "totalSubstitutions",
    "totalDeletions",
    "totalInsertions",
    "totalMissing",
    "substitutions",
    "deletions",
    "insertions",
    "aaSubstitutions",
    "aaDeletions",
    "aaInsertions",
];

/// Two-sample worksheet: S1 is a BA.2 control at 1000 copies/mL, S2 has no strain
pub fn worksheet_rows() -> Vec<[&'static str; 15]> {
    vec![
        [
            "S1",
            "BA.2",
            "21L",
            "BA.2",
            "1000",
            "3",
            "1",
            "0",
            "12",
            "C241T,C3037T,A23403G",
            "21633-21641",
            "",
            "S:D614G,ORF1b:P314L,N:R203K",
            "S:L24-",
            "",
        ],
        [
            "S2",
            "BA.5.2",
            "22B",
            "",
            "",
            "2",
            "0",
            "1",
            "40",
            "C241T,C3037T",
            "",
            "22204:GAGCCAGAA",
            "S:D614G,N:P13L",
            "",
            "S:214:EPE",
        ],
    ]
}

pub fn write_csv_worksheet(path: &Path) {
    let mut writer = csv::Writer::from_path(path).unwrap();
    writer.write_record(WORKSHEET_HEADER).unwrap();
    for row in worksheet_rows() {
        writer.write_record(row).unwrap();
    }
    writer.flush().unwrap();
}

/// Same content as the CSV worksheet, with numeric columns stored as numbers
pub fn write_xlsx_worksheet(path: &Path) {
    let mut workbook = rust_xlsxwriter::Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Samples").unwrap();
    for (col, name) in WORKSHEET_HEADER.iter().enumerate() {
        sheet.write_string(0, col as u16, *name).unwrap();
    }
    for (r, row) in worksheet_rows().iter().enumerate() {
        let excel_row = (r + 1) as u32;
        for (col, value) in row.iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            match value.parse::<f64>() {
                Ok(number) if col != 0 => {
                    sheet.write_number(excel_row, col as u16, number).unwrap();
                }
                _ => {
                    sheet.write_string(excel_row, col as u16, *value).unwrap();
                }
            }
        }
    }
    workbook.save(path).unwrap();
}
