//! Command-line arguments shared by the run tools

use crate::aggregate::{FailurePolicy, RunConfig, DEFAULT_REPORTS_DIR};
use crate::worksheet::{WorksheetOptions, DEFAULT_ID_COLUMN, DEFAULT_SHEET_NAME};
use anyhow::{anyhow, Result};
use clap::{Arg, ArgAction, ArgMatches};
use std::path::PathBuf;

/// Arguments describing where a run's inputs live and how to treat failures
pub fn run_args() -> Vec<Arg> {
    vec![
        Arg::new("run_folder")
            .short('i')
            .long("run-folder")
            .value_name("DIRECTORY")
            .help("Run folder containing the Reports folder and the worksheet")
            .required(true),
        Arg::new("worksheet")
            .short('w')
            .long("worksheet")
            .value_name("FILE")
            .help("Worksheet to use instead of searching the run folder (xlsx, csv, tsv or json)"),
        Arg::new("sheet")
            .long("sheet")
            .value_name("NAME")
            .help("Worksheet sheet holding the sample table")
            .default_value(DEFAULT_SHEET_NAME),
        Arg::new("id_column")
            .long("id-column")
            .value_name("COLUMN")
            .help("Worksheet column holding the sample identifier")
            .default_value(DEFAULT_ID_COLUMN),
        Arg::new("reports_dir")
            .long("reports-dir")
            .value_name("NAME")
            .help("Folder under the run folder holding the JSON reports")
            .default_value(DEFAULT_REPORTS_DIR),
        Arg::new("on_error")
            .long("on-error")
            .value_name("POLICY")
            .help("What to do with a sample that cannot be extracted: skip or abort")
            .default_value("skip"),
        Arg::new("strict_layout")
            .long("strict-layout")
            .help("Require every standard run subfolder, not only Reports")
            .action(ArgAction::SetTrue),
        Arg::new("parallel")
            .long("parallel")
            .help("Extract samples in parallel")
            .action(ArgAction::SetTrue),
    ]
}

pub fn run_config_from_matches(matches: &ArgMatches) -> Result<RunConfig> {
    let string_arg = |name: &str| -> Result<String> {
        matches
            .get_one::<String>(name)
            .cloned()
            .ok_or_else(|| anyhow!("missing argument: {}", name))
    };

    let failure_policy: FailurePolicy = string_arg("on_error")?
        .parse()
        .map_err(|e: String| anyhow!(e))?;

    Ok(RunConfig {
        run_folder: PathBuf::from(string_arg("run_folder")?),
        worksheet: matches.get_one::<String>("worksheet").map(PathBuf::from),
        reports_dir: string_arg("reports_dir")?,
        worksheet_options: WorksheetOptions {
            sheet_name: string_arg("sheet")?,
            id_column: string_arg("id_column")?,
        },
        failure_policy,
        strict_layout: matches.get_flag("strict_layout"),
        parallel: matches.get_flag("parallel"),
    })
}

/// Log level comes from `RUST_LOG`, defaulting to info
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}
