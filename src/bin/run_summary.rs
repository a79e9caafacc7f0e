//! COVIDSeq Run Summary Tool
//!
//! Combines every sample report of a sequencing run with the run worksheet
//! into one results table

use anyhow::{Context, Result};
use clap::{Arg, Command};
use covidseq_qc_tools::cli::{init_logging, run_args, run_config_from_matches};
use covidseq_qc_tools::output::{export_json, write_results_csv};
use covidseq_qc_tools::RunAggregator;
use std::path::PathBuf;

fn main() -> Result<()> {
    init_logging();

    let matches = Command::new("covidseq-run-summary")
        .version("0.1.0")
        .about("Combine per-sample COVIDSeq QC reports and worksheet lineage calls into a results table")
        .author("Megan Johnson")
        .args(run_args())
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("CSV")
                .help("Output CSV file [default: <run folder>/Script Output/<run>_Results.csv]"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .value_name("JSON")
                .help("Also write the full table, including skipped samples, as JSON"),
        )
        .get_matches();

    let config = run_config_from_matches(&matches)?;
    let output_override = matches.get_one::<String>("output").map(PathBuf::from);
    let json_output = matches.get_one::<String>("json").map(PathBuf::from);

    println!("🧬 COVIDSeq Run Summary Tool");
    println!("Run folder: {}", config.run_folder.display());

    let aggregator = RunAggregator::new(config);
    println!("📊 Collecting sample reports...");
    let table = aggregator
        .aggregate()
        .with_context(|| format!("Failed to aggregate {}", aggregator.config.run_folder.display()))?;

    let output_file =
        output_override.unwrap_or_else(|| aggregator.config.default_results_path(&table.run));
    write_results_csv(&table, &output_file)
        .with_context(|| format!("Failed to write {}", output_file.display()))?;

    if let Some(json_file) = &json_output {
        export_json(&table, json_file)?;
    }

    println!("✅ Run summary complete!");
    println!("🏷️  Run: {}", table.run);
    println!("📚 Samples: {}", table.len());
    if !table.failures.is_empty() {
        println!("⚠️ Skipped samples: {}", table.failures.len());
        for failure in &table.failures {
            println!("  {}: {}", failure.report.display(), failure.error);
        }
    }
    println!("💾 Results saved to: {}", output_file.display());
    if let Some(json_file) = &json_output {
        println!("💾 JSON saved to: {}", json_file.display());
    }

    Ok(())
}
