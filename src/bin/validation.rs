//! COVIDSeq Validation Tool
//!
//! Limit-of-detection and agreement summaries for a validation run: which
//! control samples were called as their known strain, detection by
//! concentration, and PPA/NPA with Wilson intervals

use anyhow::{Context, Result};
use clap::{Arg, Command};
use covidseq_qc_tools::aggregate::OUTPUT_DIR;
use covidseq_qc_tools::cli::{init_logging, run_args, run_config_from_matches};
use covidseq_qc_tools::validation::{
    agreement, clinical_correlation, sensitivity_by_concentration, write_all_data_csv,
    write_clinical_correlation_csv, write_sensitivity_csv, Proportion,
};
use covidseq_qc_tools::RunAggregator;
use std::path::PathBuf;

fn main() -> Result<()> {
    init_logging();

    let matches = Command::new("covidseq-validation")
        .version("0.1.0")
        .about("Sensitivity and agreement summaries for a COVIDSeq validation run")
        .author("Megan Johnson")
        .args(run_args())
        .arg(
            Arg::new("output_dir")
                .short('o')
                .long("output-dir")
                .value_name("DIRECTORY")
                .help("Directory for the validation tables [default: <run folder>/Script Output]"),
        )
        .arg(
            Arg::new("alpha")
                .long("alpha")
                .value_name("ALPHA")
                .help("Significance level for the Wilson intervals")
                .default_value("0.05"),
        )
        .arg(
            Arg::new("clinical_rows")
                .long("clinical-rows")
                .value_name("N")
                .help("Number of samples in the clinical correlation table")
                .default_value("20"),
        )
        .get_matches();

    // Parse arguments
    let config = run_config_from_matches(&matches)?;
    let alpha: f64 = matches
        .get_one::<String>("alpha")
        .context("missing --alpha")?
        .parse()?;
    let clinical_rows: usize = matches
        .get_one::<String>("clinical_rows")
        .context("missing --clinical-rows")?
        .parse()?;
    if !(alpha > 0.0 && alpha < 1.0) {
        anyhow::bail!("Alpha must be between 0 and 1, got {}", alpha);
    }

    let output_dir = matches
        .get_one::<String>("output_dir")
        .map(PathBuf::from)
        .unwrap_or_else(|| config.run_folder.join(OUTPUT_DIR));

    println!("🧪 COVIDSeq Validation Tool");
    println!("Run folder: {}", config.run_folder.display());
    println!("Output: {}", output_dir.display());

    let aggregator = RunAggregator::new(config);
    let table = aggregator
        .aggregate()
        .with_context(|| format!("Failed to aggregate {}", aggregator.config.run_folder.display()))?;

    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Cannot create {}", output_dir.display()))?;

    println!("📈 Computing validation summaries...");
    let sensitivity = sensitivity_by_concentration(&table, alpha);
    let clinical = clinical_correlation(&table, clinical_rows);
    let agreement_summary = agreement(&table, alpha);

    write_all_data_csv(&table, output_dir.join("all_data.csv"))?;
    write_sensitivity_csv(&sensitivity, output_dir.join("sensitivity.csv"))?;
    write_clinical_correlation_csv(&clinical, output_dir.join("clinical_correlation.csv"))?;

    println!("✅ Validation summary complete!");
    println!("🏷️  Run: {}", table.run);
    println!("📚 Samples: {} ({} skipped)", table.len(), table.failures.len());
    for row in &sensitivity {
        println!(
            "  {} copies/mL: {}/{} detected ({:.1}%)",
            row.copies_per_ml,
            row.correct,
            row.total,
            row.percent_detected * 100.0
        );
    }
    println!("🎯 PPA {}", describe(&agreement_summary.ppa));
    println!("🎯 NPA {}", describe(&agreement_summary.npa));
    println!("💾 Tables saved to: {}", output_dir.display());

    Ok(())
}

fn describe(proportion: &Proportion) -> String {
    match (proportion.rate(), proportion.interval) {
        (Some(rate), Some((lower, upper))) => format!(
            "{}/{} = {:.1}% (CI {:.4} - {:.4})",
            proportion.successes,
            proportion.total,
            rate * 100.0,
            lower,
            upper
        ),
        _ => "n/a (no samples)".to_string(),
    }
}
