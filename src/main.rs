//! CLI entry point for the routine-data cleaning pipeline.

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use rhis_processing::{
    write_csv, Aggregator, IndicatorDeriver, Pipeline, PipelineConfig, RecordReader,
};
use std::fs;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    author = "RHIS Processing Team",
    version,
    about = "Cleaning and aggregation pipeline for routine health facility data",
    long_about = "Cleans routine health-facility reporting extracts: corrects outliers per\n\
                  reporting unit, derives composite indicators, and writes facility-level\n\
                  data plus monthly/yearly administrative aggregates.\n\n\
                  EXAMPLES:\n  \
                  # Clean a single extract with the default malaria indicator set\n  \
                  rhis-processing -i extract.csv\n\n  \
                  # Clean a directory of monthly extracts into a custom output dir\n  \
                  rhis-processing -i extracts/ -o cleaned/\n\n  \
                  # Use a run configuration file\n  \
                  rhis-processing -i extracts/ -c run_config.json\n\n  \
                  # Validate configuration and schema without processing\n  \
                  rhis-processing -i extracts/ --dry-run"
)]
struct Args {
    /// CSV file or directory of monthly extracts to process
    #[arg(short, long)]
    input: PathBuf,

    /// Output directory for cleaned data and aggregates
    #[arg(short, long, default_value = "./outputs")]
    output: PathBuf,

    /// JSON pipeline configuration file
    ///
    /// If not specified, the default malaria routine-reporting
    /// configuration is used
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Search subdirectories of the input directory for CSV files
    #[arg(long)]
    recursive: bool,

    /// Validate configuration and input schema without processing
    #[arg(long)]
    dry_run: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Suppress progress output (only show errors and the final result)
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level.clone()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("loading configuration from '{}'", path.display()))?,
        None => PipelineConfig::default(),
    };
    config.output_dir = args.output.clone();

    let reader = RecordReader::new().recursive(args.recursive);
    let df = reader
        .read_path(&args.input)
        .with_context(|| format!("ingesting '{}'", args.input.display()))?;
    info!(rows = df.height(), columns = df.width(), "Loaded input data");

    if args.dry_run {
        IndicatorDeriver::from_frame(&config.indicators, &df)
            .context("validating indicator definitions")?;
        println!(
            "Configuration valid: {} rows, {} outlier targets, {} groups, {} ratios",
            df.height(),
            config.outlier_fields.len(),
            config.indicators.groups.len(),
            config.indicators.ratios.len(),
        );
        return Ok(());
    }

    let mut builder = Pipeline::builder().config(config.clone());
    if !args.quiet {
        builder = builder.on_progress(|update| {
            eprintln!("[{:>3.0}%] {}", update.progress * 100.0, update.message);
        });
    }
    let report = builder.build()?.process(df)?;

    // Count fields worth summing at admin level: raw sources plus grouped
    // sums. Ratios are re-derived on the aggregates instead.
    let mut value_fields = config.indicators.source_fields();
    for group in &config.indicators.groups {
        value_fields.push(group.name.clone());
    }
    let aggregator = Aggregator::new(config.admin_levels.clone(), value_fields);

    let monthly = aggregator.monthly(&report.data)?;
    let yearly = aggregator.yearly(&report.data)?;
    let deriver = IndicatorDeriver::from_frame(&config.indicators, &monthly)
        .context("validating indicator definitions for aggregates")?;
    let (mut monthly, _) = deriver.derive(&monthly)?;
    let (mut yearly, _) = deriver.derive(&yearly)?;

    let mut facility = report.data.clone();
    write_csv(&mut facility, &config.output_dir, "cleaned_facility_monthly")?;
    write_csv(&mut monthly, &config.output_dir, "aggregate_monthly")?;
    write_csv(&mut yearly, &config.output_dir, "aggregate_yearly")?;

    let run_record = serde_json::json!({
        "generated_at": Local::now().to_rfc3339(),
        "input": args.input.display().to_string(),
        "summary": report.summary,
        "steps": report.steps,
    });
    fs::write(
        config.output_dir.join("run_summary.json"),
        serde_json::to_string_pretty(&run_record)?,
    )?;

    if !args.quiet {
        println!(
            "Processed {} records: {} outliers replaced, {} indicators derived ({} ms)",
            report.summary.rows,
            report.summary.outliers_replaced,
            report.summary.derived_fields,
            report.summary.duration_ms,
        );
        for warning in &report.summary.warnings {
            println!("warning: {warning}");
        }
        println!("Results written to {}", config.output_dir.display());
    }

    Ok(())
}
