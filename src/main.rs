use std::{path::PathBuf, time::{Duration, Instant}};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use log::{error, info, warn, LevelFilter};
use simple_logger::SimpleLogger;
use time::macros::format_description;

use mof_iso::{
    clean_databases, extract_databases,
    layout::{CLEAN_DIR_NAME, ISOTHERM_DIR_NAME, JSON_DIR_NAME, SUMMARY_FILE_NAME},
    stats::format_elapsed,
    CleanConfig, CleanRun, ExtractConfig, ExtractRun,
};

#[derive(Parser)]
#[command(name = "MOF Isotherm Pipeline")]
#[command(about = "Extracts adsorption isotherms from MOF JSON files to CSV, filters them by surface area and writes a summary table.")]
#[command(version = "1.0.0")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(long, global = true, default_value = "data", help = "Data root holding the JSON, MOF_ISO and MOF_ISO_CLEAN folders")]
    root: PathBuf,

    #[arg(short, long, global = true, default_value = "INFO", help = "Logging level (TRACE, DEBUG, INFO, WARN, ERROR)")]
    log_level: String,

    #[arg(short, long, global = true, default_value = "0", help = "Number of threads to use (0 for auto)")]
    threads: usize,

    #[arg(short, long, global = true, default_value = "60", help = "Interval in seconds to log statistics")]
    stats_interval: u64,

    #[arg(long, global = true, default_value = "2", help = "Extra attempts for transient I/O errors")]
    io_retries: u32,

    #[arg(long, global = true, help = "Hide progress bars")]
    no_progress: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Extract isotherm CSV files from per-material JSON documents
    Extract(ExtractArgs),
    /// Filter extracted CSV files by surface area and write the summary
    Clean(CleanArgs),
    /// Extract, then clean
    Run(RunArgs),
}

#[derive(Args)]
struct ExtractArgs {
    #[arg(long, help = "Directory containing one folder of JSON files per database (default <root>/JSON)")]
    json_dir: Option<PathBuf>,

    #[arg(short, long, help = "Directory receiving one folder of CSV files per database (default <root>/MOF_ISO)")]
    output_dir: Option<PathBuf>,

    #[arg(short, long = "database", help = "Database to process; repeat for several (default: every folder)")]
    databases: Vec<String>,
}

#[derive(Args)]
struct CleanArgs {
    #[arg(short, long, help = "Directory holding the extracted CSV folders (default <root>/MOF_ISO)")]
    input_dir: Option<PathBuf>,

    #[arg(short, long, help = "Directory receiving the retained CSV folders (default <root>/MOF_ISO_CLEAN)")]
    output_dir: Option<PathBuf>,

    #[arg(short, long = "database", help = "Database to clean; repeat for several (default: every folder)")]
    databases: Vec<String>,

    #[arg(long, default_value = SUMMARY_FILE_NAME, help = "Summary file name, written inside the clean directory")]
    summary_file: String,
}

#[derive(Args)]
struct RunArgs {
    #[arg(short, long = "database", help = "Database to process; repeat for several (default: every folder)")]
    databases: Vec<String>,

    #[arg(long, default_value = SUMMARY_FILE_NAME, help = "Summary file name, written inside the clean directory")]
    summary_file: String,
}

struct Settings {
    root: PathBuf,
    threads: usize,
    io_retries: u32,
    stats_interval: Duration,
    show_progress: bool,
}

impl Settings {
    fn extract_config(&self, json_dir: Option<PathBuf>, output_dir: Option<PathBuf>, databases: Vec<String>) -> ExtractConfig {
        ExtractConfig {
            json_dir: json_dir.unwrap_or_else(|| self.root.join(JSON_DIR_NAME)),
            output_dir: output_dir.unwrap_or_else(|| self.root.join(ISOTHERM_DIR_NAME)),
            databases,
            threads: self.threads,
            io_retries: self.io_retries,
            stats_interval: self.stats_interval,
            show_progress: self.show_progress,
        }
    }

    fn clean_config(
        &self,
        input_dir: Option<PathBuf>,
        output_dir: Option<PathBuf>,
        databases: Vec<String>,
        summary_file_name: String,
    ) -> CleanConfig {
        CleanConfig {
            input_dir: input_dir.unwrap_or_else(|| self.root.join(ISOTHERM_DIR_NAME)),
            output_dir: output_dir.unwrap_or_else(|| self.root.join(CLEAN_DIR_NAME)),
            databases,
            summary_file_name,
            threads: self.threads,
            io_retries: self.io_retries,
            show_progress: self.show_progress,
        }
    }
}

fn run_extract(config: &ExtractConfig) -> Result<ExtractRun> {
    info!("Searching for JSON files in: {}", config.json_dir.display());
    extract_databases(config)
}

fn run_clean(config: &CleanConfig) -> Result<CleanRun> {
    info!("Filtering CSV files from: {}", config.input_dir.display());
    clean_databases(config)
}

fn log_extract_summary(run: &ExtractRun) -> usize {
    let written: u64 = run.reports.iter().map(|r| r.files_written).sum();
    let isotherms: u64 = run.reports.iter().map(|r| r.isotherms_written).sum();
    let skipped: usize = run.reports.iter().map(|r| r.skipped.len()).sum();
    info!("Databases extracted: {}", run.reports.len());
    info!("Material CSV files written: {}", written);
    info!("Isotherms written: {}", isotherms);
    info!("Materials skipped: {}", skipped);
    for (database, reason) in &run.failed {
        error!("Extraction failed for '{}': {}", database, reason);
    }
    run.failed.len()
}

fn log_clean_summary(run: &CleanRun) -> usize {
    let scanned: u64 = run.reports.iter().map(|r| r.files_scanned).sum();
    let dropped: u64 = run.reports.iter().map(|r| r.files_dropped()).sum();
    let file_errors: usize = run.reports.iter().map(|r| r.errors.len()).sum();
    info!("CSV files scanned: {}", scanned);
    info!("CSV files retained: {}", run.files_kept());
    info!("CSV files dropped: {}", dropped);
    if file_errors > 0 {
        warn!("CSV files that could not be read: {}", file_errors);
    }
    info!("Summary rows: {}", run.summary.rows.len());
    for (database, reason) in &run.failed {
        error!("Cleaning failed for '{}': {}", database, reason);
    }
    run.failed.len() + file_errors
}

fn main() -> Result<()> {
    let main_start_time = Instant::now();

    let cli = Cli::parse();

    let log_level = match cli.log_level.to_uppercase().as_str() {
        "TRACE" => LevelFilter::Trace,
        "DEBUG" => LevelFilter::Debug,
        "INFO" => LevelFilter::Info,
        "WARN" | "WARNING" => LevelFilter::Warn,
        "ERROR" => LevelFilter::Error,
        _ => {
            eprintln!("Invalid log level '{}', defaulting to INFO.", cli.log_level);
            LevelFilter::Info
        }
    };

    SimpleLogger::new()
        .with_level(log_level)
        .with_timestamp_format(format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"))
        .init()?;

    info!("Starting MOF Isotherm Pipeline v1.0.0");

    let settings = Settings {
        root: cli.root,
        threads: cli.threads,
        io_retries: cli.io_retries,
        stats_interval: Duration::from_secs(cli.stats_interval.max(1)),
        show_progress: !cli.no_progress,
    };

    let mut failures = 0;
    let mut extract_run = None;
    let mut clean_run = None;
    match cli.command {
        Command::Extract(args) => {
            let config = settings.extract_config(args.json_dir, args.output_dir, args.databases);
            extract_run = Some(run_extract(&config)?);
        }
        Command::Clean(args) => {
            let config = settings.clean_config(args.input_dir, args.output_dir, args.databases, args.summary_file);
            clean_run = Some(run_clean(&config)?);
        }
        Command::Run(args) => {
            let extract_config = settings.extract_config(None, None, args.databases.clone());
            let run = run_extract(&extract_config)?;
            // Only databases that extracted cleanly move on to the filter.
            let databases = if args.databases.is_empty() {
                Vec::new()
            } else {
                run.reports.iter().map(|r| r.database.clone()).collect()
            };
            let skip_clean = !args.databases.is_empty() && databases.is_empty();
            extract_run = Some(run);
            if skip_clean {
                warn!("No database extracted successfully, skipping the clean stage.");
            } else {
                let clean_config = settings.clean_config(
                    Some(extract_config.output_dir.clone()),
                    None,
                    databases,
                    args.summary_file,
                );
                clean_run = Some(run_clean(&clean_config)?);
            }
        }
    }

    info!("-------------------- FINAL SUMMARY --------------------");
    info!("Total execution time: {}", format_elapsed(main_start_time.elapsed()));
    if let Some(run) = &extract_run {
        failures += log_extract_summary(run);
    }
    if let Some(run) = &clean_run {
        failures += log_clean_summary(run);
    }
    info!("-------------------------------------------------------");

    if failures > 0 {
        error!("Processing finished with errors.");
        Err(anyhow::anyhow!("Processing finished with errors."))
    } else {
        info!("Processing finished successfully.");
        Ok(())
    }
}
