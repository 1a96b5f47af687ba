//! Drives the extractor over every JSON document of a database folder.

use std::{sync::Arc, time::Instant};

use anyhow::{bail, Result};
use log::{error, info, warn};
use rayon::{prelude::*, ThreadPool};

use crate::{
    config::{build_pool, ExtractConfig},
    extractor::Extractor,
    layout::{
        clear_stale_csv, database_dir_name, database_input_dir, ensure_dir, find_files_with_extension,
        list_database_dirs,
    },
    stats::{progress_bar, ExtractReport, ExtractionStats, StatsLogger},
};

/// Outcome of extracting several databases. A database lands in `failed`
/// only for run-aborting conditions; per-material problems stay inside its
/// report.
#[derive(Debug, Default)]
pub struct ExtractRun {
    pub reports: Vec<ExtractReport>,
    pub failed: Vec<(String, String)>,
}

impl ExtractRun {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Extracts one database: `<json_dir>/<db>/*.json` -> `<output_dir>/<db>/*.csv`.
/// CSV files from earlier runs are removed first, so the output folder only
/// reflects the current documents.
pub fn process_database(database: &str, config: &ExtractConfig, pool: &ThreadPool) -> Result<ExtractReport> {
    let start_time = Instant::now();
    let json_folder = database_input_dir(&config.json_dir, database);

    if !json_folder.is_dir() {
        bail!("JSON folder not found: {}", json_folder.display());
    }
    let files = find_files_with_extension(&json_folder, "json")?;
    if files.is_empty() {
        bail!("No JSON files found in {}", json_folder.display());
    }

    let output_folder = config.output_dir.join(database_dir_name(database));
    ensure_dir(&output_folder)?;
    clear_stale_csv(&output_folder)?;

    info!(
        "Processing database '{}', total {} JSON files -> {}",
        database,
        files.len(),
        output_folder.display()
    );

    let stats = Arc::new(ExtractionStats::new());
    let stats_logger = StatsLogger::spawn(
        Arc::clone(&stats),
        format!("Extracting {}", database),
        config.stats_interval,
    );
    let extractor = Extractor::new(database, &output_folder, config.io_retries);

    let pb = progress_bar(files.len(), config.show_progress);
    pb.set_message(format!("Extracting from {}", database));

    pool.install(|| {
        files.par_iter().for_each(|json_path| {
            let outcome = extractor.extract_file(json_path);
            if let Err(skip) = &outcome {
                warn!("Skipping {} ({}): {}", json_path.display(), skip.kind, skip.reason);
            }
            stats.record(&outcome);
            pb.inc(1);
        });
    });

    pb.finish_with_message(format!("Finished {}", database));
    stats_logger.stop();

    let report = stats.report(database, files.len(), start_time.elapsed());
    info!(
        "Finished '{}', total {} adsorption isotherms extracted.",
        database, report.isotherms_written
    );
    Ok(report)
}

/// Extracts every configured database, or every folder under the JSON root
/// when none is named.
pub fn extract_databases(config: &ExtractConfig) -> Result<ExtractRun> {
    if !config.json_dir.is_dir() {
        bail!("JSON root directory not found: {}", config.json_dir.display());
    }
    ensure_dir(&config.output_dir)?;

    let databases = if config.databases.is_empty() {
        list_database_dirs(&config.json_dir)?
    } else {
        config.databases.clone()
    };
    if databases.is_empty() {
        bail!("No database folders found in {}", config.json_dir.display());
    }
    info!("Databases selected for extraction: {}", databases.join(", "));

    let pool = build_pool(config.threads)?;
    let mut run = ExtractRun::default();
    for database in &databases {
        match process_database(database, config, &pool) {
            Ok(report) => {
                report.log();
                run.reports.push(report);
            }
            Err(e) => {
                error!("Extraction of '{}' aborted: {:#}", database, e);
                run.failed.push((database.clone(), format!("{:#}", e)));
            }
        }
    }

    info!(
        "All selected databases processed. CSV files are saved in: {}",
        config.output_dir.display()
    );
    Ok(run)
}
