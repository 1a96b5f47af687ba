//! Filter + summary stage over the extractor output tree.

use std::{sync::Mutex, time::Instant};

use anyhow::{bail, Result};
use log::{debug, error, info, warn};
use rayon::{prelude::*, ThreadPool};

use crate::{
    config::{build_pool, CleanConfig},
    filter::{filter_file, Verdict},
    layout::{clear_stale_csv, database_dir_name, ensure_dir, find_files_with_extension, list_database_dirs},
    stats::{format_elapsed, progress_bar, CleanReport},
    summary::{build_summary, SummaryTable},
};

#[derive(Debug)]
pub struct CleanRun {
    pub reports: Vec<CleanReport>,
    pub failed: Vec<(String, String)>,
    pub summary: SummaryTable,
}

impl CleanRun {
    pub fn files_kept(&self) -> u64 {
        self.reports.iter().map(|r| r.files_kept).sum()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.reports.iter().all(|r| r.errors.is_empty())
    }
}

/// Filters `<input_dir>/<db>/*.csv` into `<output_dir>/<db>/`.
pub fn clean_database(database: &str, config: &CleanConfig, pool: &ThreadPool) -> Result<CleanReport> {
    let start_time = Instant::now();
    let dir_name = database_dir_name(database);
    let input_folder = config.input_dir.join(&dir_name);
    if !input_folder.is_dir() {
        bail!("CSV folder not found: {}", input_folder.display());
    }

    let files = find_files_with_extension(&input_folder, "csv")?;
    let output_folder = config.output_dir.join(&dir_name);
    ensure_dir(&output_folder)?;
    clear_stale_csv(&output_folder)?;

    info!("Cleaning {} CSV files from database '{}'...", files.len(), database);
    let pb = progress_bar(files.len(), config.show_progress);
    pb.set_message(format!("Cleaning {}", database));

    let report = Mutex::new(CleanReport::new(&dir_name));
    pool.install(|| {
        files.par_iter().for_each(|src| {
            let dst = match src.file_name() {
                Some(name) => output_folder.join(name),
                None => return,
            };
            let result = filter_file(src, &dst, config.io_retries);
            let mut report = report.lock().unwrap_or_else(|e| e.into_inner());
            report.files_scanned += 1;
            match result {
                Ok(Verdict::Keep { .. }) => report.files_kept += 1,
                Ok(Verdict::Drop(reason)) => {
                    debug!("Dropped {}: {:?}", src.display(), reason);
                    report.record_drop(reason);
                }
                Err(e) => {
                    warn!("Could not clean {}: {:#}", src.display(), e);
                    report.errors.push((src.clone(), format!("{:#}", e)));
                }
            }
            pb.inc(1);
        });
    });
    pb.finish_with_message(format!("Finished {}", database));

    let mut report = report.into_inner().unwrap_or_else(|e| e.into_inner());
    report.errors.sort();
    info!("Cleaning '{}' took {}", database, format_elapsed(start_time.elapsed()));
    Ok(report)
}

/// Runs the filter over the selected databases (every folder of the input
/// root when none is named), then rebuilds the summary from the whole clean
/// root.
pub fn clean_databases(config: &CleanConfig) -> Result<CleanRun> {
    if !config.input_dir.is_dir() {
        bail!("CSV root directory not found: {}", config.input_dir.display());
    }
    ensure_dir(&config.output_dir)?;

    let databases = if config.databases.is_empty() {
        list_database_dirs(&config.input_dir)?
    } else {
        config.databases.clone()
    };
    if databases.is_empty() {
        bail!("No database folders found in {}", config.input_dir.display());
    }

    let pool = build_pool(config.threads)?;
    let mut reports = Vec::new();
    let mut failed = Vec::new();
    for database in &databases {
        match clean_database(database, config, &pool) {
            Ok(report) => {
                report.log();
                reports.push(report);
            }
            Err(e) => {
                error!("Cleaning of '{}' aborted: {:#}", database, e);
                failed.push((database.clone(), format!("{:#}", e)));
            }
        }
    }

    let summary = build_summary(&config.output_dir)?;
    summary.write(&config.summary_path(), config.io_retries)?;
    if summary.rows.is_empty() {
        warn!("No entries retained (all surface areas were missing, zero or invalid).");
    }

    Ok(CleanRun {
        reports,
        failed,
        summary,
    })
}
