use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use log::{error, info};

/// Settings for the extraction stage.
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    pub json_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Database names to process; empty means every folder under `json_dir`.
    pub databases: Vec<String>,
    pub threads: usize,
    pub io_retries: u32,
    pub stats_interval: Duration,
    pub show_progress: bool,
}

#[derive(Debug, Clone)]
pub struct CleanConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub databases: Vec<String>,
    pub summary_file_name: String,
    pub threads: usize,
    pub io_retries: u32,
    pub show_progress: bool,
}

impl CleanConfig {
    pub fn summary_path(&self) -> PathBuf {
        self.output_dir.join(&self.summary_file_name)
    }
}

/// `0` means one worker per CPU core.
pub fn resolve_threads(requested: usize) -> usize {
    if requested == 0 {
        let cores = num_cpus::get();
        info!("Auto-detected {} CPU cores. Using {} threads.", cores, cores);
        cores
    } else {
        info!("Using specified {} threads.", requested);
        requested
    }
}

pub fn build_pool(threads: usize) -> Result<rayon::ThreadPool> {
    let num_threads = resolve_threads(threads);
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .thread_name(|i| format!("mof-iso-worker-{}", i))
        .build()
        .map_err(|e| {
            error!("Failed to build thread pool with {} threads: {}", num_threads, e);
            e
        })
        .with_context(|| format!("Failed to build worker pool with {} threads", num_threads))
}
