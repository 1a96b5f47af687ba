use std::{
    fmt,
    path::PathBuf,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, PoisonError,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};

use crate::extractor::ExtractOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipKind {
    MalformedJson,
    MissingIdentifier,
    Io,
    IdCollision,
}

impl fmt::Display for SkipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SkipKind::MalformedJson => "malformed JSON",
            SkipKind::MissingIdentifier => "missing identifier",
            SkipKind::Io => "I/O error",
            SkipKind::IdCollision => "identifier collision",
        };
        f.write_str(label)
    }
}

/// A material that produced no output because of a failure.
#[derive(Debug, Clone)]
pub struct SkipRecord {
    pub path: PathBuf,
    pub kind: SkipKind,
    pub reason: String,
}

impl SkipRecord {
    pub fn new(path: impl Into<PathBuf>, kind: SkipKind, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind,
            reason: reason.into(),
        }
    }
}

/// Counters shared by every extraction worker of one database. Workers only
/// touch these through atomic adds and the skip-list mutex.
#[derive(Default)]
pub struct ExtractionStats {
    files_processed: AtomicU64,
    files_written: AtomicU64,
    files_no_data: AtomicU64,
    files_duplicate: AtomicU64,
    files_skipped: AtomicU64,
    isotherms_written: AtomicU64,
    rows_written: AtomicU64,
    points_dropped: AtomicU64,
    skips: Mutex<Vec<SkipRecord>>,
}

impl ExtractionStats {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn record(&self, outcome: &Result<ExtractOutcome, SkipRecord>) {
        self.files_processed.fetch_add(1, Ordering::Relaxed);
        match outcome {
            Ok(ExtractOutcome::Written {
                isotherms,
                rows,
                dropped_points,
                ..
            }) => {
                self.files_written.fetch_add(1, Ordering::Relaxed);
                self.isotherms_written.fetch_add(*isotherms as u64, Ordering::Relaxed);
                self.rows_written.fetch_add(*rows as u64, Ordering::Relaxed);
                self.points_dropped.fetch_add(*dropped_points as u64, Ordering::Relaxed);
            }
            Ok(ExtractOutcome::Duplicate { .. }) => {
                self.files_duplicate.fetch_add(1, Ordering::Relaxed);
            }
            Ok(ExtractOutcome::NoData { dropped_points, .. }) => {
                self.files_no_data.fetch_add(1, Ordering::Relaxed);
                self.points_dropped.fetch_add(*dropped_points as u64, Ordering::Relaxed);
            }
            Err(skip) => {
                self.files_skipped.fetch_add(1, Ordering::Relaxed);
                self.skips
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(skip.clone());
            }
        }
    }

    pub fn files_processed(&self) -> u64 {
        self.files_processed.load(Ordering::Relaxed)
    }

    pub fn log_current_stats(&self, stage: &str) {
        info!("--- Periodic Stats ({}) ---", stage);
        info!(" Files Processed: {}", self.files_processed.load(Ordering::Relaxed));
        info!(" CSV Files Written: {}", self.files_written.load(Ordering::Relaxed));
        info!(" Files Without Isotherm Data: {}", self.files_no_data.load(Ordering::Relaxed));
        info!(" Files Skipped: {}", self.files_skipped.load(Ordering::Relaxed));
        info!(" Rows Written: {}", self.rows_written.load(Ordering::Relaxed));
        info!("------------------------------");
    }

    /// Skips are sorted by path.
    pub fn report(&self, database: &str, files_seen: usize, elapsed: Duration) -> ExtractReport {
        let mut skipped = self.skips.lock().unwrap_or_else(PoisonError::into_inner).clone();
        skipped.sort_by(|a, b| a.path.cmp(&b.path));
        ExtractReport {
            database: database.to_string(),
            files_seen,
            files_written: self.files_written.load(Ordering::Relaxed),
            files_no_data: self.files_no_data.load(Ordering::Relaxed),
            files_duplicate: self.files_duplicate.load(Ordering::Relaxed),
            isotherms_written: self.isotherms_written.load(Ordering::Relaxed),
            rows_written: self.rows_written.load(Ordering::Relaxed),
            points_dropped: self.points_dropped.load(Ordering::Relaxed),
            skipped,
            elapsed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtractReport {
    pub database: String,
    pub files_seen: usize,
    pub files_written: u64,
    pub files_no_data: u64,
    pub files_duplicate: u64,
    pub isotherms_written: u64,
    pub rows_written: u64,
    pub points_dropped: u64,
    pub skipped: Vec<SkipRecord>,
    pub elapsed: Duration,
}

impl ExtractReport {
    pub fn log(&self) {
        info!("--- Extraction Summary ({}) ---", self.database);
        info!("Duration: {}", format_elapsed(self.elapsed));
        info!("JSON files seen: {}", self.files_seen);
        info!("CSV files written: {}", self.files_written);
        info!("Files without isotherm data: {}", self.files_no_data);
        if self.files_duplicate > 0 {
            info!("Duplicate identifiers with identical content: {}", self.files_duplicate);
        }
        info!("Isotherms written: {} ({} rows)", self.isotherms_written, self.rows_written);
        if self.points_dropped > 0 {
            info!("Points dropped for missing pressure/loading: {}", self.points_dropped);
        }
        info!("Files skipped: {}", self.skipped.len());
        for skip in &self.skipped {
            warn!("  - {} [{}]: {}", skip.path.display(), skip.kind, skip.reason);
        }
        if self.files_written == 0 {
            warn!(
                "No CSV files were produced for '{}' ({} without data, {} skipped).",
                self.database,
                self.files_no_data,
                self.skipped.len()
            );
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    MissingSurfaceArea,
    UnparsableSurfaceArea,
    NonPositiveSurfaceArea,
    NoRows,
}

#[derive(Debug, Clone, Default)]
pub struct CleanReport {
    pub database: String,
    pub files_scanned: u64,
    pub files_kept: u64,
    pub dropped_missing: u64,
    pub dropped_unparsable: u64,
    pub dropped_non_positive: u64,
    pub dropped_no_rows: u64,
    pub errors: Vec<(PathBuf, String)>,
}

impl CleanReport {
    pub fn new(database: &str) -> Self {
        Self {
            database: database.to_string(),
            ..Default::default()
        }
    }

    pub fn record_drop(&mut self, reason: DropReason) {
        match reason {
            DropReason::MissingSurfaceArea => self.dropped_missing += 1,
            DropReason::UnparsableSurfaceArea => self.dropped_unparsable += 1,
            DropReason::NonPositiveSurfaceArea => self.dropped_non_positive += 1,
            DropReason::NoRows => self.dropped_no_rows += 1,
        }
    }

    pub fn files_dropped(&self) -> u64 {
        self.dropped_missing + self.dropped_unparsable + self.dropped_non_positive + self.dropped_no_rows
    }

    pub fn log(&self) {
        info!("--- Cleaning Summary ({}) ---", self.database);
        info!("Total scanned CSV files: {}", self.files_scanned);
        info!("Kept files: {}", self.files_kept);
        info!("Removed files: {}", self.files_dropped());
        info!("   missing surface area: {}", self.dropped_missing);
        info!("   unparsable surface area: {}", self.dropped_unparsable);
        info!("   zero or negative surface area: {}", self.dropped_non_positive);
        info!("   no data rows: {}", self.dropped_no_rows);
        if !self.errors.is_empty() {
            error!("Files that could not be processed: {}", self.errors.len());
            for (path, reason) in &self.errors {
                error!("  - {}: {}", path.display(), reason);
            }
        }
    }
}

pub fn format_elapsed(elapsed: Duration) -> String {
    let total_secs = elapsed.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    let millis = elapsed.subsec_millis();

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}.{:03}s", seconds, millis)
    }
}

pub fn progress_bar(len: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    let style = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta} @ {per_sec}) {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
    pb.set_style(style);
    pb
}

pub struct StatsLogger {
    running: Arc<Mutex<bool>>,
    handle: Option<JoinHandle<()>>,
}

impl StatsLogger {
    pub fn spawn(stats: Arc<ExtractionStats>, stage: String, interval: Duration) -> Self {
        let running = Arc::new(Mutex::new(true));
        let running_clone = Arc::clone(&running);
        let handle = thread::spawn(move || {
            let mut last_log_time = Instant::now();
            loop {
                if !*running_clone.lock().unwrap_or_else(PoisonError::into_inner) {
                    break;
                }
                thread::sleep(Duration::from_millis(200));
                if last_log_time.elapsed() >= interval {
                    stats.log_current_stats(&stage);
                    last_log_time = Instant::now();
                }
            }
        });
        Self {
            running,
            handle: Some(handle),
        }
    }

    pub fn stop(mut self) {
        self.signal_stop();
    }

    fn signal_stop(&mut self) {
        *self.running.lock().unwrap_or_else(PoisonError::into_inner) = false;
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.join() {
                error!("Error joining stats thread: {:?}", e);
            }
        }
    }
}

impl Drop for StatsLogger {
    fn drop(&mut self) {
        self.signal_stop();
    }
}
