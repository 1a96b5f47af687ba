use std::{
    fs, io,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use log::{debug, warn};
use uuid::Uuid;

const RETRY_BACKOFF: Duration = Duration::from_millis(50);

fn is_transient(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

pub fn with_io_retries<T, F>(what: &str, retries: u32, mut op: F) -> io::Result<T>
where
    F: FnMut() -> io::Result<T>,
{
    let mut attempt = 0u32;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if is_transient(e.kind()) && attempt < retries => {
                attempt += 1;
                warn!("Transient I/O error on {} (retry {}/{}): {}", what, attempt, retries, e);
                thread::sleep(RETRY_BACKOFF * attempt);
            }
            Err(e) => return Err(e),
        }
    }
}

pub fn read_with_retries(path: &Path, retries: u32) -> io::Result<Vec<u8>> {
    with_io_retries(&path.display().to_string(), retries, || fs::read(path))
}

// Readers never observe a partially written file.
pub fn write_atomic(path: &Path, bytes: &[u8], retries: u32) -> io::Result<()> {
    let tmp_path = part_path_for(path);
    let result = with_io_retries(&path.display().to_string(), retries, || {
        fs::write(&tmp_path, bytes)?;
        fs::rename(&tmp_path, path)
    });
    match &result {
        Ok(()) => debug!("Wrote {} bytes to {}", bytes.len(), path.display()),
        Err(_) if tmp_path.exists() => {
            if let Err(e) = fs::remove_file(&tmp_path) {
                warn!("Failed to remove partial file {}: {}", tmp_path.display(), e);
            }
        }
        Err(_) => {}
    }
    result
}

pub fn copy_atomic(src: &Path, dst: &Path, retries: u32) -> io::Result<u64> {
    let tmp_path = part_path_for(dst);
    let result = with_io_retries(&src.display().to_string(), retries, || {
        let copied = fs::copy(src, &tmp_path)?;
        fs::rename(&tmp_path, dst)?;
        Ok(copied)
    });
    if result.is_err() && tmp_path.exists() {
        if let Err(e) = fs::remove_file(&tmp_path) {
            warn!("Failed to remove partial file {}: {}", tmp_path.display(), e);
        }
    }
    result
}

fn part_path_for(path: &Path) -> PathBuf {
    let stem = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}.part", stem, Uuid::new_v4()))
}
