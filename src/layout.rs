//! On-disk layout shared by every stage.
//!
//! ```text
//! <root>/JSON/<Database>/<material>.json        input, never written
//! <root>/MOF_ISO/<Database>/<material>.csv      extractor output
//! <root>/MOF_ISO_CLEAN/<Database>/<material>.csv
//! <root>/MOF_ISO_CLEAN/MOF_ISO_summary.csv
//! ```

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use glob::{glob, Pattern};
use log::{debug, warn};

pub const JSON_DIR_NAME: &str = "JSON";
pub const ISOTHERM_DIR_NAME: &str = "MOF_ISO";
pub const CLEAN_DIR_NAME: &str = "MOF_ISO_CLEAN";
pub const SUMMARY_FILE_NAME: &str = "MOF_ISO_summary.csv";

/// Folder name used for a database on disk ("CoREMOF 2019" -> "CoREMOF_2019").
pub fn database_dir_name(database: &str) -> String {
    database.trim().replace([' ', '/'], "_")
}

/// Discovered folders keep their on-disk name; named databases may be given
/// either way.
pub fn database_input_dir(root: &Path, database: &str) -> PathBuf {
    let raw = root.join(database);
    if raw.is_dir() {
        raw
    } else {
        root.join(database_dir_name(database))
    }
}

/// File stem for a material identifier. Path separators and whitespace
/// become underscores so the id can never escape its database folder.
pub fn material_file_stem(material_id: &str) -> String {
    material_id
        .trim()
        .chars()
        .map(|c| {
            if c == '/' || c == '\\' || c.is_whitespace() {
                '_'
            } else {
                c
            }
        })
        .collect()
}

/// Non-recursive, sorted by path.
pub fn find_files_with_extension<P: AsRef<Path>>(directory: P, extension: &str) -> Result<Vec<PathBuf>> {
    let escaped_dir = Pattern::escape(&directory.as_ref().to_string_lossy());
    let pattern_str = format!("{}/*.{}", escaped_dir, extension);
    debug!("Searching for files matching pattern: {}", pattern_str);

    let mut paths = Vec::new();
    for entry in glob(&pattern_str).with_context(|| format!("Invalid search pattern: {}", pattern_str))? {
        match entry {
            Ok(path) if path.is_file() => paths.push(path),
            Ok(_) => {}
            Err(e) => warn!("Unreadable entry while searching {}: {}", pattern_str, e),
        }
    }
    paths.sort();
    Ok(paths)
}

pub fn list_database_dirs<P: AsRef<Path>>(root: P) -> Result<Vec<String>> {
    let root = root.as_ref();
    let mut names = Vec::new();
    for entry in fs::read_dir(root).with_context(|| format!("Failed to read directory: {}", root.display()))? {
        let entry = entry.with_context(|| format!("Failed to read entry in {}", root.display()))?;
        if entry.file_type().map_or(false, |ft| ft.is_dir()) {
            let name = entry
                .file_name()
                .into_string()
                .map_err(|n| anyhow!("Database folder name is not valid UTF-8: {:?}", n))?;
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

pub fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create output directory: {}", dir.display()))
}

/// Removes the `.csv` files a previous run left in `folder`.
pub fn clear_stale_csv(folder: &Path) -> Result<usize> {
    let stale = find_files_with_extension(folder, "csv")?;
    for path in &stale {
        fs::remove_file(path).with_context(|| format!("Failed to remove stale file {}", path.display()))?;
    }
    if !stale.is_empty() {
        debug!("Removed {} stale files from {}", stale.len(), folder.display());
    }
    Ok(stale.len())
}
