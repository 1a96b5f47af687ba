//! One row per clean file, collected into `MOF_ISO_summary.csv`.

use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    fs::File,
    io::BufReader,
    path::Path,
};

use anyhow::{Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use log::{debug, info};

use crate::{
    io_retry::write_atomic,
    isotherm_csv::{
        COL_ADSORBATE, COL_ISOTHERM_ID, COL_MATERIAL_ID, COL_SURFACE_AREA_M2CM3, COL_SURFACE_AREA_M2G,
        COL_TEMPERATURE, KNOWN_COLUMNS, MISSING_MARKER,
    },
    layout::{find_files_with_extension, list_database_dirs},
};

pub const SUMMARY_COLUMNS: [&str; 9] = [
    "file",
    "material_id",
    "database",
    "adsorbates",
    "temperatures",
    "isotherm_count",
    "point_count",
    "surface_area_m2g",
    "surface_area_m2cm3",
];

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    /// Path relative to the clean root, `/`-separated.
    pub file: String,
    pub material_id: String,
    pub database: String,
    pub adsorbates: Vec<String>,
    pub temperatures: Vec<String>,
    pub isotherm_count: usize,
    pub point_count: usize,
    pub surface_area_m2g: String,
    pub surface_area_m2cm3: String,
    pub extra: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryTable {
    pub extra_columns: Vec<String>,
    pub rows: Vec<SummaryRow>,
}

impl SummaryTable {
    pub fn from_rows(rows: Vec<SummaryRow>) -> Self {
        let extra_columns: BTreeSet<String> = rows
            .iter()
            .flat_map(|row| row.extra.keys().cloned())
            .collect();
        Self {
            extra_columns: extra_columns.into_iter().collect(),
            rows,
        }
    }

    pub fn header(&self) -> Vec<&str> {
        SUMMARY_COLUMNS
            .iter()
            .copied()
            .chain(self.extra_columns.iter().map(String::as_str))
            .collect()
    }

    pub fn to_csv_bytes(&self) -> Result<Vec<u8>> {
        let mut wtr = WriterBuilder::new().from_writer(Vec::new());
        wtr.write_record(self.header())
            .context("Failed to write summary header")?;

        for row in &self.rows {
            let isotherm_count = row.isotherm_count.to_string();
            let point_count = row.point_count.to_string();
            let adsorbates = join_or_missing(&row.adsorbates);
            let temperatures = join_or_missing(&row.temperatures);
            let mut record: Vec<&str> = vec![
                row.file.as_str(),
                row.material_id.as_str(),
                row.database.as_str(),
                adsorbates.as_str(),
                temperatures.as_str(),
                isotherm_count.as_str(),
                point_count.as_str(),
                row.surface_area_m2g.as_str(),
                row.surface_area_m2cm3.as_str(),
            ];
            record.extend(
                self.extra_columns
                    .iter()
                    .map(|col| row.extra.get(col).map_or(MISSING_MARKER, String::as_str)),
            );
            wtr.write_record(&record)
                .with_context(|| format!("Failed to write summary row for {}", row.file))?;
        }

        wtr.into_inner()
            .map_err(|e| anyhow::anyhow!("Failed to finish summary CSV: {}", e))
    }

    pub fn write(&self, path: &Path, io_retries: u32) -> Result<()> {
        let bytes = self.to_csv_bytes()?;
        write_atomic(path, &bytes, io_retries)
            .with_context(|| format!("Failed to write summary file: {}", path.display()))?;
        info!("Summary with {} rows saved at: {}", self.rows.len(), path.display());
        Ok(())
    }
}

fn join_or_missing(values: &[String]) -> String {
    if values.is_empty() {
        MISSING_MARKER.to_string()
    } else {
        values.join(";")
    }
}

fn push_distinct(values: &mut Vec<String>, seen: &mut HashSet<String>, value: &str) {
    if value != MISSING_MARKER && seen.insert(value.to_string()) {
        values.push(value.to_string());
    }
}

// Metadata fields named like a summary column get an `extra_` prefix.
fn extra_column_name(header: &str, headers: &csv::StringRecord) -> String {
    let mut name = header.to_string();
    if !SUMMARY_COLUMNS.contains(&header) {
        return name;
    }
    loop {
        name = format!("extra_{}", name);
        if !SUMMARY_COLUMNS.contains(&name.as_str()) && !headers.iter().any(|h| h == name) {
            return name;
        }
    }
}

pub fn summarize_file(path: &Path, database: &str, relative_name: &str) -> Result<SummaryRow> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut rdr = ReaderBuilder::new().from_reader(BufReader::new(file));
    let headers = rdr
        .headers()
        .with_context(|| format!("Failed to read CSV header of {}", path.display()))?
        .clone();
    let idx = |name: &str| headers.iter().position(|h| h == name);

    let material_idx = idx(COL_MATERIAL_ID);
    let adsorbate_idx = idx(COL_ADSORBATE);
    let temperature_idx = idx(COL_TEMPERATURE);
    let isotherm_idx = idx(COL_ISOTHERM_ID);
    let sa_m2g_idx = idx(COL_SURFACE_AREA_M2G);
    let sa_m2cm3_idx = idx(COL_SURFACE_AREA_M2CM3);
    let extra_idx: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| !KNOWN_COLUMNS.contains(h))
        .map(|(i, h)| (i, extra_column_name(h, &headers)))
        .collect();

    let fallback_id = Path::new(relative_name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let mut row = SummaryRow {
        file: relative_name.to_string(),
        material_id: fallback_id,
        database: database.to_string(),
        adsorbates: Vec::new(),
        temperatures: Vec::new(),
        isotherm_count: 0,
        point_count: 0,
        surface_area_m2g: MISSING_MARKER.to_string(),
        surface_area_m2cm3: MISSING_MARKER.to_string(),
        extra: BTreeMap::new(),
    };

    let mut seen_adsorbates = HashSet::new();
    let mut seen_temperatures = HashSet::new();
    let mut seen_isotherms = HashSet::new();
    let cell = |record: &csv::StringRecord, i: Option<usize>| i.and_then(|i| record.get(i)).map(str::to_string);

    for (line, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read row {} of {}", line + 1, path.display()))?;
        if row.point_count == 0 {
            if let Some(id) = cell(&record, material_idx) {
                row.material_id = id;
            }
            if let Some(sa) = cell(&record, sa_m2g_idx) {
                row.surface_area_m2g = sa;
            }
            if let Some(sa) = cell(&record, sa_m2cm3_idx) {
                row.surface_area_m2cm3 = sa;
            }
            for (i, name) in &extra_idx {
                if let Some(value) = record.get(*i) {
                    row.extra.insert(name.clone(), value.to_string());
                }
            }
        }
        row.point_count += 1;
        if let Some(a) = adsorbate_idx.and_then(|i| record.get(i)) {
            push_distinct(&mut row.adsorbates, &mut seen_adsorbates, a);
        }
        if let Some(t) = temperature_idx.and_then(|i| record.get(i)) {
            push_distinct(&mut row.temperatures, &mut seen_temperatures, t);
        }
        if let Some(iso) = isotherm_idx.and_then(|i| record.get(i)) {
            seen_isotherms.insert(iso.to_string());
        }
    }
    row.isotherm_count = seen_isotherms.len();
    debug!("Summarized {} ({} points)", path.display(), row.point_count);
    Ok(row)
}

/// Rows are ordered by database then file name.
pub fn build_summary(clean_root: &Path) -> Result<SummaryTable> {
    let mut rows = Vec::new();
    for database in list_database_dirs(clean_root)? {
        let folder = clean_root.join(&database);
        for path in find_files_with_extension(&folder, "csv")? {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let relative_name = format!("{}/{}", database, file_name);
            rows.push(summarize_file(&path, &database, &relative_name)?);
        }
    }
    Ok(SummaryTable::from_rows(rows))
}
