//! Row-per-point CSV schema written by the extractor and read back by the
//! filter and the summary.

use anyhow::{Context, Result};
use csv::WriterBuilder;

use crate::record::MaterialRecord;

/// Written for any absent or unusable value. Never confused with `0`.
pub const MISSING_MARKER: &str = "N/A";

pub const COL_MATERIAL_ID: &str = "material_id";
pub const COL_DATABASE: &str = "database";
pub const COL_ISOTHERM_ID: &str = "isotherm_id";
pub const COL_ADSORBATE: &str = "adsorbate";
pub const COL_TEMPERATURE: &str = "temperature";
pub const COL_PRESSURE: &str = "pressure";
pub const COL_LOADING: &str = "loading";
pub const COL_PRESSURE_UNITS: &str = "pressure_units";
pub const COL_LOADING_UNITS: &str = "loading_units";
pub const COL_SURFACE_AREA_M2G: &str = "surface_area_m2g";
pub const COL_SURFACE_AREA_M2CM3: &str = "surface_area_m2cm3";

pub const KNOWN_COLUMNS: [&str; 11] = [
    COL_MATERIAL_ID,
    COL_DATABASE,
    COL_ISOTHERM_ID,
    COL_ADSORBATE,
    COL_TEMPERATURE,
    COL_PRESSURE,
    COL_LOADING,
    COL_PRESSURE_UNITS,
    COL_LOADING_UNITS,
    COL_SURFACE_AREA_M2G,
    COL_SURFACE_AREA_M2CM3,
];

pub fn is_missing(cell: &str) -> bool {
    cell.trim() == MISSING_MARKER
}

fn cell(value: Option<&str>) -> &str {
    value.unwrap_or(MISSING_MARKER)
}

pub fn header_for(material: &MaterialRecord) -> Vec<&str> {
    KNOWN_COLUMNS
        .iter()
        .copied()
        .chain(material.extra.keys().map(String::as_str))
        .collect()
}

/// Renders every isotherm point of `material` as one CSV row. Material-level
/// cells are computed once and repeated unchanged on each row.
pub fn render_material_csv(material: &MaterialRecord, database: &str) -> Result<Vec<u8>> {
    let mut wtr = WriterBuilder::new().from_writer(Vec::new());
    wtr.write_record(header_for(material))
        .context("Failed to write CSV header")?;

    let extra_cells: Vec<String> = material
        .extra
        .values()
        .map(|v| v.as_ref().map_or_else(|| MISSING_MARKER.to_string(), |s| s.to_cell()))
        .collect();
    let sa_m2g = cell(material.surface_area_m2g.as_deref());
    let sa_m2cm3 = cell(material.surface_area_m2cm3.as_deref());

    for iso in &material.isotherms {
        for point in &iso.points {
            let mut row: Vec<&str> = Vec::with_capacity(KNOWN_COLUMNS.len() + extra_cells.len());
            row.extend([
                material.id.as_str(),
                database,
                iso.id.as_str(),
                cell(iso.adsorbate.as_deref()),
                cell(iso.temperature.as_deref()),
                point.pressure.as_str(),
                point.loading.as_str(),
                cell(iso.pressure_units.as_deref()),
                cell(iso.loading_units.as_deref()),
                sa_m2g,
                sa_m2cm3,
            ]);
            row.extend(extra_cells.iter().map(String::as_str));
            wtr.write_record(&row)
                .with_context(|| format!("Failed to write row for material {}", material.id))?;
        }
    }

    wtr.into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to finish CSV for material {}: {}", material.id, e))
}
