//! Keep/drop decision for one extractor CSV.

use std::{
    fs::File,
    io::BufReader,
    path::Path,
};

use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord};

use crate::{
    io_retry::copy_atomic,
    isotherm_csv::{is_missing, COL_SURFACE_AREA_M2G},
    stats::DropReason,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    Keep { surface_area: f64 },
    Drop(DropReason),
}

impl Verdict {
    pub fn is_keep(&self) -> bool {
        matches!(self, Verdict::Keep { .. })
    }
}

/// Only finite values strictly above zero are kept.
pub fn judge_surface_area(cell: &str) -> Verdict {
    if is_missing(cell) || cell.trim().is_empty() {
        return Verdict::Drop(DropReason::MissingSurfaceArea);
    }
    match cell.trim().parse::<f64>() {
        Ok(v) if v.is_nan() || v.is_infinite() => Verdict::Drop(DropReason::UnparsableSurfaceArea),
        Ok(v) if v > 0.0 => Verdict::Keep { surface_area: v },
        Ok(_) => Verdict::Drop(DropReason::NonPositiveSurfaceArea),
        Err(_) => Verdict::Drop(DropReason::UnparsableSurfaceArea),
    }
}

// The surface area repeats on every row, so the first one decides.
pub fn judge_csv(path: &Path) -> Result<Verdict> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut rdr = ReaderBuilder::new().from_reader(BufReader::new(file));

    let headers = rdr
        .headers()
        .with_context(|| format!("Failed to read CSV header of {}", path.display()))?
        .clone();
    let Some(sa_idx) = headers.iter().position(|h| h == COL_SURFACE_AREA_M2G) else {
        return Ok(Verdict::Drop(DropReason::MissingSurfaceArea));
    };

    let mut first_row = StringRecord::new();
    let has_row = rdr
        .read_record(&mut first_row)
        .with_context(|| format!("Failed to read first row of {}", path.display()))?;
    if !has_row {
        return Ok(Verdict::Drop(DropReason::NoRows));
    }

    Ok(match first_row.get(sa_idx) {
        Some(cell) => judge_surface_area(cell),
        None => Verdict::Drop(DropReason::MissingSurfaceArea),
    })
}

pub fn filter_file(src: &Path, dst: &Path, io_retries: u32) -> Result<Verdict> {
    let verdict = judge_csv(src)?;
    if verdict.is_keep() {
        copy_atomic(src, dst, io_retries)
            .with_context(|| format!("Failed to copy {} to {}", src.display(), dst.display()))?;
    }
    Ok(verdict)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_judge_surface_area_values() {
        assert_eq!(judge_surface_area("1500"), Verdict::Keep { surface_area: 1500.0 });
        assert_eq!(judge_surface_area(" 0.5 "), Verdict::Keep { surface_area: 0.5 });
        assert_eq!(judge_surface_area("N/A"), Verdict::Drop(DropReason::MissingSurfaceArea));
        assert_eq!(judge_surface_area(""), Verdict::Drop(DropReason::MissingSurfaceArea));
        assert_eq!(judge_surface_area("abc"), Verdict::Drop(DropReason::UnparsableSurfaceArea));
        assert_eq!(judge_surface_area("NaN"), Verdict::Drop(DropReason::UnparsableSurfaceArea));
        assert_eq!(judge_surface_area("inf"), Verdict::Drop(DropReason::UnparsableSurfaceArea));
        assert_eq!(judge_surface_area("0"), Verdict::Drop(DropReason::NonPositiveSurfaceArea));
        assert_eq!(judge_surface_area("0.0"), Verdict::Drop(DropReason::NonPositiveSurfaceArea));
        assert_eq!(judge_surface_area("-0.0"), Verdict::Drop(DropReason::NonPositiveSurfaceArea));
        assert_eq!(judge_surface_area("0.000"), Verdict::Drop(DropReason::NonPositiveSurfaceArea));
        assert_eq!(judge_surface_area("-12"), Verdict::Drop(DropReason::NonPositiveSurfaceArea));
    }

    #[test]
    fn test_judge_csv_uses_first_row_only() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("m.csv");
        fs::write(
            &path,
            "material_id,pressure,loading,surface_area_m2g\nA,1,2,100\nA,2,3,0\n",
        )
        .unwrap();
        assert_eq!(judge_csv(&path).unwrap(), Verdict::Keep { surface_area: 100.0 });
    }

    #[test]
    fn test_judge_csv_without_rows_or_column() {
        let tmp = TempDir::new().unwrap();
        let header_only = tmp.path().join("h.csv");
        fs::write(&header_only, "material_id,surface_area_m2g\n").unwrap();
        assert_eq!(judge_csv(&header_only).unwrap(), Verdict::Drop(DropReason::NoRows));

        let no_column = tmp.path().join("n.csv");
        fs::write(&no_column, "material_id,pressure\nA,1\n").unwrap();
        assert_eq!(judge_csv(&no_column).unwrap(), Verdict::Drop(DropReason::MissingSurfaceArea));
    }

    #[test]
    fn test_filter_file_copies_only_kept_files() {
        let tmp = TempDir::new().unwrap();
        let keep_src = tmp.path().join("keep.csv");
        let drop_src = tmp.path().join("drop.csv");
        let keep_dst = tmp.path().join("keep_out.csv");
        let drop_dst = tmp.path().join("drop_out.csv");
        fs::write(&keep_src, "material_id,surface_area_m2g\nK,\"1,5\"\nK,42\n").unwrap();
        fs::write(&drop_src, "material_id,surface_area_m2g\nD,N/A\n").unwrap();

        // "1,5" is a quoted single cell that is not a number.
        assert_eq!(
            filter_file(&keep_src, &keep_dst, 0).unwrap(),
            Verdict::Drop(DropReason::UnparsableSurfaceArea)
        );
        assert!(!keep_dst.exists());

        fs::write(&keep_src, "material_id,surface_area_m2g\nK,42\n").unwrap();
        assert!(filter_file(&keep_src, &keep_dst, 0).unwrap().is_keep());
        assert_eq!(fs::read(&keep_src).unwrap(), fs::read(&keep_dst).unwrap());

        assert!(!filter_file(&drop_src, &drop_dst, 0).unwrap().is_keep());
        assert!(!drop_dst.exists());
    }

    #[test]
    fn test_unreadable_file_is_an_error_not_a_drop() {
        let tmp = TempDir::new().unwrap();
        assert!(judge_csv(&tmp.path().join("missing.csv")).is_err());
    }
}
