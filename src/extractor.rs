//! One material JSON document in, at most one isotherm CSV out.

use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    path::{Path, PathBuf},
};

use dashmap::{mapref::entry::Entry, DashMap};
use log::debug;

use crate::{
    io_retry::{read_with_retries, write_atomic},
    isotherm_csv::render_material_csv,
    layout::material_file_stem,
    record::{MaterialRecord, RecordError},
    stats::{SkipKind, SkipRecord},
};

#[derive(Debug, Clone, PartialEq)]
pub enum ExtractOutcome {
    Written {
        path: PathBuf,
        isotherms: usize,
        rows: usize,
        dropped_points: usize,
    },
    /// Another document of this run already produced identical output.
    Duplicate { path: PathBuf, first_source: PathBuf },
    /// Parsed fine but carried no usable isotherm points.
    NoData { material_id: String, dropped_points: usize },
}

#[derive(Debug, Clone)]
struct ClaimedOutput {
    source: PathBuf,
    digest: u64,
    len: usize,
}

/// Extracts the documents of a single database into `output_dir`. Output
/// paths claimed during the run are remembered so two documents with the
/// same material id never overwrite each other.
pub struct Extractor {
    database: String,
    output_dir: PathBuf,
    io_retries: u32,
    claimed: DashMap<PathBuf, ClaimedOutput>,
}

impl Extractor {
    pub fn new(database: &str, output_dir: impl Into<PathBuf>, io_retries: u32) -> Self {
        Self {
            database: database.to_string(),
            output_dir: output_dir.into(),
            io_retries,
            claimed: DashMap::new(),
        }
    }

    pub fn output_path_for(&self, material_id: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}.csv", material_file_stem(material_id)))
    }

    pub fn extract_file(&self, json_path: &Path) -> Result<ExtractOutcome, SkipRecord> {
        let bytes = read_with_retries(json_path, self.io_retries).map_err(|e| {
            SkipRecord::new(json_path, SkipKind::Io, format!("failed to read: {}", e))
        })?;

        let material = MaterialRecord::from_json_slice(&bytes).map_err(|e| {
            let kind = match e {
                RecordError::MissingIdentifier => SkipKind::MissingIdentifier,
                RecordError::Malformed(_) | RecordError::NotAnObject => SkipKind::MalformedJson,
            };
            SkipRecord::new(json_path, kind, e.to_string())
        })?;

        let rows = material.point_count();
        if rows == 0 {
            debug!("No isotherm data in {} ({})", json_path.display(), material.id);
            let dropped_points = material.dropped_point_count();
            return Ok(ExtractOutcome::NoData {
                material_id: material.id,
                dropped_points,
            });
        }

        let csv_bytes = render_material_csv(&material, &self.database)
            .map_err(|e| SkipRecord::new(json_path, SkipKind::Io, format!("{:#}", e)))?;
        let output_path = self.output_path_for(&material.id);
        let claim = ClaimedOutput {
            source: json_path.to_path_buf(),
            digest: digest(&csv_bytes),
            len: csv_bytes.len(),
        };

        match self.claimed.entry(output_path.clone()) {
            Entry::Occupied(existing) => {
                let first = existing.get();
                return if first.digest == claim.digest && first.len == claim.len {
                    debug!(
                        "{} duplicates {} with identical content",
                        json_path.display(),
                        first.source.display()
                    );
                    Ok(ExtractOutcome::Duplicate {
                        path: output_path,
                        first_source: first.source.clone(),
                    })
                } else {
                    Err(SkipRecord::new(
                        json_path,
                        SkipKind::IdCollision,
                        format!(
                            "material id '{}' already written from {} with different content",
                            material.id,
                            first.source.display()
                        ),
                    ))
                };
            }
            // The entry stays locked until the file is on disk, so a
            // Duplicate always refers to a file that was written.
            Entry::Vacant(slot) => {
                write_atomic(&output_path, &csv_bytes, self.io_retries).map_err(|e| {
                    SkipRecord::new(
                        json_path,
                        SkipKind::Io,
                        format!("failed to write {}: {}", output_path.display(), e),
                    )
                })?;
                slot.insert(claim);
            }
        }
        debug!("Wrote {} rows for {} to {}", rows, material.id, output_path.display());

        Ok(ExtractOutcome::Written {
            path: output_path,
            isotherms: material.isotherms.iter().filter(|iso| !iso.points.is_empty()).count(),
            rows,
            dropped_points: material.dropped_point_count(),
        })
    }
}

fn digest(bytes: &[u8]) -> u64 {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, PathBuf, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let json_dir = tmp.path().join("JSON").join("db");
        let out_dir = tmp.path().join("MOF_ISO").join("db");
        fs::create_dir_all(&json_dir).unwrap();
        fs::create_dir_all(&out_dir).unwrap();
        (tmp, json_dir, out_dir)
    }

    #[test]
    fn test_extract_writes_one_csv_per_material() {
        let (_tmp, json_dir, out_dir) = setup();
        let src = json_dir.join("m2.json");
        fs::write(
            &src,
            r#"{"id": "MOF-2", "surface_area_m2g": 1500, "isotherms": [{"points": [[0.1, 2.3],[0.5, 6.1]]}]}"#,
        )
        .unwrap();

        let extractor = Extractor::new("db", &out_dir, 0);
        let outcome = extractor.extract_file(&src).unwrap();
        assert_eq!(
            outcome,
            ExtractOutcome::Written {
                path: out_dir.join("MOF-2.csv"),
                isotherms: 1,
                rows: 2,
                dropped_points: 0,
            }
        );
        let content = fs::read_to_string(out_dir.join("MOF-2.csv")).unwrap();
        assert_eq!(content.lines().count(), 3);
    }

    #[test]
    fn test_no_isotherms_is_no_data_not_failure() {
        let (_tmp, json_dir, out_dir) = setup();
        let src = json_dir.join("empty.json");
        fs::write(&src, r#"{"id": "MOF-9", "surface_area_m2g": 10}"#).unwrap();

        let outcome = Extractor::new("db", &out_dir, 0).extract_file(&src).unwrap();
        assert!(matches!(outcome, ExtractOutcome::NoData { ref material_id, .. } if material_id == "MOF-9"));
        assert_eq!(fs::read_dir(&out_dir).unwrap().count(), 0);
    }

    #[test]
    fn test_failures_are_classified() {
        let (_tmp, json_dir, out_dir) = setup();
        let extractor = Extractor::new("db", &out_dir, 0);

        let broken = json_dir.join("broken.json");
        fs::write(&broken, "{ not json").unwrap();
        assert_eq!(extractor.extract_file(&broken).unwrap_err().kind, SkipKind::MalformedJson);

        let anonymous = json_dir.join("anon.json");
        fs::write(&anonymous, r#"{"isotherms": [{"points": [[1, 2]]}]}"#).unwrap();
        assert_eq!(extractor.extract_file(&anonymous).unwrap_err().kind, SkipKind::MissingIdentifier);

        let missing = json_dir.join("missing.json");
        assert_eq!(extractor.extract_file(&missing).unwrap_err().kind, SkipKind::Io);
    }

    #[test]
    fn test_same_id_different_content_is_a_collision() {
        let (_tmp, json_dir, out_dir) = setup();
        let a = json_dir.join("a.json");
        let b = json_dir.join("b.json");
        let c = json_dir.join("c.json");
        fs::write(&a, r#"{"id": "X", "isotherms": [{"points": [[1, 2]]}]}"#).unwrap();
        fs::write(&b, r#"{"id": "X", "isotherms": [{"points": [[1, 3]]}]}"#).unwrap();
        fs::write(&c, r#"{"id": "X", "isotherms": [{"points": [[1, 2]]}]}"#).unwrap();

        let extractor = Extractor::new("db", &out_dir, 0);
        assert!(matches!(extractor.extract_file(&a).unwrap(), ExtractOutcome::Written { .. }));
        let collision = extractor.extract_file(&b).unwrap_err();
        assert_eq!(collision.kind, SkipKind::IdCollision);
        assert!(matches!(extractor.extract_file(&c).unwrap(), ExtractOutcome::Duplicate { .. }));

        let content = fs::read_to_string(out_dir.join("X.csv")).unwrap();
        assert!(content.lines().nth(1).unwrap().contains(",1,2,"));
    }

    #[test]
    fn test_failed_write_leaves_no_claim() {
        let (tmp, json_dir, _out_dir) = setup();
        let src = json_dir.join("m.json");
        fs::write(&src, r#"{"id": "M", "isotherms": [{"points": [[1, 2]]}]}"#).unwrap();
        let late_dir = tmp.path().join("not_yet_created");

        let extractor = Extractor::new("db", &late_dir, 0);
        assert_eq!(extractor.extract_file(&src).unwrap_err().kind, SkipKind::Io);

        fs::create_dir_all(&late_dir).unwrap();
        let outcome = extractor.extract_file(&src).unwrap();
        assert!(matches!(outcome, ExtractOutcome::Written { .. }));
        assert!(late_dir.join("M.csv").exists());
    }

    #[test]
    fn test_no_data_reports_dropped_points() {
        let (_tmp, json_dir, out_dir) = setup();
        let src = json_dir.join("partial.json");
        fs::write(&src, r#"{"id": "P", "isotherms": [{"points": [[1, null], ["x", 2]]}]}"#).unwrap();

        let outcome = Extractor::new("db", &out_dir, 0).extract_file(&src).unwrap();
        assert_eq!(
            outcome,
            ExtractOutcome::NoData {
                material_id: "P".into(),
                dropped_points: 2,
            }
        );
    }

    #[test]
    fn test_rerun_is_byte_identical() {
        let (_tmp, json_dir, out_dir) = setup();
        let src = json_dir.join("m.json");
        fs::write(
            &src,
            r#"{"mofid": "Zn MOF/5", "void_fraction": 0.4, "isotherms": [{"temperature": 298, "points": [[1, 2]]}]}"#,
        )
        .unwrap();

        Extractor::new("db", &out_dir, 0).extract_file(&src).unwrap();
        let first = fs::read(out_dir.join("Zn_MOF_5.csv")).unwrap();
        Extractor::new("db", &out_dir, 0).extract_file(&src).unwrap();
        let second = fs::read(out_dir.join("Zn_MOF_5.csv")).unwrap();
        assert_eq!(first, second);
    }
}
