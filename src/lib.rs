//! Turns per-material MOF JSON documents into per-material isotherm CSV
//! files, keeps the ones with a usable surface area, and summarises the
//! survivors in one table.
//!
//! Directory layout under a data root:
//!
//! ```text
//! <root>/JSON/<Database>/*.json           input documents
//! <root>/MOF_ISO/<Database>/*.csv         one file per material (extract)
//! <root>/MOF_ISO_CLEAN/<Database>/*.csv   files that passed the filter (clean)
//! <root>/MOF_ISO_CLEAN/MOF_ISO_summary.csv
//! ```

pub mod cleaner;
pub mod config;
pub mod extractor;
pub mod filter;
pub mod io_retry;
pub mod isotherm_csv;
pub mod layout;
pub mod record;
pub mod stats;
pub mod summary;
pub mod walker;

pub use cleaner::{clean_databases, CleanRun};
pub use config::{CleanConfig, ExtractConfig};
pub use extractor::{ExtractOutcome, Extractor};
pub use filter::Verdict;
pub use record::MaterialRecord;
pub use stats::{CleanReport, ExtractReport, SkipKind, SkipRecord};
pub use summary::{build_summary, SummaryTable};
pub use walker::{extract_databases, ExtractRun};
