//! Offline processing of the model catalogue: deduplication,
//! classification, usage-hint extraction, duplicate analysis, statistics,
//! and import/export.

pub mod analysis;
pub mod classify;
pub mod dedup;
pub mod error;
pub mod export;
pub mod extract;
pub mod import;

pub use analysis::{
    CatalogStats, DuplicateEntry, DuplicateGroup, DuplicateKind, find_hash_duplicates,
    find_name_duplicates, normalize_name,
};
pub use classify::{Classification, normalize_base_model, tag_categories};
pub use dedup::{dedup_keep_newest, dedup_models, merge_newest};
pub use error::CatalogError;
pub use export::{ExportFormat, ExportRow, export_records, export_to_path};
pub use extract::{UsageHints, extract_from_text, extract_hints, html_to_text};
pub use import::{import_csv, import_json, import_path, import_yaml};
