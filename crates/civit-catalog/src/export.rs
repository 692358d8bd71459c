//! Writers for catalogue snapshots.
//!
//! CSV, JSON and YAML serialise [`ExportRow`]s directly. Markdown and HTML
//! go through `minijinja`; the HTML template is auto-escaped because of its
//! `.html` name.

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use chrono::Utc;
use civit_store::ModelRecord;
use minijinja::{Environment, context};
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

const MARKDOWN_TEMPLATE: &str = include_str!("templates/models.md");
const HTML_TEMPLATE: &str = include_str!("templates/models.html");

/// Separator for list columns in CSV.
pub(crate) const LIST_SEPARATOR: &str = ";";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
    Yaml,
    Markdown,
    Html,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
            ExportFormat::Yaml => "yaml",
            ExportFormat::Markdown => "md",
            ExportFormat::Html => "html",
        }
    }

    /// Guess from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(|e| e.parse().ok())
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            "yaml" | "yml" => Ok(ExportFormat::Yaml),
            "md" | "markdown" => Ok(ExportFormat::Markdown),
            "html" | "htm" => Ok(ExportFormat::Html),
            other => Err(CatalogError::UnsupportedFormat(other.to_owned())),
        }
    }
}

/// Flat, format-neutral view of a [`ModelRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRow {
    pub id: i64,
    pub name: String,
    pub model_type: String,
    pub base_model: Option<String>,
    pub creator: Option<String>,
    pub nsfw: bool,
    pub tags: Vec<String>,
    pub downloads: i64,
    pub favorites: i64,
    pub rating: f64,
    pub rating_count: i64,
    pub allow_no_credit: bool,
    pub allow_commercial_use: Vec<String>,
    pub allow_derivatives: bool,
    pub allow_different_license: bool,
    pub latest_version_id: Option<i64>,
    pub url: String,
    pub last_seen_at: String,
}

impl From<&ModelRecord> for ExportRow {
    fn from(r: &ModelRecord) -> Self {
        ExportRow {
            id: r.id,
            name: r.name.clone(),
            model_type: r.model_type.clone(),
            base_model: r.base_model.clone(),
            creator: r.creator.clone(),
            nsfw: r.nsfw,
            tags: r.tags.clone(),
            downloads: r.download_count,
            favorites: r.favorite_count,
            rating: r.rating,
            rating_count: r.rating_count,
            allow_no_credit: r.allow_no_credit,
            allow_commercial_use: r.allow_commercial_use.clone(),
            allow_derivatives: r.allow_derivatives,
            allow_different_license: r.allow_different_license,
            latest_version_id: r.latest_version_id,
            url: r.url(),
            last_seen_at: r.last_seen_at.to_rfc3339(),
        }
    }
}

/// CSV cannot hold sequences, so list columns are joined.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct CsvRow {
    pub id: i64,
    pub name: String,
    pub model_type: String,
    pub base_model: Option<String>,
    pub creator: Option<String>,
    pub nsfw: bool,
    pub tags: String,
    pub downloads: i64,
    pub favorites: i64,
    pub rating: f64,
    pub rating_count: i64,
    pub allow_no_credit: bool,
    pub allow_commercial_use: String,
    pub allow_derivatives: bool,
    pub allow_different_license: bool,
    pub latest_version_id: Option<i64>,
    pub url: String,
    pub last_seen_at: String,
}

impl From<ExportRow> for CsvRow {
    fn from(r: ExportRow) -> Self {
        CsvRow {
            id: r.id,
            name: r.name,
            model_type: r.model_type,
            base_model: r.base_model,
            creator: r.creator,
            nsfw: r.nsfw,
            tags: r.tags.join(LIST_SEPARATOR),
            downloads: r.downloads,
            favorites: r.favorites,
            rating: r.rating,
            rating_count: r.rating_count,
            allow_no_credit: r.allow_no_credit,
            allow_commercial_use: r.allow_commercial_use.join(LIST_SEPARATOR),
            allow_derivatives: r.allow_derivatives,
            allow_different_license: r.allow_different_license,
            latest_version_id: r.latest_version_id,
            url: r.url,
            last_seen_at: r.last_seen_at,
        }
    }
}

impl From<CsvRow> for ExportRow {
    fn from(r: CsvRow) -> Self {
        let split = |s: &str| -> Vec<String> {
            s.split(LIST_SEPARATOR)
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_owned)
                .collect()
        };
        ExportRow {
            id: r.id,
            tags: split(&r.tags),
            allow_commercial_use: split(&r.allow_commercial_use),
            name: r.name,
            model_type: r.model_type,
            base_model: r.base_model,
            creator: r.creator,
            nsfw: r.nsfw,
            downloads: r.downloads,
            favorites: r.favorites,
            rating: r.rating,
            rating_count: r.rating_count,
            allow_no_credit: r.allow_no_credit,
            allow_derivatives: r.allow_derivatives,
            allow_different_license: r.allow_different_license,
            latest_version_id: r.latest_version_id,
            url: r.url,
            last_seen_at: r.last_seen_at,
        }
    }
}

fn template_env() -> Environment<'static> {
    let mut env = Environment::new();
    env.add_filter("md", |s: String| s.replace('|', "\\|").replace('\n', " "));
    // Both templates are compiled into the binary; a parse failure here is a
    // build defect surfaced on first render.
    if let Err(e) = env.add_template("models.md", MARKDOWN_TEMPLATE) {
        tracing::error!(error = %e, "invalid markdown template");
    }
    if let Err(e) = env.add_template("models.html", HTML_TEMPLATE) {
        tracing::error!(error = %e, "invalid html template");
    }
    env
}

fn render<W: Write>(name: &str, rows: &[ExportRow], mut out: W) -> Result<(), CatalogError> {
    let env = template_env();
    let template = env.get_template(name)?;
    let rendered = template.render(context! {
        models => rows,
        generated_at => Utc::now().format("%Y-%m-%d %H:%M UTC").to_string(),
    })?;
    out.write_all(rendered.as_bytes())?;
    if !rendered.ends_with('\n') {
        out.write_all(b"\n")?;
    }
    Ok(())
}

/// Write `records` to `out` in `format`.
pub fn export_records<W: Write>(records: &[ModelRecord], format: ExportFormat, mut out: W) -> Result<(), CatalogError> {
    let rows: Vec<ExportRow> = records.iter().map(ExportRow::from).collect();
    match format {
        ExportFormat::Csv => {
            let mut writer = csv::Writer::from_writer(out);
            for row in rows {
                writer.serialize(CsvRow::from(row))?;
            }
            writer.flush()?;
        }
        ExportFormat::Json => {
            serde_json::to_writer_pretty(&mut out, &rows)?;
            out.write_all(b"\n")?;
        }
        ExportFormat::Yaml => serde_yaml::to_writer(&mut out, &rows)?,
        ExportFormat::Markdown => render("models.md", &rows, out)?,
        ExportFormat::Html => render("models.html", &rows, out)?,
    }
    Ok(())
}

/// Write `records` to `path`. Without an explicit format the extension
/// decides. Returns the format used.
pub fn export_to_path(
    records: &[ModelRecord],
    format: Option<ExportFormat>,
    path: &Path,
) -> Result<ExportFormat, CatalogError> {
    let format = match format.or_else(|| ExportFormat::from_path(path)) {
        Some(f) => f,
        None => return Err(CatalogError::UnsupportedFormat(path.display().to_string())),
    };
    let mut out = BufWriter::new(File::create(path)?);
    export_records(records, format, &mut out)?;
    out.flush()?;
    tracing::info!(path = %path.display(), %format, rows = records.len(), "export written");
    Ok(format)
}
