//! Loading model dumps back into [`ModelRecord`]s.
//!
//! JSON input may be a raw API dump (an array of models, a page with
//! `items`, or a single model) or this tool's own JSON export. CSV and YAML
//! input must use the export layout.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use chrono::{DateTime, Utc};
use civit_store::ModelRecord;
use civit_types::{Creator, Model, ModelStats, ModelType, ModelVersion};
use serde_json::Value;

use crate::error::CatalogError;
use crate::export::{CsvRow, ExportFormat, ExportRow};

impl ExportRow {
    /// Rebuild a record. The stored blob is a minimal model carrying what
    /// the row knows, so [`ModelRecord::model`] still works. Rows without a
    /// positive id are rejected.
    pub fn into_record(self) -> Result<ModelRecord, CatalogError> {
        let id = model_id(self.id)?;
        let model = Model {
            id,
            name: self.name,
            model_type: ModelType::from(self.model_type),
            nsfw: self.nsfw,
            tags: self.tags,
            creator: Creator { username: self.creator, image: None },
            allow_no_credit: self.allow_no_credit,
            allow_commercial_use: self.allow_commercial_use,
            allow_derivatives: self.allow_derivatives,
            allow_different_license: self.allow_different_license,
            stats: ModelStats {
                download_count: u64::try_from(self.downloads).unwrap_or_default(),
                favorite_count: u64::try_from(self.favorites).unwrap_or_default(),
                rating_count: u64::try_from(self.rating_count).unwrap_or_default(),
                rating: self.rating,
                ..Default::default()
            },
            model_versions: self
                .latest_version_id
                .and_then(|id| u64::try_from(id).ok())
                .map(|id| ModelVersion { id, base_model: self.base_model.clone(), ..Default::default() })
                .into_iter()
                .collect(),
            ..Default::default()
        };
        let mut record = ModelRecord::from_model(&model, None);
        record.base_model = self.base_model;
        if let Ok(seen) = self.last_seen_at.parse::<DateTime<Utc>>() {
            record.last_seen_at = seen;
            record.first_seen_at = seen;
        }
        Ok(record)
    }
}

fn model_id(id: i64) -> Result<u64, CatalogError> {
    u64::try_from(id)
        .ok()
        .filter(|&id| id > 0)
        .ok_or_else(|| CatalogError::InvalidInput(format!("invalid model id {id}")))
}

/// Parse JSON input of any supported shape.
pub fn import_json<R: Read>(reader: R) -> Result<Vec<ModelRecord>, CatalogError> {
    let value: Value = serde_json::from_reader(reader)?;
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("items") {
            Some(Value::Array(items)) => items,
            Some(_) => return Err(CatalogError::InvalidInput("`items` is not an array".into())),
            None if map.contains_key("id") => vec![Value::Object(map)],
            None => return Err(CatalogError::InvalidInput("expected a model, a list or a page".into())),
        },
        _ => return Err(CatalogError::InvalidInput("expected a JSON array or object".into())),
    };
    items.into_iter().map(record_from_value).collect()
}

fn record_from_value(value: Value) -> Result<ModelRecord, CatalogError> {
    if value.get("model_type").is_some() {
        let row: ExportRow = serde_json::from_value(value)?;
        return row.into_record();
    }
    let model: Model = serde_json::from_value(value.clone())?;
    if model.id == 0 {
        return Err(CatalogError::InvalidInput("model without an id".into()));
    }
    Ok(ModelRecord::from_model(&model, Some(&value)))
}

pub fn import_csv<R: Read>(reader: R) -> Result<Vec<ModelRecord>, CatalogError> {
    let mut rdr = csv::Reader::from_reader(reader);
    rdr.deserialize::<CsvRow>()
        .map(|row| -> Result<ModelRecord, CatalogError> { ExportRow::from(row?).into_record() })
        .collect()
}

pub fn import_yaml<R: Read>(reader: R) -> Result<Vec<ModelRecord>, CatalogError> {
    let rows: Vec<ExportRow> = serde_yaml::from_reader(reader)?;
    rows.into_iter().map(ExportRow::into_record).collect()
}

/// Import a file, picking the parser from its extension.
pub fn import_path(path: &Path) -> Result<Vec<ModelRecord>, CatalogError> {
    let format = ExportFormat::from_path(path)
        .ok_or_else(|| CatalogError::UnsupportedFormat(path.display().to_string()))?;
    let reader = BufReader::new(File::open(path)?);
    let records = match format {
        ExportFormat::Json => import_json(reader)?,
        ExportFormat::Csv => import_csv(reader)?,
        ExportFormat::Yaml => import_yaml(reader)?,
        other => return Err(CatalogError::UnsupportedFormat(format!("cannot import {other}"))),
    };
    tracing::info!(path = %path.display(), %format, rows = records.len(), "import parsed");
    Ok(records)
}
