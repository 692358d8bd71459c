use chrono::{DateTime, Utc};
use civit_types::Model;

/// A row in the `models` table.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRecord {
    pub id: i64,
    pub name: String,
    /// Wire spelling of the model type, e.g. `"LORA"`.
    pub model_type: String,
    pub nsfw: bool,
    pub tags: Vec<String>,
    pub creator: Option<String>,
    pub allow_no_credit: bool,
    pub allow_commercial_use: Vec<String>,
    pub allow_derivatives: bool,
    pub allow_different_license: bool,
    pub download_count: i64,
    pub favorite_count: i64,
    pub comment_count: i64,
    pub rating_count: i64,
    pub rating: f64,
    pub thumbs_up_count: i64,
    /// Base model of the newest version.
    pub base_model: Option<String>,
    pub latest_version_id: Option<i64>,
    /// Untouched API payload.
    pub raw_json: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl ModelRecord {
    /// Build a record from a typed model. When the original payload is not
    /// available the typed model is re-serialised into `raw_json`.
    pub fn from_model(model: &Model, raw: Option<&serde_json::Value>) -> Self {
        let raw_json = match raw {
            Some(v) => v.to_string(),
            None => serde_json::to_string(model).unwrap_or_else(|e| {
                tracing::warn!(model_id = model.id, error = %e, "failed to serialise model; storing empty blob");
                "{}".to_owned()
            }),
        };
        let now = Utc::now();
        Self {
            id: model.id as i64,
            name: model.name.clone(),
            model_type: model.model_type.as_str().to_owned(),
            nsfw: model.nsfw,
            tags: model.tags.clone(),
            creator: model.creator_name().map(str::to_owned),
            allow_no_credit: model.allow_no_credit,
            allow_commercial_use: model.allow_commercial_use.clone(),
            allow_derivatives: model.allow_derivatives,
            allow_different_license: model.allow_different_license,
            download_count: saturating_i64(model.stats.download_count),
            favorite_count: saturating_i64(model.stats.favorite_count),
            comment_count: saturating_i64(model.stats.comment_count),
            rating_count: saturating_i64(model.stats.rating_count),
            rating: model.stats.rating,
            thumbs_up_count: saturating_i64(model.stats.thumbs_up_count),
            base_model: model.base_model().map(str::to_owned),
            latest_version_id: model.latest_version().map(|v| v.id as i64),
            raw_json,
            first_seen_at: now,
            last_seen_at: now,
        }
    }

    /// Decode the stored payload back into a typed model.
    pub fn model(&self) -> Result<Model, serde_json::Error> {
        serde_json::from_str(&self.raw_json)
    }

    pub fn url(&self) -> String {
        format!("https://civitai.com/models/{}", self.id)
    }
}

fn saturating_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

/// Optional filters for listing models. `None` fields match everything.
#[derive(Debug, Clone, Default)]
pub struct ModelFilter {
    pub model_type: Option<String>,
    pub base_model: Option<String>,
    pub creator: Option<String>,
    pub nsfw: Option<bool>,
    pub limit: Option<u32>,
}
