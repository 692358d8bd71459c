//! CivitAI model payloads.
//!
//! Only the fields the tool reads are typed; everything defaults so new or
//! missing upstream fields never fail a page.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::enums::ModelType;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Creator {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelStats {
    pub download_count: u64,
    pub favorite_count: u64,
    pub comment_count: u64,
    pub rating_count: u64,
    pub rating: f64,
    pub thumbs_up_count: u64,
    pub thumbs_down_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileMetadata {
    pub fp: Option<String>,
    pub size: Option<String>,
    pub format: Option<String>,
}

/// Hashes keyed by algorithm name as CivitAI spells them (`SHA256`,
/// `AutoV2`, `BLAKE3`, `CRC32`, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileHashes(pub BTreeMap<String, String>);

impl FileHashes {
    pub fn get(&self, algo: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(algo))
            .map(|(_, v)| v.as_str())
    }

    /// Lower-cased SHA256, the hash used for verification and dedup.
    pub fn sha256(&self) -> Option<String> {
        self.get("SHA256").map(|h| h.to_ascii_lowercase())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelFile {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "sizeKB")]
    pub size_kb: f64,
    #[serde(default, rename = "type")]
    pub file_type: Option<String>,
    #[serde(default)]
    pub metadata: FileMetadata,
    #[serde(default)]
    pub hashes: FileHashes,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub pickle_scan_result: Option<String>,
    #[serde(default)]
    pub virus_scan_result: Option<String>,
}

impl ModelFile {
    pub fn size_bytes(&self) -> u64 {
        (self.size_kb * 1024.0).round() as u64
    }

    pub fn format(&self) -> Option<&str> {
        self.metadata.format.as_deref()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelImage {
    #[serde(default)]
    pub url: String,
    #[serde(default, deserialize_with = "nsfw_level")]
    pub nsfw_level: u32,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub hash: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelVersion {
    pub id: u64,
    #[serde(default)]
    pub model_id: Option<u64>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub base_model: Option<String>,
    #[serde(default)]
    pub base_model_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub trained_words: Vec<String>,
    #[serde(default)]
    pub files: Vec<ModelFile>,
    #[serde(default)]
    pub images: Vec<ModelImage>,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub stats: ModelStats,
}

impl ModelVersion {
    /// The file flagged `primary`, or the first file when none is.
    pub fn primary_file(&self) -> Option<&ModelFile> {
        self.files
            .iter()
            .find(|f| f.primary)
            .or_else(|| self.files.first())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type", default)]
    pub model_type: ModelType,
    #[serde(default)]
    pub nsfw: bool,
    #[serde(default, deserialize_with = "tag_names")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub creator: Creator,
    #[serde(default = "default_true")]
    pub allow_no_credit: bool,
    #[serde(default, deserialize_with = "commercial_use")]
    pub allow_commercial_use: Vec<String>,
    #[serde(default = "default_true")]
    pub allow_derivatives: bool,
    #[serde(default = "default_true")]
    pub allow_different_license: bool,
    #[serde(default)]
    pub stats: ModelStats,
    #[serde(default)]
    pub model_versions: Vec<ModelVersion>,
}

impl Model {
    /// CivitAI lists versions newest first.
    pub fn latest_version(&self) -> Option<&ModelVersion> {
        self.model_versions.first()
    }

    pub fn version(&self, version_id: u64) -> Option<&ModelVersion> {
        self.model_versions.iter().find(|v| v.id == version_id)
    }

    pub fn base_model(&self) -> Option<&str> {
        self.latest_version().and_then(|v| v.base_model.as_deref())
    }

    pub fn creator_name(&self) -> Option<&str> {
        self.creator.username.as_deref()
    }

    /// Union of trained words across versions, first occurrence wins.
    pub fn trained_words(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for word in self.model_versions.iter().flat_map(|v| v.trained_words.iter()) {
            let word = word.trim();
            if !word.is_empty() && !out.iter().any(|w| w == word) {
                out.push(word.to_owned());
            }
        }
        out
    }
}

fn default_true() -> bool {
    true
}

// `allowCommercialUse` is a list on current payloads and a single string
// (`"Sell"`, `"None"`, ...) on older ones.
fn commercial_use<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        One(String),
        Many(Vec<String>),
        Null(()),
    }
    Ok(match Raw::deserialize(deserializer)? {
        Raw::One(s) if s.eq_ignore_ascii_case("none") || s.is_empty() => Vec::new(),
        Raw::One(s) => vec![s],
        Raw::Many(v) => v,
        Raw::Null(()) => Vec::new(),
    })
}

// Tags are plain strings on `/models` and `{ "name": .. }` objects on some
// older endpoints.
fn tag_names<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Name(String),
        Object { name: String },
    }
    let raw: Option<Vec<Raw>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|t| match t {
            Raw::Name(n) | Raw::Object { name: n } => n,
        })
        .collect())
}

// Images report `nsfwLevel` as a number on newer payloads and as a label
// (`"None"`, `"Soft"`, `"Mature"`, `"X"`) on older ones.
fn nsfw_level<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u32),
        Label(String),
        Null(()),
    }
    Ok(match Raw::deserialize(deserializer)? {
        Raw::Num(n) => n,
        Raw::Label(l) => match l.to_ascii_lowercase().as_str() {
            "none" => 1,
            "soft" => 2,
            "mature" => 4,
            "x" => 8,
            _ => 0,
        },
        Raw::Null(()) => 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "id": 4201,
        "name": "Realistic Vision",
        "description": "<p>Trigger word: <b>rv</b></p>",
        "type": "Checkpoint",
        "nsfw": false,
        "tags": ["photorealistic", "base model"],
        "creator": {"username": "SG_161222", "image": null},
        "allowNoCredit": true,
        "allowCommercialUse": ["Image", "Rent"],
        "allowDerivatives": true,
        "allowDifferentLicense": false,
        "stats": {"downloadCount": 1000, "favoriteCount": 10, "rating": 4.9, "ratingCount": 7},
        "modelVersions": [
            {
                "id": 501,
                "name": "v6.0",
                "baseModel": "SD 1.5",
                "createdAt": "2023-10-01T12:00:00.000Z",
                "trainedWords": ["rv", "analog"],
                "files": [
                    {"id": 9, "name": "rv.ckpt", "sizeKB": 2048.0, "type": "Model", "primary": false,
                     "metadata": {"fp": "fp16", "format": "PickleTensor"}},
                    {"id": 10, "name": "rv.safetensors", "sizeKB": 1024.5, "type": "Model", "primary": true,
                     "metadata": {"fp": "fp16", "size": "pruned", "format": "SafeTensor"},
                     "hashes": {"SHA256": "ABCDEF", "AutoV2": "123"},
                     "downloadUrl": "https://civitai.com/api/download/models/501"}
                ],
                "images": [{"url": "https://img", "nsfwLevel": "Soft"}]
            },
            {"id": 400, "name": "v5.1", "trainedWords": ["rv", "film"]}
        ]
    }"#;

    #[test]
    fn parses_full_model() {
        let m: Model = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(m.id, 4201);
        assert_eq!(m.model_type, ModelType::Checkpoint);
        assert_eq!(m.creator_name(), Some("SG_161222"));
        assert_eq!(m.allow_commercial_use, vec!["Image", "Rent"]);
        assert!(!m.allow_different_license);
        assert_eq!(m.base_model(), Some("SD 1.5"));
        assert_eq!(m.stats.download_count, 1000);

        let v = m.latest_version().unwrap();
        let primary = v.primary_file().unwrap();
        assert_eq!(primary.id, 10);
        assert_eq!(primary.hashes.sha256().as_deref(), Some("abcdef"));
        assert_eq!(primary.size_bytes(), 1_049_088);
        assert_eq!(primary.format(), Some("SafeTensor"));
        assert_eq!(v.images[0].nsfw_level, 2);
    }

    #[test]
    fn trained_words_are_unioned_in_order() {
        let m: Model = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(m.trained_words(), vec!["rv", "analog", "film"]);
    }

    #[test]
    fn tag_objects_are_flattened() {
        let m: Model =
            serde_json::from_str(r#"{"id": 1, "tags": [{"name": "anime"}, "style"]}"#).unwrap();
        assert_eq!(m.tags, vec!["anime", "style"]);
    }

    #[test]
    fn legacy_commercial_use_string() {
        let m: Model =
            serde_json::from_str(r#"{"id": 1, "allowCommercialUse": "Sell"}"#).unwrap();
        assert_eq!(m.allow_commercial_use, vec!["Sell"]);
        let m: Model =
            serde_json::from_str(r#"{"id": 1, "allowCommercialUse": "None"}"#).unwrap();
        assert!(m.allow_commercial_use.is_empty());
    }

    #[test]
    fn minimal_model_uses_defaults() {
        let m: Model = serde_json::from_str(r#"{"id": 7}"#).unwrap();
        assert_eq!(m.model_type, ModelType::Other);
        assert!(m.allow_no_credit);
        assert!(m.model_versions.is_empty());
        assert!(m.latest_version().is_none());
    }
}
