//! Enumerations shared by the API layer, the store and the CLI.
//!
//! All of them parse case-insensitively from user input (`lora`, `LoRA`,
//! `LORA`) and render the exact spelling the CivitAI API expects.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{EnumIter, EnumString};
use thiserror::Error;

/// Returned when a CLI/config string does not name a known variant.
#[derive(Debug, Clone, Error)]
#[error("unknown {kind}: {value:?}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

/// Model kind as reported by CivitAI (`type` field of a model).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, EnumString, EnumIter,
    Serialize, Deserialize,
)]
#[serde(from = "String", into = "String")]
#[strum(ascii_case_insensitive)]
pub enum ModelType {
    Checkpoint,
    TextualInversion,
    Hypernetwork,
    AestheticGradient,
    #[strum(serialize = "LORA", serialize = "LoRA")]
    Lora,
    #[strum(serialize = "LoCon", serialize = "LyCORIS")]
    LoCon,
    DoRA,
    Controlnet,
    Upscaler,
    MotionModule,
    #[strum(serialize = "VAE")]
    Vae,
    Poses,
    Wildcards,
    Workflows,
    #[default]
    Other,
}

impl ModelType {
    /// Spelling used on the wire and in query strings.
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelType::Checkpoint => "Checkpoint",
            ModelType::TextualInversion => "TextualInversion",
            ModelType::Hypernetwork => "Hypernetwork",
            ModelType::AestheticGradient => "AestheticGradient",
            ModelType::Lora => "LORA",
            ModelType::LoCon => "LoCon",
            ModelType::DoRA => "DoRA",
            ModelType::Controlnet => "Controlnet",
            ModelType::Upscaler => "Upscaler",
            ModelType::MotionModule => "MotionModule",
            ModelType::Vae => "VAE",
            ModelType::Poses => "Poses",
            ModelType::Wildcards => "Wildcards",
            ModelType::Workflows => "Workflows",
            ModelType::Other => "Other",
        }
    }

    /// Lower-case slug used for directory names and category labels.
    pub fn slug(&self) -> &'static str {
        match self {
            ModelType::Checkpoint => "checkpoint",
            ModelType::TextualInversion => "embedding",
            ModelType::Hypernetwork => "hypernetwork",
            ModelType::AestheticGradient => "aesthetic-gradient",
            ModelType::Lora => "lora",
            ModelType::LoCon => "lycoris",
            ModelType::DoRA => "dora",
            ModelType::Controlnet => "controlnet",
            ModelType::Upscaler => "upscaler",
            ModelType::MotionModule => "motion-module",
            ModelType::Vae => "vae",
            ModelType::Poses => "poses",
            ModelType::Wildcards => "wildcards",
            ModelType::Workflows => "workflows",
            ModelType::Other => "other",
        }
    }

    /// Parse a user-supplied name, accepting the common aliases
    /// (`embedding`, `lycoris`, `ti`, ...).
    pub fn parse_loose(value: &str) -> Result<Self, ParseEnumError> {
        let trimmed = value.trim();
        let aliased = match trimmed.to_ascii_lowercase().as_str() {
            "embedding" | "embeddings" | "ti" => Some(ModelType::TextualInversion),
            "lycoris" | "locon" | "loha" => Some(ModelType::LoCon),
            "ckpt" | "model" => Some(ModelType::Checkpoint),
            _ => None,
        };
        if let Some(t) = aliased {
            return Ok(t);
        }
        ModelType::from_str(trimmed).map_err(|_| ParseEnumError {
            kind: "model type",
            value: value.to_owned(),
        })
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Upstream occasionally introduces new types; those land in `Other` instead
// of failing the whole page.
impl From<String> for ModelType {
    fn from(value: String) -> Self {
        ModelType::from_str(&value).unwrap_or(ModelType::Other)
    }
}

impl From<ModelType> for String {
    fn from(value: ModelType) -> Self {
        value.as_str().to_owned()
    }
}

/// Ordering accepted by the `/models` endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, EnumIter)]
#[strum(ascii_case_insensitive)]
pub enum SortOrder {
    #[strum(serialize = "Highest Rated", serialize = "highest-rated", serialize = "rated")]
    HighestRated,
    #[strum(serialize = "Most Downloaded", serialize = "most-downloaded", serialize = "downloads")]
    MostDownloaded,
    #[strum(serialize = "Most Liked", serialize = "most-liked", serialize = "liked")]
    MostLiked,
    #[strum(serialize = "Most Discussed", serialize = "most-discussed")]
    MostDiscussed,
    #[strum(serialize = "Most Collected", serialize = "most-collected")]
    MostCollected,
    #[strum(serialize = "Most Images", serialize = "most-images")]
    MostImages,
    #[strum(serialize = "Newest", serialize = "new")]
    Newest,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::HighestRated => "Highest Rated",
            SortOrder::MostDownloaded => "Most Downloaded",
            SortOrder::MostLiked => "Most Liked",
            SortOrder::MostDiscussed => "Most Discussed",
            SortOrder::MostCollected => "Most Collected",
            SortOrder::MostImages => "Most Images",
            SortOrder::Newest => "Newest",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time window for sort orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, EnumIter)]
#[strum(ascii_case_insensitive)]
pub enum Period {
    #[strum(serialize = "AllTime", serialize = "all-time", serialize = "all")]
    AllTime,
    Year,
    Month,
    Week,
    Day,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::AllTime => "AllTime",
            Period::Year => "Year",
            Period::Month => "Month",
            Period::Week => "Week",
            Period::Day => "Day",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
