//! Category assignment from model type, base model and tags.

use std::collections::BTreeSet;

use civit_store::{CategoryKind, ModelRecord};
use civit_types::{Model, ModelType};

/// Ordered prefix table over the compacted (lower-case, alphanumeric only)
/// base model name. More specific prefixes come first.
const BASE_MODEL_PREFIXES: &[(&str, &str)] = &[
    ("pony", "pony"),
    ("illustrious", "illustrious"),
    ("noobai", "noobai"),
    ("flux", "flux"),
    ("sdxl", "sdxl"),
    ("sd35", "sd3"),
    ("sd3", "sd3"),
    ("sd2", "sd2"),
    ("sd15", "sd15"),
    ("sd14", "sd15"),
    ("sd1", "sd15"),
    ("playground", "playground"),
    ("pixart", "pixart"),
    ("hunyuan", "hunyuan"),
    ("wan", "wan"),
    ("svd", "svd"),
    ("stablecascade", "cascade"),
    ("ltxv", "ltxv"),
    ("auraflow", "auraflow"),
    ("kolors", "kolors"),
];

/// Tag keyword table. A tag matches when it equals a keyword or one of its
/// words does.
const TAG_CATEGORIES: &[(&str, &[&str])] = &[
    ("anime", &["anime", "manga", "cartoon", "illustration", "2d", "toon"]),
    ("realistic", &["realistic", "photorealistic", "photography", "photo", "realism", "hyperrealism"]),
    ("character", &["character", "characters", "girl", "woman", "man", "boy", "celebrity", "person", "waifu", "oc"]),
    ("style", &["style", "artstyle", "artist", "painting", "aesthetic", "art"]),
    ("concept", &["concept", "tool", "slider", "detail", "lighting", "effect"]),
    ("clothing", &["clothing", "outfit", "dress", "costume", "armor", "uniform", "fashion"]),
    ("pose", &["pose", "poses", "action", "gesture"]),
    ("background", &["background", "landscape", "scenery", "building", "architecture", "environment", "city"]),
    ("vehicle", &["vehicle", "car", "mecha", "robot", "spaceship"]),
    ("animal", &["animal", "animals", "creature", "cat", "dog", "furry"]),
    ("3d", &["3d", "render", "cgi"]),
];

/// Collapse the many spellings of a base model (`SD 1.5`, `SDXL 1.0`,
/// `Flux.1 D`, ...) into one short key.
pub fn normalize_base_model(raw: &str) -> String {
    let compact: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if compact.is_empty() {
        return "unknown".to_owned();
    }
    BASE_MODEL_PREFIXES
        .iter()
        .find(|(prefix, _)| compact.starts_with(prefix))
        .map(|(_, key)| (*key).to_owned())
        .unwrap_or(compact)
}

/// Topic categories for a set of tags.
pub fn tag_categories<S: AsRef<str>>(tags: &[S]) -> BTreeSet<&'static str> {
    let mut out = BTreeSet::new();
    for tag in tags {
        let tag = tag.as_ref().trim().to_lowercase();
        if tag.is_empty() {
            continue;
        }
        for (category, keywords) in TAG_CATEGORIES {
            let hit = keywords.iter().any(|kw| {
                tag == *kw || tag.split(|c: char| !c.is_alphanumeric()).any(|word| word == *kw)
            });
            if hit {
                out.insert(*category);
            }
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// [`ModelType::slug`] of the model type.
    pub model_type: String,
    pub base_model: Option<String>,
    pub tags: BTreeSet<&'static str>,
}

impl Classification {
    pub fn new<S: AsRef<str>>(model_type: ModelType, base_model: Option<&str>, tags: &[S]) -> Self {
        Self {
            model_type: model_type.slug().to_owned(),
            base_model: base_model
                .filter(|b| !b.trim().is_empty())
                .map(normalize_base_model),
            tags: tag_categories(tags),
        }
    }

    pub fn from_model(model: &Model) -> Self {
        Self::new(model.model_type, model.base_model(), &model.tags)
    }

    pub fn from_record(record: &ModelRecord) -> Self {
        Self::new(
            ModelType::from(record.model_type.clone()),
            record.base_model.as_deref(),
            &record.tags,
        )
    }

    /// Rows for [`civit_store::CategoryStore::replace_categories`].
    pub fn categories(&self) -> Vec<(CategoryKind, String)> {
        let mut out = vec![(CategoryKind::Type, self.model_type.clone())];
        if let Some(base) = &self.base_model {
            out.push((CategoryKind::BaseModel, base.clone()));
        }
        out.extend(self.tags.iter().map(|t| (CategoryKind::Tag, (*t).to_owned())));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_model_spellings() {
        assert_eq!(normalize_base_model("SD 1.5"), "sd15");
        assert_eq!(normalize_base_model("SD 1.5 LCM"), "sd15");
        assert_eq!(normalize_base_model("SDXL 1.0"), "sdxl");
        assert_eq!(normalize_base_model("SDXL Lightning"), "sdxl");
        assert_eq!(normalize_base_model("Pony"), "pony");
        assert_eq!(normalize_base_model("Flux.1 D"), "flux");
        assert_eq!(normalize_base_model("SD 3.5 Large"), "sd3");
        assert_eq!(normalize_base_model("SD 2.1 768"), "sd2");
        assert_eq!(normalize_base_model("Illustrious"), "illustrious");
        assert_eq!(normalize_base_model("Some New Base"), "somenewbase");
        assert_eq!(normalize_base_model("  "), "unknown");
    }

    #[test]
    fn tags_map_through_keywords() {
        let cats = tag_categories(&["Anime", "art style", "female character", "car", "nsfw"]);
        assert_eq!(
            cats.into_iter().collect::<Vec<_>>(),
            vec!["anime", "character", "style", "vehicle"]
        );
        assert!(tag_categories::<&str>(&[]).is_empty());
    }

    #[test]
    fn classification_rows() {
        let c = Classification::new(ModelType::LoCon, Some("SDXL 1.0"), &["landscape", "photo"]);
        assert_eq!(
            c.categories(),
            vec![
                (CategoryKind::Type, "lycoris".to_owned()),
                (CategoryKind::BaseModel, "sdxl".to_owned()),
                (CategoryKind::Tag, "background".to_owned()),
                (CategoryKind::Tag, "realistic".to_owned()),
            ]
        );
        let bare = Classification::new::<String>(ModelType::Other, None, &[]);
        assert_eq!(bare.categories(), vec![(CategoryKind::Type, "other".to_owned())]);
    }
}
