//! Duplicate detection and catalogue statistics.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use civit_types::Model;
use serde::Serialize;

use crate::classify::normalize_base_model;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateKind {
    /// Same file SHA256 published under different models.
    Hash,
    /// Names that normalise to the same key.
    Name,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateEntry {
    pub model_id: u64,
    pub model_name: String,
    pub version_id: Option<u64>,
    pub file_id: Option<u64>,
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    pub kind: DuplicateKind,
    pub key: String,
    pub entries: Vec<DuplicateEntry>,
}

impl DuplicateGroup {
    pub fn model_ids(&self) -> BTreeSet<u64> {
        self.entries.iter().map(|e| e.model_id).collect()
    }
}

/// Files whose SHA256 appears under more than one model. Groups are sorted
/// by hash; entries keep input order.
pub fn find_hash_duplicates(models: &[Model]) -> Vec<DuplicateGroup> {
    let mut by_hash: BTreeMap<String, Vec<DuplicateEntry>> = BTreeMap::new();
    for model in models {
        for version in &model.model_versions {
            for file in &version.files {
                let Some(sha) = file.hashes.sha256() else {
                    continue;
                };
                by_hash.entry(sha).or_default().push(DuplicateEntry {
                    model_id: model.id,
                    model_name: model.name.clone(),
                    version_id: Some(version.id),
                    file_id: Some(file.id),
                    file_name: Some(file.name.clone()),
                });
            }
        }
    }
    groups(DuplicateKind::Hash, by_hash)
}

/// Models whose names normalise to the same key.
pub fn find_name_duplicates(models: &[Model]) -> Vec<DuplicateGroup> {
    let mut by_name: BTreeMap<String, Vec<DuplicateEntry>> = BTreeMap::new();
    for model in models {
        let key = normalize_name(&model.name);
        if key.is_empty() {
            continue;
        }
        by_name.entry(key).or_default().push(DuplicateEntry {
            model_id: model.id,
            model_name: model.name.clone(),
            version_id: None,
            file_id: None,
            file_name: None,
        });
    }
    groups(DuplicateKind::Name, by_name)
}

fn groups(kind: DuplicateKind, map: BTreeMap<String, Vec<DuplicateEntry>>) -> Vec<DuplicateGroup> {
    map.into_iter()
        .filter(|(_, entries)| entries.iter().map(|e| e.model_id).collect::<BTreeSet<_>>().len() > 1)
        .map(|(key, entries)| DuplicateGroup { kind, key, entries })
        .collect()
}

/// Lower-case, drop bracketed qualifiers and version tokens (`v2`,
/// `v1.5`), keep only alphanumerics.
pub fn normalize_name(name: &str) -> String {
    let mut depth = 0usize;
    let unbracketed: String = name
        .chars()
        .filter(|&c| match c {
            '(' | '[' | '{' => {
                depth += 1;
                false
            }
            ')' | ']' | '}' => {
                depth = depth.saturating_sub(1);
                false
            }
            _ => depth == 0,
        })
        .collect();
    unbracketed
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|word| !is_version_token(word))
        .flat_map(|word| word.chars().filter(|c| c.is_alphanumeric()))
        .collect()
}

fn is_version_token(word: &str) -> bool {
    word.strip_prefix('v')
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit() || c == '.'))
}

/// Summary figures over a set of models.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CatalogStats {
    pub total: usize,
    pub nsfw: usize,
    pub by_type: BTreeMap<String, usize>,
    pub by_base_model: BTreeMap<String, usize>,
    pub total_downloads: u64,
    pub top_creators: Vec<(String, usize)>,
    pub top_tags: Vec<(String, usize)>,
    /// Sum of the primary file of each model's latest version.
    pub primary_size_bytes: u64,
}

impl CatalogStats {
    pub fn compute(models: &[Model], top_n: usize) -> Self {
        let mut stats = CatalogStats { total: models.len(), ..Default::default() };
        let mut creators: HashMap<&str, usize> = HashMap::new();
        let mut tags: HashMap<String, usize> = HashMap::new();

        for model in models {
            if model.nsfw {
                stats.nsfw += 1;
            }
            *stats.by_type.entry(model.model_type.slug().to_owned()).or_default() += 1;
            let base = model.base_model().map(normalize_base_model).unwrap_or_else(|| "unknown".to_owned());
            *stats.by_base_model.entry(base).or_default() += 1;
            stats.total_downloads += model.stats.download_count;
            if let Some(creator) = model.creator_name() {
                *creators.entry(creator).or_default() += 1;
            }
            for tag in &model.tags {
                *tags.entry(tag.to_lowercase()).or_default() += 1;
            }
            if let Some(file) = model.latest_version().and_then(|v| v.primary_file()) {
                stats.primary_size_bytes += file.size_bytes();
            }
        }

        stats.top_creators = top(creators.into_iter().map(|(k, v)| (k.to_owned(), v)), top_n);
        stats.top_tags = top(tags.into_iter(), top_n);
        stats
    }
}

fn top(counts: impl Iterator<Item = (String, usize)>, n: usize) -> Vec<(String, usize)> {
    let mut v: Vec<(String, usize)> = counts.collect();
    v.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    v.truncate(n);
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn models() -> Vec<Model> {
        serde_json::from_value(json!([
            {
                "id": 1, "name": "Detail Tweaker (LoRA) v2", "type": "LORA", "tags": ["Detail", "tool"],
                "creator": {"username": "alice"}, "stats": {"downloadCount": 100},
                "modelVersions": [{"id": 10, "baseModel": "SD 1.5",
                    "files": [{"id": 100, "name": "dt.safetensors", "sizeKB": 1.0, "primary": true,
                               "hashes": {"SHA256": "AAAA"}}]}]
            },
            {
                "id": 2, "name": "detail-tweaker", "type": "LORA", "nsfw": true, "tags": ["detail"],
                "creator": {"username": "bob"}, "stats": {"downloadCount": 5},
                "modelVersions": [{"id": 20, "baseModel": "SDXL 1.0",
                    "files": [{"id": 200, "name": "copy.safetensors", "sizeKB": 2.0,
                               "hashes": {"SHA256": "aaaa"}}]}]
            },
            {
                "id": 3, "name": "Unique", "type": "Checkpoint",
                "creator": {"username": "alice"},
                "modelVersions": [
                    {"id": 31, "files": [{"id": 301, "name": "u.ckpt", "hashes": {"SHA256": "BBBB"}}]},
                    {"id": 30, "files": [{"id": 300, "name": "u0.ckpt", "hashes": {"SHA256": "BBBB"}}]}
                ]
            }
        ]))
        .unwrap()
    }

    #[test]
    fn hash_duplicates_span_models() {
        let groups = find_hash_duplicates(&models());
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].key, "aaaa");
        assert_eq!(groups[0].model_ids().into_iter().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn name_duplicates() {
        assert_eq!(normalize_name("Detail Tweaker (LoRA) v2"), "detailtweaker");
        assert_eq!(normalize_name("detail-tweaker"), "detailtweaker");
        assert_eq!(normalize_name("SDXL_Lightning v1.0 [beta]"), "sdxllightning");
        let groups = find_name_duplicates(&models());
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].kind, DuplicateKind::Name);
        assert_eq!(groups[0].entries.len(), 2);
    }

    #[test]
    fn stats() {
        let s = CatalogStats::compute(&models(), 1);
        assert_eq!(s.total, 3);
        assert_eq!(s.nsfw, 1);
        assert_eq!(s.by_type.get("lora"), Some(&2));
        assert_eq!(s.by_base_model.get("sd15"), Some(&1));
        assert_eq!(s.by_base_model.get("unknown"), Some(&1));
        assert_eq!(s.total_downloads, 105);
        assert_eq!(s.top_creators, vec![("alice".to_owned(), 2)]);
        assert_eq!(s.top_tags, vec![("detail".to_owned(), 2)]);
        // 1 KB primary of model 1, first file of model 2, nothing for model 3.
        assert_eq!(s.primary_size_bytes, 1024 + 2048);
    }
}
