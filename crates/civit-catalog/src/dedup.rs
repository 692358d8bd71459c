//! Collapsing repeated models from overlapping searches and dumps.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use civit_types::Model;

/// Drop repeated model ids, keeping the first occurrence.
pub fn dedup_models(models: impl IntoIterator<Item = Model>) -> Vec<Model> {
    let mut seen = std::collections::HashSet::new();
    models.into_iter().filter(|m| seen.insert(m.id)).collect()
}

/// Drop repeated model ids, keeping the position of the first occurrence
/// but the content of the newest copy (see [`merge_newest`]).
pub fn dedup_keep_newest(models: impl IntoIterator<Item = Model>) -> Vec<Model> {
    let mut index: HashMap<u64, usize> = HashMap::new();
    let mut out: Vec<Model> = Vec::new();
    for model in models {
        match index.get(&model.id) {
            Some(&i) => {
                let current = std::mem::take(&mut out[i]);
                out[i] = merge_newest(current, model);
            }
            None => {
                index.insert(model.id, out.len());
                out.push(model);
            }
        }
    }
    out
}

/// Of two copies of the same model, keep the one whose version list is
/// newer. Ties keep `a`.
pub fn merge_newest(a: Model, b: Model) -> Model {
    if freshness(&b) > freshness(&a) { b } else { a }
}

fn freshness(model: &Model) -> (Option<DateTime<Utc>>, u64, usize) {
    let latest = model
        .model_versions
        .iter()
        .filter_map(|v| v.published_at.or(v.updated_at).or(v.created_at))
        .max();
    let max_version = model.model_versions.iter().map(|v| v.id).max().unwrap_or(0);
    (latest, max_version, model.model_versions.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use civit_types::ModelVersion;

    fn model(id: u64, name: &str, versions: &[u64]) -> Model {
        Model {
            id,
            name: name.into(),
            model_versions: versions
                .iter()
                .map(|&v| ModelVersion { id: v, ..Default::default() })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn first_occurrence_wins() {
        let out = dedup_models(vec![model(1, "a", &[]), model(2, "b", &[]), model(1, "a2", &[])]);
        assert_eq!(out.iter().map(|m| m.name.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn newest_copy_replaces_in_place() {
        let out = dedup_keep_newest(vec![
            model(1, "old", &[10]),
            model(2, "other", &[20]),
            model(1, "new", &[11, 10]),
            model(1, "stale", &[9]),
        ]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].name, "new");
        assert_eq!(out[1].name, "other");
    }

    #[test]
    fn publish_date_beats_version_id() {
        let mut a = model(1, "a", &[5]);
        let mut b = model(1, "b", &[9]);
        a.model_versions[0].published_at = Some("2024-05-01T00:00:00Z".parse().unwrap());
        b.model_versions[0].published_at = Some("2023-01-01T00:00:00Z".parse().unwrap());
        assert_eq!(merge_newest(a, b).name, "a");
    }
}
