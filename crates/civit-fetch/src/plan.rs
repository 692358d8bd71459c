//! Turning a [`Model`] into concrete file downloads.

use std::path::{Path, PathBuf};

use civit_types::{Model, ModelFile, ModelVersion};
use tracing::warn;

const MAX_NAME_LEN: usize = 180;

/// Which version and which files of a model to fetch.
#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    /// Download root; files land in `<root>/<type>/<model name>/`.
    pub root: PathBuf,
    /// Specific version; `None` picks the latest.
    pub version_id: Option<u64>,
    /// Every file of the version instead of just the primary one.
    pub all_files: bool,
    /// Only files whose metadata format matches, e.g. `SafeTensor`.
    pub format: Option<String>,
}

/// One file to download.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadJob {
    pub model_id: u64,
    pub model_name: String,
    pub version_id: u64,
    pub file_id: u64,
    pub file_name: String,
    pub url: String,
    pub dest: PathBuf,
    pub sha256: Option<String>,
    /// Size reported by the API; rounded from kilobytes, so approximate.
    pub size_bytes: Option<u64>,
}

impl DownloadJob {
    pub fn part_path(&self) -> PathBuf {
        part_path(&self.dest)
    }
}

pub(crate) fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Plan the downloads for one model. Returns an empty list when the
/// requested version does not exist or has no matching files.
pub fn plan_downloads(model: &Model, opts: &PlanOptions) -> Vec<DownloadJob> {
    let version = match opts.version_id {
        Some(id) => model.version(id),
        None => model.latest_version(),
    };
    let Some(version) = version else {
        warn!(model_id = model.id, version_id = ?opts.version_id, "no matching version to download");
        return Vec::new();
    };

    let dir = opts
        .root
        .join(model.model_type.slug())
        .join(sanitize_filename(&model.name));

    select_files(version, opts)
        .into_iter()
        .filter_map(|file| {
            let Some(url) = file.download_url.clone().or_else(|| version.download_url.clone()) else {
                warn!(model_id = model.id, file_id = file.id, "file has no download URL; skipping");
                return None;
            };
            let file_name = sanitize_filename(&file.name);
            Some(DownloadJob {
                model_id: model.id,
                model_name: model.name.clone(),
                version_id: version.id,
                file_id: file.id,
                dest: dir.join(&file_name),
                file_name,
                url,
                sha256: file.hashes.sha256(),
                size_bytes: (file.size_kb > 0.0).then(|| file.size_bytes()),
            })
        })
        .collect()
}

fn select_files<'a>(version: &'a ModelVersion, opts: &PlanOptions) -> Vec<&'a ModelFile> {
    let matches_format = |f: &&ModelFile| match opts.format.as_deref() {
        Some(want) => f.format().is_some_and(|have| have.eq_ignore_ascii_case(want)),
        None => true,
    };
    if opts.all_files {
        return version.files.iter().filter(matches_format).collect();
    }
    let candidates: Vec<&ModelFile> = version.files.iter().filter(matches_format).collect();
    candidates
        .iter()
        .find(|f| f.primary)
        .or_else(|| candidates.first())
        .map(|f| vec![*f])
        .unwrap_or_default()
}

/// Make `name` safe as a single path component on every major OS.
pub fn sanitize_filename(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    out = out.trim_matches(|c: char| c == '.' || c.is_whitespace()).to_owned();
    if out.chars().count() > MAX_NAME_LEN {
        out = out.chars().take(MAX_NAME_LEN).collect();
    }
    if out.is_empty() { "unnamed".to_owned() } else { out }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn model() -> Model {
        serde_json::from_value(json!({
            "id": 4201,
            "name": "Realistic Vision: V6/B1",
            "type": "Checkpoint",
            "modelVersions": [
                {
                    "id": 2,
                    "files": [
                        {"id": 21, "name": "rv.ckpt", "sizeKB": 2.0, "primary": false,
                         "metadata": {"format": "PickleTensor"},
                         "downloadUrl": "https://civitai.com/api/download/models/2?type=Model&format=PickleTensor"},
                        {"id": 22, "name": "rv.safetensors", "sizeKB": 1.0, "primary": true,
                         "metadata": {"format": "SafeTensor"},
                         "hashes": {"SHA256": "ABCDEF"},
                         "downloadUrl": "https://civitai.com/api/download/models/2"}
                    ]
                },
                {
                    "id": 1,
                    "downloadUrl": "https://civitai.com/api/download/models/1",
                    "files": [{"id": 11, "name": "old.safetensors"}]
                }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn primary_file_of_latest_version() {
        let opts = PlanOptions { root: PathBuf::from("/dl"), ..Default::default() };
        let jobs = plan_downloads(&model(), &opts);
        assert_eq!(jobs.len(), 1);
        let job = &jobs[0];
        assert_eq!(job.file_id, 22);
        assert_eq!(job.version_id, 2);
        assert_eq!(job.sha256.as_deref(), Some("abcdef"));
        assert_eq!(job.size_bytes, Some(1024));
        assert_eq!(
            job.dest,
            PathBuf::from("/dl/checkpoint/Realistic Vision_ V6_B1/rv.safetensors")
        );
        assert_eq!(
            job.part_path(),
            PathBuf::from("/dl/checkpoint/Realistic Vision_ V6_B1/rv.safetensors.part")
        );
    }

    #[test]
    fn all_files_with_format_filter() {
        let mut opts = PlanOptions { root: PathBuf::from("/dl"), all_files: true, ..Default::default() };
        assert_eq!(plan_downloads(&model(), &opts).len(), 2);
        opts.format = Some("pickletensor".into());
        let jobs = plan_downloads(&model(), &opts);
        assert_eq!(jobs.iter().map(|j| j.file_id).collect::<Vec<_>>(), vec![21]);
    }

    #[test]
    fn explicit_version_falls_back_to_version_url() {
        let opts = PlanOptions { root: PathBuf::from("/dl"), version_id: Some(1), ..Default::default() };
        let jobs = plan_downloads(&model(), &opts);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].url, "https://civitai.com/api/download/models/1");
        assert_eq!(jobs[0].size_bytes, None);

        let opts = PlanOptions { version_id: Some(99), ..Default::default() };
        assert!(plan_downloads(&model(), &opts).is_empty());
    }

    #[test]
    fn sanitize() {
        assert_eq!(sanitize_filename("a/b\\c:d*e?f\"g<h>i|j"), "a_b_c_d_e_f_g_h_i_j");
        assert_eq!(sanitize_filename("  ..hidden.  "), "hidden");
        assert_eq!(sanitize_filename("../"), "_");
        assert_eq!(sanitize_filename("..."), "unnamed");
        assert_eq!(sanitize_filename(&"x".repeat(500)).len(), MAX_NAME_LEN);
        assert_eq!(sanitize_filename("Détail ✨"), "Détail ✨");
    }
}
