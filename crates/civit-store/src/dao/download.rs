use chrono::{DateTime, Utc};
use strum::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum DownloadStatus {
    Pending,
    Downloading,
    Completed,
    Failed,
    Skipped,
}

impl DownloadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DownloadStatus::Pending => "pending",
            DownloadStatus::Downloading => "downloading",
            DownloadStatus::Completed => "completed",
            DownloadStatus::Failed => "failed",
            DownloadStatus::Skipped => "skipped",
        }
    }

    /// The file is on disk and verified.
    pub fn is_done(self) -> bool {
        matches!(self, DownloadStatus::Completed | DownloadStatus::Skipped)
    }
}

/// A row in the `downloads` table. `(model_id, file_id)` is unique.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRecord {
    pub id: i64,
    pub model_id: i64,
    pub version_id: i64,
    pub file_id: i64,
    pub file_name: String,
    pub path: String,
    pub sha256: Option<String>,
    pub size_bytes: Option<i64>,
    pub status: DownloadStatus,
    pub attempts: i64,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Input for [`crate::DownloadStore::upsert_pending`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewDownload {
    pub model_id: i64,
    pub version_id: i64,
    pub file_id: i64,
    pub file_name: String,
    pub path: String,
    pub sha256: Option<String>,
    pub size_bytes: Option<i64>,
}
