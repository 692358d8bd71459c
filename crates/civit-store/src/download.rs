use std::future::Future;
use std::str::FromStr;

use chrono::Utc;

use crate::dao::{DownloadRecord, DownloadStatus, NewDownload};
use crate::{Store, parse_optional_rfc3339, parse_rfc3339_or_now};

pub trait DownloadStore: Send + Sync + 'static {
    /// Register a file as pending and return its row id. A row that already
    /// completed keeps its status; anything else goes back to `pending`.
    fn upsert_pending(&self, download: NewDownload) -> impl Future<Output = Result<i64, sqlx::Error>> + Send;
    /// Move to `downloading` and bump the attempt counter.
    fn mark_downloading(&self, model_id: i64, file_id: i64) -> impl Future<Output = Result<(), sqlx::Error>> + Send;
    fn mark_completed(
        &self,
        model_id: i64,
        file_id: i64,
        sha256: Option<&str>,
        size_bytes: i64,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;
    fn mark_failed(
        &self,
        model_id: i64,
        file_id: i64,
        error: &str,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;
    /// The file was already present and verified.
    fn mark_skipped(
        &self,
        model_id: i64,
        file_id: i64,
        sha256: Option<&str>,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;
    fn get_download(
        &self,
        model_id: i64,
        file_id: i64,
    ) -> impl Future<Output = Result<Option<DownloadRecord>, sqlx::Error>> + Send;
    /// Newest first.
    fn list_downloads(
        &self,
        status: Option<DownloadStatus>,
        limit: Option<u32>,
    ) -> impl Future<Output = Result<Vec<DownloadRecord>, sqlx::Error>> + Send;
    fn status_counts(&self) -> impl Future<Output = Result<Vec<(DownloadStatus, i64)>, sqlx::Error>> + Send;
    fn is_completed(&self, model_id: i64, file_id: i64) -> impl Future<Output = Result<bool, sqlx::Error>> + Send;
    /// Rows left in `downloading` by a crashed run go back to `pending`.
    fn reset_interrupted(&self) -> impl Future<Output = Result<u64, sqlx::Error>> + Send;
}

const DOWNLOAD_COLUMNS: &str = "id, model_id, version_id, file_id, file_name, path, sha256, size_bytes, status, \
     attempts, error, created_at, updated_at, completed_at";

#[derive(sqlx::FromRow)]
struct DownloadRow {
    id: i64,
    model_id: i64,
    version_id: i64,
    file_id: i64,
    file_name: String,
    path: String,
    sha256: Option<String>,
    size_bytes: Option<i64>,
    status: String,
    attempts: i64,
    error: Option<String>,
    created_at: String,
    updated_at: String,
    completed_at: Option<String>,
}

fn parse_status(raw: &str) -> DownloadStatus {
    DownloadStatus::from_str(raw).unwrap_or_else(|_| {
        tracing::warn!(raw = %raw, "unknown download status; treating as failed");
        DownloadStatus::Failed
    })
}

impl From<DownloadRow> for DownloadRecord {
    fn from(row: DownloadRow) -> Self {
        DownloadRecord {
            id: row.id,
            model_id: row.model_id,
            version_id: row.version_id,
            file_id: row.file_id,
            file_name: row.file_name,
            path: row.path,
            sha256: row.sha256,
            size_bytes: row.size_bytes,
            status: parse_status(&row.status),
            attempts: row.attempts,
            error: row.error,
            created_at: parse_rfc3339_or_now(&row.created_at, "created_at"),
            updated_at: parse_rfc3339_or_now(&row.updated_at, "updated_at"),
            completed_at: parse_optional_rfc3339(row.completed_at, "completed_at"),
        }
    }
}

impl Store {
    async fn set_status(
        &self,
        model_id: i64,
        file_id: i64,
        status: DownloadStatus,
        error: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        let completed_at = status.is_done().then(|| now.clone());
        sqlx::query(
            "UPDATE downloads SET status = ?1, error = ?2, updated_at = ?3, \
             completed_at = COALESCE(?4, completed_at) \
             WHERE model_id = ?5 AND file_id = ?6",
        )
        .bind(status.as_str())
        .bind(error)
        .bind(&now)
        .bind(completed_at)
        .bind(model_id)
        .bind(file_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

impl DownloadStore for Store {
    async fn upsert_pending(&self, download: NewDownload) -> Result<i64, sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO downloads \
             (model_id, version_id, file_id, file_name, path, sha256, size_bytes, status, attempts, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', 0, ?8, ?8) \
             ON CONFLICT(model_id, file_id) DO UPDATE SET \
               version_id = excluded.version_id, file_name = excluded.file_name, path = excluded.path, \
               sha256 = COALESCE(excluded.sha256, downloads.sha256), \
               size_bytes = COALESCE(excluded.size_bytes, downloads.size_bytes), \
               status = CASE WHEN downloads.status IN ('completed', 'skipped') THEN downloads.status ELSE 'pending' END, \
               updated_at = excluded.updated_at \
             RETURNING id",
        )
        .bind(download.model_id)
        .bind(download.version_id)
        .bind(download.file_id)
        .bind(&download.file_name)
        .bind(&download.path)
        .bind(&download.sha256)
        .bind(download.size_bytes)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn mark_downloading(&self, model_id: i64, file_id: i64) -> Result<(), sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE downloads SET status = 'downloading', attempts = attempts + 1, error = NULL, updated_at = ?1 \
             WHERE model_id = ?2 AND file_id = ?3",
        )
        .bind(&now)
        .bind(model_id)
        .bind(file_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_completed(
        &self,
        model_id: i64,
        file_id: i64,
        sha256: Option<&str>,
        size_bytes: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE downloads SET sha256 = COALESCE(?1, sha256), size_bytes = ?2 \
             WHERE model_id = ?3 AND file_id = ?4",
        )
        .bind(sha256)
        .bind(size_bytes)
        .bind(model_id)
        .bind(file_id)
        .execute(&self.pool)
        .await?;
        self.set_status(model_id, file_id, DownloadStatus::Completed, None).await
    }

    async fn mark_failed(&self, model_id: i64, file_id: i64, error: &str) -> Result<(), sqlx::Error> {
        self.set_status(model_id, file_id, DownloadStatus::Failed, Some(error)).await
    }

    async fn mark_skipped(&self, model_id: i64, file_id: i64, sha256: Option<&str>) -> Result<(), sqlx::Error> {
        if sha256.is_some() {
            sqlx::query("UPDATE downloads SET sha256 = ?1 WHERE model_id = ?2 AND file_id = ?3")
                .bind(sha256)
                .bind(model_id)
                .bind(file_id)
                .execute(&self.pool)
                .await?;
        }
        self.set_status(model_id, file_id, DownloadStatus::Skipped, None).await
    }

    async fn get_download(&self, model_id: i64, file_id: i64) -> Result<Option<DownloadRecord>, sqlx::Error> {
        let row: Option<DownloadRow> = sqlx::query_as(&format!(
            "SELECT {DOWNLOAD_COLUMNS} FROM downloads WHERE model_id = ?1 AND file_id = ?2"
        ))
        .bind(model_id)
        .bind(file_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(DownloadRecord::from))
    }

    async fn list_downloads(
        &self,
        status: Option<DownloadStatus>,
        limit: Option<u32>,
    ) -> Result<Vec<DownloadRecord>, sqlx::Error> {
        let rows: Vec<DownloadRow> = sqlx::query_as(&format!(
            "SELECT {DOWNLOAD_COLUMNS} FROM downloads WHERE (?1 IS NULL OR status = ?1) \
             ORDER BY updated_at DESC, id DESC LIMIT ?2"
        ))
        .bind(status.map(DownloadStatus::as_str))
        .bind(limit.map(i64::from).unwrap_or(-1))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(DownloadRecord::from).collect())
    }

    async fn status_counts(&self) -> Result<Vec<(DownloadStatus, i64)>, sqlx::Error> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM downloads GROUP BY status ORDER BY status")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(s, n)| (parse_status(&s), n)).collect())
    }

    async fn is_completed(&self, model_id: i64, file_id: i64) -> Result<bool, sqlx::Error> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT status FROM downloads WHERE model_id = ?1 AND file_id = ?2")
                .bind(model_id)
                .bind(file_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some_and(|(s,)| parse_status(&s).is_done()))
    }

    async fn reset_interrupted(&self) -> Result<u64, sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE downloads SET status = 'pending', error = 'interrupted', updated_at = ?1 \
             WHERE status = 'downloading'",
        )
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
