//! Local SQLite catalogue.
//!
//! One trait per table ([`ModelStore`], [`DownloadStore`], [`CategoryStore`])
//! implemented on [`Store`]. All trait methods use `impl Future` in their
//! signatures so no extra `async-trait` crate is required.
//!
//! Queries use the runtime-checked `sqlx::query` form, so no `DATABASE_URL`
//! is needed at compile time. Timestamps are stored as RFC 3339 text.

pub mod category;
pub mod dao;
pub mod download;
pub mod model;

pub use category::CategoryStore;
pub use dao::{
    CategoryCount, CategoryKind, CategoryRecord, DownloadRecord, DownloadStatus, ModelFilter,
    ModelRecord, NewDownload,
};
pub use download::DownloadStore;
pub use model::ModelStore;

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

pub const DEFAULT_DATABASE_URL: &str = "sqlite://civit.db";

#[derive(Clone, Debug)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (or create) the SQLite database at `url` and run pending migrations.
    ///
    /// `url` should be a sqlx-compatible SQLite URL, e.g. `"sqlite://civit.db"`
    /// or `"sqlite::memory:"` for tests. In-memory databases live on a single
    /// connection that is never recycled, otherwise every pooled connection
    /// would see its own empty database.
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let pool = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new().max_connections(4).connect_with(options).await?
        };
        // Path is resolved relative to CARGO_MANIFEST_DIR at compile time.
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::debug!(url, "database ready");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

pub(crate) fn parse_rfc3339_or_now(raw: &str, field: &'static str) -> DateTime<Utc> {
    raw.parse().unwrap_or_else(|e: chrono::ParseError| {
        tracing::warn!(raw = %raw, error = %e, field, "failed to parse timestamp; using now");
        Utc::now()
    })
}

pub(crate) fn parse_optional_rfc3339(raw: Option<String>, field: &'static str) -> Option<DateTime<Utc>> {
    raw.and_then(|v| {
        v.parse()
            .map_err(|e: chrono::ParseError| {
                tracing::warn!(raw = %v, error = %e, field, "failed to parse optional timestamp; dropping value");
                e
            })
            .ok()
    })
}
