//! Single-file downloads with resume, retry and SHA256 verification.
//!
//! Bytes go to `<dest>.part` first. When a part file exists the request
//! carries `Range: bytes=<len>-`; a `206` reply is appended, a `200` reply
//! means the server ignored the range and the part file is restarted. Every
//! retry resumes from whatever the part file holds at that moment. Only a
//! verified part file is renamed onto the destination.

use std::path::Path;
use std::time::Duration;

use civit_api::{CivitClient, RetryPolicy, Retryable};
use futures::StreamExt;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT_ENCODING, CONTENT_RANGE, RANGE};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::error::FetchError;
use crate::hash::sha256_file;
use crate::plan::DownloadJob;

/// Emit a progress event at most once per this many bytes.
const PROGRESS_STEP: u64 = 8 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Downloaded { bytes: u64, sha256: String },
    /// The destination already held a verified copy.
    Skipped { sha256: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadEventKind {
    Started { resume_from: u64, total: Option<u64> },
    Progress { downloaded: u64, total: Option<u64> },
    Finished(DownloadOutcome),
    Failed { error: String },
}

/// Progress notification for one job, keyed by `(model_id, file_id)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadEvent {
    pub model_id: u64,
    pub file_id: u64,
    pub kind: DownloadEventKind,
}

#[derive(Debug, Clone)]
pub struct Downloader {
    http: reqwest::Client,
    api_key: Option<String>,
    retry: RetryPolicy,
    events: Option<UnboundedSender<DownloadEvent>>,
    progress_step: u64,
}

impl Downloader {
    /// Build a downloader with its own HTTP client. Large files outlive any
    /// sensible total-request timeout, so only connect and read timeouts
    /// are set.
    pub fn new(proxy: Option<String>) -> Self {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("civit/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            .read_timeout(Duration::from_secs(120));

        if let Some(ref proxy_url) = proxy {
            match reqwest::Proxy::all(proxy_url) {
                Ok(p) => {
                    builder = builder.proxy(p);
                }
                Err(e) => {
                    warn!(proxy = %proxy_url, error = %e, "ignoring invalid proxy URL");
                }
            }
        }

        let http = builder.build().unwrap_or_default();

        Self {
            http,
            api_key: None,
            retry: RetryPolicy::default(),
            events: None,
            progress_step: PROGRESS_STEP,
        }
    }

    /// Downloader sharing the API key and retry policy of `client`.
    pub fn for_client(client: &CivitClient, proxy: Option<String>) -> Self {
        let mut dl = Self::new(proxy).with_retry(client.retry_policy());
        dl.api_key = client.api_key().map(str::to_owned);
        dl
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.api_key = (!key.trim().is_empty()).then_some(key);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_events(mut self, tx: UnboundedSender<DownloadEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn with_progress_step(mut self, bytes: u64) -> Self {
        self.progress_step = bytes.max(1);
        self
    }

    /// Download one job. Emits `Started`, `Progress`, then `Finished` or
    /// `Failed` on the event channel when one is attached.
    pub async fn download(&self, job: &DownloadJob) -> Result<DownloadOutcome, FetchError> {
        match self.download_inner(job).await {
            Ok(outcome) => {
                self.emit(job, DownloadEventKind::Finished(outcome.clone()));
                Ok(outcome)
            }
            Err(e) => {
                warn!(model_id = job.model_id, file_id = job.file_id, error = %e, "download failed");
                self.emit(job, DownloadEventKind::Failed { error: e.to_string() });
                Err(e)
            }
        }
    }

    async fn download_inner(&self, job: &DownloadJob) -> Result<DownloadOutcome, FetchError> {
        if let Some(outcome) = self.existing(job).await? {
            info!(path = %job.dest.display(), "already downloaded; skipping");
            return Ok(outcome);
        }

        if let Some(parent) = job.dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| FetchError::io(parent, e))?;
        }

        let part = job.part_path();
        let bytes = match self
            .retry
            .run(&job.file_name, |_| self.fetch_to_part(job, &part))
            .await
        {
            Ok(bytes) => bytes,
            Err(e) if e.is_retryable() => {
                return Err(FetchError::RetriesExhausted {
                    attempts: self.retry.max_retries + 1,
                    last: Box::new(e),
                });
            }
            Err(e) => return Err(e),
        };

        let actual = sha256_file(&part).await?;
        if let Some(expected) = job.sha256.as_deref() {
            if !actual.eq_ignore_ascii_case(expected) {
                if let Err(e) = tokio::fs::remove_file(&part).await {
                    warn!(path = %part.display(), error = %e, "failed to remove corrupt part file");
                }
                return Err(FetchError::HashMismatch {
                    path: job.dest.clone(),
                    expected: expected.to_ascii_lowercase(),
                    actual,
                });
            }
        }

        tokio::fs::rename(&part, &job.dest)
            .await
            .map_err(|e| FetchError::io(&job.dest, e))?;
        info!(path = %job.dest.display(), bytes, "download complete");
        Ok(DownloadOutcome::Downloaded { bytes, sha256: actual })
    }

    /// A destination file that is already in place. With a published hash
    /// it must match; without one any non-empty file counts.
    async fn existing(&self, job: &DownloadJob) -> Result<Option<DownloadOutcome>, FetchError> {
        let meta = match tokio::fs::metadata(&job.dest).await {
            Ok(m) if m.is_file() && m.len() > 0 => m,
            _ => return Ok(None),
        };
        match job.sha256.as_deref() {
            Some(expected) => {
                let actual = sha256_file(&job.dest).await?;
                if actual.eq_ignore_ascii_case(expected) {
                    Ok(Some(DownloadOutcome::Skipped { sha256: Some(actual) }))
                } else {
                    warn!(path = %job.dest.display(), expected, actual, "existing file hash differs; downloading again");
                    Ok(None)
                }
            }
            None => {
                debug!(path = %job.dest.display(), len = meta.len(), "existing file without published hash");
                Ok(Some(DownloadOutcome::Skipped { sha256: None }))
            }
        }
    }

    /// One attempt: resume `part` from its current length. Returns the
    /// final length of the part file.
    async fn fetch_to_part(&self, job: &DownloadJob, part: &Path) -> Result<u64, FetchError> {
        let mut offset = match tokio::fs::metadata(part).await {
            Ok(m) => m.len(),
            Err(_) => 0,
        };

        let mut resp = self.request(job, offset).await?;
        if offset > 0 && resp.status() == StatusCode::PARTIAL_CONTENT {
            let start = content_range(resp.headers()).map(|(start, _)| start);
            if start != Some(offset) {
                warn!(path = %part.display(), offset, ?start, "server answered a different range; restarting");
                drop(resp);
                offset = 0;
                resp = self.request(job, 0).await?;
            }
        }
        let status = resp.status();

        if status == StatusCode::RANGE_NOT_SATISFIABLE && offset > 0 {
            // The part file already holds the whole body.
            return Ok(offset);
        }
        if !status.is_success() {
            return Err(FetchError::Status { status: status.as_u16(), url: job.url.clone() });
        }

        let resumed = offset > 0 && status == StatusCode::PARTIAL_CONTENT;
        let mut written = if resumed { offset } else { 0 };
        let total = if resumed {
            content_range(resp.headers()).and_then(|(_, total)| total)
        } else {
            resp.content_length()
        };
        if offset > 0 && !resumed {
            debug!(path = %part.display(), "server ignored range; restarting");
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(resumed)
            .truncate(!resumed)
            .open(part)
            .await
            .map_err(|e| FetchError::io(part, e))?;

        self.emit(job, DownloadEventKind::Started { resume_from: written, total });

        let mut last_report = written;
        let mut stream = resp.bytes_stream();
        let mut interrupted = None;
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    interrupted = Some(FetchError::from(e));
                    break;
                }
            };
            file.write_all(&chunk).await.map_err(|e| FetchError::io(part, e))?;
            written += chunk.len() as u64;
            if written - last_report >= self.progress_step {
                last_report = written;
                self.emit(job, DownloadEventKind::Progress { downloaded: written, total });
            }
        }
        // Flush before reporting a broken stream so the next attempt sees
        // every byte received so far.
        file.flush().await.map_err(|e| FetchError::io(part, e))?;
        match interrupted {
            Some(e) => Err(e),
            None => Ok(written),
        }
    }

    async fn request(&self, job: &DownloadJob, offset: u64) -> Result<reqwest::Response, FetchError> {
        let mut req = self.http.get(&job.url).header(ACCEPT_ENCODING, "identity");
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        if offset > 0 {
            debug!(url = %job.url, offset, "resuming download");
            req = req.header(RANGE, format!("bytes={offset}-"));
        }
        Ok(req.send().await?)
    }

    fn emit(&self, job: &DownloadJob, kind: DownloadEventKind) {
        if let Some(tx) = &self.events {
            // A dropped receiver only means nobody is listening.
            let _ = tx.send(DownloadEvent { model_id: job.model_id, file_id: job.file_id, kind });
        }
    }
}

/// Start offset and total length from `Content-Range: bytes <start>-<end>/<total>`.
fn content_range(headers: &reqwest::header::HeaderMap) -> Option<(u64, Option<u64>)> {
    let value = headers.get(CONTENT_RANGE)?.to_str().ok()?;
    let (range, total) = value.trim().strip_prefix("bytes ")?.split_once('/')?;
    let start = range.split_once('-')?.0.trim().parse().ok()?;
    Some((start, total.trim().parse().ok()))
}
