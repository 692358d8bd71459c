use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::info;

use crate::downloader::{DownloadOutcome, Downloader};
use crate::error::FetchError;
use crate::plan::DownloadJob;

#[derive(Debug)]
pub struct DownloadReport {
    pub job: DownloadJob,
    pub result: Result<DownloadOutcome, FetchError>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub bytes: u64,
}

impl DownloadSummary {
    pub fn from_reports(reports: &[DownloadReport]) -> Self {
        reports.iter().fold(Self::default(), |mut acc, r| {
            match &r.result {
                Ok(DownloadOutcome::Downloaded { bytes, .. }) => {
                    acc.downloaded += 1;
                    acc.bytes += bytes;
                }
                Ok(DownloadOutcome::Skipped { .. }) => acc.skipped += 1,
                Err(_) => acc.failed += 1,
            }
            acc
        })
    }
}

/// Runs many [`DownloadJob`]s with bounded concurrency.
#[derive(Debug, Clone)]
pub struct DownloadManager {
    downloader: Arc<Downloader>,
}

impl DownloadManager {
    pub fn new(downloader: Downloader) -> Self {
        Self { downloader: Arc::new(downloader) }
    }

    pub fn downloader(&self) -> &Downloader {
        &self.downloader
    }

    /// Download every job, at most `concurrency` at a time. One report per
    /// job, in completion order; a failing job never stops the others.
    pub async fn run(&self, jobs: Vec<DownloadJob>, concurrency: usize) -> Vec<DownloadReport> {
        let total = jobs.len();
        info!(total, concurrency, "starting downloads");
        let reports: Vec<DownloadReport> = stream::iter(jobs)
            .map(|job| {
                let downloader = Arc::clone(&self.downloader);
                async move {
                    let result = downloader.download(&job).await;
                    DownloadReport { job, result }
                }
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;
        let summary = DownloadSummary::from_reports(&reports);
        info!(
            downloaded = summary.downloaded,
            skipped = summary.skipped,
            failed = summary.failed,
            bytes = summary.bytes,
            "downloads finished"
        );
        reports
    }
}
