//! Download planning and resumable, verified file downloads.

pub mod downloader;
pub mod error;
pub mod hash;
pub mod manager;
pub mod plan;

pub use downloader::{DownloadEvent, DownloadEventKind, DownloadOutcome, Downloader};
pub use error::FetchError;
pub use hash::sha256_file;
pub use manager::{DownloadManager, DownloadReport, DownloadSummary};
pub use plan::{DownloadJob, PlanOptions, plan_downloads, sanitize_filename};
