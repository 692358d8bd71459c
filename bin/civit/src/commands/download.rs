use std::path::PathBuf;

use anyhow::{Context as _, bail};
use civit_fetch::{
    DownloadEvent, DownloadEventKind, DownloadJob, DownloadManager, DownloadOutcome, DownloadSummary,
    Downloader, PlanOptions, plan_downloads,
};
use civit_store::{DownloadStatus, DownloadStore, ModelFilter, ModelStore, NewDownload, Store};
use civit_types::Model;
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use tracing::{debug, info, warn};

use super::{Context, decode_records, human_bytes, save_model};

pub struct Request {
    pub ids: Vec<u64>,
    pub from_store: bool,
    pub filter: ModelFilter,
    pub version_id: Option<u64>,
    pub all_files: bool,
    pub format: Option<String>,
    pub dir: Option<PathBuf>,
    pub concurrency: Option<usize>,
}

pub async fn run(ctx: &Context, req: Request) -> anyhow::Result<()> {
    if req.ids.is_empty() && !req.from_store {
        bail!("give one or more model ids, or --from-store");
    }
    if req.version_id.is_some() && req.ids.len() != 1 {
        bail!("--version-id needs exactly one model id");
    }

    let client = ctx.client()?;
    let store = ctx.store().await?;

    let reset = store.reset_interrupted().await.context("failed to reset interrupted downloads")?;
    if reset > 0 {
        info!(reset, "resuming downloads interrupted by an earlier run");
    }

    // ── 1. Resolve models ─────────────────────────────────────────────────────
    let models: Vec<Model> = if req.from_store {
        let records = store.list_models(&req.filter).await.context("failed to list stored models")?;
        decode_records(&records)
    } else {
        let mut out = Vec::with_capacity(req.ids.len());
        for &id in &req.ids {
            let (model, raw) = client.get_model_raw(id).await?;
            save_model(&store, &model, Some(&raw)).await?;
            out.push(model);
        }
        out
    };

    // ── 2. Plan ───────────────────────────────────────────────────────────────
    let opts = PlanOptions {
        root: req.dir.unwrap_or_else(|| ctx.config.download_dir.clone()),
        version_id: req.version_id,
        all_files: req.all_files,
        format: req.format,
    };
    let jobs = plan_jobs(&store, &models, &opts).await?;
    if jobs.is_empty() {
        println!("nothing to download");
        store.close().await;
        return Ok(());
    }

    // ── 3. Download, recording progress as it happens ─────────────────────────
    let (tx, rx) = unbounded_channel();
    let recorder = tokio::spawn(record_events(store.clone(), rx));

    let proxy = ctx.config.proxy.clone();
    let manager = DownloadManager::new(Downloader::for_client(&client, proxy).with_events(tx));
    let concurrency = req.concurrency.unwrap_or(ctx.config.concurrency);
    let reports = manager.run(jobs, concurrency).await;
    // The recorder ends once the last sender (inside the manager) is gone.
    drop(manager);
    recorder.await.context("download recorder panicked")?;

    let summary = DownloadSummary::from_reports(&reports);
    for report in reports.iter().filter(|r| r.result.is_err()) {
        if let Err(e) = &report.result {
            eprintln!("failed: {} ({}): {e}", report.job.file_name, report.job.model_name);
        }
    }
    println!(
        "downloaded {} ({}), skipped {}, failed {}",
        summary.downloaded,
        human_bytes(summary.bytes),
        summary.skipped,
        summary.failed
    );
    store.close().await;
    if summary.failed > 0 {
        bail!("{} download(s) failed", summary.failed);
    }
    Ok(())
}

/// Plan every model and register the jobs as pending. Files recorded as
/// done whose destination still exists are left out.
async fn plan_jobs(store: &Store, models: &[Model], opts: &PlanOptions) -> anyhow::Result<Vec<DownloadJob>> {
    let mut jobs = Vec::new();
    for model in models {
        let planned = plan_downloads(model, opts);
        if planned.is_empty() {
            warn!(model_id = model.id, "no downloadable files");
        }
        for job in planned {
            let (model_id, file_id) = (job.model_id as i64, job.file_id as i64);
            if job.dest.exists() && store.is_completed(model_id, file_id).await? {
                debug!(model_id, file_id, path = %job.dest.display(), "already in history; skipping");
                continue;
            }
            store
                .upsert_pending(NewDownload {
                    model_id,
                    version_id: job.version_id as i64,
                    file_id,
                    file_name: job.file_name.clone(),
                    path: job.dest.display().to_string(),
                    sha256: job.sha256.clone(),
                    size_bytes: job.size_bytes.map(|b| b as i64),
                })
                .await
                .with_context(|| format!("failed to register download {}", job.file_name))?;
            jobs.push(job);
        }
    }
    Ok(jobs)
}

/// Mirror downloader events into the `downloads` table until the channel
/// closes. Database errors are logged; they never stop a download.
pub(crate) async fn record_events(store: Store, mut rx: UnboundedReceiver<DownloadEvent>) {
    while let Some(event) = rx.recv().await {
        let (model_id, file_id) = (event.model_id as i64, event.file_id as i64);
        let result = match &event.kind {
            DownloadEventKind::Started { resume_from, .. } => {
                debug!(model_id, file_id, resume_from, "download started");
                store.mark_downloading(model_id, file_id).await
            }
            DownloadEventKind::Progress { downloaded, total } => {
                debug!(model_id, file_id, downloaded, total, "download progress");
                Ok(())
            }
            DownloadEventKind::Finished(DownloadOutcome::Downloaded { bytes, sha256 }) => {
                store
                    .mark_completed(model_id, file_id, Some(sha256), *bytes as i64)
                    .await
            }
            DownloadEventKind::Finished(DownloadOutcome::Skipped { sha256 }) => {
                store.mark_skipped(model_id, file_id, sha256.as_deref()).await
            }
            DownloadEventKind::Failed { error } => store.mark_failed(model_id, file_id, error).await,
        };
        if let Err(e) = result {
            warn!(model_id, file_id, error = %e, "failed to record download state");
        }
    }
}

pub async fn history(ctx: &Context, status: Option<DownloadStatus>, limit: u32) -> anyhow::Result<()> {
    let store = ctx.store().await?;
    let rows = store.list_downloads(status, Some(limit)).await.context("failed to list downloads")?;
    for row in &rows {
        let size = row.size_bytes.map(|b| human_bytes(b as u64)).unwrap_or_else(|| "-".to_owned());
        println!(
            "{}  {:<11} {:>8}  {:>10}  {}",
            row.updated_at.format("%Y-%m-%d %H:%M"),
            row.status.as_str(),
            row.model_id,
            size,
            row.path
        );
        if let Some(error) = &row.error {
            println!("{:>30}{error}", "");
        }
    }

    let counts = store.status_counts().await.context("failed to count downloads")?;
    let summary: Vec<String> = counts.iter().map(|(s, n)| format!("{s}: {n}")).collect();
    if !summary.is_empty() {
        println!("{}", summary.join(", "));
    }
    store.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing;

    #[tokio::test]
    async fn events_update_history() {
        let store = testing::memory_store().await;
        for file_id in [1, 2, 3] {
            store
                .upsert_pending(NewDownload {
                    model_id: 7,
                    version_id: 70,
                    file_id,
                    file_name: format!("f{file_id}.safetensors"),
                    path: format!("/tmp/f{file_id}.safetensors"),
                    sha256: None,
                    size_bytes: None,
                })
                .await
                .unwrap();
        }

        let (tx, rx) = unbounded_channel();
        let event = |file_id, kind| DownloadEvent { model_id: 7, file_id, kind };
        tx.send(event(1, DownloadEventKind::Started { resume_from: 0, total: Some(10) })).unwrap();
        tx.send(event(
            1,
            DownloadEventKind::Finished(DownloadOutcome::Downloaded { bytes: 10, sha256: "ab".into() }),
        ))
        .unwrap();
        tx.send(event(2, DownloadEventKind::Started { resume_from: 0, total: None })).unwrap();
        tx.send(event(2, DownloadEventKind::Failed { error: "HTTP 500".into() })).unwrap();
        tx.send(event(3, DownloadEventKind::Finished(DownloadOutcome::Skipped { sha256: None }))).unwrap();
        drop(tx);
        record_events(store.clone(), rx).await;

        let done = store.get_download(7, 1).await.unwrap().unwrap();
        assert_eq!(done.status, DownloadStatus::Completed);
        assert_eq!(done.size_bytes, Some(10));
        assert_eq!(done.attempts, 1);

        let failed = store.get_download(7, 2).await.unwrap().unwrap();
        assert_eq!(failed.status, DownloadStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("HTTP 500"));

        assert_eq!(store.get_download(7, 3).await.unwrap().unwrap().status, DownloadStatus::Skipped);
    }

    #[tokio::test]
    async fn completed_files_on_disk_are_not_replanned() {
        let dir = tempfile::tempdir().unwrap();
        let store = testing::memory_store().await;
        let model = testing::model(4, "Mika", "AA");
        let opts = PlanOptions {
            root: dir.path().to_path_buf(),
            version_id: None,
            all_files: false,
            format: None,
        };

        let jobs = plan_jobs(&store, std::slice::from_ref(&model), &opts).await.unwrap();
        assert_eq!(jobs.len(), 1);
        let job = &jobs[0];
        assert_eq!(
            store.get_download(4, 400).await.unwrap().unwrap().status,
            DownloadStatus::Pending
        );

        store.mark_completed(4, 400, Some("aa"), 3).await.unwrap();
        // Recorded as done but the file is gone: plan it again.
        assert_eq!(plan_jobs(&store, std::slice::from_ref(&model), &opts).await.unwrap().len(), 1);

        std::fs::create_dir_all(job.dest.parent().unwrap()).unwrap();
        std::fs::write(&job.dest, b"abc").unwrap();
        assert!(plan_jobs(&store, std::slice::from_ref(&model), &opts).await.unwrap().is_empty());
    }
}
