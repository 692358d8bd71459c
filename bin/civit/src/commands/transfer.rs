use std::path::Path;

use anyhow::Context as _;
use civit_catalog::{ExportFormat, export_to_path, import_path, merge_newest};
use civit_store::{ModelFilter, ModelRecord, ModelStore, Store};
use tracing::{debug, info};

use super::{Context, save_record};

pub async fn export(
    ctx: &Context,
    output: &Path,
    format: Option<ExportFormat>,
    filter: &ModelFilter,
) -> anyhow::Result<()> {
    let store = ctx.store().await?;
    let records = store.list_models(filter).await.context("failed to list stored models")?;
    store.close().await;

    let format = export_to_path(&records, format, output)
        .with_context(|| format!("failed to export to {}", output.display()))?;
    println!("wrote {} models to {} ({format})", records.len(), output.display());
    Ok(())
}

pub async fn import(ctx: &Context, input: &Path) -> anyhow::Result<()> {
    let records = import_path(input).with_context(|| format!("failed to import {}", input.display()))?;
    let store = ctx.store().await?;
    let report = import_records(&store, records).await?;
    store.close().await;

    info!(imported = report.imported, kept = report.kept, "import finished");
    println!("imported {} models, kept {} newer stored copies", report.imported, report.kept);
    Ok(())
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ImportReport {
    pub imported: usize,
    pub kept: usize,
}

/// Store imported records. A stored copy with a newer version list wins
/// over the imported one.
pub(crate) async fn import_records(store: &Store, records: Vec<ModelRecord>) -> anyhow::Result<ImportReport> {
    let mut report = ImportReport::default();
    for record in records {
        if stored_is_newer(store, &record).await? {
            debug!(model_id = record.id, "stored copy is newer; keeping it");
            report.kept += 1;
            continue;
        }
        save_record(store, record).await?;
        report.imported += 1;
    }
    Ok(report)
}

async fn stored_is_newer(store: &Store, incoming: &ModelRecord) -> anyhow::Result<bool> {
    let Some(existing) = store.get_model(incoming.id).await.context("failed to read stored model")? else {
        return Ok(false);
    };
    let (Ok(existing), Ok(incoming)) = (existing.model(), incoming.model()) else {
        return Ok(false);
    };
    // Ties keep the first argument, so an equally fresh import replaces.
    Ok(merge_newest(incoming.clone(), existing) != incoming)
}
