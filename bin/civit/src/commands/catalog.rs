//! Reports over the local catalogue.

use anyhow::Context as _;
use civit_catalog::{
    CatalogStats, Classification, DuplicateGroup, extract_hints, find_hash_duplicates, find_name_duplicates,
};
use civit_store::{CategoryStore, ModelFilter, ModelStore, Store};
use civit_types::Model;
use tracing::info;

use super::{Context, decode_records, human_bytes, human_count, print_json};
use crate::cli::DuplicateMode;

async fn stored_models(store: &Store) -> anyhow::Result<Vec<Model>> {
    let records = store
        .list_models(&ModelFilter::default())
        .await
        .context("failed to list stored models")?;
    Ok(decode_records(&records))
}

pub async fn stats(ctx: &Context, top: usize, json: bool) -> anyhow::Result<()> {
    let store = ctx.store().await?;
    let models = stored_models(&store).await?;
    let stats = CatalogStats::compute(&models, top);
    store.close().await;

    if json {
        return print_json(&stats);
    }
    println!(
        "{} models ({} nsfw), {} downloads, {} in primary files",
        stats.total,
        stats.nsfw,
        human_count(stats.total_downloads),
        human_bytes(stats.primary_size_bytes)
    );
    print_counts("by type", stats.by_type.iter().map(|(k, v)| (k.as_str(), *v)));
    print_counts("by base model", stats.by_base_model.iter().map(|(k, v)| (k.as_str(), *v)));
    print_counts("top creators", stats.top_creators.iter().map(|(k, v)| (k.as_str(), *v)));
    print_counts("top tags", stats.top_tags.iter().map(|(k, v)| (k.as_str(), *v)));
    Ok(())
}

fn print_counts<'a>(title: &str, rows: impl Iterator<Item = (&'a str, usize)>) {
    println!("\n{title}:");
    for (name, count) in rows {
        println!("  {name:<32} {count:>6}");
    }
}

pub async fn duplicates(ctx: &Context, by: DuplicateMode, json: bool) -> anyhow::Result<()> {
    let store = ctx.store().await?;
    let models = stored_models(&store).await?;
    store.close().await;

    let groups = duplicate_groups(&models, by);
    if json {
        return print_json(&groups);
    }
    if groups.is_empty() {
        println!("no duplicates among {} models", models.len());
        return Ok(());
    }
    for group in &groups {
        println!("{:?} {}", group.kind, group.key);
        for entry in &group.entries {
            println!(
                "  {:>8}  {}{}",
                entry.model_id,
                entry.model_name,
                entry.file_name.as_deref().map(|f| format!("  ({f})")).unwrap_or_default()
            );
        }
    }
    Ok(())
}

fn duplicate_groups(models: &[Model], by: DuplicateMode) -> Vec<DuplicateGroup> {
    let mut groups = Vec::new();
    if matches!(by, DuplicateMode::Hash | DuplicateMode::Both) {
        groups.extend(find_hash_duplicates(models));
    }
    if matches!(by, DuplicateMode::Name | DuplicateMode::Both) {
        groups.extend(find_name_duplicates(models));
    }
    groups
}

pub async fn classify(ctx: &Context) -> anyhow::Result<()> {
    let store = ctx.store().await?;
    let classified = classify_all(&store).await?;
    info!(classified, "categories rebuilt");

    for row in store.category_counts(None).await.context("failed to count categories")? {
        println!("{:<11} {:<24} {:>6}", row.kind.as_str(), row.name, row.count);
    }
    store.close().await;
    Ok(())
}

async fn classify_all(store: &Store) -> anyhow::Result<usize> {
    let records = store
        .list_models(&ModelFilter::default())
        .await
        .context("failed to list stored models")?;
    for record in &records {
        let categories = Classification::from_record(record).categories();
        store
            .replace_categories(record.id, &categories)
            .await
            .with_context(|| format!("failed to classify model {}", record.id))?;
    }
    Ok(records.len())
}

/// Stored payload when the model is in the catalogue, else the API.
pub async fn hints(ctx: &Context, id: u64, json: bool) -> anyhow::Result<()> {
    let store = ctx.store().await?;
    let stored = store.get_model(id as i64).await.context("failed to read stored model")?;
    store.close().await;

    let model = match stored.map(|r| r.model()) {
        Some(Ok(model)) => model,
        _ => ctx.client()?.get_model(id).await?,
    };
    let hints = extract_hints(&model);
    if json {
        return print_json(&hints);
    }

    println!("{} ({})", model.name, model.id);
    if hints.is_empty() {
        println!("  no usage hints found");
        return Ok(());
    }
    if !hints.trigger_words.is_empty() {
        println!("  trigger words: {}", hints.trigger_words.join(", "));
    }
    if let Some(w) = hints.weight {
        println!("  weight: {w}");
    }
    if let Some((lo, hi)) = hints.weight_range {
        println!("  weight range: {lo}-{hi}");
    }
    if let Some(cfg) = hints.cfg_scale {
        println!("  cfg scale: {cfg}");
    }
    if let Some(steps) = hints.steps {
        println!("  steps: {steps}");
    }
    if let Some(sampler) = &hints.sampler {
        println!("  sampler: {sampler}");
    }
    if let Some(skip) = hints.clip_skip {
        println!("  clip skip: {skip}");
    }
    Ok(())
}
