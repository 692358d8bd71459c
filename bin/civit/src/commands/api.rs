//! Read-only lookups against the CivitAI API.

use civit_types::{Model, ModelVersion};
use futures::StreamExt;
use tracing::info;

use super::{Context, human_bytes, human_count, print_json, save_model};
use crate::cli::SearchArgs;

pub async fn search(ctx: &Context, filter: &SearchArgs, max: usize, save: bool, json: bool) -> anyhow::Result<()> {
    let client = ctx.client()?;
    let store = if save { Some(ctx.store().await?) } else { None };

    let mut stream = client.stream_models(filter.to_params()).max_items(max).into_raw_stream();
    let mut models = Vec::new();
    while let Some(item) = stream.next().await {
        let (model, raw) = item?;
        if let Some(store) = &store {
            save_model(store, &model, Some(&raw)).await?;
        }
        models.push(model);
    }

    if let Some(store) = store {
        info!(saved = models.len(), "search results stored");
        store.close().await;
    }

    if json {
        return print_json(&models);
    }
    for model in &models {
        println!("{}", model_line(model));
    }
    Ok(())
}

pub async fn model(ctx: &Context, id: u64, save: bool, json: bool) -> anyhow::Result<()> {
    let client = ctx.client()?;
    let (model, raw) = client.get_model_raw(id).await?;
    if save {
        let store = ctx.store().await?;
        save_model(&store, &model, Some(&raw)).await?;
        store.close().await;
    }
    if json {
        return print_json(&raw);
    }

    println!("{}", model_line(&model));
    println!("  https://civitai.com/models/{}", model.id);
    if !model.tags.is_empty() {
        println!("  tags: {}", model.tags.join(", "));
    }
    println!(
        "  rating {:.2} ({} ratings), {} favorites",
        model.stats.rating,
        model.stats.rating_count,
        human_count(model.stats.favorite_count)
    );
    for version in &model.model_versions {
        print_version(version);
    }
    Ok(())
}

pub async fn version(ctx: &Context, id: u64, json: bool) -> anyhow::Result<()> {
    let version = ctx.client()?.get_model_version(id).await?;
    if json {
        return print_json(&version);
    }
    print_version(&version);
    Ok(())
}

pub async fn hash(ctx: &Context, hash: &str, json: bool) -> anyhow::Result<()> {
    let version = ctx.client()?.get_model_version_by_hash(hash).await?;
    if json {
        return print_json(&version);
    }
    if let Some(model_id) = version.model_id {
        println!("model {model_id}: https://civitai.com/models/{model_id}?modelVersionId={}", version.id);
    }
    print_version(&version);
    Ok(())
}

pub async fn tags(ctx: &Context, query: Option<&str>, limit: u32, page: u32) -> anyhow::Result<()> {
    let page = ctx.client()?.list_tags(query, limit, page).await?;
    for tag in &page.items {
        println!("{:<40} {:>8}", tag.name, tag.model_count.map(human_count).unwrap_or_default());
    }
    print_page_footer(page.metadata.current_page, page.metadata.total_pages);
    Ok(())
}

pub async fn creators(ctx: &Context, query: Option<&str>, limit: u32, page: u32) -> anyhow::Result<()> {
    let page = ctx.client()?.list_creators(query, limit, page).await?;
    for creator in &page.items {
        println!(
            "{:<40} {:>8}",
            creator.username,
            creator.model_count.map(human_count).unwrap_or_default()
        );
    }
    print_page_footer(page.metadata.current_page, page.metadata.total_pages);
    Ok(())
}

fn model_line(model: &Model) -> String {
    format!(
        "{:>8}  {:<12} {:<14} {:>8}  {}",
        model.id,
        model.model_type.as_str(),
        model.base_model().unwrap_or("-"),
        human_count(model.stats.download_count),
        model.name
    )
}

fn print_version(version: &ModelVersion) {
    println!(
        "  version {} {:?} base={} published={}",
        version.id,
        version.name,
        version.base_model.as_deref().unwrap_or("-"),
        version
            .published_at
            .map(|t| t.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "-".to_owned())
    );
    if !version.trained_words.is_empty() {
        println!("    trigger: {}", version.trained_words.join(", "));
    }
    for file in &version.files {
        println!(
            "    {} {:<48} {:>10}  sha256={}",
            if file.primary { "*" } else { " " },
            file.name,
            human_bytes(file.size_bytes()),
            file.hashes.sha256().unwrap_or_else(|| "-".to_owned())
        );
    }
}

fn print_page_footer(current: Option<u64>, total: Option<u64>) {
    if let (Some(current), Some(total)) = (current, total) {
        println!("page {current}/{total}");
    }
}
