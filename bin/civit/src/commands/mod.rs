//! One module per group of subcommands. Every command receives a
//! [`Context`] and builds the client or the store only when it needs them.

mod api;
mod catalog;
mod download;
mod sync;
mod transfer;

use std::time::Duration;

use anyhow::Context as _;
use civit_api::{Api, CivitClient};
use civit_catalog::Classification;
use civit_store::{CategoryStore, ModelRecord, ModelStore, Store};
use civit_types::Model;
use tracing::warn;

use crate::cli::Command;
use crate::config::Config;

pub struct Context {
    pub config: Config,
}

impl Context {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn client(&self) -> anyhow::Result<CivitClient> {
        let cfg = &self.config;
        let mut api = Api::new()
            .set_base_url(cfg.base_url.as_str())
            .set_requests_per_second(cfg.requests_per_second)
            .set_burst(cfg.burst)
            .set_retry_count(cfg.retry_count)
            .set_cache_ttl(Duration::from_secs(cfg.cache_ttl_secs))
            .set_cache_capacity(cfg.cache_capacity);
        if let Some(key) = &cfg.api_key {
            api = api.set_api_key(key.as_str());
        }
        if let Some(proxy) = &cfg.proxy {
            api = api.set_proxy(proxy.as_str());
        }
        api.build().context("failed to build CivitAI client")
    }

    pub async fn store(&self) -> anyhow::Result<Store> {
        Store::connect(&self.config.database_url)
            .await
            .with_context(|| format!("failed to open database {}", self.config.database_url))
    }
}

pub async fn run(ctx: &Context, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Search { filter, max, save, json } => api::search(ctx, &filter, max, save, json).await,
        Command::Model { id, save, json } => api::model(ctx, id, save, json).await,
        Command::Version { id, json } => api::version(ctx, id, json).await,
        Command::Hash { hash, json } => api::hash(ctx, &hash, json).await,
        Command::Tags { query, limit, page } => api::tags(ctx, query.as_deref(), limit, page).await,
        Command::Creators { query, limit, page } => api::creators(ctx, query.as_deref(), limit, page).await,
        Command::Sync { filter, max, adaptive } => sync::run(ctx, &filter, max, adaptive).await,
        Command::Download { ids, from_store, filter, version_id, all_files, format, dir, concurrency } => {
            let request = download::Request {
                ids,
                from_store,
                filter: filter.to_filter(),
                version_id,
                all_files,
                format,
                dir,
                concurrency,
            };
            download::run(ctx, request).await
        }
        Command::History { status, limit } => download::history(ctx, status, limit).await,
        Command::Stats { top, json } => catalog::stats(ctx, top, json).await,
        Command::Duplicates { by, json } => catalog::duplicates(ctx, by, json).await,
        Command::Classify => catalog::classify(ctx).await,
        Command::Hints { id, json } => catalog::hints(ctx, id, json).await,
        Command::Export { output, format, filter } => transfer::export(ctx, &output, format, &filter.to_filter()).await,
        Command::Import { input } => transfer::import(ctx, &input).await,
    }
}

/// Upsert one record and refresh its categories.
pub(crate) async fn save_record(store: &Store, record: ModelRecord) -> anyhow::Result<()> {
    let categories = Classification::from_record(&record).categories();
    let id = record.id;
    store
        .upsert_model(record)
        .await
        .with_context(|| format!("failed to store model {id}"))?;
    store
        .replace_categories(id, &categories)
        .await
        .with_context(|| format!("failed to classify model {id}"))?;
    Ok(())
}

pub(crate) async fn save_model(store: &Store, model: &Model, raw: Option<&serde_json::Value>) -> anyhow::Result<()> {
    save_record(store, ModelRecord::from_model(model, raw)).await
}

/// Decode every stored payload, skipping rows that no longer parse.
pub(crate) fn decode_records(records: &[ModelRecord]) -> Vec<Model> {
    records
        .iter()
        .filter_map(|r| match r.model() {
            Ok(m) => Some(m),
            Err(e) => {
                warn!(model_id = r.id, error = %e, "stored payload does not decode; skipping");
                None
            }
        })
        .collect()
}

pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// `12345` → `12.3k`, `2500000` → `2.5M`.
pub(crate) fn human_count(n: u64) -> String {
    match n {
        0..1_000 => n.to_string(),
        1_000..1_000_000 => format!("{:.1}k", n as f64 / 1_000.0),
        _ => format!("{:.1}M", n as f64 / 1_000_000.0),
    }
}

pub(crate) fn human_bytes(n: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = n as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{n} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use civit_store::Store;
    use civit_types::Model;
    use serde_json::json;

    pub async fn memory_store() -> Store {
        Store::connect("sqlite::memory:").await.unwrap()
    }

    pub fn model(id: u64, name: &str, sha: &str) -> Model {
        serde_json::from_value(json!({
            "id": id,
            "name": name,
            "type": "LORA",
            "nsfw": false,
            "tags": ["anime", "character"],
            "creator": {"username": "alice"},
            "stats": {"downloadCount": id * 100},
            "description": "<p>Trigger word: <b>mika</b></p><p>Weight 0.8, CFG 7, 30 steps.</p>",
            "modelVersions": [{
                "id": id * 10,
                "name": "v1",
                "baseModel": "SDXL 1.0",
                "trainedWords": ["mika"],
                "files": [{
                    "id": id * 100,
                    "name": format!("{name}.safetensors"),
                    "sizeKB": 1024.0,
                    "primary": true,
                    "hashes": {"SHA256": sha},
                    "downloadUrl": format!("https://civitai.com/api/download/models/{}", id * 10)
                }]
            }]
        }))
        .unwrap()
    }
}
