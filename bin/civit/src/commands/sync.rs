use std::sync::Arc;

use anyhow::Context as _;
use civit_api::{AdaptiveThresholds, ApiError, SystemMemory};
use civit_store::{ModelStore, Store};
use civit_types::Model;
use futures::{Stream, StreamExt};
use serde_json::Value;
use tracing::{info, warn};

use super::{Context, save_model};
use crate::cli::SearchArgs;

/// Log progress every this many stored models.
const PROGRESS_EVERY: u64 = 500;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SyncReport {
    pub stored: u64,
    pub failed: u64,
}

pub async fn run(ctx: &Context, filter: &SearchArgs, max: Option<usize>, adaptive: bool) -> anyhow::Result<()> {
    let client = ctx.client()?;
    let store = ctx.store().await?;

    let mut search = client.stream_models(filter.to_params());
    if let Some(max) = max {
        search = search.max_items(max);
    }
    if adaptive {
        let thresholds = AdaptiveThresholds::new(
            filter.limit as usize,
            ctx.config.cache_capacity,
            PROGRESS_EVERY as usize,
        );
        search = search.adaptive(thresholds, Arc::new(SystemMemory::new()));
    }

    let report = store_stream(&store, search.into_raw_stream()).await?;
    let total = store.count_models().await.context("failed to count stored models")?;
    let cache = client.cache_stats();
    info!(
        stored = report.stored,
        failed = report.failed,
        total,
        cache_hits = cache.hits,
        cache_misses = cache.misses,
        "sync finished"
    );
    println!("stored {} models ({} failed); {total} in catalogue", report.stored, report.failed);
    store.close().await;
    Ok(())
}

/// Persist every model the stream yields along with its API payload. A
/// failing row is logged and counted; a failing page ends the sync with an
/// error.
pub(crate) async fn store_stream<S>(store: &Store, stream: S) -> anyhow::Result<SyncReport>
where
    S: Stream<Item = Result<(Model, Value), ApiError>>,
{
    let mut report = SyncReport::default();
    futures::pin_mut!(stream);
    while let Some(item) = stream.next().await {
        let (model, raw) = item.context("model search failed")?;
        match save_model(store, &model, Some(&raw)).await {
            Ok(()) => {
                report.stored += 1;
                if report.stored % PROGRESS_EVERY == 0 {
                    info!(stored = report.stored, "sync progress");
                }
            }
            Err(e) => {
                warn!(model_id = model.id, error = %e, "failed to store model");
                report.failed += 1;
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use futures::stream;
    use serde_json::json;

    use super::*;
    use crate::commands::testing;

    fn with_raw(model: Model) -> Result<(Model, Value), ApiError> {
        let raw = serde_json::to_value(&model).unwrap();
        Ok((model, raw))
    }

    #[tokio::test]
    async fn stream_is_stored() {
        let store = testing::memory_store().await;
        let models = vec![
            with_raw(testing::model(1, "one", "AA")),
            with_raw(testing::model(2, "two", "BB")),
        ];
        let report = store_stream(&store, stream::iter(models)).await.unwrap();
        assert_eq!(report, SyncReport { stored: 2, failed: 0 });
        assert_eq!(store.count_models().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn page_error_aborts_after_storing_earlier_models() {
        let store = testing::memory_store().await;
        let items = vec![
            with_raw(testing::model(1, "one", "AA")),
            Err(ApiError::NotFound("/models".into())),
            with_raw(testing::model(2, "two", "BB")),
        ];
        assert!(store_stream(&store, stream::iter(items)).await.is_err());
        assert_eq!(store.count_models().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn payload_is_stored_untouched() {
        let store = testing::memory_store().await;
        let raw = json!({
            "id": 7,
            "name": "m",
            "type": "Workflows",
            "poi": true,
            "mode": "Archived",
            "modelVersions": []
        });
        let model: Model = serde_json::from_value(raw.clone()).unwrap();
        let report = store_stream(&store, stream::iter(vec![Ok((model, raw))])).await.unwrap();
        assert_eq!(report.stored, 1);

        let stored: Value = serde_json::from_str(&store.get_model(7).await.unwrap().unwrap().raw_json).unwrap();
        assert_eq!(stored["poi"], true);
        assert_eq!(stored["mode"], "Archived");
        assert!(stored.get("allowNoCredit").is_none());
    }
}
