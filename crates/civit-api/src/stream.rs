//! Cursor-following model search.
//!
//! [`ModelSearch`] turns one [`SearchParams`] into a stream of [`Model`]s:
//! it requests pages until the API stops returning a next cursor (or page),
//! drops models already yielded, and stops early at `max_items`. A page
//! that brings no new model, or a cursor that does not advance, ends the
//! stream. Every model comes with the JSON object it was parsed from. With
//! adaptive thresholds attached it samples memory pressure before every page
//! and shrinks or grows the page size and the client cache accordingly.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use civit_types::{MAX_PAGE_SIZE, Model, SearchParams};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::client::CivitClient;
use crate::error::ApiError;
use crate::memory::{AdaptiveThresholds, MemoryProbe};

/// Counters reported once a search stream finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchStats {
    pub pages: u64,
    pub yielded: u64,
    pub duplicates: u64,
}

pub struct ModelSearch {
    client: CivitClient,
    params: SearchParams,
    max_items: Option<usize>,
    max_pages: Option<u64>,
    adaptive: Option<(AdaptiveThresholds, Arc<dyn MemoryProbe>)>,
}

impl ModelSearch {
    pub(crate) fn new(client: CivitClient, params: SearchParams) -> Self {
        Self { client, params, max_items: None, max_pages: None, adaptive: None }
    }

    /// Stop after this many unique models.
    pub fn max_items(mut self, n: usize) -> Self {
        self.max_items = Some(n);
        self
    }

    pub fn max_pages(mut self, n: u64) -> Self {
        self.max_pages = Some(n);
        self
    }

    /// Re-tune page size and cache capacity from memory pressure before
    /// each page.
    pub fn adaptive(mut self, thresholds: AdaptiveThresholds, probe: Arc<dyn MemoryProbe>) -> Self {
        self.adaptive = Some((thresholds, probe));
        self
    }

    pub fn into_stream(self) -> BoxStream<'static, Result<Model, ApiError>> {
        self.into_raw_stream().map_ok(|(model, _)| model).boxed()
    }

    /// Like [`ModelSearch::into_stream`], paired with the untouched item
    /// object from the response page.
    pub fn into_raw_stream(self) -> BoxStream<'static, Result<(Model, Value), ApiError>> {
        let state = State {
            client: self.client,
            params: self.params,
            max_items: self.max_items,
            max_pages: self.max_pages,
            adaptive: self.adaptive,
            buffer: VecDeque::new(),
            seen: HashSet::new(),
            stats: SearchStats::default(),
            exhausted: false,
        };

        stream::unfold(state, |mut st| async move {
            loop {
                if st.limit_reached() {
                    st.finish();
                    return None;
                }
                if let Some(item) = st.buffer.pop_front() {
                    st.stats.yielded += 1;
                    return Some((Ok(item), st));
                }
                if st.exhausted {
                    st.finish();
                    return None;
                }
                if let Err(e) = st.fetch_next_page().await {
                    st.exhausted = true;
                    return Some((Err(e), st));
                }
            }
        })
        .boxed()
    }

    /// Drain the stream into a vector, stopping at the first error.
    pub async fn collect_all(self) -> Result<Vec<Model>, ApiError> {
        self.into_stream().try_collect().await
    }
}

struct State {
    client: CivitClient,
    params: SearchParams,
    max_items: Option<usize>,
    max_pages: Option<u64>,
    adaptive: Option<(AdaptiveThresholds, Arc<dyn MemoryProbe>)>,
    buffer: VecDeque<(Model, Value)>,
    seen: HashSet<u64>,
    stats: SearchStats,
    exhausted: bool,
}

impl State {
    fn limit_reached(&self) -> bool {
        self.max_items.is_some_and(|max| self.stats.yielded as usize >= max)
    }

    fn finish(&mut self) {
        info!(
            pages = self.stats.pages,
            yielded = self.stats.yielded,
            duplicates = self.stats.duplicates,
            "model search finished"
        );
        self.exhausted = true;
        self.buffer.clear();
    }

    fn tune(&mut self) {
        let Some((thresholds, probe)) = self.adaptive.as_mut() else {
            return;
        };
        let usage = probe.usage();
        let pressure = usage.pressure();
        if thresholds.adjust(pressure) {
            debug!(
                ?pressure,
                used_ratio = usage.used_ratio(),
                page_size = thresholds.page_size,
                cache_capacity = thresholds.cache_capacity,
                "adaptive thresholds changed"
            );
            self.client.cache().resize(thresholds.cache_capacity);
        }
        self.params.limit = Some((thresholds.page_size as u32).clamp(1, MAX_PAGE_SIZE));
    }

    async fn fetch_next_page(&mut self) -> Result<(), ApiError> {
        self.tune();
        let page = self.client.search_models_raw(&self.params).await?;
        self.stats.pages += 1;

        let received = page.items.len();
        let mut fresh = 0usize;
        for raw in page.items {
            let model = Model::deserialize(&raw)?;
            if self.seen.insert(model.id) {
                self.buffer.push_back((model, raw));
                fresh += 1;
            } else {
                self.stats.duplicates += 1;
            }
        }
        debug!(page = self.stats.pages, received, fresh, buffered = self.buffer.len(), "search page");

        let meta = page.metadata;
        let pages_left = self.max_pages.is_none_or(|max| self.stats.pages < max);
        if fresh == 0 || !pages_left {
            if received > 0 && fresh == 0 {
                warn!(page = self.stats.pages, received, "search page brought no new models; stopping");
            }
            self.exhausted = true;
        } else if let Some(cursor) = meta.next_cursor {
            if self.params.cursor.as_deref() == Some(cursor.as_str()) {
                warn!(%cursor, "search cursor did not advance; stopping");
                self.exhausted = true;
            } else {
                self.params.cursor = Some(cursor);
            }
        } else if let Some(next) = meta.next_page_number().filter(|_| !self.params.requires_cursor()) {
            let current = self.params.page.unwrap_or(1) as u64;
            if next <= current {
                warn!(next, current, "search page number did not advance; stopping");
                self.exhausted = true;
            } else {
                self.params.cursor = None;
                self.params.page = Some(next as u32);
            }
        } else {
            self.exhausted = true;
        }
        Ok(())
    }
}
