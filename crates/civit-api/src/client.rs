use std::sync::Arc;

use civit_types::{CreatorsPage, Model, ModelVersion, ModelsPage, Page, SearchParams, TagsPage};
use reqwest::header::{ACCEPT, RETRY_AFTER};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use crate::cache::{CacheStats, ResponseCache};
use crate::error::{ApiError, parse_retry_after};
use crate::rate_limit::RateLimiter;
use crate::retry::RetryPolicy;
use crate::stream::ModelSearch;

const ERROR_BODY_LIMIT: usize = 512;

pub(crate) struct ClientInner {
    pub(crate) http: reqwest::Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
    pub(crate) limiter: RateLimiter,
    pub(crate) cache: ResponseCache,
    pub(crate) retry: RetryPolicy,
}

/// Cheaply cloneable handle to the CivitAI REST API.
///
/// Every GET goes through the response cache, then the rate limiter, then
/// the retry policy.
#[derive(Clone)]
pub struct CivitClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for CivitClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CivitClient")
            .field("base_url", &self.inner.base_url)
            .field("authenticated", &self.inner.api_key.is_some())
            .field("rate", &self.inner.limiter.rate())
            .finish()
    }
}

impl CivitClient {
    pub(crate) fn from_inner(inner: Arc<ClientInner>) -> Self {
        Self { inner }
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    pub fn api_key(&self) -> Option<&str> {
        self.inner.api_key.as_deref()
    }

    /// The underlying HTTP client, shared with the downloader so both honour
    /// the same proxy and user agent.
    pub fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.inner.limiter
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.inner.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.inner.retry
    }

    /// `GET /models` for one page.
    pub async fn search_models(&self, params: &SearchParams) -> Result<ModelsPage, ApiError> {
        self.get_json("models", &params.to_query()).await
    }

    /// One page of `GET /models` with the items left as JSON objects.
    pub async fn search_models_raw(&self, params: &SearchParams) -> Result<Page<serde_json::Value>, ApiError> {
        self.get_json("models", &params.to_query()).await
    }

    /// Stream every model matching `params`, following cursors.
    pub fn stream_models(&self, params: SearchParams) -> ModelSearch {
        ModelSearch::new(self.clone(), params)
    }

    pub async fn get_model(&self, id: u64) -> Result<Model, ApiError> {
        self.get_json(&format!("models/{id}"), &[]).await
    }

    /// Typed model plus the untouched JSON blob.
    pub async fn get_model_raw(&self, id: u64) -> Result<(Model, serde_json::Value), ApiError> {
        let body = self.get_text(&format!("models/{id}"), &[]).await?;
        let raw: serde_json::Value = serde_json::from_str(&body)?;
        let model = serde_json::from_value(raw.clone())?;
        Ok((model, raw))
    }

    pub async fn get_model_version(&self, id: u64) -> Result<ModelVersion, ApiError> {
        self.get_json(&format!("model-versions/{id}"), &[]).await
    }

    /// Look up a version by any file hash CivitAI indexes (SHA256, AutoV2, ...).
    pub async fn get_model_version_by_hash(&self, hash: &str) -> Result<ModelVersion, ApiError> {
        let hash = hash.trim();
        if hash.is_empty() || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ApiError::InvalidArgument(format!("not a hex hash: {hash:?}")));
        }
        self.get_json(&format!("model-versions/by-hash/{hash}"), &[]).await
    }

    pub async fn list_tags(
        &self,
        query: Option<&str>,
        limit: u32,
        page: u32,
    ) -> Result<TagsPage, ApiError> {
        self.get_json("tags", &list_query(query, limit, page)).await
    }

    pub async fn list_creators(
        &self,
        query: Option<&str>,
        limit: u32,
        page: u32,
    ) -> Result<CreatorsPage, ApiError> {
        self.get_json("creators", &list_query(query, limit, page)).await
    }

    /// Download endpoint for a model version. Lives next to the versioned
    /// API root: `.../api/v1` → `.../api/download/models/{id}`.
    pub fn download_url(&self, version_id: u64) -> String {
        let root = self
            .inner
            .base_url
            .strip_suffix("/v1")
            .unwrap_or(&self.inner.base_url);
        format!("{root}/download/models/{version_id}")
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<T, ApiError> {
        let body = self.get_text(path, query).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn get_text(&self, path: &str, query: &[(String, String)]) -> Result<Arc<str>, ApiError> {
        let url = self.endpoint(path, query)?;
        let key = url.as_str().to_owned();

        if let Some(hit) = self.inner.cache.get(&key) {
            trace!(url = %key, "cache hit");
            return Ok(hit);
        }

        let body = self
            .inner
            .retry
            .run(path, |_| self.fetch_once(url.clone()))
            .await?;
        self.inner.cache.put(key, Arc::clone(&body));
        Ok(body)
    }

    async fn fetch_once(&self, url: Url) -> Result<Arc<str>, ApiError> {
        self.inner.limiter.acquire().await;

        let mut req = self.inner.http.get(url.clone()).header(ACCEPT, "application/json");
        if let Some(key) = &self.inner.api_key {
            req = req.bearer_auth(key);
        }
        debug!(url = %url, "GET");
        let resp = req.send().await?;
        let status = resp.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            if let Some(delay) = retry_after {
                self.inner.limiter.penalize(self.inner.retry.cap_server_delay(delay)).await;
            }
            return Err(ApiError::RateLimited { retry_after });
        }
        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(url.path().to_owned()));
        }
        if !status.is_success() {
            let mut body = resp.text().await.unwrap_or_default();
            if body.len() > ERROR_BODY_LIMIT {
                let mut cut = ERROR_BODY_LIMIT;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(ApiError::Status {
                status: status.as_u16(),
                url: url.to_string(),
                body,
            });
        }

        Ok(Arc::from(resp.text().await?))
    }

    fn endpoint(&self, path: &str, query: &[(String, String)]) -> Result<Url, ApiError> {
        let raw = format!("{}/{}", self.inner.base_url, path.trim_start_matches('/'));
        let mut url = Url::parse(&raw).map_err(|e| ApiError::InvalidUrl(format!("{raw}: {e}")))?;
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }
        Ok(url)
    }
}

fn list_query(query: Option<&str>, limit: u32, page: u32) -> Vec<(String, String)> {
    let mut q = vec![
        ("limit".to_owned(), limit.clamp(1, 200).to_string()),
        ("page".to_owned(), page.max(1).to_string()),
    ];
    if let Some(query) = query.filter(|s| !s.trim().is_empty()) {
        q.push(("query".to_owned(), query.to_owned()));
    }
    q
}

#[cfg(test)]
mod tests {
    use crate::Api;

    #[test]
    fn download_url_sits_beside_api_root() {
        let client = Api::new().no_proxy().build().unwrap();
        assert_eq!(
            client.download_url(128713),
            "https://civitai.com/api/download/models/128713"
        );
    }

    #[test]
    fn endpoint_encodes_query() {
        let client = Api::new().no_proxy().build().unwrap();
        let url = client
            .endpoint("/models", &[("query".into(), "pony xl".into()), ("types".into(), "LORA".into())])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://civitai.com/api/v1/models?query=pony+xl&types=LORA"
        );
        let url = client.endpoint("models/1", &[]).unwrap();
        assert_eq!(url.as_str(), "https://civitai.com/api/v1/models/1");
    }
}
