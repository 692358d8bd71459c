use std::env;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::cache::ResponseCache;
use crate::client::{CivitClient, ClientInner};
use crate::error::ApiError;
use crate::rate_limit::RateLimiter;
use crate::retry::RetryPolicy;

pub const DEFAULT_BASE_URL: &str = "https://civitai.com/api/v1";

/// Builder for [`CivitClient`].
///
/// # Example
/// ```rust,no_run
/// # async fn run() -> Result<(), civit_api::ApiError> {
/// use civit_api::Api;
/// use civit_types::{ModelType, SearchParams};
///
/// let client = Api::new()
///     .set_api_key("token")
///     .set_requests_per_second(1.0)
///     .build()?;
/// let page = client
///     .search_models(&SearchParams::new().model_type(ModelType::Lora).limit(20))
///     .await?;
/// println!("{} models", page.items.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Api {
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
    pub(crate) retry_count: u32,
    pub(crate) retry_delay: Duration,
    pub(crate) max_retry_delay: Duration,
    pub(crate) timeout: Duration,
    pub(crate) proxy: Option<String>,
    pub(crate) requests_per_second: f64,
    pub(crate) burst: u32,
    pub(crate) cache_ttl: Duration,
    pub(crate) cache_capacity: usize,
}

impl Default for Api {
    fn default() -> Self {
        Self::new()
    }
}

impl Api {
    /// Create a new `Api` with defaults.
    ///
    /// Proxy is automatically read from `HTTP_PROXY` / `HTTPS_PROXY` environment variables.
    pub fn new() -> Self {
        let proxy = env::var("HTTPS_PROXY")
            .ok()
            .or_else(|| env::var("HTTP_PROXY").ok());

        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            retry_count: 3,
            retry_delay: Duration::from_secs(2),
            max_retry_delay: Duration::from_secs(60),
            timeout: Duration::from_secs(30),
            proxy,
            requests_per_second: 2.0,
            burst: 4,
            cache_ttl: Duration::from_secs(300),
            cache_capacity: 512,
        }
    }

    /// Point at a different API root (default: `https://civitai.com/api/v1`).
    pub fn set_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Bearer token sent with every request.
    pub fn set_api_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.api_key = if key.trim().is_empty() { None } else { Some(key) };
        self
    }

    pub fn set_retry_count(mut self, count: u32) -> Self {
        self.retry_count = count;
        self
    }

    /// Base delay of the exponential backoff.
    pub fn set_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn set_max_retry_delay(mut self, delay: Duration) -> Self {
        self.max_retry_delay = delay;
        self
    }

    pub fn set_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the HTTP/HTTPS proxy URL.
    pub fn set_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn no_proxy(mut self) -> Self {
        self.proxy = None;
        self
    }

    /// Requests per second; `0` disables rate limiting.
    pub fn set_requests_per_second(mut self, rate: f64) -> Self {
        self.requests_per_second = rate;
        self
    }

    pub fn set_burst(mut self, burst: u32) -> Self {
        self.burst = burst;
        self
    }

    /// Response cache TTL; zero disables the cache.
    pub fn set_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn set_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn build(self) -> Result<CivitClient, ApiError> {
        if reqwest::Url::parse(&self.base_url).is_err() {
            return Err(ApiError::InvalidUrl(self.base_url));
        }

        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("civit/", env!("CARGO_PKG_VERSION")))
            .timeout(self.timeout)
            .connect_timeout(Duration::from_secs(15));

        if let Some(ref proxy_url) = self.proxy {
            match reqwest::Proxy::all(proxy_url) {
                Ok(p) => {
                    builder = builder.proxy(p);
                }
                Err(e) => {
                    warn!(proxy = %proxy_url, error = %e, "ignoring invalid proxy URL");
                }
            }
        }

        let http = builder.build()?;

        Ok(CivitClient::from_inner(Arc::new(ClientInner {
            http,
            base_url: self.base_url,
            api_key: self.api_key,
            limiter: RateLimiter::new(self.requests_per_second, self.burst),
            cache: ResponseCache::new(self.cache_capacity, self.cache_ttl),
            retry: RetryPolicy::new(self.retry_count, self.retry_delay, self.max_retry_delay),
        })))
    }
}
