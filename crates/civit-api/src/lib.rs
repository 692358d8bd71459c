pub mod api;
pub mod cache;
pub mod client;
pub mod error;
pub mod memory;
pub mod rate_limit;
pub mod retry;
pub mod stream;

pub use api::{Api, DEFAULT_BASE_URL};
pub use cache::{CacheStats, ResponseCache};
pub use client::CivitClient;
pub use error::{ApiError, Retryable};
pub use memory::{AdaptiveThresholds, Bounds, MemoryPressure, MemoryProbe, MemoryUsage, SystemMemory};
pub use rate_limit::RateLimiter;
pub use retry::RetryPolicy;
pub use stream::{ModelSearch, SearchStats};
