use rst_common::standard::async_trait::async_trait;
use rst_common::standard::serde_json::Value;
use rst_common::with_errors::thiserror::{self, Error};

/// Lifetime of cached connection-target and inbound-connection entries
pub const CACHE_TTL_SECS: u64 = 3600;

/// `CacheError` covers the cache contract failures
#[derive(Debug, PartialEq, Error, Clone)]
pub enum CacheError {
    #[error("cache error: {0}")]
    CacheFailure(String),
}

/// `CacheBuilder` is the single-flight cache contract
///
/// `acquire` takes exclusive, short-lived access to the slot behind `key` and
/// returns the cached value if one exists. A caller that gets `None` computes
/// the value and commits it with `set_result`, which also releases the slot;
/// concurrent acquirers of the same key block until then, so an entry is never
/// computed twice. A caller that cannot produce a result must call `release`
#[async_trait]
pub trait CacheBuilder: Send + Sync {
    async fn acquire(&self, key: String) -> Result<Option<Value>, CacheError>;

    async fn set_result(&self, key: String, value: Value, ttl_secs: u64)
        -> Result<(), CacheError>;

    async fn release(&self, key: String) -> Result<(), CacheError>;
}
