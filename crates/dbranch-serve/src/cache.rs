//! In-memory response caching with moka.
//!
//! The index document is read on almost every page load and changes only when
//! the curator applies an update, so it is served from a short-lived cache.
//! Entries store serialized JSON with the time they were cached.
//!
//! ## Cache Key Strategy
//!
//! Cache keys should include:
//! - Endpoint name (e.g., "article_index")
//! - All query parameters that affect the response

use std::future::Future;
use std::time::Duration;

use moka::future::Cache;
use serde::{Serialize, de::DeserializeOwned};

use crate::error::ApiError;

/// Default cache capacity (number of entries).
pub const DEFAULT_CACHE_CAPACITY: u64 = 1000;

/// Index updates become visible within this long.
pub const DEFAULT_TTL: Duration = Duration::from_secs(10);

/// Cached response with metadata.
#[derive(Clone, Debug)]
pub struct CachedEntry {
    /// Serialized JSON response.
    pub json: String,
    /// When this entry was cached.
    pub cached_at: chrono::DateTime<chrono::Utc>,
}

/// Type alias for the response cache.
pub type ResponseCache = Cache<String, CachedEntry>;

/// Create a new response cache with default settings.
pub fn new_cache() -> ResponseCache {
    Cache::builder()
        .max_capacity(DEFAULT_CACHE_CAPACITY)
        .time_to_live(DEFAULT_TTL)
        .build()
}

/// Get a cached value or compute and cache it.
///
/// Errors from `compute` are returned as-is and never cached.
///
/// # Example
///
/// ```ignore
/// let index = get_or_compute(&state.cache, "article_index", || async {
///     Ok(state.store.read_index().await?)
/// }).await?;
/// ```
pub async fn get_or_compute<T, F, Fut>(
    cache: &ResponseCache,
    key: &str,
    compute: F,
) -> Result<T, ApiError>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    if let Some(entry) = cache.get(key).await {
        match serde_json::from_str(&entry.json) {
            Ok(value) => {
                tracing::debug!(key = %key, cached_at = %entry.cached_at, "cache hit");
                return Ok(value);
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "failed to deserialize cached entry");
            }
        }
    }

    tracing::debug!(key = %key, "cache miss, computing");
    let value = compute().await?;

    match serde_json::to_string(&value) {
        Ok(json) => {
            let entry = CachedEntry {
                json,
                cached_at: chrono::Utc::now(),
            };
            cache.insert(key.to_string(), entry).await;
        }
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "failed to serialize for cache");
        }
    }

    Ok(value)
}

/// Like [`get_or_compute`] for values that are already JSON text, which is
/// cached and returned unchanged.
pub async fn get_or_compute_json<F, Fut>(
    cache: &ResponseCache,
    key: &str,
    compute: F,
) -> Result<String, ApiError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<String, ApiError>>,
{
    if let Some(entry) = cache.get(key).await {
        tracing::debug!(key = %key, cached_at = %entry.cached_at, "cache hit");
        return Ok(entry.json);
    }

    tracing::debug!(key = %key, "cache miss, computing");
    let json = compute().await?;
    let entry = CachedEntry {
        json: json.clone(),
        cached_at: chrono::Utc::now(),
    };
    cache.insert(key.to_string(), entry).await;
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cache_hit() {
        let cache = new_cache();
        let key = "article_index";

        let result: Vec<String> = get_or_compute(&cache, key, || async {
            Ok(vec!["foo.news".to_string()])
        })
        .await
        .unwrap();
        assert_eq!(result, ["foo.news"]);

        // Second call must not recompute
        let result: Vec<String> = get_or_compute(&cache, key, || async {
            panic!("compute should not be called on cache hit")
        })
        .await
        .unwrap();
        assert_eq!(result, ["foo.news"]);
    }

    #[tokio::test]
    async fn test_json_text_is_cached_unchanged() {
        let cache = new_cache();
        let doc = r#"{"published":[],"curated":[],"extra":1}"#;

        let first = get_or_compute_json(&cache, "article_index", || async { Ok(doc.to_string()) })
            .await
            .unwrap();
        let second = get_or_compute_json(&cache, "article_index", || async {
            panic!("compute should not be called on cache hit")
        })
        .await
        .unwrap();
        assert_eq!(first, doc);
        assert_eq!(second, doc);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let cache = new_cache();

        let result: Result<i32, ApiError> = get_or_compute(&cache, "key", || async {
            Err(ApiError::NotFound("missing".to_string()))
        })
        .await;
        assert!(result.is_err());

        let result: i32 = get_or_compute(&cache, "key", || async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(result, 7);
    }
}
