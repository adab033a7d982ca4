//! TTL cache for public catalog responses.

use std::time::Duration;

use async_trait::async_trait;
use luxus_core::{ProductId, ProductSnapshot};
use moka::future::Cache;
use tracing::debug;

use crate::auth::SessionListener;
use crate::catalog::{Category, ProductPage};

/// Cache key for catalog reads.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum CacheKey {
    Product(ProductId),
    Products {
        page: u32,
        page_size: u32,
        category: Option<String>,
    },
    Categories,
}

/// Cached value types.
#[derive(Debug, Clone)]
pub enum CacheValue {
    Product(Box<ProductSnapshot>),
    Products(ProductPage),
    Categories(Vec<Category>),
}

/// Catalog response cache, dropped whenever the session ends.
#[derive(Clone)]
pub struct ResponseCache {
    cache: Cache<CacheKey, CacheValue>,
}

impl ResponseCache {
    /// Create a cache whose entries live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(ttl)
            .build();
        Self { cache }
    }

    pub async fn get(&self, key: &CacheKey) -> Option<CacheValue> {
        let value = self.cache.get(key).await;
        debug!(?key, hit = value.is_some(), "Cache lookup");
        value
    }

    pub async fn insert(&self, key: CacheKey, value: CacheValue) {
        self.cache.insert(key, value).await;
    }

    /// Invalidate all cached data.
    pub async fn invalidate_all(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }

    /// Number of live entries (after pending maintenance).
    pub async fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}

#[async_trait]
impl SessionListener for ResponseCache {
    async fn session_ended(&self) {
        self.invalidate_all().await;
        debug!("Response cache cleared");
    }
}
