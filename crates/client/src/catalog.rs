//! Public catalog reads, cached for the configured TTL.

use luxus_core::{CategoryId, ProductId, ProductSnapshot};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::form_urlencoded;

use crate::cache::{CacheKey, CacheValue, ResponseCache};
use crate::error::ApiError;
use crate::gateway::{ApiRequest, RequestGateway};

/// Largest page the API serves.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Page metadata from `GET /products`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
}

impl Pagination {
    /// Whether pages exist after this one.
    #[must_use]
    pub fn has_next(&self) -> bool {
        u64::from(self.page) * u64::from(self.page_size) < self.total
    }
}

/// One page of products.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPage {
    pub items: Vec<ProductSnapshot>,
    pub pagination: Pagination,
}

/// A product category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

const fn default_active() -> bool {
    true
}

/// Read-only access to products and categories.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    gateway: RequestGateway,
    cache: ResponseCache,
}

impl CatalogClient {
    #[must_use]
    pub const fn new(gateway: RequestGateway, cache: ResponseCache) -> Self {
        Self { gateway, cache }
    }

    /// Get a page of products, optionally filtered by category name.
    ///
    /// `page` starts at 1; `page_size` is clamped to `1..=100`.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn products(
        &self,
        page: u32,
        page_size: u32,
        category: Option<&str>,
    ) -> Result<ProductPage, ApiError> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        let key = CacheKey::Products {
            page,
            page_size,
            category: category.map(str::to_string),
        };

        if let Some(CacheValue::Products(products)) = self.cache.get(&key).await {
            return Ok(products);
        }

        let mut query = form_urlencoded::Serializer::new(String::new());
        query
            .append_pair("page", &page.to_string())
            .append_pair("page_size", &page_size.to_string());
        if let Some(category) = category {
            query.append_pair("categoria", category);
        }
        let path = format!("/products?{}", query.finish());

        let products: ProductPage = self.gateway.get_json(&path).await?;
        debug!(count = products.items.len(), total = products.pagination.total, "Fetched products");

        self.cache
            .insert(key, CacheValue::Products(products.clone()))
            .await;
        Ok(products)
    }

    /// Get a single product.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotFound` for an unknown ID.
    #[instrument(skip(self), fields(id = %id))]
    pub async fn product(&self, id: ProductId) -> Result<ProductSnapshot, ApiError> {
        let key = CacheKey::Product(id);
        if let Some(CacheValue::Product(product)) = self.cache.get(&key).await {
            return Ok(*product);
        }

        let product: ProductSnapshot = self
            .gateway
            .send_json(ApiRequest::get(format!("/products/{id}")))
            .await?;
        self.cache
            .insert(key, CacheValue::Product(Box::new(product.clone())))
            .await;
        Ok(product)
    }

    /// List all categories.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn categories(&self) -> Result<Vec<Category>, ApiError> {
        if let Some(CacheValue::Categories(categories)) =
            self.cache.get(&CacheKey::Categories).await
        {
            return Ok(categories);
        }

        let categories: Vec<Category> = self.gateway.get_json("/categories").await?;
        self.cache
            .insert(CacheKey::Categories, CacheValue::Categories(categories.clone()))
            .await;
        Ok(categories)
    }
}
