//! Sanity query API client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use crate::config::SanityConfig;

use super::cache::{CATEGORIES_KEY, CacheValue, product_key, products_key};
use super::{CatalogError, CatalogReader, Category, Product, queries};

/// Client for the CMS query API.
///
/// Clones share one HTTP client and one cache.
#[derive(Clone)]
pub struct SanityClient {
    inner: Arc<SanityClientInner>,
}

struct SanityClientInner {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
    cache: Cache<String, CacheValue>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse<T> {
    result: T,
}

impl SanityClient {
    /// Create a new CMS client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &SanityConfig) -> Result<Self, CatalogError> {
        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();

        let endpoint = format!(
            "{}/v{}/data/query/{}",
            config.base_url().trim_end_matches('/'),
            config.api_version,
            config.dataset
        );

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            inner: Arc::new(SanityClientInner {
                client,
                endpoint,
                token: config
                    .token
                    .as_ref()
                    .map(|t| t.expose_secret().to_string()),
                cache,
            }),
        })
    }

    /// Run a GROQ query. Parameter values are JSON-encoded as the API expects.
    async fn query<T: DeserializeOwned>(
        &self,
        groq: &str,
        params: &[(&str, serde_json::Value)],
    ) -> Result<T, CatalogError> {
        let mut query: Vec<(String, String)> = vec![("query".to_owned(), groq.to_owned())];
        for (name, value) in params {
            query.push((format!("${name}"), value.to_string()));
        }

        let mut request = self.inner.client.get(&self.inner.endpoint).query(&query);
        if let Some(token) = &self.inner.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::error!(
                status = %status,
                body = %body.chars().take(500).collect::<String>(),
                "CMS query returned non-success status"
            );
            return Err(CatalogError::Api {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }

        serde_json::from_str::<QueryResponse<T>>(&body)
            .map(|r| r.result)
            .map_err(|e| CatalogError::Parse(e.to_string()))
    }
}

#[async_trait]
impl CatalogReader for SanityClient {
    #[instrument(skip(self))]
    async fn list_products(&self, category: Option<&str>) -> Result<Vec<Product>, CatalogError> {
        let cache_key = products_key(category);

        if let Some(CacheValue::Products(products)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for products");
            return Ok(products);
        }

        let category_param = category.map_or(serde_json::Value::Null, |c| c.into());
        let products: Vec<Product> = self
            .query(queries::LIST_PRODUCTS, &[("category", category_param)])
            .await?;

        self.inner
            .cache
            .insert(cache_key, CacheValue::Products(products.clone()))
            .await;

        Ok(products)
    }

    #[instrument(skip(self), fields(slug = %slug))]
    async fn product_by_slug(&self, slug: &str) -> Result<Product, CatalogError> {
        let cache_key = product_key(slug);

        if let Some(CacheValue::Product(product)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for product");
            return Ok(*product);
        }

        let product: Option<Product> = self
            .query(queries::PRODUCT_BY_SLUG, &[("slug", slug.into())])
            .await?;
        let product =
            product.ok_or_else(|| CatalogError::NotFound(format!("Product not found: {slug}")))?;

        self.inner
            .cache
            .insert(cache_key, CacheValue::Product(Box::new(product.clone())))
            .await;

        Ok(product)
    }

    #[instrument(skip(self))]
    async fn search(&self, term: &str) -> Result<Vec<Product>, CatalogError> {
        let term = term.trim();
        if term.is_empty() {
            return Ok(Vec::new());
        }

        self.query(queries::SEARCH_PRODUCTS, &[("term", format!("{term}*").into())])
            .await
    }

    #[instrument(skip(self))]
    async fn categories(&self) -> Result<Vec<Category>, CatalogError> {
        if let Some(CacheValue::Categories(categories)) = self.inner.cache.get(CATEGORIES_KEY).await
        {
            debug!("Cache hit for categories");
            return Ok(categories);
        }

        let categories: Vec<Category> = self.query(queries::CATEGORIES, &[]).await?;

        self.inner
            .cache
            .insert(
                CATEGORIES_KEY.to_owned(),
                CacheValue::Categories(categories.clone()),
            )
            .await;

        Ok(categories)
    }
}
