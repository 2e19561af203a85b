//! Read-only catalog backed by the headless CMS (Sanity-compatible GROQ API).
//!
//! # Architecture
//!
//! - The CMS is the source of truth; nothing is synced locally
//! - [`SanityClient`] caches listings, product detail and categories via
//!   `moka` for 5 minutes; search results are not cached
//! - [`CatalogReader`] lets tests substitute a fixed catalog

mod cache;
mod queries;
mod sanity;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use threadline_core::{CartItem, ProductId, WishlistItem};

pub use sanity::SanityClient;

/// Errors that can occur when querying the CMS.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// JSON parsing failed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),
}

/// A product as authored in the CMS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub slug: String,
    pub price: Decimal,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub sizes: Vec<String>,
    #[serde(default)]
    pub colors: Vec<String>,
    /// Shipping weight per unit, kg.
    #[serde(default)]
    pub weight: Option<Decimal>,
}

impl Product {
    /// A cart line priced from the catalog.
    #[must_use]
    pub fn cart_item(&self, quantity: u32, size: Option<String>, color: Option<String>) -> CartItem {
        CartItem {
            product_id: self.id.clone(),
            name: self.name.clone(),
            price: self.price,
            quantity,
            size,
            image: self.images.first().cloned(),
            description: self.description.clone(),
            color,
            weight: self.weight,
        }
    }

    #[must_use]
    pub fn wishlist_item(&self, size: Option<String>) -> WishlistItem {
        WishlistItem {
            product_id: self.id.clone(),
            product_name: self.name.clone(),
            price: self.price,
            image_url: self.images.first().cloned().unwrap_or_default(),
            size,
        }
    }

    /// Whether `size` is one the product is offered in. Products without
    /// sizes accept none.
    #[must_use]
    pub fn offers_size(&self, size: Option<&str>) -> bool {
        match size {
            Some(size) => self.sizes.iter().any(|s| s == size),
            None => self.sizes.is_empty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub title: String,
    pub slug: String,
}

/// Catalog queries used by the storefront.
#[async_trait]
pub trait CatalogReader: Send + Sync {
    /// All products, optionally restricted to a category slug.
    async fn list_products(&self, category: Option<&str>) -> Result<Vec<Product>, CatalogError>;

    async fn product_by_slug(&self, slug: &str) -> Result<Product, CatalogError>;

    /// Prefix match on name and description.
    async fn search(&self, term: &str) -> Result<Vec<Product>, CatalogError>;

    async fn categories(&self) -> Result<Vec<Category>, CatalogError>;
}
