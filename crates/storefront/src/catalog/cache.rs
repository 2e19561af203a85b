//! Cache types for CMS query results.

use super::{Category, Product};

/// Cached value types.
#[derive(Debug, Clone)]
pub enum CacheValue {
    Product(Box<Product>),
    Products(Vec<Product>),
    Categories(Vec<Category>),
}

pub fn products_key(category: Option<&str>) -> String {
    format!("products:{}", category.unwrap_or(""))
}

pub fn product_key(slug: &str) -> String {
    format!("product:{slug}")
}

pub const CATEGORIES_KEY: &str = "categories";
