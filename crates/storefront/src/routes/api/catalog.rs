//! Catalog API: read-only pass-through to the CMS.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use tracing::instrument;

use crate::catalog::{Category, Product};
use crate::error::Result;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

/// `GET /api/products?category=`
#[instrument(skip(state))]
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Product>>> {
    let category = query.category.as_deref().filter(|c| !c.is_empty());
    Ok(Json(state.catalog().list_products(category).await?))
}

/// `GET /api/products/{slug}`
#[instrument(skip(state))]
pub async fn product(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<Product>> {
    Ok(Json(state.catalog().product_by_slug(&slug).await?))
}

/// `GET /api/search?q=`
#[instrument(skip(state))]
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Product>>> {
    Ok(Json(state.catalog().search(query.q.trim()).await?))
}

/// `GET /api/categories`
pub async fn categories(State(state): State<AppState>) -> Result<Json<Vec<Category>>> {
    Ok(Json(state.catalog().categories().await?))
}
