//! Wishlist API. Signed-in users only.
//!
//! The session holds a snapshot refreshed at login; membership checks read
//! the snapshot, writes go to the store optimistically.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use threadline_core::{ProductId, Wishlist, WishlistItem};

use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::routes::session_data;
use crate::services::WishlistService;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct WishlistResponse {
    pub items: Vec<WishlistItem>,
}

impl From<&Wishlist> for WishlistResponse {
    fn from(wishlist: &Wishlist) -> Self {
        Self {
            items: wishlist.items().to_vec(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AddRequest {
    pub slug: String,
    pub size: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipResponse {
    pub in_wishlist: bool,
}

fn service(state: &AppState) -> WishlistService<'_> {
    WishlistService::new(state.stores().wishlists.as_ref())
}

/// `GET /api/wishlist`
pub async fn show(_user: RequireAuth, session: Session) -> Result<Json<WishlistResponse>> {
    let wishlist = session_data::wishlist(&session).await?;
    Ok(Json((&wishlist).into()))
}

/// `POST /api/wishlist`
///
/// Answers 201 when the product was added and 200 when it was already saved.
#[instrument(skip(state, user, session, request), fields(slug = %request.slug))]
pub async fn add(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    session: Session,
    Json(request): Json<AddRequest>,
) -> Result<(StatusCode, Json<WishlistResponse>)> {
    let product = state.catalog().product_by_slug(&request.slug).await?;
    let mut wishlist = session_data::wishlist(&session).await?;

    let added = service(&state)
        .add_to_wishlist(&mut wishlist, user.id, product.wishlist_item(request.size))
        .await?;
    session_data::save_wishlist(&session, &wishlist).await?;

    let status = if added {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json((&wishlist).into())))
}

/// `DELETE /api/wishlist/{product_id}`
#[instrument(skip(state, user, session))]
pub async fn remove(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    session: Session,
    Path(product_id): Path<ProductId>,
) -> Result<Json<WishlistResponse>> {
    let mut wishlist = session_data::wishlist(&session).await?;
    service(&state)
        .remove_from_wishlist(&mut wishlist, user.id, &product_id)
        .await?;
    session_data::save_wishlist(&session, &wishlist).await?;
    Ok(Json((&wishlist).into()))
}

/// `GET /api/wishlist/{product_id}`
pub async fn contains(
    _user: RequireAuth,
    session: Session,
    Path(product_id): Path<ProductId>,
) -> Result<Json<MembershipResponse>> {
    let wishlist = session_data::wishlist(&session).await?;
    Ok(Json(MembershipResponse {
        in_wishlist: WishlistService::is_in_wishlist(&wishlist, &product_id),
    }))
}

/// `POST /api/wishlist/refresh`
#[instrument(skip(state, user, session))]
pub async fn refresh(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    session: Session,
) -> Result<Json<WishlistResponse>> {
    let wishlist = service(&state).refresh_wishlist(user.id).await?;
    session_data::save_wishlist(&session, &wishlist).await?;
    Ok(Json((&wishlist).into()))
}
