//! Wishlist operations with optimistic snapshot updates.
//!
//! The session holds a [`Wishlist`] snapshot taken at login or on refresh.
//! Toggles update the snapshot first; if the remote write fails the snapshot
//! is reverted and the error returned.

use tracing::{instrument, warn};

use threadline_core::{ProductId, UserId, Wishlist, WishlistItem};

use crate::db::{RepositoryError, WishlistStore};

pub struct WishlistService<'a> {
    wishlists: &'a dyn WishlistStore,
}

impl<'a> WishlistService<'a> {
    #[must_use]
    pub const fn new(wishlists: &'a dyn WishlistStore) -> Self {
        Self { wishlists }
    }

    /// Save a product. Returns `false` if it was already saved.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the remote write fails; the snapshot is
    /// restored first.
    #[instrument(skip(self, snapshot, item), fields(product_id = %item.product_id))]
    pub async fn add_to_wishlist(
        &self,
        snapshot: &mut Wishlist,
        user_id: UserId,
        item: WishlistItem,
    ) -> Result<bool, RepositoryError> {
        let product_id = item.product_id.clone();
        if !snapshot.insert(item.clone()) {
            return Ok(false);
        }

        if let Err(e) = self.wishlists.add(user_id, &item).await {
            warn!(error = %e, "Wishlist add failed, reverting");
            snapshot.remove(&product_id);
            return Err(e);
        }
        Ok(true)
    }

    /// Remove a product. Returns `false` if it was not saved.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the remote write fails; the snapshot is
    /// restored first.
    #[instrument(skip(self, snapshot))]
    pub async fn remove_from_wishlist(
        &self,
        snapshot: &mut Wishlist,
        user_id: UserId,
        product_id: &ProductId,
    ) -> Result<bool, RepositoryError> {
        let Some(removed) = snapshot.remove(product_id) else {
            return Ok(false);
        };

        if let Err(e) = self.wishlists.remove(user_id, product_id).await {
            warn!(error = %e, "Wishlist remove failed, reverting");
            snapshot.insert(removed);
            return Err(e);
        }
        Ok(true)
    }

    /// Linear scan of the snapshot; no remote call.
    #[must_use]
    pub fn is_in_wishlist(snapshot: &Wishlist, product_id: &ProductId) -> bool {
        snapshot.contains(product_id)
    }

    /// Fetch a fresh snapshot from the remote store.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the remote read fails.
    #[instrument(skip(self))]
    pub async fn refresh_wishlist(&self, user_id: UserId) -> Result<Wishlist, RepositoryError> {
        let items = self.wishlists.list(user_id).await?;
        Ok(Wishlist::from_items(items))
    }
}
