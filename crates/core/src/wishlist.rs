//! Wishlist snapshot.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::ProductId;

/// A saved product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WishlistItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub price: Decimal,
    pub image_url: String,
    #[serde(default)]
    pub size: Option<String>,
}

/// The signed-in user's wishlist as last fetched from the store.
///
/// Lookups are a linear scan; wishlists are small.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wishlist {
    items: Vec<WishlistItem>,
}

impl Wishlist {
    #[must_use]
    pub fn from_items(items: Vec<WishlistItem>) -> Self {
        let mut wishlist = Self::default();
        for item in items {
            wishlist.insert(item);
        }
        wishlist
    }

    #[must_use]
    pub fn items(&self) -> &[WishlistItem] {
        &self.items
    }

    #[must_use]
    pub fn contains(&self, product_id: &ProductId) -> bool {
        self.items.iter().any(|i| &i.product_id == product_id)
    }

    /// Insert unless already present. Returns `true` if inserted.
    pub fn insert(&mut self, item: WishlistItem) -> bool {
        if self.contains(&item.product_id) {
            return false;
        }
        self.items.push(item);
        true
    }

    /// Remove by product id, returning the removed item.
    pub fn remove(&mut self, product_id: &ProductId) -> Option<WishlistItem> {
        let pos = self.items.iter().position(|i| &i.product_id == product_id)?;
        Some(self.items.remove(pos))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
