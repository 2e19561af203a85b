//! Cart operations over the session cart and the remote mirror.
//!
//! The session [`Cart`] is the source of truth. For signed-in shoppers each
//! mutation is applied locally first and then mirrored to the [`CartStore`]
//! with a bounded retry; mirror failures are logged and never surfaced.

use tracing::{instrument, warn};

use threadline_core::{Cart, CartItem, ProductId, QuantityUpdate, UserId};

use crate::config::CartSyncPolicy;
use crate::db::{CartStore, RepositoryError};

use super::retry::with_retry;

/// Cart service for one request.
pub struct CartService<'a> {
    carts: &'a dyn CartStore,
    policy: CartSyncPolicy,
}

impl<'a> CartService<'a> {
    #[must_use]
    pub const fn new(carts: &'a dyn CartStore, policy: CartSyncPolicy) -> Self {
        Self { carts, policy }
    }

    /// Add a line (or increase an existing one). Returns the line's quantity.
    #[instrument(skip(self, cart, item), fields(product_id = %item.product_id))]
    pub async fn add_item(&self, cart: &mut Cart, item: CartItem, user: Option<UserId>) -> u32 {
        let product_id = item.product_id.clone();
        let quantity = cart.add_item(item);

        if let (Some(user_id), Some(line)) = (user, cart.get(&product_id)) {
            self.mirror("upsert cart line", || self.carts.upsert_item(user_id, line))
                .await;
        }
        quantity
    }

    #[instrument(skip(self, cart))]
    pub async fn remove_item(
        &self,
        cart: &mut Cart,
        product_id: &ProductId,
        user: Option<UserId>,
    ) -> Option<CartItem> {
        let removed = cart.remove_item(product_id);

        if let (Some(user_id), Some(_)) = (user, &removed) {
            self.mirror("remove cart line", || {
                self.carts.remove_item(user_id, product_id)
            })
            .await;
        }
        removed
    }

    /// Set a line's quantity. Below 1 is a no-op.
    #[instrument(skip(self, cart))]
    pub async fn update_quantity(
        &self,
        cart: &mut Cart,
        product_id: &ProductId,
        quantity: u32,
        user: Option<UserId>,
    ) -> QuantityUpdate {
        let outcome = cart.update_quantity(product_id, quantity);

        if outcome == QuantityUpdate::Updated
            && let (Some(user_id), Some(line)) = (user, cart.get(product_id))
        {
            self.mirror("update cart quantity", || {
                self.carts.upsert_item(user_id, line)
            })
            .await;
        }
        outcome
    }

    #[instrument(skip(self, cart))]
    pub async fn clear_cart(&self, cart: &mut Cart, user: Option<UserId>) {
        cart.clear();

        if let Some(user_id) = user {
            self.mirror("clear cart", || self.carts.clear(user_id)).await;
        }
    }

    /// Reconcile the session cart with the remote cart after login.
    ///
    /// Under [`CartSyncPolicy::Replace`] the session cart becomes the remote
    /// snapshot, discarding guest lines. Under [`CartSyncPolicy::Merge`] guest
    /// lines are merged in (larger quantity wins) and written back.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the remote cart cannot be loaded; the
    /// session cart is left untouched in that case.
    #[instrument(skip(self, cart))]
    pub async fn sync_with_remote(
        &self,
        cart: &mut Cart,
        user_id: UserId,
    ) -> Result<(), RepositoryError> {
        let remote = self.carts.load(user_id).await?;

        match self.policy {
            CartSyncPolicy::Replace => cart.replace_with(remote),
            CartSyncPolicy::Merge => {
                let guest_lines = std::mem::take(cart).into_items();
                cart.replace_with(remote);
                cart.merge(guest_lines);
                let merged = cart.items();
                self.mirror("write merged cart", || self.carts.replace(user_id, merged))
                    .await;
            }
        }
        Ok(())
    }

    async fn mirror<F, Fut>(&self, what: &str, op: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), RepositoryError>>,
    {
        if let Err(e) = with_retry(what, op).await {
            warn!(what, error = %e, "Cart mirror failed; remote cart is stale");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::db::memory::MemoryStore;

    fn item(id: &str, price: i64, quantity: u32) -> CartItem {
        CartItem {
            product_id: ProductId::new(id),
            name: format!("Product {id}"),
            price: Decimal::from(price),
            quantity,
            size: None,
            image: None,
            description: None,
            color: None,
            weight: None,
        }
    }

    #[tokio::test]
    async fn test_guest_mutations_stay_local() {
        let store = MemoryStore::new();
        let service = CartService::new(&store, CartSyncPolicy::Replace);
        let mut cart = Cart::new();

        service.add_item(&mut cart, item("tee", 25, 1), None).await;

        assert_eq!(cart.items().len(), 1);
        assert!(store.load(UserId::generate()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_member_mutations_are_mirrored() {
        let store = MemoryStore::new();
        let service = CartService::new(&store, CartSyncPolicy::Replace);
        let user = UserId::generate();
        let mut cart = Cart::new();

        service.add_item(&mut cart, item("tee", 25, 1), Some(user)).await;
        service.add_item(&mut cart, item("tee", 25, 2), Some(user)).await;
        service.add_item(&mut cart, item("cap", 15, 1), Some(user)).await;
        service
            .update_quantity(&mut cart, &ProductId::new("cap"), 4, Some(user))
            .await;
        service
            .remove_item(&mut cart, &ProductId::new("tee"), Some(user))
            .await;

        let remote = store.load(user).await.unwrap();
        assert_eq!(remote, cart.items());
        assert_eq!(remote[0].quantity, 4);
    }

    #[tokio::test]
    async fn test_update_below_one_is_noop_locally_and_remotely() {
        let store = MemoryStore::new();
        let service = CartService::new(&store, CartSyncPolicy::Replace);
        let user = UserId::generate();
        let mut cart = Cart::new();
        service.add_item(&mut cart, item("tee", 25, 2), Some(user)).await;

        let outcome = service
            .update_quantity(&mut cart, &ProductId::new("tee"), 0, Some(user))
            .await;

        assert_eq!(outcome, QuantityUpdate::BelowFloor);
        assert_eq!(cart.items()[0].quantity, 2);
        assert_eq!(store.load(user).await.unwrap()[0].quantity, 2);
    }

    #[tokio::test]
    async fn test_replace_sync_discards_guest_cart_when_remote_empty() {
        let store = MemoryStore::new();
        let service = CartService::new(&store, CartSyncPolicy::Replace);
        let mut cart = Cart::new();
        service.add_item(&mut cart, item("tee", 25, 1), None).await;

        service
            .sync_with_remote(&mut cart, UserId::generate())
            .await
            .unwrap();

        assert!(cart.is_empty());
    }

    #[tokio::test]
    async fn test_merge_sync_keeps_guest_lines_and_writes_back() {
        let store = MemoryStore::new();
        let user = UserId::generate();
        store.upsert_item(user, &item("tee", 25, 3)).await.unwrap();

        let service = CartService::new(&store, CartSyncPolicy::Merge);
        let mut cart = Cart::new();
        service.add_item(&mut cart, item("tee", 25, 1), None).await;
        service.add_item(&mut cart, item("cap", 15, 2), None).await;

        service.sync_with_remote(&mut cart, user).await.unwrap();

        assert_eq!(cart.get(&ProductId::new("tee")).unwrap().quantity, 3);
        assert_eq!(cart.get(&ProductId::new("cap")).unwrap().quantity, 2);
        assert_eq!(store.load(user).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_mirror_failure_is_swallowed_and_local_state_kept() {
        let store = MemoryStore::new();
        let service = CartService::new(&store, CartSyncPolicy::Replace);
        let user = UserId::generate();
        let mut cart = Cart::new();

        store.fail_next_writes(3);
        let quantity = service.add_item(&mut cart, item("tee", 25, 1), Some(user)).await;

        assert_eq!(quantity, 1);
        assert_eq!(cart.items().len(), 1);
        assert!(store.load(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mirror_recovers_from_transient_failure() {
        let store = MemoryStore::new();
        let service = CartService::new(&store, CartSyncPolicy::Replace);
        let user = UserId::generate();
        let mut cart = Cart::new();

        store.fail_next_writes(2);
        service.add_item(&mut cart, item("tee", 25, 1), Some(user)).await;

        assert_eq!(store.load(user).await.unwrap().len(), 1);
    }
}
