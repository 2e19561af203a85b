//! Cart lines keyed by product id.
//!
//! A [`Cart`] never holds two lines for the same product and never holds a
//! line with quantity zero. Every mutation below preserves both properties.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::ProductId;

/// One product line in a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: ProductId,
    pub name: String,
    /// Unit price in standard currency units.
    pub price: Decimal,
    pub quantity: u32,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    /// Per-unit weight in kilograms, if the catalog provides one.
    #[serde(default)]
    pub weight: Option<Decimal>,
}

impl CartItem {
    /// `price * quantity`.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

/// Outcome of [`Cart::update_quantity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityUpdate {
    Updated,
    /// Requested quantity was below 1; the cart is unchanged.
    BelowFloor,
    NotFound,
}

/// Shopping cart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    items: Vec<CartItem>,
}

impl Cart {
    #[must_use]
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Build a cart from raw lines, folding duplicates and dropping zero
    /// quantities.
    #[must_use]
    pub fn from_items(items: impl IntoIterator<Item = CartItem>) -> Self {
        let mut cart = Self::new();
        for item in items {
            if item.quantity > 0 {
                cart.add_item(item);
            }
        }
        cart
    }

    #[must_use]
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    #[must_use]
    pub fn into_items(self) -> Vec<CartItem> {
        self.items
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn get(&self, product_id: &ProductId) -> Option<&CartItem> {
        self.items.iter().find(|i| &i.product_id == product_id)
    }

    /// Add a line. If the product is already present its quantity is
    /// increased by the added quantity. A quantity of 0 is treated as 1.
    ///
    /// Returns the resulting quantity of the line.
    pub fn add_item(&mut self, mut item: CartItem) -> u32 {
        item.quantity = item.quantity.max(1);
        if let Some(existing) = self
            .items
            .iter_mut()
            .find(|i| i.product_id == item.product_id)
        {
            existing.quantity = existing.quantity.saturating_add(item.quantity);
            return existing.quantity;
        }
        let quantity = item.quantity;
        self.items.push(item);
        quantity
    }

    /// Remove a line. Returns the removed line, if any.
    pub fn remove_item(&mut self, product_id: &ProductId) -> Option<CartItem> {
        let pos = self.items.iter().position(|i| &i.product_id == product_id)?;
        Some(self.items.remove(pos))
    }

    /// Set a line's quantity. Quantities below 1 leave the cart unchanged.
    pub fn update_quantity(&mut self, product_id: &ProductId, quantity: u32) -> QuantityUpdate {
        if quantity < 1 {
            return QuantityUpdate::BelowFloor;
        }
        match self.items.iter_mut().find(|i| &i.product_id == product_id) {
            Some(item) => {
                item.quantity = quantity;
                QuantityUpdate::Updated
            }
            None => QuantityUpdate::NotFound,
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Replace the whole cart with a remote snapshot.
    pub fn replace_with(&mut self, snapshot: Vec<CartItem>) {
        *self = Self::from_items(snapshot);
    }

    /// Merge another cart's lines into this one, keeping the larger
    /// quantity when both carts hold the same product.
    pub fn merge(&mut self, other: Vec<CartItem>) {
        for incoming in other {
            if incoming.quantity == 0 {
                continue;
            }
            match self
                .items
                .iter_mut()
                .find(|i| i.product_id == incoming.product_id)
            {
                Some(existing) => existing.quantity = existing.quantity.max(incoming.quantity),
                None => self.items.push(incoming),
            }
        }
    }

    /// Sum of line totals.
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.items.iter().map(CartItem::line_total).sum()
    }

    /// Total units across all lines.
    #[must_use]
    pub fn total_quantity(&self) -> u32 {
        self.items
            .iter()
            .fold(0u32, |acc, i| acc.saturating_add(i.quantity))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn item(id: &str, price: i64, quantity: u32) -> CartItem {
        CartItem {
            product_id: ProductId::new(id),
            name: format!("Product {id}"),
            price: Decimal::from(price),
            quantity,
            size: Some("M".to_owned()),
            image: None,
            description: None,
            color: None,
            weight: None,
        }
    }

    fn assert_invariants(cart: &Cart) {
        let ids: HashSet<_> = cart.items().iter().map(|i| &i.product_id).collect();
        assert_eq!(ids.len(), cart.items().len(), "duplicate product id");
        assert!(cart.items().iter().all(|i| i.quantity >= 1));
    }

    #[test]
    fn test_add_existing_product_increments_quantity() {
        let mut cart = Cart::new();
        cart.add_item(item("tee", 25, 1));
        assert_eq!(cart.add_item(item("tee", 25, 2)), 3);
        assert_eq!(cart.items().len(), 1);
    }

    #[test]
    fn test_update_quantity_below_one_is_noop() {
        let mut cart = Cart::new();
        cart.add_item(item("tee", 25, 2));
        let id = ProductId::new("tee");
        assert_eq!(cart.update_quantity(&id, 0), QuantityUpdate::BelowFloor);
        assert_eq!(cart.get(&id).map(|i| i.quantity), Some(2));
        assert_eq!(
            cart.update_quantity(&ProductId::new("hat"), 4),
            QuantityUpdate::NotFound
        );
    }

    #[test]
    fn test_invariants_hold_over_mixed_sequence() {
        let mut cart = Cart::new();
        let ids = ["a", "b", "c"];
        for step in 0u32..60 {
            let id = ids[(step % 3) as usize];
            let pid = ProductId::new(id);
            match step % 5 {
                0 | 1 => {
                    cart.add_item(item(id, 10, step % 3));
                }
                2 => {
                    cart.update_quantity(&pid, step % 4);
                }
                3 => {
                    cart.remove_item(&pid);
                }
                _ => {
                    cart.update_quantity(&pid, 0);
                }
            }
            assert_invariants(&cart);
        }
    }

    #[test]
    fn test_from_items_folds_duplicates_and_drops_zero() {
        let cart = Cart::from_items(vec![item("a", 5, 1), item("a", 5, 2), item("b", 5, 0)]);
        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.total_quantity(), 3);
    }

    #[test]
    fn test_replace_with_empty_snapshot_discards_guest_lines() {
        let mut cart = Cart::new();
        cart.add_item(item("guest", 40, 1));
        cart.replace_with(Vec::new());
        assert!(cart.is_empty());
    }

    #[test]
    fn test_merge_keeps_larger_quantity() {
        let mut cart = Cart::from_items(vec![item("a", 5, 3), item("b", 5, 1)]);
        cart.merge(vec![item("a", 5, 1), item("b", 5, 4), item("c", 5, 2)]);
        assert_eq!(cart.get(&ProductId::new("a")).map(|i| i.quantity), Some(3));
        assert_eq!(cart.get(&ProductId::new("b")).map(|i| i.quantity), Some(4));
        assert_eq!(cart.get(&ProductId::new("c")).map(|i| i.quantity), Some(2));
        assert_invariants(&cart);
    }

    #[test]
    fn test_subtotal() {
        let cart = Cart::from_items(vec![item("a", 5000, 2), item("b", 250, 1)]);
        assert_eq!(cart.subtotal(), Decimal::from(10_250));
    }
}
