//! Order totals and parcel weight.
//!
//! Tax is a flat 5% of the pre-shipping subtotal. Tax and total are each
//! rounded to a whole unit, half away from zero.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::cart::CartItem;
use crate::types::{MoneyError, round_whole, to_minor_units};

/// Computed totals for one order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

impl OrderTotals {
    /// Total in processor minor units.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError`] if the total is negative or too large.
    pub fn total_minor_units(&self) -> Result<i64, MoneyError> {
        to_minor_units(self.total)
    }
}

fn tax_rate() -> Decimal {
    Decimal::new(5, 2)
}

fn default_unit_weight_kg() -> Decimal {
    Decimal::new(5, 1)
}

/// Compute subtotal, tax and total for cart lines plus a shipping price.
#[must_use]
pub fn calculate_order_total(items: &[CartItem], shipping: Decimal) -> OrderTotals {
    let subtotal: Decimal = items.iter().map(CartItem::line_total).sum();
    let tax = round_whole(subtotal * tax_rate());
    let total = round_whole(subtotal + shipping + tax);
    OrderTotals {
        subtotal,
        shipping,
        tax,
        total,
    }
}

/// Parcel weight in kilograms: each line's weight times its quantity, with
/// 0.5 kg per unit when the line has no weight.
#[must_use]
pub fn parcel_weight_kg(items: &[CartItem]) -> Decimal {
    items
        .iter()
        .map(|i| i.weight.unwrap_or_else(default_unit_weight_kg) * Decimal::from(i.quantity))
        .sum()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::ProductId;

    fn line(price: Decimal, quantity: u32, weight: Option<Decimal>) -> CartItem {
        CartItem {
            product_id: ProductId::new(format!("p-{price}-{quantity}")),
            name: "Line".to_owned(),
            price,
            quantity,
            size: None,
            image: None,
            description: None,
            color: None,
            weight,
        }
    }

    #[test]
    fn test_tax_is_five_percent_of_subtotal() {
        let totals = calculate_order_total(&[line(Decimal::from(10_000), 1, None)], Decimal::ZERO);
        assert_eq!(totals.subtotal, Decimal::from(10_000));
        assert_eq!(totals.tax, Decimal::from(500));
        assert_eq!(totals.total, Decimal::from(10_500));
    }

    #[test]
    fn test_total_includes_shipping() {
        let items = [line(Decimal::from(5_000), 2, None)];
        let totals = calculate_order_total(&items, Decimal::from(300));
        assert_eq!(totals.subtotal, Decimal::from(10_000));
        assert_eq!(totals.tax, Decimal::from(500));
        assert_eq!(totals.total, Decimal::from(10_800));
        assert_eq!(totals.total_minor_units().unwrap(), 1_080_000);
    }

    #[test]
    fn test_calculation_is_repeatable() {
        let items = [
            line(Decimal::new(1999, 2), 3, None),
            line(Decimal::new(450, 2), 1, None),
        ];
        let shipping = Decimal::new(799, 2);
        let first = calculate_order_total(&items, shipping);
        let second = calculate_order_total(&items, shipping);
        assert_eq!(first, second);
    }

    #[test]
    fn test_tax_rounds_half_away_from_zero() {
        // 5% of 10 = 0.5 -> 1
        let totals = calculate_order_total(&[line(Decimal::from(10), 1, None)], Decimal::ZERO);
        assert_eq!(totals.tax, Decimal::ONE);
        assert_eq!(totals.total, Decimal::from(11));
    }

    #[test]
    fn test_parcel_weight_defaults_half_kilo_per_unit() {
        let items = [
            line(Decimal::ONE, 3, None),
            line(Decimal::TWO, 2, Some(Decimal::new(12, 1))),
        ];
        assert_eq!(parcel_weight_kg(&items), Decimal::new(39, 1));
    }
}
