//! Checkout step state machine.
//!
//! ```text
//! Shipping --continue_to_review--> Review --enter_payment--> Payment --mark_complete--> Complete
//!     ^                              |  ^                       |
//!     +--------back_to_shipping------+  +-----back_to_review----+
//! ```
//!
//! [`CheckoutSession`] holds only what the flow needs between requests: the
//! address, fetched rates, the selected rate, the payment intent handle and
//! the cart lines that intent was priced from. Every transition checks the
//! current step, so a late response from an earlier step cannot move the
//! flow.

use serde::{Deserialize, Serialize};

use crate::address::{AddressErrors, ShippingAddress};
use crate::cart::CartItem;
use crate::types::OrderId;

/// Where the shopper is in checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStep {
    #[default]
    Shipping,
    Review,
    Payment,
    Complete,
}

impl CheckoutStep {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Shipping => "shipping",
            Self::Review => "review",
            Self::Payment => "payment",
            Self::Complete => "complete",
        }
    }
}

impl std::fmt::Display for CheckoutStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A quoted shipping rate from the shipping aggregator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingRate {
    /// Aggregator rate object id, used to buy the label.
    pub id: String,
    /// Carrier name (e.g. `USPS`).
    pub provider: String,
    /// Service level name (e.g. `Priority Mail`).
    pub service: String,
    pub price: rust_decimal::Decimal,
    pub currency: String,
    #[serde(default)]
    pub estimated_days: Option<u32>,
    #[serde(default)]
    pub duration_terms: Option<String>,
}

/// The part of a payment intent the storefront keeps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntentHandle {
    pub client_secret: String,
    pub payment_intent_id: String,
    /// Amount the intent was created (or last updated) with, in minor units.
    pub amount_minor: i64,
}

/// Checkout flow errors.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckoutError {
    #[error("cannot {action} during the {from} step")]
    InvalidTransition {
        from: CheckoutStep,
        action: &'static str,
    },

    #[error("cart is empty")]
    EmptyCart,

    #[error("shipping address has not been entered")]
    MissingAddress,

    #[error("no shipping rate selected")]
    NoRateSelected,

    #[error("unknown shipping rate: {0}")]
    UnknownRate(String),

    #[error("no payment has been started for this checkout")]
    MissingClientSecret,

    #[error("payment intent does not belong to this checkout")]
    PaymentIntentMismatch,

    #[error(transparent)]
    Address(#[from] AddressErrors),
}

/// Per-session checkout state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub step: CheckoutStep,
    pub address: Option<ShippingAddress>,
    pub rates: Vec<ShippingRate>,
    pub selected_rate_id: Option<String>,
    pub payment: Option<PaymentIntentHandle>,
    /// Cart lines priced into `payment`. The order is written from these.
    #[serde(default)]
    pub items: Vec<CartItem>,
    pub order_id: Option<OrderId>,
}

impl CheckoutSession {
    /// Start a new checkout, optionally prefilled with a saved address.
    #[must_use]
    pub fn new(saved_address: Option<ShippingAddress>) -> Self {
        Self {
            address: saved_address,
            ..Self::default()
        }
    }

    fn expect_step(&self, step: CheckoutStep, action: &'static str) -> Result<(), CheckoutError> {
        if self.step == step {
            Ok(())
        } else {
            Err(CheckoutError::InvalidTransition {
                from: self.step,
                action,
            })
        }
    }

    /// Validate and store the address. Previously fetched rates and the
    /// rate selection are discarded since they were quoted for the old
    /// address.
    ///
    /// # Errors
    ///
    /// Fails outside the shipping step or when the address is invalid.
    pub fn set_address(&mut self, address: ShippingAddress) -> Result<(), CheckoutError> {
        self.expect_step(CheckoutStep::Shipping, "submit an address")?;
        let address = address.normalized();
        address.validate()?;
        self.address = Some(address);
        self.rates.clear();
        self.selected_rate_id = None;
        Ok(())
    }

    /// Store freshly fetched rates and clear any previous selection.
    ///
    /// # Errors
    ///
    /// Fails outside the shipping step.
    pub fn set_rates(&mut self, rates: Vec<ShippingRate>) -> Result<(), CheckoutError> {
        self.expect_step(CheckoutStep::Shipping, "store shipping rates")?;
        self.rates = rates;
        self.selected_rate_id = None;
        Ok(())
    }

    /// Select one of the fetched rates.
    ///
    /// # Errors
    ///
    /// Fails outside the shipping step or when the id is not a fetched rate.
    pub fn select_rate(&mut self, rate_id: &str) -> Result<&ShippingRate, CheckoutError> {
        self.expect_step(CheckoutStep::Shipping, "select a rate")?;
        let rate = self
            .rates
            .iter()
            .find(|r| r.id == rate_id)
            .ok_or_else(|| CheckoutError::UnknownRate(rate_id.to_owned()))?;
        self.selected_rate_id = Some(rate.id.clone());
        Ok(rate)
    }

    #[must_use]
    pub fn selected_rate(&self) -> Option<&ShippingRate> {
        let id = self.selected_rate_id.as_deref()?;
        self.rates.iter().find(|r| r.id == id)
    }

    /// Shipping -> Review.
    ///
    /// # Errors
    ///
    /// Requires an address and a selected rate.
    pub fn continue_to_review(&mut self) -> Result<(), CheckoutError> {
        self.expect_step(CheckoutStep::Shipping, "continue to review")?;
        if self.address.is_none() {
            return Err(CheckoutError::MissingAddress);
        }
        if self.selected_rate().is_none() {
            return Err(CheckoutError::NoRateSelected);
        }
        self.step = CheckoutStep::Review;
        Ok(())
    }

    /// Review -> Shipping. Fetched rates and the selection are kept.
    ///
    /// # Errors
    ///
    /// Fails outside the review step.
    pub fn back_to_shipping(&mut self) -> Result<(), CheckoutError> {
        self.expect_step(CheckoutStep::Review, "go back to shipping")?;
        self.step = CheckoutStep::Shipping;
        Ok(())
    }

    /// Payment intent already created for this checkout, if any.
    #[must_use]
    pub const fn existing_payment(&self) -> Option<&PaymentIntentHandle> {
        self.payment.as_ref()
    }

    /// Review -> Payment with the (new or reused) payment intent and the
    /// cart lines it was priced from.
    ///
    /// # Errors
    ///
    /// Fails outside the review step or with no lines.
    pub fn enter_payment(
        &mut self,
        handle: PaymentIntentHandle,
        items: Vec<CartItem>,
    ) -> Result<(), CheckoutError> {
        self.expect_step(CheckoutStep::Review, "continue to payment")?;
        if items.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        self.payment = Some(handle);
        self.items = items;
        self.step = CheckoutStep::Payment;
        Ok(())
    }

    /// Payment -> Review. The intent and its priced lines are kept so a
    /// return to payment with an unchanged cart reuses them.
    ///
    /// # Errors
    ///
    /// Fails outside the payment step.
    pub fn back_to_review(&mut self) -> Result<(), CheckoutError> {
        self.expect_step(CheckoutStep::Payment, "go back to review")?;
        self.step = CheckoutStep::Review;
        Ok(())
    }

    /// The cart is frozen while a payment is open against it.
    ///
    /// # Errors
    ///
    /// Fails during the payment step.
    pub fn ensure_cart_editable(&self) -> Result<(), CheckoutError> {
        if self.step == CheckoutStep::Payment {
            return Err(CheckoutError::InvalidTransition {
                from: self.step,
                action: "change the cart",
            });
        }
        Ok(())
    }

    /// Check that `payment_intent_id` may complete this checkout.
    ///
    /// # Errors
    ///
    /// Fails outside the payment step, when no client secret is held, or
    /// when the id does not match the held intent.
    pub fn authorize_completion(
        &self,
        payment_intent_id: &str,
    ) -> Result<&PaymentIntentHandle, CheckoutError> {
        self.expect_step(CheckoutStep::Payment, "complete payment")?;
        let handle = self
            .payment
            .as_ref()
            .filter(|h| !h.client_secret.is_empty())
            .ok_or(CheckoutError::MissingClientSecret)?;
        if handle.payment_intent_id != payment_intent_id {
            return Err(CheckoutError::PaymentIntentMismatch);
        }
        Ok(handle)
    }

    /// Payment -> Complete.
    ///
    /// # Errors
    ///
    /// Fails outside the payment step.
    pub fn mark_complete(&mut self, order_id: OrderId) -> Result<(), CheckoutError> {
        self.expect_step(CheckoutStep::Payment, "complete checkout")?;
        self.order_id = Some(order_id);
        self.step = CheckoutStep::Complete;
        Ok(())
    }
}
