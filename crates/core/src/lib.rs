//! Threadline Core - Domain types and checkout rules.
//!
//! This crate provides the types shared by every Threadline component:
//! - `storefront` - Public-facing shop (catalog, cart, checkout, webhooks)
//! - `cli` - Migrations and operational reports
//!
//! # Architecture
//!
//! The core crate contains only types and pure rules - no I/O, no database
//! access, no HTTP clients. Everything here can be unit tested without a
//! runtime.
//!
//! # Modules
//!
//! - [`types`] - Newtype ids, email, money and status enums
//! - [`address`] - Shipping address with per-field validation
//! - [`cart`] - Cart lines keyed by product id
//! - [`pricing`] - Order totals, tax and parcel weight
//! - [`checkout`] - Checkout step state machine
//! - [`wishlist`] - Wishlist snapshot

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod address;
pub mod cart;
pub mod checkout;
pub mod pricing;
pub mod types;
pub mod wishlist;

pub use address::{AddressErrors, FieldError, ShippingAddress};
pub use cart::{Cart, CartItem, QuantityUpdate};
pub use checkout::{CheckoutError, CheckoutSession, CheckoutStep, PaymentIntentHandle, ShippingRate};
pub use pricing::{OrderTotals, calculate_order_total, parcel_weight_kg};
pub use types::*;
pub use wishlist::{Wishlist, WishlistItem};
