//! Business logic services for the storefront.
//!
//! Services borrow their stores and vendor clients for the length of one
//! request; handlers build them from `AppState`.
//!
//! # Services
//!
//! - `auth` - Email/password accounts (Argon2id)
//! - `cart` - Session cart with a mirrored copy for signed-in users
//! - `wishlist` - Optimistic wishlist toggling
//! - `checkout` - Address, rates, payment intent and order creation
//! - `webhooks` - Payment and shipping webhook handling
//! - `retry` - Bounded retry for store writes

pub mod auth;
pub mod cart;
pub mod checkout;
pub mod retry;
pub mod webhooks;
pub mod wishlist;

pub use auth::{AuthError, AuthService};
pub use cart::CartService;
pub use checkout::{CheckoutFlowError, CheckoutService, CompletedCheckout};
pub use webhooks::{WebhookError, WebhookOutcome, WebhookService};
pub use wishlist::WishlistService;
