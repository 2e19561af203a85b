//! Session-related types.
//!
//! Types stored in the session for authentication and shopping state.

use serde::{Deserialize, Serialize};

use threadline_core::{Email, UserId, UserRole};

use super::user::User;

/// Session-stored user identity.
///
/// Minimal data stored in the session to identify the logged-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: UserId,
    pub email: Email,
    pub role: UserRole,
}

impl CurrentUser {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

impl From<&User> for CurrentUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            role: user.role,
        }
    }
}

/// Session keys.
pub mod keys {
    /// The logged-in user.
    pub const CURRENT_USER: &str = "current_user";

    /// Cart lines (`threadline_core::Cart`).
    pub const CART: &str = "cart";

    /// Checkout state (`threadline_core::CheckoutSession`).
    pub const CHECKOUT: &str = "checkout";

    /// Wishlist snapshot (`threadline_core::Wishlist`).
    pub const WISHLIST: &str = "wishlist";

    /// Order placed by this session, so guests can see their confirmation.
    pub const LAST_ORDER: &str = "last_order";
}
