//! User domain types.

use chrono::{DateTime, Utc};

use threadline_core::{Email, UserId, UserRole};

/// A storefront account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub email: Email,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}
