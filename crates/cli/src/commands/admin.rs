//! Account role management.
//!
//! Accounts are created through the storefront's registration form; this
//! only flips the role on an existing one.

use thiserror::Error;

use threadline_core::{Email, UserRole};
use threadline_storefront::db::Stores;

use super::{CommandError, connect};

/// Errors that can occur during admin operations.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error(transparent)]
    Command(#[from] CommandError),

    /// No account with that email.
    #[error("No account with email: {0}")]
    UnknownUser(String),
}

/// Set the role of the account with `email`.
///
/// # Errors
///
/// Returns an error if no such account exists or the database is
/// unreachable.
pub async fn set_role(email: &Email, role: UserRole) -> Result<(), AdminError> {
    let pool = connect().await?;
    let stores = Stores::postgres(&pool);

    let user = stores
        .users
        .set_role(email, role)
        .await
        .map_err(CommandError::from)?
        .ok_or_else(|| AdminError::UnknownUser(email.to_string()))?;

    tracing::info!(user_id = %user.id, email = %user.email, role = %user.role, "Role updated");
    Ok(())
}
