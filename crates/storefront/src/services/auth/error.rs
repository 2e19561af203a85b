//! Account errors.

use thiserror::Error;

use crate::db::RepositoryError;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] threadline_core::EmailError),

    /// Wrong password or no such account.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("an account with this email already exists")]
    UserAlreadyExists,

    #[error("weak password: {0}")]
    WeakPassword(String),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("password hashing failed")]
    PasswordHash,
}
