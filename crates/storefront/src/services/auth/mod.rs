//! Shopper accounts: email plus an Argon2id password hash.
//!
//! Accounts only unlock the wishlist, order history and a cart that follows
//! the shopper between devices. Checkout never requires one.

mod error;

pub use error::AuthError;

use std::sync::LazyLock;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use threadline_core::Email;

use crate::db::{RepositoryError, UserStore};
use crate::models::User;

/// Accepted password length, in characters.
const PASSWORD_CHARS: std::ops::RangeInclusive<usize> = 8..=128;

/// Hash checked when the email is unknown, so both failure paths cost one
/// Argon2 verification.
static DECOY_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| hash_password("decoy-password-never-matches").ok());

/// Registration and sign-in over a [`UserStore`].
pub struct AuthService<'a> {
    users: &'a dyn UserStore,
}

impl<'a> AuthService<'a> {
    #[must_use]
    pub const fn new(users: &'a dyn UserStore) -> Self {
        Self { users }
    }

    /// Create an account.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidEmail`] for a malformed address
    /// - [`AuthError::WeakPassword`] outside the accepted length
    /// - [`AuthError::UserAlreadyExists`] when the address is taken, in any case
    pub async fn register(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = Email::parse(email)?;
        check_password(password)?;
        let hash = hash_password(password)?;

        match self.users.create_with_password(&email, &hash).await {
            Ok(user) => {
                tracing::info!(user_id = %user.id, "Account registered");
                Ok(user)
            }
            Err(RepositoryError::Conflict(_)) => Err(AuthError::UserAlreadyExists),
            Err(e) => Err(e.into()),
        }
    }

    /// Check credentials. Unknown email and wrong password are
    /// indistinguishable to the caller.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidCredentials`] on any mismatch.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let Ok(email) = Email::parse(email) else {
            return Err(AuthError::InvalidCredentials);
        };

        let Some((user, hash)) = self.users.get_password_hash(&email).await? else {
            if let Some(decoy) = DECOY_HASH.as_deref() {
                // Result ignored; only the elapsed time matters.
                let _ = verify_password(password, decoy);
            }
            return Err(AuthError::InvalidCredentials);
        };

        verify_password(password, &hash)?;
        Ok(user)
    }
}

fn check_password(password: &str) -> Result<(), AuthError> {
    let len = password.chars().count();
    if PASSWORD_CHARS.contains(&len) {
        return Ok(());
    }
    Err(AuthError::WeakPassword(format!(
        "password must be {} to {} characters",
        PASSWORD_CHARS.start(),
        PASSWORD_CHARS.end()
    )))
}

/// Argon2id hash in PHC string form.
///
/// # Errors
///
/// Returns [`AuthError::PasswordHash`] if hashing fails.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| AuthError::InvalidCredentials)
}
