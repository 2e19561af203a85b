//! User repository for database operations.
//!
//! Accounts live in `storefront.users`; Argon2 hashes are kept apart in
//! `storefront.user_passwords` so the user row can be loaded without them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use threadline_core::{Email, UserId, UserRole};

use super::{RepositoryError, UserStore, conflict_or_database, parse_column};
use crate::models::User;

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    role: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;

        Ok(Self {
            id: UserId::new(row.id),
            email,
            role: parse_column(&row.role, "users.role")?,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UserWithHashRow {
    #[sqlx(flatten)]
    user: UserRow,
    password_hash: String,
}

/// Postgres-backed [`UserStore`].
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create_with_password(
        &self,
        email: &Email,
        password_hash: &str,
    ) -> Result<User, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, UserRow>(
            r"
            INSERT INTO storefront.users (id, email, role)
            VALUES ($1, $2, $3)
            RETURNING id, email, role, created_at
            ",
        )
        .bind(Uuid::new_v4())
        .bind(email.as_str())
        .bind(UserRole::Customer.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| conflict_or_database(e, "email"))?;

        sqlx::query(
            r"
            INSERT INTO storefront.user_passwords (user_id, password_hash)
            VALUES ($1, $2)
            ",
        )
        .bind(row.id)
        .bind(password_hash)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        User::try_from(row)
    }

    async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        sqlx::query_as::<_, UserRow>(
            r"
            SELECT id, email, role, created_at
            FROM storefront.users
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(User::try_from)
        .transpose()
    }

    async fn get_password_hash(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError> {
        let row = sqlx::query_as::<_, UserWithHashRow>(
            r"
            SELECT u.id, u.email, u.role, u.created_at, p.password_hash
            FROM storefront.users u
            JOIN storefront.user_passwords p ON p.user_id = u.id
            WHERE u.email = $1
            ",
        )
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some((User::try_from(r.user)?, r.password_hash))),
            None => Ok(None),
        }
    }

    async fn set_role(
        &self,
        email: &Email,
        role: UserRole,
    ) -> Result<Option<User>, RepositoryError> {
        sqlx::query_as::<_, UserRow>(
            r"
            UPDATE storefront.users
            SET role = $2
            WHERE email = $1
            RETURNING id, email, role, created_at
            ",
        )
        .bind(email.as_str())
        .bind(role.as_str())
        .fetch_optional(&self.pool)
        .await?
        .map(User::try_from)
        .transpose()
    }
}
