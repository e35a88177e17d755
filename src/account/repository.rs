//! Handle database requests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use crate::account::{AccountRecord, AssetField, AssetSlot};
use crate::error::{Result, ServerError};

const UNIQUE_VIOLATION: &str = "23505";

const SELECT_USER: &str = r#"SELECT id, username, email, full_name, password,
        refresh_token, avatar, avatar_failure, cover_image,
        cover_image_failure, created_at, updated_at
    FROM users"#;

/// Port for account persistence.
///
/// Slot writes are field-scoped: updating one asset never touches the other.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Find any account owning `username` or `email`.
    async fn find_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> Result<Option<AccountRecord>>;

    /// Insert a new account.
    ///
    /// Fails with [`ServerError::Conflict`] on duplicated identity.
    async fn create(&self, record: &AccountRecord) -> Result<()>;

    /// Find an account by its ID.
    async fn find_by_id(&self, id: &str) -> Result<Option<AccountRecord>>;

    /// Settle one asset slot, only if it is still pending.
    async fn set_slot(
        &self,
        id: &str,
        field: AssetField,
        slot: &AssetSlot,
    ) -> Result<()>;
}

/// PostgreSQL account repository.
#[derive(Clone)]
pub struct PgAccountRepository {
    pool: PgPool,
}

impl PgAccountRepository {
    /// Create a new [`PgAccountRepository`].
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn from_row(row: &sqlx::postgres::PgRow) -> Result<AccountRecord> {
    Ok(AccountRecord {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        full_name: row.try_get("full_name")?,
        password: row.try_get("password")?,
        refresh_token: row.try_get("refresh_token")?,
        avatar: AssetSlot::from_columns(
            row.try_get("avatar")?,
            row.try_get("avatar_failure")?,
        ),
        cover_image: AssetSlot::from_columns(
            row.try_get("cover_image")?,
            row.try_get("cover_image_failure")?,
        ),
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

fn set_slot_query(field: AssetField) -> &'static str {
    match field {
        AssetField::Avatar => {
            r#"UPDATE users SET avatar = $2, avatar_failure = $3, updated_at = NOW()
                WHERE id = $1 AND avatar = 'Pending' AND avatar_failure IS NULL"#
        },
        AssetField::CoverImage => {
            r#"UPDATE users SET cover_image = $2, cover_image_failure = $3, updated_at = NOW()
                WHERE id = $1 AND cover_image = 'Pending' AND cover_image_failure IS NULL"#
        },
    }
}

#[async_trait]
impl AccountRepository for PgAccountRepository {
    async fn find_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> Result<Option<AccountRecord>> {
        let query =
            format!("{SELECT_USER} WHERE username = $1 OR email = $2 LIMIT 1");

        sqlx::query(&query)
            .bind(username)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(from_row)
            .transpose()
    }

    async fn create(&self, record: &AccountRecord) -> Result<()> {
        let result = sqlx::query(
            r#"INSERT INTO users (
                id, username, email, full_name, password, refresh_token,
                avatar, avatar_failure, cover_image, cover_image_failure,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"#,
        )
        .bind(&record.id)
        .bind(&record.username)
        .bind(&record.email)
        .bind(&record.full_name)
        .bind(&record.password)
        .bind(&record.refresh_token)
        .bind(record.avatar.url())
        .bind(record.avatar.failure())
        .bind(record.cover_image.url())
        .bind(record.cover_image.failure())
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(err))
                if err.code().as_deref() == Some(UNIQUE_VIOLATION) =>
            {
                Err(ServerError::Conflict)
            },
            Err(err) => Err(err.into()),
        }
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<AccountRecord>> {
        let query = format!("{SELECT_USER} WHERE id = $1");

        sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(from_row)
            .transpose()
    }

    async fn set_slot(
        &self,
        id: &str,
        field: AssetField,
        slot: &AssetSlot,
    ) -> Result<()> {
        let result = sqlx::query(set_slot_query(field))
            .bind(id)
            .bind(slot.url())
            .bind(slot.failure())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return match self.find_by_id(id).await? {
                Some(_) => Err(ServerError::SlotSettled {
                    record_id: id.to_owned(),
                    field,
                }),
                None => Err(ServerError::NotFound),
            };
        }

        Ok(())
    }
}
