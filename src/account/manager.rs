//! Placeholder lifecycle of an account during registration.

use std::sync::Arc;

use chrono::Utc;

use crate::account::{
    AccountRecord, AccountRepository, AssetField, AssetSlot, NewAccount,
    SanitizedRecord,
};
use crate::asset::AssetError;
use crate::error::{Result, ServerError};

/// Creates placeholder records and settles their asset slots.
#[derive(Clone)]
pub struct PendingRecordManager {
    repo: Arc<dyn AccountRepository>,
}

impl PendingRecordManager {
    /// Create a new [`PendingRecordManager`].
    pub fn new(repo: Arc<dyn AccountRepository>) -> Self {
        Self { repo }
    }

    /// Reserve the identity with both slots pending.
    pub async fn create_placeholder(
        &self,
        account: NewAccount,
    ) -> Result<AccountRecord> {
        if self
            .repo
            .find_by_username_or_email(&account.username, &account.email)
            .await?
            .is_some()
        {
            return Err(ServerError::Conflict);
        }

        let record = AccountRecord::placeholder(account, Utc::now());
        self.repo.create(&record).await?;

        tracing::info!(record_id = %record.id, username = %record.username, "placeholder account created");
        Ok(record)
    }

    /// Persist the outcome of one upload into its own slot only.
    pub async fn apply_asset_result(
        &self,
        record_id: &str,
        field: AssetField,
        result: &std::result::Result<String, AssetError>,
    ) -> Result<()> {
        let slot = match result {
            Ok(url) => AssetSlot::Uploaded(url.clone()),
            Err(err) => AssetSlot::Failed(err.to_string()),
        };

        self.repo.set_slot(record_id, field, &slot).await
    }

    /// Read the record back without its secrets.
    pub async fn finalize(&self, record_id: &str) -> Result<SanitizedRecord> {
        self.repo
            .find_by_id(record_id)
            .await?
            .map(|record| record.sanitize())
            .ok_or(ServerError::NotFound)
    }
}
