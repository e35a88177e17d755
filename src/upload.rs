//! Registration with concurrent avatar and cover image uploads.
//!
//! Both uploads are polled from the calling task with [`tokio::join!`], so
//! they interleave on one execution context. A failing branch settles its own
//! slot and never cancels its sibling.

use std::sync::{Arc, LazyLock};
use std::time::Instant;

use regex_lite::Regex;
use validator::{Validate, ValidationError};

use crate::account::{
    AssetField, NewAccount, PendingRecordManager, RecordStatus,
    SanitizedRecord,
};
use crate::asset::{Asset, AssetError, ObjectStoreUploader};
use crate::crypto::PasswordManager;
use crate::error::{Result, ServerError};
use crate::telemetry;

static USERNAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9_.-]+$").unwrap());

fn validate_username(username: &str) -> std::result::Result<(), ValidationError> {
    if USERNAME.is_match(username) {
        Ok(())
    } else {
        Err(ValidationError::new("username"))
    }
}

fn not_blank(value: &str) -> std::result::Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::new("required"))
    } else {
        Ok(())
    }
}

/// Decoded registration request.
#[derive(Debug, Clone, Default, Validate)]
pub struct Registration {
    #[validate(custom(
        function = "not_blank",
        message = "Full name is required."
    ))]
    pub full_name: String,
    #[validate(email(message = "Email must be formatted."))]
    pub email: String,
    #[validate(
        length(
            min = 2,
            max = 32,
            message = "Username must contain 2 to 32 characters."
        ),
        custom(
            function = "validate_username",
            message = "Username must be alphanumeric."
        )
    )]
    pub username: String,
    #[validate(length(
        min = 8,
        max = 255,
        message = "Password must contain at least 8 characters."
    ))]
    pub password: String,
    pub avatar: Option<Asset>,
    pub cover_image: Option<Asset>,
}

impl Registration {
    /// Store `asset` in its slot. The first asset of a field wins.
    pub fn attach(&mut self, asset: Asset) {
        let slot = match asset.field {
            AssetField::Avatar => &mut self.avatar,
            AssetField::CoverImage => &mut self.cover_image,
        };
        if slot.is_none() {
            *slot = Some(asset);
        }
    }

    fn normalize(&mut self) {
        self.full_name = self.full_name.trim().to_owned();
        self.email = self.email.trim().to_lowercase();
        self.username = self.username.trim().to_lowercase();
    }
}

fn require(asset: Option<Asset>, field: AssetField) -> Result<Asset> {
    match asset {
        None => Err(ServerError::MissingAsset(field)),
        Some(asset) if asset.data.is_empty() => {
            Err(AssetError::Empty { field }.into())
        },
        Some(asset) => Ok(Asset { field, ..asset }),
    }
}

/// Drives a registration from validation to the sanitized record.
#[derive(Clone)]
pub struct UploadOrchestrator {
    records: PendingRecordManager,
    uploader: ObjectStoreUploader,
    passwords: Arc<PasswordManager>,
}

impl UploadOrchestrator {
    /// Create a new [`UploadOrchestrator`].
    pub fn new(
        records: PendingRecordManager,
        uploader: ObjectStoreUploader,
        passwords: Arc<PasswordManager>,
    ) -> Self {
        Self {
            records,
            uploader,
            passwords,
        }
    }

    /// Register an account and its two assets.
    ///
    /// Nothing is written before both assets and every text field are
    /// valid and the identity is free. Once the placeholder exists, a failed
    /// upload is reported as [`ServerError::Upload`] and the record is kept
    /// with the failed slot settled as such.
    pub async fn register(
        &self,
        mut request: Registration,
    ) -> Result<SanitizedRecord> {
        let avatar = require(request.avatar.take(), AssetField::Avatar)?;
        let cover_image =
            require(request.cover_image.take(), AssetField::CoverImage)?;

        request.normalize();
        request.validate()?;

        let account = NewAccount {
            password_hash: self.passwords.hash_password(&request.password)?,
            username: request.username,
            email: request.email,
            full_name: request.full_name,
        };
        let record = self.records.create_placeholder(account).await?;

        let (avatar, cover_image) = tokio::join!(
            self.settle(&record.id, avatar),
            self.settle(&record.id, cover_image),
        );

        let sanitized = self.records.finalize(&record.id).await?;

        let failures: Vec<AssetError> = [avatar, cover_image]
            .into_iter()
            .filter_map(std::result::Result::err)
            .collect();
        if !failures.is_empty() {
            return Err(ServerError::Upload {
                record_id: record.id,
                failures,
            });
        }

        if sanitized.status != RecordStatus::Complete {
            return Err(ServerError::Internal {
                details: format!("{} still has pending assets", record.id),
                source: None,
            });
        }

        tracing::info!(record_id = %sanitized.id, "user registered");
        Ok(sanitized)
    }

    /// Upload one asset and persist its outcome.
    async fn settle(
        &self,
        record_id: &str,
        asset: Asset,
    ) -> std::result::Result<String, AssetError> {
        let field = asset.field;
        let start = Instant::now();

        let result = self.uploader.upload(field, asset.data).await;
        telemetry::record_upload(field, result.is_ok(), start.elapsed());

        if let Err(err) =
            self.records.apply_asset_result(record_id, field, &result).await
        {
            tracing::error!(%record_id, %field, error = %err, "asset result not saved");

            return match result {
                Ok(_) => Err(AssetError::Upload {
                    field,
                    message: format!("uploaded but not saved: {err}"),
                }),
                Err(upload_err) => Err(upload_err),
            };
        }

        result
    }
}
