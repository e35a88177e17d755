//! Account record and its two asset slots.
mod manager;
#[cfg(test)]
pub mod memory;
mod repository;

pub use manager::*;
pub use repository::*;

use chrono::{DateTime, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

/// Value stored in an asset column until the upload resolves.
pub const PENDING: &str = "Pending";
const ID_LENGTH: usize = 12;

/// One of the two binary assets attached to an account.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum AssetField {
    Avatar,
    CoverImage,
}

impl AssetField {
    /// Form field name, also used as the JSON key.
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetField::Avatar => "avatar",
            AssetField::CoverImage => "coverImage",
        }
    }

    /// Parse a multipart field name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "avatar" => Some(AssetField::Avatar),
            "coverImage" => Some(AssetField::CoverImage),
            _ => None,
        }
    }
}

impl std::fmt::Display for AssetField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upload state of one asset.
///
/// Only `Pending -> Uploaded` and `Pending -> Failed` are legal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AssetSlot {
    Pending,
    Uploaded(String),
    Failed(String),
}

impl AssetSlot {
    /// Rebuild a slot from its URL and failure columns.
    pub fn from_columns(url: String, failure: Option<String>) -> Self {
        match failure {
            Some(reason) => AssetSlot::Failed(reason),
            None if url == PENDING => AssetSlot::Pending,
            None => AssetSlot::Uploaded(url),
        }
    }

    /// Value of the URL column. Anything not uploaded keeps the sentinel.
    pub fn url(&self) -> &str {
        match self {
            AssetSlot::Uploaded(url) => url,
            AssetSlot::Pending | AssetSlot::Failed(_) => PENDING,
        }
    }

    /// Value of the failure column.
    pub fn failure(&self) -> Option<&str> {
        match self {
            AssetSlot::Failed(reason) => Some(reason),
            AssetSlot::Pending | AssetSlot::Uploaded(_) => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, AssetSlot::Pending)
    }
}

/// Status derived from both slots.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RecordStatus {
    #[default]
    AssetsPending,
    Complete,
    PartiallyFailed,
}

/// Identity and credential of an account about to be created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub full_name: String,
    /// Argon2id PHC string.
    pub password_hash: String,
}

/// Account as saved on database.
#[derive(Clone, Debug, PartialEq)]
pub struct AccountRecord {
    pub id: String,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password: String,
    pub refresh_token: Option<String>,
    pub avatar: AssetSlot,
    pub cover_image: AssetSlot,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AccountRecord {
    /// Create a record whose asset slots are both [`AssetSlot::Pending`].
    pub fn placeholder(account: NewAccount, now: DateTime<Utc>) -> Self {
        let mut bytes = [0u8; ID_LENGTH];
        OsRng.fill_bytes(&mut bytes);

        Self {
            id: hex::encode(bytes),
            username: account.username,
            email: account.email,
            full_name: account.full_name,
            password: account.password_hash,
            refresh_token: None,
            avatar: AssetSlot::Pending,
            cover_image: AssetSlot::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn slot(&self, field: AssetField) -> &AssetSlot {
        match field {
            AssetField::Avatar => &self.avatar,
            AssetField::CoverImage => &self.cover_image,
        }
    }

    pub fn slot_mut(&mut self, field: AssetField) -> &mut AssetSlot {
        match field {
            AssetField::Avatar => &mut self.avatar,
            AssetField::CoverImage => &mut self.cover_image,
        }
    }

    /// Overall status: any failure wins over pending.
    pub fn status(&self) -> RecordStatus {
        match (&self.avatar, &self.cover_image) {
            (AssetSlot::Uploaded(_), AssetSlot::Uploaded(_)) => {
                RecordStatus::Complete
            },
            (AssetSlot::Failed(_), _) | (_, AssetSlot::Failed(_)) => {
                RecordStatus::PartiallyFailed
            },
            _ => RecordStatus::AssetsPending,
        }
    }

    /// Project the record without credential and session fields.
    pub fn sanitize(&self) -> SanitizedRecord {
        SanitizedRecord {
            id: self.id.clone(),
            username: self.username.clone(),
            email: self.email.clone(),
            full_name: self.full_name.clone(),
            avatar: self.avatar.url().to_owned(),
            cover_image: self.cover_image.url().to_owned(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            status: self.status(),
        }
    }
}

/// Record returned to callers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SanitizedRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub avatar: String,
    pub cover_image: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub status: RecordStatus,
}
