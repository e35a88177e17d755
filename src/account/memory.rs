//! In-memory [`AccountRepository`] for tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::account::{AccountRecord, AccountRepository, AssetField, AssetSlot};
use crate::error::{Result, ServerError};

#[derive(Default)]
pub struct MemoryAccountRepository {
    records: Mutex<HashMap<String, AccountRecord>>,
    slot_writes: AtomicUsize,
}

impl MemoryAccountRepository {
    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn slot_writes(&self) -> usize {
        self.slot_writes.load(Ordering::SeqCst)
    }

    pub fn find_by_username(&self, username: &str) -> Option<AccountRecord> {
        self.records
            .lock()
            .unwrap()
            .values()
            .find(|record| record.username == username)
            .cloned()
    }
}

#[async_trait]
impl AccountRepository for MemoryAccountRepository {
    async fn find_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> Result<Option<AccountRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .find(|record| record.username == username || record.email == email)
            .cloned())
    }

    async fn create(&self, record: &AccountRecord) -> Result<()> {
        let mut records = self.records.lock().unwrap();
        if records.values().any(|existing| {
            existing.username == record.username
                || existing.email == record.email
        }) {
            return Err(ServerError::Conflict);
        }

        records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<AccountRecord>> {
        Ok(self.records.lock().unwrap().get(id).cloned())
    }

    async fn set_slot(
        &self,
        id: &str,
        field: AssetField,
        slot: &AssetSlot,
    ) -> Result<()> {
        if !self.records.lock().unwrap().contains_key(id) {
            return Err(ServerError::NotFound);
        }

        // the sibling slot may settle here, so only `field` is written back.
        tokio::task::yield_now().await;

        let mut records = self.records.lock().unwrap();
        let record = records.get_mut(id).ok_or(ServerError::NotFound)?;

        let current = record.slot_mut(field);
        if !current.is_pending() {
            return Err(ServerError::SlotSettled {
                record_id: id.to_owned(),
                field,
            });
        }
        *current = slot.clone();
        record.updated_at = chrono::Utc::now();

        self.slot_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
