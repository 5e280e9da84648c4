//! # Acknowledgment Store
//!
//! Persistence seam for acknowledgment records.
//!
//! ## Contract
//!
//! - At most one record per [`RecordKey`], enforced by [`AcknowledgmentStore::insert`]
//! - `insert` fails with [`StoreError::DuplicateKey`] when the key is taken
//! - `save` overwrites the full record
//! - Scans return records sorted by the other half of the key
//!
//! Transitions live in [`crate::transitions`]; the provided methods here only glue them to
//! storage.
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::{
    error::{StoreError, StoreResult},
    record::{AcknowledgmentRecord, ClientInfo, RecordKey},
    transitions::{apply_download, apply_view},
};

#[async_trait]
pub trait AcknowledgmentStore: Send + Sync {
    async fn find(&self, key: &RecordKey) -> StoreResult<Option<AcknowledgmentRecord>>;

    async fn insert(&self, record: &AcknowledgmentRecord) -> StoreResult<()>;

    async fn save(&self, record: &AcknowledgmentRecord) -> StoreResult<()>;

    async fn records_for_policy(&self, policy_id: &str) -> StoreResult<Vec<AcknowledgmentRecord>>;

    async fn records_for_user(&self, user_id: &str) -> StoreResult<Vec<AcknowledgmentRecord>>;

    async fn ping(&self) -> StoreResult<()>;

    /// Existing record for the pair, or a fresh one persisted now.
    ///
    /// Losing an insert race to a concurrent caller is not an error: the winner's record
    /// is fetched and returned instead.
    async fn get_or_create(
        &self,
        key: &RecordKey,
        client: &ClientInfo,
        now: DateTime<Utc>,
    ) -> StoreResult<AcknowledgmentRecord> {
        if let Some(record) = self.find(key).await? {
            return Ok(record);
        }

        let record = AcknowledgmentRecord::new(key.clone(), client.clone(), now);

        match self.insert(&record).await {
            Ok(()) => {
                debug!(%key, "Created acknowledgment record");
                Ok(record)
            }
            Err(StoreError::DuplicateKey { .. }) => {
                debug!(%key, "Lost creation race, re-fetching");

                self.find(key).await?.ok_or_else(|| StoreError::Corrupt {
                    key: key.to_string(),
                    reason: "record missing after duplicate insert".to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn get_record(&self, key: &RecordKey) -> StoreResult<Option<AcknowledgmentRecord>> {
        self.find(key).await
    }

    async fn record_view(
        &self,
        record: AcknowledgmentRecord,
        now: DateTime<Utc>,
    ) -> StoreResult<AcknowledgmentRecord> {
        let record = apply_view(record, now);
        self.save(&record).await?;

        Ok(record)
    }

    async fn record_download(
        &self,
        record: AcknowledgmentRecord,
        now: DateTime<Utc>,
    ) -> StoreResult<AcknowledgmentRecord> {
        let record = apply_download(record, now);
        self.save(&record).await?;

        Ok(record)
    }
}

/// Process-local store. Used in tests and when no Redis is configured.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<RecordKey, AcknowledgmentRecord>>,
}

impl MemoryStore {
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    async fn scan<F>(&self, filter: F) -> Vec<AcknowledgmentRecord>
    where
        F: Fn(&RecordKey) -> bool + Send,
    {
        let records = self.records.read().await;

        let mut matched: Vec<(&RecordKey, &AcknowledgmentRecord)> =
            records.iter().filter(|(key, _)| filter(key)).collect();
        matched.sort_by(|a, b| a.0.cmp(b.0));

        matched.into_iter().map(|(_, record)| record.clone()).collect()
    }
}

#[async_trait]
impl AcknowledgmentStore for MemoryStore {
    async fn find(&self, key: &RecordKey) -> StoreResult<Option<AcknowledgmentRecord>> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn insert(&self, record: &AcknowledgmentRecord) -> StoreResult<()> {
        let mut records = self.records.write().await;
        let key = record.key();

        if records.contains_key(&key) {
            return Err(StoreError::DuplicateKey {
                policy_id: key.policy_id,
                user_id: key.user_id,
            });
        }

        records.insert(key, record.clone());
        Ok(())
    }

    async fn save(&self, record: &AcknowledgmentRecord) -> StoreResult<()> {
        self.records
            .write()
            .await
            .insert(record.key(), record.clone());

        Ok(())
    }

    async fn records_for_policy(&self, policy_id: &str) -> StoreResult<Vec<AcknowledgmentRecord>> {
        Ok(self.scan(|key| key.policy_id == policy_id).await)
    }

    async fn records_for_user(&self, user_id: &str) -> StoreResult<Vec<AcknowledgmentRecord>> {
        Ok(self.scan(|key| key.user_id == user_id).await)
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
