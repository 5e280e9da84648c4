use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{error::StoreResult, record::AcknowledgmentRecord, store::AcknowledgmentStore};

/// Summary over a set of records. All zeros when the set is empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyAcknowledgmentStats {
    pub total_users: u64,
    pub viewed: u64,
    pub downloaded: u64,
    pub fully_acknowledged: u64,
    pub partially_acknowledged: u64,
    pub avg_acknowledgment_percentage: u8,
    pub total_views: u64,
    pub total_downloads: u64,
}

impl PolicyAcknowledgmentStats {
    pub fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a AcknowledgmentRecord>,
    {
        let mut stats = Self::default();
        let mut percentage_sum: u64 = 0;

        for record in records {
            stats.total_users += 1;
            stats.viewed += u64::from(record.has_viewed());
            stats.downloaded += u64::from(record.has_downloaded());
            stats.total_views += record.view_count;
            stats.total_downloads += record.download_count;

            match record.percentage() {
                100 => stats.fully_acknowledged += 1,
                50 => stats.partially_acknowledged += 1,
                _ => {}
            }

            percentage_sum += u64::from(record.percentage());
        }

        if stats.total_users > 0 {
            // Rounded to nearest, percentages never exceed 100 so this fits in u8.
            let average = (percentage_sum + stats.total_users / 2) / stats.total_users;
            stats.avg_acknowledgment_percentage = average.min(100) as u8;
        }

        stats
    }
}

/// Read-through statistics. Every call hits the store, nothing is cached.
#[derive(Clone)]
pub struct PolicyMetricsAggregator {
    store: Arc<dyn AcknowledgmentStore>,
}

impl PolicyMetricsAggregator {
    pub fn new(store: Arc<dyn AcknowledgmentStore>) -> Self {
        Self { store }
    }

    pub async fn policy_stats(&self, policy_id: &str) -> StoreResult<PolicyAcknowledgmentStats> {
        let records = self.store.records_for_policy(policy_id).await?;
        debug!(policy_id, records = records.len(), "Aggregating policy stats");

        Ok(PolicyAcknowledgmentStats::from_records(&records))
    }

    pub async fn user_summary(&self, user_id: &str) -> StoreResult<PolicyAcknowledgmentStats> {
        let records = self.store.records_for_user(user_id).await?;
        debug!(user_id, records = records.len(), "Aggregating user summary");

        Ok(PolicyAcknowledgmentStats::from_records(&records))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::{
        record::{ClientInfo, RecordKey},
        store::MemoryStore,
        transitions::{apply_download, apply_view},
    };

    fn record(policy: &str, user: &str) -> AcknowledgmentRecord {
        AcknowledgmentRecord::new(RecordKey::new(policy, user), ClientInfo::default(), Utc::now())
    }

    #[test]
    fn test_empty_is_zero() {
        let stats = PolicyAcknowledgmentStats::from_records(&Vec::<AcknowledgmentRecord>::new());
        assert_eq!(stats, PolicyAcknowledgmentStats::default());
    }

    #[test]
    fn test_half_and_full() {
        let now = Utc::now();
        let partial = apply_view(record("p", "a"), now);
        let full = apply_download(apply_view(record("p", "b"), now), now);

        let stats = PolicyAcknowledgmentStats::from_records([&partial, &full]);

        assert_eq!(stats.total_users, 2);
        assert_eq!(stats.avg_acknowledgment_percentage, 75);
        assert_eq!(stats.fully_acknowledged, 1);
        assert_eq!(stats.partially_acknowledged, 1);
        assert_eq!(stats.viewed, 2);
        assert_eq!(stats.downloaded, 1);
        assert_eq!(stats.total_views, 2);
        assert_eq!(stats.total_downloads, 1);
    }

    #[test]
    fn test_average_rounds_to_nearest() {
        let now = Utc::now();
        let records = [
            apply_view(record("p", "a"), now),
            record("p", "b"),
            record("p", "c"),
        ];

        // 50 / 3 = 16.67
        let stats = PolicyAcknowledgmentStats::from_records(&records);
        assert_eq!(stats.avg_acknowledgment_percentage, 17);
        assert_eq!(stats.partially_acknowledged, 1);
        assert_eq!(stats.fully_acknowledged, 0);
    }

    #[tokio::test]
    async fn test_aggregator_reads_latest_state() {
        let store = Arc::new(MemoryStore::default());
        let aggregator = PolicyMetricsAggregator::new(store.clone());
        let now = Utc::now();

        assert_eq!(
            aggregator.policy_stats("p").await.unwrap(),
            PolicyAcknowledgmentStats::default()
        );
        assert_eq!(
            aggregator.user_summary("a").await.unwrap(),
            PolicyAcknowledgmentStats::default()
        );

        let key = RecordKey::new("p", "a");
        let created = store.get_or_create(&key, &ClientInfo::default(), now).await.unwrap();
        let viewed = store.record_view(created, now).await.unwrap();

        assert_eq!(aggregator.policy_stats("p").await.unwrap().avg_acknowledgment_percentage, 50);

        store.record_download(viewed, now).await.unwrap();
        let other = RecordKey::new("q", "a");
        store.get_or_create(&other, &ClientInfo::default(), now).await.unwrap();

        let policy = aggregator.policy_stats("p").await.unwrap();
        assert_eq!(policy.fully_acknowledged, 1);
        assert_eq!(policy.avg_acknowledgment_percentage, 100);

        let user = aggregator.user_summary("a").await.unwrap();
        assert_eq!(user.total_users, 2);
        assert_eq!(user.fully_acknowledged, 1);
        assert_eq!(user.avg_acknowledgment_percentage, 50);
    }
}
