//! # Compliance Audit
//!
//! Operator tooling over the acknowledgment store.
//!
//! ## Commands
//!
//! - `register`: add policy ids to the directory, tracking calls for unknown ids are rejected
//! - `policy`: acknowledgment stats for one policy
//! - `user`: one employee's standing across every policy they touched
//! - `report`: stats for every registered policy, flagging those under a target average
//!
//! Reads go straight to the store like the service's own dashboards, so numbers always
//! match what the service would report at that moment.
use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use compliance::{
    PolicyAcknowledgmentStats, PolicyMetricsAggregator, policy::PolicyDirectory,
    utils::is_valid_id,
};
use indicatif::{ProgressBar, ProgressStyle};

pub struct PolicyReport {
    pub policy_id: String,
    pub stats: PolicyAcknowledgmentStats,
}

pub struct ComplianceReport {
    pub generated_at: DateTime<Utc>,
    pub policies: Vec<PolicyReport>,
}

impl ComplianceReport {
    /// Policies whose average acknowledgment is below `target`. Untouched policies count.
    pub fn lagging(&self, target: u8) -> Vec<&PolicyReport> {
        self.policies
            .iter()
            .filter(|report| report.stats.avg_acknowledgment_percentage < target)
            .collect()
    }

    /// Totals across every policy. Percentages are only ever 0, 50 or 100, so the exact
    /// mean follows from the full and partial counts.
    pub fn overall(&self) -> PolicyAcknowledgmentStats {
        let mut total = PolicyAcknowledgmentStats::default();

        for PolicyReport { stats, .. } in &self.policies {
            total.total_users += stats.total_users;
            total.viewed += stats.viewed;
            total.downloaded += stats.downloaded;
            total.fully_acknowledged += stats.fully_acknowledged;
            total.partially_acknowledged += stats.partially_acknowledged;
            total.total_views += stats.total_views;
            total.total_downloads += stats.total_downloads;
        }

        if total.total_users > 0 {
            let sum = 100 * total.fully_acknowledged + 50 * total.partially_acknowledged;
            let average = (sum + total.total_users / 2) / total.total_users;
            total.avg_acknowledgment_percentage = average.min(100) as u8;
        }

        total
    }
}

pub async fn register_policies(directory: &dyn PolicyDirectory, policy_ids: &[String]) -> Result<usize> {
    if let Some(invalid) = policy_ids.iter().find(|id| !is_valid_id(id)) {
        bail!("Invalid policy id {invalid:?}, expected [A-Za-z0-9_-] up to 64 characters");
    }

    let mut added = 0;
    for policy_id in policy_ids {
        if directory.register(policy_id).await? {
            added += 1;
        } else {
            println!("Already registered: {policy_id}");
        }
    }

    Ok(added)
}

pub async fn build_report(
    aggregator: &PolicyMetricsAggregator,
    directory: &dyn PolicyDirectory,
    show_progress: bool,
) -> Result<ComplianceReport> {
    let policy_ids = directory.policies().await?;

    let pb = if show_progress {
        ProgressBar::new(policy_ids.len() as u64)
    } else {
        ProgressBar::hidden()
    };
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        )?
        .progress_chars("=> "),
    );

    let mut policies = Vec::with_capacity(policy_ids.len());
    for policy_id in policy_ids {
        pb.set_message(format!("Aggregating {policy_id}"));

        let stats = aggregator.policy_stats(&policy_id).await?;
        policies.push(PolicyReport { policy_id, stats });

        pb.inc(1);
    }

    pb.finish_with_message("Done");

    Ok(ComplianceReport {
        generated_at: Utc::now(),
        policies,
    })
}

pub fn format_stats(label: &str, stats: &PolicyAcknowledgmentStats) -> String {
    format!(
        "{label}\n  \
         tracked users:          {}\n  \
         viewed:                 {}\n  \
         downloaded:             {}\n  \
         fully acknowledged:     {}\n  \
         partially acknowledged: {}\n  \
         average acknowledgment: {}%\n  \
         total views:            {}\n  \
         total downloads:        {}",
        stats.total_users,
        stats.viewed,
        stats.downloaded,
        stats.fully_acknowledged,
        stats.partially_acknowledged,
        stats.avg_acknowledgment_percentage,
        stats.total_views,
        stats.total_downloads,
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use compliance::{
        AcknowledgmentStore, ClientInfo, MemoryStore, RecordKey, policy::MemoryPolicyDirectory,
    };

    use super::*;

    async fn seed(store: &MemoryStore, policy: &str, user: &str, download: bool) {
        let now = Utc::now();
        let record = store
            .get_or_create(&RecordKey::new(policy, user), &ClientInfo::default(), now)
            .await
            .unwrap();

        if download {
            store.record_download(record, now).await.unwrap();
        } else {
            store.record_view(record, now).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_register_rejects_invalid_ids() {
        let directory = MemoryPolicyDirectory::default();

        let ids = vec!["passwords".to_string(), "bad id".to_string()];
        assert!(register_policies(&directory, &ids).await.is_err());
        assert!(directory.policies().await.unwrap().is_empty());

        let ids = vec!["passwords".to_string(), "passwords".to_string(), "byod".to_string()];
        assert_eq!(register_policies(&directory, &ids).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_report_covers_every_policy() {
        let store = Arc::new(MemoryStore::default());
        let directory = MemoryPolicyDirectory::with_policies(["byod", "passwords", "phishing"]).await;

        seed(&store, "passwords", "alice", true).await;
        seed(&store, "passwords", "bob", false).await;
        seed(&store, "phishing", "alice", true).await;

        let aggregator = PolicyMetricsAggregator::new(store.clone());
        let report = build_report(&aggregator, &directory, false).await.unwrap();

        let ids: Vec<&str> = report.policies.iter().map(|r| r.policy_id.as_str()).collect();
        assert_eq!(ids, ["byod", "passwords", "phishing"]);

        let lagging: Vec<&str> = report.lagging(80).iter().map(|r| r.policy_id.as_str()).collect();
        assert_eq!(lagging, ["byod", "passwords"]);

        let overall = report.overall();
        assert_eq!(overall.total_users, 3);
        assert_eq!(overall.fully_acknowledged, 2);
        assert_eq!(overall.partially_acknowledged, 1);
        // (100 + 50 + 100) / 3
        assert_eq!(overall.avg_acknowledgment_percentage, 83);
    }

    #[tokio::test]
    async fn test_overall_average_uses_every_record() {
        let store = Arc::new(MemoryStore::default());
        let directory = MemoryPolicyDirectory::with_policies(["byod", "passwords"]).await;
        let now = Utc::now();

        store
            .get_or_create(&RecordKey::new("byod", "u0"), &ClientInfo::default(), now)
            .await
            .unwrap();
        seed(&store, "passwords", "u1", true).await;
        seed(&store, "passwords", "u2", false).await;
        seed(&store, "passwords", "u3", false).await;
        for user in ["u4", "u5", "u6"] {
            store
                .get_or_create(&RecordKey::new("passwords", user), &ClientInfo::default(), now)
                .await
                .unwrap();
        }

        let aggregator = PolicyMetricsAggregator::new(store.clone());
        let report = build_report(&aggregator, &directory, false).await.unwrap();
        let overall = report.overall();

        assert_eq!(overall.total_users, 7);
        // 200 / 7 = 28.57
        assert_eq!(overall.avg_acknowledgment_percentage, 29);
    }

    #[test]
    fn test_format_stats() {
        let stats = PolicyAcknowledgmentStats {
            total_users: 2,
            avg_acknowledgment_percentage: 75,
            ..Default::default()
        };

        let text = format_stats("Policy passwords", &stats);
        assert!(text.starts_with("Policy passwords\n"));
        assert!(text.contains("tracked users:          2"));
        assert!(text.contains("average acknowledgment: 75%"));
    }
}
