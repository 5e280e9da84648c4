//! # Update Notifications
//!
//! One broadcast topic per policy. Every successful tracked event publishes the record's
//! new standing, and open dashboards or other tabs subscribe instead of polling.
//!
//! - Topics are created on first subscribe
//! - Publishing to a topic nobody listens to is a no-op and drops the topic
//! - Slow subscribers lag and skip updates, publishers never block
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use compliance::{AcknowledgmentRecord, AcknowledgmentState};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, Receiver, Sender};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcknowledgmentUpdate {
    pub policy_id: String,
    pub user_id: String,
    pub percentage: u8,
    pub state: AcknowledgmentState,
    pub view_count: u64,
    pub download_count: u64,
}

impl From<&AcknowledgmentRecord> for AcknowledgmentUpdate {
    fn from(record: &AcknowledgmentRecord) -> Self {
        Self {
            policy_id: record.policy_id.clone(),
            user_id: record.user_id.clone(),
            percentage: record.percentage(),
            state: record.state(),
            view_count: record.view_count,
            download_count: record.download_count,
        }
    }
}

#[derive(Clone)]
pub struct Notifier {
    topics: Arc<Mutex<HashMap<String, Sender<AcknowledgmentUpdate>>>>,
    capacity: usize,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: Arc::default(),
            capacity: capacity.max(1),
        }
    }

    fn topics(&self) -> MutexGuard<'_, HashMap<String, Sender<AcknowledgmentUpdate>>> {
        self.topics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self, policy_id: &str) -> Receiver<AcknowledgmentUpdate> {
        self.topics()
            .entry(policy_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Returns how many subscribers received the update.
    pub fn publish(&self, update: AcknowledgmentUpdate) -> usize {
        let mut topics = self.topics();

        let Some(sender) = topics.get(&update.policy_id) else {
            return 0;
        };

        let policy_id = update.policy_id.clone();
        match sender.send(update) {
            Ok(receivers) => receivers,
            Err(_) => {
                debug!(policy_id = policy_id.as_str(), "No subscribers left, dropping topic");
                topics.remove(&policy_id);
                0
            }
        }
    }

    pub fn topic_count(&self) -> usize {
        self.topics().len()
    }
}
