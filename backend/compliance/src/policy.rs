//! # Policy Directory
//!
//! Which policies exist, plus raw view/download tallies kept on the policy itself.
//!
//! The tallies are a denormalized convenience for listings. They are **not** an
//! acknowledgment rate; acknowledgment records remain the only source of truth for that.
use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StoreResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyCounter {
    Views,
    Downloads,
}

impl PolicyCounter {
    pub fn field(self) -> &'static str {
        match self {
            PolicyCounter::Views => "views",
            PolicyCounter::Downloads => "downloads",
        }
    }
}

#[async_trait]
pub trait PolicyDirectory: Send + Sync {
    async fn exists(&self, policy_id: &str) -> StoreResult<bool>;

    /// Returns false if the policy was already registered.
    async fn register(&self, policy_id: &str) -> StoreResult<bool>;

    async fn policies(&self) -> StoreResult<Vec<String>>;

    /// Returns the counter value after the increment. Never registers `policy_id`.
    async fn bump(&self, policy_id: &str, counter: PolicyCounter) -> StoreResult<u64>;
}

#[derive(Default)]
pub struct MemoryPolicyDirectory {
    policies: RwLock<HashMap<String, HashMap<PolicyCounter, u64>>>,
}

impl MemoryPolicyDirectory {
    pub async fn with_policies<I, S>(policies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let directory = Self::default();
        {
            let mut map = directory.policies.write().await;
            for policy in policies {
                map.entry(policy.into()).or_default();
            }
        }

        directory
    }

    pub async fn counter(&self, policy_id: &str, counter: PolicyCounter) -> u64 {
        self.policies
            .read()
            .await
            .get(policy_id)
            .and_then(|counters| counters.get(&counter).copied())
            .unwrap_or(0)
    }
}

#[async_trait]
impl PolicyDirectory for MemoryPolicyDirectory {
    async fn exists(&self, policy_id: &str) -> StoreResult<bool> {
        Ok(self.policies.read().await.contains_key(policy_id))
    }

    async fn register(&self, policy_id: &str) -> StoreResult<bool> {
        let mut policies = self.policies.write().await;
        if policies.contains_key(policy_id) {
            return Ok(false);
        }

        policies.insert(policy_id.to_string(), HashMap::new());
        Ok(true)
    }

    async fn policies(&self) -> StoreResult<Vec<String>> {
        let mut ids: Vec<String> = self.policies.read().await.keys().cloned().collect();
        ids.sort();

        Ok(ids)
    }

    async fn bump(&self, policy_id: &str, counter: PolicyCounter) -> StoreResult<u64> {
        let mut policies = self.policies.write().await;
        let Some(counters) = policies.get_mut(policy_id) else {
            return Ok(0);
        };
        let value = counters.entry(counter).or_insert(0);
        *value += 1;

        Ok(*value)
    }
}
