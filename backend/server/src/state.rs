use std::sync::Arc;

use compliance::{
    AcknowledgmentStore, MemoryStore, PolicyMetricsAggregator, StoreResult,
    database::{RedisPolicyDirectory, RedisStore, init_redis},
    policy::{MemoryPolicyDirectory, PolicyDirectory},
    utils::is_valid_id,
};
use tracing::{info, warn};

use super::{config::Config, notify::Notifier, tracker::Tracker};

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn AcknowledgmentStore>,
    pub directory: Arc<dyn PolicyDirectory>,
    pub tracker: Tracker,
    pub aggregator: PolicyMetricsAggregator,
    pub notifier: Notifier,
}

impl AppState {
    pub async fn new(config: Config) -> StoreResult<Arc<Self>> {
        let (store, directory): (Arc<dyn AcknowledgmentStore>, Arc<dyn PolicyDirectory>) =
            match &config.redis_url {
                Some(redis_url) => {
                    let redis_connection = init_redis(redis_url).await?;
                    info!("Connected to Redis");

                    (
                        Arc::new(RedisStore::new(redis_connection.clone())),
                        Arc::new(RedisPolicyDirectory::new(redis_connection)),
                    )
                }
                None => {
                    warn!("REDIS_URL not set, acknowledgments are kept in memory only");

                    (
                        Arc::new(MemoryStore::default()),
                        Arc::new(MemoryPolicyDirectory::default()),
                    )
                }
            };

        for policy_id in &config.seed_policies {
            if !is_valid_id(policy_id) {
                warn!(policy_id = policy_id.as_str(), "Skipping invalid seed policy id");
                continue;
            }

            if directory.register(policy_id).await? {
                info!(policy_id = policy_id.as_str(), "Registered seed policy");
            }
        }

        Ok(Self::with_backends(config, store, directory))
    }

    pub fn with_backends(
        config: Config,
        store: Arc<dyn AcknowledgmentStore>,
        directory: Arc<dyn PolicyDirectory>,
    ) -> Arc<Self> {
        let notifier = Notifier::new(config.event_buffer);
        let tracker = Tracker::new(store.clone(), directory.clone(), notifier.clone());
        let aggregator = PolicyMetricsAggregator::new(store.clone());

        Arc::new(Self {
            config,
            store,
            directory,
            tracker,
            aggregator,
            notifier,
        })
    }
}
