//! # Redis
//!
//! RAM database for acknowledgment records and the policy directory.
//!
//! ## Requirements
//!
//! - O(1) lookup of a single (policy, user) record
//! - Scans per policy and per user for dashboards
//! - Uniqueness of the (policy, user) pair
//!
//! ## Implementation
//!
//! - One hash per record: `ack_record:{policy}:{user}`
//! - Index sets: `ack_by_policy:{policy}` holds user ids, `ack_by_user:{user}` holds policy ids
//! - Creation runs as a Lua script, so existence check, hash write and index updates
//!   are atomic. A taken key reports 0 and surfaces as [`StoreError::DuplicateKey`]
//! - Saves write every field with one `HSET`
//! - Timestamps are RFC 3339, absent ones are empty strings
//! - Policies: set `policies`, tallies in hash `policy_metrics:{policy}`
//!
//! Ids are validated upstream to `[A-Za-z0-9_-]`, so `:` never appears inside a segment.
use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{
    AsyncCommands, Client, Script,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use tracing::{debug, warn};

use crate::{
    error::{StoreError, StoreResult},
    policy::{PolicyCounter, PolicyDirectory},
    record::{AcknowledgmentRecord, RecordKey},
    store::AcknowledgmentStore,
    transitions::percentage_for,
};

pub const RECORD_PREFIX: &str = "ack_record";
pub const BY_POLICY_PREFIX: &str = "ack_by_policy";
pub const BY_USER_PREFIX: &str = "ack_by_user";
pub const POLICIES_KEY: &str = "policies";
pub const POLICY_METRICS_PREFIX: &str = "policy_metrics";

const INSERT_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return 0
end
redis.call('HSET', KEYS[1], unpack(ARGV, 3))
redis.call('SADD', KEYS[2], ARGV[1])
redis.call('SADD', KEYS[3], ARGV[2])
return 1
"#;

pub async fn init_redis(redis_url: &str) -> StoreResult<ConnectionManager> {
    let config = ConnectionManagerConfig::new()
        .set_number_of_retries(1)
        .set_connection_timeout(Duration::from_millis(100));

    let client = Client::open(redis_url)?;
    let connection_manager = client.get_connection_manager_with_config(config).await?;

    Ok(connection_manager)
}

pub fn record_key(key: &RecordKey) -> String {
    format!("{RECORD_PREFIX}:{}:{}", key.policy_id, key.user_id)
}

fn by_policy_key(policy_id: &str) -> String {
    format!("{BY_POLICY_PREFIX}:{policy_id}")
}

fn by_user_key(user_id: &str) -> String {
    format!("{BY_USER_PREFIX}:{user_id}")
}

fn policy_metrics_key(policy_id: &str) -> String {
    format!("{POLICY_METRICS_PREFIX}:{policy_id}")
}

pub struct RedisStore {
    redis_connection: ConnectionManager,
    insert_script: Script,
}

impl RedisStore {
    pub fn new(redis_connection: ConnectionManager) -> Self {
        Self {
            redis_connection,
            insert_script: Script::new(INSERT_SCRIPT),
        }
    }

    async fn load_many(&self, keys: Vec<RecordKey>) -> StoreResult<Vec<AcknowledgmentRecord>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for key in &keys {
            pipe.hgetall(record_key(key));
        }

        let mut connection = self.redis_connection.clone();
        let hashes: Vec<HashMap<String, String>> = pipe.query_async(&mut connection).await?;

        let mut records = Vec::with_capacity(keys.len());
        for (key, fields) in keys.iter().zip(hashes) {
            match decode_record(key, &fields)? {
                Some(record) => records.push(record),
                None => debug!(%key, "Index points at missing record, skipping"),
            }
        }

        Ok(records)
    }
}

#[async_trait]
impl AcknowledgmentStore for RedisStore {
    async fn find(&self, key: &RecordKey) -> StoreResult<Option<AcknowledgmentRecord>> {
        let mut connection = self.redis_connection.clone();
        let fields: HashMap<String, String> = connection.hgetall(record_key(key)).await?;

        decode_record(key, &fields)
    }

    async fn insert(&self, record: &AcknowledgmentRecord) -> StoreResult<()> {
        let key = record.key();
        let flattened: Vec<String> = encode_record(record)
            .into_iter()
            .flat_map(|(field, value)| [field.to_string(), value])
            .collect();

        let mut connection = self.redis_connection.clone();
        let inserted: i64 = self
            .insert_script
            .key(record_key(&key))
            .key(by_policy_key(&key.policy_id))
            .key(by_user_key(&key.user_id))
            .arg(&key.user_id)
            .arg(&key.policy_id)
            .arg(flattened)
            .invoke_async(&mut connection)
            .await?;

        if inserted == 0 {
            return Err(StoreError::DuplicateKey {
                policy_id: key.policy_id,
                user_id: key.user_id,
            });
        }

        Ok(())
    }

    async fn save(&self, record: &AcknowledgmentRecord) -> StoreResult<()> {
        let mut connection = self.redis_connection.clone();
        let _: () = connection
            .hset_multiple(record_key(&record.key()), &encode_record(record))
            .await?;

        Ok(())
    }

    async fn records_for_policy(&self, policy_id: &str) -> StoreResult<Vec<AcknowledgmentRecord>> {
        let mut connection = self.redis_connection.clone();
        let mut user_ids: Vec<String> = connection.smembers(by_policy_key(policy_id)).await?;
        user_ids.sort();

        let keys = user_ids
            .into_iter()
            .map(|user_id| RecordKey::new(policy_id, user_id))
            .collect();

        self.load_many(keys).await
    }

    async fn records_for_user(&self, user_id: &str) -> StoreResult<Vec<AcknowledgmentRecord>> {
        let mut connection = self.redis_connection.clone();
        let mut policy_ids: Vec<String> = connection.smembers(by_user_key(user_id)).await?;
        policy_ids.sort();

        let keys = policy_ids
            .into_iter()
            .map(|policy_id| RecordKey::new(policy_id, user_id))
            .collect();

        self.load_many(keys).await
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut connection = self.redis_connection.clone();
        let _: String = redis::cmd("PING").query_async(&mut connection).await?;

        Ok(())
    }
}

pub struct RedisPolicyDirectory {
    redis_connection: ConnectionManager,
}

impl RedisPolicyDirectory {
    pub fn new(redis_connection: ConnectionManager) -> Self {
        Self { redis_connection }
    }
}

#[async_trait]
impl PolicyDirectory for RedisPolicyDirectory {
    async fn exists(&self, policy_id: &str) -> StoreResult<bool> {
        let mut connection = self.redis_connection.clone();
        let exists: bool = connection.sismember(POLICIES_KEY, policy_id).await?;

        Ok(exists)
    }

    async fn register(&self, policy_id: &str) -> StoreResult<bool> {
        let mut connection = self.redis_connection.clone();
        let added: u64 = connection.sadd(POLICIES_KEY, policy_id).await?;

        Ok(added == 1)
    }

    async fn policies(&self) -> StoreResult<Vec<String>> {
        let mut connection = self.redis_connection.clone();
        let mut ids: Vec<String> = connection.smembers(POLICIES_KEY).await?;
        ids.sort();

        Ok(ids)
    }

    async fn bump(&self, policy_id: &str, counter: PolicyCounter) -> StoreResult<u64> {
        let mut connection = self.redis_connection.clone();
        let value: u64 = connection
            .hincr(policy_metrics_key(policy_id), counter.field(), 1)
            .await?;

        Ok(value)
    }
}

const F_POLICY_ID: &str = "policy_id";
const F_USER_ID: &str = "user_id";
const F_HAS_VIEWED: &str = "has_viewed";
const F_HAS_DOWNLOADED: &str = "has_downloaded";
const F_PERCENTAGE: &str = "percentage";
const F_FIRST_VIEWED_AT: &str = "first_viewed_at";
const F_LAST_VIEWED_AT: &str = "last_viewed_at";
const F_DOWNLOADED_AT: &str = "downloaded_at";
const F_VIEW_COUNT: &str = "view_count";
const F_DOWNLOAD_COUNT: &str = "download_count";
const F_MANUALLY_ACKNOWLEDGED: &str = "manually_acknowledged";
const F_ACKNOWLEDGED_AT: &str = "acknowledged_at";
const F_IP_ADDRESS: &str = "ip_address";
const F_USER_AGENT: &str = "user_agent";
const F_CREATED_AT: &str = "created_at";

fn encode_bool(value: bool) -> String {
    if value { "1" } else { "0" }.to_string()
}

fn encode_time(value: Option<DateTime<Utc>>) -> String {
    value.map(|t| t.to_rfc3339()).unwrap_or_default()
}

pub fn encode_record(record: &AcknowledgmentRecord) -> Vec<(&'static str, String)> {
    vec![
        (F_POLICY_ID, record.policy_id.clone()),
        (F_USER_ID, record.user_id.clone()),
        (F_HAS_VIEWED, encode_bool(record.has_viewed)),
        (F_HAS_DOWNLOADED, encode_bool(record.has_downloaded)),
        (F_PERCENTAGE, record.percentage.to_string()),
        (F_FIRST_VIEWED_AT, encode_time(record.first_viewed_at)),
        (F_LAST_VIEWED_AT, encode_time(record.last_viewed_at)),
        (F_DOWNLOADED_AT, encode_time(record.downloaded_at)),
        (F_VIEW_COUNT, record.view_count.to_string()),
        (F_DOWNLOAD_COUNT, record.download_count.to_string()),
        (F_MANUALLY_ACKNOWLEDGED, encode_bool(record.manually_acknowledged)),
        (F_ACKNOWLEDGED_AT, encode_time(record.acknowledged_at)),
        (F_IP_ADDRESS, record.ip_address.clone().unwrap_or_default()),
        (F_USER_AGENT, record.user_agent.clone().unwrap_or_default()),
        (F_CREATED_AT, encode_time(Some(record.created_at))),
    ]
}

struct Fields<'a> {
    key: &'a RecordKey,
    fields: &'a HashMap<String, String>,
}

impl Fields<'_> {
    fn corrupt(&self, reason: String) -> StoreError {
        StoreError::Corrupt {
            key: self.key.to_string(),
            reason,
        }
    }

    fn raw(&self, name: &str) -> StoreResult<&str> {
        self.fields
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| self.corrupt(format!("missing field {name}")))
    }

    fn optional_string(&self, name: &str) -> Option<String> {
        self.fields
            .get(name)
            .filter(|value| !value.is_empty())
            .cloned()
    }

    fn parse_bool(&self, name: &str) -> StoreResult<bool> {
        match self.raw(name)? {
            "1" => Ok(true),
            "0" => Ok(false),
            other => Err(self.corrupt(format!("invalid {name}: {other}"))),
        }
    }

    fn parse_u64(&self, name: &str) -> StoreResult<u64> {
        let raw = self.raw(name)?;
        raw.parse()
            .map_err(|e| self.corrupt(format!("invalid {name} {raw}: {e}")))
    }

    fn parse_time(&self, name: &str) -> StoreResult<Option<DateTime<Utc>>> {
        match self.fields.get(name).map(String::as_str) {
            None | Some("") => Ok(None),
            Some(raw) => DateTime::parse_from_rfc3339(raw)
                .map(|t| Some(t.with_timezone(&Utc)))
                .map_err(|e| self.corrupt(format!("invalid {name} {raw}: {e}"))),
        }
    }
}

/// `Ok(None)` for an empty hash, which is what Redis returns for a missing key.
pub fn decode_record(
    key: &RecordKey,
    fields: &HashMap<String, String>,
) -> StoreResult<Option<AcknowledgmentRecord>> {
    if fields.is_empty() {
        return Ok(None);
    }

    let f = Fields { key, fields };

    let has_viewed = f.parse_bool(F_HAS_VIEWED)?;
    let has_downloaded = f.parse_bool(F_HAS_DOWNLOADED)?;
    let percentage = percentage_for(has_viewed, has_downloaded);

    let stored = f.parse_u64(F_PERCENTAGE)?;
    if stored != u64::from(percentage) {
        warn!(%key, stored, percentage, "Stored percentage disagrees with flags, using flags");
    }

    let created_at = f
        .parse_time(F_CREATED_AT)?
        .ok_or_else(|| f.corrupt(format!("missing field {F_CREATED_AT}")))?;

    Ok(Some(AcknowledgmentRecord {
        policy_id: key.policy_id.clone(),
        user_id: key.user_id.clone(),
        has_viewed,
        has_downloaded,
        percentage,
        first_viewed_at: f.parse_time(F_FIRST_VIEWED_AT)?,
        last_viewed_at: f.parse_time(F_LAST_VIEWED_AT)?,
        downloaded_at: f.parse_time(F_DOWNLOADED_AT)?,
        view_count: f.parse_u64(F_VIEW_COUNT)?,
        download_count: f.parse_u64(F_DOWNLOAD_COUNT)?,
        manually_acknowledged: f.parse_bool(F_MANUALLY_ACKNOWLEDGED)?,
        acknowledged_at: f.parse_time(F_ACKNOWLEDGED_AT)?,
        ip_address: f.optional_string(F_IP_ADDRESS),
        user_agent: f.optional_string(F_USER_AGENT),
        created_at,
    }))
}
