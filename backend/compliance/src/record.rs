use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::transitions::percentage_for;

/// Composite key of a record. Unique per store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub policy_id: String,
    pub user_id: String,
}

impl RecordKey {
    pub fn new(policy_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            policy_id: policy_id.into(),
            user_id: user_id.into(),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.policy_id, self.user_id)
    }
}

/// Request metadata captured with each tracked event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Serialize only. Records are built by [`AcknowledgmentRecord::new`] or decoded from
/// storage, so the percentage always matches the flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcknowledgmentRecord {
    pub policy_id: String,
    pub user_id: String,

    pub(crate) has_viewed: bool,
    pub(crate) has_downloaded: bool,
    pub(crate) percentage: u8,

    pub first_viewed_at: Option<DateTime<Utc>>,
    pub last_viewed_at: Option<DateTime<Utc>>,
    pub downloaded_at: Option<DateTime<Utc>>,
    pub view_count: u64,
    pub download_count: u64,

    // Reserved for an explicit consent flow, never touched by view/download.
    pub manually_acknowledged: bool,
    pub acknowledged_at: Option<DateTime<Utc>>,

    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AcknowledgmentRecord {
    pub fn new(key: RecordKey, client: ClientInfo, now: DateTime<Utc>) -> Self {
        Self {
            policy_id: key.policy_id,
            user_id: key.user_id,
            has_viewed: false,
            has_downloaded: false,
            percentage: 0,
            first_viewed_at: None,
            last_viewed_at: None,
            downloaded_at: None,
            view_count: 0,
            download_count: 0,
            manually_acknowledged: false,
            acknowledged_at: None,
            ip_address: client.ip_address,
            user_agent: client.user_agent,
            created_at: now,
        }
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(&self.policy_id, &self.user_id)
    }

    pub fn has_viewed(&self) -> bool {
        self.has_viewed
    }

    pub fn has_downloaded(&self) -> bool {
        self.has_downloaded
    }

    pub fn percentage(&self) -> u8 {
        self.percentage
    }

    pub fn state(&self) -> AcknowledgmentState {
        AcknowledgmentState::from_percentage(self.percentage)
    }

    pub fn is_complete(&self) -> bool {
        self.state() == AcknowledgmentState::Complete
    }

    /// Keeps the latest client metadata. Absent values do not erase known ones.
    pub fn touch_client(&mut self, client: &ClientInfo) {
        if client.ip_address.is_some() {
            self.ip_address.clone_from(&client.ip_address);
        }
        if client.user_agent.is_some() {
            self.user_agent.clone_from(&client.user_agent);
        }
    }

    pub(crate) fn set_flags(&mut self, has_viewed: bool, has_downloaded: bool) {
        self.has_viewed = has_viewed;
        self.has_downloaded = has_downloaded;
        self.percentage = percentage_for(has_viewed, has_downloaded);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AcknowledgmentState {
    NotStarted,
    Partial,
    Complete,
}

impl AcknowledgmentState {
    pub fn from_percentage(percentage: u8) -> Self {
        match percentage {
            0 => AcknowledgmentState::NotStarted,
            100.. => AcknowledgmentState::Complete,
            _ => AcknowledgmentState::Partial,
        }
    }
}

impl fmt::Display for AcknowledgmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AcknowledgmentState::NotStarted => "not-started",
            AcknowledgmentState::Partial => "partial",
            AcknowledgmentState::Complete => "complete",
        };

        f.write_str(name)
    }
}

/// What a tracking call reports back to the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingOutcome {
    pub percentage: u8,
    pub has_viewed: bool,
    pub has_downloaded: bool,
    pub is_complete: bool,
}

impl TrackingOutcome {
    /// Returned to callers that are not tracked at all.
    pub fn untracked() -> Self {
        Self::default()
    }
}

impl From<&AcknowledgmentRecord> for TrackingOutcome {
    fn from(record: &AcknowledgmentRecord) -> Self {
        Self {
            percentage: record.percentage,
            has_viewed: record.has_viewed,
            has_downloaded: record.has_downloaded,
            is_complete: record.is_complete(),
        }
    }
}
