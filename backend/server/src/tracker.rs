//! # Tracking
//!
//! Entry point for view and download events.
//!
//! ## Flow
//!
//! 1. Validate the policy id
//! 2. Untracked callers (admins) get an all-zero outcome, nothing is written
//! 3. Unknown policies are rejected
//! 4. Get-or-create the record, apply the transition, save
//! 5. Bump the policy's raw counter and notify subscribers, both best-effort
//!
//! A failure in step 5 is logged and swallowed. Tracking is a side effect of reading a
//! policy, so the client must never be blocked on it either: front ends fire these calls
//! and show the document regardless of the outcome.
use std::{fmt, sync::Arc};

use chrono::Utc;
use compliance::{
    AcknowledgmentStore, ClientInfo, RecordKey, TrackingOutcome,
    policy::{PolicyCounter, PolicyDirectory},
};
use tracing::{debug, info, warn};

use crate::{
    caller::{Caller, is_tracked},
    error::AppError,
    notify::{AcknowledgmentUpdate, Notifier},
    utils::validate_id,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackedEvent {
    View,
    Download,
}

impl TrackedEvent {
    fn counter(self) -> PolicyCounter {
        match self {
            TrackedEvent::View => PolicyCounter::Views,
            TrackedEvent::Download => PolicyCounter::Downloads,
        }
    }
}

impl fmt::Display for TrackedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackedEvent::View => f.write_str("view"),
            TrackedEvent::Download => f.write_str("download"),
        }
    }
}

#[derive(Clone)]
pub struct Tracker {
    store: Arc<dyn AcknowledgmentStore>,
    directory: Arc<dyn PolicyDirectory>,
    notifier: Notifier,
}

impl Tracker {
    pub fn new(
        store: Arc<dyn AcknowledgmentStore>,
        directory: Arc<dyn PolicyDirectory>,
        notifier: Notifier,
    ) -> Self {
        Self {
            store,
            directory,
            notifier,
        }
    }

    pub async fn track_view(
        &self,
        caller: &Caller,
        policy_id: &str,
        client: &ClientInfo,
    ) -> Result<TrackingOutcome, AppError> {
        self.track(caller, policy_id, client, TrackedEvent::View).await
    }

    pub async fn track_download(
        &self,
        caller: &Caller,
        policy_id: &str,
        client: &ClientInfo,
    ) -> Result<TrackingOutcome, AppError> {
        self.track(caller, policy_id, client, TrackedEvent::Download).await
    }

    async fn track(
        &self,
        caller: &Caller,
        policy_id: &str,
        client: &ClientInfo,
        event: TrackedEvent,
    ) -> Result<TrackingOutcome, AppError> {
        validate_id(policy_id)?;

        if !is_tracked(caller) {
            debug!(policy_id, user_id = caller.user_id.as_str(), %event, "Caller not tracked");
            return Ok(TrackingOutcome::untracked());
        }

        if !self.directory.exists(policy_id).await? {
            return Err(AppError::PolicyNotFound(policy_id.to_string()));
        }

        let now = Utc::now();
        let key = RecordKey::new(policy_id, &caller.user_id);

        let mut record = self.store.get_or_create(&key, client, now).await?;
        record.touch_client(client);
        let before = record.state();

        let record = match event {
            TrackedEvent::View => self.store.record_view(record, now).await?,
            TrackedEvent::Download => self.store.record_download(record, now).await?,
        };

        info!(
            policy_id,
            user_id = caller.user_id.as_str(),
            %event,
            percentage = record.percentage(),
            views = record.view_count,
            downloads = record.download_count,
            "Tracked policy {event}"
        );

        if before != record.state() {
            info!(%key, from = %before, to = %record.state(), "Acknowledgment state changed");
        }

        self.bump_counter(policy_id, event).await;
        self.notifier.publish(AcknowledgmentUpdate::from(&record));

        Ok(TrackingOutcome::from(&record))
    }

    async fn bump_counter(&self, policy_id: &str, event: TrackedEvent) {
        if let Err(e) = self.directory.bump(policy_id, event.counter()).await {
            warn!(policy_id, %event, "Failed to update policy counter: {e}");
        }
    }
}
