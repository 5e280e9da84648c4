use std::{convert::Infallible, sync::Arc};

use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
};
use compliance::{AcknowledgmentRecord, PolicyAcknowledgmentStats, RecordKey, TrackingOutcome};
use futures::{Stream, stream};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use crate::{
    caller::Caller,
    error::AppError,
    state::AppState,
    utils::{client_info_from_headers, validate_id},
};

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    state.store.ping().await?;

    Ok((StatusCode::OK, "ok"))
}

pub async fn view_handler(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(policy_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<TrackingOutcome>, AppError> {
    let client = client_info_from_headers(&headers);
    let outcome = state.tracker.track_view(&caller, &policy_id, &client).await?;

    Ok(Json(outcome))
}

pub async fn download_handler(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(policy_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<TrackingOutcome>, AppError> {
    let client = client_info_from_headers(&headers);
    let outcome = state.tracker.track_download(&caller, &policy_id, &client).await?;

    Ok(Json(outcome))
}

/// The caller's own record, `null` if they never touched the policy.
pub async fn record_handler(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(policy_id): Path<String>,
) -> Result<Json<Option<AcknowledgmentRecord>>, AppError> {
    validate_id(&policy_id)?;

    let record = state
        .store
        .get_record(&RecordKey::new(policy_id, caller.user_id))
        .await?;

    Ok(Json(record))
}

pub async fn policy_stats_handler(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(policy_id): Path<String>,
) -> Result<Json<PolicyAcknowledgmentStats>, AppError> {
    caller.require_admin()?;
    validate_id(&policy_id)?;

    Ok(Json(state.aggregator.policy_stats(&policy_id).await?))
}

pub async fn user_summary_handler(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(user_id): Path<String>,
) -> Result<Json<PolicyAcknowledgmentStats>, AppError> {
    validate_id(&user_id)?;

    if !caller.may_read_user(&user_id) {
        return Err(AppError::Forbidden);
    }

    Ok(Json(state.aggregator.user_summary(&user_id).await?))
}

pub async fn events_handler(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(policy_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    caller.require_admin()?;
    validate_id(&policy_id)?;

    if !state.directory.exists(&policy_id).await? {
        return Err(AppError::PolicyNotFound(policy_id));
    }

    let receiver = state.notifier.subscribe(&policy_id);

    let updates = stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(update) => {
                    let event = match Event::default().event("acknowledgment").json_data(&update) {
                        Ok(event) => event,
                        Err(e) => {
                            warn!("Failed to encode update: {e}");
                            continue;
                        }
                    };

                    return Some((Ok(event), receiver));
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event stream lagging, skipped updates");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Ok(Sse::new(updates).keep_alive(KeepAlive::default()))
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;
    use compliance::{MemoryStore, policy::MemoryPolicyDirectory};

    use super::*;
    use crate::{caller::Role, config::Config};

    async fn state() -> Arc<AppState> {
        AppState::with_backends(
            Config::default(),
            Arc::new(MemoryStore::default()),
            Arc::new(MemoryPolicyDirectory::with_policies(["passwords", "phishing"]).await),
        )
    }

    fn employee(user_id: &str) -> Caller {
        Caller {
            user_id: user_id.to_string(),
            role: Role::Employee,
        }
    }

    fn admin() -> Caller {
        Caller {
            user_id: "security-lead".to_string(),
            role: Role::Admin,
        }
    }

    fn browser() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("user-agent", HeaderValue::from_static("Mozilla/5.0"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("198.51.100.23"));

        headers
    }

    async fn view(state: &Arc<AppState>, user_id: &str, policy_id: &str) -> TrackingOutcome {
        view_handler(
            State(state.clone()),
            employee(user_id),
            Path(policy_id.to_string()),
            browser(),
        )
        .await
        .unwrap()
        .0
    }

    async fn download(state: &Arc<AppState>, user_id: &str, policy_id: &str) -> TrackingOutcome {
        download_handler(
            State(state.clone()),
            employee(user_id),
            Path(policy_id.to_string()),
            browser(),
        )
        .await
        .unwrap()
        .0
    }

    #[tokio::test]
    async fn test_new_user_views_then_downloads() {
        let state = state().await;

        let outcome = view(&state, "alice", "passwords").await;
        assert_eq!(outcome.percentage, 50);
        assert!(outcome.has_viewed);
        assert!(!outcome.has_downloaded);

        let outcome = download(&state, "alice", "passwords").await;
        assert_eq!(outcome.percentage, 100);
        assert!(outcome.is_complete);

        let Json(record) = record_handler(State(state.clone()), employee("alice"), Path("passwords".into()))
            .await
            .unwrap();
        let record = record.unwrap();
        assert_eq!(record.view_count, 1);
        assert_eq!(record.download_count, 1);
        assert_eq!(record.ip_address.as_deref(), Some("198.51.100.23"));
        assert_eq!(record.user_agent.as_deref(), Some("Mozilla/5.0"));
    }

    #[tokio::test]
    async fn test_record_absent_is_null() {
        let state = state().await;

        let Json(record) = record_handler(State(state), employee("bob"), Path("passwords".into()))
            .await
            .unwrap();
        assert!(record.is_none());
    }

    #[tokio::test]
    async fn test_policy_stats() {
        let state = state().await;

        view(&state, "alice", "passwords").await;
        download(&state, "bob", "passwords").await;

        let Json(stats) = policy_stats_handler(State(state.clone()), admin(), Path("passwords".into()))
            .await
            .unwrap();
        assert_eq!(stats.total_users, 2);
        assert_eq!(stats.avg_acknowledgment_percentage, 75);
        assert_eq!(stats.fully_acknowledged, 1);
        assert_eq!(stats.partially_acknowledged, 1);

        let Json(empty) = policy_stats_handler(State(state.clone()), admin(), Path("phishing".into()))
            .await
            .unwrap();
        assert_eq!(empty, PolicyAcknowledgmentStats::default());
    }

    #[tokio::test]
    async fn test_policy_stats_admin_only() {
        let state = state().await;

        let err = policy_stats_handler(State(state), employee("alice"), Path("passwords".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden));
    }

    #[tokio::test]
    async fn test_user_summary_permissions() {
        let state = state().await;

        view(&state, "alice", "passwords").await;
        download(&state, "alice", "phishing").await;

        let Json(own) = user_summary_handler(State(state.clone()), employee("alice"), Path("alice".into()))
            .await
            .unwrap();
        assert_eq!(own.total_users, 2);
        assert_eq!(own.avg_acknowledgment_percentage, 75);

        let Json(by_admin) = user_summary_handler(State(state.clone()), admin(), Path("alice".into()))
            .await
            .unwrap();
        assert_eq!(by_admin, own);

        let err = user_summary_handler(State(state), employee("bob"), Path("alice".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden));
    }

    #[tokio::test]
    async fn test_admin_views_do_not_count() {
        let state = state().await;

        let Json(outcome) = view_handler(
            State(state.clone()),
            admin(),
            Path("passwords".into()),
            HeaderMap::new(),
        )
        .await
        .unwrap();
        assert_eq!(outcome, TrackingOutcome::untracked());

        let Json(stats) = policy_stats_handler(State(state), admin(), Path("passwords".into()))
            .await
            .unwrap();
        assert_eq!(stats.total_users, 0);
    }

    #[tokio::test]
    async fn test_unknown_policy_events() {
        let state = state().await;

        let result = events_handler(State(state), admin(), Path("missing".into())).await;
        assert!(matches!(result, Err(AppError::PolicyNotFound(_))));
    }

    #[tokio::test]
    async fn test_health() {
        let state = state().await;

        let response = health_handler(State(state)).await.unwrap().into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
