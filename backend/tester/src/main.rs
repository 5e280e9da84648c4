use std::env;

use anyhow::{Result, ensure};
use compliance::{PolicyAcknowledgmentStats, TrackingOutcome};
use reqwest::{Client, RequestBuilder};

const DEFAULT_BASE_URL: &str = "http://localhost:1111";

fn as_user(request: RequestBuilder, user_id: &str, role: &str) -> RequestBuilder {
    request
        .header("x-user-id", user_id)
        .header("x-user-role", role)
        .header("user-agent", "portal-tester")
}

async fn track(client: &Client, base: &str, policy_id: &str, user_id: &str, event: &str) -> Result<TrackingOutcome> {
    let url = format!("{base}/policies/{policy_id}/{event}");
    let response = as_user(client.post(url), user_id, "employee").send().await?;

    Ok(response.error_for_status()?.json().await?)
}

/// Replays view then download for a fresh user against a running server.
/// The policy must already be registered, e.g. via `SEED_POLICIES`.
#[tokio::main]
async fn main() -> Result<()> {
    let base = env::var("TESTER_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
    let policy_id = env::var("TESTER_POLICY").unwrap_or_else(|_| "acceptable-use".to_string());
    let user_id = format!("tester-{}", std::process::id());

    let client = Client::new();

    let viewed = track(&client, &base, &policy_id, &user_id, "view").await?;
    println!("After view: {viewed:?}");
    ensure!(viewed.percentage == 50 && viewed.has_viewed, "view should land on 50%");

    let downloaded = track(&client, &base, &policy_id, &user_id, "download").await?;
    println!("After download: {downloaded:?}");
    ensure!(downloaded.is_complete, "download after view should complete");

    let stats: PolicyAcknowledgmentStats = as_user(
        client.get(format!("{base}/policies/{policy_id}/stats")),
        "tester-admin",
        "admin",
    )
    .send()
    .await?
    .error_for_status()?
    .json()
    .await?;
    println!("Policy stats: {stats:?}");
    ensure!(stats.fully_acknowledged >= 1, "stats should count the completed user");

    Ok(())
}
