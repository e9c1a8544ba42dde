use crate::http::build_client;
use crate::insight::SwipeStats;
use crate::store::config::ROOT;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct SwipeStatsResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    total: Option<u32>,
    #[serde(default)]
    approval: Option<u32>,
}

/// Swipe tally for an item. No swipes yet is the common case, so transport
/// failures, bad statuses and `error` payloads all degrade to `None` rather
/// than surfacing an error.
pub async fn fetch_swipe_stats(session: &str, item_id: &str) -> Option<SwipeStats> {
    let client = build_client();
    let url = format!("{}/SwipeSystem/_getSwipeStats", *ROOT);
    let response = client
        .post(url)
        .json(&json!({ "session": session, "itemId": item_id }))
        .send()
        .await
        .ok()?;
    if !response.status().is_success() {
        return None;
    }
    let payload: SwipeStatsResponse = response.json().await.ok()?;
    if payload.error.is_some() {
        return None;
    }
    match (payload.total, payload.approval) {
        (Some(total), Some(approval)) => Some(SwipeStats { total, approval }),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct SwipeCommentsResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    comments: Option<Vec<String>>,
}

/// Comments other users left on an item. Failures degrade to an empty list.
pub async fn fetch_swipe_comments(owner_user_id: &str, item_id: &str) -> Vec<String> {
    let client = build_client();
    let url = format!("{}/SwipeSystem/_getSwipeComments", *ROOT);
    let response = match client
        .post(url)
        .json(&json!({ "ownerUserId": owner_user_id, "itemId": item_id }))
        .send()
        .await
    {
        Ok(response) => response,
        Err(err) => {
            debug!(target = "mull.store", item_id, error = %err, "swipe_comments_unreachable");
            return Vec::new();
        }
    };
    if !response.status().is_success() {
        return Vec::new();
    }
    match response.json::<SwipeCommentsResponse>().await {
        Ok(payload) if payload.error.is_none() => payload.comments.unwrap_or_default(),
        _ => Vec::new(),
    }
}
