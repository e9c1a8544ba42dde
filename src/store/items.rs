use crate::extract::ProductRecord;
use crate::http::build_client;
use crate::insight::WishlistItem;
use crate::models::ReflectionAnswers;
use crate::store::config::ROOT;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreItemsError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("rejected: {0}")]
    Rejected(String),
}

/// Payload for a captured item: the extracted record plus the owner's
/// reflection answers, with the headline fields lifted out the way the
/// backend stores them.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSubmission<'a> {
    pub session: &'a str,
    pub item_name: Option<&'a str>,
    pub price: Option<&'a str>,
    pub reason: &'a str,
    pub is_need: &'a str,
    pub is_future_approve: &'a str,
    pub metadata: &'a ProductRecord,
}

impl<'a> ItemSubmission<'a> {
    pub fn new(
        record: &'a ProductRecord,
        reflection: &'a ReflectionAnswers,
        session: &'a str,
    ) -> Self {
        Self {
            session,
            item_name: record.title.as_deref(),
            price: record.price.as_deref(),
            reason: &reflection.reason,
            is_need: &reflection.is_need,
            is_future_approve: &reflection.is_future_approve,
            metadata: record,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemReceipt {
    pub item_id: String,
}

#[derive(Debug, Deserialize)]
struct AddItemResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    item: Option<ItemRef>,
}

#[derive(Debug, Deserialize)]
struct ItemRef {
    #[serde(rename = "_id")]
    id: String,
}

pub async fn add_item_from_extension(
    submission: &ItemSubmission<'_>,
) -> Result<ItemReceipt, StoreItemsError> {
    let client = build_client();
    let url = format!("{}/ItemCollection/addItemFromExtension", *ROOT);
    let response = client
        .post(url)
        .json(submission)
        .send()
        .await
        .map_err(|err| StoreItemsError::Request(err.to_string()))?;
    if !response.status().is_success() {
        return Err(StoreItemsError::Request(format!(
            "HTTP {}",
            response.status()
        )));
    }
    let payload: AddItemResponse = response
        .json()
        .await
        .map_err(|err| StoreItemsError::Request(err.to_string()))?;
    if let Some(error) = payload.error {
        return Err(StoreItemsError::Rejected(error));
    }
    payload
        .item
        .map(|item| ItemReceipt { item_id: item.id })
        .ok_or_else(|| StoreItemsError::Rejected("add response missing item".into()))
}

#[derive(Debug, Deserialize)]
struct WishlistResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    items: Option<Vec<WishlistItem>>,
}

pub async fn fetch_wishlist(session: &str) -> Result<Vec<WishlistItem>, StoreItemsError> {
    let client = build_client();
    let url = format!("{}/ItemCollection/_getWishListItems", *ROOT);
    let response = client
        .post(url)
        .json(&json!({ "session": session }))
        .send()
        .await
        .map_err(|err| StoreItemsError::Request(err.to_string()))?;
    if !response.status().is_success() {
        return Err(StoreItemsError::Request(format!(
            "HTTP {}",
            response.status()
        )));
    }
    let payload: WishlistResponse = response
        .json()
        .await
        .map_err(|err| StoreItemsError::Request(err.to_string()))?;
    if let Some(error) = payload.error {
        return Err(StoreItemsError::Rejected(error));
    }
    Ok(payload.items.unwrap_or_default())
}
