use serde::{Deserialize, Serialize};

/// A stored wishlist item as returned by the wishlist store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WishlistItem {
    #[serde(rename = "_id")]
    pub id: String,
    pub item_name: String,
    /// Display price as captured from the page, currency glyph excluded.
    pub price: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub is_need: String,
    #[serde(default)]
    pub is_future_approve: String,
}

/// Community swipe tally for one item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SwipeStats {
    pub total: u32,
    pub approval: u32,
}

/// Per-item community data. A missing entry in the feedback map and a
/// `Default` value mean the same thing: no data yet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwipeFeedback {
    #[serde(default)]
    pub stats: Option<SwipeStats>,
    #[serde(default)]
    pub comments: Vec<String>,
}

/// Parsed reply of the text-generation service, matching the response schema
/// the compiled prompt prescribes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WishlistInsight {
    pub trend_alert: String,
    pub improvement_suggestions: Vec<String>,
}
