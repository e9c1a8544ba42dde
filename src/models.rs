use crate::extract::ProductRecord;
use crate::insight::WishlistInsight;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Capture submission from the extension: the raw page plus the owner's
/// reflection answers.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CaptureRequest {
    pub html: String,
    pub page_url: String,
    pub reflection: ReflectionAnswers,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReflectionAnswers {
    pub reason: String,
    pub is_need: String,
    pub is_future_approve: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CaptureResponse {
    pub item_id: String,
    pub record: ProductRecord,
    pub stages: Vec<StageReport>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct InsightResponse {
    pub insight: WishlistInsight,
    pub prompt_chars: usize,
    pub stages: Vec<StageReport>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StageReport {
    pub name: String,
    pub elapsed_ms: u128,
    pub timestamp: DateTime<Utc>,
    pub output: Value,
}

impl StageReport {
    pub fn new(name: &str, elapsed_ms: u128, output: Value) -> Self {
        Self {
            name: name.to_string(),
            elapsed_ms,
            timestamp: Utc::now(),
            output,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}
