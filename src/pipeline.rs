use crate::extract::{self, PageDocument, ProductRecord, page_path};
use crate::insight::{self, SwipeFeedback, WishlistInsight, WishlistItem};
use crate::llm::{GatewayConfig, InsightGateway};
use crate::models::{
    CaptureRequest, CaptureResponse, InsightResponse, ReflectionAnswers, StageReport,
};
use crate::security::SessionContext;
use crate::store;
use crate::store::items::{ItemReceipt, ItemSubmission};
use serde_json::{Value, json};
use std::{collections::HashMap, env, future::Future, sync::Arc, time::Instant};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

/// Staged executor for the two product flows: page capture and wishlist
/// insight. Each stage lands in the response transcript so clients can see
/// what happened and where time went.
#[derive(Clone)]
pub struct Pipeline {
    pub llm: Arc<InsightGateway>,
    store_network_enabled: bool,
}

impl Pipeline {
    pub fn new() -> Self {
        let llm = InsightGateway::new(GatewayConfig::from_env());
        let store_network_enabled = parse_env_bool("STORE_ENABLE_NETWORK");
        Self {
            llm: Arc::new(llm),
            store_network_enabled,
        }
    }

    pub async fn run_capture(
        &self,
        request: CaptureRequest,
        context: SessionContext,
    ) -> Result<CaptureResponse, PipelineError> {
        let mut stages = Vec::new();

        self.capture_stage(
            "classify_page",
            &mut stages,
            stages::classify_page(&request.page_url),
        )
        .await?;

        let record = self
            .capture_stage(
                "extract_metadata",
                &mut stages,
                stages::extract_metadata(&request),
            )
            .await?;

        if request.dry_run {
            return Ok(CaptureResponse {
                item_id: format!("PREVIEW-{}", Uuid::new_v4().simple()),
                record,
                stages,
            });
        }

        let receipt = self
            .capture_stage(
                "submit_item",
                &mut stages,
                stages::submit_item(
                    &record,
                    &request.reflection,
                    &context,
                    self.store_network_enabled,
                ),
            )
            .await?;

        Ok(CaptureResponse {
            item_id: receipt.item_id,
            record,
            stages,
        })
    }

    pub async fn run_insight(
        &self,
        context: SessionContext,
    ) -> Result<InsightResponse, PipelineError> {
        let mut stages = Vec::new();
        let network = self.store_network_enabled;

        let items = self
            .capture_stage(
                "fetch_wishlist",
                &mut stages,
                stages::fetch_wishlist(&context, network),
            )
            .await?;

        let feedback = self
            .capture_stage(
                "collect_feedback",
                &mut stages,
                stages::collect_feedback(&items, &context, network),
            )
            .await?;

        let prompt = self
            .capture_stage(
                "compile_prompt",
                &mut stages,
                stages::compile_prompt(&items, &feedback),
            )
            .await?;

        let insight = self
            .capture_stage(
                "generate_insight",
                &mut stages,
                stages::generate_insight(&prompt, &self.llm),
            )
            .await?;

        Ok(InsightResponse {
            insight,
            prompt_chars: prompt.len(),
            stages,
        })
    }

    async fn capture_stage<T, Fut>(
        &self,
        name: &'static str,
        stages: &mut Vec<StageReport>,
        fut: Fut,
    ) -> Result<T, PipelineError>
    where
        Fut: Future<Output = Result<StageOutcome<T>, PipelineError>>,
    {
        let started = Instant::now();
        let outcome = fut.await?;
        let elapsed_ms = started.elapsed().as_millis();
        crate::metrics::stage_elapsed(name, elapsed_ms);
        stages.push(StageReport::new(name, elapsed_ms, outcome.output));
        Ok(outcome.value)
    }
}

#[derive(Debug, Error)]
#[error("stage `{stage}` failed: {message}")]
pub struct PipelineError {
    stage: &'static str,
    message: String,
    kind: PipelineErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineErrorKind {
    InvalidInput,
    Internal,
}

impl PipelineError {
    pub fn invalid_input(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind: PipelineErrorKind::InvalidInput,
        }
    }

    pub fn internal(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind: PipelineErrorKind::Internal,
        }
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn kind(&self) -> PipelineErrorKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.message
    }
}

#[derive(Debug)]
pub struct StageOutcome<T> {
    pub value: T,
    pub output: Value,
}

impl<T> StageOutcome<T> {
    fn new(value: T, output: Value) -> Self {
        Self { value, output }
    }
}

pub mod stages {
    use super::*;

    /// Precondition gate for the capture flow: the page must carry a
    /// product-detail path marker. Extraction is never attempted off product
    /// pages.
    pub async fn classify_page(address: &str) -> Result<StageOutcome<()>, PipelineError> {
        let path = page_path(address);
        if !extract::is_product_page(&path) {
            return Err(PipelineError::invalid_input(
                "classify_page",
                "not_a_product_page",
            ));
        }
        Ok(StageOutcome::new(
            (),
            json!({
                "path": path,
                "is_product_page": true,
            }),
        ))
    }

    pub async fn extract_metadata(
        request: &CaptureRequest,
    ) -> Result<StageOutcome<ProductRecord>, PipelineError> {
        if request.html.trim().is_empty() {
            return Err(PipelineError::invalid_input(
                "extract_metadata",
                "empty_document",
            ));
        }

        // The parsed DOM stays local to this block; extraction is fully
        // synchronous.
        let record = {
            let doc = PageDocument::parse(&request.html, &request.page_url);
            extract::extract(&doc)
        };

        let output = json!({
            "title": &record.title,
            "price": &record.price,
            "asin": &record.asin,
            "image_count": record.images.len(),
            "detail_count": record.product_details.len(),
            "breadcrumb_count": record.breadcrumbs.len(),
        });
        Ok(StageOutcome::new(record, output))
    }

    pub async fn submit_item(
        record: &ProductRecord,
        reflection: &ReflectionAnswers,
        context: &SessionContext,
        network_enabled: bool,
    ) -> Result<StageOutcome<ItemReceipt>, PipelineError> {
        let receipt = if network_enabled {
            let submission = ItemSubmission::new(record, reflection, &context.session_token);
            store::items::add_item_from_extension(&submission)
                .await
                .map_err(|err| PipelineError::internal("submit_item", err.to_string()))?
        } else {
            ItemReceipt {
                item_id: format!("LOCAL-{}", Uuid::new_v4().simple()),
            }
        };

        Ok(StageOutcome::new(
            receipt.clone(),
            json!({
                "item_id": receipt.item_id,
                "owner": context.user_id,
                "store_network": network_enabled,
            }),
        ))
    }

    pub async fn fetch_wishlist(
        context: &SessionContext,
        network_enabled: bool,
    ) -> Result<StageOutcome<Vec<WishlistItem>>, PipelineError> {
        let items = if network_enabled {
            store::items::fetch_wishlist(&context.session_token)
                .await
                .map_err(|err| PipelineError::internal("fetch_wishlist", err.to_string()))?
        } else {
            Vec::new()
        };

        Ok(StageOutcome::new(
            items.clone(),
            json!({
                "count": items.len(),
                "store_network": network_enabled,
            }),
        ))
    }

    /// One stats + one comments lookup per item. Both degrade to "no data"
    /// on their own; an item simply loses its community lines in the prompt.
    pub async fn collect_feedback(
        items: &[WishlistItem],
        context: &SessionContext,
        network_enabled: bool,
    ) -> Result<StageOutcome<HashMap<String, SwipeFeedback>>, PipelineError> {
        let mut feedback = HashMap::new();
        if network_enabled {
            for item in items {
                let stats =
                    store::swipes::fetch_swipe_stats(&context.session_token, &item.id).await;
                let comments =
                    store::swipes::fetch_swipe_comments(&context.user_id, &item.id).await;
                feedback.insert(item.id.clone(), SwipeFeedback { stats, comments });
            }
        }

        let with_stats = feedback
            .values()
            .filter(|entry| entry.stats.is_some())
            .count();
        let with_comments = feedback
            .values()
            .filter(|entry| !entry.comments.is_empty())
            .count();
        Ok(StageOutcome::new(
            feedback,
            json!({
                "items": items.len(),
                "with_stats": with_stats,
                "with_comments": with_comments,
            }),
        ))
    }

    pub async fn compile_prompt(
        items: &[WishlistItem],
        feedback: &HashMap<String, SwipeFeedback>,
    ) -> Result<StageOutcome<String>, PipelineError> {
        let prompt = insight::compile(items, feedback);
        let output = json!({
            "items": items.len(),
            "chars": prompt.len(),
        });
        Ok(StageOutcome::new(prompt, output))
    }

    /// Submit the compiled prompt to the gateway and parse the prescribed
    /// JSON reply. An unreachable gateway degrades to the encouragement
    /// payload; a reply that defies the schema is an internal error.
    pub async fn generate_insight(
        prompt: &str,
        gateway: &InsightGateway,
    ) -> Result<StageOutcome<WishlistInsight>, PipelineError> {
        let reply = match gateway.generate(prompt).await {
            Ok(text) => text,
            Err(err) => {
                warn!(target = "mull.llm", error = %err, "insight_generation_fallback");
                crate::metrics::inc_insight_fallback();
                let fallback = insight::encouragement_insight();
                return Ok(StageOutcome::new(
                    fallback,
                    json!({ "source": "fallback" }),
                ));
            }
        };

        let parsed: WishlistInsight = serde_json::from_str(&reply).map_err(|_| {
            PipelineError::internal("generate_insight", "unparseable_insight_reply")
        })?;

        Ok(StageOutcome::new(
            parsed.clone(),
            json!({
                "source": "gateway",
                "suggestions": parsed.improvement_suggestions.len(),
            }),
        ))
    }
}

fn parse_env_bool(key: &str) -> bool {
    match env::var(key) {
        Ok(value) => matches!(
            value.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_context() -> SessionContext {
        SessionContext {
            user_id: "demo-user".to_string(),
            session_token: "demo-session".to_string(),
        }
    }

    fn sample_capture() -> CaptureRequest {
        CaptureRequest {
            html: concat!(
                r##"<span id="productTitle">Warm Glow Desk Lamp</span>"##,
                r##"<span class="a-price-symbol">$</span>"##,
                r##"<span class="a-price-whole">29.</span>"##,
                r##"<span class="a-price-fraction">99</span>"##,
            )
            .to_string(),
            page_url: "https://www.example-retail.com/dp/B0TESTASIN".to_string(),
            reflection: ReflectionAnswers {
                reason: "needed light".to_string(),
                is_need: "need".to_string(),
                is_future_approve: "yes".to_string(),
            },
            dry_run: false,
        }
    }

    #[tokio::test]
    async fn capture_runs_the_full_stage_sequence() {
        let pipeline = Pipeline::new();
        let resp = pipeline
            .run_capture(sample_capture(), sample_context())
            .await
            .expect("capture run");
        let names: Vec<String> = resp.stages.iter().map(|s| s.name.clone()).collect();
        assert_eq!(
            names,
            vec!["classify_page", "extract_metadata", "submit_item"]
        );
        assert!(resp.item_id.starts_with("LOCAL-"));
        assert_eq!(resp.record.title.as_deref(), Some("Warm Glow Desk Lamp"));
        assert_eq!(resp.record.price.as_deref(), Some("29.99"));
        assert!(resp.record.is_product_page);
    }

    #[tokio::test]
    async fn capture_dry_run_stops_before_submission() {
        let pipeline = Pipeline::new();
        let mut request = sample_capture();
        request.dry_run = true;
        let resp = pipeline
            .run_capture(request, sample_context())
            .await
            .expect("capture run");
        let names: Vec<String> = resp.stages.iter().map(|s| s.name.clone()).collect();
        assert_eq!(names, vec!["classify_page", "extract_metadata"]);
        assert!(resp.item_id.starts_with("PREVIEW-"));
    }

    #[tokio::test]
    async fn capture_rejects_non_product_pages() {
        let pipeline = Pipeline::new();
        let mut request = sample_capture();
        request.page_url = "https://www.example-retail.com/s?k=lamp".to_string();
        let err = pipeline
            .run_capture(request, sample_context())
            .await
            .expect_err("should reject");
        assert_eq!(err.stage(), "classify_page");
        assert_eq!(err.kind(), PipelineErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn capture_rejects_an_empty_document() {
        let pipeline = Pipeline::new();
        let mut request = sample_capture();
        request.html = "   ".to_string();
        let err = pipeline
            .run_capture(request, sample_context())
            .await
            .expect_err("should reject");
        assert_eq!(err.stage(), "extract_metadata");
        assert_eq!(err.kind(), PipelineErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn insight_runs_offline_with_the_fallback_payload() {
        let pipeline = Pipeline::new();
        let resp = pipeline
            .run_insight(sample_context())
            .await
            .expect("insight run");
        let names: Vec<String> = resp.stages.iter().map(|s| s.name.clone()).collect();
        assert_eq!(
            names,
            vec![
                "fetch_wishlist",
                "collect_feedback",
                "compile_prompt",
                "generate_insight"
            ]
        );
        // Offline the wishlist is empty and the gateway is unreachable, so
        // the fallback payload comes back.
        assert_eq!(resp.insight, insight::encouragement_insight());
        assert!(resp.prompt_chars > 0);
    }

    #[tokio::test]
    async fn compile_prompt_stage_reports_sizes() {
        let out = stages::compile_prompt(&[], &HashMap::new())
            .await
            .expect("compile");
        assert!(out.value.contains("WISHLIST ITEMS (0 total):"));
        assert_eq!(out.output["items"], serde_json::json!(0));
    }
}
