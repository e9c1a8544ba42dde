mod extract;
mod http;
mod idempotency;
mod insight;
mod jobs;
mod llm;
mod metrics;
mod models;
mod pipeline;
mod security;
mod store;

use axum::{
    Json, Router,
    extract::{Extension, Path, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use models::{ApiError, CaptureRequest, CaptureResponse, InsightResponse};
use pipeline::{Pipeline, PipelineError, PipelineErrorKind};
use security::{AuthState, SessionContext, require_session_auth};
use serde_json::json;
use std::{collections::HashMap, net::SocketAddr, sync::Arc};
use tokio::sync::Mutex;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(target = "mull.api", "server crashed: {err}");
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let auth_state = AuthState::from_env();
    let pipeline = Pipeline::new();
    let (queue, _worker) = jobs::JobQueue::spawn(pipeline.clone());
    let openapi_raw = include_str!("../docs/openapi.yaml");
    let openapi: serde_json::Value =
        serde_yaml::from_str(openapi_raw).unwrap_or(serde_json::json!({"openapi":"3.0.3"}));
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("prom recorder");
    let redis = std::env::var("REDIS_URL")
        .ok()
        .and_then(|u| redis::Client::open(u).ok());
    let state = AppState {
        pipeline,
        queue,
        openapi: Arc::new(openapi),
        idempotency: Arc::new(Mutex::new(HashMap::new())),
        prometheus_handle,
        redis,
    };

    let cors = CorsLayer::new()
        .allow_headers(Any)
        .allow_methods(Any)
        .allow_origin(Any);

    let protected = Router::new()
        .route("/capture", post(capture))
        .route("/capture/preview", post(capture_preview))
        .route("/insight", post(insight_now))
        .route("/auth/logout", post(auth_logout))
        .nest(
            "/stages",
            Router::new()
                .route("/extract_metadata", post(stage_extract_metadata))
                .route("/compile_prompt", post(stage_compile_prompt)),
        )
        .nest(
            "/jobs",
            Router::new()
                .route("/insight", post(enqueue_insight_job))
                .route("/{id}", get(get_job_status)),
        )
        .route_layer(middleware::from_fn_with_state(
            auth_state,
            require_session_auth,
        ));

    let app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/openapi.json", get(openapi_json))
        .route("/docs", get(swagger_ui))
        .route("/auth/login", post(auth_login))
        .merge(protected)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::extract::DefaultBodyLimit::max(body_limit_from_env()));

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(8000);
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    info!(target = "mull.api", "listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

#[derive(Clone)]
struct AppState {
    pipeline: Pipeline,
    queue: jobs::JobQueue,
    openapi: Arc<serde_json::Value>,
    idempotency: Arc<Mutex<HashMap<String, CaptureResponse>>>,
    prometheus_handle: PrometheusHandle,
    redis: Option<redis::Client>,
}

/// Health and readiness check.
///
/// - Method: `GET`
/// - Path: `/health`
/// - Auth: none
///
/// Returns a small JSON payload with `status` and `service`.
async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "mull-api-rs",
    }))
}

async fn openapi_json(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    if let Ok(key) = std::env::var("OPENAPI_KEY") {
        let presented = headers
            .get("X-Docs-Key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if presented != key {
            return Err(AppError::Pipeline(PipelineError::invalid_input(
                "docs",
                "unauthorized",
            )));
        }
    }
    Ok(Json((*state.openapi).clone()))
}

async fn swagger_ui() -> axum::http::Response<String> {
    let html = r#"<!doctype html>
<html>
<head>
  <meta charset='utf-8'/>
  <title>Mull API Docs</title>
  <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css" />
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
  <script>
    window.onload = () => {
      window.ui = SwaggerUIBundle({ url: '/openapi.json', dom_id: '#swagger-ui' });
    };
  </script>
</body>
</html>"#;
    axum::http::Response::builder()
        .header("Content-Type", "text/html; charset=utf-8")
        .body(html.to_string())
        .unwrap()
}

fn body_limit_from_env() -> usize {
    // Capture submissions carry whole rendered product pages.
    std::env::var("REQUEST_MAX_BYTES")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(4 * 1024 * 1024)
}

async fn metrics_endpoint(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
) -> axum::http::Response<String> {
    if let Ok(secret) = std::env::var("METRICS_KEY") {
        let presented = headers
            .get("X-Metrics-Key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if presented != secret {
            return axum::http::Response::builder()
                .status(axum::http::StatusCode::UNAUTHORIZED)
                .body("unauthorized".into())
                .unwrap();
        }
    }
    let body = state.prometheus_handle.render();
    axum::http::Response::builder()
        .header("Content-Type", "text/plain; version=0.0.4")
        .body(body)
        .unwrap()
}

/// Capture a product page into the caller's wishlist.
///
/// - Method: `POST`
/// - Path: `/capture`
/// - Auth: `Authorization: Bearer <session>` or `X-Mull-Session: <session>`
/// - Body: `CaptureRequest` (raw page HTML + address + reflection answers)
/// - Response: `CaptureResponse` (receipt + extracted record + stage transcript)
async fn capture(
    State(state): State<AppState>,
    Extension(context): Extension<SessionContext>,
    headers: axum::http::HeaderMap,
    Json(payload): Json<CaptureRequest>,
) -> Result<Json<CaptureResponse>, AppError> {
    crate::metrics::inc_requests("/capture");
    info!(
        target = "mull.api",
        user_id = %context.user_id,
        dry_run = payload.dry_run,
        "capture invoked",
    );

    if let Some(key) = headers
        .get("Idempotency-Key")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
    {
        if let Some(client) = &state.redis {
            if let Some(existing) = idempotency::redis_get(client, &key).await {
                return Ok(Json(existing));
            }
            let response = state.pipeline.run_capture(payload, context).await?;
            let ttl = std::env::var("IDEMPOTENCY_TTL_SECS")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(3600);
            idempotency::redis_set(client, &key, &response, ttl).await;
            return Ok(Json(response));
        }
        if let Some(existing) = state.idempotency.lock().await.get(&key).cloned() {
            return Ok(Json(existing));
        }
        let response = state.pipeline.run_capture(payload, context).await?;
        state.idempotency.lock().await.insert(key, response.clone());
        return Ok(Json(response));
    }

    let response = state.pipeline.run_capture(payload, context).await?;

    Ok(Json(response))
}

/// Extraction-only variant of `/capture`; nothing is submitted to the store.
async fn capture_preview(
    State(state): State<AppState>,
    Extension(context): Extension<SessionContext>,
    Json(payload): Json<CaptureRequest>,
) -> Result<Json<CaptureResponse>, AppError> {
    crate::metrics::inc_requests("/capture/preview");
    let request = CaptureRequest {
        dry_run: true,
        ..payload
    };
    let response = state.pipeline.run_capture(request, context).await?;
    Ok(Json(response))
}

/// Compile the caller's wishlist into an analyst prompt, run it through the
/// text-generation gateway and return the parsed insight.
///
/// - Method: `POST`
/// - Path: `/insight`
/// - Response: `InsightResponse`
async fn insight_now(
    State(state): State<AppState>,
    Extension(context): Extension<SessionContext>,
) -> Result<Json<InsightResponse>, AppError> {
    crate::metrics::inc_requests("/insight");
    info!(target = "mull.api", user_id = %context.user_id, "insight invoked");
    let response = state.pipeline.run_insight(context).await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    user: store::UserRef,
    session: String,
}

/// Proxy login against the wishlist backend so the extension never talks to
/// it directly.
async fn auth_login(Json(payload): Json<LoginRequest>) -> Result<Json<LoginResponse>, AppError> {
    crate::metrics::inc_requests("/auth/login");
    match store::auth::login(&payload.email, &payload.password).await {
        Ok((user, session)) => Ok(Json(LoginResponse { user, session })),
        Err(store::auth::StoreAuthError::Rejected(reason)) => Err(AppError::Pipeline(
            PipelineError::invalid_input("auth_login", reason),
        )),
        Err(err) => Err(AppError::Pipeline(PipelineError::internal(
            "auth_login",
            err.to_string(),
        ))),
    }
}

/// Invalidate the presented session. The local answer is success even when
/// the backend is unreachable; the token is dropped client-side regardless.
async fn auth_logout(
    Extension(context): Extension<SessionContext>,
) -> Result<Json<serde_json::Value>, AppError> {
    crate::metrics::inc_requests("/auth/logout");
    if let Err(err) = store::auth::delete_session(&context.session_token).await {
        warn!(target = "mull.api", error = %err, "session_delete_failed");
    }
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug)]
enum AppError {
    Pipeline(PipelineError),
}

impl From<PipelineError> for AppError {
    fn from(value: PipelineError) -> Self {
        Self::Pipeline(value)
    }
}

#[derive(Debug, Serialize)]
struct EnqueueResponse {
    job_id: String,
}

async fn enqueue_insight_job(
    State(state): State<AppState>,
    Extension(context): Extension<SessionContext>,
) -> Result<Json<EnqueueResponse>, AppError> {
    crate::metrics::inc_requests("/jobs/insight");
    let id = state
        .queue
        .enqueue_insight(context)
        .await
        .map_err(|err| AppError::Pipeline(PipelineError::internal("enqueue", err.error)))?;
    Ok(Json(EnqueueResponse {
        job_id: id.to_string(),
    }))
}

async fn get_job_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<jobs::JobInfo>, AppError> {
    let Ok(uuid) = uuid::Uuid::parse_str(&id) else {
        return Err(AppError::Pipeline(PipelineError::invalid_input(
            "jobs",
            "invalid_job_id",
        )));
    };
    if let Some(info) = state.queue.get(uuid).await {
        Ok(Json(info))
    } else {
        Err(AppError::Pipeline(PipelineError::invalid_input(
            "jobs",
            "not_found",
        )))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Pipeline(err) => {
                let status = match err.kind() {
                    PipelineErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
                    PipelineErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
                };
                let payload = ApiError {
                    error: err.stage().to_string(),
                    detail: Some(err.detail().to_string()),
                };
                (status, Json(payload)).into_response()
            }
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let _ = fmt().with_env_filter(filter).try_init();
}
// -------- Stage endpoints (manual granular control) --------
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
struct ExtractMetadataRequest {
    html: String,
    page_url: String,
}

#[derive(Debug, Serialize)]
struct ExtractMetadataResponse {
    record: extract::ProductRecord,
}

/// Run the extractor alone. The record carries its own `isProductPage`
/// classification, so off-page documents still answer with a degraded record.
async fn stage_extract_metadata(
    Json(req): Json<ExtractMetadataRequest>,
) -> Result<Json<ExtractMetadataResponse>, AppError> {
    crate::metrics::inc_requests("/stages/extract_metadata");
    let request = CaptureRequest {
        html: req.html,
        page_url: req.page_url,
        reflection: models::ReflectionAnswers {
            reason: String::new(),
            is_need: String::new(),
            is_future_approve: String::new(),
        },
        dry_run: true,
    };
    let out = pipeline::stages::extract_metadata(&request)
        .await
        .map_err(AppError::from)?;
    Ok(Json(ExtractMetadataResponse { record: out.value }))
}

#[derive(Debug, Deserialize)]
struct CompilePromptRequest {
    items: Vec<insight::WishlistItem>,
    #[serde(default)]
    feedback: HashMap<String, insight::SwipeFeedback>,
}

#[derive(Debug, Serialize)]
struct CompilePromptResponse {
    prompt: String,
    chars: usize,
}

async fn stage_compile_prompt(
    Json(req): Json<CompilePromptRequest>,
) -> Result<Json<CompilePromptResponse>, AppError> {
    crate::metrics::inc_requests("/stages/compile_prompt");
    let out = pipeline::stages::compile_prompt(&req.items, &req.feedback)
        .await
        .map_err(AppError::from)?;
    let chars = out.value.len();
    Ok(Json(CompilePromptResponse {
        prompt: out.value,
        chars,
    }))
}
