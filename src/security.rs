use crate::models::ApiError;
use crate::store;
use axum::{
    Json,
    body::Body,
    extract::State,
    http::{self, Request, StatusCode, header::HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{
    collections::HashMap,
    convert::Infallible,
    env,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Resolved caller identity for one request. Session state is never read
/// implicitly from anywhere shared; middleware builds this once and hands it
/// to whatever layer needs it.
#[derive(Clone, Debug)]
pub struct SessionContext {
    pub user_id: String,
    pub session_token: String,
}

#[derive(Clone)]
pub struct AuthState {
    seeded: Arc<HashMap<String, String>>,
    resolved: Arc<Mutex<HashMap<String, ResolvedSession>>>,
    limiter: Arc<TokenBuckets>,
    cache_ttl: Duration,
    verify_remote: bool,
}

struct ResolvedSession {
    user_id: String,
    resolved_at: Instant,
}

impl AuthState {
    pub fn from_env() -> Self {
        let cache_ttl = env::var("SESSION_CACHE_TTL_SECS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(60);
        let verify_remote = matches!(
            env::var("STORE_ENABLE_NETWORK")
                .unwrap_or_default()
                .trim()
                .to_lowercase()
                .as_str(),
            "1" | "true" | "yes" | "on"
        );
        Self {
            seeded: Arc::new(load_sessions_from_env()),
            resolved: Arc::new(Mutex::new(HashMap::new())),
            limiter: Arc::new(TokenBuckets::from_env()),
            cache_ttl: Duration::from_secs(cache_ttl),
            verify_remote,
        }
    }

    /// Resolve a presented token: seeded demo sessions first, then the TTL
    /// cache, then the backend's session introspection when networking is on.
    async fn resolve(&self, presented: &str) -> Option<SessionContext> {
        if let Some(user_id) = self.seeded.get(presented) {
            return Some(SessionContext {
                user_id: user_id.clone(),
                session_token: presented.to_string(),
            });
        }

        {
            let guard = self.resolved.lock().await;
            if let Some(entry) = guard.get(presented)
                && entry.resolved_at.elapsed() < self.cache_ttl
            {
                return Some(SessionContext {
                    user_id: entry.user_id.clone(),
                    session_token: presented.to_string(),
                });
            }
        }

        if !self.verify_remote {
            return None;
        }

        match store::auth::resolve_session(presented).await {
            Ok(Some(user)) => {
                let mut guard = self.resolved.lock().await;
                guard.insert(
                    presented.to_string(),
                    ResolvedSession {
                        user_id: user.id.clone(),
                        resolved_at: Instant::now(),
                    },
                );
                Some(SessionContext {
                    user_id: user.id,
                    session_token: presented.to_string(),
                })
            }
            Ok(None) => None,
            Err(err) => {
                warn!(target = "mull.api", error = %err, "session_introspection_failed");
                None
            }
        }
    }

    async fn consume(&self, user_id: &str) -> RateDecision {
        self.limiter.consume(user_id).await
    }
}

pub async fn require_session_auth(
    State(state): State<AuthState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, Infallible> {
    let Some(presented) = extract_session_token(request.headers()) else {
        return Ok(error_response(
            StatusCode::UNAUTHORIZED,
            "missing_session",
            "Provide X-Mull-Session or Bearer token",
        ));
    };

    let Some(context) = state.resolve(&presented).await else {
        return Ok(error_response(
            StatusCode::UNAUTHORIZED,
            "invalid_session",
            "Session not recognized or expired",
        ));
    };

    match state.consume(&context.user_id).await {
        RateDecision::Allowed { remaining, reset } => {
            request.extensions_mut().insert(context.clone());
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert("X-RateLimit-Limit", header_value(state.limiter.limit()));
            headers.insert("X-RateLimit-Remaining", header_value(remaining));
            headers.insert("X-RateLimit-Reset", header_value(reset));
            Ok(response)
        }
        RateDecision::Limited { retry_after, reset } => {
            let mut response = error_response(
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                "Too many requests",
            );
            let headers = response.headers_mut();
            headers.insert(http::header::RETRY_AFTER, header_value(retry_after.max(1)));
            headers.insert("X-RateLimit-Limit", header_value(state.limiter.limit()));
            headers.insert("X-RateLimit-Remaining", header_value(0));
            headers.insert("X-RateLimit-Reset", header_value(reset));
            Ok(response)
        }
    }
}

fn extract_session_token(headers: &http::HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(http::header::AUTHORIZATION)
        && let Ok(raw) = value.to_str()
        && raw.len() >= 7
        && raw[..6].eq_ignore_ascii_case("bearer")
    {
        return Some(raw[6..].trim().to_string());
    }
    headers
        .get("X-Mull-Session")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    let payload = ApiError {
        error: code.to_string(),
        detail: Some(message.to_string()),
    };
    (status, Json(payload)).into_response()
}

/// Seed sessions for demo and offline runs, `user:token` comma-separated.
fn load_sessions_from_env() -> HashMap<String, String> {
    let raw = env::var("DEMO_SESSIONS").unwrap_or_else(|_| "demo-user:demo-session".to_string());
    let mut entries = HashMap::new();
    for token in raw.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            continue;
        }
        let mut parts = trimmed.splitn(2, ':');
        let user_id = parts.next().map(str::trim).filter(|s| !s.is_empty());
        let session = parts.next().map(str::trim).filter(|s| !s.is_empty());
        match (user_id, session) {
            (Some(user), Some(session)) => {
                entries.insert(session.to_string(), user.to_string());
            }
            _ => warn!(
                target = "mull.api",
                "ignored malformed DEMO_SESSIONS entry: {trimmed}"
            ),
        }
    }

    if entries.is_empty() {
        warn!(
            target = "mull.api",
            "DEMO_SESSIONS produced no sessions; falling back to demo credentials"
        );
        entries.insert("demo-session".to_string(), "demo-user".to_string());
    } else {
        info!(
            target = "mull.api",
            session_count = entries.len(),
            "loaded seed sessions from env"
        );
    }

    entries
}

#[derive(Clone)]
struct TokenBuckets {
    rate_per_sec: f64,
    capacity: f64,
    buckets: Arc<Mutex<HashMap<String, BucketState>>>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

enum RateDecision {
    Allowed { remaining: u64, reset: u64 },
    Limited { retry_after: u64, reset: u64 },
}

impl TokenBuckets {
    fn from_env() -> Self {
        let rate_per_sec = env::var("RATE_LIMIT_PER_SEC")
            .ok()
            .and_then(|value| value.parse::<f64>().ok())
            .filter(|value| *value > 0.0)
            .unwrap_or(5.0);
        let capacity = env::var("RATE_LIMIT_CAPACITY")
            .ok()
            .and_then(|value| value.parse::<f64>().ok())
            .filter(|value| *value >= 1.0)
            .unwrap_or(10.0);
        Self {
            rate_per_sec,
            capacity,
            buckets: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn consume(&self, key: &str) -> RateDecision {
        let mut guard = self.buckets.lock().await;
        let now = Instant::now();
        let state = guard.entry(key.to_string()).or_insert_with(|| BucketState {
            tokens: self.capacity,
            last_refill: now,
        });

        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            state.tokens = (state.tokens + elapsed * self.rate_per_sec).min(self.capacity);
            state.last_refill = now;
        }

        let reset = ((self.capacity - state.tokens) / self.rate_per_sec).ceil().max(0.0) as u64;
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            RateDecision::Allowed {
                remaining: state.tokens.max(0.0).floor() as u64,
                reset,
            }
        } else {
            let deficit = 1.0 - state.tokens;
            RateDecision::Limited {
                retry_after: (deficit / self.rate_per_sec).ceil().max(0.0) as u64,
                reset,
            }
        }
    }

    fn limit(&self) -> u64 {
        self.capacity as u64
    }
}

fn header_value(value: u64) -> HeaderValue {
    HeaderValue::from_str(&value.to_string()).unwrap_or_else(|_| HeaderValue::from_static("0"))
}
