use crate::http::build_client;
use crate::store::config::ROOT;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreAuthError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRef {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    user: Option<UserRef>,
    #[serde(default)]
    session: Option<String>,
}

pub async fn login(email: &str, password: &str) -> Result<(UserRef, String), StoreAuthError> {
    let client = build_client();
    let url = format!("{}/UserAuth/login", *ROOT);
    let response = client
        .post(url)
        .json(&json!({ "email": email, "password": password }))
        .send()
        .await
        .map_err(|err| StoreAuthError::Request(err.to_string()))?;
    if !response.status().is_success() {
        return Err(StoreAuthError::Request(format!(
            "HTTP {}",
            response.status()
        )));
    }
    let payload: AuthResponse = response
        .json()
        .await
        .map_err(|err| StoreAuthError::Request(err.to_string()))?;
    if let Some(error) = payload.error {
        return Err(StoreAuthError::Rejected(error));
    }
    match (payload.user, payload.session) {
        (Some(user), Some(session)) => Ok((user, session)),
        _ => Err(StoreAuthError::Rejected(
            "login response missing user or session".into(),
        )),
    }
}

pub async fn delete_session(session: &str) -> Result<(), StoreAuthError> {
    let client = build_client();
    let url = format!("{}/Sessioning/delete", *ROOT);
    let response = client
        .post(url)
        .json(&json!({ "session": session }))
        .send()
        .await
        .map_err(|err| StoreAuthError::Request(err.to_string()))?;
    if !response.status().is_success() {
        return Err(StoreAuthError::Request(format!(
            "HTTP {}",
            response.status()
        )));
    }
    Ok(())
}

/// Resolve a session token to its user. An unknown or expired token is data,
/// not a failure: the backend answers with an `error` payload and this
/// resolves to `None`.
pub async fn resolve_session(session: &str) -> Result<Option<UserRef>, StoreAuthError> {
    let client = build_client();
    let url = format!("{}/Sessioning/_getUser", *ROOT);
    let response = client
        .post(url)
        .json(&json!({ "session": session }))
        .send()
        .await
        .map_err(|err| StoreAuthError::Request(err.to_string()))?;
    if !response.status().is_success() {
        return Err(StoreAuthError::Request(format!(
            "HTTP {}",
            response.status()
        )));
    }
    let payload: AuthResponse = response
        .json()
        .await
        .map_err(|err| StoreAuthError::Request(err.to_string()))?;
    if payload.error.is_some() {
        return Ok(None);
    }
    Ok(payload.user)
}
