use crate::http::build_client;
use eyre::Result;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

/// Settings for the text-generation gateway behind the insight feature. The
/// gateway is addressed by function name; the model override is optional and
/// usually left to the gateway's own routing.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub function: Option<String>,
    pub model: Option<String>,
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("LLM_GATEWAY_URL")
                .unwrap_or_else(|_| "http://localhost:3000".into()),
            api_key: std::env::var("LLM_API_KEY").ok(),
            function: std::env::var("LLM_FUNCTION").ok(),
            model: std::env::var("LLM_MODEL").ok(),
        }
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("missing gateway url")]
    MissingGateway,
    #[error("http error: {0}")]
    Http(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Client for submitting a compiled insight prompt. The insight flow is a
/// single user turn, so the transport exposes exactly that: one prompt in,
/// one reply text out.
pub struct InsightGateway {
    http: Client,
    config: GatewayConfig,
}

impl InsightGateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            http: build_client(),
            config,
        }
    }

    /// Submit a prompt and return the reply text, fence-stripped. The prompt
    /// forbids markdown fencing but the service downstream is not trusted to
    /// comply.
    pub async fn generate(&self, prompt: &str) -> Result<String, GatewayError> {
        let gateway = self.config.url.trim();
        if gateway.is_empty() {
            return Err(GatewayError::MissingGateway);
        }

        let function = self.config.function.as_deref().unwrap_or("wishlist_insight");
        let mut body = json!({
            "function_name": function,
            "input": {
                "messages": [
                    { "role": "user", "content": prompt },
                ],
            },
        });
        if let Some(model) = &self.config.model {
            body["model_name"] = json!(model);
        }

        let mut request = self.http.post(format!("{gateway}/inference")).json(&body);

        if let Some(key) = &self.config.api_key {
            request = request.header("X-API-Key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|err| GatewayError::Http(err.to_string()))?;

        if !response.status().is_success() {
            return Err(GatewayError::Http(format!("HTTP {}", response.status())));
        }

        let payload: GatewayReply = response
            .json()
            .await
            .map_err(|err| GatewayError::InvalidResponse(err.to_string()))?;

        if let Some(usage) = &payload.usage {
            debug!(
                target = "mull.llm",
                function = function,
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                "gateway_usage"
            );
        }

        let text = payload
            .content
            .into_iter()
            .find(|block| block.r#type == "text")
            .map(|block| block.text)
            .ok_or_else(|| GatewayError::InvalidResponse("missing text".into()))?;

        Ok(strip_markdown_fence(&text))
    }
}

/// Drop a surrounding markdown code fence from a gateway reply.
pub fn strip_markdown_fence(input: &str) -> String {
    let trimmed = input.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let mut body = Vec::new();
    for line in trimmed.lines().skip(1) {
        if line.trim_start().starts_with("```") {
            break;
        }
        body.push(line);
    }
    body.join("\n")
}

#[derive(Debug, Deserialize)]
struct GatewayReply {
    content: Vec<ReplyBlock>,
    #[serde(default)]
    usage: Option<GatewayUsage>,
}

#[derive(Debug, Deserialize)]
struct ReplyBlock {
    r#type: String,
    text: String,
}

#[derive(Debug, Deserialize)]
struct GatewayUsage {
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fence_stripping_unwraps_fenced_replies() {
        let fenced = "```json\n{\"trendAlert\":\"x\"}\n```";
        assert_eq!(strip_markdown_fence(fenced), "{\"trendAlert\":\"x\"}");
    }

    #[test]
    fn fence_stripping_leaves_plain_replies_alone() {
        assert_eq!(strip_markdown_fence("  {\"a\":1}  "), "{\"a\":1}");
    }
}
