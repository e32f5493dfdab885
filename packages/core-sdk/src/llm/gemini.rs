use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Value};

use super::{read_json, token_count, BackendAdapter, BackendCall, Completion};
use crate::error::GenerationError;
use crate::models::{BackendKind, Message, Role};

/**
 * \brief Gemini generateContent 适配器，`x-goog-api-key` 鉴权。
 */
pub struct GeminiAdapter {
    client: reqwest::Client,
}

impl GeminiAdapter {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    fn build_body(call: &BackendCall) -> Value {
        let (system, rest) = call.split_system();
        let mut body = json!({
            "contents": gemini_contents(&rest),
            "generationConfig": {
                "temperature": call.temperature,
                "maxOutputTokens": call.max_tokens,
            }
        });
        if let Some(sys) = system {
            body["system_instruction"] = json!({
                "parts": [{"text": sys}]
            });
        }
        body
    }
}

/**
 * \brief assistant 角色在 Gemini 中称为 `model`。
 */
fn gemini_contents(messages: &[&Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|msg| {
            let role = match msg.role {
                Role::Assistant => "model",
                _ => "user",
            };
            json!({
                "role": role,
                "parts": [{"text": msg.content}]
            })
        })
        .collect()
}

/**
 * \brief 基地址未带版本段时补上 `/v1beta`。
 */
fn normalize_gemini_base(api_base: &str) -> String {
    let trimmed = api_base.trim_end_matches('/');
    if trimmed.ends_with("/v1")
        || trimmed.ends_with("/v1beta")
        || trimmed.contains("/v1/")
        || trimmed.contains("/v1beta/")
    {
        trimmed.to_string()
    } else {
        format!("{}/v1beta", trimmed)
    }
}

fn extract_gemini_content(v: &Value) -> Option<String> {
    let first = v.get("candidates")?.as_array()?.first()?;
    let parts = first.get("content")?.get("parts")?.as_array()?;
    Some(
        parts
            .iter()
            .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join(""),
    )
}

fn extract_gemini_usage(v: &Value) -> Option<u32> {
    v.get("usageMetadata")
        .and_then(|u| u.get("totalTokenCount"))
        .and_then(|t| t.as_u64())
        .map(token_count)
}

#[async_trait]
impl BackendAdapter for GeminiAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Gemini
    }

    async fn send(&self, call: &BackendCall) -> Result<Completion, GenerationError> {
        let key = call.credential().ok_or_else(|| {
            GenerationError::Configuration("Gemini requires an API key".into())
        })?;
        let url = format!(
            "{}/models/{}:generateContent",
            normalize_gemini_base(&call.endpoint),
            call.model
        );
        let resp = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .header("x-goog-api-key", key)
            .json(&Self::build_body(call))
            .send()
            .await?;
        let v = read_json(resp, "gemini").await?;
        let text = extract_gemini_content(&v).ok_or_else(|| {
            let reason = v
                .get("promptFeedback")
                .and_then(|f| f.get("blockReason"))
                .and_then(|r| r.as_str())
                .map(|r| format!("prompt blocked: {}", r))
                .unwrap_or_else(|| format!("no candidates in response: {}", v));
            GenerationError::Protocol(format!("gemini {}", reason))
        })?;
        Ok(Completion {
            text,
            tokens_used: extract_gemini_usage(&v),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::test_support::spawn_stub;
    use axum::{
        extract::Path,
        http::HeaderMap,
        routing::post,
        Json, Router,
    };

    #[test]
    fn test_normalize_gemini_base() {
        assert_eq!(
            normalize_gemini_base("https://generativelanguage.googleapis.com/"),
            "https://generativelanguage.googleapis.com/v1beta"
        );
        assert_eq!(
            normalize_gemini_base("https://proxy.local/v1"),
            "https://proxy.local/v1"
        );
    }

    #[test]
    fn test_body_maps_assistant_to_model() {
        let call = BackendCall {
            model: "gemini-1.5-flash".into(),
            messages: vec![
                Message::new(Role::System, "policy writer"),
                Message::new(Role::User, "purpose?"),
                Message::new(Role::Assistant, "to protect data"),
            ],
            temperature: 0.4,
            max_tokens: 300,
            credential: Some("g".into()),
            endpoint: "http://x".into(),
        };
        let body = GeminiAdapter::build_body(&call);
        assert_eq!(body["system_instruction"]["parts"][0]["text"], "policy writer");
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 300);
    }

    #[tokio::test]
    async fn test_send_hits_model_route_with_key_header() {
        let app = Router::new().route(
            "/v1beta/models/{action}",
            post(
                |Path(action): Path<String>, headers: HeaderMap, Json(_b): Json<Value>| async move {
                    let key = headers
                        .get("x-goog-api-key")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    Json(json!({
                        "candidates": [{"content": {"parts": [{"text": action}, {"text": format!("|{}", key)}]}}],
                        "usageMetadata": {"totalTokenCount": 9}
                    }))
                },
            ),
        );
        let endpoint = spawn_stub(app).await;
        let call = BackendCall {
            model: "gemini-1.5-pro".into(),
            messages: vec![Message::new(Role::User, "hello")],
            temperature: 0.4,
            max_tokens: 64,
            credential: Some("g-key".into()),
            endpoint,
        };
        let adapter = GeminiAdapter::new(Duration::from_secs(5)).expect("adapter");
        let completion = adapter.send(&call).await.expect("completion");
        assert_eq!(completion.text, "gemini-1.5-pro:generateContent|g-key");
        assert_eq!(completion.tokens_used, Some(9));
    }
}
