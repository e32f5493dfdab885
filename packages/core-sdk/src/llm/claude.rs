use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde_json::{json, Value};

use super::{api_url, read_json, token_count, BackendAdapter, BackendCall, Completion};
use crate::error::GenerationError;
use crate::models::{BackendKind, Message, Role};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/**
 * \brief Anthropic Messages 适配器，`x-api-key` + `anthropic-version` 鉴权。
 */
pub struct ClaudeAdapter {
    client: reqwest::Client,
}

impl ClaudeAdapter {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    fn build_body(call: &BackendCall) -> Value {
        let (system, rest) = call.split_system();
        let mut body = json!({
            "model": call.model,
            "max_tokens": call.max_tokens,
            // Messages 接口的温度上限为 1.0
            "temperature": call.temperature.clamp(0.0, 1.0),
            "messages": anthropic_messages(&rest),
        });
        if let Some(sys) = system {
            body["system"] = json!(sys);
        }
        body
    }
}

/**
 * \brief 转为 Messages 格式，system 消息已在外部拆出。
 */
fn anthropic_messages(messages: &[&Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|msg| {
            let role = match msg.role {
                Role::Assistant => "assistant",
                _ => "user",
            };
            json!({
                "role": role,
                "content": [{"type": "text", "text": msg.content}]
            })
        })
        .collect()
}

fn extract_anthropic_content(v: &Value) -> Option<String> {
    v.get("content").and_then(|arr| arr.as_array()).map(|arr| {
        arr.iter()
            .filter_map(|item| item.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join("")
    })
}

fn extract_anthropic_usage(v: &Value) -> Option<u32> {
    let usage = v.get("usage")?;
    let input = usage.get("input_tokens").and_then(|t| t.as_u64());
    let output = usage.get("output_tokens").and_then(|t| t.as_u64());
    match (input, output) {
        (None, None) => None,
        (i, o) => Some(token_count(i.unwrap_or(0).saturating_add(o.unwrap_or(0)))),
    }
}

#[async_trait]
impl BackendAdapter for ClaudeAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Claude
    }

    async fn send(&self, call: &BackendCall) -> Result<Completion, GenerationError> {
        let key = call.credential().ok_or_else(|| {
            GenerationError::Configuration("Anthropic requires an API key".into())
        })?;
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(key).map_err(|e| {
                GenerationError::Configuration(format!("invalid API key header: {}", e))
            })?,
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        let url = api_url(&call.endpoint, "v1/messages");
        let resp = self
            .client
            .post(url)
            .headers(headers)
            .json(&Self::build_body(call))
            .send()
            .await?;
        let v = read_json(resp, "anthropic").await?;
        let text = extract_anthropic_content(&v).ok_or_else(|| {
            GenerationError::Protocol(format!("anthropic response missing content: {}", v))
        })?;
        Ok(Completion {
            text,
            tokens_used: extract_anthropic_usage(&v),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::test_support::spawn_stub;
    use axum::{http::HeaderMap as AxumHeaders, routing::post, Json, Router};

    fn call(endpoint: &str) -> BackendCall {
        BackendCall {
            model: "claude-3-5-haiku-latest".into(),
            messages: vec![
                Message::new(Role::System, "be precise"),
                Message::new(Role::User, "list risks"),
                Message::new(Role::Assistant, "which area?"),
                Message::new(Role::User, "vendor onboarding"),
            ],
            temperature: 1.6,
            max_tokens: 512,
            credential: Some("ak-test".into()),
            endpoint: endpoint.into(),
        }
    }

    #[test]
    fn test_body_splits_system_and_clamps_temperature() {
        let body = ClaudeAdapter::build_body(&call("http://x"));
        assert_eq!(body["system"], "be precise");
        assert_eq!(body["temperature"], 1.0);
        let messages = body["messages"].as_array().expect("messages");
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1]["role"], "assistant");
        assert_eq!(messages[2]["content"][0]["text"], "vendor onboarding");
    }

    #[tokio::test]
    async fn test_send_sends_version_header_and_sums_usage() {
        let app = Router::new().route(
            "/v1/messages",
            post(|headers: AxumHeaders, Json(_body): Json<Value>| async move {
                let version = headers
                    .get("anthropic-version")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                let key = headers
                    .get("x-api-key")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                Json(json!({
                    "content": [
                        {"type": "text", "text": format!("{}|", version)},
                        {"type": "text", "text": key}
                    ],
                    "usage": {"input_tokens": 10, "output_tokens": 5}
                }))
            }),
        );
        let endpoint = spawn_stub(app).await;
        let adapter = ClaudeAdapter::new(Duration::from_secs(5)).expect("adapter");
        let completion = adapter.send(&call(&endpoint)).await.expect("completion");
        assert_eq!(completion.text, "2023-06-01|ak-test");
        assert_eq!(completion.tokens_used, Some(15));
    }
}
