use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};

use super::{api_url, read_json, token_count, BackendAdapter, BackendCall, Completion};
use crate::error::GenerationError;
use crate::models::BackendKind;

/**
 * \brief OpenAI Chat Completions 适配器，Bearer 鉴权。
 */
pub struct OpenAIAdapter {
    client: reqwest::Client,
}

impl OpenAIAdapter {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    fn build_body(call: &BackendCall) -> Value {
        let messages: Vec<Value> = call
            .messages
            .iter()
            .map(|m| json!({"role": m.role.as_str(), "content": m.content}))
            .collect();
        json!({
            "model": call.model,
            "messages": messages,
            "temperature": call.temperature,
            "max_tokens": call.max_tokens,
            "stream": false
        })
    }
}

fn extract_openai_content(v: &Value) -> Option<String> {
    v.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
}

fn extract_openai_usage(v: &Value) -> Option<u32> {
    v.get("usage")
        .and_then(|u| u.get("total_tokens"))
        .and_then(|t| t.as_u64())
        .map(token_count)
}

#[async_trait]
impl BackendAdapter for OpenAIAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::OpenAI
    }

    async fn send(&self, call: &BackendCall) -> Result<Completion, GenerationError> {
        let key = call.credential().ok_or_else(|| {
            GenerationError::Configuration("OpenAI requires an API key".into())
        })?;
        let url = api_url(&call.endpoint, "v1/chat/completions");
        let resp = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, format!("Bearer {}", key))
            .json(&Self::build_body(call))
            .send()
            .await?;
        let v = read_json(resp, "openai").await?;
        let text = extract_openai_content(&v).ok_or_else(|| {
            GenerationError::Protocol(format!(
                "openai response missing choices[0].message.content: {}",
                v
            ))
        })?;
        Ok(Completion {
            text,
            tokens_used: extract_openai_usage(&v),
        })
    }
}
