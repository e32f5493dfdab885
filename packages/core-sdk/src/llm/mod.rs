use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::error::GenerationError;
use crate::models::{BackendAvailability, BackendKind, Message, Role};
use crate::settings::Settings;

pub mod claude;
pub mod dispatch;
pub mod gemini;
pub mod ollama;
pub mod openai;
pub mod postprocess;

#[cfg(test)]
pub(crate) mod test_support;

pub use claude::ClaudeAdapter;
pub use gemini::GeminiAdapter;
pub use ollama::OllamaAdapter;
pub use openai::OpenAIAdapter;

/**
 * \brief 发往后端的一次调用（已解析好模型、凭据、地址与采样参数）。
 */
#[derive(Debug, Clone)]
pub struct BackendCall {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub credential: Option<String>,
    /** \brief 已去掉末尾 `/` 的基地址 */
    pub endpoint: String,
}

impl BackendCall {
    /**
     * \brief 非空凭据。
     */
    pub fn credential(&self) -> Option<&str> {
        self.credential
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    /**
     * \brief 拆分为 (system, 其余消息)。多条 system 以空行拼接。
     */
    pub fn split_system(&self) -> (Option<String>, Vec<&Message>) {
        let mut system_parts = Vec::new();
        let mut rest = Vec::new();
        for msg in &self.messages {
            match msg.role {
                Role::System => system_parts.push(msg.content.as_str()),
                _ => rest.push(msg),
            }
        }
        let system = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };
        (system, rest)
    }
}

/**
 * \brief 后端返回的原始文本与 token 用量（后端未报告时为 None）。
 */
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub tokens_used: Option<u32>,
}

/**
 * \brief 后端适配器：预检、格式化请求、解析响应。
 */
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    fn kind(&self) -> BackendKind;

    /**
     * \brief 探活。仅本地运行时有实际意义，托管后端默认视为可用。
     */
    async fn check_availability(&self, _endpoint: &str) -> BackendAvailability {
        BackendAvailability {
            running: true,
            models: Vec::new(),
            error: None,
        }
    }

    /**
     * \brief 列出后端已安装的模型。
     */
    async fn list_models(&self, _endpoint: &str) -> Result<Vec<String>, GenerationError> {
        Err(GenerationError::Configuration(format!(
            "{:?} backend does not expose a model listing",
            self.kind()
        )))
    }

    /**
     * \brief 发送前的可用性/模型检查，失败则不会发出生成请求。
     */
    async fn preflight(&self, _call: &BackendCall) -> Result<(), GenerationError> {
        Ok(())
    }

    async fn send(&self, call: &BackendCall) -> Result<Completion, GenerationError>;
}

/**
 * \brief 后端类型 -> 适配器 的分发表，每种后端一个适配器。
 */
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<BackendKind, Arc<dyn BackendAdapter>>,
}

impl AdapterRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /**
     * \brief 注册四个内置适配器。
     */
    pub fn with_defaults(settings: &Settings) -> Result<Self> {
        let mut registry = Self::empty();
        registry.register(Arc::new(OllamaAdapter::new(
            settings.probe_timeout(),
            settings.generation_timeout(),
        )?));
        registry.register(Arc::new(OpenAIAdapter::new(settings.generation_timeout())?));
        registry.register(Arc::new(ClaudeAdapter::new(settings.generation_timeout())?));
        registry.register(Arc::new(GeminiAdapter::new(settings.generation_timeout())?));
        Ok(registry)
    }

    /**
     * \brief 注册（或替换）某一后端类型的适配器。
     */
    pub fn register(&mut self, adapter: Arc<dyn BackendAdapter>) {
        self.adapters.insert(adapter.kind(), adapter);
    }

    pub fn get(&self, kind: BackendKind) -> Option<Arc<dyn BackendAdapter>> {
        self.adapters.get(&kind).cloned()
    }
}

/**
 * \brief 后端上报的 token 数，超出 u32 时取上限。
 */
pub(crate) fn token_count(reported: u64) -> u32 {
    u32::try_from(reported).unwrap_or(u32::MAX)
}

/**
 * \brief 拼接接口地址，基地址已含 `/v1` 等版本段时不重复。
 */
pub(crate) fn api_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if let Some((version, rest)) = path.split_once('/') {
        if base.ends_with(&format!("/{}", version)) {
            return format!("{}/{}", base, rest);
        }
    }
    format!("{}/{}", base, path)
}

/**
 * \brief 校验状态码并解析 JSON；非 2xx 转为 Protocol 错误并带上后端的错误信息。
 */
pub(crate) async fn read_json(
    resp: reqwest::Response,
    label: &str,
) -> Result<Value, GenerationError> {
    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        return Err(GenerationError::Protocol(format!(
            "{} request failed: {} -> {}",
            label,
            status,
            extract_error_message(&text)
        )));
    }
    resp.json::<Value>().await.map_err(|e| {
        GenerationError::Protocol(format!("{} returned a malformed response: {}", label, e))
    })
}

/**
 * \brief 从错误响应体中提取可读信息，兼容 `{error:{message}}`、`{error:"..."}`、`{message}`。
 */
pub(crate) fn extract_error_message(body: &str) -> String {
    if let Ok(v) = serde_json::from_str::<Value>(body) {
        let message = v
            .get("error")
            .and_then(|e| e.get("message").and_then(|m| m.as_str()).or_else(|| e.as_str()))
            .or_else(|| v.get("message").and_then(|m| m.as_str()));
        if let Some(m) = message {
            return m.to_string();
        }
    }
    let trimmed = body.trim();
    if trimmed.chars().count() > 300 {
        format!("{}...", trimmed.chars().take(300).collect::<String>())
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_url_avoids_duplicate_version() {
        assert_eq!(
            api_url("https://api.openai.com/", "/v1/chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            api_url("https://proxy.local/v1", "v1/chat/completions"),
            "https://proxy.local/v1/chat/completions"
        );
        assert_eq!(
            api_url("http://localhost:11434", "api/tags"),
            "http://localhost:11434/api/tags"
        );
    }

    #[test]
    fn test_token_count_saturates() {
        assert_eq!(token_count(42), 42);
        assert_eq!(token_count(u64::from(u32::MAX) + 7), u32::MAX);
    }

    #[test]
    fn test_extract_error_message_shapes() {
        assert_eq!(
            extract_error_message(r#"{"error":{"message":"invalid key"}}"#),
            "invalid key"
        );
        assert_eq!(extract_error_message(r#"{"error":"model missing"}"#), "model missing");
        assert_eq!(extract_error_message("Bad Gateway"), "Bad Gateway");
    }

    #[test]
    fn test_split_system_joins_system_parts() {
        let call = BackendCall {
            model: "m".into(),
            messages: vec![
                Message::new(Role::System, "a"),
                Message::new(Role::User, "hi"),
                Message::new(Role::System, "b"),
            ],
            temperature: 0.5,
            max_tokens: 10,
            credential: Some("  ".into()),
            endpoint: "http://x".into(),
        };
        let (system, rest) = call.split_system();
        assert_eq!(system.as_deref(), Some("a\n\nb"));
        assert_eq!(rest.len(), 1);
        assert!(call.credential().is_none());
    }
}
