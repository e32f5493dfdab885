use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Value};

use super::{api_url, read_json, token_count, BackendAdapter, BackendCall, Completion};
use crate::error::GenerationError;
use crate::models::{BackendAvailability, BackendKind};
use crate::telemetry;

/**
 * \brief 本地运行时适配器（Ollama 兼容接口）。
 * \details 生成前依次执行：探活 -> 模型存在性检查 -> `/api/generate`。
 */
pub struct OllamaAdapter {
    /** \brief 探活用短超时客户端 */
    probe: reqwest::Client,
    client: reqwest::Client,
}

impl OllamaAdapter {
    pub fn new(probe_timeout: Duration, generation_timeout: Duration) -> Result<Self> {
        Ok(Self {
            probe: reqwest::Client::builder().timeout(probe_timeout).build()?,
            client: reqwest::Client::builder()
                .timeout(generation_timeout)
                .build()?,
        })
    }

    fn build_body(call: &BackendCall) -> Value {
        let (system, rest) = call.split_system();
        let prompt = rest
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let mut body = json!({
            "model": call.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": call.temperature,
                "num_predict": call.max_tokens,
            }
        });
        if let Some(sys) = system {
            body["system"] = json!(sys);
        }
        body
    }
}

/**
 * \brief 缺失模型时给出的修复命令。
 */
pub fn pull_command(model: &str) -> String {
    format!("ollama pull {}", model)
}

/**
 * \brief 判断模型是否已安装。运行时把未带标签的名称解析为 `<name>:latest`，其他标签不算。
 */
pub fn model_installed(installed: &[String], requested: &str) -> bool {
    let requested = requested.trim();
    let latest = if requested.contains(':') {
        None
    } else {
        Some(format!("{}:latest", requested))
    };
    installed
        .iter()
        .any(|name| name == requested || latest.as_deref() == Some(name.as_str()))
}

fn parse_tags(v: &Value) -> Result<Vec<String>, String> {
    let arr = v
        .get("models")
        .and_then(|m| m.as_array())
        .ok_or_else(|| format!("unexpected model listing payload: {}", v))?;
    Ok(arr
        .iter()
        .filter_map(|item| {
            item.get("name")
                .and_then(|s| s.as_str())
                .or_else(|| item.get("model").and_then(|s| s.as_str()))
        })
        .map(|s| s.to_string())
        .collect())
}

fn extract_ollama_content(v: &Value) -> Option<String> {
    v.get("response").and_then(|r| r.as_str()).map(|s| s.to_string())
}

fn extract_ollama_usage(v: &Value) -> Option<u32> {
    let prompt = v.get("prompt_eval_count").and_then(|c| c.as_u64());
    let eval = v.get("eval_count").and_then(|c| c.as_u64());
    match (prompt, eval) {
        (None, None) => None,
        (p, e) => Some(token_count(p.unwrap_or(0).saturating_add(e.unwrap_or(0)))),
    }
}

#[async_trait]
impl BackendAdapter for OllamaAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Ollama
    }

    /**
     * \brief 请求 `/api/tags`；无响应或非 2xx 报告为未运行，从不返回错误。
     */
    async fn check_availability(&self, endpoint: &str) -> BackendAvailability {
        let url = api_url(endpoint, "api/tags");
        let resp = match self.probe.get(&url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                return BackendAvailability {
                    running: false,
                    models: Vec::new(),
                    error: Some(e.to_string()),
                }
            }
        };
        if !resp.status().is_success() {
            return BackendAvailability {
                running: false,
                models: Vec::new(),
                error: Some(format!("status {}", resp.status())),
            };
        }
        let listed = match resp.json::<Value>().await {
            Ok(v) => parse_tags(&v),
            Err(e) => Err(e.to_string()),
        };
        match listed {
            Ok(models) => BackendAvailability {
                running: true,
                models,
                error: None,
            },
            Err(e) => BackendAvailability {
                running: true,
                models: Vec::new(),
                error: Some(e),
            },
        }
    }

    async fn list_models(&self, endpoint: &str) -> Result<Vec<String>, GenerationError> {
        let availability = self.check_availability(endpoint).await;
        match (availability.running, availability.error) {
            (false, err) => Err(GenerationError::Availability(format!(
                "Ollama is not reachable at {}: {}",
                endpoint,
                err.unwrap_or_default()
            ))),
            (true, Some(err)) => Err(GenerationError::Protocol(err)),
            (true, None) => Ok(availability.models),
        }
    }

    /**
     * \brief 运行时未启动或模型缺失时终止；模型列表本身读取失败只记录告警并继续。
     */
    async fn preflight(&self, call: &BackendCall) -> Result<(), GenerationError> {
        let availability = self.check_availability(&call.endpoint).await;
        if !availability.running {
            telemetry::log_error(
                "dispatch.preflight",
                &format!(
                    "ollama not running at {}: {}",
                    call.endpoint,
                    availability.error.as_deref().unwrap_or("no response")
                ),
            );
            return Err(GenerationError::Availability(format!(
                "Ollama is not running at {}. Start it with `ollama serve` and try again.",
                call.endpoint
            )));
        }
        if let Some(err) = availability.error {
            telemetry::log_warn(
                "dispatch.preflight",
                &format!("model presence check skipped for {}: {}", call.model, err),
            );
            return Ok(());
        }
        if !model_installed(&availability.models, &call.model) {
            return Err(GenerationError::ModelNotFound {
                model: call.model.clone(),
                remediation: pull_command(&call.model),
            });
        }
        Ok(())
    }

    async fn send(&self, call: &BackendCall) -> Result<Completion, GenerationError> {
        let url = api_url(&call.endpoint, "api/generate");
        let body = Self::build_body(call);
        let resp = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await?;
        let v = read_json(resp, "ollama").await?;
        if let Some(err) = v.get("error").and_then(|e| e.as_str()) {
            return Err(GenerationError::Protocol(format!("ollama error: {}", err)));
        }
        let text = extract_ollama_content(&v).ok_or_else(|| {
            GenerationError::Protocol(format!("ollama response missing `response`: {}", v))
        })?;
        Ok(Completion {
            text,
            tokens_used: extract_ollama_usage(&v),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::test_support::{spawn_stub, unused_endpoint};
    use crate::models::{Message, Role};
    use axum::{routing::get, routing::post, Json, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn adapter() -> OllamaAdapter {
        OllamaAdapter::new(Duration::from_secs(2), Duration::from_secs(5)).expect("adapter")
    }

    fn call(endpoint: &str, model: &str) -> BackendCall {
        BackendCall {
            model: model.into(),
            messages: vec![
                Message::new(Role::System, "be brief"),
                Message::new(Role::User, "write a scope"),
            ],
            temperature: 0.3,
            max_tokens: 256,
            credential: None,
            endpoint: endpoint.into(),
        }
    }

    fn stub(tags: Value, generate_calls: Arc<AtomicUsize>) -> Router {
        Router::new()
            .route(
                "/api/tags",
                get(move || {
                    let tags = tags.clone();
                    async move { Json(tags) }
                }),
            )
            .route(
                "/api/generate",
                post(move |Json(body): Json<Value>| {
                    let calls = generate_calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Json(json!({
                            "response": format!("echo:{}", body["prompt"].as_str().unwrap_or("")),
                            "done": true,
                            "prompt_eval_count": 12,
                            "eval_count": 30
                        }))
                    }
                }),
            )
    }

    #[test]
    fn test_model_installed_matching() {
        let installed = vec!["llama3.1:8b".to_string(), "mistral:latest".to_string()];
        assert!(model_installed(&installed, "mistral"));
        assert!(model_installed(&installed, "llama3.1:8b"));
        assert!(!model_installed(&installed, "llama3.1"));
        assert!(!model_installed(&installed, "llama3.1:70b"));
        assert!(!model_installed(&installed, "phi3"));
    }

    #[test]
    fn test_build_body_moves_system_to_field() {
        let body = OllamaAdapter::build_body(&call("http://x", "mistral"));
        assert_eq!(body["system"], "be brief");
        assert_eq!(body["prompt"], "write a scope");
        assert_eq!(body["stream"], false);
        assert_eq!(body["options"]["num_predict"], 256);
    }

    #[tokio::test]
    async fn test_unreachable_runtime_reports_not_running() {
        let endpoint = unused_endpoint().await;
        let availability = adapter().check_availability(&endpoint).await;
        assert!(!availability.running);
        assert!(availability.error.is_some());

        let err = adapter()
            .preflight(&call(&endpoint, "mistral"))
            .await
            .expect_err("preflight must fail");
        assert!(err.to_string().contains(&endpoint));
    }

    #[tokio::test]
    async fn test_missing_model_blocks_before_generate() {
        let calls = Arc::new(AtomicUsize::new(0));
        let endpoint =
            spawn_stub(stub(json!({"models": [{"name": "llama3.1:8b"}]}), calls.clone())).await;
        let err = adapter()
            .preflight(&call(&endpoint, "mistral"))
            .await
            .expect_err("model is missing");
        let msg = err.to_string();
        assert!(msg.contains("mistral"));
        assert!(msg.contains("ollama pull mistral"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_untagged_model_needs_latest_tag() {
        let calls = Arc::new(AtomicUsize::new(0));
        let endpoint =
            spawn_stub(stub(json!({"models": [{"name": "llama3.2:1b"}]}), calls.clone())).await;
        let err = adapter()
            .preflight(&call(&endpoint, "llama3.2"))
            .await
            .expect_err("only another tag is installed");
        assert!(matches!(err, GenerationError::ModelNotFound { .. }));
        assert!(err.to_string().contains("ollama pull llama3.2"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unreadable_listing_is_advisory() {
        let calls = Arc::new(AtomicUsize::new(0));
        let endpoint = spawn_stub(stub(json!({"unexpected": true}), calls.clone())).await;
        let adapter = adapter();
        let call = call(&endpoint, "mistral");
        adapter.preflight(&call).await.expect("listing failure is advisory");
        let completion = adapter.send(&call).await.expect("generate");
        assert_eq!(completion.text, "echo:write a scope");
        assert_eq!(completion.tokens_used, Some(42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_list_models_reads_tags() {
        let calls = Arc::new(AtomicUsize::new(0));
        let endpoint = spawn_stub(stub(
            json!({"models": [{"name": "phi3:latest"}, {"model": "qwen2.5:7b"}]}),
            calls,
        ))
        .await;
        let models = adapter().list_models(&endpoint).await.expect("models");
        assert_eq!(models, vec!["phi3:latest".to_string(), "qwen2.5:7b".to_string()]);
    }
}
