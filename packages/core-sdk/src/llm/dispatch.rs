use super::postprocess::normalize_content;
use super::{AdapterRegistry, BackendCall};
use crate::content_type::ContentType;
use crate::error::GenerationError;
use crate::models::{GenerationResult, ProviderDescriptor};
use crate::telemetry;

/**
 * \brief 分发一次调用：查表选适配器 -> 凭据检查 -> 预检 -> 发送 -> 归一化。
 * \details 任何一步失败都转换为 `success:false` 的结果，不向调用方抛错。
 *          凭据缺失在发出任何网络请求前返回。
 */
pub async fn dispatch(
    adapters: &AdapterRegistry,
    provider: &ProviderDescriptor,
    call: &BackendCall,
    content_type: Option<ContentType>,
) -> GenerationResult {
    let category = format!("dispatch.{}", provider.id);
    match run(adapters, provider, call, content_type).await {
        Ok(result) => {
            telemetry::log_event(
                &category,
                &format!(
                    "model={} tokens={}",
                    call.model,
                    result
                        .tokens_used
                        .map(|t| t.to_string())
                        .unwrap_or_else(|| "-".into())
                ),
            );
            result
        }
        Err(err) => {
            telemetry::log_error(&category, &format!("model={} error={}", call.model, err));
            GenerationResult::failure(&provider.id, &call.model, err.to_string())
        }
    }
}

async fn run(
    adapters: &AdapterRegistry,
    provider: &ProviderDescriptor,
    call: &BackendCall,
    content_type: Option<ContentType>,
) -> Result<GenerationResult, GenerationError> {
    let adapter = adapters.get(provider.kind).ok_or_else(|| {
        GenerationError::Configuration(format!(
            "no backend adapter registered for provider '{}'",
            provider.id
        ))
    })?;
    if provider.requires_credential && call.credential().is_none() {
        return Err(GenerationError::Configuration(format!(
            "{} requires an API key",
            provider.display_name
        )));
    }

    adapter.preflight(call).await?;
    let completion = adapter.send(call).await?;
    let content = normalize_content(content_type, &completion.text);
    Ok(GenerationResult::success(
        &provider.id,
        &call.model,
        content,
        completion.tokens_used,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ProviderCatalog;
    use crate::llm::{BackendAdapter, Completion};
    use crate::models::{BackendKind, GeneratedContent, Message, Role};
    use crate::settings::Settings;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingAdapter {
        kind: BackendKind,
        preflight_error: Option<fn() -> GenerationError>,
        reply: Result<&'static str, &'static str>,
        preflights: AtomicUsize,
        sends: AtomicUsize,
    }

    impl CountingAdapter {
        fn new(kind: BackendKind, reply: Result<&'static str, &'static str>) -> Self {
            Self {
                kind,
                preflight_error: None,
                reply,
                preflights: AtomicUsize::new(0),
                sends: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl BackendAdapter for CountingAdapter {
        fn kind(&self) -> BackendKind {
            self.kind
        }

        async fn preflight(&self, _call: &BackendCall) -> Result<(), GenerationError> {
            self.preflights.fetch_add(1, Ordering::SeqCst);
            match self.preflight_error {
                Some(make) => Err(make()),
                None => Ok(()),
            }
        }

        async fn send(&self, _call: &BackendCall) -> Result<Completion, GenerationError> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            match self.reply {
                Ok(text) => Ok(Completion {
                    text: text.to_string(),
                    tokens_used: Some(20),
                }),
                Err(msg) => Err(GenerationError::Protocol(msg.to_string())),
            }
        }
    }

    fn setup(adapter: Arc<CountingAdapter>) -> (AdapterRegistry, ProviderCatalog) {
        let mut registry = AdapterRegistry::empty();
        registry.register(adapter);
        (registry, ProviderCatalog::builtin(&Settings::default()))
    }

    fn call(model: &str, key: Option<&str>) -> BackendCall {
        BackendCall {
            model: model.into(),
            messages: vec![Message::new(Role::User, "write objectives")],
            temperature: 0.7,
            max_tokens: 100,
            credential: key.map(|k| k.to_string()),
            endpoint: "http://127.0.0.1:9".into(),
        }
    }

    #[tokio::test]
    async fn test_missing_credential_fails_before_network() {
        let adapter = Arc::new(CountingAdapter::new(BackendKind::OpenAI, Ok("x")));
        let (registry, catalog) = setup(adapter.clone());
        let provider = catalog.get_provider("openai").expect("openai");
        let result = dispatch(&registry, provider, &call("gpt-4o-mini", Some("  ")), None).await;
        assert!(!result.success);
        assert!(result.error.unwrap_or_default().contains("API key"));
        assert_eq!(adapter.preflights.load(Ordering::SeqCst), 0);
        assert_eq!(adapter.sends.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_preflight_failure_short_circuits() {
        let mut stub = CountingAdapter::new(BackendKind::Ollama, Ok("x"));
        stub.preflight_error = Some(|| GenerationError::ModelNotFound {
            model: "phi3".into(),
            remediation: "ollama pull phi3".into(),
        });
        let adapter = Arc::new(stub);
        let (registry, catalog) = setup(adapter.clone());
        let provider = catalog.get_provider("ollama").expect("ollama");
        let result = dispatch(&registry, provider, &call("phi3", None), None).await;
        assert!(!result.success);
        assert!(result.error.unwrap_or_default().contains("ollama pull phi3"));
        assert_eq!(adapter.sends.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_success_is_normalized_per_content_type() {
        let adapter = Arc::new(CountingAdapter::new(
            BackendKind::Claude,
            Ok(r#"["Assess X", "Evaluate Y"]"#),
        ));
        let (registry, catalog) = setup(adapter.clone());
        let provider = catalog.get_provider("anthropic").expect("anthropic");
        let result = dispatch(
            &registry,
            provider,
            &call("claude-3-5-haiku-latest", Some("k")),
            Some(ContentType::Objectives),
        )
        .await;
        assert!(result.success);
        assert_eq!(result.provider, "anthropic");
        assert_eq!(result.tokens_used, Some(20));
        assert_eq!(
            result.content,
            Some(GeneratedContent::List(vec!["Assess X".into(), "Evaluate Y".into()]))
        );
    }

    #[tokio::test]
    async fn test_backend_error_becomes_failure_result() {
        let adapter = Arc::new(CountingAdapter::new(BackendKind::Gemini, Err("503 overloaded")));
        let (registry, catalog) = setup(adapter.clone());
        let provider = catalog.get_provider("gemini").expect("gemini");
        let result = dispatch(&registry, provider, &call("gemini-1.5-pro", Some("k")), None).await;
        assert!(!result.success);
        assert_eq!(result.model, "gemini-1.5-pro");
        assert!(result.error.unwrap_or_default().contains("503 overloaded"));
        assert_eq!(adapter.sends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unregistered_backend_is_reported() {
        let adapter = Arc::new(CountingAdapter::new(BackendKind::Ollama, Ok("x")));
        let (registry, catalog) = setup(adapter);
        let provider = catalog.get_provider("openai").expect("openai");
        let result = dispatch(&registry, provider, &call("gpt-4o", Some("k")), None).await;
        assert!(!result.success);
        assert!(result.error.unwrap_or_default().contains("no backend adapter"));
    }
}
