use std::sync::Arc;

use anyhow::Result;

use crate::catalog::ProviderCatalog;
use crate::chat::prepare_messages;
use crate::config_store::ConfigStore;
use crate::error::GenerationError;
use crate::llm::dispatch::dispatch;
use crate::llm::{AdapterRegistry, BackendCall};
use crate::models::{
    BackendAvailability, ChatRequest, GenerationLogEntry, GenerationRequest, GenerationResult,
    GenerationStats, Message, ProviderDescriptor, Role, ANONYMOUS_USER,
};
use crate::outcomes::OutcomeLogger;
use crate::prompts::{build_enhanced_prompt, effective_max_tokens};
use crate::settings::Settings;
use crate::store::SqliteStore;
use crate::telemetry;
use crate::templates::TemplateCatalog;
use crate::utils::{sanitize_input, MAX_INPUT_CHARS};

/**
 * \brief 编排服务：校验 -> 解析配置 -> 构建提示词 -> 分发 -> 记录结果。
 * \details 所有协作者都由构造函数注入，生命周期归调用方（CLI / HTTP 服务的启动入口）所有。
 */
pub struct GenerationService {
    settings: Settings,
    catalog: ProviderCatalog,
    templates: TemplateCatalog,
    configs: ConfigStore,
    outcomes: OutcomeLogger,
    adapters: AdapterRegistry,
}

/**
 * \brief 请求中可覆盖的调用参数。
 */
struct Overrides<'a> {
    provider: &'a str,
    model: &'a str,
    api_key: Option<&'a str>,
    endpoint: Option<&'a str>,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
}

impl GenerationService {
    pub fn new(
        settings: Settings,
        catalog: ProviderCatalog,
        templates: TemplateCatalog,
        configs: ConfigStore,
        outcomes: OutcomeLogger,
        adapters: AdapterRegistry,
    ) -> Self {
        Self {
            settings,
            catalog,
            templates,
            configs,
            outcomes,
            adapters,
        }
    }

    /**
     * \brief 以单个 SQLite 存储同时承担配置、模板、日志，并注册内置适配器。
     */
    pub fn with_sqlite(settings: Settings, store: Arc<SqliteStore>) -> Result<Self> {
        let catalog = ProviderCatalog::builtin(&settings);
        let adapters = AdapterRegistry::with_defaults(&settings)?;
        let configs = ConfigStore::new(store.clone(), catalog.clone(), &settings);
        Ok(Self::new(
            settings,
            catalog,
            TemplateCatalog::new(store.clone()),
            configs,
            OutcomeLogger::new(store),
            adapters,
        ))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn catalog(&self) -> &ProviderCatalog {
        &self.catalog
    }

    pub fn templates(&self) -> &TemplateCatalog {
        &self.templates
    }

    pub fn configs(&self) -> &ConfigStore {
        &self.configs
    }

    /**
     * \brief 后端描述；本地运行时会查询已安装的模型。
     */
    pub async fn provider_models(
        &self,
        id: &str,
        endpoint_override: Option<&str>,
    ) -> Option<ProviderDescriptor> {
        self.catalog
            .list_providers_with_live_models(id, endpoint_override, &self.adapters)
            .await
    }

    /**
     * \brief 探活。未知后端返回配置错误；探活本身从不报错。
     */
    pub async fn check_availability(
        &self,
        id: &str,
        endpoint_override: Option<&str>,
    ) -> Result<BackendAvailability, GenerationError> {
        let provider = self
            .catalog
            .get_provider(id)
            .ok_or_else(|| GenerationError::Configuration(format!("unknown provider '{}'", id)))?;
        let adapter = self.adapters.get(provider.kind).ok_or_else(|| {
            GenerationError::Configuration(format!(
                "no backend adapter registered for provider '{}'",
                provider.id
            ))
        })?;
        let endpoint = endpoint_override
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .unwrap_or(provider.default_endpoint.as_str())
            .trim_end_matches('/')
            .to_string();
        Ok(adapter.check_availability(&endpoint).await)
    }

    /**
     * \brief 单次内容生成。任何失败都以 `success:false` 返回，并记录一条日志。
     */
    pub async fn generate(&self, user_id: Option<&str>, request: GenerationRequest) -> GenerationResult {
        let owner = user_id.unwrap_or(ANONYMOUS_USER);
        let mut request = request;
        request.context = sanitize_input(&request.context, MAX_INPUT_CHARS);

        let overrides = Overrides {
            provider: &request.provider,
            model: &request.model,
            api_key: request.api_key.as_deref(),
            endpoint: request.endpoint.as_deref(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };
        let (provider, mut call) = match self.resolve_call(user_id, &overrides) {
            Ok(resolved) => resolved,
            Err(e) => {
                let result = self.rejected(&request.provider, &request.model, e);
                self.outcomes.log_generation(owner, &request, "", &result);
                return result;
            }
        };
        call.max_tokens = effective_max_tokens(
            request.content_type,
            call.max_tokens,
            self.settings.matrix_min_tokens,
        );

        let prompt = build_enhanced_prompt(&request, &self.templates);
        if let Some(id) = prompt.template_id {
            telemetry::log_event(
                "prompt.template",
                &format!("using template {} for {}", id, request.content_type),
            );
        }
        call.messages = vec![Message::new(Role::User, prompt.text.clone())];

        let result = dispatch(&self.adapters, &provider, &call, Some(request.content_type)).await;
        self.outcomes.log_generation(owner, &request, &prompt.text, &result);
        result
    }

    /**
     * \brief 多轮对话。不支持原生多轮的后端会收到压平后的单条提示词。
     */
    pub async fn generate_chat(&self, user_id: Option<&str>, request: ChatRequest) -> GenerationResult {
        let owner = user_id.unwrap_or(ANONYMOUS_USER);
        let mut request = request;
        for message in &mut request.messages {
            message.content = sanitize_input(&message.content, MAX_INPUT_CHARS);
        }
        request.messages.retain(|m| !m.content.is_empty());

        let overrides = Overrides {
            provider: &request.provider,
            model: &request.model,
            api_key: request.api_key.as_deref(),
            endpoint: request.endpoint.as_deref(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };
        let resolved = self.resolve_call(user_id, &overrides).and_then(|resolved| {
            if request.messages.iter().any(|m| m.role == Role::User) {
                Ok(resolved)
            } else {
                Err(GenerationError::Configuration(
                    "chat request needs at least one user message".into(),
                ))
            }
        });
        let (provider, mut call) = match resolved {
            Ok(resolved) => resolved,
            Err(e) => {
                let result = self.rejected(&request.provider, &request.model, e);
                self.outcomes.log_chat_interaction(owner, &request, &result);
                return result;
            }
        };
        call.messages = prepare_messages(&provider, &request.messages);

        let result = dispatch(&self.adapters, &provider, &call, None).await;
        self.outcomes.log_chat_interaction(owner, &request, &result);
        result
    }

    pub fn stats(&self, user_id: Option<&str>) -> Result<GenerationStats> {
        self.outcomes
            .get_generation_stats(user_id.unwrap_or(ANONYMOUS_USER))
    }

    pub fn recent_logs(&self, user_id: Option<&str>, limit: usize) -> Result<Vec<GenerationLogEntry>> {
        self.outcomes
            .recent(user_id.unwrap_or(ANONYMOUS_USER), limit)
    }

    fn rejected(&self, provider: &str, model: &str, err: GenerationError) -> GenerationResult {
        telemetry::log_error(
            "dispatch.validate",
            &format!("provider={} model={} error={}", provider, model, err),
        );
        GenerationResult::failure(provider, model, err.to_string())
    }

    /**
     * \brief 校验 provider/model 并补全调用参数：请求覆盖 > 用户已保存配置 > 进程默认值。
     */
    fn resolve_call(
        &self,
        user_id: Option<&str>,
        overrides: &Overrides<'_>,
    ) -> Result<(ProviderDescriptor, BackendCall), GenerationError> {
        let provider_id = overrides.provider.trim();
        if provider_id.is_empty() {
            return Err(GenerationError::Configuration("provider is required".into()));
        }
        let model = overrides.model.trim();
        if model.is_empty() {
            return Err(GenerationError::Configuration("model is required".into()));
        }
        let provider = self
            .catalog
            .get_provider(provider_id)
            .ok_or_else(|| {
                GenerationError::Configuration(format!("unknown provider '{}'", provider_id))
            })?
            .clone();

        // 没有保存过的配置时，resolve 返回按进程默认值构造的配置
        let config = self.configs.resolve(user_id, Some(&provider.id));

        let credential =
            non_blank(overrides.api_key).or_else(|| non_blank(config.api_key.as_deref()));
        let endpoint = non_blank(overrides.endpoint)
            .or_else(|| non_blank(config.endpoint.as_deref()))
            .unwrap_or_else(|| provider.default_endpoint.clone())
            .trim_end_matches('/')
            .to_string();
        let temperature = overrides.temperature.unwrap_or(config.temperature);
        if !(0.0..=2.0).contains(&temperature) {
            return Err(GenerationError::Configuration(format!(
                "temperature must be within 0.0-2.0, got {}",
                temperature
            )));
        }
        let max_tokens = overrides.max_tokens.unwrap_or(config.max_tokens);
        if max_tokens == 0 {
            return Err(GenerationError::Configuration(
                "max_tokens must be greater than 0".into(),
            ));
        }

        let call = BackendCall {
            model: model.to_string(),
            messages: Vec::new(),
            temperature,
            max_tokens,
            credential,
            endpoint,
        };
        Ok((provider, call))
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content_type::ContentType;
    use crate::llm::{BackendAdapter, Completion};
    use crate::models::{BackendKind, ConfigDraft, ContextFields, GeneratedContent, TemplateDraft};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const ECHO: &str = "The Q3 Data Privacy Review assesses consent and retention controls.";

    struct EchoAdapter {
        kind: BackendKind,
        sends: AtomicUsize,
        last: Mutex<Option<BackendCall>>,
    }

    impl EchoAdapter {
        fn new(kind: BackendKind) -> Arc<Self> {
            Arc::new(Self {
                kind,
                sends: AtomicUsize::new(0),
                last: Mutex::new(None),
            })
        }

        fn last_call(&self) -> BackendCall {
            self.last.lock().expect("lock").clone().expect("a call was sent")
        }
    }

    #[async_trait]
    impl BackendAdapter for EchoAdapter {
        fn kind(&self) -> BackendKind {
            self.kind
        }

        async fn send(&self, call: &BackendCall) -> Result<Completion, GenerationError> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().expect("lock") = Some(call.clone());
            Ok(Completion {
                text: ECHO.to_string(),
                tokens_used: Some(64),
            })
        }
    }

    fn service(adapters: &[Arc<EchoAdapter>]) -> (GenerationService, Arc<MemoryStore>) {
        let settings = Settings::default();
        let store = Arc::new(MemoryStore::new());
        let catalog = ProviderCatalog::builtin(&settings);
        let mut registry = AdapterRegistry::empty();
        for adapter in adapters {
            registry.register(adapter.clone());
        }
        let configs = ConfigStore::new(store.clone(), catalog.clone(), &settings);
        let service = GenerationService::new(
            settings,
            catalog,
            TemplateCatalog::new(store.clone()),
            configs,
            OutcomeLogger::new(store.clone()),
            registry,
        );
        (service, store)
    }

    fn description_request(provider: &str, model: &str) -> GenerationRequest {
        let mut request = GenerationRequest::new(provider, model, ContentType::Description);
        request.context = "Annual review of personal data handling".into();
        request.fields = ContextFields::with_title("Q3 Data Privacy Review");
        request
    }

    #[tokio::test]
    async fn test_end_to_end_description() {
        let echo = EchoAdapter::new(BackendKind::Ollama);
        let (service, _) = service(&[echo.clone()]);
        let result = service
            .generate(None, description_request("ollama", "llama3.1:8b"))
            .await;
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.content, Some(GeneratedContent::Text(ECHO.to_string())));
        assert_eq!(result.provider, "ollama");
        assert_eq!(result.model, "llama3.1:8b");

        let call = echo.last_call();
        assert!(call.messages[0].content.contains("Q3 Data Privacy Review"));
        assert_eq!(call.endpoint, "http://localhost:11434");

        let stats = service.stats(None).expect("stats");
        assert_eq!(stats.total, 1);
        assert_eq!(stats.most_used_field_type, "description");
    }

    #[tokio::test]
    async fn test_hosted_without_key_never_sends() {
        let echo = EchoAdapter::new(BackendKind::OpenAI);
        let (service, _) = service(&[echo.clone()]);
        let result = service
            .generate(Some("u1"), description_request("openai", "gpt-4o-mini"))
            .await;
        assert!(!result.success);
        assert_eq!(echo.sends.load(Ordering::SeqCst), 0);
        assert_eq!(service.stats(Some("u1")).expect("stats").failed, 1);
    }

    #[tokio::test]
    async fn test_saved_config_fills_credential_and_limits() {
        let echo = EchoAdapter::new(BackendKind::Claude);
        let (service, _) = service(&[echo.clone()]);
        let mut draft = ConfigDraft::new("anthropic");
        draft.api_key = Some("ak-saved".into());
        draft.endpoint = Some("https://proxy.internal/".into());
        draft.temperature = Some(0.1);
        draft.max_tokens = Some(900);
        service.configs().save(Some("u1"), &draft).expect("save");

        let result = service
            .generate(Some("u1"), description_request("anthropic", "claude-3-5-haiku-latest"))
            .await;
        assert!(result.success, "{:?}", result.error);
        let call = echo.last_call();
        assert_eq!(call.credential.as_deref(), Some("ak-saved"));
        assert_eq!(call.endpoint, "https://proxy.internal");
        assert_eq!(call.temperature, 0.1);
        assert_eq!(call.max_tokens, 900);

        let mut request = description_request("anthropic", "claude-3-5-haiku-latest");
        request.content_type = ContentType::RiskControlMatrix;
        request.max_tokens = Some(500);
        service.generate(Some("u1"), request).await;
        assert_eq!(echo.last_call().max_tokens, 4000);
    }

    #[tokio::test]
    async fn test_validation_failures_are_results() {
        let (service, _) = service(&[]);
        let blank = service.generate(None, description_request("", "m")).await;
        assert!(!blank.success);
        assert!(blank.error.unwrap_or_default().contains("provider is required"));

        let unknown = service.generate(None, description_request("cohere", "command")).await;
        assert!(!unknown.success);
        assert!(unknown.error.unwrap_or_default().contains("unknown provider"));

        let mut hot = description_request("ollama", "mistral");
        hot.temperature = Some(3.0);
        assert!(!service.generate(None, hot).await.success);
        assert_eq!(service.stats(None).expect("stats").total, 3);
    }

    #[tokio::test]
    async fn test_matching_template_is_used() {
        let echo = EchoAdapter::new(BackendKind::Ollama);
        let (service, _) = service(&[echo.clone()]);
        service
            .templates()
            .create(&TemplateDraft {
                name: "Banking description".into(),
                content_type: "description".into(),
                body: "Describe {{title}} for a bank.".into(),
                industry: Some("Banking".into()),
                framework: None,
                is_active: true,
                is_default: false,
                version: 1,
            })
            .expect("create template");

        let mut request = description_request("ollama", "mistral");
        request.industry = Some("banking".into());
        service.generate(None, request).await;
        let prompt = &echo.last_call().messages[0].content;
        assert!(prompt.starts_with("Describe Q3 Data Privacy Review for a bank."));
    }

    #[tokio::test]
    async fn test_chat_is_flattened_for_local_runtime() {
        let echo = EchoAdapter::new(BackendKind::Ollama);
        let (service, store) = service(&[echo.clone()]);
        let request = ChatRequest {
            provider: "ollama".into(),
            model: "mistral".into(),
            messages: vec![
                Message::new(Role::System, "You are a privacy officer."),
                Message::new(Role::User, "What is a DPIA?\u{0}"),
            ],
            api_key: None,
            endpoint: None,
            temperature: None,
            max_tokens: None,
        };
        let result = service.generate_chat(Some("u2"), request).await;
        assert!(result.success);
        let call = echo.last_call();
        assert_eq!(call.messages.len(), 1);
        assert!(call.messages[0].content.starts_with("You are a privacy officer."));
        assert!(call.messages[0].content.contains("USER: What is a DPIA?\n"));

        use crate::store::LogSink;
        let logs = store.entries_for("u2").expect("logs");
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].content_type, "chat");
    }

    #[tokio::test]
    async fn test_chat_without_user_message_is_rejected() {
        let echo = EchoAdapter::new(BackendKind::OpenAI);
        let (service, _) = service(&[echo.clone()]);
        let request = ChatRequest {
            provider: "openai".into(),
            model: "gpt-4o".into(),
            messages: vec![Message::new(Role::System, "setup only")],
            api_key: Some("k".into()),
            endpoint: None,
            temperature: None,
            max_tokens: None,
        };
        let result = service.generate_chat(None, request).await;
        assert!(!result.success);
        assert_eq!(echo.sends.load(Ordering::SeqCst), 0);
    }
}
