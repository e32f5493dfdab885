use crate::llm::AdapterRegistry;
use crate::models::{BackendKind, ProviderDescriptor};
use crate::settings::Settings;
use crate::telemetry;

/**
 * \brief 后端目录：进程启动时构建，之后只读，可跨请求共享。
 */
#[derive(Debug, Clone)]
pub struct ProviderCatalog {
    providers: Vec<ProviderDescriptor>,
}

fn descriptor(
    id: &str,
    display_name: &str,
    kind: BackendKind,
    endpoint: &str,
    models: &[&str],
) -> ProviderDescriptor {
    ProviderDescriptor {
        id: id.to_string(),
        display_name: display_name.to_string(),
        kind,
        requires_credential: kind != BackendKind::Ollama,
        models: models.iter().map(|m| m.to_string()).collect(),
        default_model: models.first().map(|m| m.to_string()).unwrap_or_default(),
        default_endpoint: endpoint.trim_end_matches('/').to_string(),
        multi_turn: kind != BackendKind::Ollama,
    }
}

impl ProviderCatalog {
    /**
     * \brief 内置的四个后端，默认地址取自配置。
     */
    pub fn builtin(settings: &Settings) -> Self {
        Self {
            providers: vec![
                descriptor(
                    "ollama",
                    "Ollama (local)",
                    BackendKind::Ollama,
                    &settings.local_endpoint,
                    &["llama3.1:8b", "llama3.2", "mistral", "qwen2.5:7b", "phi3"],
                ),
                descriptor(
                    "openai",
                    "OpenAI",
                    BackendKind::OpenAI,
                    &settings.openai_endpoint,
                    &["gpt-4o-mini", "gpt-4o", "gpt-4-turbo", "gpt-3.5-turbo"],
                ),
                descriptor(
                    "anthropic",
                    "Anthropic Claude",
                    BackendKind::Claude,
                    &settings.anthropic_endpoint,
                    &[
                        "claude-3-5-sonnet-latest",
                        "claude-3-5-haiku-latest",
                        "claude-3-opus-latest",
                    ],
                ),
                descriptor(
                    "gemini",
                    "Google Gemini",
                    BackendKind::Gemini,
                    &settings.gemini_endpoint,
                    &["gemini-1.5-flash", "gemini-1.5-pro", "gemini-2.0-flash"],
                ),
            ],
        }
    }

    pub fn from_descriptors(providers: Vec<ProviderDescriptor>) -> Self {
        Self { providers }
    }

    /**
     * \brief 列出全部后端。
     */
    pub fn list_providers(&self) -> &[ProviderDescriptor] {
        &self.providers
    }

    /**
     * \brief 按 id 查找后端（大小写不敏感）。
     */
    pub fn get_provider(&self, id: &str) -> Option<&ProviderDescriptor> {
        let id = id.trim();
        self.providers
            .iter()
            .find(|p| p.id.eq_ignore_ascii_case(id))
    }

    /**
     * \brief 返回后端描述；本地运行时额外查询已安装模型替换静态列表。
     * \details 查询失败时静默回退到静态列表。
     */
    pub async fn list_providers_with_live_models(
        &self,
        id: &str,
        endpoint_override: Option<&str>,
        adapters: &AdapterRegistry,
    ) -> Option<ProviderDescriptor> {
        let mut provider = self.get_provider(id)?.clone();
        if provider.kind != BackendKind::Ollama {
            return Some(provider);
        }
        let Some(adapter) = adapters.get(provider.kind) else {
            return Some(provider);
        };
        let endpoint = endpoint_override
            .map(|e| e.trim_end_matches('/').to_string())
            .unwrap_or_else(|| provider.default_endpoint.clone());
        match adapter.list_models(&endpoint).await {
            Ok(models) if !models.is_empty() => {
                if !models.contains(&provider.default_model) {
                    provider.default_model = models[0].clone();
                }
                provider.models = models;
            }
            Ok(_) => {}
            Err(e) => {
                telemetry::log_warn(
                    "catalog.models",
                    &format!("live model listing failed for {}: {}", endpoint, e),
                );
            }
        }
        Some(provider)
    }
}
