use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::{anyhow, bail, Result};
use time::OffsetDateTime;

use crate::catalog::ProviderCatalog;
use crate::models::{ConfigDraft, GenerationConfiguration, ANONYMOUS_USER};
use crate::settings::Settings;
use crate::store::ConfigRepository;
use crate::telemetry;

/** \brief 没有任何配置时使用的后端。 */
pub const DEFAULT_PROVIDER: &str = "ollama";

/**
 * \brief 生成配置存取适配层。
 * \details 读取分两步，均可单独调用：`load_persisted` 只查持久化存储；`local_config` 返回进程内配置
 *          （未认证调用方保存的配置，或由进程默认值构造）。`resolve` 先走第一步，没有结果或存储出错时再走第二步。
 */
pub struct ConfigStore {
    repo: Arc<dyn ConfigRepository>,
    catalog: ProviderCatalog,
    default_temperature: f64,
    default_max_tokens: u32,
    /** \brief 未认证调用方的配置，按 provider 存放 */
    local: RwLock<HashMap<String, GenerationConfiguration>>,
}

impl ConfigStore {
    pub fn new(repo: Arc<dyn ConfigRepository>, catalog: ProviderCatalog, settings: &Settings) -> Self {
        Self {
            repo,
            catalog,
            default_temperature: settings.default_temperature,
            default_max_tokens: settings.default_max_tokens,
            local: RwLock::new(HashMap::new()),
        }
    }

    /**
     * \brief 第一步：只查持久化存储。provider 为空时取最近更新的启用配置。
     */
    pub fn load_persisted(
        &self,
        user_id: &str,
        provider: Option<&str>,
    ) -> Result<Option<GenerationConfiguration>> {
        match provider {
            Some(p) => self.repo.get_config(user_id, &self.canonical_provider(p)),
            None => self.repo.get_active_config(user_id),
        }
    }

    /**
     * \brief 第二步：进程内配置；没有保存过时按进程默认值构造。
     */
    pub fn local_config(&self, provider: Option<&str>) -> GenerationConfiguration {
        let saved = self.local.read().ok().and_then(|map| match provider {
            Some(p) => map.get(&self.canonical_provider(p)).cloned(),
            None => map
                .values()
                .filter(|c| c.is_active)
                .max_by_key(|c| c.updated_at)
                .cloned(),
        });
        saved.unwrap_or_else(|| self.default_config(provider.unwrap_or(DEFAULT_PROVIDER)))
    }

    /**
     * \brief 已认证调用方先查存储，没有结果或存储失败时回退到进程内配置；未认证直接使用进程内配置。
     */
    pub fn resolve(&self, user_id: Option<&str>, provider: Option<&str>) -> GenerationConfiguration {
        let Some(user_id) = user_id else {
            return self.local_config(provider);
        };
        match self.load_persisted(user_id, provider) {
            Ok(Some(config)) => config,
            Ok(None) => self.local_config(provider),
            Err(e) => {
                telemetry::log_warn(
                    "config.store",
                    &format!("falling back to local config for {}: {}", user_id, e),
                );
                self.local_config(provider)
            }
        }
    }

    /**
     * \brief 保存配置；同一 (user, provider) 重复保存会覆盖而不是新增。
     */
    pub fn save(&self, user_id: Option<&str>, draft: &ConfigDraft) -> Result<GenerationConfiguration> {
        let descriptor = self
            .catalog
            .get_provider(&draft.provider)
            .ok_or_else(|| anyhow!("unknown provider '{}'", draft.provider))?;
        let temperature = draft.temperature.unwrap_or(self.default_temperature);
        if !(0.0..=2.0).contains(&temperature) {
            bail!("temperature must be within 0.0-2.0, got {}", temperature);
        }
        let max_tokens = draft.max_tokens.unwrap_or(self.default_max_tokens);
        if max_tokens == 0 {
            bail!("max_tokens must be greater than 0");
        }
        let model = draft
            .model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(descriptor.default_model.as_str())
            .to_string();

        let now = OffsetDateTime::now_utc();
        let config = GenerationConfiguration {
            user_id: user_id.unwrap_or(ANONYMOUS_USER).to_string(),
            provider: descriptor.id.clone(),
            model,
            api_key: non_blank(draft.api_key.as_deref()),
            endpoint: non_blank(draft.endpoint.as_deref()).map(|e| e.trim_end_matches('/').to_string()),
            temperature,
            max_tokens,
            is_active: draft.is_active,
            created_at: now,
            updated_at: now,
        };

        match user_id {
            Some(_) => {
                self.repo.upsert_config(&config)?;
                telemetry::log_event(
                    "config.store",
                    &format!("saved {} config for {}", config.provider, config.user_id),
                );
                // 返回库中的记录以带上原始 created_at
                Ok(self
                    .repo
                    .get_config(&config.user_id, &config.provider)?
                    .unwrap_or(config))
            }
            None => {
                let mut map = self
                    .local
                    .write()
                    .map_err(|_| anyhow!("local config lock poisoned"))?;
                let created_at = map
                    .get(&config.provider)
                    .map(|c| c.created_at)
                    .unwrap_or(now);
                let config = GenerationConfiguration { created_at, ..config };
                map.insert(config.provider.clone(), config.clone());
                Ok(config)
            }
        }
    }

    pub fn list(&self, user_id: Option<&str>) -> Result<Vec<GenerationConfiguration>> {
        match user_id {
            Some(u) => self.repo.list_configs(u),
            None => {
                let map = self
                    .local
                    .read()
                    .map_err(|_| anyhow!("local config lock poisoned"))?;
                let mut configs: Vec<_> = map.values().cloned().collect();
                configs.sort_by(|a, b| a.provider.cmp(&b.provider));
                Ok(configs)
            }
        }
    }

    pub fn delete(&self, user_id: Option<&str>, provider: &str) -> Result<bool> {
        let provider = self.canonical_provider(provider);
        match user_id {
            Some(u) => self.repo.delete_config(u, &provider),
            None => Ok(self
                .local
                .write()
                .map_err(|_| anyhow!("local config lock poisoned"))?
                .remove(&provider)
                .is_some()),
        }
    }

    fn default_config(&self, provider: &str) -> GenerationConfiguration {
        let descriptor = self
            .catalog
            .get_provider(provider)
            .or_else(|| self.catalog.get_provider(DEFAULT_PROVIDER));
        let now = OffsetDateTime::now_utc();
        GenerationConfiguration {
            user_id: ANONYMOUS_USER.to_string(),
            provider: descriptor
                .map(|d| d.id.clone())
                .unwrap_or_else(|| provider.to_string()),
            model: descriptor.map(|d| d.default_model.clone()).unwrap_or_default(),
            api_key: None,
            endpoint: None,
            temperature: self.default_temperature,
            max_tokens: self.default_max_tokens,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn canonical_provider(&self, provider: &str) -> String {
        self.catalog
            .get_provider(provider)
            .map(|d| d.id.clone())
            .unwrap_or_else(|| provider.trim().to_string())
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
    use crate::store::{MemoryStore, SqliteStore};

    struct BrokenRepo;

    impl ConfigRepository for BrokenRepo {
        fn get_config(&self, _: &str, _: &str) -> Result<Option<GenerationConfiguration>> {
            bail!("database is locked")
        }
        fn get_active_config(&self, _: &str) -> Result<Option<GenerationConfiguration>> {
            bail!("database is locked")
        }
        fn list_configs(&self, _: &str) -> Result<Vec<GenerationConfiguration>> {
            bail!("database is locked")
        }
        fn upsert_config(&self, _: &GenerationConfiguration) -> Result<()> {
            bail!("database is locked")
        }
        fn delete_config(&self, _: &str, _: &str) -> Result<bool> {
            bail!("database is locked")
        }
    }

    fn store_with(repo: Arc<dyn ConfigRepository>) -> ConfigStore {
        let settings = Settings::default();
        ConfigStore::new(repo, ProviderCatalog::builtin(&settings), &settings)
    }

    #[test]
    fn test_two_saves_keep_one_record() {
        let store = store_with(Arc::new(SqliteStore::in_memory().expect("sqlite")));
        let mut draft = ConfigDraft::new("openai");
        draft.api_key = Some("sk-1".into());
        draft.temperature = Some(0.2);
        let first = store.save(Some("u1"), &draft).expect("first save");

        draft.model = Some("gpt-4o".into());
        draft.api_key = Some("sk-2".into());
        store.save(Some("u1"), &draft).expect("second save");

        let configs = store.list(Some("u1")).expect("list");
        assert_eq!(configs.len(), 1);
        let loaded = store
            .load_persisted("u1", Some("OpenAI"))
            .expect("load")
            .expect("present");
        assert_eq!(loaded.model, "gpt-4o");
        assert_eq!(loaded.api_key.as_deref(), Some("sk-2"));
        assert_eq!(loaded.created_at, first.created_at);
    }

    #[test]
    fn test_anonymous_uses_local_config() {
        let repo = Arc::new(MemoryStore::new());
        let store = store_with(repo.clone());
        let fallback = store.resolve(None, None);
        assert_eq!(fallback.provider, DEFAULT_PROVIDER);
        assert_eq!(fallback.model, "llama3.1:8b");

        let mut draft = ConfigDraft::new("gemini");
        draft.api_key = Some("g".into());
        store.save(None, &draft).expect("local save");
        assert_eq!(store.resolve(None, None).provider, "gemini");
        assert!(repo.list_configs(ANONYMOUS_USER).expect("list").is_empty());
    }

    #[test]
    fn test_storage_failure_falls_back_to_local() {
        let store = store_with(Arc::new(BrokenRepo));
        assert!(store.load_persisted("u1", Some("openai")).is_err());
        let config = store.resolve(Some("u1"), Some("openai"));
        assert_eq!(config.provider, "openai");
        assert_eq!(config.model, "gpt-4o-mini");
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_save_rejects_bad_input() {
        let store = store_with(Arc::new(MemoryStore::new()));
        assert!(store.save(Some("u1"), &ConfigDraft::new("cohere")).is_err());
        let mut draft = ConfigDraft::new("openai");
        draft.temperature = Some(2.5);
        assert!(store.save(Some("u1"), &draft).is_err());
    }
}
