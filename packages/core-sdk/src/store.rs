use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, bail, Result};
use rusqlite::Connection;
use time::OffsetDateTime;

use crate::db;
use crate::models::{
    GenerationConfiguration, GenerationLogEntry, Template, TemplateCriteria, TemplateDraft,
};

/**
 * \brief 生成配置存取。编排层只依赖本文件的 trait，`MemoryStore` 用于测试与无库场景。
 */
pub trait ConfigRepository: Send + Sync {
    fn get_config(&self, user_id: &str, provider: &str) -> Result<Option<GenerationConfiguration>>;
    fn get_active_config(&self, user_id: &str) -> Result<Option<GenerationConfiguration>>;
    fn list_configs(&self, user_id: &str) -> Result<Vec<GenerationConfiguration>>;
    fn upsert_config(&self, config: &GenerationConfiguration) -> Result<()>;
    fn delete_config(&self, user_id: &str, provider: &str) -> Result<bool>;
}

/**
 * \brief 模板存取。
 */
pub trait TemplateRepository: Send + Sync {
    fn list_templates(&self, criteria: &TemplateCriteria) -> Result<Vec<Template>>;
    fn get_template(&self, id: i64) -> Result<Option<Template>>;
    fn create_template(&self, draft: &TemplateDraft, now: OffsetDateTime) -> Result<Template>;
    fn update_template(&self, id: i64, draft: &TemplateDraft, now: OffsetDateTime) -> Result<Template>;
    fn delete_template(&self, id: i64) -> Result<()>;
}

/**
 * \brief 生成日志：只追加 + 查询。
 */
pub trait LogSink: Send + Sync {
    fn append(&self, entry: &GenerationLogEntry) -> Result<()>;
    /** \brief 用户全部日志，按写入顺序。 */
    fn entries_for(&self, user_id: &str) -> Result<Vec<GenerationLogEntry>>;
    /** \brief 最近的日志，新到旧。 */
    fn recent_for(&self, user_id: &str, limit: usize) -> Result<Vec<GenerationLogEntry>>;
}

/**
 * \brief 基于 SQLite 的存储实现。
 */
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /**
     * \brief 打开数据库文件并执行迁移。
     */
    pub fn open(path: &Path) -> Result<Self> {
        let conn = db::open_db(path)?;
        db::migrate(&conn)?;
        Ok(Self::from_connection(conn))
    }

    /**
     * \brief 内存数据库，测试使用。
     */
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        db::migrate(&conn)?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("sqlite connection mutex poisoned"))
    }

    pub fn telemetry_enabled(&self) -> Result<bool> {
        db::get_telemetry_enabled(&*self.conn()?)
    }

    pub fn set_telemetry_enabled(&self, enabled: bool) -> Result<()> {
        db::set_telemetry_enabled(&*self.conn()?, enabled)
    }
}

impl ConfigRepository for SqliteStore {
    fn get_config(&self, user_id: &str, provider: &str) -> Result<Option<GenerationConfiguration>> {
        db::get_config(&*self.conn()?, user_id, provider)
    }

    fn get_active_config(&self, user_id: &str) -> Result<Option<GenerationConfiguration>> {
        db::get_latest_active_config(&*self.conn()?, user_id)
    }

    fn list_configs(&self, user_id: &str) -> Result<Vec<GenerationConfiguration>> {
        db::list_configs(&*self.conn()?, user_id)
    }

    fn upsert_config(&self, config: &GenerationConfiguration) -> Result<()> {
        db::upsert_config(&*self.conn()?, config)
    }

    fn delete_config(&self, user_id: &str, provider: &str) -> Result<bool> {
        db::delete_config(&*self.conn()?, user_id, provider)
    }
}

impl TemplateRepository for SqliteStore {
    fn list_templates(&self, criteria: &TemplateCriteria) -> Result<Vec<Template>> {
        db::list_templates(&*self.conn()?, criteria)
    }

    fn get_template(&self, id: i64) -> Result<Option<Template>> {
        db::get_template(&*self.conn()?, id)
    }

    fn create_template(&self, draft: &TemplateDraft, now: OffsetDateTime) -> Result<Template> {
        db::insert_template(&*self.conn()?, draft, now)
    }

    fn update_template(&self, id: i64, draft: &TemplateDraft, now: OffsetDateTime) -> Result<Template> {
        db::update_template(&*self.conn()?, id, draft, now)
    }

    fn delete_template(&self, id: i64) -> Result<()> {
        db::delete_template(&*self.conn()?, id)
    }
}

impl LogSink for SqliteStore {
    fn append(&self, entry: &GenerationLogEntry) -> Result<()> {
        db::append_log(&*self.conn()?, entry)?;
        Ok(())
    }

    fn entries_for(&self, user_id: &str) -> Result<Vec<GenerationLogEntry>> {
        db::load_logs(&*self.conn()?, user_id)
    }

    fn recent_for(&self, user_id: &str, limit: usize) -> Result<Vec<GenerationLogEntry>> {
        db::recent_logs(&*self.conn()?, user_id, limit)
    }
}

/**
 * \brief 纯内存存储。
 */
#[derive(Default)]
pub struct MemoryStore {
    configs: Mutex<Vec<GenerationConfiguration>>,
    templates: Mutex<Vec<Template>>,
    logs: Mutex<Vec<GenerationLogEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /**
     * \brief 直接放入一条模板（保留调用方给定的 id 与时间戳）。
     */
    pub fn seed_template(&self, template: Template) -> Result<()> {
        lock(&self.templates)?.push(template);
        Ok(())
    }
}

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    m.lock().map_err(|_| anyhow!("memory store mutex poisoned"))
}

impl ConfigRepository for MemoryStore {
    fn get_config(&self, user_id: &str, provider: &str) -> Result<Option<GenerationConfiguration>> {
        Ok(lock(&self.configs)?
            .iter()
            .find(|c| c.user_id == user_id && c.provider == provider)
            .cloned())
    }

    fn get_active_config(&self, user_id: &str) -> Result<Option<GenerationConfiguration>> {
        Ok(lock(&self.configs)?
            .iter()
            .filter(|c| c.user_id == user_id && c.is_active)
            .max_by_key(|c| c.updated_at)
            .cloned())
    }

    fn list_configs(&self, user_id: &str) -> Result<Vec<GenerationConfiguration>> {
        Ok(lock(&self.configs)?
            .iter()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect())
    }

    fn upsert_config(&self, config: &GenerationConfiguration) -> Result<()> {
        let mut configs = lock(&self.configs)?;
        match configs
            .iter_mut()
            .find(|c| c.user_id == config.user_id && c.provider == config.provider)
        {
            Some(existing) => {
                let created_at = existing.created_at;
                *existing = config.clone();
                existing.created_at = created_at;
            }
            None => configs.push(config.clone()),
        }
        Ok(())
    }

    fn delete_config(&self, user_id: &str, provider: &str) -> Result<bool> {
        let mut configs = lock(&self.configs)?;
        let before = configs.len();
        configs.retain(|c| !(c.user_id == user_id && c.provider == provider));
        Ok(configs.len() != before)
    }
}

impl TemplateRepository for MemoryStore {
    fn list_templates(&self, criteria: &TemplateCriteria) -> Result<Vec<Template>> {
        fn matches(filter: &Option<String>, value: Option<&str>) -> bool {
            filter.as_deref().map_or(true, |f| value == Some(f))
        }
        Ok(lock(&self.templates)?
            .iter()
            .filter(|t| {
                matches(&criteria.content_type, Some(t.content_type.as_str()))
                    && matches(&criteria.industry, t.industry.as_deref())
                    && matches(&criteria.framework, t.framework.as_deref())
            })
            .cloned()
            .collect())
    }

    fn get_template(&self, id: i64) -> Result<Option<Template>> {
        Ok(lock(&self.templates)?.iter().find(|t| t.id == id).cloned())
    }

    fn create_template(&self, draft: &TemplateDraft, now: OffsetDateTime) -> Result<Template> {
        let mut templates = lock(&self.templates)?;
        let id = templates.iter().map(|t| t.id).max().unwrap_or(0) + 1;
        let template = Template {
            id,
            name: draft.name.clone(),
            content_type: draft.content_type.clone(),
            body: draft.body.clone(),
            industry: draft.industry.clone(),
            framework: draft.framework.clone(),
            is_active: draft.is_active,
            is_default: draft.is_default,
            version: draft.version,
            created_at: now,
            updated_at: now,
        };
        templates.push(template.clone());
        Ok(template)
    }

    fn update_template(&self, id: i64, draft: &TemplateDraft, now: OffsetDateTime) -> Result<Template> {
        let mut templates = lock(&self.templates)?;
        let Some(existing) = templates.iter_mut().find(|t| t.id == id) else {
            bail!("template id {} not found", id);
        };
        existing.name = draft.name.clone();
        existing.content_type = draft.content_type.clone();
        existing.body = draft.body.clone();
        existing.industry = draft.industry.clone();
        existing.framework = draft.framework.clone();
        existing.is_active = draft.is_active;
        existing.is_default = draft.is_default;
        existing.version = draft.version;
        existing.updated_at = now;
        Ok(existing.clone())
    }

    fn delete_template(&self, id: i64) -> Result<()> {
        let mut templates = lock(&self.templates)?;
        let before = templates.len();
        templates.retain(|t| t.id != id);
        if templates.len() == before {
            bail!("template id {} not found", id);
        }
        Ok(())
    }
}

impl LogSink for MemoryStore {
    fn append(&self, entry: &GenerationLogEntry) -> Result<()> {
        lock(&self.logs)?.push(entry.clone());
        Ok(())
    }

    fn entries_for(&self, user_id: &str) -> Result<Vec<GenerationLogEntry>> {
        Ok(lock(&self.logs)?
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect())
    }

    fn recent_for(&self, user_id: &str, limit: usize) -> Result<Vec<GenerationLogEntry>> {
        Ok(lock(&self.logs)?
            .iter()
            .rev()
            .filter(|e| e.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(model: &str) -> GenerationConfiguration {
        let now = OffsetDateTime::now_utc();
        GenerationConfiguration {
            user_id: "u1".into(),
            provider: "openai".into(),
            model: model.into(),
            api_key: None,
            endpoint: None,
            temperature: 0.4,
            max_tokens: 800,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn assert_upsert_roundtrip(repo: &dyn ConfigRepository) {
        repo.upsert_config(&config("gpt-4o-mini")).expect("first save");
        repo.upsert_config(&config("gpt-4o")).expect("second save");
        let fetched = repo
            .get_config("u1", "openai")
            .expect("fetch")
            .expect("present");
        assert_eq!(fetched.model, "gpt-4o");
        assert_eq!(repo.list_configs("u1").expect("list").len(), 1);
    }

    #[test]
    fn test_upsert_roundtrip_sqlite() {
        let store = SqliteStore::in_memory().expect("sqlite store");
        assert_upsert_roundtrip(&store);
    }

    #[test]
    fn test_upsert_roundtrip_memory() {
        assert_upsert_roundtrip(&MemoryStore::new());
    }

    #[test]
    fn test_memory_template_lifecycle() {
        let store = MemoryStore::new();
        let draft = TemplateDraft {
            name: "t".into(),
            content_type: "scope".into(),
            body: "{{scope}}".into(),
            industry: Some("banking".into()),
            framework: None,
            is_active: true,
            is_default: false,
            version: 1,
        };
        let created = store
            .create_template(&draft, OffsetDateTime::now_utc())
            .expect("create");
        let filtered = store
            .list_templates(&TemplateCriteria {
                industry: Some("banking".into()),
                ..TemplateCriteria::default()
            })
            .expect("list");
        assert_eq!(filtered.len(), 1);
        store.delete_template(created.id).expect("delete");
        assert!(store.delete_template(created.id).is_err());
    }

    #[test]
    fn test_memory_recent_logs_newest_first() {
        let store = MemoryStore::new();
        for i in 0..3 {
            store
                .append(&GenerationLogEntry {
                    user_id: "u1".into(),
                    provider: "ollama".into(),
                    model: "m".into(),
                    prompt: format!("p{}", i),
                    response: None,
                    tokens_used: None,
                    content_type: "scope".into(),
                    success: true,
                    error: None,
                    created_at: OffsetDateTime::now_utc(),
                })
                .expect("append");
        }
        let recent = store.recent_for("u1", 2).expect("recent");
        assert_eq!(recent[0].prompt, "p2");
        assert_eq!(recent.len(), 2);
    }
}
