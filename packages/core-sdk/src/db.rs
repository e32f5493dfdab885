use std::path::Path;
use std::{thread, time::Duration};

use anyhow::{bail, Result};
use rusqlite::{params, types::Type, Connection, ErrorCode, OptionalExtension, Row};
use time::{
    format_description::well_known::Rfc3339, macros::format_description, OffsetDateTime,
    UtcOffset,
};

use crate::models::{
    GenerationConfiguration, GenerationLogEntry, Template, TemplateCriteria, TemplateDraft,
};

/**
 * \brief 打开指定路径的数据库文件。
 */
pub fn open_db(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(conn)
}

/**
 * \brief 运行数据库迁移，创建必要表结构。
 */
pub fn migrate(conn: &Connection) -> Result<()> {
    retry_on_locked(|| {
        conn.execute_batch(
            r#"
        PRAGMA journal_mode=WAL;
        CREATE TABLE IF NOT EXISTS app_config (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS generation_configs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            provider TEXT NOT NULL,
            model TEXT NOT NULL,
            api_key TEXT,
            endpoint TEXT,
            temperature REAL NOT NULL DEFAULT 0.7,
            max_tokens INTEGER NOT NULL DEFAULT 2000,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(user_id, provider)
        );

        CREATE TABLE IF NOT EXISTS prompt_templates (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            content_type TEXT NOT NULL,
            body TEXT NOT NULL,
            industry TEXT,
            framework TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            is_default INTEGER NOT NULL DEFAULT 0,
            version INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_prompt_templates_type
            ON prompt_templates(content_type);

        CREATE TABLE IF NOT EXISTS generation_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            provider TEXT NOT NULL,
            model TEXT NOT NULL,
            prompt TEXT NOT NULL,
            response TEXT,
            tokens_used INTEGER,
            content_type TEXT NOT NULL,
            success INTEGER NOT NULL,
            error TEXT,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_generation_logs_user
            ON generation_logs(user_id);
        "#,
        )
    })?;
    Ok(())
}

fn set_bool_config(conn: &Connection, key: &str, value: bool) -> Result<()> {
    retry_on_locked(|| {
        conn.execute(
            "INSERT INTO app_config (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
            params![key, if value { "1" } else { "0" }],
        )
    })?;
    Ok(())
}

fn get_bool_config(conn: &Connection, key: &str, default: bool) -> Result<bool> {
    let val = conn
        .query_row(
            "SELECT value FROM app_config WHERE key=?1",
            params![key],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    Ok(val.map(|s| s == "1").unwrap_or(default))
}

/**
 * \brief 读取遥测开关。
 */
pub fn get_telemetry_enabled(conn: &Connection) -> Result<bool> {
    get_bool_config(conn, "telemetry_enabled", false)
}

/**
 * \brief 更新遥测开关。
 */
pub fn set_telemetry_enabled(conn: &Connection, enabled: bool) -> Result<()> {
    set_bool_config(conn, "telemetry_enabled", enabled)
}

/**
 * \brief 统一为 UTC、定长纳秒的 RFC 3339 文本，保证按字符串排序即按时间排序。
 */
fn format_ts(ts: OffsetDateTime) -> Result<String> {
    let format = format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:9]Z"
    );
    Ok(ts.to_offset(UtcOffset::UTC).format(&format)?)
}

fn ts_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<OffsetDateTime> {
    let raw: String = row.get(idx)?;
    OffsetDateTime::parse(&raw, &Rfc3339)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

const CONFIG_COLUMNS: &str = "user_id, provider, model, api_key, endpoint, temperature, max_tokens, is_active, created_at, updated_at";

fn map_config(row: &Row<'_>) -> rusqlite::Result<GenerationConfiguration> {
    Ok(GenerationConfiguration {
        user_id: row.get(0)?,
        provider: row.get(1)?,
        model: row.get(2)?,
        api_key: row.get(3)?,
        endpoint: row.get(4)?,
        temperature: row.get(5)?,
        max_tokens: row.get(6)?,
        is_active: row.get(7)?,
        created_at: ts_column(row, 8)?,
        updated_at: ts_column(row, 9)?,
    })
}

/**
 * \brief 写入生成配置；(user_id, provider) 已存在时覆盖，保留原创建时间。
 */
pub fn upsert_config(conn: &Connection, config: &GenerationConfiguration) -> Result<()> {
    let created_at = format_ts(config.created_at)?;
    let updated_at = format_ts(config.updated_at)?;
    retry_on_locked(|| {
        conn.execute(
            "INSERT INTO generation_configs (user_id, provider, model, api_key, endpoint, temperature, max_tokens, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(user_id, provider) DO UPDATE SET
                model=excluded.model,
                api_key=excluded.api_key,
                endpoint=excluded.endpoint,
                temperature=excluded.temperature,
                max_tokens=excluded.max_tokens,
                is_active=excluded.is_active,
                updated_at=excluded.updated_at",
            params![
                config.user_id,
                config.provider,
                config.model,
                config.api_key,
                config.endpoint,
                config.temperature,
                config.max_tokens,
                config.is_active,
                created_at,
                updated_at
            ],
        )
    })?;
    Ok(())
}

/**
 * \brief 按 (用户, Provider) 获取配置。
 */
pub fn get_config(
    conn: &Connection,
    user_id: &str,
    provider: &str,
) -> Result<Option<GenerationConfiguration>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM generation_configs WHERE user_id=?1 AND provider=?2",
            CONFIG_COLUMNS
        ),
        params![user_id, provider],
        map_config,
    )
    .optional()
    .map_err(Into::into)
}

/**
 * \brief 获取用户最近更新的有效配置。
 */
pub fn get_latest_active_config(
    conn: &Connection,
    user_id: &str,
) -> Result<Option<GenerationConfiguration>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM generation_configs WHERE user_id=?1 AND is_active=1
             ORDER BY updated_at DESC, id DESC LIMIT 1",
            CONFIG_COLUMNS
        ),
        params![user_id],
        map_config,
    )
    .optional()
    .map_err(Into::into)
}

/**
 * \brief 列出用户的全部配置。
 */
pub fn list_configs(conn: &Connection, user_id: &str) -> Result<Vec<GenerationConfiguration>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM generation_configs WHERE user_id=?1 ORDER BY id ASC",
        CONFIG_COLUMNS
    ))?;
    let rows = stmt
        .query_map(params![user_id], map_config)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/**
 * \brief 删除配置，返回是否存在。
 */
pub fn delete_config(conn: &Connection, user_id: &str, provider: &str) -> Result<bool> {
    let rows = retry_on_locked(|| {
        conn.execute(
            "DELETE FROM generation_configs WHERE user_id=?1 AND provider=?2",
            params![user_id, provider],
        )
    })?;
    Ok(rows > 0)
}

const TEMPLATE_COLUMNS: &str = "id, name, content_type, body, industry, framework, is_active, is_default, version, created_at, updated_at";

fn map_template(row: &Row<'_>) -> rusqlite::Result<Template> {
    Ok(Template {
        id: row.get(0)?,
        name: row.get(1)?,
        content_type: row.get(2)?,
        body: row.get(3)?,
        industry: row.get(4)?,
        framework: row.get(5)?,
        is_active: row.get(6)?,
        is_default: row.get(7)?,
        version: row.get(8)?,
        created_at: ts_column(row, 9)?,
        updated_at: ts_column(row, 10)?,
    })
}

/**
 * \brief 按条件列出模板（按 id 升序）。
 */
pub fn list_templates(conn: &Connection, criteria: &TemplateCriteria) -> Result<Vec<Template>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM prompt_templates
         WHERE (?1 IS NULL OR content_type=?1)
           AND (?2 IS NULL OR industry=?2)
           AND (?3 IS NULL OR framework=?3)
         ORDER BY id ASC",
        TEMPLATE_COLUMNS
    ))?;
    let rows = stmt
        .query_map(
            params![criteria.content_type, criteria.industry, criteria.framework],
            map_template,
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/**
 * \brief 按 ID 获取模板。
 */
pub fn get_template(conn: &Connection, id: i64) -> Result<Option<Template>> {
    conn.query_row(
        &format!("SELECT {} FROM prompt_templates WHERE id=?1", TEMPLATE_COLUMNS),
        params![id],
        map_template,
    )
    .optional()
    .map_err(Into::into)
}

/**
 * \brief 新增模板。
 */
pub fn insert_template(conn: &Connection, draft: &TemplateDraft, now: OffsetDateTime) -> Result<Template> {
    let ts = format_ts(now)?;
    retry_on_locked(|| {
        conn.execute(
            "INSERT INTO prompt_templates (name, content_type, body, industry, framework, is_active, is_default, version, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
            params![
                draft.name,
                draft.content_type,
                draft.body,
                draft.industry,
                draft.framework,
                draft.is_active,
                draft.is_default,
                draft.version,
                ts
            ],
        )
    })?;
    let id = conn.last_insert_rowid();
    match get_template(conn, id)? {
        Some(t) => Ok(t),
        None => bail!("template id {} vanished after insert", id),
    }
}

/**
 * \brief 更新模板，并刷新 updated_at。
 */
pub fn update_template(
    conn: &Connection,
    id: i64,
    draft: &TemplateDraft,
    now: OffsetDateTime,
) -> Result<Template> {
    let ts = format_ts(now)?;
    let rows = retry_on_locked(|| {
        conn.execute(
            "UPDATE prompt_templates SET name=?1, content_type=?2, body=?3, industry=?4, framework=?5,
                is_active=?6, is_default=?7, version=?8, updated_at=?9 WHERE id=?10",
            params![
                draft.name,
                draft.content_type,
                draft.body,
                draft.industry,
                draft.framework,
                draft.is_active,
                draft.is_default,
                draft.version,
                ts,
                id
            ],
        )
    })?;
    if rows == 0 {
        bail!("template id {} not found", id);
    }
    match get_template(conn, id)? {
        Some(t) => Ok(t),
        None => bail!("template id {} not found", id),
    }
}

/**
 * \brief 删除模板。
 */
pub fn delete_template(conn: &Connection, id: i64) -> Result<()> {
    let rows = retry_on_locked(|| conn.execute("DELETE FROM prompt_templates WHERE id=?1", params![id]))?;
    if rows == 0 {
        bail!("template id {} not found", id);
    }
    Ok(())
}

const LOG_COLUMNS: &str = "user_id, provider, model, prompt, response, tokens_used, content_type, success, error, created_at";

fn map_log(row: &Row<'_>) -> rusqlite::Result<GenerationLogEntry> {
    Ok(GenerationLogEntry {
        user_id: row.get(0)?,
        provider: row.get(1)?,
        model: row.get(2)?,
        prompt: row.get(3)?,
        response: row.get(4)?,
        tokens_used: row.get(5)?,
        content_type: row.get(6)?,
        success: row.get(7)?,
        error: row.get(8)?,
        created_at: ts_column(row, 9)?,
    })
}

/**
 * \brief 追加一条生成日志（只追加，无更新路径）。
 */
pub fn append_log(conn: &Connection, entry: &GenerationLogEntry) -> Result<i64> {
    let created_at = format_ts(entry.created_at)?;
    retry_on_locked(|| {
        conn.execute(
            "INSERT INTO generation_logs (user_id, provider, model, prompt, response, tokens_used, content_type, success, error, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                entry.user_id,
                entry.provider,
                entry.model,
                entry.prompt,
                entry.response,
                entry.tokens_used,
                entry.content_type,
                entry.success,
                entry.error,
                created_at
            ],
        )
    })?;
    Ok(conn.last_insert_rowid())
}

/**
 * \brief 读取用户全部日志，按写入顺序。
 */
pub fn load_logs(conn: &Connection, user_id: &str) -> Result<Vec<GenerationLogEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM generation_logs WHERE user_id=?1 ORDER BY id ASC",
        LOG_COLUMNS
    ))?;
    let rows = stmt
        .query_map(params![user_id], map_log)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/**
 * \brief 读取用户最近的日志（新到旧）。
 */
pub fn recent_logs(conn: &Connection, user_id: &str, limit: usize) -> Result<Vec<GenerationLogEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM generation_logs WHERE user_id=?1 ORDER BY id DESC LIMIT ?2",
        LOG_COLUMNS
    ))?;
    let rows = stmt
        .query_map(params![user_id, limit as i64], map_log)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/**
 * \brief 针对 SQLite 锁冲突的重试助手。
 * \details 捕获 `database is locked`/`database table is locked` 等错误并进行退避，最大尝试 6 次。
 */
fn retry_on_locked<T, F>(mut action: F) -> Result<T>
where
    F: FnMut() -> rusqlite::Result<T>,
{
    const MAX_RETRIES: usize = 5;
    for attempt in 0..=MAX_RETRIES {
        match action() {
            Ok(value) => return Ok(value),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if matches!(
                    err.code,
                    ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
                ) && attempt < MAX_RETRIES =>
            {
                let backoff = Duration::from_millis(200 * (attempt as u64 + 1));
                thread::sleep(backoff);
                continue;
            }
            Err(e) => return Err(e.into()),
        }
    }
    unreachable!("retry_on_locked should have returned within the loop");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mem_conn() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        migrate(&conn).expect("migrate");
        conn
    }

    fn config(user: &str, provider: &str, model: &str, temperature: f64) -> GenerationConfiguration {
        let now = OffsetDateTime::now_utc();
        GenerationConfiguration {
            user_id: user.into(),
            provider: provider.into(),
            model: model.into(),
            api_key: Some("sk-test".into()),
            endpoint: None,
            temperature,
            max_tokens: 1500,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn draft(content_type: &str, name: &str) -> TemplateDraft {
        TemplateDraft {
            name: name.into(),
            content_type: content_type.into(),
            body: "Write about {{title}}".into(),
            industry: None,
            framework: None,
            is_active: true,
            is_default: false,
            version: 1,
        }
    }

    #[test]
    fn test_config_upsert_keeps_single_row() {
        let conn = mem_conn();
        upsert_config(&conn, &config("u1", "openai", "gpt-4o-mini", 0.2)).expect("save 1");
        upsert_config(&conn, &config("u1", "openai", "gpt-4o", 0.9)).expect("save 2");
        upsert_config(&conn, &config("u1", "ollama", "mistral", 0.5)).expect("save 3");

        let all = list_configs(&conn, "u1").expect("list configs");
        assert_eq!(all.len(), 2);

        let one = get_config(&conn, "u1", "openai")
            .expect("get config")
            .expect("config exists");
        assert_eq!(one.model, "gpt-4o");
        assert_eq!(one.temperature, 0.9);
        assert_eq!(one.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_latest_active_config_and_delete() {
        let conn = mem_conn();
        let mut first = config("u1", "openai", "gpt-4o-mini", 0.2);
        first.updated_at = first.updated_at - time::Duration::minutes(5);
        upsert_config(&conn, &first).expect("save first");
        upsert_config(&conn, &config("u1", "anthropic", "claude-3-5-haiku-latest", 0.3))
            .expect("save second");

        let latest = get_latest_active_config(&conn, "u1")
            .expect("latest")
            .expect("exists");
        assert_eq!(latest.provider, "anthropic");

        assert!(delete_config(&conn, "u1", "anthropic").expect("delete"));
        assert!(!delete_config(&conn, "u1", "anthropic").expect("delete again"));
        assert!(get_latest_active_config(&conn, "u2").expect("other user").is_none());
    }

    #[test]
    fn test_template_crud_and_filter() {
        let conn = mem_conn();
        let created = insert_template(&conn, &draft("objectives", "obj"), OffsetDateTime::now_utc())
            .expect("insert");
        let mut scoped = draft("objectives", "obj-health");
        scoped.industry = Some("healthcare".into());
        insert_template(&conn, &scoped, OffsetDateTime::now_utc()).expect("insert scoped");
        insert_template(&conn, &draft("scope", "scope"), OffsetDateTime::now_utc())
            .expect("insert scope");

        let by_type = list_templates(
            &conn,
            &TemplateCriteria {
                content_type: Some("objectives".into()),
                ..TemplateCriteria::default()
            },
        )
        .expect("list");
        assert_eq!(by_type.len(), 2);

        let by_industry = list_templates(
            &conn,
            &TemplateCriteria {
                industry: Some("healthcare".into()),
                ..TemplateCriteria::default()
            },
        )
        .expect("list industry");
        assert_eq!(by_industry.len(), 1);
        assert_eq!(by_industry[0].name, "obj-health");

        let later = created.updated_at + time::Duration::seconds(30);
        let mut changed = draft("objectives", "obj-renamed");
        changed.version = 2;
        let updated = update_template(&conn, created.id, &changed, later).expect("update");
        assert_eq!(updated.name, "obj-renamed");
        assert_eq!(updated.version, 2);
        assert_eq!(updated.updated_at, later);
        assert_eq!(updated.created_at, created.created_at);

        delete_template(&conn, created.id).expect("delete");
        assert!(get_template(&conn, created.id).expect("get").is_none());
        assert!(delete_template(&conn, created.id).is_err());
        assert!(update_template(&conn, 999, &changed, later).is_err());
    }

    #[test]
    fn test_logs_append_and_order() {
        let conn = mem_conn();
        for (i, provider) in ["openai", "ollama", "openai"].iter().enumerate() {
            let entry = GenerationLogEntry {
                user_id: "u1".into(),
                provider: provider.to_string(),
                model: "m".into(),
                prompt: format!("prompt {}", i),
                response: Some("ok".into()),
                tokens_used: Some(10 * (i as u32 + 1)),
                content_type: "description".into(),
                success: i != 1,
                error: None,
                created_at: OffsetDateTime::now_utc(),
            };
            append_log(&conn, &entry).expect("append");
        }
        let all = load_logs(&conn, "u1").expect("load");
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].prompt, "prompt 0");
        assert!(!all[1].success);

        let recent = recent_logs(&conn, "u1", 2).expect("recent");
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].prompt, "prompt 2");
        assert!(load_logs(&conn, "nobody").expect("empty").is_empty());
    }

    #[test]
    fn test_telemetry_flag_roundtrip() {
        let conn = mem_conn();
        assert!(!get_telemetry_enabled(&conn).expect("default"));
        set_telemetry_enabled(&conn, true).expect("set");
        assert!(get_telemetry_enabled(&conn).expect("read back"));
    }
}
