use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/**
 * \brief 进程级配置：数据库位置、日志目录、各后端默认地址与超时。
 * \details 加载顺序：默认值 -> `AUDITSCRIBE_CONFIG` 指向的 JSON 文件 -> `AUDITSCRIBE_*` 环境变量。
 */
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database_path: PathBuf,
    pub log_dir: PathBuf,
    pub telemetry_enabled: bool,
    pub local_endpoint: String,
    pub openai_endpoint: String,
    pub anthropic_endpoint: String,
    pub gemini_endpoint: String,
    /** \brief 预检探活超时（秒），远小于生成超时。 */
    pub probe_timeout_secs: u64,
    pub generation_timeout_secs: u64,
    pub default_temperature: f64,
    pub default_max_tokens: u32,
    /** \brief 风险控制矩阵等复杂结构输出的最小 token 预算。 */
    pub matrix_min_tokens: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("auditscribe.db"),
            log_dir: PathBuf::from("logs"),
            telemetry_enabled: false,
            local_endpoint: "http://localhost:11434".to_string(),
            openai_endpoint: "https://api.openai.com".to_string(),
            anthropic_endpoint: "https://api.anthropic.com".to_string(),
            gemini_endpoint: "https://generativelanguage.googleapis.com".to_string(),
            probe_timeout_secs: 5,
            generation_timeout_secs: 120,
            default_temperature: 0.7,
            default_max_tokens: 2000,
            matrix_min_tokens: crate::prompts::MATRIX_MIN_TOKENS,
        }
    }
}

impl Settings {
    /**
     * \brief 加载配置并校验。
     */
    pub fn load() -> Result<Self> {
        let mut settings = match std::env::var("AUDITSCRIBE_CONFIG") {
            Ok(path) => Self::load_from(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("read settings file {}", path.display()))?;
        let settings: Settings = serde_json::from_str(&content)
            .with_context(|| format!("parse settings file {}", path.display()))?;
        Ok(settings)
    }

    fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("AUDITSCRIBE_DB") {
            self.database_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("AUDITSCRIBE_LOG_DIR") {
            self.log_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("AUDITSCRIBE_TELEMETRY") {
            self.telemetry_enabled = matches!(v.as_str(), "1" | "true" | "on");
        }
        if let Some(v) = lookup("AUDITSCRIBE_OLLAMA_URL") {
            self.local_endpoint = v;
        }
        if let Some(v) = lookup("AUDITSCRIBE_OPENAI_URL") {
            self.openai_endpoint = v;
        }
        if let Some(v) = lookup("AUDITSCRIBE_ANTHROPIC_URL") {
            self.anthropic_endpoint = v;
        }
        if let Some(v) = lookup("AUDITSCRIBE_GEMINI_URL") {
            self.gemini_endpoint = v;
        }
        if let Some(v) = lookup("AUDITSCRIBE_PROBE_TIMEOUT") {
            self.probe_timeout_secs = v
                .parse()
                .with_context(|| format!("invalid AUDITSCRIBE_PROBE_TIMEOUT: {}", v))?;
        }
        if let Some(v) = lookup("AUDITSCRIBE_GENERATION_TIMEOUT") {
            self.generation_timeout_secs = v
                .parse()
                .with_context(|| format!("invalid AUDITSCRIBE_GENERATION_TIMEOUT: {}", v))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.default_temperature) {
            bail!(
                "default_temperature must be within 0.0-2.0, got {}",
                self.default_temperature
            );
        }
        if self.probe_timeout_secs == 0 || self.generation_timeout_secs == 0 {
            bail!("timeouts must be greater than zero");
        }
        if self.default_max_tokens == 0 {
            bail!("default_max_tokens must be greater than zero");
        }
        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }
}
