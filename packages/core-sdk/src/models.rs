use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::content_type::ContentType;

/** \brief 未提供字段时写入提示词的占位文本。 */
pub const NOT_SPECIFIED: &str = "Not specified";

/** \brief 未认证调用方的日志归属。 */
pub const ANONYMOUS_USER: &str = "anonymous";

/**
 * \brief 后端类型，决定请求/响应格式与鉴权方式。
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /** \brief 本地运行时（Ollama 兼容）。 */
    Ollama,
    /** \brief Chat Completions 接口，Bearer 鉴权。 */
    OpenAI,
    /** \brief Messages 接口，x-api-key 鉴权。 */
    Claude,
    /** \brief generateContent 接口，x-goog-api-key 鉴权。 */
    Gemini,
}

/**
 * \brief 后端描述（进程启动时确定，只读）。
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    pub id: String,
    pub display_name: String,
    pub kind: BackendKind,
    pub requires_credential: bool,
    /** \brief 支持的模型，按推荐顺序。 */
    pub models: Vec<String>,
    pub default_model: String,
    pub default_endpoint: String,
    /** \brief 是否原生支持多轮对话。 */
    pub multi_turn: bool,
}

/**
 * \brief 用户生成配置，(user_id, provider) 唯一。
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfiguration {
    pub user_id: String,
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    /** \brief 取值 0.0–2.0 */
    pub temperature: f64,
    pub max_tokens: u32,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/**
 * \brief 保存配置时的输入；未给出的采样参数使用进程默认值。
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigDraft {
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl ConfigDraft {
    pub fn new(provider: &str) -> Self {
        Self {
            provider: provider.to_string(),
            model: None,
            api_key: None,
            endpoint: None,
            temperature: None,
            max_tokens: None,
            is_active: true,
        }
    }
}

/**
 * \brief 提示词模板。
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: i64,
    pub name: String,
    pub content_type: String,
    /** \brief 含 `{{placeholder}}` 的模板正文 */
    pub body: String,
    pub industry: Option<String>,
    pub framework: Option<String>,
    pub is_active: bool,
    pub is_default: bool,
    pub version: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/**
 * \brief 新建/更新模板时的输入。
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateDraft {
    pub name: String,
    pub content_type: String,
    pub body: String,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub framework: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default = "default_version")]
    pub version: i64,
}

fn default_true() -> bool {
    true
}

fn default_version() -> i64 {
    1
}

/**
 * \brief 模板查询条件，字段为空表示不过滤。
 */
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateCriteria {
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub framework: Option<String>,
}

/**
 * \brief 请求携带的结构化上下文：通用字段 + 各分类的子对象。
 */
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextFields {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub business_unit: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    /** \brief 分类相关的子对象，如 `vendor`、`privacy`、`training` 等。 */
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl ContextFields {
    pub fn with_title(title: &str) -> Self {
        Self {
            title: Some(title.to_string()),
            ..Self::default()
        }
    }

    /**
     * \brief 按点分路径读取字段，如 `title`、`vendor.name`；空值视为缺失。
     */
    pub fn lookup(&self, path: &str) -> Option<String> {
        let direct = match path {
            "title" => Some(&self.title),
            "type" => Some(&self.kind),
            "businessUnit" | "business_unit" => Some(&self.business_unit),
            "scope" => Some(&self.scope),
            _ => None,
        };
        if let Some(value) = direct {
            return value
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string);
        }

        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.details.get(first)?;
        for segment in segments {
            current = current.get(segment)?;
        }
        render_value(current)
    }

    /**
     * \brief 读取字段，缺失时返回 "Not specified"。
     */
    pub fn text_or_default(&self, path: &str) -> String {
        self.lookup(path)
            .unwrap_or_else(|| NOT_SPECIFIED.to_string())
    }
}

fn render_value(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(render_value)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(_) => value.to_string(),
        other => other.to_string(),
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/**
 * \brief 单次内容生成请求。
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub context: String,
    pub content_type: ContentType,
    #[serde(default)]
    pub fields: ContextFields,
    #[serde(default)]
    pub template_id: Option<i64>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub framework: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl GenerationRequest {
    pub fn new(provider: &str, model: &str, content_type: ContentType) -> Self {
        Self {
            provider: provider.to_string(),
            model: model.to_string(),
            context: String::new(),
            content_type,
            fields: ContextFields::default(),
            template_id: None,
            industry: None,
            framework: None,
            temperature: None,
            max_tokens: None,
            api_key: None,
            endpoint: None,
        }
    }
}

/**
 * \brief 归一化后的生成内容：文本，或按内容类型解析出的结构化值。
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GeneratedContent {
    Text(String),
    List(Vec<String>),
    Structured(Value),
}

impl GeneratedContent {
    /**
     * \brief 转为文本（用于日志记录）。
     */
    pub fn to_text(&self) -> String {
        match self {
            GeneratedContent::Text(text) => text.clone(),
            GeneratedContent::List(items) => {
                serde_json::to_string(items).unwrap_or_else(|_| items.join("\n"))
            }
            GeneratedContent::Structured(value) => value.to_string(),
        }
    }
}

/**
 * \brief 统一结果契约，各后端响应都归一化为此结构。
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub success: bool,
    #[serde(default)]
    pub content: Option<GeneratedContent>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub tokens_used: Option<u32>,
    pub model: String,
    pub provider: String,
}

impl GenerationResult {
    pub fn success(
        provider: &str,
        model: &str,
        content: GeneratedContent,
        tokens_used: Option<u32>,
    ) -> Self {
        Self {
            success: true,
            content: Some(content),
            error: None,
            tokens_used,
            model: model.to_string(),
            provider: provider.to_string(),
        }
    }

    pub fn failure(provider: &str, model: &str, error: impl Into<String>) -> Self {
        Self {
            success: false,
            content: None,
            error: Some(error.into()),
            tokens_used: None,
            model: model.to_string(),
            provider: provider.to_string(),
        }
    }

    pub fn text(&self) -> Option<String> {
        self.content.as_ref().map(GeneratedContent::to_text)
    }
}

/**
 * \brief 消息角色。
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/**
 * \brief 消息结构，与 OpenAI Chat 消息格式对齐。
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /** \brief 角色：system/user/assistant */
    pub role: Role,
    /** \brief 内容 */
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/**
 * \brief 多轮对话请求。
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub provider: String,
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

/**
 * \brief 生成日志，创建后不可修改。
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationLogEntry {
    pub user_id: String,
    pub provider: String,
    pub model: String,
    pub prompt: String,
    pub response: Option<String>,
    pub tokens_used: Option<u32>,
    pub content_type: String,
    pub success: bool,
    pub error: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/**
 * \brief 预检结果，不落库。
 */
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendAvailability {
    pub running: bool,
    pub models: Vec<String>,
    pub error: Option<String>,
}

/**
 * \brief 用户维度的生成统计。
 */
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationStats {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub average_tokens: u64,
    pub most_used_provider: String,
    pub most_used_field_type: String,
}
