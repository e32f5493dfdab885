use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::models::{
    BackendAvailability, ChatRequest, ConfigDraft, GenerationConfiguration, GenerationLogEntry,
    GenerationRequest, GenerationResult, GenerationStats, ProviderDescriptor, Template,
    TemplateCriteria, TemplateDraft,
};
use crate::service::GenerationService;
use crate::telemetry;

/** \brief 调用方身份头；缺失时按匿名处理。 */
pub const USER_HEADER: &str = "x-user-id";

const DEFAULT_LOG_LIMIT: usize = 50;

type ApiError = (StatusCode, String);
type Shared = State<Arc<GenerationService>>;

/**
 * \brief 启动本地 HTTP 服务。
 * \param addr 监听地址，如 "127.0.0.1:5173"
 */
pub async fn run(addr: &str, service: Arc<GenerationService>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    println!("Server listening on http://{}", addr);
    telemetry::log_event("server.start", &format!("listening on {}", addr));
    axum::serve(listener, router(service)).await?;
    Ok(())
}

/**
 * \brief 组装全部 API 路由。
 */
pub fn router(service: Arc<GenerationService>) -> Router {
    Router::new()
        .route("/api/providers", get(list_providers))
        .route("/api/providers/{id}/models", get(provider_models))
        .route("/api/providers/{id}/availability", get(provider_availability))
        .route("/api/configs", get(list_configs).post(save_config))
        .route("/api/configs/{provider}", delete(delete_config))
        .route("/api/templates", get(list_templates).post(create_template))
        .route(
            "/api/templates/{id}",
            put(update_template).delete(delete_template),
        )
        .route("/api/generate", post(generate))
        .route("/api/chat", post(chat))
        .route("/api/stats", get(stats))
        .route("/api/logs", get(recent_logs))
        .route("/api/health", get(health_check))
        .with_state(service)
}

#[derive(Deserialize, Debug)]
struct EndpointQuery {
    /** \brief 临时覆盖的后端地址。 */
    #[serde(default)]
    endpoint: Option<String>,
}

#[derive(Deserialize, Debug)]
struct LogQuery {
    #[serde(default)]
    limit: Option<usize>,
}

/**
 * \brief 对外返回的配置，密钥只保留末尾 4 位。
 */
#[derive(Serialize, Debug)]
struct ConfigView {
    provider: String,
    model: String,
    api_key: Option<String>,
    endpoint: Option<String>,
    temperature: f64,
    max_tokens: u32,
    is_active: bool,
}

impl From<GenerationConfiguration> for ConfigView {
    fn from(config: GenerationConfiguration) -> Self {
        Self {
            provider: config.provider,
            model: config.model,
            api_key: config.api_key.as_deref().map(mask_key),
            endpoint: config.endpoint,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            is_active: config.is_active,
        }
    }
}

fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{}", tail)
}

fn caller(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn internal_err<E: std::fmt::Display>(e: E) -> ApiError {
    telemetry::log_error("server.request", &e.to_string());
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

fn bad_request<E: std::fmt::Display>(e: E) -> ApiError {
    (StatusCode::BAD_REQUEST, e.to_string())
}

fn not_found(message: String) -> ApiError {
    (StatusCode::NOT_FOUND, message)
}

async fn list_providers(State(service): Shared) -> Json<Vec<ProviderDescriptor>> {
    Json(service.catalog().list_providers().to_vec())
}

/**
 * \brief 后端描述；本地运行时的模型列表按实际安装情况返回。
 */
async fn provider_models(
    State(service): Shared,
    Path(id): Path<String>,
    Query(q): Query<EndpointQuery>,
) -> Result<Json<ProviderDescriptor>, ApiError> {
    service
        .provider_models(&id, q.endpoint.as_deref())
        .await
        .map(Json)
        .ok_or_else(|| not_found(format!("unknown provider '{}'", id)))
}

async fn provider_availability(
    State(service): Shared,
    Path(id): Path<String>,
    Query(q): Query<EndpointQuery>,
) -> Result<Json<BackendAvailability>, ApiError> {
    service
        .check_availability(&id, q.endpoint.as_deref())
        .await
        .map(Json)
        .map_err(|e| not_found(e.to_string()))
}

async fn list_configs(
    State(service): Shared,
    headers: HeaderMap,
) -> Result<Json<Vec<ConfigView>>, ApiError> {
    let user = caller(&headers);
    let configs = service
        .configs()
        .list(user.as_deref())
        .map_err(internal_err)?;
    Ok(Json(configs.into_iter().map(ConfigView::from).collect()))
}

async fn save_config(
    State(service): Shared,
    headers: HeaderMap,
    Json(draft): Json<ConfigDraft>,
) -> Result<Json<ConfigView>, ApiError> {
    let user = caller(&headers);
    let saved = service
        .configs()
        .save(user.as_deref(), &draft)
        .map_err(bad_request)?;
    telemetry::log_event(
        "server.config",
        &format!("saved {} config for {}", saved.provider, saved.user_id),
    );
    Ok(Json(saved.into()))
}

async fn delete_config(
    State(service): Shared,
    headers: HeaderMap,
    Path(provider): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = caller(&headers);
    let deleted = service
        .configs()
        .delete(user.as_deref(), &provider)
        .map_err(internal_err)?;
    Ok(Json(json!({ "deleted": deleted })))
}

async fn list_templates(
    State(service): Shared,
    Query(criteria): Query<TemplateCriteria>,
) -> Result<Json<Vec<Template>>, ApiError> {
    service
        .templates()
        .list_templates(&criteria)
        .map(Json)
        .map_err(internal_err)
}

async fn create_template(
    State(service): Shared,
    Json(draft): Json<TemplateDraft>,
) -> Result<Json<Template>, ApiError> {
    service
        .templates()
        .create(&draft)
        .map(Json)
        .map_err(bad_request)
}

async fn update_template(
    State(service): Shared,
    Path(id): Path<i64>,
    Json(draft): Json<TemplateDraft>,
) -> Result<Json<Template>, ApiError> {
    let templates = service.templates();
    if templates.get_template(id).map_err(internal_err)?.is_none() {
        return Err(not_found(format!("template id {} not found", id)));
    }
    templates.update(id, &draft).map(Json).map_err(bad_request)
}

async fn delete_template(
    State(service): Shared,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let templates = service.templates();
    if templates.get_template(id).map_err(internal_err)?.is_none() {
        return Err(not_found(format!("template id {} not found", id)));
    }
    templates.delete(id).map_err(internal_err)?;
    Ok(StatusCode::NO_CONTENT)
}

/**
 * \brief 内容生成。失败也以 200 返回，错误在结果的 `error` 字段里。
 */
async fn generate(
    State(service): Shared,
    headers: HeaderMap,
    Json(request): Json<GenerationRequest>,
) -> Json<GenerationResult> {
    let user = caller(&headers);
    telemetry::log_event(
        "server.generate",
        &format!(
            "provider={} model={} type={}",
            request.provider, request.model, request.content_type
        ),
    );
    Json(service.generate(user.as_deref(), request).await)
}

async fn chat(
    State(service): Shared,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Json<GenerationResult> {
    let user = caller(&headers);
    telemetry::log_event(
        "server.chat",
        &format!(
            "provider={} model={} messages={}",
            request.provider,
            request.model,
            request.messages.len()
        ),
    );
    Json(service.generate_chat(user.as_deref(), request).await)
}

async fn stats(
    State(service): Shared,
    headers: HeaderMap,
) -> Result<Json<GenerationStats>, ApiError> {
    let user = caller(&headers);
    service
        .stats(user.as_deref())
        .map(Json)
        .map_err(internal_err)
}

async fn recent_logs(
    State(service): Shared,
    headers: HeaderMap,
    Query(q): Query<LogQuery>,
) -> Result<Json<Vec<GenerationLogEntry>>, ApiError> {
    let user = caller(&headers);
    service
        .recent_logs(user.as_deref(), q.limit.unwrap_or(DEFAULT_LOG_LIMIT))
        .map(Json)
        .map_err(internal_err)
}

async fn health_check(State(service): Shared) -> Json<serde_json::Value> {
    Json(json!({
        "ok": true,
        "providers": service.catalog().list_providers().len(),
        "telemetry": telemetry::is_enabled(),
    }))
}
