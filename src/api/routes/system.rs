//! System handlers: health, service configuration, OpenAPI.

use crate::api::AppState;
use crate::types::{SUPPORTED_LANGUAGES, TranslationOptions};
use axum::{Json, extract::State, response::IntoResponse};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// A language accepted for `lang_in` / `lang_out`
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct LanguageInfo {
    /// Language code
    pub code: String,
    /// Display name
    pub name: String,
}

/// Translation engine in use
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct EngineInfo {
    /// Implementation name
    pub name: String,
    /// Whether tasks can actually be translated
    pub available: bool,
}

/// Capabilities and limits clients need before submitting
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ServiceConfig {
    /// Accepted languages
    pub supported_languages: Vec<LanguageInfo>,
    /// Options used when a submission omits them
    pub default_options: TranslationOptions,
    /// Largest accepted upload in bytes
    pub max_file_size: u64,
    /// Current concurrency bound
    pub max_concurrent_tasks: usize,
    /// Translation engine in use
    pub engine: EngineInfo,
}

/// GET /health - Health check
#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    responses(
        (status = 200, description = "Service is healthy")
    )
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": if state.registry.is_accepting() { "ok" } else { "shutting_down" },
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.started_at.elapsed().as_secs(),
    }))
}

/// GET /config - Supported languages, default options and limits
#[utoipa::path(
    get,
    path = "/config",
    tag = "system",
    responses(
        (status = 200, description = "Service configuration", body = ServiceConfig)
    )
)]
pub async fn get_config(State(state): State<AppState>) -> Json<ServiceConfig> {
    let engine = state.registry.engine();
    Json(ServiceConfig {
        supported_languages: SUPPORTED_LANGUAGES
            .iter()
            .map(|(code, name)| LanguageInfo {
                code: code.to_string(),
                name: name.to_string(),
            })
            .collect(),
        default_options: TranslationOptions::default(),
        max_file_size: state.config.tasks.max_file_size,
        max_concurrent_tasks: state.registry.max_concurrent(),
        engine: EngineInfo {
            name: engine.name().to_string(),
            available: engine.is_available(),
        },
    })
}

/// GET /openapi.json - OpenAPI specification
#[utoipa::path(
    get,
    path = "/openapi.json",
    tag = "system",
    responses(
        (status = 200, description = "OpenAPI 3.1 specification in JSON format")
    )
)]
pub async fn openapi_spec() -> impl IntoResponse {
    use crate::api::openapi::ApiDoc;
    use utoipa::OpenApi;

    Json(ApiDoc::openapi())
}
