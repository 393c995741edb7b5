//! OpenAPI documentation and schema generation
//!
//! This module defines the OpenAPI specification for the doctrans REST API
//! using utoipa for compile-time document generation.

use utoipa::OpenApi;

/// OpenAPI documentation for the doctrans REST API
///
/// The OpenAPI document can be accessed via:
/// - `/openapi.json` - JSON format OpenAPI specification
/// - `/swagger-ui` - Interactive Swagger UI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "doctrans REST API",
        version = "0.1.0",
        description = "Submit PDF documents for translation, follow progress and download the results",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:8000", description = "Local development server")
    ),
    paths(
        // Uploads and submission
        crate::api::routes::upload_file,
        crate::api::routes::translate,
        crate::api::routes::translate_json,

        // Tasks
        crate::api::routes::list_tasks,
        crate::api::routes::get_task,
        crate::api::routes::delete_task,
        crate::api::routes::cancel_task,
        crate::api::routes::download_output,
        crate::api::routes::batch_download,
        crate::api::routes::task_stats,

        // Progress events
        crate::api::routes::task_events,
        crate::api::routes::all_events,

        // Cache
        crate::api::routes::cache_stats,
        crate::api::routes::clear_cache,

        // System
        crate::api::routes::health_check,
        crate::api::routes::get_config,
        crate::api::routes::openapi_spec,
    ),
    components(schemas(
        // Core types from types.rs
        crate::types::TaskId,
        crate::types::TaskStatus,
        crate::types::TaskInfo,
        crate::types::TaskStats,
        crate::types::TranslationOptions,
        crate::types::OutputMode,
        crate::types::WatermarkMode,
        crate::types::OutputFile,
        crate::types::OutputFileType,
        crate::types::ProgressEvent,
        crate::types::CacheRole,
        crate::types::CacheStats,
        crate::types::UploadInfo,
        crate::tasks::TaskPage,
        crate::limiter::LimiterSnapshot,

        // API request/response types from routes
        crate::api::routes::TaskListQuery,
        crate::api::routes::DownloadQuery,
        crate::api::routes::BatchDownloadRequest,
        crate::api::routes::ClearCacheQuery,
        crate::api::routes::TranslateJsonRequest,
        crate::api::routes::SubmitResponse,
        crate::api::routes::CacheStatsResponse,
        crate::api::routes::ClearCacheResponse,
        crate::api::routes::ServiceConfig,
        crate::api::routes::LanguageInfo,
        crate::api::routes::EngineInfo,

        // Error types from error.rs
        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "uploads", description = "Uploads - Store PDFs and submit translation tasks"),
        (name = "tasks", description = "Tasks - Query, cancel, delete and download translation tasks"),
        (name = "events", description = "Progress events - Server-sent event streams per task or for all tasks"),
        (name = "cache", description = "Cache - Usage statistics and clearing of the upload and result caches"),
        (name = "system", description = "System endpoints - Health checks, service configuration, OpenAPI document"),
    )
)]
pub struct ApiDoc;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_doc_has_paths() {
        let doc = ApiDoc::openapi();

        for path in [
            "/upload",
            "/translate",
            "/translate/json",
            "/tasks",
            "/tasks/{id}",
            "/tasks/{id}/cancel",
            "/tasks/{id}/download",
            "/tasks/download/batch",
            "/tasks/{id}/events",
            "/events",
            "/cache/stats",
            "/cache/clear",
            "/health",
            "/config",
        ] {
            assert!(
                doc.paths.paths.contains_key(path),
                "OpenAPI document should include {path}"
            );
        }
    }

    #[test]
    fn test_openapi_doc_has_components() {
        let doc = ApiDoc::openapi();
        let components = doc.components.expect("components defined");

        for schema in ["TaskInfo", "TranslationOptions", "ApiError", "CacheStats"] {
            assert!(
                components.schemas.contains_key(schema),
                "missing schema {schema}"
            );
        }
    }

    #[test]
    fn test_openapi_doc_has_tags() {
        let doc = ApiDoc::openapi();
        let tags = doc.tags.expect("tags defined");

        let tag_names: Vec<&str> = tags.iter().map(|t| t.name.as_str()).collect();
        assert!(tag_names.contains(&"tasks"), "Should have 'tasks' tag");
        assert!(tag_names.contains(&"cache"), "Should have 'cache' tag");
        assert!(tag_names.contains(&"system"), "Should have 'system' tag");
    }

    #[test]
    fn test_openapi_doc_info() {
        let doc = ApiDoc::openapi();

        assert_eq!(doc.info.title, "doctrans REST API");
        assert!(doc.info.description.is_some());
    }

    #[test]
    fn test_openapi_json_serialization() {
        let doc = ApiDoc::openapi();

        let json = serde_json::to_string(&doc).expect("Should serialize to JSON");
        let value: serde_json::Value =
            serde_json::from_str(&json).expect("Generated JSON should be valid");
        assert!(value["openapi"].as_str().unwrap().starts_with("3."));
    }
}
