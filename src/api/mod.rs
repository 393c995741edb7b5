//! REST API server module
//!
//! Provides an OpenAPI 3.1 compliant REST API for submitting documents,
//! following task progress and downloading translated outputs.

use crate::{Result, TaskRegistry};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{delete, get, post},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Headroom over the file size limit for multipart framing and form fields
const BODY_OVERHEAD: u64 = 1024 * 1024;

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Uploads and submission
/// - `POST /upload` - Store a PDF, returns its `file_id`
/// - `POST /translate` - Submit from an inline `file` or a `file_id` (multipart)
/// - `POST /translate/json` - Submit from a `file_id` (JSON)
///
/// ## Tasks
/// - `GET /tasks` - List tasks (with pagination)
/// - `GET /tasks/:id` - Get single task
/// - `DELETE /tasks/:id` - Delete task and its outputs
/// - `POST /tasks/:id/cancel` - Cancel task
/// - `GET /tasks/:id/download` - Download one output
/// - `POST /tasks/download/batch` - Download outputs of several tasks as a zip
/// - `GET /stats` - Task counts and admission state
///
/// ## Progress events
/// - `GET /tasks/:id/events` - Server-sent events for one task
/// - `GET /events` - Server-sent events for all tasks
///
/// ## Cache
/// - `GET /cache/stats` - Cache usage
/// - `DELETE /cache/clear` - Clear one or both caches
///
/// ## System
/// - `GET /health` - Health check
/// - `GET /config` - Supported languages, default options and limits
/// - `GET /openapi.json` - OpenAPI specification
/// - `GET /swagger-ui` - Interactive Swagger UI documentation (if enabled)
pub fn create_router(registry: TaskRegistry) -> Router {
    let state = AppState::new(registry);
    let config = state.config.clone();

    let router = Router::new()
        // Uploads and submission
        .route("/upload", post(routes::upload_file))
        .route("/translate", post(routes::translate))
        .route("/translate/json", post(routes::translate_json))
        // Tasks
        .route("/tasks", get(routes::list_tasks))
        .route("/tasks/download/batch", post(routes::batch_download))
        .route("/tasks/:id", get(routes::get_task))
        .route("/tasks/:id", delete(routes::delete_task))
        .route("/tasks/:id/cancel", post(routes::cancel_task))
        .route("/tasks/:id/download", get(routes::download_output))
        .route("/stats", get(routes::task_stats))
        // Progress events
        .route("/tasks/:id/events", get(routes::task_events))
        .route("/events", get(routes::all_events))
        // Cache
        .route("/cache/stats", get(routes::cache_stats))
        .route("/cache/clear", delete(routes::clear_cache))
        // System
        .route("/health", get(routes::health_check))
        .route("/config", get(routes::get_config))
        .route("/openapi.json", get(routes::openapi_spec));

    // Swagger UI serves the OpenAPI document from its own route, merged before state is applied
    let router = if config.api.swagger_ui {
        router.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
    } else {
        router
    };

    let body_limit = config.tasks.max_file_size.saturating_add(BODY_OVERHEAD);
    let router = router
        .with_state(state)
        .layer(DefaultBodyLimit::max(
            usize::try_from(body_limit).unwrap_or(usize::MAX),
        ));

    let router = if config.api.debug {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    };

    if config.api.cors_enabled {
        router.layer(build_cors_layer(&config.api.cors_origins))
    } else {
        router
    }
}

/// Build a CORS layer based on configured origins
///
/// `"*"` (or an empty list) allows any origin; otherwise only the listed
/// origins are allowed. Methods and headers are unrestricted.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Start the API server on the configured bind address.
///
/// Serves until `shutdown` is cancelled, then stops accepting connections and
/// waits for in-flight requests to finish. Open event streams end once their
/// task reaches a terminal state, so callers usually shut the registry down
/// before awaiting this future to completion.
///
/// # Example
///
/// ```no_run
/// use doctrans::{Config, TaskRegistry};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let registry = TaskRegistry::open(Config::default()).await?;
/// let shutdown = CancellationToken::new();
///
/// // Serves until the token is cancelled
/// doctrans::api::start_api_server(registry, shutdown).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(registry: TaskRegistry, shutdown: CancellationToken) -> Result<()> {
    let bind_address = registry.config().api.bind_address;

    tracing::info!(
        address = %bind_address,
        "Starting API server"
    );

    let app = create_router(registry);

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(
        address = %bind_address,
        "API server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
