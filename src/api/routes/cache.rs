//! Cache handlers.

use super::ClearCacheQuery;
use crate::api::AppState;
use crate::types::{CacheRole, CacheStats};
use axum::{
    Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};

/// Usage of both cache stores
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CacheStatsResponse {
    /// Upload store
    pub upload: CacheStats,
    /// Result store
    pub result: CacheStats,
}

/// Entries removed by DELETE /cache/clear
#[derive(Debug, Default, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ClearCacheResponse {
    /// Entries removed from the upload store (absent when not cleared)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload: Option<usize>,
    /// Entries removed from the result store (absent when not cleared)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<usize>,
}

/// GET /cache/stats - Usage of the upload and result caches
#[utoipa::path(
    get,
    path = "/cache/stats",
    tag = "cache",
    responses(
        (status = 200, description = "Cache usage", body = CacheStatsResponse)
    )
)]
pub async fn cache_stats(State(state): State<AppState>) -> Json<CacheStatsResponse> {
    let (upload, result) = tokio::join!(
        state.registry.uploads().stats(),
        state.registry.results().stats()
    );
    Json(CacheStatsResponse { upload, result })
}

/// DELETE /cache/clear - Remove every entry from one or both caches
///
/// Tasks referring to cleared entries are not touched here; a later download
/// reports the output as gone, and the janitor fails tasks whose input vanished.
#[utoipa::path(
    delete,
    path = "/cache/clear",
    tag = "cache",
    params(ClearCacheQuery),
    responses(
        (status = 200, description = "Entries removed per cache", body = ClearCacheResponse),
        (status = 400, description = "Unknown cache name")
    )
)]
pub async fn clear_cache(
    State(state): State<AppState>,
    Query(query): Query<ClearCacheQuery>,
) -> Json<ClearCacheResponse> {
    let mut response = ClearCacheResponse::default();

    if matches!(query.cache, None | Some(CacheRole::Upload)) {
        response.upload = Some(state.registry.uploads().clear().await);
    }
    if matches!(query.cache, None | Some(CacheRole::Result)) {
        response.result = Some(state.registry.results().clear().await);
    }

    tracing::info!(
        upload = ?response.upload,
        result = ?response.result,
        "cache cleared via API"
    );
    Json(response)
}
