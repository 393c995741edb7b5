//! Task query, control and download handlers.

use super::{BatchDownloadRequest, DownloadQuery, TaskListQuery, parse_task_id};
use crate::api::AppState;
use crate::error::{Error, Result};
use crate::tasks::TaskPage;
use crate::types::{OutputFile, OutputFileType, TaskId, TaskInfo, TaskStatus};
use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use regex::Regex;
use serde_json::json;
use std::io::Write;
use std::sync::OnceLock;

/// GET /tasks - List tasks, oldest first
#[utoipa::path(
    get,
    path = "/tasks",
    tag = "tasks",
    params(TaskListQuery),
    responses(
        (status = 200, description = "One page of tasks", body = TaskPage)
    )
)]
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<TaskListQuery>,
) -> Json<TaskPage> {
    Json(
        state
            .registry
            .list_page(query.page, query.page_size, query.status),
    )
}

/// GET /tasks/:id - Get single task
#[utoipa::path(
    get,
    path = "/tasks/{id}",
    tag = "tasks",
    params(
        ("id" = String, Path, description = "Task ID")
    ),
    responses(
        (status = 200, description = "Task information", body = TaskInfo),
        (status = 404, description = "Task not found")
    )
)]
pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TaskInfo>> {
    let id = parse_task_id(&id)?;
    Ok(Json(state.registry.get(id)?))
}

/// DELETE /tasks/:id - Delete a task and its outputs
#[utoipa::path(
    delete,
    path = "/tasks/{id}",
    tag = "tasks",
    params(
        ("id" = String, Path, description = "Task ID")
    ),
    responses(
        (status = 204, description = "Task deleted"),
        (status = 404, description = "Task not found"),
        (status = 409, description = "Task is processing")
    )
)]
pub async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let id = parse_task_id(&id)?;
    state.registry.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /tasks/:id/cancel - Cancel a pending or processing task
#[utoipa::path(
    post,
    path = "/tasks/{id}/cancel",
    tag = "tasks",
    params(
        ("id" = String, Path, description = "Task ID")
    ),
    responses(
        (status = 200, description = "Task cancelled, or cancellation requested", body = TaskInfo),
        (status = 404, description = "Task not found"),
        (status = 409, description = "Task already finished")
    )
)]
pub async fn cancel_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TaskInfo>> {
    let id = parse_task_id(&id)?;
    Ok(Json(state.registry.cancel(id)?))
}

/// GET /tasks/:id/download - Download one output of a completed task
#[utoipa::path(
    get,
    path = "/tasks/{id}/download",
    tag = "tasks",
    params(
        ("id" = String, Path, description = "Task ID"),
        DownloadQuery
    ),
    responses(
        (status = 200, description = "Output file contents", content_type = "application/octet-stream"),
        (status = 404, description = "Task unknown, not completed, or output evicted")
    )
)]
pub async fn download_output(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response> {
    let id = parse_task_id(&id)?;
    let (output, file) = state.registry.download(id, query.file_type).await?;
    let bytes = file.read().await?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        sanitize_name(&output.file_name)
    );
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, output.file_type.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from(bytes),
    )
        .into_response())
}

/// POST /tasks/download/batch - Download outputs of several tasks as one zip archive
#[utoipa::path(
    post,
    path = "/tasks/download/batch",
    tag = "tasks",
    request_body = BatchDownloadRequest,
    responses(
        (status = 200, description = "Zip archive", content_type = "application/zip"),
        (status = 400, description = "No task ids given"),
        (status = 404, description = "None of the tasks has a matching output")
    )
)]
pub async fn batch_download(
    State(state): State<AppState>,
    Json(request): Json<BatchDownloadRequest>,
) -> Result<Response> {
    if request.task_ids.is_empty() {
        return Err(Error::InvalidInput("task_ids must not be empty".to_string()));
    }
    let wanted = request
        .file_types
        .unwrap_or_else(|| vec![OutputFileType::Mono, OutputFileType::Dual]);

    let mut members = Vec::new();
    for id in request.task_ids {
        let Ok(task) = state.registry.get(id) else {
            tracing::debug!(task_id = %id, "skipping unknown task in batch download");
            continue;
        };
        if task.status != TaskStatus::Completed {
            continue;
        }
        for output in task
            .output_files
            .iter()
            .filter(|o| wanted.contains(&o.file_type))
        {
            match state.registry.results().get(&output.key).await {
                Ok(file) => {
                    let bytes = file.read().await?;
                    members.push((archive_name(&task, output), bytes));
                }
                Err(e) if e.is_not_found() => {
                    tracing::debug!(task_id = %id, key = %output.key, "output evicted, skipping");
                }
                Err(e) => return Err(e),
            }
        }
    }

    if members.is_empty() {
        return Err(Error::NotFound(
            "no downloadable outputs for the requested tasks".to_string(),
        ));
    }

    let count = members.len();
    let archive = tokio::task::spawn_blocking(move || build_zip(members))
        .await
        .map_err(|e| Error::Other(format!("archive task failed: {}", e)))??;

    tracing::info!(files = count, size = archive.len(), "batch archive built");

    let filename = format!(
        "translations_{}.zip",
        chrono::Utc::now().format("%Y%m%d_%H%M%S")
    );
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        Body::from(archive),
    )
        .into_response())
}

fn build_zip(members: Vec<(String, Vec<u8>)>) -> Result<Vec<u8>> {
    let zip_error = |e: zip::result::ZipError| Error::Other(format!("failed to build archive: {}", e));

    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let mut used = std::collections::HashSet::new();
    for (name, bytes) in members {
        // Two outputs may sanitize to the same name
        let mut unique = name.clone();
        let mut n = 1;
        while !used.insert(unique.clone()) {
            unique = format!("{}_{}", n, name);
            n += 1;
        }
        writer.start_file(unique, options).map_err(zip_error)?;
        writer.write_all(&bytes)?;
    }

    let cursor = writer.finish().map_err(zip_error)?;
    Ok(cursor.into_inner())
}

/// `<input stem>_<first 8 id chars>_<file type>.<ext>`
fn archive_name(task: &TaskInfo, output: &OutputFile) -> String {
    let stem = task
        .input_filename
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(&task.input_filename);
    let ext = output
        .file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .unwrap_or("pdf");
    let short_id: String = short_id(task.id);

    sanitize_name(&format!(
        "{}_{}_{}.{}",
        stem,
        short_id,
        output.file_type.as_str(),
        ext
    ))
}

fn short_id(id: TaskId) -> String {
    id.to_string().chars().take(8).collect()
}

#[allow(clippy::expect_used)]
fn unsafe_chars() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^\w\-. ]+").expect("literal pattern"))
}

/// Replace characters that are unsafe in archive entries and header values
pub(crate) fn sanitize_name(name: &str) -> String {
    let cleaned = unsafe_chars().replace_all(name.trim(), "_");
    let cleaned = cleaned.trim_matches('.');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

/// GET /stats - Task counts per status
#[utoipa::path(
    get,
    path = "/stats",
    tag = "tasks",
    responses(
        (status = 200, description = "Task counts and admission state", body = crate::types::TaskStats)
    )
)]
pub async fn task_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "tasks": state.registry.stats(),
        "limiter": state.registry.limiter_snapshot(),
    }))
}
