//! Upload and submission handlers.

use super::{SubmitResponse, TranslateJsonRequest};
use crate::api::AppState;
use crate::error::{Error, Result};
use crate::types::{TaskStatus, TranslationOptions, UploadInfo};
use axum::{
    Json,
    body::Bytes,
    extract::{Multipart, State, multipart::MultipartError},
    http::{HeaderMap, StatusCode, header},
};

/// Parts of a multipart upload form
#[derive(Default)]
struct UploadForm {
    file: Option<(String, Vec<u8>)>,
    file_id: Option<String>,
    options: Option<String>,
}

async fn read_form(mut multipart: Multipart, headers: &HeaderMap, limit: u64) -> Result<UploadForm> {
    let mut form = UploadForm::default();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return Err(multipart_error(e, headers, limit)),
        };
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or("upload.pdf").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| multipart_error(e, headers, limit))?;
                form.file = Some((filename, bytes.to_vec()));
            }
            "file_id" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| multipart_error(e, headers, limit))?;
                form.file_id = Some(text.trim().to_string());
            }
            "options" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| multipart_error(e, headers, limit))?;
                form.options = Some(text);
            }
            other => {
                tracing::debug!(field = other, "ignoring unknown multipart field");
            }
        }
    }

    Ok(form)
}

/// Body-limit rejections become `FileTooLarge`; everything else is bad input
fn multipart_error(error: MultipartError, headers: &HeaderMap, limit: u64) -> Error {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        let size = headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(limit.saturating_add(1));
        Error::FileTooLarge { size, limit }
    } else {
        Error::InvalidInput(format!("malformed multipart body: {}", error.body_text()))
    }
}

fn ensure_pdf(filename: &str) -> Result<()> {
    if filename.to_ascii_lowercase().ends_with(".pdf") {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "only PDF files are supported, got {:?}",
            filename
        )))
    }
}

fn parse_options(json: Option<&str>) -> Result<TranslationOptions> {
    match json {
        Some(json) if !json.trim().is_empty() => TranslationOptions::from_json(json),
        _ => Ok(TranslationOptions::default()),
    }
}

/// POST /upload - Store a PDF for later submission
#[utoipa::path(
    post,
    path = "/upload",
    tag = "uploads",
    request_body(content = Vec<u8>, description = "PDF file in the `file` field (multipart/form-data)", content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "File stored", body = UploadInfo),
        (status = 400, description = "Missing file or not a PDF"),
        (status = 413, description = "File exceeds the size limit"),
        (status = 507, description = "Upload cache is full")
    )
)]
pub async fn upload_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<(StatusCode, Json<UploadInfo>)> {
    let form = read_form(multipart, &headers, state.config.tasks.max_file_size).await?;
    let (filename, content) = form
        .file
        .ok_or_else(|| Error::InvalidInput("no file provided in 'file' field".to_string()))?;
    ensure_pdf(&filename)?;

    let info = state.registry.upload(&content, &filename).await?;
    Ok((StatusCode::CREATED, Json(info)))
}

/// POST /translate - Submit a translation from an inline file or a previous upload
#[utoipa::path(
    post,
    path = "/translate",
    tag = "uploads",
    request_body(content = Vec<u8>, description = "Either `file` (PDF) or `file_id`, plus optional `options` JSON (multipart/form-data)", content_type = "multipart/form-data"),
    responses(
        (status = 202, description = "Task created", body = SubmitResponse),
        (status = 400, description = "Invalid file, reference or options"),
        (status = 413, description = "File exceeds the size limit"),
        (status = 503, description = "Service is shutting down")
    )
)]
pub async fn translate(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<(StatusCode, Json<SubmitResponse>)> {
    let form = read_form(multipart, &headers, state.config.tasks.max_file_size).await?;
    let options = parse_options(form.options.as_deref())?;

    let task_id = match (form.file, form.file_id) {
        (Some((filename, content)), _) => {
            ensure_pdf(&filename)?;
            state
                .registry
                .submit_upload(&content, &filename, options)
                .await?
        }
        (None, Some(file_id)) => state.registry.submit(&file_id, options).await?,
        (None, None) => {
            return Err(Error::InvalidInput(
                "provide either a 'file' or a 'file_id' field".to_string(),
            ));
        }
    };

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            task_id,
            status: TaskStatus::Pending,
        }),
    ))
}

/// POST /translate/json - Submit a translation for a previous upload
#[utoipa::path(
    post,
    path = "/translate/json",
    tag = "uploads",
    request_body = TranslateJsonRequest,
    responses(
        (status = 202, description = "Task created", body = SubmitResponse),
        (status = 400, description = "Unknown file_id or invalid options"),
        (status = 503, description = "Service is shutting down")
    )
)]
pub async fn translate_json(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<SubmitResponse>)> {
    let request: TranslateJsonRequest = serde_json::from_slice(&body)
        .map_err(|e| Error::InvalidInput(format!("malformed request: {}", e)))?;
    let options = request.options.unwrap_or_default();

    let task_id = state.registry.submit(&request.file_id, options).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            task_id,
            status: TaskStatus::Pending,
        }),
    ))
}
