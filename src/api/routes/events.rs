//! Server-sent progress streams.

use super::parse_task_id;
use crate::api::AppState;
use crate::error::Result;
use crate::types::ProgressEvent;
use axum::{
    extract::{Path, State},
    response::sse::{Event as SseEvent, KeepAlive, Sse},
};
use futures::Stream;
use std::convert::Infallible;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

fn to_sse(event: &ProgressEvent) -> Option<SseEvent> {
    match serde_json::to_string(event) {
        Ok(json_data) => Some(SseEvent::default().event(event.status.as_str()).data(json_data)),
        Err(e) => {
            tracing::warn!(error = %e, "failed to serialize progress event");
            None
        }
    }
}

/// GET /tasks/:id/events - Progress of one task
///
/// The first event is the task's current state; the stream closes after the
/// terminal event.
#[utoipa::path(
    get,
    path = "/tasks/{id}/events",
    tag = "events",
    params(
        ("id" = String, Path, description = "Task ID")
    ),
    responses(
        (status = 200, description = "Server-sent events stream (text/event-stream)", content_type = "text/event-stream"),
        (status = 404, description = "Task not found")
    )
)]
pub async fn task_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = std::result::Result<SseEvent, Infallible>>>> {
    let id = parse_task_id(&id)?;
    let subscription = state.registry.subscribe(id)?;

    let stream = subscription
        .into_stream()
        .filter_map(|event| to_sse(&event).map(Ok));

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// GET /events - Progress of every task
///
/// The stream ends when the service starts shutting down.
#[utoipa::path(
    get,
    path = "/events",
    tag = "events",
    responses(
        (status = 200, description = "Server-sent events stream (text/event-stream)", content_type = "text/event-stream")
    )
)]
pub async fn all_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = std::result::Result<SseEvent, Infallible>>> {
    let receiver = state.registry.hub().subscribe_all();
    let stream = BroadcastStream::new(receiver);

    let sse_stream = stream.filter_map(|result| match result {
        Ok(event) => to_sse(&event).map(Ok),
        Err(tokio_stream::wrappers::errors::BroadcastStreamRecvError::Lagged(skipped)) => {
            tracing::warn!(skipped, "SSE client lagged");
            Some(Ok(SseEvent::default().event("error").data(format!(
                r#"{{"error":"lagged","skipped":{}}}"#,
                skipped
            ))))
        }
    });

    let sse_stream =
        futures::StreamExt::take_until(sse_stream, state.registry.stopping().cancelled_owned());

    Sse::new(sse_stream).keep_alive(KeepAlive::default())
}
