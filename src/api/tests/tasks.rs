use super::*;
use crate::types::TaskId;
use serde_json::json;
use std::io::Read;

async fn completed_task(registry: &TaskRegistry, engine: &StubEngine, n: usize) -> TaskId {
    let id = submit_sample(registry, n).await;
    engine.release(1);
    wait_for_status(registry, id, TaskStatus::Completed).await;
    id
}

#[tokio::test]
async fn test_list_tasks() {
    let (app, registry, _engine, _temp_dir) = create_test_app().await;
    let mut ids = Vec::new();
    for n in 0..5 {
        ids.push(submit_sample(&registry, n).await);
    }

    let response = send(&app, empty_request("GET", "/tasks?page=2&page_size=2")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["total"], 5);
    assert_eq!(json["page"], 2);
    assert_eq!(json["page_size"], 2);
    let page: Vec<String> = json["tasks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(page, vec![ids[2].to_string(), ids[3].to_string()]);
}

#[tokio::test]
async fn test_list_tasks_filters_by_status() {
    let (app, registry, engine, _temp_dir) = create_test_app().await;
    for n in 0..5 {
        submit_sample(&registry, n).await;
    }
    engine.wait_started(3).await;

    let json = body_json(send(&app, empty_request("GET", "/tasks?status=pending")).await).await;
    assert_eq!(json["total"], 2);
    assert!(
        json["tasks"]
            .as_array()
            .unwrap()
            .iter()
            .all(|t| t["status"] == "pending")
    );

    let response = send(&app, empty_request("GET", "/tasks?status=sleeping")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    engine.release(5);
}

#[tokio::test]
async fn test_get_task() {
    let (app, registry, _engine, _temp_dir) = create_test_app().await;
    let id = submit_sample(&registry, 0).await;

    let response = send(&app, empty_request("GET", &format!("/tasks/{}", id))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["id"], id.to_string());
    assert_eq!(json["input_filename"], "sample-0.pdf");
    assert_eq!(json["options"]["lang_in"], "en");
}

#[tokio::test]
async fn test_get_unknown_and_malformed_task() {
    let (app, _registry, _engine, _temp_dir) = create_test_app().await;

    let response = send(
        &app,
        empty_request("GET", &format!("/tasks/{}", TaskId::generate())),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "task_not_found");

    let response = send(&app, empty_request("GET", "/tasks/not-a-task-id")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cancel_task() {
    let (app, registry, engine, _temp_dir) = create_test_app().await;
    let id = submit_sample(&registry, 0).await;
    engine.wait_started(1).await;

    let response = send(&app, empty_request("POST", &format!("/tasks/{}/cancel", id))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["cancel_requested"], true);

    wait_for_status(&registry, id, TaskStatus::Cancelled).await;

    // Terminal tasks cannot be cancelled again
    let response = send(&app, empty_request("POST", &format!("/tasks/{}/cancel", id))).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "conflict");
    assert_eq!(json["error"]["details"]["current_state"], "cancelled");
}

#[tokio::test]
async fn test_delete_task() {
    let (app, registry, engine, _temp_dir) = create_test_app().await;
    let id = submit_sample(&registry, 0).await;
    engine.wait_started(1).await;

    let uri = format!("/tasks/{}", id);
    let response = send(&app, empty_request("DELETE", &uri)).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    engine.release(1);
    wait_for_status(&registry, id, TaskStatus::Completed).await;

    let response = send(&app, empty_request("DELETE", &uri)).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = send(&app, empty_request("GET", &uri)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_download_output() {
    let (app, registry, engine, _temp_dir) = create_test_app().await;
    let id = completed_task(&registry, &engine, 0).await;

    let response = send(
        &app,
        empty_request("GET", &format!("/tasks/{}/download?file_type=dual", id)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/pdf"
    );
    let disposition = response
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.starts_with("attachment; filename=\""));
    assert!(disposition.contains("dual"));

    let body = body_bytes(response).await;
    assert_eq!(body, b"doc.dual.pdf translated from sample-0.pdf");
}

#[tokio::test]
async fn test_download_before_completion() {
    let (app, registry, _engine, _temp_dir) = create_test_app().await;
    let id = submit_sample(&registry, 0).await;

    let response = send(&app, empty_request("GET", &format!("/tasks/{}/download", id))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_download_after_eviction() {
    let (app, registry, engine, _temp_dir) = create_test_app().await;
    let id = completed_task(&registry, &engine, 0).await;
    registry.results().clear().await;

    let response = send(&app, empty_request("GET", &format!("/tasks/{}/download", id))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_batch_download() {
    let (app, registry, engine, _temp_dir) = create_test_app().await;
    let first = completed_task(&registry, &engine, 0).await;
    let second = completed_task(&registry, &engine, 1).await;
    let pending = submit_sample(&registry, 2).await;

    let request = json_request(
        "POST",
        "/tasks/download/batch",
        json!({"task_ids": [first, second, pending, TaskId::generate()]}),
    );
    let response = send(&app, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/zip"
    );

    let archive = body_bytes(response).await;
    let mut zip = zip::ZipArchive::new(std::io::Cursor::new(archive)).unwrap();
    assert_eq!(zip.len(), 4);

    let first_short: String = first.to_string().chars().take(8).collect();
    let name = format!("sample-0_{}_mono.pdf", first_short);
    let mut contents = String::new();
    zip.by_name(&name)
        .unwrap()
        .read_to_string(&mut contents)
        .unwrap();
    assert_eq!(contents, "doc.mono.pdf translated from sample-0.pdf");

    engine.release(1);
}

#[tokio::test]
async fn test_batch_download_selected_types() {
    let (app, registry, engine, _temp_dir) = create_test_app().await;
    let id = completed_task(&registry, &engine, 0).await;

    let request = json_request(
        "POST",
        "/tasks/download/batch",
        json!({"task_ids": [id], "file_types": ["dual"]}),
    );
    let archive = body_bytes(send(&app, request).await).await;
    let zip = zip::ZipArchive::new(std::io::Cursor::new(archive)).unwrap();
    assert_eq!(zip.len(), 1);
    assert!(zip.file_names().all(|n| n.contains("_dual")));
}

#[tokio::test]
async fn test_batch_download_nothing_available() {
    let (app, registry, _engine, _temp_dir) = create_test_app().await;
    let pending = submit_sample(&registry, 0).await;

    let request = json_request(
        "POST",
        "/tasks/download/batch",
        json!({"task_ids": [pending]}),
    );
    let response = send(&app, request).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let request = json_request("POST", "/tasks/download/batch", json!({"task_ids": []}));
    let response = send(&app, request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_task_progress_visible_while_processing() {
    let (app, registry, engine, _temp_dir) = create_test_app().await;
    let id = submit_sample(&registry, 0).await;
    engine.wait_started(1).await;
    wait_until(|| registry.get(id).map(|t| t.progress > 0.0).unwrap_or(false)).await;

    let json = body_json(send(&app, empty_request("GET", &format!("/tasks/{}", id))).await).await;
    assert_eq!(json["status"], "processing");
    assert_eq!(json["stage"], "translate");

    engine.release(1);
}
