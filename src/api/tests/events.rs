use super::*;

fn event_names(body: &str) -> Vec<&str> {
    body.lines()
        .filter_map(|line| line.strip_prefix("event:"))
        .map(str::trim)
        .collect()
}

#[tokio::test]
async fn test_task_events_content_type() {
    let (app, registry, engine, _temp_dir) = create_test_app().await;
    let id = submit_sample(&registry, 0).await;

    let response = send(&app, empty_request("GET", &format!("/tasks/{}/events", id))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    assert!(
        content_type.contains("text/event-stream"),
        "Content-Type should be text/event-stream, got: {}",
        content_type
    );

    engine.release(1);
}

#[tokio::test]
async fn test_task_events_follow_to_completion() {
    let (app, registry, engine, _temp_dir) = create_test_app().await;
    let id = submit_sample(&registry, 0).await;
    engine.wait_started(1).await;

    let response = send(&app, empty_request("GET", &format!("/tasks/{}/events", id))).await;
    let reader = tokio::spawn(body_bytes(response));

    engine.release(1);
    let body = tokio::time::timeout(Duration::from_secs(5), reader)
        .await
        .expect("event stream did not close after the terminal event")
        .unwrap();
    let body = String::from_utf8(body).unwrap();

    let names = event_names(&body);
    assert_eq!(names.first(), Some(&"processing"));
    assert_eq!(names.last(), Some(&"completed"));
    assert_eq!(names.iter().filter(|n| **n == "completed").count(), 1);
    assert!(body.contains(&format!("\"task_id\":\"{}\"", id)));
}

#[tokio::test]
async fn test_task_events_for_finished_task() {
    let (app, registry, engine, _temp_dir) = create_test_app().await;
    let id = submit_sample(&registry, 0).await;
    engine.release(1);
    wait_for_status(&registry, id, TaskStatus::Completed).await;

    let response = send(&app, empty_request("GET", &format!("/tasks/{}/events", id))).await;
    let body = tokio::time::timeout(Duration::from_secs(5), body_bytes(response))
        .await
        .expect("stream for a finished task should close immediately");
    let body = String::from_utf8(body).unwrap();

    assert_eq!(event_names(&body), vec!["completed"]);
}

#[tokio::test]
async fn test_task_events_unknown_task() {
    let (app, _registry, _engine, _temp_dir) = create_test_app().await;

    let response = send(
        &app,
        empty_request(
            "GET",
            &format!("/tasks/{}/events", crate::types::TaskId::generate()),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_all_events_stream() {
    let (app, registry, engine, _temp_dir) = create_test_app().await;

    let response = send(&app, empty_request("GET", "/events")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .contains("text/event-stream")
    );

    // Verify the hub feeding the stream sees registry events
    let mut receiver = registry.hub().subscribe_all();
    let id = submit_sample(&registry, 0).await;
    let event = tokio::time::timeout(Duration::from_secs(1), receiver.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.task_id, id);

    engine.release(1);
}

#[tokio::test]
async fn test_all_events_stream_ends_on_shutdown() {
    let (app, registry, _engine, _temp_dir) = create_test_app().await;

    let response = send(&app, empty_request("GET", "/events")).await;
    let reader = tokio::spawn(body_bytes(response));

    registry.shutdown().await;

    tokio::time::timeout(Duration::from_secs(5), reader)
        .await
        .expect("global event stream should end on shutdown")
        .unwrap();
}
