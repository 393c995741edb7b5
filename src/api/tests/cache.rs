use super::*;

#[tokio::test]
async fn test_cache_stats() {
    let (app, registry, _engine, _temp_dir) = create_test_app().await;
    registry.upload(SAMPLE_PDF, "a.pdf").await.unwrap();

    let response = send(&app, empty_request("GET", "/cache/stats")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["upload"]["role"], "upload");
    assert_eq!(json["upload"]["entry_count"], 1);
    assert_eq!(json["upload"]["total_size_bytes"], SAMPLE_PDF.len());
    assert_eq!(json["upload"]["capacity_bytes"], 10 * 1024 * 1024);
    assert_eq!(json["result"]["role"], "result");
    assert_eq!(json["result"]["entry_count"], 0);
}

#[tokio::test]
async fn test_clear_both_caches() {
    let (app, registry, engine, _temp_dir) = create_test_app().await;
    let id = submit_sample(&registry, 0).await;
    engine.release(1);
    wait_for_status(&registry, id, TaskStatus::Completed).await;

    let response = send(&app, empty_request("DELETE", "/cache/clear")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["upload"], 1);
    assert_eq!(json["result"], 2);
    assert_eq!(registry.uploads().stats().await.entry_count, 0);
    assert_eq!(registry.results().stats().await.entry_count, 0);

    // The task record survives; only its outputs are gone
    assert_eq!(registry.get(id).unwrap().status, TaskStatus::Completed);
}

#[tokio::test]
async fn test_clear_single_cache() {
    let (app, registry, _engine, _temp_dir) = create_test_app().await;
    registry.upload(SAMPLE_PDF, "a.pdf").await.unwrap();

    let response = send(&app, empty_request("DELETE", "/cache/clear?cache=result")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["result"], 0);
    assert!(json.get("upload").is_none());
    assert_eq!(registry.uploads().stats().await.entry_count, 1);
}

#[tokio::test]
async fn test_clear_unknown_cache() {
    let (app, _registry, _engine, _temp_dir) = create_test_app().await;

    let response = send(&app, empty_request("DELETE", "/cache/clear?cache=everything")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
