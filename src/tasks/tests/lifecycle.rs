use super::*;

#[tokio::test]
async fn test_shutdown_cancels_pending_and_running_tasks() {
    let engine = StubEngine::gated();
    let (registry, _temp_dir) = create_test_registry(engine.clone()).await;
    registry.set_max_concurrent(1).unwrap();

    let running = submit_sample(&registry, 1).await;
    let queued = submit_sample(&registry, 2).await;
    engine.wait_started(1).await;

    registry.shutdown().await;

    assert!(!registry.is_accepting());
    let task = registry.get(queued).unwrap();
    assert_eq!(task.status, TaskStatus::Cancelled);
    assert_eq!(task.message, "service shutting down");
    assert_eq!(registry.get(running).unwrap().status, TaskStatus::Cancelled);
    assert_eq!(engine.started(), vec![running]);
    assert_eq!(registry.run_state.active_runs.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_submit_after_shutdown_is_rejected() {
    let (registry, _temp_dir) = create_test_registry(StubEngine::gated()).await;
    registry.shutdown().await;

    let err = registry
        .submit_upload(SAMPLE_PDF, "late.pdf", TranslationOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ShuttingDown));

    let err = registry.upload(SAMPLE_PDF, "late.pdf").await.unwrap_err();
    assert!(matches!(err, Error::ShuttingDown));
    assert!(registry.list().is_empty());
}

#[tokio::test]
async fn test_shutdown_gives_up_on_stubborn_engines() {
    let engine = StubEngine::stubborn();
    let (registry, _temp_dir) = create_test_registry(engine.clone()).await;

    let id = submit_sample(&registry, 1).await;
    engine.wait_started(1).await;

    let started = std::time::Instant::now();
    registry.shutdown().await;
    assert!(started.elapsed() >= registry.config().tasks.shutdown_grace);

    let task = registry.get(id).unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error.as_deref(), Some("interrupted by shutdown"));
    assert_eq!(registry.limiter_snapshot().running, 0);

    // The engine finishing afterwards changes nothing and stores nothing
    engine.release(1);
    wait_idle(&registry).await;
    assert_eq!(registry.get(id).unwrap().status, TaskStatus::Failed);
    assert_eq!(registry.results().stats().await.entry_count, 0);
}

#[tokio::test]
async fn test_shutdown_with_no_tasks_returns_promptly() {
    let (registry, _temp_dir) = create_test_registry(StubEngine::gated()).await;

    tokio::time::timeout(Duration::from_millis(200), registry.shutdown())
        .await
        .unwrap();
}
