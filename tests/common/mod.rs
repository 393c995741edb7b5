//! Common test utilities for doctrans integration tests

#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::{Request, header};
use doctrans::config::{CacheLimits, Config};
use doctrans::{TaskId, TaskInfo, TaskRegistry, TaskStatus};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

/// Minimal PDF-looking payload
pub const SAMPLE_PDF: &[u8] = b"%PDF-1.7\n1 0 obj << >> endobj\ntrailer << >>\n%%EOF\n";

/// Translator that reports progress, then writes a mono and a dual output
pub const TRANSLATOR_OK: &str = r#"
out=""
lang=""
while [ $# -gt 0 ]; do
  case "$1" in
    --output) out="$2"; shift 2 ;;
    --lang-out) lang="$2"; shift 2 ;;
    *) shift ;;
  esac
done
echo 'loading layout model'
echo '{"type":"progress_update","overall_progress":25,"stage":"Parse PDF","message":"1/4"}'
echo '{"type":"progress_update","overall_progress":80,"stage":"Translate Paragraphs","message":"3/4"}'
echo "mono $lang" > "$out/paper.$lang.mono.pdf"
echo "dual $lang" > "$out/paper.$lang.dual.pdf"
echo '{"type":"finish"}'
"#;

/// Translator that logs Latin-1 bytes on both streams before succeeding
pub const TRANSLATOR_LATIN1: &str = r#"
out=""
while [ $# -gt 0 ]; do
  case "$1" in
    --output) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
printf '\377\376 caf\351\n'
printf 'avertissement: r\351sum\351\n' >&2
echo '{"type":"progress_update","overall_progress":50,"stage":"Translate Paragraphs"}'
echo "mono" > "$out/paper.mono.pdf"
echo '{"type":"finish"}'
"#;

/// Translator that reports an error
pub const TRANSLATOR_ERROR: &str = r#"
echo '{"type":"progress_update","overall_progress":5,"stage":"Parse PDF"}'
echo '{"type":"error","error":"model quota exceeded"}'
exit 1
"#;

/// Translator that never finishes on its own
pub const TRANSLATOR_SLOW: &str = r#"
echo '{"type":"progress_update","overall_progress":1,"stage":"Parse PDF"}'
exec sleep 30
"#;

/// Write `body` as a shell script in `dir`
///
/// Scripts run through `/bin/sh <script>` so the file never needs to be
/// executable.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).expect("write script");
    path
}

/// Configuration rooted in `dir` running `script` through `/bin/sh`
pub fn test_config(dir: &Path, script: &Path) -> Config {
    let mut config = Config::default();
    config.cache.cache_dir = dir.join("cache");
    config.cache.upload = CacheLimits {
        capacity_bytes: 10 * 1024 * 1024,
        max_age: Duration::from_secs(3600),
    };
    config.cache.result = CacheLimits {
        capacity_bytes: 10 * 1024 * 1024,
        max_age: Duration::from_secs(3600),
    };
    config.tasks.max_file_size = 1024 * 1024;
    config.tasks.shutdown_grace = Duration::from_secs(2);
    config.engine.command = Some(PathBuf::from("/bin/sh"));
    config.engine.extra_args = vec![script.display().to_string()];
    config
}

/// Registry using `script` as the translator
pub async fn open_registry(script_body: &str) -> (TaskRegistry, TempDir) {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let script = write_script(temp_dir.path(), "translator.sh", script_body);
    let registry = TaskRegistry::open(test_config(temp_dir.path(), &script))
        .await
        .expect("open registry");
    (registry, temp_dir)
}

/// Poll the registry until `id` reaches a terminal state
pub async fn wait_for_terminal(registry: &TaskRegistry, id: TaskId) -> TaskInfo {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let task = registry.get(id).expect("task exists");
        if task.status.is_terminal() {
            return task;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "task {} still {} after 10s",
            id,
            task.status
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Poll the registry until `id` is in `status`
pub async fn wait_for_status(registry: &TaskRegistry, id: TaskId, status: TaskStatus) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !registry.get(id).map(|t| t.status == status).unwrap_or(false) {
        assert!(
            tokio::time::Instant::now() < deadline,
            "task {} never reached {}",
            id,
            status
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Multipart body with a PDF `file` field and optional `options` JSON
pub fn translate_request(filename: &str, content: &[u8], options: Option<&str>) -> Request<Body> {
    const BOUNDARY: &str = "integration-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/pdf\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(b"\r\n");
    if let Some(options) = options {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"options\"\r\n\r\n{options}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/translate")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("request")
}

/// Send a request and return status plus raw body
pub async fn send(app: &Router, request: Request<Body>) -> (u16, Vec<u8>) {
    let response = app.clone().oneshot(request).await.expect("router error");
    let status = response.status().as_u16();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body")
        .to_vec();
    (status, body)
}

/// Send a request and parse the body as JSON
pub async fn send_json(app: &Router, request: Request<Body>) -> (u16, Value) {
    let (status, body) = send(app, request).await;
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).expect("json body")
    };
    (status, json)
}

/// Request without a body
pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}
