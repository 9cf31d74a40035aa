//! HTTP API against a server bound to an ephemeral port.

use std::sync::Arc;

use serde_json::{json, Value};
use tempfile::TempDir;

use content_sentinel::config::Config;
use content_sentinel::engine::Engine;
use content_sentinel::server::router;
use content_sentinel_core::models::{ContentMetadata, ContentStatus, NewContentLocation};

struct TestServer {
    _tmp: TempDir,
    base: String,
    engine: Arc<Engine>,
    client: reqwest::Client,
}

async fn spawn_server() -> TestServer {
    let tmp = TempDir::new().unwrap();
    let mut config = Config::with_db_path(tmp.path().join("sentinel.sqlite"));
    config.faq_store.kind = "disabled".to_string();
    let engine = Arc::new(Engine::open(&config).await.unwrap());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(engine.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        _tmp: tmp,
        base: format!("http://{}", addr),
        engine,
        client: reqwest::Client::new(),
    }
}

impl TestServer {
    async fn register(&self, file: &str, page: i64) -> i64 {
        self.engine
            .register(&NewContentLocation {
                file_name: file.to_string(),
                page_number: Some(page),
                metadata: ContentMetadata::default(),
            })
            .await
            .unwrap()
            .content_id
    }

    async fn detect(&self, body: Value) -> reqwest::Response {
        self.client
            .post(format!("{}/detect", self.base))
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn get_json(&self, path: &str) -> (u16, Value) {
        let resp = self
            .client
            .get(format!("{}{}", self.base, path))
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }
}

#[tokio::test]
async fn test_health() {
    let server = spawn_server().await;
    let (status, body) = server.get_json("/health").await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_detect_then_queue_and_history() {
    let server = spawn_server().await;
    let id = server.register("faq-source.pdf", 1).await;

    let resp = server
        .detect(json!({
            "content_id": id,
            "checksum": "a".repeat(64),
            "source_modified_at": "2026-01-01T00:00:00Z"
        }))
        .await;
    assert_eq!(resp.status().as_u16(), 200);
    let entry: Value = resp.json().await.unwrap();
    assert_eq!(entry["requires_regeneration"], true);

    let (status, queue) = server.get_json("/queue?limit=10").await;
    assert_eq!(status, 200);
    assert_eq!(queue["items"].as_array().unwrap().len(), 1);
    assert_eq!(queue["items"][0]["content_id"], id);
    assert_eq!(queue["items"][0]["rank"], 1);

    let (status, baseline) = server.get_json(&format!("/content/{}/baseline", id)).await;
    assert_eq!(status, 200);
    assert_eq!(baseline["baseline"]["change_id"], entry["change_id"]);

    let (status, history) = server.get_json(&format!("/content/{}/history", id)).await;
    assert_eq!(status, 200);
    assert_eq!(history["entries"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_detect_error_contract() {
    let server = spawn_server().await;
    let id = server.register("faq-source.pdf", 1).await;

    let resp = server
        .detect(json!({
            "content_id": id,
            "checksum": "zz",
            "source_modified_at": "2026-01-01T00:00:00Z"
        }))
        .await;
    assert_eq!(resp.status().as_u16(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "invalid_checksum_format");

    let resp = server
        .detect(json!({ "content_id": id, "checksum": "a".repeat(64) }))
        .await;
    assert_eq!(resp.status().as_u16(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "missing_modification_timestamp");

    let resp = server
        .detect(json!({
            "content_id": 4040,
            "checksum": "a".repeat(64),
            "source_modified_at": "2026-01-01T00:00:00Z"
        }))
        .await;
    assert_eq!(resp.status().as_u16(), 404);

    let (status, _) = server.get_json("/content/4040/history").await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_runs_endpoints() {
    let server = spawn_server().await;
    let id = server.register("a.pdf", 1).await;

    let runs = server.engine.runs();
    let run_id = runs.begin_run(None).await.unwrap();
    server
        .engine
        .detect_in_run(
            &run_id,
            content_sentinel::engine::DetectInput {
                content_id: id,
                checksum: "b".repeat(64),
                source_modified_at: Some(chrono::Utc::now()),
                metadata: None,
            },
        )
        .await
        .unwrap();
    runs.end_run(&run_id).await.unwrap();

    let (status, body) = server.get_json("/runs").await;
    assert_eq!(status, 200);
    assert_eq!(body["runs"][0]["run_id"], run_id);

    let (status, body) = server.get_json(&format!("/runs/{}", run_id)).await;
    assert_eq!(status, 200);
    assert_eq!(body["pages_requiring_regeneration"], 1);

    let (status, body) = server.get_json("/runs/never-ran").await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "unknown_run");
}

#[tokio::test]
async fn test_queue_rejects_zero_limit() {
    let server = spawn_server().await;
    let (status, body) = server.get_json("/queue?limit=0").await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_queue_all_reports_total() {
    let server = spawn_server().await;
    for page in 1..=3 {
        let id = server.register("handbook.pdf", page).await;
        let resp = server
            .detect(json!({
                "content_id": id,
                "checksum": "c".repeat(64),
                "source_modified_at": "2026-01-01T00:00:00Z"
            }))
            .await;
        assert_eq!(resp.status().as_u16(), 200);
    }

    let (status, page) = server.get_json("/queue?limit=2").await;
    assert_eq!(status, 200);
    assert_eq!(page["total"], 3);
    assert_eq!(page["truncated"], true);
    assert_eq!(page["items"].as_array().unwrap().len(), 2);

    let (status, all) = server.get_json("/queue?all=true").await;
    assert_eq!(status, 200);
    assert_eq!(all["total"], 3);
    assert_eq!(all["truncated"], false);
    assert_eq!(all["items"].as_array().unwrap().len(), 3);

    let (status, body) = server.get_json("/queue?all=true&limit=2").await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_detect_on_deleted_content_conflicts() {
    let server = spawn_server().await;
    let id = server.register("retired.pdf", 1).await;
    server
        .engine
        .set_status(id, 1, ContentStatus::Deleted)
        .await
        .unwrap();

    let resp = server
        .detect(json!({
            "content_id": id,
            "checksum": "a".repeat(64),
            "source_modified_at": "2026-01-01T00:00:00Z"
        }))
        .await;
    assert_eq!(resp.status().as_u16(), 409);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "inactive_content");
}
