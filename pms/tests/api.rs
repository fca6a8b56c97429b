//! HTTP API tests driving the router in-process.
//!
//! The pipeline runs with fake stages so no external tools are needed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use pms::api::{ApiServer, ApiServerConfig, AppState};
use pms::library::{LibraryManager, TrackCatalog};
use pms::pipeline::processors::{
    AcquireRequest, Acquirer, NormalizeOptions, Normalizer, Prober, TrackMetadata,
};
use pms::pipeline::{DownloadPipeline, JobQueue, JobQueueConfig, MemoryJobStore};
use process_utils::ProcessError;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

const AUDIO: &[u8] = b"0123456789";

struct FakeAcquirer;

#[async_trait]
impl Acquirer for FakeAcquirer {
    async fn acquire(&self, request: &AcquireRequest) -> Result<PathBuf, ProcessError> {
        if request.url.contains("broken") {
            return Err(ProcessError::ExitStatus {
                program: "yt-dlp".to_string(),
                code: Some(1),
                stderr: "ERROR: Unsupported URL".to_string(),
            });
        }
        let path = request.output_dir.join(format!("Night Drive.{}", request.format));
        tokio::fs::write(&path, b"raw").await.unwrap();
        Ok(path)
    }
}

struct FakeNormalizer;

#[async_trait]
impl Normalizer for FakeNormalizer {
    async fn normalize(
        &self,
        _job_id: &str,
        input: &Path,
        _options: &NormalizeOptions,
    ) -> Result<PathBuf, ProcessError> {
        let output = pms::pipeline::processors::normalized_path(input);
        tokio::fs::write(&output, AUDIO).await.unwrap();
        Ok(output)
    }
}

struct FakeProber;

#[async_trait]
impl Prober for FakeProber {
    async fn probe(&self, _path: &Path) -> Result<TrackMetadata, ProcessError> {
        Ok(TrackMetadata {
            duration: 201,
            bitrate: 256,
            title: "Night Drive".to_string(),
            artist: "Synthwave Collective".to_string(),
            album: "Neon".to_string(),
        })
    }
}

struct TestApp {
    _temp: TempDir,
    router: Router,
    queue: Arc<JobQueue>,
    catalog: Arc<LibraryManager>,
}

async fn setup() -> TestApp {
    let temp = tempfile::tempdir().unwrap();
    let catalog = Arc::new(LibraryManager::load(temp.path().join("library.json")).await);
    let pipeline = DownloadPipeline::new(
        Arc::new(FakeAcquirer),
        Arc::new(FakeNormalizer),
        Arc::new(FakeProber),
        catalog.clone(),
        temp.path().join("downloads"),
    );
    let queue = JobQueue::new(
        JobQueueConfig::new(1),
        Arc::new(MemoryJobStore::new()),
        Arc::new(pipeline),
    );
    let server = ApiServer::new(
        ApiServerConfig::default(),
        AppState::new(queue.clone(), catalog.clone()),
    );

    TestApp {
        router: server.build_router(),
        _temp: temp,
        queue,
        catalog,
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

async fn send_json(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, bytes) = send(router, request).await;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_submit_and_poll_job() {
    let app = setup().await;

    let (status, body) = send_json(
        &app.router,
        post_json("/jobs", json!({ "url": "https://youtu.be/abc" })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let job_id = body["jobId"].as_str().unwrap().to_string();

    app.queue.wait_idle().await;

    let (status, body) = send_json(&app.router, get(&format!("/jobs/{job_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], job_id.as_str());
    assert_eq!(body["status"], "completed");
    assert_eq!(body["progress"], 1.0);
    assert!(body["error"].is_null());

    let (status, body) = send_json(&app.router, get("/jobs")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["jobs"].as_array().unwrap().len(), 1);
    assert_eq!(body["jobs"][0]["type"], "download");
    assert_eq!(body["jobs"][0]["result"]["metadata"]["title"], "Night Drive");
}

#[tokio::test]
async fn test_submit_rejects_missing_url() {
    let app = setup().await;

    for body in [json!({}), json!({ "url": "  " }), json!({ "url": 7 })] {
        let (status, body) = send_json(&app.router, post_json("/jobs", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INVALID_URL");
        assert_eq!(body["error"]["message"], "A valid URL is required");
    }
    assert!(app.queue.list().is_empty());
}

#[tokio::test]
async fn test_unknown_job_is_404() {
    let app = setup().await;

    let (status, body) = send_json(&app.router, get("/jobs/job_missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
    assert_eq!(body["error"]["message"], "Job not found");

    let (status, _) = send_json(&app.router, get("/api/download/job_missing/status")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_failed_job_reports_stage_error() {
    let app = setup().await;

    let (status, body) = send_json(
        &app.router,
        post_json("/api/download", json!({ "url": "https://broken.example/x" })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let id = body["downloadId"].as_str().unwrap().to_string();

    app.queue.wait_idle().await;

    let (status, body) =
        send_json(&app.router, get(&format!("/api/download/{id}/status"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "failed");
    let error = body["error"].as_str().unwrap();
    assert!(error.contains("acquire"));
    assert!(error.contains("Unsupported URL"));
    assert!(app.catalog.is_empty());
}

#[tokio::test]
async fn test_health_reports_queue_stats() {
    let app = setup().await;

    let (status, body) = send_json(&app.router, get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["uptime"].is_u64());
    assert_eq!(body["jobs"]["concurrency"], 1);
}

#[tokio::test]
async fn test_library_search_and_delete() {
    let app = setup().await;

    send_json(
        &app.router,
        post_json("/api/download", json!({ "url": "https://soundcloud.com/a/b" })),
    )
    .await;
    app.queue.wait_idle().await;

    let (status, body) = send_json(&app.router, get("/api/library/songs")).await;
    assert_eq!(status, StatusCode::OK);
    let tracks = body["tracks"].as_array().unwrap();
    assert_eq!(tracks.len(), 1);
    let track_id = tracks[0]["id"].as_str().unwrap().to_string();
    assert_eq!(tracks[0]["source"]["platform"], "soundcloud");

    let (_, body) = send_json(&app.router, get("/api/library/search?q=SYNTHWAVE")).await;
    assert_eq!(body["tracks"].as_array().unwrap().len(), 1);

    let (_, body) = send_json(&app.router, get("/api/library/search?q=polka")).await;
    assert!(body["tracks"].as_array().unwrap().is_empty());

    let (status, body) = send_json(&app.router, get("/api/library/search")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "MISSING_QUERY");

    let (status, body) = send_json(&app.router, get(&format!("/api/tracks/{track_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Night Drive");

    let delete = Request::builder()
        .method("DELETE")
        .uri(format!("/api/tracks/{track_id}"))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send_json(&app.router, delete).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, _) = send_json(&app.router, get(&format!("/api/tracks/{track_id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_stream_serves_full_and_partial_content() {
    let app = setup().await;

    send_json(
        &app.router,
        post_json("/jobs", json!({ "url": "https://youtu.be/abc" })),
    )
    .await;
    app.queue.wait_idle().await;
    let track = app.catalog.list_tracks().remove(0);

    let response = app
        .router
        .clone()
        .oneshot(get(&format!("/api/stream/{}", track.id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mpeg");
    assert_eq!(response.headers()[header::ACCEPT_RANGES], "bytes");
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], AUDIO);

    let ranged = Request::builder()
        .uri(format!("/api/stream/{}", track.id))
        .header(header::RANGE, "bytes=2-5")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(ranged).await.unwrap();
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 2-5/10");
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"2345");

    let unsatisfiable = Request::builder()
        .uri(format!("/api/stream/{}", track.id))
        .header(header::RANGE, "bytes=50-")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app.router, unsatisfiable).await;
    assert_eq!(status, StatusCode::RANGE_NOT_SATISFIABLE);

    tokio::fs::remove_file(&track.file_path).await.unwrap();
    let (status, body) = send_json(&app.router, get(&format!("/api/stream/{}", track.id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NO_SOURCE");
}

#[tokio::test]
async fn test_logging_routes_without_config() {
    let app = setup().await;

    let (status, body) = send_json(&app.router, get("/api/logging")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
}

#[tokio::test]
async fn test_stream_content_type_follows_track_format() {
    let app = setup().await;

    send_json(
        &app.router,
        post_json(
            "/api/download",
            json!({ "url": "https://youtu.be/abc", "format": "m4a" }),
        ),
    )
    .await;
    app.queue.wait_idle().await;
    let track = app.catalog.list_tracks().remove(0);
    assert_eq!(track.format, "m4a");

    let response = app
        .router
        .clone()
        .oneshot(get(&format!("/api/stream/{}", track.id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mp4");
}

#[tokio::test]
async fn test_artwork_route() {
    let app = setup().await;

    let (status, body) = send_json(&app.router, get("/api/artwork/track_missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
    assert_eq!(body["error"]["message"], "Track not found");

    send_json(
        &app.router,
        post_json("/jobs", json!({ "url": "https://youtu.be/abc" })),
    )
    .await;
    app.queue.wait_idle().await;
    let track = app.catalog.list_tracks().remove(0);

    let (status, body) = send_json(&app.router, get(&format!("/api/artwork/{}", track.id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NO_ARTWORK");
}
