//! End-to-end tests of the HTTP surface against the simulated camera

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use camserve_lib::camera::CameraSettings;
use camserve_lib::capture::SimulatedSource;
use camserve_lib::config::AppConfig;
use camserve_lib::encoder::{MjpegFileBackend, VideoEncoder};
use camserve_lib::routes::{self, AppState};
use futures::StreamExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

struct Harness {
    _dir: TempDir,
    state: AppState,
    app: Router,
}

fn config(dir: &TempDir) -> AppConfig {
    let mut config = AppConfig::default();
    config.debug_mode = true;
    config.media.root = dir.path().join("media");
    config.schedule.crontab_file = Some(dir.path().join("crontab"));
    config.camera.presets.insert(
        "tiny".to_string(),
        CameraSettings {
            width: 64,
            height: 48,
            fps: 20,
            hdr: false,
        },
    );
    config.camera.default_preset = "tiny".to_string();
    config
}

fn harness_with(config: impl FnOnce(&TempDir) -> AppConfig, realtime: bool) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir);
    let encoder = VideoEncoder::new(vec![Arc::new(MjpegFileBackend::new(80))]);
    let state = camserve_lib::build_state(&config, Box::new(SimulatedSource::new(realtime)), encoder)
        .unwrap();
    let app = routes::router(state.clone());
    Harness {
        _dir: dir,
        state,
        app,
    }
}

fn harness() -> Harness {
    harness_with(config, false)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
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

fn post_empty(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn wait_until_idle(app: &Router) -> Value {
    for _ in 0..200 {
        let (_, status) = send(app, get("/recording_status")).await;
        if status["state"] == "idle" {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("recording never finished");
}

#[tokio::test]
async fn test_index_and_health() {
    let h = harness();

    let (status, body) = send(&h.app, get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "camserve");

    let (status, body) = send(&h.app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["recording"], "idle");
    assert_eq!(body["settings"]["width"], 64);
    assert_eq!(body["debugMode"], true);
}

#[tokio::test]
async fn test_settings_and_presets() {
    let h = harness();

    let (status, body) = send(&h.app, get("/settings")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let keys: Vec<&str> = body["presets"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["key"].as_str().unwrap())
        .collect();
    assert!(keys.contains(&"1280x720x30"));
    assert!(keys.contains(&"tiny"));

    let (status, body) = send(
        &h.app,
        post_json("/set_resolution", json!({ "resolution": "1280x720x30" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["settings"]["width"], 1280);
    assert_eq!(h.state.settings.current().height, 720);
}

#[tokio::test]
async fn test_set_resolution_rejections_leave_settings_alone() {
    let h = harness();

    let (status, body) = send(
        &h.app,
        post_json("/set_resolution", json!({ "resolution": "9x9x9" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "UNKNOWN_PRESET");

    let (status, body) = send(&h.app, post_empty("/set_resolution")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_SETTINGS");

    let (status, _) = send(
        &h.app,
        post_json("/set_resolution", json!({ "width": 0, "height": 480 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(h.state.settings.current().width, 64);
}

#[tokio::test]
async fn test_set_resolution_accepts_form_custom_settings() {
    let h = harness();
    let request = Request::builder()
        .method("POST")
        .uri("/set_resolution")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("width=320&height=240&fps=15"))
        .unwrap();

    let (status, body) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["settings"]["width"], 320);
    assert_eq!(body["settings"]["fps"], 15);
}

#[tokio::test]
async fn test_picture_lifecycle() {
    let h = harness();

    let (status, body) = send(&h.app, post_empty("/take_picture")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let filename = body["filename"].as_str().unwrap().to_string();
    assert!(filename.starts_with("image_"));
    assert!(filename.ends_with(".jpg"));
    assert!(body["filepath"].as_str().unwrap().ends_with(&filename));

    let (status, body) = send(&h.app, get("/media/images")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["files"][0]["filename"], filename.as_str());

    let response = h
        .app
        .clone()
        .oneshot(get(&format!("/media/images/{filename}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..2], &[0xFF, 0xD8]);

    let (status, _) = send(&h.app, delete(&format!("/media/images/{filename}"))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&h.app, get(&format!("/media/images/{filename}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_record_video_returns_saved_clip() {
    let h = harness();

    let (status, body) = send(&h.app, post_json("/record_video", json!({ "duration": 1 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["duration"], 1.0);
    assert_eq!(body["frames"], 20);
    let filename = body["filename"].as_str().unwrap();
    assert!(filename.starts_with("video_"));
    assert!(filename.ends_with(".mjpeg"));

    let (_, status) = send(&h.app, get("/recording_status")).await;
    assert_eq!(status["state"], "idle");
    assert_eq!(status["lastOutcome"]["success"], true);
    assert_eq!(status["lastOutcome"]["filename"], filename);

    let (_, body) = send(&h.app, get("/media/videos")).await;
    assert_eq!(body["count"], 1);
}

#[tokio::test]
async fn test_record_video_rejects_zero_duration() {
    let h = harness();
    let (status, body) = send(&h.app, post_json("/record_video", json!({ "duration": 0 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "INVALID_SETTINGS");
    assert!(body["message"].as_str().is_some());
}

#[tokio::test]
async fn test_recording_blocks_second_clip_and_setting_changes() {
    let h = harness_with(config, true);

    let (status, body) = send(
        &h.app,
        post_json("/record_video", json!({ "duration": 1, "wait": false })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["duration"], 1);

    let (status, body) = send(&h.app, post_json("/record_video", json!({ "duration": 1 }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "ALREADY_RECORDING");

    let (status, body) = send(
        &h.app,
        post_json("/set_resolution", json!({ "resolution": "640x480x30" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "BUSY");

    // Live settings stay readable during the clip
    let (status, body) = send(&h.app, get("/settings")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["settings"]["width"], 64);

    let status = wait_until_idle(&h.app).await;
    assert_eq!(status["lastOutcome"]["success"], true);

    let (status, _) = send(
        &h.app,
        post_json("/set_resolution", json!({ "resolution": "640x480x30" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_media_rejects_bad_kind_and_names() {
    let h = harness();

    let (status, body) = send(&h.app, get("/media/audio")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, _) = send(&h.app, get("/media/images/..hidden.jpg")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&h.app, delete("/media/videos/missing.mp4")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_archive_is_zip() {
    let h = harness();
    send(&h.app, post_empty("/take_picture")).await;

    let response = h.app.clone().oneshot(get("/archive/images")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/zip");
    assert!(response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .contains("images.zip"));
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..2], b"PK");
}

#[tokio::test]
async fn test_schedule_lifecycle() {
    let h = harness();

    let (status, body) = send(&h.app, post_json("/schedules", json!({ "minute": 5 }))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["schedule"]["id"], "h0-m5-picture-d0");
    assert_eq!(body["schedule"]["cron"], "*/5 * * * *");

    let (status, body) = send(
        &h.app,
        post_json(
            "/schedules",
            json!({ "hour": 2, "minute": 30, "recordType": "video", "duration": 10 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["schedule"]["cron"], "30 */2 * * *");

    let (status, body) = send(&h.app, get("/schedules")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["schedules"].as_array().unwrap().len(), 2);

    let (status, body) = send(&h.app, post_json("/schedules", json!({ "minute": 5 }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "DUPLICATE_SCHEDULE");

    let (status, _) = send(&h.app, delete("/schedules/h0-m5-picture-d0")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&h.app, delete("/schedules/h0-m5-picture-d0")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&h.app, post_json("/schedules", json!({ "minute": 90 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_SCHEDULE");
}

#[tokio::test]
async fn test_schedules_unavailable_when_disabled() {
    let h = harness_with(
        |dir| {
            let mut config = config(dir);
            config.schedule.enabled = false;
            config
        },
        false,
    );
    let (status, body) = send(&h.app, get("/schedules")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "NOT_AVAILABLE");
}

#[tokio::test]
async fn test_live_feed_streams_multipart_frames() {
    let h = harness();
    let producer = h.state.stream.spawn();

    let response = h.app.clone().oneshot(get("/live_video_feed")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "multipart/x-mixed-replace; boundary=frame"
    );

    let mut body = response.into_body().into_data_stream();
    let part = body.next().await.unwrap().unwrap();
    assert!(part.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n"));

    h.state.stream.shutdown();
    assert!(body.next().await.is_none());
    producer.await.unwrap();
}
