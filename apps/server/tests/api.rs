use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use futures::StreamExt;
use serde_json::{json, Value};
use statline_core::sections::{AnalysisBackend, AnalysisError, PlayerKey, SectionKind};
use statline_server::{api::app_router, build_state_with_backend, config::Config, AppState};
use tempfile::{tempdir, TempDir};
use tower::ServiceExt;

/// Answers every kind with a READY envelope unless told otherwise.
#[derive(Default)]
struct StubBackend {
    failures: HashMap<SectionKind, AnalysisError>,
    calls: AtomicUsize,
}

impl StubBackend {
    fn failing(kind: SectionKind, error: AnalysisError) -> Self {
        Self {
            failures: HashMap::from([(kind, error)]),
            ..Self::default()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn ready_envelope(kind: SectionKind) -> Value {
    match kind {
        SectionKind::SummaryCards => json!({
            "status": "READY",
            "data": { "matches_played": 20, "wins": 11, "total_claims": 11, "total_falls": 9 }
        }),
        SectionKind::Roles => json!({
            "status": "READY",
            "data": [{ "role": "MID", "matches": 10, "win_rate": 60 }]
        }),
        SectionKind::Champions => json!({ "status": "READY", "data": [] }),
        SectionKind::RiskProfile => json!({ "status": "READY", "data": { "risk_score": 20 } }),
        SectionKind::Narrative => json!({
            "status": "READY",
            "data": { "headline": "Steady climber", "summary": "Consistent laning." }
        }),
    }
}

#[async_trait]
impl AnalysisBackend for StubBackend {
    async fn fetch_section(
        &self,
        _player_key: &PlayerKey,
        kind: SectionKind,
    ) -> Result<Value, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.failures.get(&kind) {
            Some(error) => Err(error.clone()),
            None => Ok(ready_envelope(kind)),
        }
    }
}

struct TestApp {
    router: Router,
    state: Arc<AppState>,
    backend: Arc<StubBackend>,
    _dir: TempDir,
}

async fn test_app(backend: StubBackend) -> TestApp {
    let dir = tempdir().unwrap();
    let config = Config {
        db_path: dir.path().join("test.db").to_string_lossy().to_string(),
        poll_attempts: 40,
        poll_delay: Duration::from_millis(50),
        ..Config::default()
    };
    let backend = Arc::new(backend);
    let state = build_state_with_backend(&config, backend.clone())
        .await
        .unwrap();
    TestApp {
        router: app_router(state.clone(), &config),
        state,
        backend,
        _dir: dir,
    }
}

fn request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn send_json(app: &TestApp, method: Method, uri: &str) -> (StatusCode, Value) {
    let response = app.router.clone().oneshot(request(method, uri)).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn healthz_answers_ok() {
    let app = test_app(StubBackend::default()).await;
    let response = app
        .router
        .clone()
        .oneshot(request(Method::GET, "/api/v1/healthz"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"ok");
}

#[tokio::test]
async fn unknown_kind_is_rejected() {
    let app = test_app(StubBackend::default()).await;
    let (status, body) = send_json(&app, Method::GET, "/api/v1/players/Faker/sections/mastery").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);
    assert!(body["message"].as_str().unwrap().contains("mastery"));

    let (status, _) = send_json(
        &app,
        Method::GET,
        "/api/v1/players/Faker/sections?kinds=roles,mastery",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.backend.calls(), 0);
}

#[tokio::test]
async fn blank_player_key_is_rejected() {
    let app = test_app(StubBackend::default()).await;
    let (status, body) = send_json(&app, Method::GET, "/api/v1/players/%20%20/sections").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);
}

#[tokio::test]
async fn unknown_route_returns_json_not_found() {
    let app = test_app(StubBackend::default()).await;
    let (status, body) = send_json(&app, Method::GET, "/api/v1/nothing-here").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 404);
}

#[tokio::test]
async fn aggregate_load_settles_every_kind() {
    let app = test_app(StubBackend::default()).await;
    let (status, body) = send_json(&app, Method::GET, "/api/v1/players/Faker%23KR1/sections").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["playerKey"], "Faker#KR1");
    assert_eq!(body["loading"], false);
    assert!(body["error"].is_null());
    let sections = body["sections"].as_object().unwrap();
    assert_eq!(sections.len(), SectionKind::ALL.len());
    for (_, section) in sections {
        assert_eq!(section["status"], "READY");
    }
    assert_eq!(sections["summary_cards"]["data"]["matchesPlayed"], 20);
    assert_eq!(sections["summary_cards"]["data"]["claimFallRatio"], 1.22);
    assert_eq!(app.backend.calls(), SectionKind::ALL.len());
}

#[tokio::test]
async fn aggregate_load_honors_kind_filter_and_cache() {
    let app = test_app(StubBackend::default()).await;
    let uri = "/api/v1/players/Faker/sections?kinds=roles,narrative";

    let (status, body) = send_json(&app, Method::GET, uri).await;
    assert_eq!(status, StatusCode::OK);
    let sections = body["sections"].as_object().unwrap();
    assert_eq!(sections.len(), 2);
    assert!(sections.contains_key("roles") && sections.contains_key("narrative"));
    assert_eq!(app.backend.calls(), 2);

    let (_, again) = send_json(&app, Method::GET, uri).await;
    assert_eq!(again["sections"], body["sections"]);
    assert_eq!(app.backend.calls(), 2);
}

#[tokio::test]
async fn aggregate_reports_first_failure() {
    let backend = StubBackend::failing(
        SectionKind::Champions,
        AnalysisError::Http {
            status: 500,
            message: Some("Riot API quota exhausted".to_string()),
        },
    );
    let app = test_app(backend).await;
    let (status, body) = send_json(&app, Method::GET, "/api/v1/players/Faker/sections").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["loading"], false);
    assert_eq!(body["error"], "Riot API quota exhausted");
    assert_eq!(body["sections"]["champions"]["status"], "FAILED");
    assert_eq!(body["sections"]["roles"]["status"], "READY");
}

#[tokio::test]
async fn single_section_starts_refresh_then_serves_result() {
    let app = test_app(StubBackend::default()).await;
    let uri = "/api/v1/players/Faker/sections/risk_profile";

    let (status, first) = send_json(&app, Method::GET, uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["status"], "FETCHING");
    assert_eq!(first["kind"], "risk_profile");
    assert_eq!(first["playerKey"], "Faker");

    app.state.tracker.all_settled().await;

    let (_, second) = send_json(&app, Method::GET, uri).await;
    assert_eq!(second["status"], "READY");
    assert_eq!(second["data"]["level"], "LOW");
    assert_eq!(app.backend.calls(), 1);
}

#[tokio::test]
async fn refresh_refetches_a_ready_section() {
    let app = test_app(StubBackend::default()).await;
    let uri = "/api/v1/players/Faker/sections/roles";

    send_json(&app, Method::GET, uri).await;
    app.state.tracker.all_settled().await;
    let (_, ready) = send_json(&app, Method::GET, uri).await;
    assert_eq!(ready["status"], "READY");

    let (status, refreshed) = send_json(&app, Method::POST, &format!("{uri}/refresh")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(refreshed["status"], "FETCHING");

    app.state.tracker.all_settled().await;
    assert_eq!(app.backend.calls(), 2);
}

#[tokio::test]
async fn stream_emits_sections_then_aggregate() {
    let app = test_app(StubBackend::default()).await;
    let response = app
        .router
        .clone()
        .oneshot(request(
            Method::GET,
            "/api/v1/players/Faker/sections/stream?kinds=roles",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();

    let section_at = text.find("event: section").unwrap();
    let aggregate_at = text.find("event: aggregate").unwrap();
    assert!(section_at < aggregate_at);
    assert!(text.contains("\"status\":\"READY\""));
    assert!(text.contains("\"loading\":false"));
}

#[tokio::test]
async fn watch_starts_with_the_stored_value() {
    let app = test_app(StubBackend::default()).await;
    let response = app
        .router
        .clone()
        .oneshot(request(
            Method::GET,
            "/api/v1/players/Faker/sections/narrative/watch",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut frames = response.into_body().into_data_stream();
    let first = frames.next().await.unwrap().unwrap();
    let text = String::from_utf8(first.to_vec()).unwrap();
    assert!(text.contains("event: section"));
    assert!(text.contains("\"status\":\"NOT_STARTED\""));
    assert_eq!(app.backend.calls(), 0);
}
