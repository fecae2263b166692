mod common;

use assessment_engine::middleware::auth::AuthKeys;
use assessment_engine::models::assessment::AssessmentKind;
use assessment_engine::{routes, AppState};
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::Duration;
use common::{assessment, at, scheduled, Harness};
use serde_json::{json, Value as JsonValue};
use tokio_test::assert_ok;
use tower::ServiceExt;

const SECRET: &str = "test_secret_key";

fn app(h: &Harness) -> Router {
    let state = AppState::with_sessions(h.service.clone(), AuthKeys::new(SECRET), 1000);
    routes::api_router(state)
}

fn token(sub: &str, role: Option<&str>) -> String {
    assert_ok!(AuthKeys::new(SECRET).issue(sub, role, Duration::minutes(30)))
}

async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    bearer: Option<&str>,
    body: Option<JsonValue>,
) -> (StatusCode, JsonValue) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(t) = bearer {
        req = req.header("authorization", format!("Bearer {}", t));
    }
    let req = match body {
        Some(b) => req
            .header("content-type", "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    let body = if bytes.is_empty() {
        JsonValue::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn entrant_flow_end_to_end() {
    let exam = assessment(AssessmentKind::Weekly, 2, 30);
    let id = exam.id;
    let h = Harness::new(at(9, 0), vec![exam]).await;
    let app = app(&h);
    let alice = token("alice", None);

    let (status, body) = call(&app, "GET", &format!("/api/assessments/{}/window", id), Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["remaining_seconds"], 1800);
    assert_eq!(body["status"], "active");

    let (status, body) = call(&app, "POST", &format!("/api/assessments/{}/start", id), Some(&alice), None).await;
    assert_eq!(status, StatusCode::CREATED);
    let attempt_id = body["attempt"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["questions"].as_array().unwrap().len(), 2);
    assert!(body["questions"][0].get("correct_option_index").is_none());

    let (status, body) = call(&app, "POST", &format!("/api/assessments/{}/start", id), Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["attempt"]["id"], attempt_id.as_str());
    assert_eq!(body["resumed"], true);

    let (status, body) = call(
        &app,
        "PATCH",
        &format!("/api/attempts/{}/answer", attempt_id),
        Some(&alice),
        Some(json!({"question_index": 0, "option_index": 0})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["answers"], json!([0, null]));

    let (status, body) = call(
        &app,
        "POST",
        &format!("/api/attempts/{}/heartbeat", attempt_id),
        Some(&alice),
        Some(json!({"answers": [0, 1], "flagged": [1], "time_spent_seconds": 30})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["accepted"], true);

    let (status, body) = call(&app, "GET", &format!("/api/attempts/{}/result", attempt_id), Some(&alice), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "not_submitted");

    let (status, body) = call(
        &app,
        "POST",
        &format!("/api/attempts/{}/submit", attempt_id),
        Some(&alice),
        Some(json!({"answers": [0, 1], "flagged": [], "time_spent_seconds": 45})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_completed"], true);
    assert_eq!(body["score"]["percentage"], 50);
    assert_eq!(body["submission"], "manual");

    let (status, body) = call(&app, "GET", &format!("/api/attempts/{}/result", attempt_id), Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["review"][1]["outcome"], "wrong");
    assert_eq!(body["time_spent_seconds"], 45);

    let bob = token("bob", None);
    let (status, body) = call(&app, "GET", &format!("/api/attempts/{}/result", attempt_id), Some(&bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "access_denied");

    let (status, body) = call(
        &app,
        "PATCH",
        &format!("/api/attempts/{}/answer", attempt_id),
        Some(&alice),
        Some(json!({"question_index": 1, "option_index": 0})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "already_completed");

    let (status, body) = call(&app, "GET", &format!("/api/assessments/{}/attempts", id), Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn eligibility_reason_reaches_the_client() {
    let exam = scheduled(2, 30, at(10, 0), 60);
    let id = exam.id;
    let h = Harness::new(at(9, 30), vec![exam]).await;
    let app = app(&h);
    let alice = token("alice", None);

    let (status, body) = call(&app, "POST", &format!("/api/assessments/{}/start", id), Some(&alice), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "not_yet_open");

    let (status, body) = call(
        &app,
        "GET",
        &format!("/api/assessments/{}/window?at=2026-06-01T10:50:00Z", id),
        Some(&alice),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "closing_soon");
    assert_eq!(body["remaining_seconds"], 600);
}

#[tokio::test]
async fn late_submit_is_gone() {
    let exam = assessment(AssessmentKind::Weekly, 1, 5);
    let id = exam.id;
    let h = Harness::new(at(9, 0), vec![exam]).await;
    let app = app(&h);
    let alice = token("alice", None);

    let (_, body) = call(&app, "POST", &format!("/api/assessments/{}/start", id), Some(&alice), None).await;
    let attempt_id = body["attempt"]["id"].as_str().unwrap().to_string();

    h.advance(Duration::minutes(6));
    let (status, body) = call(
        &app,
        "POST",
        &format!("/api/attempts/{}/submit", attempt_id),
        Some(&alice),
        Some(json!({"answers": [0], "time_spent_seconds": 360})),
    )
    .await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["error"], "deadline_passed");

    let (status, body) = call(&app, "POST", &format!("/api/attempts/{}/force-submit", attempt_id), Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["submission"], "timeout");
    assert_eq!(body["score"]["unanswered_count"], 1);
}

#[tokio::test]
async fn requests_without_valid_tokens_are_refused() {
    let exam = assessment(AssessmentKind::Weekly, 1, 5);
    let id = exam.id;
    let h = Harness::new(at(9, 0), vec![exam]).await;
    let app = app(&h);

    let (status, body) = call(&app, "POST", &format!("/api/assessments/{}/start", id), None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let forged = assert_ok!(AuthKeys::new("other").issue("alice", None, Duration::minutes(5)));
    let (status, _) = call(&app, "POST", &format!("/api/assessments/{}/start", id), Some(&forged), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = call(&app, "GET", "/api/docs/openapi.json", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/api/attempts/{id}/submit"].is_object());
}

#[tokio::test]
async fn admin_routes_require_admin_role() {
    let current = assessment(AssessmentKind::RmExam, 1, 5);
    let mut next = assessment(AssessmentKind::RmExam, 1, 5);
    next.is_active = false;
    let (current_id, next_id) = (current.id, next.id);
    let h = Harness::new(at(9, 0), vec![current, next]).await;
    let app = app(&h);

    let user = token("alice", None);
    let (status, _) = call(&app, "POST", &format!("/api/admin/assessments/{}/activate", next_id), Some(&user), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = token("root", Some("admin"));
    let (status, body) = call(&app, "POST", &format!("/api/admin/assessments/{}/activate", next_id), Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_active"], true);
    assert_eq!(body["kind"], "rm_exam");

    let (status, body) = call(
        &app,
        "POST",
        &format!("/api/admin/assessments/{}/master", current_id),
        Some(&admin),
        Some(json!({"enabled": false})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_active"], false);
    assert_eq!(body["master_enabled"], false);

    let (status, body) = call(&app, "POST", "/api/admin/sweep", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sealed"], 0);
}
