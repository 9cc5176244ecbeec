//! HTTP API tests against the in-memory adapters.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::{TestRequest, TestServer};
use chrono::Duration;
use request_desk_core::registry::TypeRegistry;
use request_desk_core::request::Actor;
use request_desk_runtime::{AttachmentStagingService, RequestEngine, StagingConfig};
use request_desk_testing::{
    fixtures, InMemoryRequestRepository, ManualClock, MockObjectStorage, RecordingDispatcher,
    test_time,
};
use request_desk_web::{build_router, AppState};
use serde_json::{json, Value};
use std::sync::Arc;

struct Api {
    server: TestServer,
    storage: MockObjectStorage,
    dispatcher: RecordingDispatcher,
    clock: ManualClock,
}

fn api() -> Api {
    let repository = InMemoryRequestRepository::new();
    let storage = MockObjectStorage::new();
    let dispatcher = RecordingDispatcher::new();
    let clock = ManualClock::starting_at(test_time());
    let staging = AttachmentStagingService::new(Arc::new(storage.clone()), StagingConfig::default());
    let engine = RequestEngine::new(
        Arc::new(TypeRegistry::standard().expect("standard registry")),
        Arc::new(repository),
        staging,
        Arc::new(dispatcher.clone()),
    )
    .with_clock(Arc::new(clock.clone()));

    let server = TestServer::new(build_router(AppState::new(engine))).expect("test server");
    Api {
        server,
        storage,
        dispatcher,
        clock,
    }
}

fn as_actor(request: TestRequest, actor: &Actor) -> TestRequest {
    request
        .add_header(
            HeaderName::from_static("x-actor-id"),
            HeaderValue::from_str(&actor.id.to_string()).unwrap(),
        )
        .add_header(
            HeaderName::from_static("x-actor-role"),
            HeaderValue::from_static(if actor.is_admin() { "admin" } else { "investor" }),
        )
}

impl Api {
    async fn create(&self, actor: &Actor, request_type: &str, payload: Value) -> Value {
        let response = as_actor(self.server.post("/api/requests"), actor)
            .json(&json!({ "type": request_type, "payload": payload }))
            .await;
        response.assert_status(StatusCode::CREATED);
        response.json::<Value>()
    }

    async fn post(&self, actor: &Actor, path: &str, body: Value) -> (StatusCode, Value) {
        let response = as_actor(self.server.post(path), actor).json(&body).await;
        (response.status_code(), response.json::<Value>())
    }

    async fn get(&self, actor: &Actor, path: &str) -> (StatusCode, Value) {
        let response = as_actor(self.server.get(path), actor).await;
        (response.status_code(), response.json::<Value>())
    }
}

fn id_of(body: &Value) -> String {
    body["id"].as_str().expect("id").to_string()
}

#[tokio::test]
async fn create_returns_draft_at_version_one() {
    let api = api();
    let investor = fixtures::investor();

    let body = api.create(&investor, "feedback", fixtures::feedback()).await;

    assert_eq!(body["status"], "draft");
    assert_eq!(body["version"], 1);
    assert_eq!(body["request_type"], "feedback");
    assert_eq!(body["submitter_id"], investor.id.to_string());
    assert_eq!(api.dispatcher.event_types(), vec!["RequestCreated.v1"]);
}

#[tokio::test]
async fn unknown_type_is_a_bad_request() {
    let api = api();
    let (status, body) = api
        .post(
            &fixtures::investor(),
            "/api/requests",
            json!({ "type": "loan", "payload": {} }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "UNKNOWN_REQUEST_TYPE");
}

#[tokio::test]
async fn invalid_payload_lists_field_errors() {
    let api = api();
    let mut payload = fixtures::partnership();
    payload["contact_phone"] = json!("123");

    let (status, body) = api
        .post(
            &fixtures::investor(),
            "/api/requests",
            json!({ "type": "partnership", "payload": payload }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
    let fields = body["details"]["fields"].as_array().expect("field errors");
    assert!(fields.iter().any(|f| f["path"] == "contact_phone"));
}

#[tokio::test]
async fn malformed_json_uses_error_body() {
    let api = api();
    let response = as_actor(api.server.post("/api/requests"), &fixtures::investor())
        .content_type("application/json")
        .bytes("{not json".into())
        .await;

    assert!(response.status_code().is_client_error());
    assert!(response.json::<Value>()["code"].is_string());
}

#[tokio::test]
async fn missing_actor_headers_are_unauthorized() {
    let api = api();
    let response = api
        .server
        .post("/api/requests")
        .json(&json!({ "type": "feedback", "payload": fixtures::feedback() }))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(response.json::<Value>()["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn other_investors_cannot_read_a_request() {
    let api = api();
    let owner = fixtures::investor();
    let draft = api.create(&owner, "feedback", fixtures::feedback()).await;

    let (status, body) = api
        .get(&fixtures::investor(), &format!("/api/requests/{}", id_of(&draft)))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");

    let (status, view) = api
        .get(&fixtures::admin(), &format!("/api/requests/{}", id_of(&draft)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["request"]["status"], "draft");
}

#[tokio::test]
async fn unknown_request_is_not_found() {
    let api = api();
    let (status, body) = api
        .get(
            &fixtures::admin(),
            &format!("/api/requests/{}", uuid::Uuid::new_v4()),
        )
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn stale_version_is_a_conflict() {
    let api = api();
    let investor = fixtures::investor();
    let draft = api.create(&investor, "feedback", fixtures::feedback()).await;
    let path = format!("/api/requests/{}", id_of(&draft));

    let mut payload = fixtures::feedback();
    payload["subject"] = json!("Updated subject");
    let response = as_actor(api.server.patch(&path), &investor)
        .json(&json!({ "payload": payload, "expected_version": 1 }))
        .await;
    response.assert_status(StatusCode::OK);
    assert_eq!(response.json::<Value>()["version"], 2);

    let response = as_actor(api.server.patch(&path), &investor)
        .json(&json!({ "payload": payload, "expected_version": 1 }))
        .await;
    response.assert_status(StatusCode::CONFLICT);
    let body = response.json::<Value>();
    assert_eq!(body["code"], "VERSION_CONFLICT");
    assert_eq!(body["details"]["current_version"], 2);
}

#[tokio::test]
async fn racing_admins_see_a_conflict() {
    let api = api();
    let investor = fixtures::investor();
    let draft = api.create(&investor, "feedback", fixtures::feedback()).await;
    let base = format!("/api/requests/{}", id_of(&draft));

    let (status, _) = api
        .post(&investor, &format!("{base}/submit"), json!({ "expected_version": 1 }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let body = json!({ "action": "start_review", "expected_version": 2 });
    let (status, _) = api
        .post(&fixtures::admin(), &format!("{base}/transition"), body.clone())
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, conflict) = api
        .post(&fixtures::admin(), &format!("{base}/transition"), body)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(conflict["code"], "VERSION_CONFLICT");
    assert_eq!(conflict["details"]["current_version"], 3);
}

#[tokio::test]
async fn review_flow_and_illegal_transition() {
    let api = api();
    let investor = fixtures::investor();
    let admin = fixtures::admin();
    let draft = api.create(&investor, "feedback", fixtures::feedback()).await;
    let base = format!("/api/requests/{}", id_of(&draft));

    let (status, body) = api
        .post(
            &admin,
            &format!("{base}/transition"),
            json!({ "action": "approve", "expected_version": 1 }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "ILLEGAL_TRANSITION");

    let (status, _) = api
        .post(
            &admin,
            &format!("{base}/transition"),
            json!({ "action": "dance", "expected_version": 1 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, submitted) = api
        .post(&investor, &format!("{base}/submit"), json!({ "expected_version": 1 }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(submitted["status"], "submitted");

    let (status, _) = api
        .post(
            &investor,
            &format!("{base}/transition"),
            json!({ "action": "start_review", "expected_version": 2 }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, reviewing) = api
        .post(
            &admin,
            &format!("{base}/transition"),
            json!({ "action": "start_review", "expected_version": 2 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reviewing["status"], "under_review");
    assert_eq!(reviewing["reviewer_id"], admin.id.to_string());

    let (status, body) = api
        .post(
            &admin,
            &format!("{base}/transition"),
            json!({ "action": "reject", "expected_version": 3 }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, rejected) = api
        .post(
            &admin,
            &format!("{base}/transition"),
            json!({ "action": "reject", "expected_version": 3, "notes": "Out of scope" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rejected["status"], "rejected");
    assert_eq!(rejected["review_notes"], "Out of scope");

    let (status, history) = api.get(&investor, &format!("{base}/audit")).await;
    assert_eq!(status, StatusCode::OK);
    let actions: Vec<_> = history
        .as_array()
        .expect("entries")
        .iter()
        .map(|e| e["action"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(actions.len(), 4);
    let sequences: Vec<_> = history
        .as_array()
        .expect("entries")
        .iter()
        .map(|e| e["sequence"].as_u64().unwrap_or_default())
        .collect();
    assert_eq!(sequences, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn withdraw_by_submitter() {
    let api = api();
    let investor = fixtures::investor();
    let draft = api.create(&investor, "signup", fixtures::signup()).await;
    let base = format!("/api/requests/{}", id_of(&draft));

    let (status, body) = api
        .post(&investor, &format!("{base}/withdraw"), json!({ "expected_version": 1 }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "withdrawn");

    let (_, view) = api.get(&investor, &base).await;
    assert_eq!(view["allowed_actions"], json!([]));
}

#[tokio::test]
async fn board_nomination_upload_flow() {
    let api = api();
    let investor = fixtures::investor();
    let draft = api
        .create(&investor, "board_nomination", fixtures::board_nomination())
        .await;
    let base = format!("/api/requests/{}", id_of(&draft));

    let (status, staged) = api
        .post(
            &investor,
            &format!("{base}/attachments/presign"),
            json!({
                "filename": "cv.pdf",
                "content_type": "application/pdf",
                "size": 2048,
                "expected_version": 1,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(staged["version"], 2);
    assert!(staged["upload_url"].as_str().is_some_and(|u| !u.is_empty()));
    let attachment_id = staged["attachment_id"].as_str().expect("attachment id").to_string();

    let (status, body) = api
        .post(&investor, &format!("{base}/submit"), json!({ "expected_version": 2 }))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "ATTACHMENT_NOT_CONFIRMED");

    let slot = api.storage.presigned_slots().pop().expect("slot");
    api.storage.put_object(&slot.key, 2048, None);

    let response = as_actor(
        api.server
            .post(&format!("{base}/attachments/{attachment_id}/confirm")),
        &investor,
    )
    .await;
    response.assert_status(StatusCode::OK);
    let confirmed = response.json::<Value>();
    assert_eq!(confirmed["attachment"]["upload_status"], "confirmed");
    assert_eq!(confirmed["version"], 3);

    let (status, submitted) = api
        .post(&investor, &format!("{base}/submit"), json!({ "expected_version": 3 }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(submitted["status"], "submitted");

    let (_, view) = api.get(&investor, &base).await;
    assert_eq!(view["attachments"][0]["id"], attachment_id.as_str());
}

#[tokio::test]
async fn confirming_after_the_deadline_is_gone() {
    let api = api();
    let investor = fixtures::investor();
    let draft = api
        .create(&investor, "board_nomination", fixtures::board_nomination())
        .await;
    let base = format!("/api/requests/{}", id_of(&draft));

    let (_, staged) = api
        .post(
            &investor,
            &format!("{base}/attachments/presign"),
            json!({ "filename": "cv.pdf", "content_type": "application/pdf", "size": 2048 }),
        )
        .await;
    let attachment_id = staged["attachment_id"].as_str().expect("attachment id");
    let slot = api.storage.presigned_slots().pop().expect("slot");
    api.storage.put_object(&slot.key, 2048, None);

    api.clock.advance(Duration::minutes(16));

    let (status, body) = api
        .post(
            &investor,
            &format!("{base}/attachments/{attachment_id}/confirm"),
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["code"], "ATTACHMENT_EXPIRED");

    let (_, view) = api.get(&investor, &base).await;
    assert_eq!(view["attachments"][0]["upload_status"], "expired");
}

#[tokio::test]
async fn malformed_confirm_body_is_a_bad_request() {
    let api = api();
    let investor = fixtures::investor();
    let draft = api.create(&investor, "feedback", fixtures::feedback()).await;
    let base = format!("/api/requests/{}", id_of(&draft));

    let (_, staged) = api
        .post(
            &investor,
            &format!("{base}/attachments/presign"),
            json!({ "filename": "deck.pdf", "content_type": "application/pdf", "size": 2048 }),
        )
        .await;
    let attachment_id = staged["attachment_id"].as_str().expect("attachment id");
    let slot = api.storage.presigned_slots().pop().expect("slot");
    api.storage.put_object(&slot.key, 2048, None);
    let confirm = format!("{base}/attachments/{attachment_id}/confirm");

    let response = as_actor(api.server.post(&confirm), &investor)
        .text("{\"checksum_sha256\": ")
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["code"], "BAD_REQUEST");

    let (_, view) = api.get(&investor, &base).await;
    assert_eq!(view["attachments"][0]["upload_status"], "pending");
    assert_eq!(view["request"]["version"], 2);

    let response = as_actor(api.server.post(&confirm), &investor).await;
    response.assert_status(StatusCode::OK);
    assert_eq!(response.json::<Value>()["attachment"]["upload_status"], "confirmed");
}

#[tokio::test]
async fn disallowed_content_type_is_rejected() {
    let api = api();
    let investor = fixtures::investor();
    let draft = api.create(&investor, "feedback", fixtures::feedback()).await;

    let (status, body) = api
        .post(
            &investor,
            &format!("/api/requests/{}/attachments/presign", id_of(&draft)),
            json!({ "filename": "run.exe", "content_type": "application/x-msdownload", "size": 10 }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn health_and_readiness() {
    let api = api();

    let response = api.server.get("/health").await;
    response.assert_status(StatusCode::OK);
    assert_eq!(response.json::<Value>()["status"], "ok");

    let response = api.server.get("/ready").await;
    response.assert_status(StatusCode::OK);
    assert_eq!(response.json::<Value>()["ready"], true);

    api.server.get("/metrics").await.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn responses_carry_a_correlation_id() {
    let api = api();
    let response = api.server.get("/health").await;
    let id = response
        .headers()
        .get("x-correlation-id")
        .expect("correlation id header")
        .to_str()
        .unwrap();
    assert!(uuid::Uuid::parse_str(id).is_ok());
}
