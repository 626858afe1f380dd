// libs/token-allocation-cell/tests/router_test.rs
//
// Full router through `oneshot`: routing, status codes, error bodies and the
// per-client rate limit.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::NaiveDate;
use serde_json::Value;
use tower::ServiceExt;

use shared_utils::test_utils::{TestClinic, TestConfig};
use token_allocation_cell::{create_token_allocation_router, TokenAllocationState};

fn app(config: TestConfig) -> Router {
    let state = TokenAllocationState::in_memory(config.to_arc());
    create_token_allocation_router(Arc::new(state))
}

fn json_request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-forwarded-for", "203.0.113.7");
    match body {
        Some(body) => builder.body(Body::from(body.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn test_allocate_call_and_complete_over_http() {
    let app = app(TestConfig::default().with_slot_capacity(1));
    let clinic = TestClinic::on(NaiveDate::from_ymd_opt(2024, 12, 28).unwrap());

    let (status, first) = send(
        &app,
        json_request(
            Method::POST,
            "/tokens",
            Some(clinic.token_payload(clinic.patient(), "09:00 AM", "walk_in")),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let token_id = first["data"]["token"]["id"].as_str().unwrap().to_string();
    let slot_id = first["data"]["slot"]["id"].as_str().unwrap().to_string();

    let (status, second) = send(
        &app,
        json_request(
            Method::POST,
            "/tokens",
            Some(clinic.token_payload(clinic.patient(), "09:00 AM", "follow_up")),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(second["data"]["isOnWaitingList"], true);

    let (status, called) = send(
        &app,
        json_request(
            Method::PATCH,
            "/tokens/call",
            Some(serde_json::json!({ "slotId": slot_id })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(called["data"]["id"], token_id.as_str());

    let (status, _) = send(&app, json_request(Method::PATCH, &format!("/tokens/{}/start", token_id), None)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, completed) = send(
        &app,
        json_request(Method::PATCH, &format!("/tokens/{}/complete", token_id), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(completed["data"]["reallocated"][0]["id"], second["data"]["token"]["id"]);

    let (status, stats) = send(
        &app,
        json_request(Method::GET, &format!("/slots/{}/statistics", slot_id), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["data"]["completedCount"], 1);

    let (status, body) = send(
        &app,
        json_request(Method::PATCH, &format!("/tokens/{}/no-show", token_id), None),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("completed"));
}

#[tokio::test]
async fn test_error_status_codes() {
    let app = app(TestConfig::default());

    let (status, body) = send(&app, json_request(Method::GET, "/tokens/not-an-id", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid ID format");

    let missing = uuid::Uuid::new_v4();
    let (status, _) = send(&app, json_request(Method::GET, &format!("/tokens/{}", missing), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        &app,
        json_request(Method::POST, "/tokens", Some(serde_json::json!({ "doctorId": missing.to_string() }))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "patientId is required");

    let (status, _) = send(&app, json_request(Method::GET, "/tokens?type=vip", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_slot_routes() {
    let app = app(TestConfig::default());
    let clinic = TestClinic::on(NaiveDate::from_ymd_opt(2024, 12, 28).unwrap());

    let (status, created) = send(
        &app,
        json_request(Method::POST, "/slots", Some(clinic.slot_payload("09:00 AM", 2))),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let slot_id = created["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        json_request(Method::POST, "/slots", Some(clinic.slot_payload("09:00 AM", 2))),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, available) = send(
        &app,
        json_request(
            Method::GET,
            &format!("/slots/available?doctorId={}&date=2024-12-28", clinic.doctor_id),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(available["count"], 1);

    let (status, doctor_slots) = send(
        &app,
        json_request(Method::GET, &format!("/slots/doctor/{}", clinic.doctor_id), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(doctor_slots["data"][0]["id"], slot_id.as_str());

    let (status, updated) = send(
        &app,
        json_request(
            Method::PATCH,
            &format!("/slots/{}", slot_id),
            Some(serde_json::json!({ "isOpen": false })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["data"]["isOpen"], false);

    let (status, listed) = send(&app, json_request(Method::GET, "/slots?isOpen=false", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["count"], 1);

    let (status, reallocated) = send(
        &app,
        json_request(Method::POST, &format!("/slots/{}/reallocate", slot_id), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reallocated["count"], 0);

    let (status, _) = send(&app, json_request(Method::DELETE, &format!("/slots/{}", slot_id), None)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, json_request(Method::GET, &format!("/slots/{}", slot_id), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_rate_limit_per_client() {
    let app = app(TestConfig::default().with_rate_limit(2, 60));

    for _ in 0..2 {
        let (status, _) = send(&app, json_request(Method::GET, "/slots", None)).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send(&app, json_request(Method::GET, "/slots", None)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "Too many requests. Please try again later.");

    let other_client = Request::builder()
        .method(Method::GET)
        .uri("/slots")
        .header("x-forwarded-for", "198.51.100.20, 10.0.0.1")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, other_client).await;
    assert_eq!(status, StatusCode::OK);
}
