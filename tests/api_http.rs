// tests/api_http.rs
//
// HTTP-level tests for the public Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health
// - POST /api/predict (contract, validation, unknown sentinel)
// - vocabulary routes
// - register / login / profile and the 401 path
// - GET /metrics

use axum::{
    body::{self, Body},
    Router,
};
use http::{Request, StatusCode};
use serde_json::{json, Value as Json};
use tower::ServiceExt as _; // for `oneshot`

use healthtrack::config::{AppConfig, AuthConfig};
use healthtrack::{api, AppState};

const BODY_LIMIT: usize = 1024 * 1024; // 1MB, safe for tests

/// Same Router the binary uses, on a volatile store with cheap hashing.
fn test_router() -> Router {
    let cfg = AppConfig {
        auth: AuthConfig {
            hash_rounds: 10,
            ..AuthConfig::default()
        },
        ..AppConfig::default()
    };
    api::router(AppState::in_memory(cfg))
}

async fn call(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Json>) -> (StatusCode, Json) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(t) = token {
        req = req.header("authorization", format!("Bearer {t}"));
    }
    let req = match body {
        Some(b) => req
            .header("content-type", "application/json")
            .body(Body::from(b.to_string())),
        None => req.body(Body::empty()),
    }
    .expect("build request");

    let resp = app.clone().oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    let v = if bytes.is_empty() {
        Json::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Json::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, v)
}

#[tokio::test]
async fn api_health_returns_200_and_ok_body() {
    let app = test_router();
    let (status, body) = call(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK, "health should be 200");
    assert_eq!(body, Json::String("OK".into()), "health body should be 'OK'");
}

#[tokio::test]
async fn api_predict_returns_expected_json_fields() {
    let app = test_router();
    let (status, v) = call(
        &app,
        "POST",
        "/api/predict",
        None,
        Some(json!({ "symptoms": ["Fever", "chills", "muscle_aches", "fatigue"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "body: {v}");

    // Contract checks for UI consumers
    for key in [
        "disease",
        "confidence",
        "matchingSymptoms",
        "description",
        "precautions",
        "diet",
        "alternatives",
        "severity",
    ] {
        assert!(v.get(key).is_some(), "missing '{key}' in {v}");
    }
    assert_eq!(v["disease"], json!("Influenza (Flu)"));
    let c = v["confidence"].as_f64().expect("confidence is a number");
    assert!((0.01..=1.0).contains(&c), "confidence out of range: {c}");
    assert!(v["severity"]["level"].is_string());
}

#[tokio::test]
async fn api_predict_rejects_empty_and_oversized_selections() {
    let app = test_router();

    let (status, v) = call(&app, "POST", "/api/predict", None, Some(json!({ "symptoms": [] }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(v["message"], json!("Please select at least one symptom"));

    let many: Vec<String> = (0..11).map(|i| format!("symptom {i}")).collect();
    let (status, v) = call(&app, "POST", "/api/predict", None, Some(json!({ "symptoms": many }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(v["message"], json!("You can select up to 10 symptoms"));
}

#[tokio::test]
async fn api_predict_unknown_symptoms_yield_sentinel() {
    let app = test_router();
    let (status, v) = call(
        &app,
        "POST",
        "/api/predict",
        None,
        Some(json!({ "symptoms": ["glowing toenails"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["disease"], json!("Unknown"));
    assert_eq!(v["confidence"], json!(0.01));
    assert_eq!(v["alternatives"], json!([]));
}

#[tokio::test]
async fn api_vocabulary_routes() {
    let app = test_router();

    let (status, v) = call(&app, "GET", "/api/diseases", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v.as_array().map(Vec::len), Some(5));

    let (status, v) = call(&app, "GET", "/api/diseases/migraine", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["name"], json!("Migraine"));

    let (status, v) = call(&app, "GET", "/api/diseases/scurvy", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(v["message"], json!("Disease not found"));

    let (status, v) = call(&app, "GET", "/api/symptoms/common?limit=2", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v, json!(["fever", "cough"]));

    let (status, v) = call(&app, "GET", "/api/symptoms/search?q=sensitiv", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v, json!(["sensitivity to light", "sensitivity to sound"]));

    let (status, v) = call(&app, "GET", "/api/symptoms", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let fever = v
        .as_array()
        .and_then(|a| a.iter().find(|s| s["name"] == json!("fever")))
        .cloned()
        .expect("fever in vocabulary");
    assert_eq!(fever["severity"], json!(5));
    assert_eq!(fever["category"], json!("Fever & Infection"));
}

#[tokio::test]
async fn api_register_login_and_profile() {
    let app = test_router();

    let (status, v) = call(
        &app,
        "POST",
        "/api/users/register",
        None,
        Some(json!({ "username": "ann", "email": "ann@example.com", "password": "secret123" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "body: {v}");
    assert!(v["token"].is_string());
    assert!(v["user"].get("passwordHash").is_none(), "hash must not leak");

    let (status, v) = call(
        &app,
        "POST",
        "/api/users/login",
        None,
        Some(json!({ "username": "ann", "password": "wrong" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(v["message"], json!("Incorrect password"));

    let (status, v) = call(
        &app,
        "POST",
        "/api/users/login",
        None,
        Some(json!({ "username": "ann", "password": "secret123" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let token = v["token"].as_str().expect("token").to_string();

    let (status, v) = call(
        &app,
        "PUT",
        "/api/users/profile",
        Some(&token),
        Some(json!({ "fullName": "Ann Lee", "age": "34" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["fullName"], json!("Ann Lee"));

    let (status, v) = call(
        &app,
        "PUT",
        "/api/users/profile",
        Some(&token),
        Some(json!({ "username": "root" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(v["message"], json!("Invalid updates"));

    let (status, v) = call(&app, "GET", "/api/users/profile", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["username"], json!("ann"));
    assert_eq!(v["age"], json!("34"));
}

#[tokio::test]
async fn api_protected_routes_require_a_valid_token() {
    let app = test_router();

    let (status, v) = call(&app, "GET", "/api/users/profile", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(v["message"], json!("Authentication required"));

    let (status, _) = call(&app, "GET", "/api/health-records", Some("v1.bogus.0.00"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

async fn status_with_authorization(app: &Router, header: &str) -> StatusCode {
    let req = Request::get("/api/users/profile")
        .header("authorization", header)
        .body(Body::empty())
        .expect("build request");
    app.clone().oneshot(req).await.expect("oneshot").status()
}

#[tokio::test]
async fn api_token_must_use_the_bearer_scheme() {
    let app = test_router();
    let (status, v) = call(
        &app,
        "POST",
        "/api/users/register",
        None,
        Some(json!({ "username": "ann", "email": "ann@example.com", "password": "secret123" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let token = v["token"].as_str().expect("token").to_string();

    assert_eq!(status_with_authorization(&app, &format!("Bearer {token}")).await, StatusCode::OK);
    assert_eq!(status_with_authorization(&app, &token).await, StatusCode::UNAUTHORIZED);
    assert_eq!(
        status_with_authorization(&app, &format!("Bearer Bearer {token}")).await,
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(status_with_authorization(&app, "Bearer ").await, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn api_predict_severity_ignores_repeated_symptoms() {
    let app = test_router();
    let (status, v) = call(
        &app,
        "POST",
        "/api/predict",
        None,
        Some(json!({ "symptoms": ["runny nose", "Runny_Nose", "RUNNY NOSE", "fever"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "body: {v}");
    // runny nose (2) and fever (5), each counted once
    assert_eq!(v["severity"]["average"], json!(3.5));
    assert_eq!(v["severity"]["max"], json!(5));
    assert_eq!(v["severity"]["level"], json!("Moderate"));
}

#[tokio::test]
async fn api_duplicate_registration_is_400() {
    let app = test_router();
    let body = json!({ "username": "ann", "email": "ann@example.com", "password": "secret123" });
    let (status, _) = call(&app, "POST", "/api/users/register", None, Some(body.clone())).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, v) = call(&app, "POST", "/api/users/register", None, Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(v["message"], json!("Username already exists"));
}

#[tokio::test]
async fn api_dev_routes_are_off_by_default() {
    let app = test_router();
    let (status, _) = call(&app, "GET", "/api/users/create-test-user", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn metrics_endpoint_exposes_prediction_series() {
    let app = test_router();
    let (status, _) = call(
        &app,
        "POST",
        "/api/predict",
        None,
        Some(json!({ "symptoms": ["aura"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, v) = call(&app, "GET", "/metrics", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let text = v.as_str().expect("metrics exposition is text");
    assert!(
        text.contains("healthtrack_predictions_total"),
        "missing prediction counter in:\n{text}"
    );
}
