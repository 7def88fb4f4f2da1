//! HTTP surface tests, driving the router directly.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use timecard_ledger::api::{router, AppState};

use common::setup_ledger;

const TENANT: &str = "tenant-a";

async fn app() -> (timecard_ledger::database::Database, Router) {
    let (db, ledger) = setup_ledger().await;
    (db, router(AppState::new(ledger, 200)))
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    user: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-tenant-id", TENANT)
        .header("x-forwarded-for", "200.1.2.3, 10.0.0.1")
        .header("user-agent", "relogio-ponto/2.1");
    if let Some(user) = user {
        request = request.header("x-user-id", user);
    }
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn clock_in(app: &Router, hours: &str, day: u32) -> Value {
    let (status, body) = send(
        app,
        "POST",
        "/timecard/entries",
        Some("ana"),
        Some(json!({
            "checkIn": format!("2024-05-{:02}T08:00:00Z", day),
            "checkOut": format!("2024-05-{:02}T17:00:00Z", day),
            "totalHours": hours,
            "location": "Matriz",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "body: {}", body);
    body
}

#[tokio::test]
async fn test_health_check() {
    let (_db, app) = app().await;
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_missing_tenant_is_unauthorized() {
    let (_db, app) = app().await;
    let response = app
        .oneshot(
            Request::builder()
                .uri("/compliance/integrity-check")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["message"], "Missing x-tenant-id header");
}

#[tokio::test]
async fn test_mutations_require_user() {
    let (_db, app) = app().await;

    let (status, _) = send(
        &app,
        "POST",
        "/timecard/entries",
        None,
        Some(json!({ "totalHours": "8.00" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, "POST", "/compliance/rebuild-integrity", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_and_check_integrity() {
    let (_db, app) = app().await;

    let first = clock_in(&app, "8.00", 2).await;
    let second = clock_in(&app, "7.50", 3).await;
    assert_eq!(first["nsr"], 1);
    assert_eq!(second["nsr"], 2);
    assert_eq!(first["recordHash"].as_str().unwrap().len(), 64);

    let (status, body) = send(&app, "GET", "/compliance/integrity-check", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isValid"], true);
    assert_eq!(body["errors"], json!([]));
    assert_eq!(body["chainState"], "VALID");

    let (status, entries) = send(&app, "GET", "/timecard/entries?userId=ana", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let entries = entries.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["ipAddress"], "200.1.2.3");
    assert_eq!(entries[0]["previousRecordHash"], Value::Null);
    assert_eq!(entries[1]["previousRecordHash"], first["recordHash"]);
}

#[tokio::test]
async fn test_tampering_is_a_successful_check() {
    let (db, app) = app().await;
    for (hours, day) in [("8.00", 2), ("7.50", 3), ("8.25", 6)] {
        clock_in(&app, hours, day).await;
    }

    sqlx::query("UPDATE timecard_entries SET total_hours = '9.99' WHERE nsr = 2")
        .execute(db.pool())
        .await
        .unwrap();

    let (status, body) = send(&app, "GET", "/compliance/integrity-check", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isValid"], false);
    assert_eq!(body["errors"], json!(["NSR 2: Hash do registro foi alterado"]));
    assert_eq!(body["chainState"], "INVALID");

    let (status, body) = send(
        &app,
        "POST",
        "/compliance/rebuild-integrity",
        Some("admin"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["fixed"], 2);
    assert_eq!(body["chainState"], "REBUILT");

    let (_, body) = send(&app, "GET", "/compliance/integrity-check", None, None).await;
    assert_eq!(body["isValid"], true);
}

#[tokio::test]
async fn test_report_generation_and_download() {
    let (_db, app) = app().await;
    for (hours, day) in [("8.00", 2), ("7.50", 3), ("8.25", 6)] {
        clock_in(&app, hours, day).await;
    }

    let (status, _) = send(
        &app,
        "POST",
        "/compliance/generate-report",
        Some("rh-user"),
        Some(json!({ "reportType": "MONTHLY" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "POST",
        "/compliance/generate-report",
        Some("rh-user"),
        Some(json!({
            "reportType": "WEEKLY",
            "periodStart": "2024-05-01T00:00:00Z",
            "periodEnd": "2024-05-31T23:59:59Z",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        "POST",
        "/compliance/generate-report",
        Some("rh-user"),
        Some(json!({
            "reportType": "MONTHLY",
            "periodStart": "2024-05-01T00:00:00Z",
            "periodEnd": "2024-05-31T23:59:59Z",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let report_id = body["reportId"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        "GET",
        &format!("/compliance/reports/{}", report_id),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["hashVerified"], true);
    assert_eq!(body["report"]["totalRecords"], 3);
    assert_eq!(body["report"]["totalHours"], "23.75");

    let (status, list) = send(
        &app,
        "GET",
        "/compliance/reports?reportType=MONTHLY&year=2024",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);

    let (status, body) = send(
        &app,
        "POST",
        &format!("/compliance/reports/{}/submit", report_id),
        Some("rh-user"),
        Some(json!({ "protocol": "MTE-2024-000123" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isSubmittedToAuthorities"], true);

    let (status, _) = send(
        &app,
        "POST",
        &format!("/compliance/reports/{}/submit", report_id),
        Some("rh-user"),
        Some(json!({ "protocol": "MTE-2024-000124" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, "GET", "/compliance/reports/missing", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["message"].as_str().unwrap().contains("missing"));
}

#[tokio::test]
async fn test_audit_log_listing() {
    let (_db, app) = app().await;
    let first = clock_in(&app, "8.00", 2).await;
    clock_in(&app, "7.50", 3).await;

    let (status, _) = send(
        &app,
        "POST",
        &format!("/timecard/entries/{}/approve", first["id"].as_str().unwrap()),
        Some("gestor"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, "GET", "/compliance/audit-log?limit=10", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 3);

    let (_, body) = send(&app, "GET", "/compliance/audit-log?action=APPROVE", None, None).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["entries"][0]["performedBy"], "gestor");
    assert_eq!(body["entries"][0]["ipAddress"], "200.1.2.3");
    assert_eq!(body["entries"][0]["userAgent"], "relogio-ponto/2.1");

    let uri = "/compliance/audit-log?userId=ana&page=1&limit=1";
    let (_, body) = send(&app, "GET", uri, None, None).await;
    assert_eq!(body["total"], 2);
    assert_eq!(body["entries"].as_array().unwrap().len(), 1);

    let (status, _) = send(&app, "GET", "/compliance/audit-log?action=ERASE", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "POST",
        &format!("/timecard/entries/{}/approve", first["id"].as_str().unwrap()),
        Some("gestor"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_backup_and_key_endpoints() {
    let (_db, app) = app().await;

    let (status, body) = send(&app, "GET", "/compliance/backups", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    let (status, _) = send(&app, "POST", "/compliance/verify-backup", None, Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "POST",
        "/compliance/verify-backup",
        None,
        Some(json!({ "backupDate": "2024-05-31" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, "GET", "/compliance/keys", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_invalid_entry_is_bad_request() {
    let (_db, app) = app().await;
    let (status, body) = send(
        &app,
        "POST",
        "/timecard/entries",
        Some("ana"),
        Some(json!({
            "checkIn": "2024-05-02T17:00:00Z",
            "checkOut": "2024-05-02T08:00:00Z",
            "totalHours": "8.00",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "checkOut cannot be before checkIn");
}
