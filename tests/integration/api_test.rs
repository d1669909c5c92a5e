use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use carbon_retire::{
    models::batch::{BatchFilter, BatchStatus},
    routes::create_router,
    store::RetirementStore,
};
use serde_json::{json, Value};
use std::sync::Arc;
use time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

use super::{faulty_store::FaultyStore, test_config, TestApp};

const BOUNDARY: &str = "retirement-upload-boundary";

fn bearer(app: &TestApp, company_id: Uuid) -> String {
    let token = app
        .state
        .jwt_service
        .generate_token(app.user_id, company_id, "admin", Duration::minutes(15))
        .unwrap();
    format!("Bearer {}", token)
}

fn router(app: &TestApp) -> Router {
    create_router(app.state.clone())
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let response = router(app).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn json_request(app: &TestApp, method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, bearer(app, app.company_id));

    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn multipart_request(app: &TestApp, parts: &[(&str, &str)]) -> Request<Body> {
    let mut body = String::new();
    for (name, value) in parts {
        body.push_str(&format!("--{}\r\n", BOUNDARY));
        if *name == "file" {
            body.push_str(
                "Content-Disposition: form-data; name=\"file\"; filename=\"retire.csv\"\r\n\
                 Content-Type: text/csv\r\n\r\n",
            );
        } else {
            body.push_str(&format!(
                "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                name
            ));
        }
        body.push_str(value);
        body.push_str("\r\n");
    }
    body.push_str(&format!("--{}--\r\n", BOUNDARY));

    Request::builder()
        .method(Method::POST)
        .uri("/api/v1/retirement-batches/csv")
        .header(header::AUTHORIZATION, bearer(app, app.company_id))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

fn schedule_body() -> Value {
    json!({
        "name": "Monthly Scope 1",
        "description": "Offset office energy",
        "purpose": "scope1",
        "amount": "12.5",
        "creditSelection": "automatic",
        "frequency": "monthly",
        "startDate": "2026-02-01",
    })
}

#[tokio::test]
async fn requests_without_token_are_unauthorized() {
    let app = TestApp::new();
    let request = Request::builder()
        .uri("/api/v1/retirement-schedules")
        .body(Body::empty())
        .unwrap();

    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn schedule_lifecycle_over_http() {
    let app = TestApp::new();
    app.fund("scope1", 100).await;

    let (status, body) = send(
        &app,
        json_request(&app, Method::POST, "/api/v1/retirement-schedules", Some(schedule_body())),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["creditSelection"], "automatic");
    assert_eq!(body["data"]["nextRunDate"], "2026-02-01T00:00:00Z");
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        json_request(&app, Method::POST, &format!("/api/v1/retirement-schedules/{}/pause", id), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["isActive"], false);

    let (status, body) = send(
        &app,
        json_request(&app, Method::POST, &format!("/api/v1/retirement-schedules/{}/execute", id), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["outcome"], "success");
    assert_eq!(body["data"]["trigger"], "manual");

    let (status, body) = send(
        &app,
        json_request(
            &app,
            Method::PATCH,
            &format!("/api/v1/retirement-schedules/{}", id),
            Some(json!({ "frequency": "weekly" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["nextRunDate"], "2026-02-08T00:00:00Z");

    let (status, body) = send(
        &app,
        json_request(&app, Method::GET, "/api/v1/retirement-schedules?isActive=false", None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, _) = send(
        &app,
        json_request(&app, Method::DELETE, &format!("/api/v1/retirement-schedules/{}", id), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        json_request(&app, Method::GET, &format!("/api/v1/retirement-schedules/{}/executions", id), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, body) = send(
        &app,
        json_request(&app, Method::GET, &format!("/api/v1/retirement-schedules/{}", id), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn inconsistent_credit_selection_is_rejected() {
    let app = TestApp::new();
    let mut body = schedule_body();
    body["creditSelection"] = json!("manual");

    let (status, body) = send(
        &app,
        json_request(&app, Method::POST, "/api/v1/retirement-schedules", Some(body)),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn schedules_of_other_companies_are_hidden() {
    let app = TestApp::new();
    let (_, body) = send(
        &app,
        json_request(&app, Method::POST, "/api/v1/retirement-schedules", Some(schedule_body())),
    )
    .await;
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let request = Request::builder()
        .uri(format!("/api/v1/retirement-schedules/{}", id))
        .header(header::AUTHORIZATION, bearer(&app, Uuid::new_v4()))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn json_batch_is_processed_and_retrievable() {
    let app = TestApp::new();
    let credit = app.fund("scope1", 10).await;

    let (status, body) = send(
        &app,
        json_request(
            &app,
            Method::POST,
            "/api/v1/retirement-batches",
            Some(json!({
                "name": "Year end",
                "items": [
                    { "creditId": credit.id.to_string(), "amount": 4, "purpose": "scope1" },
                    { "amount": 100, "purpose": "scope1" },
                ],
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["status"], "partial");
    assert_eq!(body["data"]["completedItems"], 1);
    assert_eq!(body["data"]["failedItems"], 1);
    assert_eq!(body["data"]["items"][1]["errorCode"], "INSUFFICIENT_CREDITS");
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        json_request(&app, Method::GET, &format!("/api/v1/retirement-batches/{}", id), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 2);

    let (status, body) = send(
        &app,
        json_request(&app, Method::GET, "/api/v1/retirement-batches?status=partial", None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn csv_upload_creates_batch() {
    let app = TestApp::new();
    app.fund("scope1", 50).await;

    let csv = "creditId,amount,purpose\n,5,scope1\n,7,scope1\n";
    let (status, body) = send(
        &app,
        multipart_request(&app, &[("name", "March upload"), ("file", csv)]),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["name"], "March upload");
    assert_eq!(body["data"]["status"], "completed");
    assert_eq!(body["data"]["totalItems"], 2);
}

#[tokio::test]
async fn csv_upload_without_file_is_bad_request() {
    let app = TestApp::new();

    let (status, body) = send(&app, multipart_request(&app, &[("name", "No file")])).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn csv_upload_with_bad_header_is_invalid_format() {
    let app = TestApp::new();

    let (status, body) = send(
        &app,
        multipart_request(&app, &[("file", "id,qty\n1,2\n")]),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_FORMAT");
}

#[tokio::test]
async fn timed_out_batch_request_still_finishes_the_batch() {
    let mut config = test_config();
    config.server.request_timeout_secs = 1;
    let app = TestApp::wrapped(config, |store| {
        Arc::new(FaultyStore::new(store).slow_commits(std::time::Duration::from_millis(300)))
            as Arc<dyn RetirementStore>
    });
    app.fund("scope1", 100).await;

    let items: Vec<Value> = (0..10)
        .map(|_| json!({ "amount": 1, "purpose": "scope1" }))
        .collect();
    let (status, _) = send(
        &app,
        json_request(
            &app,
            Method::POST,
            "/api/v1/retirement-batches",
            Some(json!({ "name": "Slow store", "items": items })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);

    // The batch keeps going after the response is gone
    let mut finished = None;
    for _ in 0..100 {
        let batches = app
            .store
            .list_batches(app.company_id, &BatchFilter::default())
            .await
            .unwrap();
        if let Some(batch) = batches.into_iter().find(|b| b.status.is_terminal()) {
            finished = Some(batch);
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }

    let batch = finished.expect("batch never left processing");
    assert_eq!(batch.status, BatchStatus::Completed);
    assert_eq!(batch.completed_items, 10);
    assert_eq!(batch.failed_items, 0);
}
