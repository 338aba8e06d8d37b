use crate::{router, AppState, HttpConfig, RateLimitConfig, RateLimiter};
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use catalog_ingest_core::application::{ImportQueryService, IngestionGateway};
use catalog_ingest_core::domain::ImportMessage;
use catalog_ingest_core::port::file_store::mocks::InMemoryFileStore;
use catalog_ingest_core::port::id_provider::mocks::SequentialIdProvider;
use catalog_ingest_core::port::job_store::mocks::InMemoryJobStore;
use catalog_ingest_core::port::message_transport::mocks::InMemoryTransport;
use catalog_ingest_core::port::time_provider::mocks::ManualTimeProvider;
use catalog_ingest_core::port::{MessageTransport, Topology};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

const BOUNDARY: &str = "catalog-ingest-boundary";
const VALID_CSV: &str = "sku,name,price,category,stock,imageUrl\nA-1,Hammer,19.99,tools,3,\n";

struct TestApp {
    app: Router,
    transport: Arc<InMemoryTransport>,
    files: Arc<InMemoryFileStore>,
}

fn test_app_with_limit(burst: u32) -> TestApp {
    let topology = Topology::default();
    let store = Arc::new(InMemoryJobStore::new());
    let files = Arc::new(InMemoryFileStore::new());
    let transport = Arc::new(InMemoryTransport::with_topology(&topology));
    let clock = Arc::new(ManualTimeProvider::new(1_000));

    let gateway = IngestionGateway::new(
        store.clone(),
        files.clone(),
        transport.clone(),
        Arc::new(SequentialIdProvider::new("job")),
        clock.clone(),
        topology.clone(),
    );
    let queries = ImportQueryService::new(store, transport.clone(), clock, topology);
    let state = AppState {
        gateway: Arc::new(gateway),
        queries: Arc::new(queries),
        rate_limiter: Arc::new(RateLimiter::new(&RateLimitConfig {
            burst,
            per_second: 0,
        })),
    };

    TestApp {
        app: router(state, &HttpConfig::default()),
        transport,
        files,
    }
}

fn test_app() -> TestApp {
    test_app_with_limit(100)
}

fn upload_request(file_name: &str, content_type: &str, contents: &str) -> Request<Body> {
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\nContent-Type: {ct}\r\n\r\n{c}\r\n--{b}--\r\n",
        b = BOUNDARY,
        f = file_name,
        ct = content_type,
        c = contents
    );
    Request::builder()
        .method("POST")
        .uri("/imports")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, json: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_healthz() {
    let t = test_app();
    let response = t.app.clone().oneshot(get("/healthz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_upload_accepted_and_status_visible() {
    let t = test_app();

    let (status, body) = send(&t.app, upload_request("catalog.csv", "text/csv", VALID_CSV)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["jobId"], "job-1");
    assert!(t.files.contains("job-1.csv"));
    assert_eq!(t.transport.published().len(), 1);

    let (status, body) = send(&t.app, get("/imports/job-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "job-1");
    assert_eq!(body["status"], "Pending");
    assert_eq!(body["fileName"], "catalog.csv");
    assert_eq!(body["processedRows"], 0);
    assert_eq!(body["lastError"], Value::Null);
}

#[tokio::test]
async fn test_upload_missing_columns_is_schema_mismatch() {
    let t = test_app();

    let (status, body) = send(
        &t.app,
        upload_request("catalog.csv", "text/csv", "sku,name\nA-1,Hammer\n"),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "SchemaMismatch");
    assert!(t.files.is_empty());
    assert!(t.transport.published().is_empty());
}

#[tokio::test]
async fn test_upload_wrong_content_type_is_invalid_upload() {
    let t = test_app();

    let (status, body) = send(&t.app, upload_request("photo.png", "image/png", VALID_CSV)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "InvalidUpload");
}

#[tokio::test]
async fn test_upload_requires_multipart() {
    let t = test_app();

    let (status, body) = send(&t.app, post_json("/imports", "{}")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "InvalidUpload");
}

#[tokio::test]
async fn test_upload_rate_limited() {
    let t = test_app_with_limit(1);

    let (status, _) = send(&t.app, upload_request("a.csv", "text/csv", VALID_CSV)).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, body) = send(&t.app, upload_request("b.csv", "text/csv", VALID_CSV)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "RateLimited");
}

#[tokio::test]
async fn test_upload_publish_failure_is_service_unavailable() {
    let t = test_app();
    t.transport.fail_next_publishes(10);

    let (status, body) = send(&t.app, upload_request("a.csv", "text/csv", VALID_CSV)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "TransportError");

    // The job exists and records why it never ran
    let (status, body) = send(&t.app, get("/imports/job-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Failed");
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let t = test_app();

    let (status, body) = send(&t.app, get("/imports/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NotFound");

    let (status, _) = send(&t.app, get("/imports/nope/errors")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_errors_page_defaults() {
    let t = test_app();
    send(&t.app, upload_request("a.csv", "text/csv", VALID_CSV)).await;

    let (status, body) = send(&t.app, get("/imports/job-1/errors?page=0&pageSize=9999")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"], serde_json::json!([]));
    assert_eq!(body["page"], 1);
    assert_eq!(body["pageSize"], 500);
    assert_eq!(body["total"], 0);
    assert_eq!(body["hasNext"], false);
}

#[tokio::test]
async fn test_cancel_then_cancel_again_conflicts() {
    let t = test_app();
    send(&t.app, upload_request("a.csv", "text/csv", VALID_CSV)).await;

    let (status, body) = send(
        &t.app,
        post_json("/imports/job-1/cancel", r#"{"reason":"wrong file"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Failed");
    assert_eq!(body["lastError"], "cancelled: wrong file");

    let (status, body) = send(&t.app, post_json("/imports/job-1/cancel", "")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Conflict");
}

#[tokio::test]
async fn test_cancel_rejects_malformed_body() {
    let t = test_app();
    send(&t.app, upload_request("a.csv", "text/csv", VALID_CSV)).await;

    let (status, body) = send(&t.app, post_json("/imports/job-1/cancel", "{nope")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "InvalidRequest");
}

#[tokio::test]
async fn test_stats_counts_jobs_and_queue() {
    let t = test_app();
    send(&t.app, upload_request("a.csv", "text/csv", VALID_CSV)).await;

    let (status, body) = send(&t.app, get("/admin/stats")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["queueDepth"], 1);
    assert_eq!(body["deadLetters"], 0);
    let pending = body["jobsByStatus"]
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["status"] == "Pending")
        .unwrap();
    assert_eq!(pending["count"], 1);
}

#[tokio::test]
async fn test_dead_letter_list_and_replay() {
    let t = test_app();
    let topology = Topology::default();
    send(&t.app, upload_request("a.csv", "text/csv", VALID_CSV)).await;

    // Park the job's message on the dead-letter queue
    let delivery = t.transport.receive(&topology.queue).await.unwrap().unwrap();
    t.transport.nack(&delivery, false).await.unwrap();

    let (status, body) = send(&t.app, get("/admin/dead-letters?limit=10")).await;
    assert_eq!(status, StatusCode::OK);
    let dead = body.as_array().unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0]["jobId"], "job-1");
    assert_eq!(dead[0]["sourceFileRef"], "job-1.csv");
    let id = dead[0]["id"].as_i64().unwrap();

    let (status, body) = send(&t.app, post_json(&format!("/admin/dead-letters/{}/replay", id), "")).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["jobId"], "job-2");

    let (_, body) = send(&t.app, get("/imports/job-2")).await;
    assert_eq!(body["fileName"], "a.csv");
    assert_eq!(body["status"], "Pending");

    let (_, body) = send(&t.app, get("/admin/dead-letters")).await;
    assert_eq!(body, serde_json::json!([]));

    let (status, _) = send(&t.app, post_json(&format!("/admin/dead-letters/{}/replay", id), "")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let published: Vec<ImportMessage> = t.transport.published();
    assert_eq!(published.last().unwrap().job_id, "job-2");
}
