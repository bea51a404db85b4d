//! API Integration Tests
//!
//! Every test runs the full router over in-memory backends; uploaded
//! "PDFs" are plain text read by the test parser.
//!
//! Author: hephaex@gmail.com

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use hrag_api::create_router;
use hrag_api::create_router_for_testing;
use hrag_api::testing::{
    test_config, test_state, test_state_with_store, TEST_ADMIN_KEY, TEST_ANSWER,
};
use hrag_vector::testing::MemoryVectorStore;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const BOUNDARY: &str = "hrag-test-boundary";

const REPORT: &str = "Lipid Panel\n\nLDL cholesterol 162 mg/dL (reference < 130)\n\
    HDL cholesterol 41 mg/dL\nTriglycerides 180 mg/dL\n\nComplete Blood Count\n\n\
    Hemoglobin 13.8 g/dL\nPlatelets 250 x10^9/L";

/// Helper to create a test request
fn create_json_request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json");

    match body {
        Some(json_body) => builder
            .body(Body::from(serde_json::to_string(&json_body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Multipart upload request with optional `user_id` field
fn upload_request(user_id: Option<&str>, filename: &str, content: &str) -> Request<Body> {
    let fields: Vec<(&str, &str)> = user_id.map(|id| ("user_id", id)).into_iter().collect();
    multipart_request(&fields, filename, content)
}

fn multipart_request(fields: &[(&str, &str)], filename: &str, content: &str) -> Request<Body> {
    let mut body = String::new();
    for (name, value) in fields {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        ));
    }
    body.push_str(&format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
         Content-Type: application/pdf\r\n\r\n{content}\r\n--{BOUNDARY}--\r\n"
    ));

    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

async fn send_text(app: &Router, request: Request<Body>) -> (StatusCode, String) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8_lossy(&body).to_string())
}

async fn upload(app: &Router, user: &str, filename: &str) -> (StatusCode, Value) {
    send(app, upload_request(Some(user), filename, REPORT)).await
}

fn query_request(user: &str, query: &str) -> Request<Body> {
    create_json_request("POST", "/query", Some(json!({ "user_id": user, "query": query })))
}

// =============================================================================
// Health Check Tests
// =============================================================================

#[tokio::test]
async fn test_health_check() {
    let app = create_router_for_testing();

    let (status, json) = send(&app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_readiness_check() {
    let app = create_router_for_testing();

    let (status, json) = send(&app, get("/ready")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ready"], true);
    assert_eq!(json["checks"]["counter_store"], true);
    assert_eq!(json["checks"]["vector_store_ok"], true);
    assert_eq!(json["checks"]["ocr_enabled"], false);
}

#[tokio::test]
async fn test_readiness_fails_when_vector_store_down() {
    let store = Arc::new(MemoryVectorStore::new());
    let app = create_router(test_state_with_store(test_config(), Arc::clone(&store)));

    store.set_unavailable(true);
    let (status, json) = send(&app, get("/ready")).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["ready"], false);
    assert_eq!(json["checks"]["vector_store_ok"], false);
    assert_eq!(json["checks"]["counter_store"], true);

    store.set_unavailable(false);
    let (status, _) = send(&app, get("/ready")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = create_router_for_testing();
    send(&app, get("/health")).await;

    let (status, text) = send_text(&app, get("/metrics")).await;

    assert_eq!(status, StatusCode::OK);
    assert!(text.contains("hrag_uptime_seconds"));
    assert!(text.contains("hrag_http_requests_total{endpoint=\"GET /health\",status=\"200\"} 1"));
    assert!(text.contains("hrag_http_request_duration_seconds_bucket{endpoint=\"GET /health\""));
}

#[tokio::test]
async fn test_openapi_document() {
    let app = create_router_for_testing();

    let (status, json) = send(&app, get("/api-docs/openapi.json")).await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["paths"]["/upload"].is_object());
    assert!(json["paths"]["/query"].is_object());
}

// =============================================================================
// Upload Tests
// =============================================================================

#[tokio::test]
async fn test_upload_success() {
    let app = create_router_for_testing();

    let (status, json) = upload(&app, "upload-ok", "labs.pdf").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["statusCode"], 200);
    assert_eq!(json["filename"], "labs.pdf");
    assert_eq!(json["message"], "Report processed and indexed successfully.");
    assert!(json["chunkCount"].as_u64().unwrap() > 0);
    assert_eq!(json["ocrApplied"], false);
}

#[tokio::test]
async fn test_upload_rejects_non_pdf() {
    let app = create_router_for_testing();

    let (status, json) = send(&app, upload_request(Some("upload-type"), "notes.txt", REPORT)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["statusCode"], 400);
    assert_eq!(json["filename"], "");
    assert_eq!(json["message"], "Invalid file type. Only PDF allowed..");
}

#[tokio::test]
async fn test_upload_accepts_uppercase_extension() {
    let app = create_router_for_testing();

    let (status, _) = upload(&app, "upload-upper", "LABS.PDF").await;

    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_upload_requires_user_id() {
    let app = create_router_for_testing();

    let (status, json) = send(&app, upload_request(None, "labs.pdf", REPORT)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_upload_rejects_bad_user_id() {
    let app = create_router_for_testing();

    let (status, _) = upload(&app, "../etc", "labs.pdf").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upload_empty_document() {
    let app = create_router_for_testing();

    let (status, json) = send(&app, upload_request(Some("upload-empty"), "scan.pdf", "  ")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["message"], "PDF appears empty or image-based");
}

#[tokio::test]
async fn test_upload_daily_limit() {
    let app = create_router_for_testing();

    assert_eq!(upload(&app, "upload-limit", "a.pdf").await.0, StatusCode::OK);
    assert_eq!(upload(&app, "upload-limit", "b.pdf").await.0, StatusCode::OK);

    let (status, json) = upload(&app, "upload-limit", "c.pdf").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json["statusCode"], 429);

    // other users keep their own allowance
    assert_eq!(upload(&app, "upload-limit-other", "a.pdf").await.0, StatusCode::OK);
}

#[tokio::test]
async fn test_upload_document_cap() {
    let mut config = test_config();
    config.limits.uploads_per_day = 10;
    config.limits.max_documents_per_user = 1;
    let app = create_router(test_state(config));

    assert_eq!(upload(&app, "upload-cap", "a.pdf").await.0, StatusCode::OK);
    // replacing the same file is allowed
    assert_eq!(upload(&app, "upload-cap", "a.pdf").await.0, StatusCode::OK);

    let (status, json) = upload(&app, "upload-cap", "b.pdf").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        json["message"],
        "You've reached the maximum saved document limit (1 documents)."
    );
}

#[tokio::test]
async fn test_upload_staging_failure_is_reported() {
    let blocker = tempfile::NamedTempFile::new().unwrap();
    let mut config = test_config();
    // a regular file where the upload directory should be
    config.ingest.temp_dir = blocker.path().join("uploads");
    let app = create_router(test_state(config));

    let (status, json) = upload(&app, "upload-staging", "labs.pdf").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["statusCode"], 500);
    assert_eq!(json["filename"], "labs.pdf");
    assert_eq!(json["message"], "Failed to process and index the PDF.");

    let (_, json) = send(&app, get("/documents?user_id=upload-staging")).await;
    assert_eq!(json["pagination"]["total"], 0);
}

// =============================================================================
// Query API Tests
// =============================================================================

#[tokio::test]
async fn test_query_endpoint_success() {
    let app = create_router_for_testing();
    upload(&app, "query-ok", "labs.pdf").await;

    let (status, json) = send(&app, query_request("query-ok", "Is my LDL cholesterol high?")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["statusCode"], 200);
    assert_eq!(json["query"], "Is my LDL cholesterol high?");
    assert_eq!(json["message"], TEST_ANSWER);
    assert_eq!(json["sources"], json!(["labs.pdf"]));
}

#[tokio::test]
async fn test_query_without_documents() {
    let app = create_router_for_testing();

    let (status, json) = send(&app, query_request("query-none", "What is my LDL?")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
    assert_eq!(json["message"], "No documents found for this user.");
}

#[tokio::test]
async fn test_query_is_isolated_per_user() {
    let app = create_router_for_testing();
    upload(&app, "query-owner", "labs.pdf").await;

    let (status, _) = send(&app, query_request("query-stranger", "What is my LDL?")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_query_endpoint_empty_question() {
    let app = create_router_for_testing();

    let (status, json) = send(&app, query_request("query-empty", "   ")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_query_daily_limit() {
    let app = create_router_for_testing();
    upload(&app, "query-limit", "labs.pdf").await;

    for _ in 0..10 {
        let (status, _) = send(&app, query_request("query-limit", "LDL?")).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, json) = send(&app, query_request("query-limit", "LDL?")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json["code"], "RATE_LIMITED");
}

#[tokio::test]
async fn test_query_stream() {
    let app = create_router_for_testing();
    upload(&app, "query-stream", "labs.pdf").await;

    let request = create_json_request(
        "POST",
        "/query/stream",
        Some(json!({ "user_id": "query-stream", "query": "Summarize my report" })),
    );
    let response = app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8_lossy(&body);
    assert!(text.contains("event: sources"));
    assert!(text.contains("labs.pdf"));
    assert!(text.contains("event: message"));
    assert!(text.trim_end().ends_with("data: [DONE]"));
}

#[tokio::test]
async fn test_query_stream_without_documents() {
    let app = create_router_for_testing();

    let request = create_json_request(
        "POST",
        "/query/stream",
        Some(json!({ "user_id": "stream-none", "query": "LDL?" })),
    );
    let (status, _) = send(&app, request).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

// =============================================================================
// Document API Tests
// =============================================================================

#[tokio::test]
async fn test_list_documents() {
    let mut config = test_config();
    config.limits.uploads_per_day = 10;
    let app = create_router(test_state(config));
    for name in ["a.pdf", "b.pdf", "c.pdf"] {
        upload(&app, "docs-list", name).await;
    }

    let (status, json) = send(&app, get("/documents?user_id=docs-list&page=1&limit=2")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["documents"].as_array().unwrap().len(), 2);
    assert_eq!(json["documents"][0]["filename"], "c.pdf");
    assert_eq!(json["documents"][1]["filename"], "b.pdf");
    assert_eq!(json["pagination"]["total"], 3);
    assert_eq!(json["pagination"]["hasMore"], true);

    let (_, json) = send(&app, get("/documents?user_id=docs-list&page=2&limit=2")).await;
    assert_eq!(json["documents"].as_array().unwrap().len(), 1);
    assert_eq!(json["documents"][0]["filename"], "a.pdf");
    assert_eq!(json["pagination"]["hasMore"], false);
}

#[tokio::test]
async fn test_delete_document() {
    let app = create_router_for_testing();
    upload(&app, "docs-delete", "labs.pdf").await;

    let request = create_json_request(
        "DELETE",
        "/documents",
        Some(json!({ "user_id": "docs-delete", "filename": "labs.pdf" })),
    );
    let (status, json) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["deleted"].as_u64().unwrap() > 0);

    let request = create_json_request(
        "DELETE",
        "/documents",
        Some(json!({ "user_id": "docs-delete", "filename": "labs.pdf" })),
    );
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_index_is_idempotent() {
    let app = create_router_for_testing();
    upload(&app, "index-delete", "labs.pdf").await;

    let delete = || {
        create_json_request(
            "DELETE",
            "/delete_index",
            Some(json!({ "user_id": "index-delete" })),
        )
    };

    let (status, json) = send(&app, delete()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "User index deleted successfully");
    assert!(json["deleted"].as_u64().unwrap() > 0);

    let (status, json) = send(&app, delete()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["deleted"], 0);

    let (status, _) = send(&app, query_request("index-delete", "LDL?")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_usage() {
    let app = create_router_for_testing();
    upload(&app, "usage-user", "labs.pdf").await;
    send(&app, query_request("usage-user", "LDL?")).await;

    let (status, json) = send(&app, get("/usage?user_id=usage-user")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["uploadsUsed"], 1);
    assert_eq!(json["uploadsLimit"], 2);
    assert_eq!(json["queriesUsed"], 1);
    assert_eq!(json["queriesLimit"], 10);
    assert_eq!(json["documents"], 1);
}

// =============================================================================
// History API Tests
// =============================================================================

fn history_uri(user: &str, filename: &str) -> String {
    format!("/history?user_id={user}&filename={filename}")
}

#[tokio::test]
async fn test_history_records_questions_and_answers() {
    let app = create_router_for_testing();
    let request = multipart_request(
        &[("user_id", "history-user"), ("description", "March blood panel")],
        "labs.pdf",
        REPORT,
    );
    assert_eq!(send(&app, request).await.0, StatusCode::OK);
    send(&app, query_request("history-user", "Is my LDL high?")).await;

    let (status, json) = send(&app, get(&history_uri("history-user", "labs.pdf"))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["description"], "March blood panel");
    assert_eq!(json["limit"], 50);
    let entries = json["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["content"], "Is my LDL high?");
    assert_eq!(entries[0]["byUser"], true);
    assert_eq!(entries[1]["content"], TEST_ANSWER);
    assert_eq!(entries[1]["byUser"], false);

    let (_, json) = send(&app, get("/documents?user_id=history-user")).await;
    assert_eq!(json["documents"][0]["description"], "March blood panel");
}

#[tokio::test]
async fn test_history_keeps_newest_entries() {
    let mut config = test_config();
    config.limits.history_per_document = 2;
    let app = create_router(test_state(config));
    upload(&app, "history-bounded", "labs.pdf").await;

    for question in ["first?", "second?", "third?"] {
        send(&app, query_request("history-bounded", question)).await;
    }

    let (_, json) = send(&app, get(&history_uri("history-bounded", "labs.pdf"))).await;
    let entries = json["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["content"], "third?");
    assert_eq!(entries[1]["content"], TEST_ANSWER);
}

#[tokio::test]
async fn test_history_of_unknown_document() {
    let app = create_router_for_testing();
    upload(&app, "history-missing", "labs.pdf").await;

    let (status, _) = send(&app, get(&history_uri("history-missing", "other.pdf"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // another user's document is not visible
    let (status, _) = send(&app, get(&history_uri("history-stranger", "labs.pdf"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_clear_history() {
    let app = create_router_for_testing();
    let request = multipart_request(
        &[("user_id", "history-clear"), ("description", "CBC")],
        "labs.pdf",
        REPORT,
    );
    send(&app, request).await;
    send(&app, query_request("history-clear", "Platelets?")).await;

    let request = create_json_request(
        "DELETE",
        "/history",
        Some(json!({ "user_id": "history-clear" })),
    );
    let (status, json) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Query history cleared");
    assert_eq!(json["documents"], 1);

    let (_, json) = send(&app, get(&history_uri("history-clear", "labs.pdf"))).await;
    assert!(json["entries"].as_array().unwrap().is_empty());
    assert_eq!(json["description"], "CBC");
}

#[tokio::test]
async fn test_reupload_starts_fresh_history() {
    let app = create_router_for_testing();
    upload(&app, "history-reupload", "labs.pdf").await;
    send(&app, query_request("history-reupload", "LDL?")).await;

    upload(&app, "history-reupload", "labs.pdf").await;

    let (_, json) = send(&app, get(&history_uri("history-reupload", "labs.pdf"))).await;
    assert!(json["entries"].as_array().unwrap().is_empty());
    assert!(json["description"].is_null());
}

// =============================================================================
// Admin Tests
// =============================================================================

#[tokio::test]
async fn test_delete_all_requires_key() {
    let app = create_router_for_testing();

    for uri in ["/delete/all", "/delete/all?key=wrong"] {
        let request = Request::builder()
            .method("DELETE")
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let (status, json) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["message"], "Invalid Key");
    }
}

#[tokio::test]
async fn test_delete_all_refused_without_configured_key() {
    let mut config = test_config();
    config.admin.key = None;
    let app = create_router(test_state(config));

    let request = Request::builder()
        .method("DELETE")
        .uri("/delete/all?key=")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_all_clears_every_user() {
    let app = create_router_for_testing();
    upload(&app, "wipe-a", "labs.pdf").await;
    upload(&app, "wipe-b", "labs.pdf").await;

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/delete/all?key={TEST_ADMIN_KEY}"))
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "All user indices have been deleted successfully.");

    for user in ["wipe-a", "wipe-b"] {
        let (status, _) = send(&app, query_request(user, "LDL?")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

#[tokio::test]
async fn test_admin_ensure_index() {
    let app = create_router_for_testing();

    let request = Request::builder()
        .method("POST")
        .uri(format!("/admin/index?key={TEST_ADMIN_KEY}"))
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["statusCode"], 200);
}
