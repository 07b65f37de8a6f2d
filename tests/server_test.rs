mod common;

use common::*;
use querygpt::config::AppConfig;
use querygpt::context::AppContext;
use querygpt::server::{handle_request, read_request, HttpRequest};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

fn context(generator: ScriptedGenerator) -> AppContext {
    let pipeline = pipeline_with(
        Arc::new(generator),
        Arc::new(FixedEmbedder(vec![1.0, 0.0, 0.0, 0.0])),
        Arc::new(RecordingAuditSink::default()),
    );
    AppContext::new(AppConfig::default(), catalog(), Arc::new(pipeline), None)
}

fn request(method: &str, path: &str, body: &str) -> HttpRequest {
    HttpRequest {
        method: method.to_string(),
        path: path.to_string(),
        headers: HashMap::new(),
        body: body.as_bytes().to_vec(),
    }
}

#[tokio::test]
async fn test_tables_in_catalog_order() {
    let ctx = context(happy_generator());
    let response = handle_request(&ctx, &request("GET", "/tables", "")).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body_json(), json!({ "tables": catalog().table_names() }));
}

#[tokio::test]
async fn test_health_and_unknown_routes() {
    let ctx = context(happy_generator());

    let health = handle_request(&ctx, &request("GET", "/health", "")).await;
    assert_eq!(health.body_json(), json!({"status": "ok", "service": "querygpt"}));

    let preflight = handle_request(&ctx, &request("OPTIONS", "/generate_sql", "")).await;
    assert_eq!(preflight.status, 200);

    let missing = handle_request(&ctx, &request("GET", "/nope", "")).await;
    assert_eq!(missing.status, 404);

    let wrong_method = handle_request(&ctx, &request("GET", "/generate_sql", "")).await;
    assert_eq!(wrong_method.status, 404);
}

#[tokio::test]
async fn test_generate_sql_success() {
    let ctx = context(happy_generator());
    let response = handle_request(
        &ctx,
        &request("POST", "/generate_sql", r#"{"query": "show me all purchase orders over 10000"}"#),
    )
    .await;

    assert_eq!(response.status, 200);
    let body = response.body_json();
    assert!(body["sql"].as_str().unwrap().contains("10000"));
    assert!(!body["explanation"].as_str().unwrap().is_empty());
    assert!(body.get("debug_info").is_none());
}

#[tokio::test]
async fn test_generate_sql_debug_echoes_stages() {
    let ctx = context(happy_generator().text("table_selection", "garbage"));
    let response = handle_request(
        &ctx,
        &request("POST", "/generate_sql", r#"{"query": "purchase orders", "debug": true}"#),
    )
    .await;

    assert_eq!(response.status, 200);
    let body = response.body_json();
    assert_eq!(body["debug_info"]["fallbacks"], json!(["table_selection"]));
}

#[tokio::test]
async fn test_generate_sql_rejects_bad_input() {
    let ctx = context(happy_generator());

    let blank = handle_request(&ctx, &request("POST", "/generate_sql", r#"{"query": "   "}"#)).await;
    assert_eq!(blank.status, 400);

    let missing = handle_request(&ctx, &request("POST", "/generate_sql", "{}")).await;
    assert_eq!(missing.status, 400);

    let malformed = handle_request(&ctx, &request("POST", "/generate_sql", "{query")).await;
    assert_eq!(malformed.status, 400);
    assert!(malformed.body_json()["error"].is_string());
}

#[tokio::test]
async fn test_generate_sql_synthesis_failure_is_500() {
    let ctx = context(happy_generator().structured("sql_generation", json!({"query": "SELECT 1"})));
    let response = handle_request(
        &ctx,
        &request("POST", "/generate_sql", r#"{"query": "purchase orders"}"#),
    )
    .await;

    assert_eq!(response.status, 500);
    let body = response.body_json();
    assert_eq!(body["error"], json!("Error generating SQL"));
    assert!(body["details"].as_str().unwrap().contains("missing field 'text'"));
    assert!(body.get("sql").is_none());
}

#[tokio::test]
async fn test_execute_sql_without_database() {
    let ctx = context(happy_generator());

    let missing = handle_request(&ctx, &request("POST", "/execute_sql", "{}")).await;
    assert_eq!(missing.status, 400);
    assert_eq!(missing.body_json()["error"], json!("SQL query is required"));

    let unavailable = handle_request(&ctx, &request("POST", "/execute_sql", r#"{"sql": "SELECT 1"}"#)).await;
    assert_eq!(unavailable.status, 503);
}

#[tokio::test]
async fn test_read_then_route() {
    let ctx = context(happy_generator());
    let raw = b"GET /tables/ HTTP/1.1\r\nHost: localhost\r\n\r\n";
    let mut stream = &raw[..];
    let request = read_request(&mut stream).await.unwrap();
    let response = handle_request(&ctx, &request).await;
    assert_eq!(response.status, 200);
    assert!(response.to_http().starts_with("HTTP/1.1 200 OK\r\n"));
}
