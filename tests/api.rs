mod common;

use common::*;
use convo_sql::api::{dispatch, http, AppState};
use serde_json::json;

fn state() -> AppState {
    let harness = Harness::new(
        FakeParser::new(beams_with_top_probability("SELECT count(*) FROM concert", 0.45)),
        FakeAttribution::new(AttributionBehaviour::FailUpstream),
    );
    AppState::new(harness.orchestrator)
}

fn request(method: &str, target: &str, body: &str) -> http::HttpRequest {
    let raw = format!(
        "{} {} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
        method,
        target,
        body.len(),
        body
    );
    http::parse_request(raw.as_bytes()).unwrap()
}

#[tokio::test]
async fn test_text_to_sql_route() {
    let state = state();
    let reply = dispatch(
        &state,
        &request(
            "POST",
            "/text_to_sql",
            r#"{"text": "How many concerts are there", "db_id": "concert_singer", "analyse": true, "reset_history": false}"#,
        ),
    )
    .await;

    assert_eq!(reply.status, 200);
    assert_eq!(reply.body["pred_sql"], "SELECT count(*) FROM concert");
    assert_eq!(reply.body["confidence"], 45.0);
    assert_eq!(reply.body["analyse_result"]["raw_input"], "concerts");
    assert_eq!(reply.body["user_intent"], "query");
}

#[tokio::test]
async fn test_reset_history_route_targets_session() {
    let state = state();
    dispatch(
        &state,
        &request("POST", "/text_to_sql?session_id=s1", r#"{"text": "How many singers", "db_id": "concert_singer"}"#),
    )
    .await;

    let reply = dispatch(&state, &request("GET", "/reset_history?session_id=s1", "")).await;
    assert_eq!(reply.status, 200);
    assert_eq!(reply.body, json!({"response": true}));
}

#[tokio::test]
async fn test_table_to_text_route() {
    let state = state();
    let reply = dispatch(&state, &request("POST", "/table_to_text", r#"{"rows": []}"#)).await;
    assert_eq!(reply.status, 200);
    assert_eq!(reply.body["summary"], "There is no data in the table.");
}

#[tokio::test]
async fn test_client_errors() {
    let state = state();

    let malformed = dispatch(&state, &request("POST", "/text_to_sql", "{not json")).await;
    assert_eq!(malformed.status, 400);

    let unknown_db = dispatch(
        &state,
        &request("POST", "/text_to_sql", r#"{"text": "How many singers", "db_id": "car_1"}"#),
    )
    .await;
    assert_eq!(unknown_db.status, 400);
    assert!(unknown_db.body["error"].as_str().unwrap().contains("car_1"));

    assert_eq!(dispatch(&state, &request("GET", "/text_to_sql", "")).await.status, 405);

    let unknown = dispatch(&state, &request("GET", "/nowhere", "")).await;
    assert_eq!(unknown.status, 404);
    assert_eq!(unknown.body, json!({"error": "Unknown route: /nowhere"}));
}

#[tokio::test]
async fn test_health_reports_cache_counters() {
    let state = state();
    dispatch(&state, &request("POST", "/table_to_text", r#"{"rows": []}"#)).await;
    dispatch(&state, &request("POST", "/table_to_text", r#"{"rows": []}"#)).await;

    let reply = dispatch(&state, &request("GET", "/health", "")).await;
    assert_eq!(reply.status, 200);
    assert_eq!(reply.body["status"], "ok");
    assert_eq!(reply.body["cache"]["table2text"]["hits"], 1);
    assert_eq!(reply.body["cache"]["table2text"]["misses"], 1);
}
