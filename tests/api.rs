use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use rainfall_qa::api::router;
use rainfall_qa::ax_state::AppState;
use rainfall_qa::config::AppConfig;

const SAMPLE: &str = "\
State,Year,Annual_Rainfall_mm
Maharashtra,2015,1200.5
Maharashtra,2016,1350.2
Karnataka,2015,1100.4
";

fn app() -> Router {
    router(Arc::new(AppState::new(AppConfig::default()).unwrap()))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let body = body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty);
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body)
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    (status, value)
}

async fn upload(app: &Router, csv: &str) -> String {
    let (status, body) =
        send(app, "POST", "/api/datasets", Some(json!({ "name": "rain", "csv": csv }))).await;
    assert_eq!(status, StatusCode::CREATED);
    body["session_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn upload_list_and_delete() {
    let app = app();
    let id = upload(&app, SAMPLE).await;

    let (status, list) = send(&app, "GET", "/api/datasets", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["rows"], 3);
    assert_eq!(list[0]["columns"][1]["role"], "year");

    let (status, _) = send(&app, "DELETE", &format!("/api/datasets/{}", id), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, "DELETE", &format!("/api/datasets/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn bad_upload_is_unprocessable() {
    let app = app();
    let (status, body) = send(
        &app,
        "POST",
        "/api/datasets",
        Some(json!({ "csv": "State,Rain_mm\nGoa,10\n" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body.as_str().unwrap().contains("year"));
}

#[tokio::test]
async fn preview_limit_is_clamped() {
    let app = app();
    let mut csv = String::from("State,Year,Rain_mm\n");
    for i in 0..600 {
        csv.push_str(&format!("Place {},2015,{}\n", i, i));
    }
    let id = upload(&app, &csv).await;

    let (_, body) = send(&app, "GET", &format!("/api/datasets/{}/preview", id), None).await;
    assert_eq!(body["rows"].as_array().unwrap().len(), 20);
    let (_, body) =
        send(&app, "GET", &format!("/api/datasets/{}/preview?limit=2", id), None).await;
    assert_eq!(body["rows"].as_array().unwrap().len(), 2);
    assert_eq!(body["rows"][1]["State"], "Place 1");
    let (_, body) =
        send(&app, "GET", &format!("/api/datasets/{}/preview?limit=100000", id), None).await;
    assert_eq!(body["rows"].as_array().unwrap().len(), 500);
}

#[tokio::test]
async fn chat_answers_and_records_history() {
    let app = app();
    let id = upload(&app, SAMPLE).await;

    let question = "Which year had the highest rainfall in Karnataka?";
    let (status, body) = send(
        &app,
        "POST",
        "/api/chat",
        Some(json!({ "session_id": id, "query": question, "include_prompt": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["citations"][0]["row_index"], 2);
    assert!(body["prompt"].as_str().unwrap().contains(question));

    let (_, body) = send(
        &app,
        "POST",
        "/api/chat",
        Some(json!({ "session_id": id, "query": "hello" })),
    )
    .await;
    assert_eq!(body["status"], "parse_error");
    assert_eq!(body["error"], "parse");
    assert!(body.get("prompt").is_none());

    let (status, history) =
        send(&app, "GET", &format!("/api/datasets/{}/history", id), None).await;
    assert_eq!(status, StatusCode::OK);
    let turns = history.as_array().unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0]["question"], question);
    assert_eq!(turns[1]["answer"]["status"], "parse_error");
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let app = app();
    let missing = "00000000-0000-4000-8000-000000000000";

    let (status, _) = send(
        &app,
        "POST",
        "/api/chat",
        Some(json!({ "session_id": missing, "query": "average rainfall" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    for uri in [
        format!("/api/datasets/{}/history", missing),
        format!("/api/datasets/{}/preview", missing),
    ] {
        let (status, _) = send(&app, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{}", uri);
    }
}
