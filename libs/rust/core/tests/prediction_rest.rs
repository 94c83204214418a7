use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use registry_core::{RemoteError, RestPredictionClient};
use serde_json::{json, Value};
use std::time::Duration;

async fn halve(name: &str, body: &Value) -> (StatusCode, Json<Value>) {
    if name != "half_plus_two" {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": format!("Servable not found for request: Latest({name})") })));
    }
    if body["signature_name"] != "serving_default" {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "unexpected signature" })));
    }
    let predictions: Vec<f64> = body["instances"]
        .as_array()
        .map(|xs| xs.iter().filter_map(Value::as_f64).map(|x| x / 2.0 + 2.0).collect())
        .unwrap_or_default();
    (StatusCode::OK, Json(json!({ "predictions": predictions })))
}

async fn latest(Path(spec): Path<String>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    match spec.strip_suffix(":predict") {
        Some(name) => halve(name, &body).await,
        None => (StatusCode::NOT_FOUND, Json(json!({ "error": "no such route" }))),
    }
}

async fn versioned(Path((name, version)): Path<(String, String)>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if version != "1:predict" {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": format!("version {version} not loaded") })));
    }
    halve(&name, &body).await
}

async fn spawn_server() -> String {
    let app = Router::new()
        .route("/v1/models/:model", post(latest))
        .route("/v1/models/:model/versions/:version", post(versioned));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn predicts_against_latest_and_pinned_version() {
    let base = spawn_server().await;
    let client = RestPredictionClient::new(base, Duration::from_secs(5)).unwrap();

    let out = client.predict("half_plus_two", None, json!([1.0, 2.0, 5.0])).await.unwrap();
    assert_eq!(out, json!([2.5, 3.0, 4.5]));

    let out = client.predict("half_plus_two", Some(1), json!([4.0])).await.unwrap();
    assert_eq!(out, json!([4.0]));
}

#[tokio::test]
async fn server_error_message_is_surfaced() {
    let base = spawn_server().await;
    let client = RestPredictionClient::new(base, Duration::from_secs(5)).unwrap();

    let err = client.predict("unknown", None, json!([1.0])).await.unwrap_err();
    match err {
        RemoteError::Server { status, message } => {
            assert_eq!(status, 404);
            assert!(message.contains("Servable not found"), "{message}");
        }
        other => panic!("unexpected error: {other}"),
    }

    let err = client.predict("half_plus_two", Some(7), json!([1.0])).await.unwrap_err();
    assert!(matches!(err, RemoteError::Server { status: 404, .. }));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn unreachable_server_is_transient() {
    let client = RestPredictionClient::new("http://127.0.0.1:1", Duration::from_millis(500)).unwrap();
    let err = client.predict("half_plus_two", None, json!([1.0])).await.unwrap_err();
    assert!(matches!(err, RemoteError::Http(_)));
    assert!(err.is_transient());
}
