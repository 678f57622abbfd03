use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use futures_util::StreamExt;
use tower::ServiceExt;

use super::app::{AppState, build_router, serve};
use super::error::ApiError;
use super::model::{Configuration, ErrorResponse, StatusResponse};
use crate::broker::{ConnectOptions, MemoryBroker, SharedChannel, connect, subscribe};
use crate::config::Settings;
use crate::utils::BrokerError;

fn state_with(broker: Option<&MemoryBroker>) -> AppState {
    let settings = Settings::default().broker;
    let shared = broker.map(|b| {
        let options = ConnectOptions::new("memory://test", &settings.channel_label)
            .with_retries(1, Duration::from_millis(5));
        Arc::new(SharedChannel::new(Arc::new(b.clone()), options))
    });
    let mut state = AppState::new(shared, &settings);
    state.publish_timeout = Duration::from_millis(100);
    state
}

fn app(broker: Option<&MemoryBroker>) -> Router {
    build_router(state_with(broker))
}

fn post_config(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/v1/config")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn read_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap_or_else(|e| {
        panic!("invalid json {:?}: {e}", String::from_utf8_lossy(&bytes));
    })
}

#[tokio::test]
async fn test_healthz() {
    let response = app(None)
        .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: StatusResponse = read_json(response).await;
    assert_eq!(body, StatusResponse::ok());
}

#[tokio::test]
async fn test_get_configuration_returns_placeholder() {
    let broker = MemoryBroker::new();
    let response = app(Some(&broker))
        .oneshot(Request::get("/api/v1/config").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], br#"{"mode":"sleeping"}"#);
    assert_eq!(broker.dial_attempts(), 0);
}

#[tokio::test]
async fn test_post_configuration_publishes_to_config_queue() {
    let broker = MemoryBroker::new();
    broker.declare_queue("config");

    let response = app(Some(&broker))
        .oneshot(post_config(r#"{"mode":"active","objective":"patrol"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: StatusResponse = read_json(response).await;
    assert_eq!(body.status, "ok");

    let channel = connect(&broker, &ConnectOptions::new("memory://test", "reader"))
        .await
        .unwrap();
    let mut sub = subscribe(&channel, "config").await.unwrap();
    let msg = sub.next().await.unwrap();
    let published: Configuration = serde_json::from_slice(&msg.body).unwrap();
    assert_eq!(
        published,
        Configuration {
            mode: "active".to_string(),
            objective: Some("patrol".to_string()),
        }
    );
    assert_eq!(msg.content_type, "application/json");
    channel.close().await;
}

#[tokio::test]
async fn test_post_configuration_reuses_shared_connection() {
    let broker = MemoryBroker::new();
    broker.declare_queue("config");
    let router = app(Some(&broker));

    for mode in ["a", "b"] {
        let response = router
            .clone()
            .oneshot(post_config(&format!(r#"{{"mode":"{mode}"}}"#)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(broker.dial_attempts(), 1);
    assert_eq!(broker.backlog_len("config"), 2);
}

#[tokio::test]
async fn test_post_without_broker_is_unavailable() {
    let response = app(None).oneshot(post_config(r#"{"mode":"x"}"#)).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: ErrorResponse = read_json(response).await;
    assert_eq!(body.code, "broker_disabled");
}

#[tokio::test]
async fn test_post_with_unreachable_broker_is_bad_gateway() {
    let broker = MemoryBroker::new();
    broker.set_reachable(false);
    let router = app(Some(&broker));

    let response = router
        .clone()
        .oneshot(post_config(r#"{"mode":"x"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body: ErrorResponse = read_json(response).await;
    assert_eq!(body.code, "broker_unavailable");
    assert_eq!(broker.dial_attempts(), 2);

    // Other endpoints keep working.
    let response = router
        .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_concurrent_posts_with_unreachable_broker_dial_once() {
    let broker = MemoryBroker::new();
    broker.set_reachable(false);
    let router = app(Some(&broker));

    let requests = (0..4).map(|i| {
        router
            .clone()
            .oneshot(post_config(&format!(r#"{{"mode":"m{i}"}}"#)))
    });
    let responses = futures::future::join_all(requests).await;

    for response in responses {
        assert_eq!(response.unwrap().status(), StatusCode::BAD_GATEWAY);
    }
    assert_eq!(broker.dial_attempts(), 2);
}

#[tokio::test]
async fn test_post_with_stalled_broker_is_gateway_timeout() {
    let broker = MemoryBroker::new();
    broker.declare_queue("config");
    broker.set_stall_publishes(true);

    let response = app(Some(&broker))
        .oneshot(post_config(r#"{"mode":"x"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    let body: ErrorResponse = read_json(response).await;
    assert_eq!(body.code, "broker_timeout");
    assert_eq!(broker.open_sessions(), 0);
}

#[tokio::test]
async fn test_post_with_malformed_body_is_rejected() {
    let broker = MemoryBroker::new();
    broker.declare_queue("config");

    let response = app(Some(&broker))
        .oneshot(post_config("{not json"))
        .await
        .unwrap();

    assert!(response.status().is_client_error());
    assert_eq!(broker.dial_attempts(), 0);
}

#[tokio::test]
async fn test_serve_closes_broker_on_shutdown() {
    let broker = MemoryBroker::new();
    broker.declare_queue("config");
    let state = state_with(Some(&broker));
    let shared = state.broker.clone().unwrap();
    shared
        .publish("config", b"{}".to_vec(), Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(broker.open_sessions(), 1);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(serve(listener, state, async move {
        let _ = rx.await;
    }));

    tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server shuts down")
        .unwrap()
        .unwrap();
    assert_eq!(broker.open_sessions(), 0);
}

#[test]
fn test_invalid_options_hide_details() {
    let err = ApiError::from(BrokerError::InvalidOptions("secret detail".to_string()));

    assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(err.body.code, "internal");
    assert!(!err.body.message.contains("secret"));
}

#[test]
fn test_configuration_serialization() {
    let placeholder = serde_json::to_string(&Configuration::placeholder()).unwrap();
    assert_eq!(placeholder, r#"{"mode":"sleeping"}"#);

    let parsed: Configuration = serde_json::from_str(r#"{"mode":"m"}"#).unwrap();
    assert_eq!(parsed.objective, None);
}
