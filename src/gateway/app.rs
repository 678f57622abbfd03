//! HTTP application wiring.
//!
//! Builds the axum router, attaches request logging, and defines the state
//! shared by handlers.
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::ConnectInfo;
use axum::routing::get;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info};

use crate::broker::SharedChannel;
use crate::config::BrokerSettings;
use crate::gateway::handlers;

#[derive(Clone)]
pub struct AppState {
    /// `None` when no broker URL is configured.
    pub broker: Option<Arc<SharedChannel>>,
    pub config_queue: String,
    pub publish_timeout: Duration,
}

impl AppState {
    pub fn new(broker: Option<Arc<SharedChannel>>, settings: &BrokerSettings) -> Self {
        Self {
            broker,
            config_queue: settings.config_queue.clone(),
            publish_timeout: Duration::from_secs(settings.publish_timeout_secs),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &axum::http::Request<_>| {
            let remote = request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.to_string())
                .unwrap_or_else(|| "-".to_string());
            tracing::info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri(),
                remote = %remote
            )
        })
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    Router::new()
        .route("/healthz", get(handlers::health_check))
        .route(
            "/api/v1/config",
            get(handlers::get_configuration).post(handlers::create_configuration),
        )
        .layer(trace_layer)
        .with_state(state)
}

/// Serves the gateway on `listener` until `shutdown` resolves, then closes the
/// shared broker channel.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let broker = state.broker.clone();
    let app = build_router(state);

    info!(addr = %listener.local_addr()?, "listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    if let Some(broker) = broker {
        broker.close().await;
    }
    Ok(())
}
