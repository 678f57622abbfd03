use axum::Json;
use axum::extract::State;
use tracing::{error, info};

use crate::gateway::app::AppState;
use crate::gateway::error::ApiError;
use crate::gateway::model::{Configuration, StatusResponse};
use crate::utils::BrokerError;

/// `GET /healthz`: liveness only, never touches the broker.
pub async fn health_check() -> Json<StatusResponse> {
    Json(StatusResponse::ok())
}

/// `GET /api/v1/config`: a static placeholder, no broker interaction.
pub async fn get_configuration() -> Json<Configuration> {
    Json(Configuration::placeholder())
}

/// `POST /api/v1/config`: publish the posted configuration to the
/// configuration queue.
pub async fn create_configuration(
    State(state): State<AppState>,
    Json(config): Json<Configuration>,
) -> Result<Json<StatusResponse>, ApiError> {
    let Some(broker) = state.broker.as_ref() else {
        return Err(BrokerError::Disabled.into());
    };

    let body = serde_json::to_vec(&config).map_err(|e| {
        error!(error = %e, "failed to encode configuration");
        ApiError::internal("failed to encode configuration")
    })?;

    broker
        .publish(&state.config_queue, body, state.publish_timeout)
        .await
        .map_err(|e| {
            error!(error = %e, queue = %state.config_queue, "failed to publish configuration");
            ApiError::from(e)
        })?;

    info!(mode = %config.mode, queue = %state.config_queue, "configuration published");
    Ok(Json(StatusResponse::ok()))
}
